// 交易所实现
pub mod binance;
pub mod bitfinex;
pub mod bybit;
pub mod kucoin;

use std::sync::Arc;

use crate::core::{
    config::{ApiKeys, ExchangeConfig, ExchangeKind},
    exchange::Exchange,
    http::{HttpTransport, ReqwestTransport},
    types::Result,
};

// 导出交易所实现
pub use binance::BinanceExchange;
pub use bitfinex::BitfinexExchange;
pub use bybit::BybitExchange;
pub use kucoin::KucoinExchange;

/// 按配置创建交易所实例，每次调用都是独立实例（注册表不共享）
pub fn create_exchange(
    config: &ExchangeConfig,
    api_keys: Option<ApiKeys>,
    transport: Arc<dyn HttpTransport>,
) -> Box<dyn Exchange> {
    let config = config.clone();
    match config.exchange {
        ExchangeKind::Binance => Box::new(BinanceExchange::new(config, api_keys, transport)),
        ExchangeKind::Bybit => Box::new(BybitExchange::new(config, api_keys, transport)),
        ExchangeKind::Kucoin => Box::new(KucoinExchange::new(config, api_keys, transport)),
        ExchangeKind::Bitfinex => Box::new(BitfinexExchange::new(config, api_keys, transport)),
    }
}

/// 使用 reqwest 传输，并从环境变量读取API密钥（缺失时只能调用公共接口）
pub fn create_exchange_from_config(config: &ExchangeConfig) -> Result<Box<dyn Exchange>> {
    let transport = ReqwestTransport::new(config.timeout_secs, config.proxy.as_deref())?;

    let prefix = config.env_prefix();
    let api_keys = match ApiKeys::from_env(&prefix) {
        Ok(keys) => Some(keys),
        Err(e) => {
            log::debug!("未加载 {} API密钥，仅可调用公共接口: {}", prefix, e);
            None
        }
    };

    Ok(create_exchange(config, api_keys, Arc::new(transport)))
}
