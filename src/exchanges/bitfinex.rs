use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::core::{
    config::{ApiKeys, ExchangeConfig},
    error::ExchangeError,
    exchange::{BaseExchange, Capabilities, Exchange, Operation},
    http::{HttpTransport, Params, ResponseShape},
    normalizer,
    types::{Candle, CandleQuery, Interval, MarketType, Result, SymbolInfo, Ticker},
};
use crate::utils::signature::PublicOnlySigner;
use crate::utils::symbol::{SymbolRegistry, SymbolStyle};

const PUBLIC_API_URL: &str = "https://api-pub.bitfinex.com";

const DEFAULT_QUOTE_ASSETS: &[&str] = &[
    "BTC", "CNHT", "ETH", "EUR", "EUT", "GBP", "JPY", "MIM", "MXNT", "TESTUSD", "TESTUSDT",
    "TRY", "USD", "UST", "XAUT",
];

/// tickers 接口中最新价的位置
const TICKERS_LAST_PRICE: usize = 7;
/// 单个 ticker 接口中最新价的位置（没有交易对字段）
const TICKER_LAST_PRICE: usize = 6;

/// Bitfinex 公共行情实现
///
/// 本地交易对有两种形式：BTCUSD 和 TESTBTC:TESTUSD。
/// 没有分隔符的交易对先按报价资产匹配，再按 exchange info 拉到的币种列表匹配。
pub struct BitfinexExchange {
    base: BaseExchange,
}

impl BitfinexExchange {
    pub fn new(
        config: ExchangeConfig,
        api_keys: Option<ApiKeys>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let base = BaseExchange::new(
            "bitfinex",
            config,
            api_keys,
            transport,
            Box::new(PublicOnlySigner {
                exchange: "bitfinex",
            }),
            ResponseShape::Plain,
            SymbolRegistry::new(
                SymbolStyle::Concatenated {
                    delimiter: Some(':'),
                },
                DEFAULT_QUOTE_ASSETS,
            ),
            PUBLIC_API_URL,
        );
        Self { base }
    }

    pub fn interval_to_local(interval: Interval) -> Result<&'static str> {
        match interval {
            Interval::OneMinute => Ok("1m"),
            Interval::ThreeMinutes => Ok("3m"),
            Interval::FiveMinutes => Ok("5m"),
            Interval::FifteenMinutes => Ok("15m"),
            Interval::ThirtyMinutes => Ok("30m"),
            Interval::OneHour => Ok("1h"),
            Interval::TwoHours => Ok("2h"),
            Interval::ThreeHours => Ok("3h"),
            Interval::SixHours => Ok("6h"),
            Interval::TwelveHours => Ok("12h"),
            Interval::OneDay => Ok("1D"),
            Interval::OneWeek => Ok("1W"),
            Interval::TwoWeeks => Ok("14D"),
            Interval::OneMonth => Ok("1M"),
            Interval::FourHours | Interval::EightHours => Err(ExchangeError::UnsupportedInterval {
                interval: interval.to_string(),
                exchange: "bitfinex".to_string(),
            }),
        }
    }

    /// ["BTCUSD", [null, null, null, MIN_ORDER_SIZE, MAX_ORDER_SIZE, ...]]
    fn parse_symbol_info(&self, info: &Value) -> Result<Option<SymbolInfo>> {
        let local = info
            .get(0)
            .and_then(|s| s.as_str())
            .ok_or_else(|| ExchangeError::ParseError(format!("无效的交易对信息: {}", info)))?;
        let Some(symbol) = self.base.registry.to_global(local) else {
            log::debug!("跳过无法识别的交易对: {}", local);
            return Ok(None);
        };
        let (base_asset, quote_asset) = SymbolRegistry::split(&symbol)?;

        let min_quantity = match info.get(1).and_then(|d| d.get(3)) {
            None | Some(Value::Null) => None,
            Some(value) => Some(normalizer::amount_from(value)?),
        };

        Ok(Some(SymbolInfo {
            symbol,
            original_symbol: local.to_string(),
            base_asset,
            quote_asset,
            // 接口不返回状态，列出的交易对都视为可交易
            status: "TRADING".to_string(),
            price_precision: None,
            price_tick_size: None,
            quantity_precision: None,
            quantity_step_size: None,
            min_quantity,
            min_order_size: None,
            raw: info.clone(),
        }))
    }

    /// [MTS, OPEN, CLOSE, HIGH, LOW, VOLUME]
    fn parse_candle(row: &Value) -> Result<Candle> {
        let fields = row
            .as_array()
            .filter(|f| f.len() >= 6)
            .ok_or_else(|| ExchangeError::ParseError(format!("无效的K线数据: {}", row)))?;
        let timestamp = normalizer::normalize_timestamp(normalizer::integer_from(&fields[0])?)?;

        Ok(Candle {
            timestamp,
            date: normalizer::date(timestamp)?,
            date_time: normalizer::date_time(timestamp)?,
            open: normalizer::amount_from(&fields[1])?,
            close: normalizer::amount_from(&fields[2])?,
            high: normalizer::amount_from(&fields[3])?,
            low: normalizer::amount_from(&fields[4])?,
            volume: normalizer::amount_from(&fields[5])?,
            raw: row.clone(),
        })
    }
}

/// 响应第一个元素必须是数组
fn first_list(response: &Value, what: &str) -> Result<Vec<Value>> {
    match response.get(0) {
        Some(Value::Array(items)) => Ok(items.clone()),
        _ => Err(ExchangeError::ParseError(format!(
            "{} 响应格式错误: {}",
            what, response
        ))),
    }
}

#[async_trait]
impl Exchange for BitfinexExchange {
    fn name(&self) -> &str {
        self.base.name
    }

    fn market_type(&self) -> MarketType {
        self.base.market_type()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::new(&[
            Operation::ExchangeInfo,
            Operation::Symbols,
            Operation::Tickers,
            Operation::Ticker,
            Operation::Candles,
        ])
    }

    fn registry(&self) -> &SymbolRegistry {
        &self.base.registry
    }

    async fn get_exchange_info(&self) -> Result<Vec<SymbolInfo>> {
        // 先拿币种列表，用于识别没有分隔符的交易对
        let currencies = self
            .base
            .public_get("/v2/conf/pub:list:currency", Params::new())
            .await?;
        let currencies = first_list(&currencies, "币种列表")?
            .iter()
            .filter_map(|c| c.as_str().map(|s| s.to_string()))
            .collect();
        self.base.registry.set_currencies(currencies);

        let endpoint = if self.base.is_futures() {
            "/v2/conf/pub:info:pair:futures"
        } else {
            "/v2/conf/pub:info:pair"
        };
        let response = self.base.public_get(endpoint, Params::new()).await?;

        let mut result = Vec::new();
        for item in first_list(&response, "交易对信息")? {
            if let Some(info) = self.parse_symbol_info(&item)? {
                self.base.registry.insert_info(info.clone());
                result.push(info);
            }
        }
        log::info!("✅ Bitfinex 加载了 {} 个交易对", result.len());
        Ok(result)
    }

    async fn get_tickers(&self) -> Result<Vec<Ticker>> {
        let params = Params::new().with("symbols", "ALL");
        let response = self.base.public_get("/v2/tickers", params).await?;
        let rows = response
            .as_array()
            .ok_or_else(|| ExchangeError::ParseError(format!("tickers 不是数组: {}", response)))?;
        let timestamp = normalizer::now_ms();

        let mut tickers = Vec::new();
        for row in rows {
            // t 开头是交易对，f 开头是融资币种
            let Some(local) = row
                .get(0)
                .and_then(|s| s.as_str())
                .and_then(|s| s.strip_prefix('t'))
            else {
                continue;
            };
            let Some(symbol) = self.base.registry.to_global(local) else {
                log::debug!("跳过无法识别的交易对: {}", local);
                continue;
            };
            let Some(price) = row.get(TICKERS_LAST_PRICE).filter(|p| !p.is_null()) else {
                continue;
            };
            tickers.push(Ticker {
                symbol,
                price: normalizer::amount_from(price)?,
                timestamp,
                date_time: normalizer::date_time(timestamp)?,
                raw: row.clone(),
            });
        }
        Ok(tickers)
    }

    async fn get_ticker(&self, symbol: &str) -> Result<Ticker> {
        let endpoint = format!("/v2/ticker/t{}", self.base.local_symbol(symbol)?);
        let response = self.base.public_get(&endpoint, Params::new()).await?;
        let price = response
            .get(TICKER_LAST_PRICE)
            .ok_or_else(|| ExchangeError::ParseError(format!("ticker 响应格式错误: {}", response)))?;
        let timestamp = normalizer::now_ms();

        Ok(Ticker {
            symbol: symbol.to_string(),
            price: normalizer::amount_from(price)?,
            timestamp,
            date_time: normalizer::date_time(timestamp)?,
            raw: response,
        })
    }

    async fn get_candles(
        &self,
        symbol: &str,
        interval: Interval,
        query: &CandleQuery,
    ) -> Result<Vec<Candle>> {
        let endpoint = format!(
            "/v2/candles/trade:{}:t{}/hist",
            Self::interval_to_local(interval)?,
            self.base.local_symbol(symbol)?
        );
        let mut params = Params::new().with("sort", 1);
        if let Some(start) = query.start {
            params.insert("start", normalizer::seconds_to_ms("start", start)?.to_string());
        }
        if let Some(end) = query.end {
            params.insert("end", normalizer::seconds_to_ms("end", end)?.to_string());
        }
        if let Some(limit) = query.limit {
            params.insert("limit", limit);
        }

        let response = self.base.public_get(&endpoint, params).await?;
        response
            .as_array()
            .ok_or_else(|| ExchangeError::ParseError(format!("candles 不是数组: {}", response)))?
            .iter()
            .map(Self::parse_candle)
            .collect()
    }
}
