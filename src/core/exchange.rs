use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

use crate::core::{
    config::{ApiKeys, ExchangeConfig},
    error::ExchangeError,
    http::{HttpMethod, HttpRequest, HttpTransport, Params, ResponseShape},
    paginator::PageSource,
    types::{
        Balance, Candle, CandleQuery, HistoryQuery, Interval, MarginType, MarketType, Order,
        OrderRequest, PositionInfo, Result, SymbolInfo, Ticker, Trade,
    },
};
use crate::utils::signature::{RequestSigner, SignatureHelper};
use crate::utils::symbol::SymbolRegistry;

/// 交易所接口能提供的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ExchangeInfo,
    Symbols,
    Balances,
    Tickers,
    Ticker,
    CreateOrder,
    CancelOrder,
    GetOrder,
    Orders,
    OpenOrders,
    Trades,
    Candles,
    PositionInfo,
    PositionsInfo,
    SetMarginType,
    SetLeverage,
    ServerTime,
}

impl Operation {
    pub const ALL: [Operation; 17] = [
        Operation::ExchangeInfo,
        Operation::Symbols,
        Operation::Balances,
        Operation::Tickers,
        Operation::Ticker,
        Operation::CreateOrder,
        Operation::CancelOrder,
        Operation::GetOrder,
        Operation::Orders,
        Operation::OpenOrders,
        Operation::Trades,
        Operation::Candles,
        Operation::PositionInfo,
        Operation::PositionsInfo,
        Operation::SetMarginType,
        Operation::SetLeverage,
        Operation::ServerTime,
    ];
}

/// 当前交易所和市场类型支持的操作集合
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    operations: HashSet<Operation>,
}

impl Capabilities {
    pub fn new(operations: &[Operation]) -> Self {
        Self {
            operations: operations.iter().copied().collect(),
        }
    }

    pub fn supports(&self, operation: Operation) -> bool {
        self.operations.contains(&operation)
    }

    /// 按固定顺序列出支持的操作
    pub fn operations(&self) -> Vec<Operation> {
        Operation::ALL
            .iter()
            .copied()
            .filter(|op| self.supports(*op))
            .collect()
    }
}

/// 交易所通用接口trait
///
/// 所有交易对参数和返回值都使用统一格式 BASE/QUOTE。
/// 交易所不支持的操作返回 `ExchangeError::NotSupported`，可以先用 `capabilities()` 查询。
#[async_trait]
pub trait Exchange: Send + Sync {
    /// 获取交易所名称
    fn name(&self) -> &str;

    /// 构造时确定的市场类型
    fn market_type(&self) -> MarketType;

    fn capabilities(&self) -> Capabilities;

    /// 本实例的交易对注册表
    fn registry(&self) -> &SymbolRegistry;

    /// 获取交易对信息，结果同时写入注册表缓存
    async fn get_exchange_info(&self) -> Result<Vec<SymbolInfo>>;

    /// 获取交易对列表，缓存为空时先拉取 exchange info
    async fn get_symbols(&self, include_all: bool) -> Result<Vec<String>> {
        if !self.registry().has_info() {
            self.get_exchange_info().await?;
        }
        Ok(self.registry().symbols(include_all))
    }

    /// 获取余额
    async fn get_balances(&self) -> Result<Vec<Balance>> {
        Err(unsupported(self.name(), self.market_type(), "get_balances"))
    }

    /// 获取所有行情，无法识别的交易对会被跳过
    async fn get_tickers(&self) -> Result<Vec<Ticker>> {
        Err(unsupported(self.name(), self.market_type(), "get_tickers"))
    }

    async fn get_ticker(&self, _symbol: &str) -> Result<Ticker> {
        Err(unsupported(self.name(), self.market_type(), "get_ticker"))
    }

    /// 创建订单
    async fn create_order(&self, _request: &OrderRequest) -> Result<Order> {
        Err(unsupported(self.name(), self.market_type(), "create_order"))
    }

    /// 取消订单
    async fn cancel_order(&self, _symbol: &str, _order_id: &str) -> Result<Order> {
        Err(unsupported(self.name(), self.market_type(), "cancel_order"))
    }

    /// 获取订单状态
    async fn get_order(&self, _symbol: &str, _order_id: &str) -> Result<Order> {
        Err(unsupported(self.name(), self.market_type(), "get_order"))
    }

    /// 获取订单历史，指定起点时会分页拉取全部
    async fn get_orders(&self, _symbol: &str, _query: &HistoryQuery) -> Result<Vec<Order>> {
        Err(unsupported(self.name(), self.market_type(), "get_orders"))
    }

    /// 获取活跃订单
    async fn get_open_orders(&self, _symbol: &str) -> Result<Vec<Order>> {
        Err(unsupported(self.name(), self.market_type(), "get_open_orders"))
    }

    /// 获取成交记录
    async fn get_trades(&self, _symbol: &str, _query: &HistoryQuery) -> Result<Vec<Trade>> {
        Err(unsupported(self.name(), self.market_type(), "get_trades"))
    }

    /// 获取K线数据，按时间升序
    async fn get_candles(
        &self,
        _symbol: &str,
        _interval: Interval,
        _query: &CandleQuery,
    ) -> Result<Vec<Candle>> {
        Err(unsupported(self.name(), self.market_type(), "get_candles"))
    }

    /// 获取持仓信息(仅期货)
    async fn get_position_info(&self, _symbol: &str) -> Result<PositionInfo> {
        Err(unsupported(self.name(), self.market_type(), "get_position_info"))
    }

    async fn get_positions_info(&self) -> Result<Vec<PositionInfo>> {
        Err(unsupported(self.name(), self.market_type(), "get_positions_info"))
    }

    /// 设置保证金模式(仅期货)，返回交易所原始响应
    async fn set_margin_type(&self, _symbol: &str, _margin_type: MarginType) -> Result<Value> {
        Err(unsupported(self.name(), self.market_type(), "set_margin_type"))
    }

    /// 设置杠杆(仅期货)，返回交易所原始响应
    async fn set_leverage(&self, _symbol: &str, _leverage: u32) -> Result<Value> {
        Err(unsupported(self.name(), self.market_type(), "set_leverage"))
    }

    /// 获取服务器时间（毫秒）
    async fn get_server_time(&self) -> Result<i64> {
        Err(unsupported(self.name(), self.market_type(), "get_server_time"))
    }
}

/// 不支持的操作
pub fn unsupported(exchange: &str, market_type: MarketType, operation: &str) -> ExchangeError {
    ExchangeError::NotSupported(format!(
        "{} {:?} 不支持 {}",
        exchange, market_type, operation
    ))
}

/// 必填参数校验
pub fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ExchangeError::validation(field, "不能为空"));
    }
    Ok(())
}

/// 基础交易所实现
///
/// 组合传输、签名、响应外层结构和交易对注册表，各交易所只负责端点和字段映射。
pub struct BaseExchange {
    pub name: &'static str,
    pub config: ExchangeConfig,
    pub registry: SymbolRegistry,
    api_keys: Option<ApiKeys>,
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    signer: Box<dyn RequestSigner>,
    shape: ResponseShape,
}

impl BaseExchange {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &'static str,
        config: ExchangeConfig,
        api_keys: Option<ApiKeys>,
        transport: Arc<dyn HttpTransport>,
        signer: Box<dyn RequestSigner>,
        shape: ResponseShape,
        registry: SymbolRegistry,
        default_base_url: &str,
    ) -> Self {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url.to_string());

        log::debug!(
            "初始化 {} 适配器: {} ({:?})",
            name,
            base_url,
            config.market_type()
        );

        Self {
            name,
            config,
            registry,
            api_keys,
            base_url,
            transport,
            signer,
            shape,
        }
    }

    pub fn market_type(&self) -> MarketType {
        self.config.market_type()
    }

    pub fn is_futures(&self) -> bool {
        self.config.futures
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn unsupported(&self, operation: &str) -> ExchangeError {
        unsupported(self.name, self.market_type(), operation)
    }

    /// 发送请求并剥离外层结构
    ///
    /// 签名请求没有密钥时直接返回认证错误，不发出网络请求；每次调用都重新生成时间戳。
    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        params: Params,
        signed: bool,
    ) -> Result<Value> {
        let mut request = HttpRequest::new(method, &self.base_url, path, params);

        if signed {
            let credentials = self.api_keys.as_ref().ok_or_else(|| {
                ExchangeError::AuthError(format!("{} 的签名接口需要API密钥", self.name))
            })?;
            self.signer
                .attach(&mut request, credentials, SignatureHelper::timestamp())?;
        }

        let response = self.transport.execute(&request).await?;
        let payload = response.into_json()?;
        self.shape.unwrap(payload)
    }

    pub async fn public_get(&self, path: &str, params: Params) -> Result<Value> {
        self.request(HttpMethod::Get, path, params, false).await
    }

    pub async fn signed_get(&self, path: &str, params: Params) -> Result<Value> {
        self.request(HttpMethod::Get, path, params, true).await
    }

    /// 统一格式 -> 本地格式
    pub fn local_symbol(&self, symbol: &str) -> Result<String> {
        require("symbol", symbol)?;
        Ok(self.registry.to_local(symbol))
    }
}

#[async_trait]
impl PageSource for BaseExchange {
    async fn fetch_page(&self, endpoint: &str, params: &Params) -> Result<Value> {
        self.signed_get(endpoint, params.clone()).await
    }
}
