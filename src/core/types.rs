use chrono::{DateTime, NaiveDate, Utc};
/// 统一的类型定义模块
/// 所有交易所响应都会被规范化为这里的实体
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::core::error::ExchangeError;

// ============= 基础类型定义 =============

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ExchangeError>;

/// 市场类型
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketType {
    Spot,
    Futures,
}

impl MarketType {
    pub fn from_futures_flag(futures: bool) -> Self {
        if futures {
            MarketType::Futures
        } else {
            MarketType::Spot
        }
    }

    pub fn is_futures(&self) -> bool {
        matches!(self, MarketType::Futures)
    }
}

/// 数值字段：解析后的浮点值 + 交易所返回的原始字符串
///
/// 原始字符串用于展示和再次签名，永远不要用 `value` 重新格式化代替它
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amount {
    pub value: f64,
    pub raw: String,
}

impl Amount {
    /// 从交易所原始字符串解析
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let value = trimmed
            .parse::<f64>()
            .map_err(|_| ExchangeError::ParseError(format!("无效的数值: '{}'", raw)))?;
        Ok(Self {
            value,
            raw: trimmed.to_string(),
        })
    }

    /// 由计算得到的数值构造，字符串固定保留8位小数
    pub fn derived(value: f64) -> Self {
        let value = round_to(value, 8);
        Self {
            value,
            raw: format!("{:.8}", value),
        }
    }

    pub fn zero() -> Self {
        Self {
            value: 0.0,
            raw: "0".to_string(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0.0
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// 四舍五入到指定小数位
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

// ============= 规范化实体 =============

/// 交易对元数据（来自 exchange info）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub original_symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub status: String,
    pub price_precision: Option<i32>,
    pub price_tick_size: Option<Amount>,
    pub quantity_precision: Option<i32>,
    pub quantity_step_size: Option<Amount>,
    pub min_quantity: Option<Amount>,
    pub min_order_size: Option<Amount>,
    pub raw: serde_json::Value,
}

impl SymbolInfo {
    pub fn is_trading(&self) -> bool {
        matches!(
            self.status.to_uppercase().as_str(),
            "TRADING" | "ONLINE" | "ENABLED"
        )
    }
}

/// 账户余额
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub free: Amount,
    pub locked: Amount,
    pub total: Amount,
    pub timestamp: i64,
    pub date_time: DateTime<Utc>,
    pub raw: serde_json::Value,
}

/// 最新价
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub price: Amount,
    pub timestamp: i64,
    pub date_time: DateTime<Utc>,
    pub raw: serde_json::Value,
}

/// 订单
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub order_id: String,
    pub price: Amount,
    pub stop_price: Option<Amount>,
    pub executed_qty: Amount,
    pub orig_qty: Amount,
    pub quote_qty: Amount,
    pub status: OrderStatus,
    pub order_type: String,
    pub side: OrderSide,
    pub timestamp: Option<i64>,
    pub date_time: Option<DateTime<Utc>>,
    pub raw: serde_json::Value,
}

/// 成交记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub trade_id: String,
    pub order_id: String,
    pub price: Amount,
    pub qty: Amount,
    pub quote_qty: Amount,
    pub commission: Amount,
    pub commission_asset: String,
    pub is_buyer: bool,
    pub is_maker: bool,
    /// 仅期货
    pub pnl: Option<Amount>,
    /// 仅期货
    pub position_side: Option<String>,
    pub timestamp: i64,
    pub date_time: DateTime<Utc>,
    pub raw: serde_json::Value,
}

/// K线
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub date: NaiveDate,
    pub date_time: DateTime<Utc>,
    pub open: Amount,
    pub high: Amount,
    pub low: Amount,
    pub close: Amount,
    pub volume: Amount,
    pub raw: serde_json::Value,
}

/// 持仓信息（仅期货）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionInfo {
    pub symbol: String,
    pub amount: Amount,
    pub entry_price: Amount,
    pub mark_price: Amount,
    pub unrealized_pnl: Amount,
    pub liquidation_price: Amount,
    pub leverage: Amount,
    pub margin_type: String,
    pub isolated_margin: Option<Amount>,
    pub position_side: Option<String>,
    pub notional: Amount,
    pub raw: serde_json::Value,
}

// ============= 订单相关 =============

/// 订单方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl FromStr for OrderSide {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "BUY" => Ok(OrderSide::Buy),
            "SELL" => Ok(OrderSide::Sell),
            _ => Err(ExchangeError::validation(
                "side",
                format!("unknown order side: {}", s),
            )),
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 订单类型（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
    Stop,
    StopLoss,
    StopLossLimit,
    StopMarket,
    TakeProfit,
    TakeProfitLimit,
    TakeProfitMarket,
    LimitMaker,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Limit => "LIMIT",
            OrderType::Market => "MARKET",
            OrderType::Stop => "STOP",
            OrderType::StopLoss => "STOP_LOSS",
            OrderType::StopLossLimit => "STOP_LOSS_LIMIT",
            OrderType::StopMarket => "STOP_MARKET",
            OrderType::TakeProfit => "TAKE_PROFIT",
            OrderType::TakeProfitLimit => "TAKE_PROFIT_LIMIT",
            OrderType::TakeProfitMarket => "TAKE_PROFIT_MARKET",
            OrderType::LimitMaker => "LIMIT_MAKER",
        }
    }
}

impl FromStr for OrderType {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "LIMIT" => Ok(OrderType::Limit),
            "MARKET" => Ok(OrderType::Market),
            "STOP" => Ok(OrderType::Stop),
            "STOP_LOSS" => Ok(OrderType::StopLoss),
            "STOP_LOSS_LIMIT" => Ok(OrderType::StopLossLimit),
            "STOP_MARKET" => Ok(OrderType::StopMarket),
            "TAKE_PROFIT" => Ok(OrderType::TakeProfit),
            "TAKE_PROFIT_LIMIT" => Ok(OrderType::TakeProfitLimit),
            "TAKE_PROFIT_MARKET" => Ok(OrderType::TakeProfitMarket),
            "LIMIT_MAKER" => Ok(OrderType::LimitMaker),
            _ => Err(ExchangeError::validation(
                "order_type",
                format!("unknown order type: {}", s),
            )),
        }
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 订单状态（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::PartiallyFilled => "partially_filled",
            OrderStatus::Filled => "filled",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 时间有效性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    GTC, // Good Till Cancel
    IOC, // Immediate Or Cancel
    FOK, // Fill Or Kill
}

impl TimeInForce {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeInForce::GTC => "GTC",
            TimeInForce::IOC => "IOC",
            TimeInForce::FOK => "FOK",
        }
    }
}

/// 保证金模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarginType {
    Crossed,
    Isolated,
}

impl MarginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarginType::Crossed => "CROSSED",
            MarginType::Isolated => "ISOLATED",
        }
    }
}

impl FromStr for MarginType {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "CROSSED" | "CROSS" => Ok(MarginType::Crossed),
            "ISOLATED" => Ok(MarginType::Isolated),
            _ => Err(ExchangeError::validation(
                "margin_type",
                format!("unknown margin type: {}", s),
            )),
        }
    }
}

/// 下单请求
///
/// 数量和价格保持调用方给出的字符串，原样进入签名和请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: String,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub stop_price: Option<String>,
    #[serde(default)]
    pub time_in_force: Option<TimeInForce>,
}

impl OrderRequest {
    pub fn new(
        symbol: &str,
        side: OrderSide,
        order_type: OrderType,
        quantity: impl ToString,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type,
            quantity: quantity.to_string(),
            price: None,
            stop_price: None,
            time_in_force: None,
        }
    }

    /// 从字符串参数构造，方向和类型在这里完成校验
    pub fn parse(symbol: &str, side: &str, order_type: &str, quantity: impl ToString) -> Result<Self> {
        Ok(Self::new(
            symbol,
            side.parse()?,
            order_type.parse()?,
            quantity,
        ))
    }

    pub fn limit(symbol: &str, side: OrderSide, quantity: impl ToString, price: impl ToString) -> Self {
        Self::new(symbol, side, OrderType::Limit, quantity).with_price(price)
    }

    pub fn market(symbol: &str, side: OrderSide, quantity: impl ToString) -> Self {
        Self::new(symbol, side, OrderType::Market, quantity)
    }

    pub fn with_price(mut self, price: impl ToString) -> Self {
        self.price = Some(price.to_string());
        self
    }

    pub fn with_stop_price(mut self, stop_price: impl ToString) -> Self {
        self.stop_price = Some(stop_price.to_string());
        self
    }

    pub fn with_time_in_force(mut self, time_in_force: TimeInForce) -> Self {
        self.time_in_force = Some(time_in_force);
        self
    }
}

/// 历史订单/成交查询的起点
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryQuery {
    /// 起始时间（秒）
    pub from_timestamp: Option<i64>,
    pub from_order_id: Option<String>,
}

impl HistoryQuery {
    pub fn since(from_timestamp: i64) -> Self {
        Self {
            from_timestamp: Some(from_timestamp),
            from_order_id: None,
        }
    }

    pub fn from_order(order_id: &str) -> Self {
        Self {
            from_timestamp: None,
            from_order_id: Some(order_id.to_string()),
        }
    }
}

/// K线查询范围，时间单位为秒
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandleQuery {
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub limit: Option<u32>,
}

impl CandleQuery {
    pub fn with_limit(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn between(start: i64, end: i64) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            limit: None,
        }
    }
}

// ============= K线周期 =============

/// 时间间隔
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    OneMinute,
    ThreeMinutes,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    TwoHours,
    ThreeHours,
    FourHours,
    SixHours,
    EightHours,
    TwelveHours,
    OneDay,
    OneWeek,
    TwoWeeks,
    OneMonth,
}

impl Interval {
    pub fn from_string(s: &str) -> Result<Self> {
        match s {
            "1m" => Ok(Interval::OneMinute),
            "3m" => Ok(Interval::ThreeMinutes),
            "5m" => Ok(Interval::FiveMinutes),
            "15m" => Ok(Interval::FifteenMinutes),
            "30m" => Ok(Interval::ThirtyMinutes),
            "1h" => Ok(Interval::OneHour),
            "2h" => Ok(Interval::TwoHours),
            "3h" => Ok(Interval::ThreeHours),
            "4h" => Ok(Interval::FourHours),
            "6h" => Ok(Interval::SixHours),
            "8h" => Ok(Interval::EightHours),
            "12h" => Ok(Interval::TwelveHours),
            "1d" => Ok(Interval::OneDay),
            "1w" => Ok(Interval::OneWeek),
            "14d" => Ok(Interval::TwoWeeks),
            "1M" => Ok(Interval::OneMonth),
            _ => Err(ExchangeError::validation(
                "interval",
                format!("unknown interval: {}", s),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::ThreeMinutes => "3m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::ThirtyMinutes => "30m",
            Interval::OneHour => "1h",
            Interval::TwoHours => "2h",
            Interval::ThreeHours => "3h",
            Interval::FourHours => "4h",
            Interval::SixHours => "6h",
            Interval::EightHours => "8h",
            Interval::TwelveHours => "12h",
            Interval::OneDay => "1d",
            Interval::OneWeek => "1w",
            Interval::TwoWeeks => "14d",
            Interval::OneMonth => "1M",
        }
    }

    /// 周期对应的分钟数（自然月按30天计）
    pub fn minutes(&self) -> u32 {
        match self {
            Interval::OneMinute => 1,
            Interval::ThreeMinutes => 3,
            Interval::FiveMinutes => 5,
            Interval::FifteenMinutes => 15,
            Interval::ThirtyMinutes => 30,
            Interval::OneHour => 60,
            Interval::TwoHours => 60 * 2,
            Interval::ThreeHours => 60 * 3,
            Interval::FourHours => 60 * 4,
            Interval::SixHours => 60 * 6,
            Interval::EightHours => 60 * 8,
            Interval::TwelveHours => 60 * 12,
            Interval::OneDay => 60 * 24,
            Interval::OneWeek => 60 * 24 * 7,
            Interval::TwoWeeks => 60 * 24 * 14,
            Interval::OneMonth => 60 * 24 * 30,
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
