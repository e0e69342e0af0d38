// 核心模块 - 适配器公共层
pub mod config;
pub mod error;
pub mod exchange;
pub mod http;
pub mod normalizer;
pub mod paginator;
pub mod types;

pub use config::*;
pub use error::*;
pub use exchange::*;
pub use http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, Params, ReqwestTransport, ResponseShape};
pub use paginator::{PageSource, Paginator};
pub use types::{
    Amount, Balance, Candle, CandleQuery, HistoryQuery, Interval, MarginType, MarketType, Order,
    OrderRequest, OrderSide, OrderStatus, OrderType, PositionInfo, SymbolInfo, Ticker,
    TimeInForce, Trade,
};
