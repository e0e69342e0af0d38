use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::core::{
    config::{ApiKeys, ExchangeConfig},
    error::ExchangeError,
    exchange::{BaseExchange, Capabilities, Exchange, Operation},
    http::{HttpTransport, Params, ResponseShape},
    normalizer::{self, de_amount, de_integer, de_opt_amount},
    types::{
        Amount, Balance, Candle, CandleQuery, HistoryQuery, Interval, MarketType, Order, Result,
        SymbolInfo, Ticker,
    },
};
use crate::utils::signature::BybitSigner;
use crate::utils::symbol::{SymbolRegistry, SymbolStyle};

const API_URL: &str = "https://api.bybit.com";

const DEFAULT_QUOTE_ASSETS: &[&str] = &[
    "BTC", "ETH", "EUR", "BRL", "DAI", "PLN", "TRY", "USDE", "USDC", "USDT",
];

/// K线默认条数
const DEFAULT_CANDLE_LIMIT: u32 = 200;
/// 订单历史每页条数（接口上限）
const ORDER_PAGE_LIMIT: u32 = 50;

/// Bybit v5 订单
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitOrder {
    order_id: String,
    symbol: String,
    #[serde(deserialize_with = "de_amount")]
    price: Amount,
    #[serde(default, deserialize_with = "de_opt_amount")]
    avg_price: Option<Amount>,
    #[serde(deserialize_with = "de_amount")]
    qty: Amount,
    #[serde(deserialize_with = "de_amount")]
    cum_exec_qty: Amount,
    #[serde(default, deserialize_with = "de_opt_amount")]
    cum_exec_value: Option<Amount>,
    order_status: String,
    order_type: String,
    side: String,
    #[serde(deserialize_with = "de_integer")]
    created_time: i64,
    #[serde(default, deserialize_with = "de_opt_amount")]
    trigger_price: Option<Amount>,
}

/// Bybit V5 统一接口实现，现货使用 spot 分类，期货使用 linear 分类
pub struct BybitExchange {
    base: BaseExchange,
}

impl BybitExchange {
    pub fn new(
        config: ExchangeConfig,
        api_keys: Option<ApiKeys>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let base = BaseExchange::new(
            "bybit",
            config,
            api_keys,
            transport,
            Box::new(BybitSigner),
            ResponseShape::BybitEnvelope,
            SymbolRegistry::new(
                SymbolStyle::Concatenated { delimiter: None },
                DEFAULT_QUOTE_ASSETS,
            ),
            API_URL,
        );
        Self { base }
    }

    fn category(&self) -> &'static str {
        if self.base.is_futures() {
            "linear"
        } else {
            "spot"
        }
    }

    pub fn interval_to_local(interval: Interval) -> Result<&'static str> {
        match interval {
            Interval::OneMinute => Ok("1"),
            Interval::ThreeMinutes => Ok("3"),
            Interval::FiveMinutes => Ok("5"),
            Interval::FifteenMinutes => Ok("15"),
            Interval::ThirtyMinutes => Ok("30"),
            Interval::OneHour => Ok("60"),
            Interval::TwoHours => Ok("120"),
            Interval::FourHours => Ok("240"),
            Interval::SixHours => Ok("360"),
            Interval::TwelveHours => Ok("720"),
            Interval::OneDay => Ok("D"),
            Interval::OneWeek => Ok("W"),
            Interval::OneMonth => Ok("M"),
            Interval::ThreeHours | Interval::EightHours | Interval::TwoWeeks => {
                Err(ExchangeError::UnsupportedInterval {
                    interval: interval.to_string(),
                    exchange: "bybit".to_string(),
                })
            }
        }
    }

    fn parse_symbol_info(&self, info: &Value) -> Result<SymbolInfo> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct BybitInstrument {
            symbol: String,
            base_coin: String,
            quote_coin: String,
            status: String,
            #[serde(default)]
            price_filter: Value,
            #[serde(default)]
            lot_size_filter: Value,
        }

        let raw: BybitInstrument = normalizer::decode(info, "Bybit交易对")?;

        let tick_size = normalizer::opt_amount(&raw.price_filter, "tickSize")?;
        // 现货给 basePrecision，合约给 qtyStep
        let step_size = match normalizer::opt_amount(&raw.lot_size_filter, "qtyStep")? {
            Some(step) => Some(step),
            None => normalizer::opt_amount(&raw.lot_size_filter, "basePrecision")?,
        };
        let min_order_size = match normalizer::opt_amount(&raw.lot_size_filter, "minOrderAmt")? {
            Some(min) => Some(min),
            None => normalizer::opt_amount(&raw.lot_size_filter, "minNotionalValue")?,
        };

        Ok(SymbolInfo {
            symbol: format!("{}/{}", raw.base_coin, raw.quote_coin),
            original_symbol: raw.symbol,
            base_asset: raw.base_coin,
            quote_asset: raw.quote_coin,
            // Bybit 用 "Trading"，统一为大写
            status: raw.status.to_uppercase(),
            price_precision: tick_size.as_ref().map(|t| normalizer::precision(&t.raw)),
            price_tick_size: tick_size,
            quantity_precision: step_size.as_ref().map(|s| normalizer::precision(&s.raw)),
            quantity_step_size: step_size,
            min_quantity: normalizer::opt_amount(&raw.lot_size_filter, "minOrderQty")?,
            min_order_size,
            raw: info.clone(),
        })
    }

    fn parse_order(&self, value: &Value) -> Result<Order> {
        let raw: BybitOrder = normalizer::decode(value, "Bybit订单")?;
        let symbol = self.base.registry.resolve_global(&raw.symbol)?;
        let (base_asset, quote_asset) = SymbolRegistry::split(&symbol)?;

        // 市价单 price 为 0，用成交均价
        let price = match raw.avg_price {
            Some(avg) if raw.price.is_zero() && !avg.is_zero() => avg,
            _ => raw.price,
        };
        let quote_qty = match raw.cum_exec_value {
            Some(value) => value,
            None => normalizer::product(&price, &raw.cum_exec_qty),
        };
        let status = normalizer::remap_canceled(
            normalizer::order_status(&raw.order_status)?,
            &raw.cum_exec_qty,
        );
        let timestamp = normalizer::normalize_timestamp(raw.created_time)?;

        Ok(Order {
            symbol,
            base_asset,
            quote_asset,
            order_id: raw.order_id,
            price,
            stop_price: raw.trigger_price.filter(|p| !p.is_zero()),
            executed_qty: raw.cum_exec_qty,
            orig_qty: raw.qty,
            quote_qty,
            status,
            order_type: raw.order_type.to_lowercase(),
            side: normalizer::order_side(&raw.side)?,
            timestamp: Some(timestamp),
            date_time: Some(normalizer::date_time(timestamp)?),
            raw: value.clone(),
        })
    }

    /// [startTime, open, high, low, close, volume, turnover]
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
            high: normalizer::amount_from(&fields[2])?,
            low: normalizer::amount_from(&fields[3])?,
            close: normalizer::amount_from(&fields[4])?,
            volume: normalizer::amount_from(&fields[5])?,
            raw: row.clone(),
        })
    }

    fn parse_ticker(&self, item: &Value, timestamp: i64) -> Result<Option<Ticker>> {
        let local = item
            .get("symbol")
            .and_then(|s| s.as_str())
            .ok_or_else(|| ExchangeError::ParseError("行情缺少 symbol 字段".to_string()))?;
        let Some(symbol) = self.base.registry.to_global(local) else {
            log::debug!("跳过无法识别的交易对: {}", local);
            return Ok(None);
        };

        Ok(Some(Ticker {
            symbol,
            price: normalizer::amount(item, "lastPrice")?,
            timestamp,
            date_time: normalizer::date_time(timestamp)?,
            raw: item.clone(),
        }))
    }

    async fn fetch_tickers(&self, params: Params) -> Result<Vec<Ticker>> {
        let result = self.base.public_get("/v5/market/tickers", params).await?;
        let timestamp = response_time(&result)?;

        let mut tickers = Vec::new();
        for item in result_list(&result)? {
            if let Some(ticker) = self.parse_ticker(item, timestamp)? {
                tickers.push(ticker);
            }
        }
        Ok(tickers)
    }
}

/// 结果中的 list 数组
fn result_list(result: &Value) -> Result<&Vec<Value>> {
    result
        .get("list")
        .and_then(|l| l.as_array())
        .ok_or_else(|| ExchangeError::ParseError(format!("Bybit 结果缺少 list: {}", result)))
}

/// 外层 time 字段，缺失时取本地时间
fn response_time(result: &Value) -> Result<i64> {
    match result.get("time") {
        Some(_) => normalizer::timestamp(result, "time"),
        None => Ok(normalizer::now_ms()),
    }
}

/// 下一页游标，空字符串表示没有更多
fn next_cursor(result: &Value) -> Option<String> {
    result
        .get("nextPageCursor")
        .and_then(|c| c.as_str())
        .filter(|c| !c.is_empty())
        .map(|c| c.to_string())
}

#[async_trait]
impl Exchange for BybitExchange {
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
            Operation::Balances,
            Operation::Tickers,
            Operation::Ticker,
            Operation::Orders,
            Operation::OpenOrders,
            Operation::Candles,
            Operation::ServerTime,
        ])
    }

    fn registry(&self) -> &SymbolRegistry {
        &self.base.registry
    }

    async fn get_exchange_info(&self) -> Result<Vec<SymbolInfo>> {
        let mut params = Params::new()
            .with("category", self.category())
            .with("limit", 1000);

        let mut result = Vec::new();
        let mut quote_assets: Vec<String> = Vec::new();
        loop {
            let response = self
                .base
                .public_get("/v5/market/instruments-info", params.clone())
                .await?;
            for item in result_list(&response)? {
                let info = self.parse_symbol_info(item)?;
                if !quote_assets.contains(&info.quote_asset) {
                    quote_assets.push(info.quote_asset.clone());
                }
                self.base.registry.insert_info(info.clone());
                result.push(info);
            }
            match next_cursor(&response) {
                Some(cursor) => params.insert("cursor", cursor),
                None => break,
            }
        }

        self.base.registry.set_quote_assets(quote_assets);
        log::info!("✅ Bybit {} 加载了 {} 个交易对", self.category(), result.len());

        Ok(result)
    }

    async fn get_balances(&self) -> Result<Vec<Balance>> {
        let account_type = if self.base.is_futures() {
            "CONTRACT"
        } else {
            "SPOT"
        };
        let params = Params::new().with("accountType", account_type);
        let result = self
            .base
            .signed_get("/v5/account/wallet-balance", params)
            .await?;
        let timestamp = response_time(&result)?;

        let mut balances = Vec::new();
        for account in result_list(&result)? {
            let Some(coins) = account.get("coin").and_then(|c| c.as_array()) else {
                continue;
            };
            for coin in coins {
                let asset = coin
                    .get("coin")
                    .and_then(|c| c.as_str())
                    .ok_or_else(|| ExchangeError::ParseError("余额缺少 coin 字段".to_string()))?;
                let total = normalizer::amount(coin, "walletBalance")?;
                let locked = normalizer::opt_amount(coin, "locked")?.unwrap_or_else(Amount::zero);
                balances.push(Balance {
                    asset: asset.to_string(),
                    free: Amount::derived(total.value - locked.value),
                    locked,
                    total,
                    timestamp,
                    date_time: normalizer::date_time(timestamp)?,
                    raw: coin.clone(),
                });
            }
        }
        Ok(balances)
    }

    async fn get_tickers(&self) -> Result<Vec<Ticker>> {
        self.fetch_tickers(Params::new().with("category", self.category()))
            .await
    }

    async fn get_ticker(&self, symbol: &str) -> Result<Ticker> {
        let params = Params::new()
            .with("category", self.category())
            .with("symbol", self.base.local_symbol(symbol)?);
        self.fetch_tickers(params)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ExchangeError::UnresolvedSymbol(symbol.to_string()))
    }

    async fn get_orders(&self, symbol: &str, query: &HistoryQuery) -> Result<Vec<Order>> {
        if query.from_order_id.is_some() {
            return Err(ExchangeError::validation(
                "from_order_id",
                "Bybit 订单历史只支持按时间查询",
            ));
        }

        let mut params = Params::new()
            .with("category", self.category())
            .with("symbol", self.base.local_symbol(symbol)?)
            .with("limit", ORDER_PAGE_LIMIT);
        if let Some(from_timestamp) = query.from_timestamp {
            params.insert(
                "startTime",
                normalizer::seconds_to_ms("from_timestamp", from_timestamp)?,
            );
        }

        let mut orders = Vec::new();
        loop {
            let result = self
                .base
                .signed_get("/v5/order/history", params.clone())
                .await?;
            for item in result_list(&result)? {
                orders.push(self.parse_order(item)?);
            }
            match next_cursor(&result) {
                Some(cursor) => {
                    log::debug!("📄 Bybit 订单历史下一页: {}", cursor);
                    params.insert("cursor", cursor);
                }
                None => break,
            }
        }
        Ok(orders)
    }

    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<Order>> {
        let params = Params::new()
            .with("category", self.category())
            .with("symbol", self.base.local_symbol(symbol)?);
        let result = self.base.signed_get("/v5/order/realtime", params).await?;

        result_list(&result)?
            .iter()
            .map(|item| self.parse_order(item))
            .collect()
    }

    async fn get_candles(
        &self,
        symbol: &str,
        interval: Interval,
        query: &CandleQuery,
    ) -> Result<Vec<Candle>> {
        let mut params = Params::new()
            .with("category", self.category())
            .with("symbol", self.base.local_symbol(symbol)?)
            .with("interval", Self::interval_to_local(interval)?)
            .with("limit", query.limit.unwrap_or(DEFAULT_CANDLE_LIMIT));
        if let Some(start) = query.start {
            params.insert("start", normalizer::seconds_to_ms("start", start)?);
        }
        if let Some(end) = query.end {
            params.insert("end", normalizer::seconds_to_ms("end", end)?);
        }

        let result = self.base.public_get("/v5/market/kline", params).await?;
        // 接口按时间倒序返回
        let mut candles = result_list(&result)?
            .iter()
            .map(Self::parse_candle)
            .collect::<Result<Vec<_>>>()?;
        candles.reverse();
        Ok(candles)
    }

    async fn get_server_time(&self) -> Result<i64> {
        let result = self.base.public_get("/v5/market/time", Params::new()).await?;
        if let Some(nanos) = result.get("timeNano") {
            return Ok(normalizer::integer_from(nanos)? / 1_000_000);
        }
        normalizer::timestamp(&result, "timeSecond")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ExchangeKind;
    use crate::core::http::mock::MockTransport;
    use crate::core::types::{OrderRequest, OrderSide, OrderStatus};
    use serde_json::json;

    fn exchange(futures: bool, transport: Arc<MockTransport>) -> BybitExchange {
        BybitExchange::new(
            ExchangeConfig::new(ExchangeKind::Bybit, futures),
            Some(ApiKeys::new("key", "secret")),
            transport,
        )
    }

    fn envelope(result: Value) -> Value {
        json!({
            "retCode": 0,
            "retMsg": "OK",
            "result": result,
            "retExtInfo": {},
            "time": 1700000000000i64
        })
    }

    #[tokio::test]
    async fn test_exchange_info_spot_filters() {
        let transport = MockTransport::new();
        transport.push_json(envelope(json!({
            "category": "spot",
            "list": [{
                "symbol": "BTCUSDT",
                "baseCoin": "BTC",
                "quoteCoin": "USDT",
                "status": "Trading",
                "lotSizeFilter": {
                    "basePrecision": "0.000001",
                    "quotePrecision": "0.00000001",
                    "minOrderQty": "0.000048",
                    "maxOrderQty": "71.73956243",
                    "minOrderAmt": "1"
                },
                "priceFilter": {"tickSize": "0.01"}
            }],
            "nextPageCursor": ""
        })));
        let exchange = exchange(false, transport.clone());

        let info = exchange.get_exchange_info().await.unwrap();
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].symbol, "BTC/USDT");
        assert!(info[0].is_trading());
        assert_eq!(info[0].price_precision, Some(2));
        assert_eq!(info[0].quantity_precision, Some(6));
        assert_eq!(info[0].min_order_size.as_ref().unwrap().raw, "1");
        assert_eq!(
            transport.requests()[0].url(),
            "https://api.bybit.com/v5/market/instruments-info?category=spot&limit=1000"
        );
    }

    #[tokio::test]
    async fn test_balances_free_is_total_minus_locked() {
        let transport = MockTransport::new();
        transport.push_json(envelope(json!({
            "list": [{
                "accountType": "SPOT",
                "coin": [{"coin": "USDT", "walletBalance": "100", "locked": "25.5"}]
            }]
        })));
        let exchange = exchange(false, transport.clone());

        let balances = exchange.get_balances().await.unwrap();
        assert_eq!(balances[0].asset, "USDT");
        assert_eq!(balances[0].free.raw, "74.50000000");
        assert_eq!(balances[0].timestamp, 1700000000000);

        let request = &transport.requests()[0];
        assert_eq!(request.header("X-BAPI-API-KEY"), Some("key"));
        assert_eq!(request.header("X-BAPI-RECV-WINDOW"), Some("5000"));
        assert_eq!(request.params.query_string(), "accountType=SPOT");
    }

    #[tokio::test]
    async fn test_business_error_maps_to_api_error() {
        let transport = MockTransport::new();
        transport.push_json(json!({"retCode": 10001, "retMsg": "params error", "result": {}}));
        let err = exchange(false, transport).get_tickers().await.unwrap_err();
        match err {
            ExchangeError::ApiError { code, message } => {
                assert_eq!(code, 10001);
                assert_eq!(message, "params error");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_candles_are_ascending() {
        let transport = MockTransport::new();
        transport.push_json(envelope(json!({
            "symbol": "BTCUSDT",
            "category": "spot",
            "list": [
                ["1700003600000", "2", "3", "1", "2.5", "10", "25"],
                ["1700000000000", "1", "2", "0.5", "2", "20", "30"]
            ]
        })));
        let exchange = exchange(false, transport.clone());

        let candles = exchange
            .get_candles("BTC/USDT", Interval::OneHour, &CandleQuery::between(1700000000, 1700003600))
            .await
            .unwrap();
        assert_eq!(candles[0].timestamp, 1700000000000);
        assert_eq!(candles[1].close.raw, "2.5");
        assert_eq!(
            transport.requests()[0].params.query_string(),
            "category=spot&symbol=BTCUSDT&interval=60&limit=200&start=1700000000000&end=1700003600000"
        );

        assert!(matches!(
            exchange
                .get_candles("BTC/USDT", Interval::EightHours, &CandleQuery::default())
                .await,
            Err(ExchangeError::UnsupportedInterval { .. })
        ));
    }

    #[tokio::test]
    async fn test_order_history_follows_cursor() {
        let order = |id: &str, status: &str, executed: &str| {
            json!({
                "orderId": id, "symbol": "ETHUSDT", "price": "0", "avgPrice": "2000",
                "qty": "1", "cumExecQty": executed, "cumExecValue": "",
                "orderStatus": status, "orderType": "Market", "side": "Sell",
                "createdTime": "1700000000000", "triggerPrice": "0.00"
            })
        };
        let transport = MockTransport::new();
        transport.push_json(envelope(json!({
            "list": [order("a1", "Filled", "1")],
            "nextPageCursor": "page2"
        })));
        transport.push_json(envelope(json!({
            "list": [order("a2", "PartiallyFilledCanceled", "0.4")],
            "nextPageCursor": ""
        })));
        let exchange = exchange(true, transport.clone());

        let orders = exchange
            .get_orders("ETH/USDT", &HistoryQuery::since(1700000000))
            .await
            .unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].price.raw, "2000");
        assert_eq!(orders[0].quote_qty.raw, "2000.00000000");
        assert_eq!(orders[0].side, OrderSide::Sell);
        assert!(orders[0].stop_price.is_none());
        assert_eq!(orders[1].status, OrderStatus::PartiallyFilled);

        let requests = transport.requests();
        assert_eq!(requests[0].params.get("category"), Some(&json!("linear")));
        assert_eq!(requests[0].params.get("startTime"), Some(&json!(1700000000000i64)));
        assert_eq!(requests[1].params.get("cursor"), Some(&json!("page2")));
    }

    #[tokio::test]
    async fn test_server_time_from_nanos() {
        let transport = MockTransport::new();
        transport.push_json(envelope(json!({
            "timeSecond": "1688639403",
            "timeNano": "1688639403423213947"
        })));
        let time = exchange(false, transport).get_server_time().await.unwrap();
        assert_eq!(time, 1688639403423);
    }

    #[tokio::test]
    async fn test_unsupported_operations_issue_no_request() {
        let transport = MockTransport::new();
        let exchange = exchange(false, transport.clone());
        assert!(!exchange.capabilities().supports(Operation::CreateOrder));

        let request = OrderRequest::market("BTC/USDT", OrderSide::Buy, "1");
        assert!(matches!(
            exchange.create_order(&request).await,
            Err(ExchangeError::NotSupported(_))
        ));
        assert!(matches!(
            exchange.get_positions_info().await,
            Err(ExchangeError::NotSupported(_))
        ));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_out_of_range_times() {
        let transport = MockTransport::new();
        let exchange = exchange(false, transport.clone());

        let err = exchange
            .get_candles("BTC/USDT", Interval::OneHour, &CandleQuery::between(i64::MIN, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::ValidationError { ref field, .. } if field == "start"));

        let err = exchange
            .get_orders("BTC/USDT", &HistoryQuery::since(i64::MAX))
            .await
            .unwrap_err();
        assert!(
            matches!(err, ExchangeError::ValidationError { ref field, .. } if field == "from_timestamp")
        );
        assert_eq!(transport.request_count(), 0);

        transport.push_json(envelope(json!({
            "symbol": "BTCUSDT",
            "category": "spot",
            "list": [["-9223372036854775807", "1", "2", "0.5", "2", "20", "30"]]
        })));
        assert!(matches!(
            exchange
                .get_candles("BTC/USDT", Interval::OneHour, &CandleQuery::default())
                .await,
            Err(ExchangeError::ParseError(_))
        ));
    }
}
