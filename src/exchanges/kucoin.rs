use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::core::{
    config::{ApiKeys, ExchangeConfig},
    error::ExchangeError,
    exchange::{require, BaseExchange, Capabilities, Exchange, Operation},
    http::{HttpTransport, Params, ResponseShape},
    normalizer::{self, de_amount, de_integer, de_opt_amount},
    types::{
        Amount, Balance, Candle, CandleQuery, HistoryQuery, Interval, MarketType, Order,
        OrderStatus, Result, SymbolInfo, Ticker,
    },
};
use crate::utils::signature::KucoinSigner;
use crate::utils::symbol::{SymbolRegistry, SymbolStyle};

const API_URL: &str = "https://openapi-v2.kucoin.com";

/// KuCoin 订单
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KucoinOrder {
    id: String,
    symbol: String,
    #[serde(rename = "type")]
    order_type: String,
    side: String,
    #[serde(deserialize_with = "de_amount")]
    price: Amount,
    #[serde(deserialize_with = "de_amount")]
    size: Amount,
    #[serde(deserialize_with = "de_amount")]
    deal_funds: Amount,
    #[serde(deserialize_with = "de_amount")]
    deal_size: Amount,
    #[serde(default, deserialize_with = "de_opt_amount")]
    stop_price: Option<Amount>,
    is_active: bool,
    #[serde(default)]
    cancel_exist: bool,
    #[serde(deserialize_with = "de_integer")]
    created_at: i64,
}

impl KucoinOrder {
    fn is_market(&self) -> bool {
        matches!(self.order_type.as_str(), "market" | "market_stop")
    }

    /// 接口没有直接的状态字段，由活跃标志和成交量推断
    fn status(&self) -> OrderStatus {
        if self.is_active {
            OrderStatus::New
        } else if self.deal_funds.is_zero() && self.deal_size.is_zero() && self.cancel_exist {
            OrderStatus::Canceled
        } else if self.is_market() || self.size.value == self.deal_size.value {
            OrderStatus::Filled
        } else {
            // 已结束但未完全成交，按成交量区分撤单和部分成交
            normalizer::remap_canceled(OrderStatus::Canceled, &self.deal_size)
        }
    }
}

/// KuCoin 现货实现，期货接口未接入
pub struct KucoinExchange {
    base: BaseExchange,
}

impl KucoinExchange {
    pub fn new(
        config: ExchangeConfig,
        api_keys: Option<ApiKeys>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let base = BaseExchange::new(
            "kucoin",
            config,
            api_keys,
            transport,
            Box::new(KucoinSigner),
            ResponseShape::KucoinEnvelope,
            SymbolRegistry::new(SymbolStyle::Separated('-'), &[]),
            API_URL,
        );
        Self { base }
    }

    fn require_spot(&self, operation: &str) -> Result<()> {
        if self.base.is_futures() {
            Err(self.base.unsupported(operation))
        } else {
            Ok(())
        }
    }

    pub fn interval_to_local(interval: Interval) -> Result<&'static str> {
        match interval {
            Interval::OneMinute => Ok("1min"),
            Interval::ThreeMinutes => Ok("3min"),
            Interval::FiveMinutes => Ok("5min"),
            Interval::FifteenMinutes => Ok("15min"),
            Interval::ThirtyMinutes => Ok("30min"),
            Interval::OneHour => Ok("1hour"),
            Interval::TwoHours => Ok("2hour"),
            Interval::FourHours => Ok("4hour"),
            Interval::SixHours => Ok("6hour"),
            Interval::EightHours => Ok("8hour"),
            Interval::TwelveHours => Ok("12hour"),
            Interval::OneDay => Ok("1day"),
            Interval::OneWeek => Ok("1week"),
            Interval::ThreeHours | Interval::TwoWeeks | Interval::OneMonth => {
                Err(ExchangeError::UnsupportedInterval {
                    interval: interval.to_string(),
                    exchange: "kucoin".to_string(),
                })
            }
        }
    }

    fn parse_symbol_info(&self, info: &Value) -> Result<SymbolInfo> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct KucoinSymbol {
            symbol: String,
            base_currency: String,
            quote_currency: String,
            enable_trading: bool,
            #[serde(deserialize_with = "de_amount")]
            price_increment: Amount,
            #[serde(deserialize_with = "de_amount")]
            base_increment: Amount,
            #[serde(deserialize_with = "de_amount")]
            base_min_size: Amount,
            #[serde(default, deserialize_with = "de_opt_amount")]
            min_funds: Option<Amount>,
        }

        let raw: KucoinSymbol = normalizer::decode(info, "KuCoin交易对")?;
        let status = if raw.enable_trading {
            "ENABLED"
        } else {
            "DISABLED"
        };

        Ok(SymbolInfo {
            symbol: format!("{}/{}", raw.base_currency, raw.quote_currency),
            original_symbol: raw.symbol,
            base_asset: raw.base_currency,
            quote_asset: raw.quote_currency,
            status: status.to_string(),
            price_precision: Some(normalizer::precision(&raw.price_increment.raw)),
            price_tick_size: Some(raw.price_increment),
            quantity_precision: Some(normalizer::precision(&raw.base_increment.raw)),
            quantity_step_size: Some(raw.base_increment),
            min_quantity: Some(raw.base_min_size),
            min_order_size: raw.min_funds,
            raw: info.clone(),
        })
    }

    fn parse_order(&self, value: &Value) -> Result<Order> {
        let raw: KucoinOrder = normalizer::decode(value, "KuCoin订单")?;
        let symbol = self.base.registry.resolve_global(&raw.symbol)?;
        let (base_asset, quote_asset) = SymbolRegistry::split(&symbol)?;
        let status = raw.status();

        // 市价单没有委托价和委托量，用成交额/成交量代替
        let (price, orig_qty) = if raw.is_market() {
            let price = if raw.deal_size.is_zero() {
                Amount::zero()
            } else {
                Amount::derived(raw.deal_funds.value / raw.deal_size.value)
            };
            (price, raw.deal_size.clone())
        } else {
            (raw.price, raw.size)
        };
        let timestamp = normalizer::normalize_timestamp(raw.created_at)?;

        Ok(Order {
            symbol,
            base_asset,
            quote_asset,
            order_id: raw.id,
            price,
            stop_price: raw.stop_price.filter(|p| !p.is_zero()),
            executed_qty: raw.deal_size,
            orig_qty,
            quote_qty: raw.deal_funds,
            status,
            order_type: raw.order_type.to_lowercase(),
            side: normalizer::order_side(&raw.side)?,
            timestamp: Some(timestamp),
            date_time: Some(normalizer::date_time(timestamp)?),
            raw: value.clone(),
        })
    }

    /// [time, open, close, high, low, volume, turnover]，时间单位为秒
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

    /// 按 totalPage 拉取所有页，结果按时间升序
    async fn fetch_orders(&self, mut params: Params) -> Result<Vec<Order>> {
        let response = self.base.signed_get("/api/v1/orders", params.clone()).await?;
        let total_pages = response
            .get("totalPage")
            .map(normalizer::integer_from)
            .transpose()?
            .unwrap_or(1);

        let mut items = page_items(&response)?;
        for page in 2..=total_pages {
            params.insert("currentPage", page);
            log::debug!("📄 KuCoin 订单第{}/{}页", page, total_pages);
            let chunk = self.base.signed_get("/api/v1/orders", params.clone()).await?;
            items.extend(page_items(&chunk)?);
        }

        // 接口按时间倒序返回
        items.reverse();
        items.iter().map(|item| self.parse_order(item)).collect()
    }
}

fn page_items(response: &Value) -> Result<Vec<Value>> {
    match response.get("items") {
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(other) => Err(ExchangeError::ParseError(format!(
            "KuCoin 分页数据 items 不是数组: {}",
            other
        ))),
    }
}

fn as_array<'a>(value: &'a Value, what: &str) -> Result<&'a Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| ExchangeError::ParseError(format!("{} 不是数组: {}", what, value)))
}

#[async_trait]
impl Exchange for KucoinExchange {
    fn name(&self) -> &str {
        self.base.name
    }

    fn market_type(&self) -> MarketType {
        self.base.market_type()
    }

    fn capabilities(&self) -> Capabilities {
        if self.base.is_futures() {
            return Capabilities::default();
        }
        Capabilities::new(&[
            Operation::ExchangeInfo,
            Operation::Symbols,
            Operation::Balances,
            Operation::Tickers,
            Operation::Ticker,
            Operation::GetOrder,
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
        self.require_spot("get_exchange_info")?;
        let response = self.base.public_get("/api/v2/symbols", Params::new()).await?;

        let mut result = Vec::new();
        for item in as_array(&response, "symbols")? {
            let info = self.parse_symbol_info(item)?;
            self.base.registry.insert_info(info.clone());
            result.push(info);
        }
        log::info!("✅ KuCoin 加载了 {} 个交易对", result.len());
        Ok(result)
    }

    async fn get_balances(&self) -> Result<Vec<Balance>> {
        self.require_spot("get_balances")?;
        let response = self.base.signed_get("/api/v1/accounts", Params::new()).await?;
        let timestamp = normalizer::now_ms();

        let mut balances = Vec::new();
        for item in as_array(&response, "accounts")? {
            // 只统计交易账户
            if item.get("type").and_then(|t| t.as_str()) != Some("trade") {
                continue;
            }
            let asset = item
                .get("currency")
                .and_then(|c| c.as_str())
                .ok_or_else(|| ExchangeError::ParseError("账户缺少 currency 字段".to_string()))?;
            balances.push(Balance {
                asset: asset.to_string(),
                free: normalizer::amount(item, "available")?,
                locked: normalizer::amount(item, "holds")?,
                total: normalizer::amount(item, "balance")?,
                timestamp,
                date_time: normalizer::date_time(timestamp)?,
                raw: item.clone(),
            });
        }
        Ok(balances)
    }

    async fn get_tickers(&self) -> Result<Vec<Ticker>> {
        self.require_spot("get_tickers")?;
        let response = self
            .base
            .public_get("/api/v1/market/allTickers", Params::new())
            .await?;
        let timestamp = normalizer::timestamp(&response, "time")?;
        let items = response
            .get("ticker")
            .ok_or_else(|| ExchangeError::ParseError("allTickers 缺少 ticker".to_string()))?;

        let mut tickers = Vec::new();
        for item in as_array(items, "ticker")? {
            // 无成交的交易对 last 为 null
            let Some(price) = normalizer::opt_amount(item, "last")? else {
                continue;
            };
            let Some(local) = item.get("symbol").and_then(|s| s.as_str()) else {
                continue;
            };
            let Some(symbol) = self.base.registry.to_global(local) else {
                log::debug!("跳过无法识别的交易对: {}", local);
                continue;
            };
            tickers.push(Ticker {
                symbol,
                price,
                timestamp,
                date_time: normalizer::date_time(timestamp)?,
                raw: item.clone(),
            });
        }
        Ok(tickers)
    }

    async fn get_ticker(&self, symbol: &str) -> Result<Ticker> {
        self.require_spot("get_ticker")?;
        let params = Params::new().with("symbol", self.base.local_symbol(symbol)?);
        let response = self
            .base
            .public_get("/api/v1/market/orderbook/level1", params)
            .await?;
        if response.is_null() {
            return Err(ExchangeError::UnresolvedSymbol(symbol.to_string()));
        }
        let timestamp = normalizer::timestamp(&response, "time")?;

        Ok(Ticker {
            symbol: symbol.to_string(),
            price: normalizer::amount(&response, "price")?,
            timestamp,
            date_time: normalizer::date_time(timestamp)?,
            raw: response,
        })
    }

    async fn get_order(&self, symbol: &str, order_id: &str) -> Result<Order> {
        self.require_spot("get_order")?;
        require("symbol", symbol)?;
        require("order_id", order_id)?;
        let endpoint = format!("/api/v1/orders/{}", order_id);
        let response = self.base.signed_get(&endpoint, Params::new()).await?;
        let order = self.parse_order(&response)?;
        if order.symbol != symbol {
            return Err(ExchangeError::validation(
                "symbol",
                format!("订单 {} 属于 {}，而不是 {}", order_id, order.symbol, symbol),
            ));
        }
        Ok(order)
    }

    async fn get_orders(&self, symbol: &str, query: &HistoryQuery) -> Result<Vec<Order>> {
        self.require_spot("get_orders")?;
        if query.from_order_id.is_some() {
            return Err(ExchangeError::validation(
                "from_order_id",
                "KuCoin 订单历史只支持按时间查询",
            ));
        }

        let mut params = Params::new().with("symbol", self.base.local_symbol(symbol)?);
        if let Some(from_timestamp) = query.from_timestamp {
            params.insert(
                "startAt",
                normalizer::normalize_timestamp(from_timestamp)
                    .map_err(|e| ExchangeError::validation("from_timestamp", e.to_string()))?,
            );
        }
        self.fetch_orders(params).await
    }

    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<Order>> {
        self.require_spot("get_open_orders")?;
        let params = Params::new()
            .with("symbol", self.base.local_symbol(symbol)?)
            .with("status", "active");
        self.fetch_orders(params).await
    }

    async fn get_candles(
        &self,
        symbol: &str,
        interval: Interval,
        query: &CandleQuery,
    ) -> Result<Vec<Candle>> {
        self.require_spot("get_candles")?;
        let mut params = Params::new()
            .with("type", Self::interval_to_local(interval)?)
            .with("symbol", self.base.local_symbol(symbol)?);
        if let Some(start) = query.start {
            params.insert("startAt", start);
        }
        if let Some(end) = query.end {
            params.insert("endAt", end);
        }

        let response = self
            .base
            .public_get("/api/v1/market/candles", params)
            .await?;
        let mut candles = as_array(&response, "candles")?
            .iter()
            .map(Self::parse_candle)
            .collect::<Result<Vec<_>>>()?;
        candles.reverse();

        // 接口不支持 limit，保留最近的 N 根
        if let Some(limit) = query.limit {
            let limit = limit as usize;
            if candles.len() > limit {
                candles.drain(..candles.len() - limit);
            }
        }
        Ok(candles)
    }

    async fn get_server_time(&self) -> Result<i64> {
        self.require_spot("get_server_time")?;
        let response = self
            .base
            .public_get("/api/v1/timestamp", Params::new())
            .await?;
        normalizer::integer_from(&response).and_then(normalizer::normalize_timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ExchangeKind;
    use crate::core::types::OrderSide;
    use crate::core::http::mock::MockTransport;
    use serde_json::json;

    fn exchange(futures: bool, transport: Arc<MockTransport>) -> KucoinExchange {
        KucoinExchange::new(
            ExchangeConfig::new(ExchangeKind::Kucoin, futures),
            Some(ApiKeys::new("key", "secret").with_passphrase("pass")),
            transport,
        )
    }

    fn ok(data: Value) -> Value {
        json!({"code": "200000", "data": data})
    }

    fn raw_order(id: &str, order_type: &str, size: &str, deal_size: &str, deal_funds: &str) -> Value {
        json!({
            "id": id, "symbol": "BTC-USDT", "type": order_type, "side": "buy",
            "price": "0", "size": size, "funds": "0", "dealFunds": deal_funds,
            "dealSize": deal_size, "stopPrice": "0", "isActive": false,
            "cancelExist": false, "createdAt": 1700000000000i64
        })
    }

    #[tokio::test]
    async fn test_exchange_info() {
        let transport = MockTransport::new();
        transport.push_json(ok(json!([{
            "symbol": "XLM-USDT", "name": "XLM-USDT", "baseCurrency": "XLM",
            "quoteCurrency": "USDT", "baseMinSize": "0.1", "quoteMinSize": "0.01",
            "baseIncrement": "0.0001", "quoteIncrement": "0.000001",
            "priceIncrement": "0.000001", "minFunds": "0.1", "enableTrading": true
        }])));
        let exchange = exchange(false, transport);

        let info = exchange.get_exchange_info().await.unwrap();
        assert_eq!(info[0].symbol, "XLM/USDT");
        assert_eq!(info[0].status, "ENABLED");
        assert!(info[0].is_trading());
        assert_eq!(info[0].price_precision, Some(6));
        assert_eq!(info[0].quantity_precision, Some(4));
        assert_eq!(exchange.registry().to_local("XLM/USDT"), "XLM-USDT");
    }

    #[tokio::test]
    async fn test_market_order_price_from_deal_funds() {
        let transport = MockTransport::new();
        transport.push_json(ok(raw_order("m1", "market", "0", "0.5", "15000")));
        let exchange = exchange(false, transport.clone());

        let order = exchange.get_order("BTC/USDT", "m1").await.unwrap();
        assert_eq!(order.symbol, "BTC/USDT");
        assert_eq!(order.price.raw, "30000.00000000");
        assert_eq!(order.orig_qty.raw, "0.5");
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.side, OrderSide::Buy);
        assert!(order.stop_price.is_none());

        let request = &transport.requests()[0];
        assert_eq!(request.url(), "https://openapi-v2.kucoin.com/api/v1/orders/m1");
        assert_eq!(request.header("KC-API-KEY-VERSION"), Some("2"));
        assert!(request.header("KC-API-PASSPHRASE").is_some());
    }

    #[test]
    fn test_order_status_inference() {
        let status = |value: Value| -> OrderStatus {
            let raw: KucoinOrder = normalizer::decode(&value, "test").unwrap();
            raw.status()
        };

        let mut active = raw_order("1", "limit", "1", "0", "0");
        active["isActive"] = json!(true);
        assert_eq!(status(active), OrderStatus::New);

        let mut canceled = raw_order("2", "limit", "1", "0", "0");
        canceled["cancelExist"] = json!(true);
        assert_eq!(status(canceled), OrderStatus::Canceled);

        assert_eq!(status(raw_order("3", "limit", "1", "1", "10")), OrderStatus::Filled);
        assert_eq!(
            status(raw_order("4", "limit", "1", "0.4", "4")),
            OrderStatus::PartiallyFilled
        );

        // 数量写法不同但数值相等
        assert_eq!(status(raw_order("5", "limit", "1", "1.0", "10")), OrderStatus::Filled);
        // 已结束、无成交、也没有撤单标记
        assert_eq!(status(raw_order("6", "limit", "1", "0", "0")), OrderStatus::Canceled);
    }

    #[tokio::test]
    async fn test_get_order_rejects_other_symbol() {
        let transport = MockTransport::new();
        transport.push_json(ok(raw_order("m1", "market", "0", "0.5", "15000")));
        let exchange = exchange(false, transport);

        let err = exchange.get_order("ETH/USDT", "m1").await.unwrap_err();
        match err {
            ExchangeError::ValidationError { field, .. } => assert_eq!(field, "symbol"),
            other => panic!("期望 ValidationError，实际: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_orders_load_all_pages_ascending() {
        let transport = MockTransport::new();
        transport.push_json(ok(json!({
            "currentPage": 1, "pageSize": 1, "totalNum": 2, "totalPage": 2,
            "items": [raw_order("new", "limit", "1", "1", "10")]
        })));
        transport.push_json(ok(json!({
            "currentPage": 2, "pageSize": 1, "totalNum": 2, "totalPage": 2,
            "items": [raw_order("old", "limit", "1", "1", "10")]
        })));
        let exchange = exchange(false, transport.clone());

        let orders = exchange
            .get_orders("BTC/USDT", &HistoryQuery::since(1700000000))
            .await
            .unwrap();
        let ids: Vec<&str> = orders.iter().map(|o| o.order_id.as_str()).collect();
        assert_eq!(ids, vec!["old", "new"]);

        let requests = transport.requests();
        assert_eq!(requests[0].params.get("startAt"), Some(&json!(1700000000000i64)));
        assert_eq!(requests[1].params.get("currentPage"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_envelope_error_code() {
        let transport = MockTransport::new();
        transport.push_json(json!({"code": "400100", "msg": "Invalid symbol"}));
        let err = exchange(false, transport)
            .get_ticker("FOO/BAR")
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::ApiError { code: 400100, .. }));
    }

    #[tokio::test]
    async fn test_missing_passphrase_is_auth_error() {
        let transport = MockTransport::new();
        let exchange = KucoinExchange::new(
            ExchangeConfig::new(ExchangeKind::Kucoin, false),
            Some(ApiKeys::new("key", "secret")),
            transport.clone(),
        );
        assert!(matches!(
            exchange.get_balances().await,
            Err(ExchangeError::AuthError(_))
        ));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_futures_not_supported() {
        let transport = MockTransport::new();
        let exchange = exchange(true, transport.clone());
        assert!(exchange.capabilities().operations().is_empty());
        assert!(matches!(
            exchange.get_exchange_info().await,
            Err(ExchangeError::NotSupported(_))
        ));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_tickers_skip_pairs_without_trades() {
        let transport = MockTransport::new();
        transport.push_json(ok(json!({
            "time": 1700000000000i64,
            "ticker": [
                {"symbol": "BTC-USDT", "last": "30000.1"},
                {"symbol": "NEW-USDT", "last": null}
            ]
        })));
        let tickers = exchange(false, transport).get_tickers().await.unwrap();
        assert_eq!(tickers.len(), 1);
        assert_eq!(tickers[0].symbol, "BTC/USDT");
        assert_eq!(tickers[0].timestamp, 1700000000000);
    }

    #[tokio::test]
    async fn test_candles_ascending_and_limited() {
        let transport = MockTransport::new();
        transport.push_json(ok(json!([
            ["1700000120", "3", "3.5", "4", "2", "10", "30"],
            ["1700000060", "2", "3", "3", "1", "10", "20"],
            ["1700000000", "1", "2", "2", "0.5", "10", "10"]
        ])));
        let exchange = exchange(false, transport.clone());

        let candles = exchange
            .get_candles("BTC/USDT", Interval::OneMinute, &CandleQuery::with_limit(2))
            .await
            .unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp, 1700000060000);
        assert_eq!(candles[1].close.raw, "3.5");
        assert_eq!(candles[1].high.raw, "4");
        assert_eq!(
            transport.requests()[0].params.query_string(),
            "type=1min&symbol=BTC-USDT"
        );

        assert!(matches!(
            exchange
                .get_candles("BTC/USDT", Interval::OneMonth, &CandleQuery::default())
                .await,
            Err(ExchangeError::UnsupportedInterval { .. })
        ));
    }

    #[tokio::test]
    async fn test_out_of_range_times() {
        let transport = MockTransport::new();
        let exchange = exchange(false, transport.clone());

        let err = exchange
            .get_orders("BTC/USDT", &HistoryQuery::since(i64::MIN))
            .await
            .unwrap_err();
        assert!(
            matches!(err, ExchangeError::ValidationError { ref field, .. } if field == "from_timestamp")
        );
        assert_eq!(transport.request_count(), 0);

        let mut order = raw_order("o1", "limit", "1", "1", "10");
        order["createdAt"] = json!(-9223372036854775807i64);
        transport.push_json(ok(order));
        assert!(matches!(
            exchange.get_order("BTC/USDT", "o1").await,
            Err(ExchangeError::ParseError(_))
        ));
    }
}
