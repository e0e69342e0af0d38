//! 响应规范化的公共规则
//!
//! 各交易所模块负责字段映射，这里只放所有交易所共用的数值、时间和状态处理。

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;

use crate::core::error::ExchangeError;
use crate::core::types::{Amount, OrderSide, OrderStatus, Result};

/// 小于该值的时间戳按秒处理
const SECONDS_THRESHOLD: i64 = 1_000_000_000_000;

/// 把 JSON 值解码为交易所原始结构，失败视为响应格式错误
pub fn decode<T: DeserializeOwned>(value: &Value, what: &str) -> Result<T> {
    T::deserialize(value)
        .map_err(|e| ExchangeError::ParseError(format!("解析{}失败: {} ({})", what, e, value)))
}

/// 字符串或数字 -> Amount
pub fn amount_from(value: &Value) -> Result<Amount> {
    match value {
        Value::String(s) => Amount::parse(s),
        Value::Number(n) => {
            let parsed = n
                .as_f64()
                .ok_or_else(|| ExchangeError::ParseError(format!("无效的数值: {}", n)))?;
            Ok(Amount {
                value: parsed,
                raw: n.to_string(),
            })
        }
        other => Err(ExchangeError::ParseError(format!("无效的数值: {}", other))),
    }
}

/// 读取对象字段为 Amount，字段缺失视为格式错误
pub fn amount(item: &Value, field: &str) -> Result<Amount> {
    match item.get(field) {
        Some(value) => amount_from(value),
        None => Err(ExchangeError::ParseError(format!("缺少字段: {}", field))),
    }
}

/// 字段缺失或为 null 时返回 None
pub fn opt_amount(item: &Value, field: &str) -> Result<Option<Amount>> {
    match item.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(value) => amount_from(value).map(Some),
    }
}

/// 字符串或数字 -> 整数，接受 "1700000000000" 和 "1.7e12" 这类写法
pub fn integer_from(value: &Value) -> Result<i64> {
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().map(|f| f.trunc() as i64)),
        _ => None,
    };
    parsed.ok_or_else(|| ExchangeError::ParseError(format!("无效的整数: {}", value)))
}

/// 把秒级时间戳统一为毫秒，乘法溢出视为响应格式错误
pub fn normalize_timestamp(timestamp: i64) -> Result<i64> {
    if timestamp < SECONDS_THRESHOLD {
        timestamp
            .checked_mul(1000)
            .ok_or_else(|| ExchangeError::ParseError(format!("时间戳超出范围: {}", timestamp)))
    } else {
        Ok(timestamp)
    }
}

/// 调用方传入的秒级时间 -> 请求参数所需的毫秒
pub fn seconds_to_ms(field: &str, seconds: i64) -> Result<i64> {
    seconds
        .checked_mul(1000)
        .ok_or_else(|| ExchangeError::validation(field, format!("时间超出范围: {}", seconds)))
}

/// 读取时间戳字段并统一为毫秒
pub fn timestamp(item: &Value, field: &str) -> Result<i64> {
    let value = item
        .get(field)
        .ok_or_else(|| ExchangeError::ParseError(format!("缺少字段: {}", field)))?;
    integer_from(value).and_then(normalize_timestamp)
}

pub fn date_time(timestamp_ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .ok_or_else(|| ExchangeError::ParseError(format!("无效的时间戳: {}", timestamp_ms)))
}

pub fn date(timestamp_ms: i64) -> Result<NaiveDate> {
    date_time(timestamp_ms).map(|dt| dt.date_naive())
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// 由步长计算精度：0.01 -> 2，1 -> 0，10 -> -1；空值或零返回 0
pub fn precision(step: &str) -> i32 {
    let value = match step.trim().parse::<f64>() {
        Ok(v) if v > 0.0 => v,
        _ => return 0,
    };
    let log = value.log10();
    let rounded = log.round();
    // log10(0.001) 可能得到 -2.9999999999999996
    let log = if (log - rounded).abs() < 1e-9 { rounded } else { log };
    -(log.trunc() as i32)
}

/// 两个数值的乘积，保留8位小数
pub fn product(a: &Amount, b: &Amount) -> Amount {
    Amount::derived(a.value * b.value)
}

pub fn sum(a: &Amount, b: &Amount) -> Amount {
    Amount::derived(a.value + b.value)
}

/// 交易所状态字符串 -> 统一订单状态
///
/// 大小写和下划线不敏感，所以 CANCELED、Cancelled、PartiallyFilled 都能识别
pub fn order_status(raw: &str) -> Result<OrderStatus> {
    let key: String = raw
        .chars()
        .filter(|c| *c != '_')
        .collect::<String>()
        .to_lowercase();
    match key.as_str() {
        "new" | "untriggered" | "triggered" | "active" => Ok(OrderStatus::New),
        "partiallyfilled" => Ok(OrderStatus::PartiallyFilled),
        "filled" => Ok(OrderStatus::Filled),
        "canceled" | "cancelled" | "pendingcancel" | "partiallyfilledcanceled"
        | "deactivated" => Ok(OrderStatus::Canceled),
        "rejected" => Ok(OrderStatus::Rejected),
        "expired" | "expiredinmatch" => Ok(OrderStatus::Expired),
        _ => Err(ExchangeError::ParseError(format!("未知的订单状态: {}", raw))),
    }
}

/// 交易所方向字符串 -> 统一方向，大小写不敏感
pub fn order_side(raw: &str) -> Result<OrderSide> {
    raw.parse()
        .map_err(|_| ExchangeError::ParseError(format!("未知的订单方向: {}", raw)))
}

/// 已取消但有成交的订单视为部分成交
pub fn remap_canceled(status: OrderStatus, executed_qty: &Amount) -> OrderStatus {
    if status == OrderStatus::Canceled && !executed_qty.is_zero() {
        OrderStatus::PartiallyFilled
    } else {
        status
    }
}

/// serde 辅助：字符串或数字字段 -> Amount
pub fn de_amount<'de, D>(deserializer: D) -> std::result::Result<Amount, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    amount_from(&value).map_err(de::Error::custom)
}

/// serde 辅助：可选的数值字段，空字符串视为缺失
pub fn de_opt_amount<'de, D>(deserializer: D) -> std::result::Result<Option<Amount>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(value) => amount_from(&value).map(Some).map_err(de::Error::custom),
    }
}

/// serde 辅助：字符串或数字字段 -> String
pub fn de_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!("期望字符串或数字: {}", other))),
    }
}

/// serde 辅助：字符串或数字字段 -> i64
pub fn de_integer<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    integer_from(&value).map_err(de::Error::custom)
}
