//! HTTP 传输层
//!
//! 核心层只依赖 [`HttpTransport`] 这个接口；真实请求由 reqwest 实现，
//! 测试中使用脚本化的 mock。请求参数严格保持插入顺序，因为各交易所的签名校验对顺序敏感。

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::core::error::ExchangeError;
use crate::core::types::Result;

/// HTTP 方法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 保持插入顺序的请求参数
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Vec<(String, Value)>);

impl Params {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// 链式添加参数
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// 已存在的键原位覆盖，否则追加到末尾
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// `k1=v1&k2=v2`，按插入顺序，不排序
    pub fn query_string(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| {
                format!(
                    "{}={}",
                    urlencoding::encode(k),
                    urlencoding::encode(&render_value(v))
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    /// 紧凑 JSON 对象，字段顺序与插入顺序一致
    pub fn to_json(&self) -> String {
        let map: serde_json::Map<String, Value> = self.0.iter().cloned().collect();
        Value::Object(map).to_string()
    }
}

/// 参数值在查询串中的文本形式
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// 待发送的请求
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub base_url: String,
    pub path: String,
    pub params: Params,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, base_url: &str, path: &str, params: Params) -> Self {
        Self {
            method,
            base_url: base_url.to_string(),
            path: path.to_string(),
            params,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn add_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.push((name.to_string(), value.into()));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// 最终请求地址，查询串与签名时使用的完全一致
    pub fn url(&self) -> String {
        if self.params.is_empty() {
            format!("{}{}", self.base_url, self.path)
        } else {
            format!("{}{}?{}", self.base_url, self.path, self.params.query_string())
        }
    }
}

/// 原始响应
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 非 2xx 视为传输/状态错误；2xx 但无法解析为 JSON 视为响应格式错误
    pub fn into_json(self) -> Result<Value> {
        if !self.is_success() {
            return Err(ExchangeError::ApiError {
                code: self.status as i32,
                message: self.body,
            });
        }
        serde_json::from_str(&self.body)
            .map_err(|_| ExchangeError::ParseError(format!("Invalid Response: {}", self.body)))
    }
}

/// 外部 HTTP 能力
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// 基于 reqwest 的实现，超时和代理在构造时固定
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout_secs: u64, proxy: Option<&str>) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent("rustex/0.1.0")
            .timeout(Duration::from_secs(timeout_secs));

        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let url = request.url();
        log::debug!("➡️ {} {}", request.method, url);

        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
            HttpMethod::Put => self.client.put(&url),
            HttpMethod::Delete => self.client.delete(&url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        if !(200..300).contains(&status) {
            log::warn!("⚠️ {} {} 返回状态码 {}: {}", request.method, url, status, body);
        }

        Ok(HttpResponse { status, body })
    }
}

/// 交易所响应外层结构
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// 负载即响应本身
    Plain,
    /// `{"code": "200000", "data": ...}`
    KucoinEnvelope,
    /// `{"retCode": 0, "retMsg": "OK", "result": ..., "time": ...}`
    BybitEnvelope,
}

impl ResponseShape {
    /// 剥离外层结构，业务错误码转换为 ApiError
    pub fn unwrap(&self, response: Value) -> Result<Value> {
        match self {
            ResponseShape::Plain => Ok(response),
            ResponseShape::KucoinEnvelope => {
                let Value::Object(mut map) = response else {
                    return Ok(response);
                };
                if let Some(code) = map.get("code") {
                    let code = match code {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    if code != "200000" {
                        let message = map
                            .get("msg")
                            .and_then(|m| m.as_str())
                            .unwrap_or("unknown error")
                            .to_string();
                        return Err(ExchangeError::ApiError {
                            code: code.parse().unwrap_or(-1),
                            message,
                        });
                    }
                }
                let rejected = matches!(map.get("success"), Some(Value::Bool(false)));
                if rejected {
                    return Err(ExchangeError::ApiError {
                        code: -1,
                        message: Value::Object(map).to_string(),
                    });
                }
                match map.remove("data") {
                    Some(data) => Ok(data),
                    None => Ok(Value::Object(map)),
                }
            }
            ResponseShape::BybitEnvelope => {
                let Value::Object(mut map) = response else {
                    return Err(ExchangeError::ParseError(
                        "Bybit 响应不是对象".to_string(),
                    ));
                };
                let code = map.get("retCode").and_then(|c| c.as_i64()).unwrap_or(-1);
                if code != 0 {
                    let message = map
                        .get("retMsg")
                        .and_then(|m| m.as_str())
                        .unwrap_or("unknown error")
                        .to_string();
                    return Err(ExchangeError::ApiError {
                        code: code as i32,
                        message,
                    });
                }
                let time = map.remove("time");
                let mut result = map.remove("result").unwrap_or(Value::Null);
                // 列表接口没有逐条时间戳，保留外层 time
                if let (Value::Object(inner), Some(time)) = (&mut result, time) {
                    inner.entry("time").or_insert(time);
                }
                Ok(result)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// 按顺序返回预设响应，并记录收到的请求
    #[derive(Default)]
    pub struct MockTransport {
        responses: Mutex<VecDeque<HttpResponse>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl MockTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn push_json(&self, body: Value) {
            self.push_raw(200, &body.to_string());
        }

        pub fn push_raw(&self, status: u16, body: &str) {
            self.responses.lock().unwrap().push_back(HttpResponse {
                status,
                body: body.to_string(),
            });
        }

        pub fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ExchangeError::ParseError("mock 响应队列为空".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_params_keep_insertion_order() {
        let params = Params::new().with("symbol", "BTCUSDT").with("a", 1).with("b", 2);
        assert_eq!(params.query_string(), "symbol=BTCUSDT&a=1&b=2");
        assert_eq!(params.to_json(), r#"{"symbol":"BTCUSDT","a":1,"b":2}"#);
    }

    #[test]
    fn test_params_insert_overwrites_in_place() {
        let mut params = Params::new().with("symbol", "BTCUSDT").with("startTime", 1);
        params.insert("startTime", 5);
        params.insert("limit", 10);
        assert_eq!(params.query_string(), "symbol=BTCUSDT&startTime=5&limit=10");
    }

    #[test]
    fn test_request_url() {
        let request = HttpRequest::new(
            HttpMethod::Get,
            "https://api.binance.com",
            "/api/v3/ticker/price",
            Params::new().with("symbol", "BTCUSDT"),
        );
        assert_eq!(
            request.url(),
            "https://api.binance.com/api/v3/ticker/price?symbol=BTCUSDT"
        );
    }

    #[test]
    fn test_response_status_and_parse_errors() {
        let failed = HttpResponse {
            status: 418,
            body: "teapot".to_string(),
        };
        match failed.into_json() {
            Err(ExchangeError::ApiError { code, message }) => {
                assert_eq!(code, 418);
                assert_eq!(message, "teapot");
            }
            other => panic!("unexpected: {:?}", other),
        }

        let garbage = HttpResponse {
            status: 200,
            body: "<html>".to_string(),
        };
        assert!(matches!(garbage.into_json(), Err(ExchangeError::ParseError(_))));
    }

    #[test]
    fn test_kucoin_envelope() {
        let ok = json!({"code": "200000", "data": [1, 2]});
        assert_eq!(ResponseShape::KucoinEnvelope.unwrap(ok).unwrap(), json!([1, 2]));

        let failed = json!({"code": "400100", "msg": "Invalid parameter"});
        match ResponseShape::KucoinEnvelope.unwrap(failed) {
            Err(ExchangeError::ApiError { code, message }) => {
                assert_eq!(code, 400100);
                assert_eq!(message, "Invalid parameter");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_bybit_envelope_keeps_time() {
        let ok = json!({"retCode": 0, "retMsg": "OK", "result": {"list": []}, "time": 1700000000000i64});
        let result = ResponseShape::BybitEnvelope.unwrap(ok).unwrap();
        assert_eq!(result["time"], json!(1700000000000i64));

        let failed = json!({"retCode": 10001, "retMsg": "params error", "result": {}});
        assert!(matches!(
            ResponseShape::BybitEnvelope.unwrap(failed),
            Err(ExchangeError::ApiError { code: 10001, .. })
        ));
    }
}
