use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::core::config::ApiKeys;
use crate::core::error::ExchangeError;
use crate::core::http::{HttpMethod, HttpRequest, Params};
use crate::core::types::Result;

type HmacSha256 = Hmac<Sha256>;

/// Bybit 固定的接收窗口（毫秒）
pub const BYBIT_RECV_WINDOW: &str = "5000";

/// 统一的签名辅助工具
pub struct SignatureHelper;

impl SignatureHelper {
    fn hmac_bytes(secret: &str, data: &str) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC 支持任意长度密钥");
        mac.update(data.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    /// 通用 HMAC-SHA256，十六进制输出
    pub fn hmac_sha256(secret: &str, data: &str) -> String {
        hex::encode(Self::hmac_bytes(secret, data))
    }

    /// 通用 HMAC-SHA256，Base64 输出
    pub fn hmac_sha256_base64(secret: &str, data: &str) -> String {
        general_purpose::STANDARD.encode(Self::hmac_bytes(secret, data))
    }

    /// Binance 签名: HMAC-SHA256(query_string)
    pub fn binance_signature(secret: &str, query_string: &str) -> String {
        Self::hmac_sha256(secret, query_string)
    }

    /// Bybit v5 签名: HMAC-SHA256(timestamp + api_key + recv_window + params)
    pub fn bybit_signature(
        secret: &str,
        timestamp: &str,
        api_key: &str,
        recv_window: &str,
        params: &str,
    ) -> String {
        let prehash = format!("{}{}{}{}", timestamp, api_key, recv_window, params);
        Self::hmac_sha256(secret, &prehash)
    }

    /// KuCoin 签名: Base64(HMAC-SHA256(timestamp + method + endpoint + body))
    pub fn kucoin_signature(
        secret: &str,
        timestamp: &str,
        method: &str,
        endpoint: &str,
        body: &str,
    ) -> String {
        let prehash = format!("{}{}{}{}", timestamp, method, endpoint, body);
        Self::hmac_sha256_base64(secret, &prehash)
    }

    /// KuCoin v2 密钥的 passphrase 也需要用 secret 签名
    pub fn kucoin_passphrase(secret: &str, passphrase: &str) -> String {
        Self::hmac_sha256_base64(secret, passphrase)
    }

    /// 毫秒级时间戳
    pub fn timestamp() -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// 每个交易所的签名策略
pub trait RequestSigner: Send + Sync {
    /// 纯函数：相同输入永远得到相同签名
    fn sign(
        &self,
        method: HttpMethod,
        timestamp: i64,
        path: &str,
        params: &Params,
        credentials: &ApiKeys,
    ) -> Result<String>;

    /// 把签名、密钥和时间戳放进请求头或参数
    fn attach(&self, request: &mut HttpRequest, credentials: &ApiKeys, timestamp: i64)
        -> Result<()>;
}

/// 非 GET 请求把参数移到 JSON 请求体
fn move_params_to_body(request: &mut HttpRequest) {
    if request.method != HttpMethod::Get {
        if !request.params.is_empty() {
            request.body = Some(request.params.to_json());
        }
        request.params.clear();
        request.add_header("Content-Type", "application/json");
    }
}

/// Binance: 参数追加 timestamp 后对查询串签名，signature 放在最后
pub struct BinanceSigner;

impl RequestSigner for BinanceSigner {
    fn sign(
        &self,
        _method: HttpMethod,
        _timestamp: i64,
        _path: &str,
        params: &Params,
        credentials: &ApiKeys,
    ) -> Result<String> {
        Ok(SignatureHelper::binance_signature(
            &credentials.api_secret,
            &params.query_string(),
        ))
    }

    fn attach(
        &self,
        request: &mut HttpRequest,
        credentials: &ApiKeys,
        timestamp: i64,
    ) -> Result<()> {
        request.params.insert("timestamp", timestamp);
        let signature = self.sign(
            request.method,
            timestamp,
            &request.path,
            &request.params,
            credentials,
        )?;
        request.params.insert("signature", signature);
        request.add_header("X-MBX-APIKEY", credentials.api_key.clone());
        Ok(())
    }
}

/// Bybit v5: 签名、密钥、时间戳和接收窗口都放在请求头
pub struct BybitSigner;

impl RequestSigner for BybitSigner {
    fn sign(
        &self,
        method: HttpMethod,
        timestamp: i64,
        _path: &str,
        params: &Params,
        credentials: &ApiKeys,
    ) -> Result<String> {
        let params_string = match method {
            HttpMethod::Get => params.query_string(),
            _ if params.is_empty() => String::new(),
            _ => params.to_json(),
        };
        Ok(SignatureHelper::bybit_signature(
            &credentials.api_secret,
            &timestamp.to_string(),
            &credentials.api_key,
            BYBIT_RECV_WINDOW,
            &params_string,
        ))
    }

    fn attach(
        &self,
        request: &mut HttpRequest,
        credentials: &ApiKeys,
        timestamp: i64,
    ) -> Result<()> {
        let signature = self.sign(
            request.method,
            timestamp,
            &request.path,
            &request.params,
            credentials,
        )?;
        request.add_header("X-BAPI-API-KEY", credentials.api_key.clone());
        request.add_header("X-BAPI-SIGN", signature);
        request.add_header("X-BAPI-SIGN-TYPE", "2");
        request.add_header("X-BAPI-TIMESTAMP", timestamp.to_string());
        request.add_header("X-BAPI-RECV-WINDOW", BYBIT_RECV_WINDOW);
        move_params_to_body(request);
        Ok(())
    }
}

/// KuCoin: 请求签名和 passphrase 签名分别放在两个请求头
pub struct KucoinSigner;

impl RequestSigner for KucoinSigner {
    fn sign(
        &self,
        method: HttpMethod,
        timestamp: i64,
        path: &str,
        params: &Params,
        credentials: &ApiKeys,
    ) -> Result<String> {
        let (endpoint, body) = match method {
            HttpMethod::Get if !params.is_empty() => {
                (format!("{}?{}", path, params.query_string()), String::new())
            }
            HttpMethod::Get => (path.to_string(), String::new()),
            _ if params.is_empty() => (path.to_string(), String::new()),
            _ => (path.to_string(), params.to_json()),
        };
        Ok(SignatureHelper::kucoin_signature(
            &credentials.api_secret,
            &timestamp.to_string(),
            method.as_str(),
            &endpoint,
            &body,
        ))
    }

    fn attach(
        &self,
        request: &mut HttpRequest,
        credentials: &ApiKeys,
        timestamp: i64,
    ) -> Result<()> {
        let passphrase = credentials
            .passphrase
            .as_ref()
            .ok_or_else(|| ExchangeError::AuthError("KuCoin需要PASSPHRASE".to_string()))?;

        let signature = self.sign(
            request.method,
            timestamp,
            &request.path,
            &request.params,
            credentials,
        )?;
        request.add_header("KC-API-KEY-VERSION", "2");
        request.add_header("KC-API-TIMESTAMP", timestamp.to_string());
        request.add_header("KC-API-SIGN", signature);
        request.add_header("KC-API-KEY", credentials.api_key.clone());
        request.add_header(
            "KC-API-PASSPHRASE",
            SignatureHelper::kucoin_passphrase(&credentials.api_secret, passphrase),
        );
        move_params_to_body(request);
        Ok(())
    }
}

/// 只开放公共接口的交易所，任何签名请求都是认证错误
pub struct PublicOnlySigner {
    pub exchange: &'static str,
}

impl RequestSigner for PublicOnlySigner {
    fn sign(
        &self,
        _method: HttpMethod,
        _timestamp: i64,
        _path: &str,
        _params: &Params,
        _credentials: &ApiKeys,
    ) -> Result<String> {
        Err(ExchangeError::AuthError(format!(
            "{} 未实现签名接口",
            self.exchange
        )))
    }

    fn attach(
        &self,
        request: &mut HttpRequest,
        credentials: &ApiKeys,
        timestamp: i64,
    ) -> Result<()> {
        self.sign(
            request.method,
            timestamp,
            &request.path,
            &request.params,
            credentials,
        )
        .map(|_| ())
    }
}
