use crate::core::error::ExchangeError;
use crate::core::types::MarketType;
use serde::{Deserialize, Serialize};
use std::fs;
use std::str::FromStr;

/// 支持的交易所
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Binance,
    Bybit,
    Kucoin,
    Bitfinex,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Binance => "binance",
            ExchangeKind::Bybit => "bybit",
            ExchangeKind::Kucoin => "kucoin",
            ExchangeKind::Bitfinex => "bitfinex",
        }
    }
}

impl FromStr for ExchangeKind {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, ExchangeError> {
        match s.to_lowercase().as_str() {
            "binance" => Ok(ExchangeKind::Binance),
            "bybit" => Ok(ExchangeKind::Bybit),
            "kucoin" => Ok(ExchangeKind::Kucoin),
            "bitfinex" => Ok(ExchangeKind::Bitfinex),
            _ => Err(ExchangeError::UnsupportedExchange(s.to_string())),
        }
    }
}

impl std::fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn default_timeout_secs() -> u64 {
    10
}

/// 单个交易所适配器的配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub exchange: ExchangeKind,
    /// 期货模式，构造后固定
    #[serde(default)]
    pub futures: bool,
    /// 代理地址，例如 http://127.0.0.1:7890
    #[serde(default)]
    pub proxy: Option<String>,
    /// 单次请求超时（秒）
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// 覆盖默认 API 地址（测试网或本地调试）
    #[serde(default)]
    pub base_url: Option<String>,
    /// 读取密钥的环境变量前缀，缺省时使用交易所名称
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl ExchangeConfig {
    pub fn new(exchange: ExchangeKind, futures: bool) -> Self {
        Self {
            exchange,
            futures,
            proxy: None,
            timeout_secs: default_timeout_secs(),
            base_url: None,
            api_key_env: None,
        }
    }

    /// 从YAML文件加载配置
    pub fn from_file(path: &str) -> Result<Self, ExchangeError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ExchangeError::ConfigError(format!("读取配置文件失败: {}", e)))?;

        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ExchangeError> {
        let config: ExchangeConfig = serde_yaml::from_str(contents)?;
        if config.timeout_secs == 0 {
            return Err(ExchangeError::ConfigError(
                "timeout_secs 必须大于0".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn market_type(&self) -> MarketType {
        MarketType::from_futures_flag(self.futures)
    }

    /// 环境变量前缀
    pub fn env_prefix(&self) -> String {
        self.api_key_env
            .clone()
            .unwrap_or_else(|| self.exchange.as_str().to_uppercase())
    }
}

/// API密钥配置
#[derive(Clone)]
pub struct ApiKeys {
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: Option<String>,
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("ApiKeys")
            .field("api_key", &self.api_key)
            .field("api_secret", &"***")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "***"))
            .finish()
    }
}

impl ApiKeys {
    pub fn new(api_key: &str, api_secret: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            passphrase: None,
        }
    }

    pub fn with_passphrase(mut self, passphrase: &str) -> Self {
        self.passphrase = Some(passphrase.to_string());
        self
    }

    /// 从环境变量加载API密钥
    pub fn from_env(prefix: &str) -> Result<Self, ExchangeError> {
        dotenv::dotenv().ok(); // 加载.env文件，忽略错误

        let prefix_upper = prefix.to_uppercase();

        let api_key = std::env::var(format!("{}_API_KEY", prefix_upper)).map_err(|_| {
            ExchangeError::ConfigError(format!("未找到{}的API_KEY环境变量", prefix))
        })?;

        // 尝试多种格式的密钥名称
        let api_secret = std::env::var(format!("{}_API_SECRET", prefix_upper))
            .or_else(|_| std::env::var(format!("{}_SECRET_KEY", prefix_upper)))
            .or_else(|_| std::env::var(format!("{}_SECRET", prefix_upper)))
            .map_err(|_| {
                ExchangeError::ConfigError(format!(
                    "未找到{}的API_SECRET或SECRET_KEY环境变量",
                    prefix
                ))
            })?;

        let passphrase = std::env::var(format!("{}_PASSPHRASE", prefix_upper))
            .or_else(|_| std::env::var(format!("{}_API_PASSWORD", prefix_upper)))
            .ok();

        Ok(ApiKeys {
            api_key,
            api_secret,
            passphrase,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_yaml_defaults() {
        let config = ExchangeConfig::from_yaml("exchange: kucoin\n").unwrap();
        assert_eq!(config.exchange, ExchangeKind::Kucoin);
        assert!(!config.futures);
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.market_type(), MarketType::Spot);
        assert_eq!(config.env_prefix(), "KUCOIN");
    }

    #[test]
    fn test_config_from_yaml_full() {
        let yaml = "exchange: binance\nfutures: true\nproxy: http://127.0.0.1:7890\ntimeout_secs: 5\napi_key_env: BINANCE_2\n";
        let config = ExchangeConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.market_type(), MarketType::Futures);
        assert_eq!(config.proxy.as_deref(), Some("http://127.0.0.1:7890"));
        assert_eq!(config.env_prefix(), "BINANCE_2");
    }

    #[test]
    fn test_config_rejects_zero_timeout() {
        let err = ExchangeConfig::from_yaml("exchange: bybit\ntimeout_secs: 0\n").unwrap_err();
        assert!(matches!(err, ExchangeError::ConfigError(_)));
    }

    #[test]
    fn test_unknown_exchange_kind() {
        assert_eq!("KuCoin".parse::<ExchangeKind>().unwrap(), ExchangeKind::Kucoin);
        let err = "okx".parse::<ExchangeKind>().unwrap_err();
        assert!(matches!(err, ExchangeError::UnsupportedExchange(_)));
    }

    #[test]
    fn test_api_keys_debug_hides_secret() {
        let keys = ApiKeys::new("key", "secret").with_passphrase("pass");
        let rendered = format!("{:?}", keys);
        assert!(rendered.contains("key"));
        assert!(!rendered.contains("secret\""));
        assert!(!rendered.contains("pass\""));
    }
}
