use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("网络请求错误: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON序列化错误: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("YAML配置错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("API错误: {code} - {message}")]
    ApiError { code: i32, message: String },

    #[error("认证错误: {0}")]
    AuthError(String),

    #[error("无法识别的交易对: {0}")]
    UnresolvedSymbol(String),

    #[error("不支持的交易所: {0}")]
    UnsupportedExchange(String),

    #[error("不支持的时间间隔: {interval} (交易所: {exchange})")]
    UnsupportedInterval { interval: String, exchange: String },

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("参数验证错误: {field} - {reason}")]
    ValidationError { field: String, reason: String },

    #[error("数据解析错误: {0}")]
    ParseError(String),

    #[error("不支持的功能: {0}")]
    NotSupported(String),
}

impl ExchangeError {
    /// 参数验证错误的快捷构造
    pub fn validation(field: &str, reason: impl Into<String>) -> Self {
        ExchangeError::ValidationError {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// 判断错误是否可以重试
    ///
    /// 仅供调用方参考，核心层自身从不重试；重试前必须重新生成时间戳并重新签名
    pub fn is_retryable(&self) -> bool {
        match self {
            ExchangeError::NetworkError(_) => true,
            ExchangeError::ApiError { code, .. } => {
                // HTTP 5xx 错误通常可以重试
                *code >= 500 && *code < 600
            }
            _ => false,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ExchangeError::NetworkError(_) => ErrorSeverity::Warning,
            ExchangeError::UnresolvedSymbol(_) => ErrorSeverity::Warning,
            ExchangeError::NotSupported(_) => ErrorSeverity::Info,
            ExchangeError::ValidationError { .. } => ErrorSeverity::Error,
            ExchangeError::AuthError(_) => ErrorSeverity::Critical,
            ExchangeError::ConfigError(_) => ErrorSeverity::Critical,
            ExchangeError::UnsupportedExchange(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }
}

/// 错误严重程度
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorSeverity {
    Info,     // 信息性错误，通常不影响操作
    Warning,  // 警告性错误，可能影响性能但可以重试
    Error,    // 一般错误，需要用户处理
    Critical, // 严重错误，需要立即处理
}
