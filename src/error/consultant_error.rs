//! Consultant 统一错误类型

use super::code::ErrorCode;
use thiserror::Error;

/// Consultant 统一错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsultantError {
    /// 调用参数非法（空服务名、空的作用域字段、空路径等）
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Consul 返回了非成功状态码
    #[error("Consul returned status {status}: {body}")]
    Consul { status: u16, body: String },

    /// HTTP 传输层错误
    #[error("transport error: {0}")]
    Transport(String),

    /// 响应体解析失败
    #[error("failed to decode Consul response: {0}")]
    Decode(String),

    /// 新配置未通过校验
    #[error("config rejected by validator: {0}")]
    Validation(String),

    /// 客户端启动失败
    #[error("startup failed: {0}")]
    Startup(String),

    /// 本地配置错误
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ConsultantError {
    /// 创建参数错误
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        ConsultantError::InvalidArgument(msg.into())
    }

    /// 创建 Consul 状态码错误
    pub fn consul(status: u16, body: impl Into<String>) -> Self {
        ConsultantError::Consul {
            status,
            body: body.into(),
        }
    }

    /// 创建传输错误
    pub fn transport(msg: impl Into<String>) -> Self {
        ConsultantError::Transport(msg.into())
    }

    /// 创建解析错误
    pub fn decode(msg: impl Into<String>) -> Self {
        ConsultantError::Decode(msg.into())
    }

    /// 获取错误代码
    pub fn code(&self) -> ErrorCode {
        match self {
            ConsultantError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            ConsultantError::Consul { status, .. } if *status >= 500 => {
                ErrorCode::ConsulServerError
            }
            ConsultantError::Consul { .. } => ErrorCode::ConsulClientError,
            ConsultantError::Transport(_) => ErrorCode::TransportError,
            ConsultantError::Decode(_) => ErrorCode::DecodeError,
            ConsultantError::Validation(_) => ErrorCode::ValidationRejected,
            ConsultantError::Startup(_) => ErrorCode::StartupFailed,
            ConsultantError::Configuration(_) => ErrorCode::ConfigurationError,
        }
    }

    /// 获取远端状态码（如果有）
    pub fn status(&self) -> Option<u16> {
        match self {
            ConsultantError::Consul { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 判断是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }
}

impl From<reqwest::Error> for ConsultantError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ConsultantError::Decode(err.to_string())
        } else {
            ConsultantError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ConsultantError {
    fn from(err: serde_json::Error) -> Self {
        ConsultantError::Decode(err.to_string())
    }
}

impl From<base64::DecodeError> for ConsultantError {
    fn from(err: base64::DecodeError) -> Self {
        ConsultantError::Decode(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for ConsultantError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        ConsultantError::Decode(err.to_string())
    }
}

impl From<toml::de::Error> for ConsultantError {
    fn from(err: toml::de::Error) -> Self {
        ConsultantError::Configuration(err.to_string())
    }
}

impl From<std::io::Error> for ConsultantError {
    fn from(err: std::io::Error) -> Self {
        ConsultantError::Configuration(err.to_string())
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ConsultantError>;
