//! 错误代码和错误类别定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 错误代码枚举
///
/// 错误代码按类别分组：
/// - 1000-1999: 参数与配置错误
/// - 2000-2999: Consul 远端错误
/// - 3000-3999: 网络传输错误
/// - 4000-4999: 数据解析错误
/// - 5000-5999: 生命周期错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
pub enum ErrorCode {
    InvalidArgument = 1000,
    ConfigurationError = 1001,
    ValidationRejected = 1002,

    ConsulClientError = 2000,
    ConsulServerError = 2001,

    TransportError = 3000,

    DecodeError = 4000,

    StartupFailed = 5000,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    Argument,
    Remote,
    Network,
    Serialization,
    Lifecycle,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ErrorCode {
    /// 获取错误代码的数字值
    #[inline]
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    /// 获取错误代码的字符串表示
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::ConfigurationError => "CONFIGURATION_ERROR",
            ErrorCode::ValidationRejected => "VALIDATION_REJECTED",
            ErrorCode::ConsulClientError => "CONSUL_CLIENT_ERROR",
            ErrorCode::ConsulServerError => "CONSUL_SERVER_ERROR",
            ErrorCode::TransportError => "TRANSPORT_ERROR",
            ErrorCode::DecodeError => "DECODE_ERROR",
            ErrorCode::StartupFailed => "STARTUP_FAILED",
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self.as_u32() {
            1000..=1999 => ErrorCategory::Argument,
            2000..=2999 => ErrorCategory::Remote,
            3000..=3999 => ErrorCategory::Network,
            4000..=4999 => ErrorCategory::Serialization,
            _ => ErrorCategory::Lifecycle,
        }
    }

    /// 判断是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::ConsulServerError | ErrorCode::TransportError
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_code_ranges() {
        assert_eq!(ErrorCode::InvalidArgument.category(), ErrorCategory::Argument);
        assert_eq!(ErrorCode::ConsulServerError.category(), ErrorCategory::Remote);
        assert_eq!(ErrorCode::TransportError.category(), ErrorCategory::Network);
        assert_eq!(ErrorCode::DecodeError.category(), ErrorCategory::Serialization);
        assert_eq!(ErrorCode::StartupFailed.category(), ErrorCategory::Lifecycle);
    }

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(ErrorCode::TransportError.is_retryable());
        assert!(ErrorCode::ConsulServerError.is_retryable());
        assert!(!ErrorCode::ConsulClientError.is_retryable());
        assert!(!ErrorCode::InvalidArgument.is_retryable());
    }
}
