//! Consultant 错误处理模块
//!
//! 提供统一的错误类型、错误代码分类以及常见底层错误的转换

pub mod code;
pub mod consultant_error;

pub use code::{ErrorCategory, ErrorCode};
pub use consultant_error::{ConsultantError, Result};
