//! Consultant 客户端门面
//!
//! 将配置分发、服务发现与服务注册组合为一个对外入口。

pub mod builder;
pub mod consultant;

pub use builder::ConsultantBuilder;
pub use consultant::Consultant;
