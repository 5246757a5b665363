//! 工具函数模块

use std::net::{IpAddr, Ipv4Addr};

use tracing_subscriber::EnvFilter;

/// 读取环境变量，空值视为未设置
pub fn from_environment(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

/// 本机回环地址（注册服务且未指定主机名时使用）
pub fn loopback_address() -> String {
    IpAddr::V4(Ipv4Addr::LOCALHOST).to_string()
}

/// 初始化全局 tracing 订阅器
///
/// 过滤规则优先取 `RUST_LOG`，否则使用 `default_filter`。重复初始化时静默忽略。
///
/// # 示例
/// ```rust,no_run
/// flare_consultant::utils::init_tracing("flare_consultant=debug");
/// ```
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
