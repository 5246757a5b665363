//! Consul HTTP 传输抽象
//!
//! 核心组件只依赖 [`ConsulTransport`]，生产环境使用基于 reqwest 的实现，
//! 测试中可以替换为脚本化的假实现。

pub mod reqwest_transport;

use async_trait::async_trait;
use http::Method;

use crate::error::{ConsultantError, Result};

pub use reqwest_transport::ReqwestTransport;

/// 阻塞查询返回的一致性索引头
pub const CONSUL_INDEX_HEADER: &str = "X-Consul-Index";

/// ACL token 请求头
pub const CONSUL_TOKEN_HEADER: &str = "X-Consul-Token";

/// 单次 Consul 请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsulRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
    pub token: Option<String>,
}

impl ConsulRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn put(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            ..Self::new(Method::PUT, url)
        }
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            body: None,
            token: None,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }
}

/// Consul 响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsulResponse {
    pub status: u16,
    pub consul_index: Option<String>,
    pub body: String,
}

impl ConsulResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            consul_index: None,
            body: body.into(),
        }
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.consul_index = Some(index.into());
        self
    }

    /// 2xx 与 3xx 视为成功
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }

    /// 成功时返回自身，否则转换为携带状态码与响应体的错误
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ConsultantError::consul(self.status, self.body))
        }
    }

    /// 将响应体解析为 JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Consul HTTP 传输 trait
#[async_trait]
pub trait ConsulTransport: Send + Sync {
    /// 执行请求；只有传输层失败才返回错误，非 2xx 状态码由调用方处理
    async fn execute(&self, request: ConsulRequest) -> Result<ConsulResponse>;
}
