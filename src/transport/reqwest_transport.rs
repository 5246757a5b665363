//! 基于 reqwest 的 Consul 传输实现

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;

use super::{CONSUL_INDEX_HEADER, CONSUL_TOKEN_HEADER, ConsulRequest, ConsulResponse, ConsulTransport};
use crate::error::Result;

const USER_AGENT: &str = "Consultant";

/// reqwest 传输（内部连接池可复用）
#[derive(Clone)]
pub struct ReqwestTransport {
    http_client: HttpClient,
}

impl ReqwestTransport {
    /// 创建新的传输
    ///
    /// `request_timeout` 需要大于 Consul 阻塞查询的最长等待时间。
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let http_client = HttpClient::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .pool_max_idle_per_host(5)
            .build()?;
        Ok(Self { http_client })
    }

    /// 使用外部构造的 reqwest 客户端
    pub fn with_client(http_client: HttpClient) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl ConsulTransport for ReqwestTransport {
    async fn execute(&self, request: ConsulRequest) -> Result<ConsulResponse> {
        let mut builder = self.http_client.request(request.method, &request.url);
        if let Some(token) = request.token.as_deref() {
            builder = builder.header(CONSUL_TOKEN_HEADER, token);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let consul_index = resp
            .headers()
            .get(CONSUL_INDEX_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = resp.text().await?;

        Ok(ConsulResponse {
            status,
            consul_index,
            body,
        })
    }
}
