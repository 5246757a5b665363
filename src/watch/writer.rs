//! 配置写入

use std::sync::Arc;

use reqwest::Url;
use tracing::{debug, info};

use crate::error::{ConsultantError, Result};
use crate::identity::ServiceIdentifier;
use crate::identity::path::render;
use crate::transport::{ConsulRequest, ConsulTransport};

/// 将配置项写入（或删除）指定作用域下的 Consul KV
pub struct ConfigWriter {
    transport: Arc<dyn ConsulTransport>,
    consul_url: String,
    kv_prefix: String,
    token: Option<String>,
}

impl ConfigWriter {
    pub fn new(
        transport: Arc<dyn ConsulTransport>,
        consul_url: impl Into<String>,
        kv_prefix: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            transport,
            consul_url: consul_url.into(),
            kv_prefix: kv_prefix.into(),
            token,
        }
    }

    /// 写入配置项；`value` 为 `None` 时删除
    ///
    /// 返回 Consul 是否确认了本次操作。
    pub async fn set_config(
        &self,
        scope: &ServiceIdentifier,
        key: &str,
        value: Option<&str>,
    ) -> Result<bool> {
        if key.is_empty() {
            return Err(ConsultantError::invalid_argument(
                "You must specify a non-empty 'key'!",
            ));
        }

        let path = render(Some(&self.kv_prefix), scope, Some(key));
        let url = self.kv_url(&path)?;
        let request = match value {
            Some(value) => ConsulRequest::put(url, value),
            None => ConsulRequest::delete(url),
        }
        .with_token(self.token.clone());

        let response = self.transport.execute(request).await?.error_for_status()?;
        let acknowledged = response.body.trim() == "true";
        if acknowledged {
            info!(path = %path, deleted = value.is_none(), "Config written to Consul");
        } else {
            debug!(path = %path, body = %response.body, "Consul did not acknowledge config write");
        }
        Ok(acknowledged)
    }

    fn kv_url(&self, path: &str) -> Result<String> {
        let mut url = Url::parse(&self.consul_url)
            .map_err(|e| ConsultantError::Configuration(format!("invalid Consul URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ConsultantError::Configuration("Consul URL cannot be a base".into()))?
            .pop_if_empty()
            .extend(["v1", "kv"])
            .extend(path.split('/'));
        Ok(url.to_string())
    }
}
