//! Consul 服务注册实现

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{ConsultantError, Result};
use crate::identity::ServiceIdentifier;
use crate::transport::{ConsulRequest, ConsulTransport};
use crate::utils::loopback_address;

#[allow(non_snake_case)]
#[derive(Debug, Serialize)]
struct ConsulService {
    ID: String,
    Name: String,
    Tags: Vec<String>,
    Address: String,
    Port: u16,
    Check: ConsulCheck,
}

#[allow(non_snake_case)]
#[derive(Debug, Serialize)]
struct ConsulCheck {
    HTTP: String,
    Interval: String,
}

/// 服务注册器
///
/// 同一时刻至多注册一次：重复注册或未注册时注销都只记录警告。
pub struct ServiceRegistrar {
    transport: Arc<dyn ConsulTransport>,
    consul_url: String,
    token: Option<String>,
    identity: ServiceIdentifier,
    health_check_path: String,
    health_check_interval: Duration,
    registered: AtomicBool,
}

impl ServiceRegistrar {
    pub fn new(
        transport: Arc<dyn ConsulTransport>,
        consul_url: impl Into<String>,
        identity: ServiceIdentifier,
    ) -> Self {
        Self {
            transport,
            consul_url: consul_url.into().trim_end_matches('/').to_string(),
            token: None,
            identity,
            health_check_path: "/_health".to_string(),
            health_check_interval: Duration::from_secs(10),
            registered: AtomicBool::new(false),
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_health_check(mut self, path: impl Into<String>, interval: Duration) -> Self {
        self.health_check_path = path.into();
        self.health_check_interval = interval;
        self
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    fn service_id(&self) -> Result<&str> {
        self.identity.instance().ok_or_else(|| {
            ConsultantError::invalid_argument("Cannot register a service without an instance name")
        })
    }

    fn registration(&self, port: u16) -> Result<ConsulService> {
        let address = self
            .identity
            .host_name()
            .map(str::to_string)
            .unwrap_or_else(loopback_address);
        let path = if self.health_check_path.starts_with('/') {
            self.health_check_path.clone()
        } else {
            format!("/{}", self.health_check_path)
        };

        Ok(ConsulService {
            ID: self.service_id()?.to_string(),
            Name: self.identity.service_name().to_string(),
            Tags: self.identity.tags().iter().cloned().collect(),
            Check: ConsulCheck {
                HTTP: format!("http://{}:{}{}", address, port, path),
                Interval: format!("{}s", self.health_check_interval.as_secs().max(1)),
            },
            Address: address,
            Port: port,
        })
    }

    /// 注册到本地 agent
    pub async fn register(&self, port: u16) -> Result<()> {
        if self
            .registered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(service = %self.identity, "Cannot register the service, as service was already registered");
            return Ok(());
        }

        info!(service = %self.identity, port, "Registering service with Consul");
        let result = self.send_registration(port).await;
        if let Err(e) = &result {
            self.registered.store(false, Ordering::SeqCst);
            error!(service = %self.identity, error = %e, "Could not register service");
        }
        result
    }

    async fn send_registration(&self, port: u16) -> Result<()> {
        let body = serde_json::to_string(&self.registration(port)?)?;
        let url = format!("{}/v1/agent/service/register", self.consul_url);
        self.transport
            .execute(ConsulRequest::put(url, body).with_token(self.token.clone()))
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// 从本地 agent 注销
    pub async fn deregister(&self) -> Result<()> {
        if self
            .registered
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(
                service = %self.identity,
                "Cannot deregister the service, as service wasn't registered or was already deregistered"
            );
            return Ok(());
        }

        info!(service = %self.identity, "Deregistering service from Consul");
        let result = self.send_deregistration().await;
        if let Err(e) = &result {
            self.registered.store(true, Ordering::SeqCst);
            error!(service = %self.identity, error = %e, "Could not deregister service");
        }
        result
    }

    async fn send_deregistration(&self) -> Result<()> {
        let url = format!(
            "{}/v1/agent/service/deregister/{}",
            self.consul_url,
            self.service_id()?
        );
        self.transport
            .execute(ConsulRequest::delete(url).with_token(self.token.clone()))
            .await?
            .error_for_status()?;
        Ok(())
    }
}
