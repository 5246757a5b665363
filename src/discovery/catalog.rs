//! Consul 健康目录缓存

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::Result;
use crate::transport::{ConsulRequest, ConsulTransport};

use super::instance::ServiceInstance;

/// 服务实例查询后端
#[async_trait]
pub trait ServiceInstanceBackend: Send + Sync {
    /// 本地数据中心
    fn datacenter(&self) -> Option<&str>;

    /// 列出健康实例，按与本地 agent 的网络距离由近到远排序
    ///
    /// `datacenter` 为 `None` 时查询本地数据中心。
    async fn list_instances(
        &self,
        service_name: &str,
        datacenter: Option<&str>,
    ) -> Result<Vec<ServiceInstance>>;

    /// 列出 Consul 已知的数据中心
    async fn list_datacenters(&self) -> Result<Vec<String>>;
}

/// 单个缓存槽
///
/// 刷新期间持有锁，同一键的并发请求等待同一次远程调用的结果。失败不缓存。
struct CacheSlot<T> {
    entry: Mutex<Option<(Instant, T)>>,
}

impl<T> Default for CacheSlot<T> {
    fn default() -> Self {
        Self {
            entry: Mutex::new(None),
        }
    }
}

impl<T: Clone> CacheSlot<T> {
    async fn get_or_fetch<F, Fut>(&self, ttl: Duration, fetch: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut entry = self.entry.lock().await;
        if let Some((fetched_at, value)) = entry.as_ref() {
            if fetched_at.elapsed() < ttl {
                return Ok(value.clone());
            }
        }

        let value = fetch().await?;
        *entry = Some((Instant::now(), value.clone()));
        Ok(value)
    }
}

type InstancesKey = (Option<String>, String);

/// 基于 Consul HTTP API 的目录缓存
pub struct CatalogCache {
    transport: Arc<dyn ConsulTransport>,
    consul_url: String,
    token: Option<String>,
    datacenter: Option<String>,
    ttl: Duration,
    instances: DashMap<InstancesKey, Arc<CacheSlot<Vec<ServiceInstance>>>>,
    datacenters: CacheSlot<Vec<String>>,
}

impl CatalogCache {
    pub fn new(
        transport: Arc<dyn ConsulTransport>,
        consul_url: impl Into<String>,
        datacenter: Option<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            transport,
            consul_url: consul_url.into().trim_end_matches('/').to_string(),
            token: None,
            datacenter,
            ttl,
            instances: DashMap::new(),
            datacenters: CacheSlot::default(),
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 查询 `?passing` 过滤后的实例，并在本地再按健康检查过滤一次
    ///
    /// 真实 agent 已在服务端剔除未通过检查的实例，此时"有实例但全部不健康"的告警不会出现；
    /// 只有返回未过滤结果的后端（代理、旧版 agent）才会触发它。
    async fn fetch_instances(
        &self,
        service_name: &str,
        datacenter: Option<&str>,
    ) -> Result<Vec<ServiceInstance>> {
        let mut url = format!(
            "{}/v1/health/service/{}?passing&near=_agent",
            self.consul_url, service_name
        );
        if let Some(dc) = datacenter.filter(|dc| !dc.is_empty()) {
            url.push_str("&dc=");
            url.push_str(dc);
        }

        let response = self
            .transport
            .execute(ConsulRequest::get(url).with_token(self.token.clone()))
            .await?
            .error_for_status()?;
        let known: Vec<ServiceInstance> = response.json()?;
        let known_count = known.len();
        let passing: Vec<ServiceInstance> =
            known.into_iter().filter(ServiceInstance::is_passing).collect();

        if passing.is_empty() {
            if known_count > 0 {
                warn!(
                    service = %service_name,
                    datacenter = ?datacenter,
                    instances = known_count,
                    "Service has instances but none pass all health checks"
                );
            } else {
                debug!(service = %service_name, datacenter = ?datacenter, "No instances registered for service");
            }
        }
        Ok(passing)
    }

    async fn fetch_datacenters(&self) -> Result<Vec<String>> {
        let url = format!("{}/v1/catalog/datacenters", self.consul_url);
        let response = self
            .transport
            .execute(ConsulRequest::get(url).with_token(self.token.clone()))
            .await?
            .error_for_status()?;
        response.json()
    }
}

#[async_trait]
impl ServiceInstanceBackend for CatalogCache {
    fn datacenter(&self) -> Option<&str> {
        self.datacenter.as_deref()
    }

    async fn list_instances(
        &self,
        service_name: &str,
        datacenter: Option<&str>,
    ) -> Result<Vec<ServiceInstance>> {
        let key = (datacenter.map(str::to_string), service_name.to_string());
        let slot = self.instances.entry(key).or_default().clone();
        slot.get_or_fetch(self.ttl, || self.fetch_instances(service_name, datacenter))
            .await
    }

    async fn list_datacenters(&self) -> Result<Vec<String>> {
        self.datacenters
            .get_or_fetch(self.ttl, || self.fetch_datacenters())
            .await
    }
}
