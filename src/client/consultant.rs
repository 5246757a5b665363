//! Consultant 门面

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::discovery::{
    CatalogCache, RoutingStrategy, ServiceInstance, ServiceInstanceBackend, ServiceLocations,
    default_strategy,
};
use crate::error::{ConsultantError, Result};
use crate::identity::ServiceIdentifier;
use crate::registry::ServiceRegistrar;
use crate::watch::{
    ConfigListener, ConfigValidator, ConfigWriter, ListenerId, ListenerRegistry, SettingListener,
    sync,
};

use super::builder::ConsultantBuilder;

/// 已发布配置及其订阅者
///
/// 只有启动流程和轮询任务会写入，写入方之间不会并发。
pub(crate) struct ConfigState {
    published: ArcSwap<HashMap<String, String>>,
    listeners: ListenerRegistry,
    validator: Option<Arc<dyn ConfigValidator>>,
}

impl ConfigState {
    pub(crate) fn new(validator: Option<Arc<dyn ConfigValidator>>) -> Self {
        Self {
            published: ArcSwap::from_pointee(HashMap::new()),
            listeners: ListenerRegistry::new(),
            validator,
        }
    }

    pub(crate) fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// 校验候选配置，通过后发布；被拒绝时返回 [`ConsultantError::Validation`]
    pub(crate) fn accept(&self, candidate: HashMap<String, String>) -> Result<()> {
        if let Some(validator) = &self.validator {
            validator
                .validate_config(&candidate)
                .map_err(|e| ConsultantError::Validation(format!("{:#}", e)))?;
        }
        self.publish(candidate);
        Ok(())
    }

    /// 不经校验直接发布
    pub(crate) fn publish(&self, candidate: HashMap<String, String>) {
        let mut next = (**self.published.load()).clone();
        let changes = sync(&candidate, &mut next);
        if changes.is_empty() {
            return;
        }

        debug!(changed = ?changes.keys().collect::<Vec<_>>(), "Publishing new config");
        let next = Arc::new(next);
        self.published.store(next.clone());
        self.listeners.dispatch(&next, &changes);
    }

    fn snapshot(&self) -> Arc<HashMap<String, String>> {
        self.published.load_full()
    }
}

/// Consul 客户端
///
/// 通过 [`Consultant::builder`] 构造。构造完成时第一轮配置拉取已经结束，
/// 之后由后台任务持续长轮询。
///
/// # 示例
/// ```rust,no_run
/// use flare_consultant::{Consultant, ServiceIdentifier};
///
/// # async fn run() -> flare_consultant::Result<()> {
/// let consultant = Consultant::builder()
///     .with_consul_host("http://localhost:8500")
///     .identify_as(ServiceIdentifier::named("oauth")?)
///     .on_setting_update("database.url", |key: &str, _old: Option<&str>, new: Option<&str>| {
///         println!("{} -> {:?}", key, new);
///     })
///     .build()
///     .await?;
///
/// if let Some(address) = consultant.locate("billing").await? {
///     println!("billing at {}", address);
/// }
/// consultant.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct Consultant {
    identity: ServiceIdentifier,
    state: Arc<ConfigState>,
    catalog: Arc<CatalogCache>,
    registrar: ServiceRegistrar,
    writer: ConfigWriter,
    shutdown: CancellationToken,
    shutdown_timeout: Duration,
    poller_task: Mutex<Option<JoinHandle<()>>>,
}

impl Consultant {
    pub fn builder() -> ConsultantBuilder {
        ConsultantBuilder::new()
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        identity: ServiceIdentifier,
        state: Arc<ConfigState>,
        catalog: Arc<CatalogCache>,
        registrar: ServiceRegistrar,
        writer: ConfigWriter,
        shutdown: CancellationToken,
        shutdown_timeout: Duration,
        poller_task: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            identity,
            state,
            catalog,
            registrar,
            writer,
            shutdown,
            shutdown_timeout,
            poller_task: Mutex::new(poller_task),
        }
    }

    /// 本进程的身份
    pub fn identity(&self) -> &ServiceIdentifier {
        &self.identity
    }

    /// 当前已发布配置的快照
    pub fn settings(&self) -> Arc<HashMap<String, String>> {
        self.state.snapshot()
    }

    /// 读取单个配置项
    pub fn setting(&self, key: &str) -> Option<String> {
        self.state.snapshot().get(key).cloned()
    }

    pub fn add_config_listener<L>(&self, listener: L) -> ListenerId
    where
        L: ConfigListener + 'static,
    {
        self.state.listeners().add_config_listener(Arc::new(listener))
    }

    pub fn remove_config_listener(&self, id: ListenerId) -> bool {
        self.state.listeners().remove_config_listener(id)
    }

    pub fn add_setting_listener<L>(&self, key: impl Into<String>, listener: L) -> ListenerId
    where
        L: SettingListener + 'static,
    {
        self.state
            .listeners()
            .add_setting_listener(key, Arc::new(listener))
    }

    pub fn remove_setting_listener(&self, key: &str, id: ListenerId) -> bool {
        self.state.listeners().remove_setting_listener(key, id)
    }

    /// 将本实例注册到本地 Consul agent
    pub async fn register_service(&self, port: u16) -> Result<()> {
        self.registrar.register(port).await
    }

    /// 从本地 Consul agent 注销本实例
    pub async fn deregister_service(&self) -> Result<()> {
        self.registrar.deregister().await
    }

    pub fn is_registered(&self) -> bool {
        self.registrar.is_registered()
    }

    /// 在 `scope` 作用域下写入配置项，`value` 为 `None` 时删除
    pub async fn set_config(
        &self,
        scope: &ServiceIdentifier,
        key: &str,
        value: Option<&str>,
    ) -> Result<bool> {
        self.writer.set_config(scope, key, value).await
    }

    /// 目录缓存，可直接作为路由策略的后端
    pub fn catalog(&self) -> Arc<dyn ServiceInstanceBackend> {
        self.catalog.clone()
    }

    /// 本地数据中心的健康实例
    pub async fn list_instances(&self, service_name: &str) -> Result<Vec<ServiceInstance>> {
        self.catalog.list_instances(service_name, None).await
    }

    /// 使用默认策略定位实例
    pub fn locate_instances(&self, service_name: &str) -> ServiceLocations {
        self.locate_instances_with(default_strategy().as_ref(), service_name)
    }

    /// 使用指定策略定位实例
    pub fn locate_instances_with(
        &self,
        strategy: &dyn RoutingStrategy,
        service_name: &str,
    ) -> ServiceLocations {
        strategy.locate_instances(self.catalog(), service_name)
    }

    /// 定位一个实例并返回其 `host:port`
    pub async fn locate(&self, service_name: &str) -> Result<Option<String>> {
        let mut locations = self.locate_instances(service_name);
        Ok(locations.next().await?.map(|instance| instance.address()))
    }

    /// 关闭：注销服务，停止轮询任务
    ///
    /// 轮询任务未能在关闭超时内结束时会被强制中止。
    pub async fn shutdown(&self) {
        if self.registrar.is_registered() {
            if let Err(e) = self.registrar.deregister().await {
                error!(error = %e, "Error occurred while deregistering");
            }
        }

        self.shutdown.cancel();
        let task = self.poller_task.lock().ok().and_then(|mut task| task.take());
        let Some(mut task) = task else {
            return;
        };

        match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
            Ok(Ok(())) => info!(service = %self.identity, "Consultant shut down"),
            Ok(Err(e)) => warn!(error = %e, "Config poller task failed"),
            Err(_) => {
                warn!(
                    timeout_ms = self.shutdown_timeout.as_millis() as u64,
                    "Config poller did not stop in time, aborting"
                );
                task.abort();
            }
        }
    }
}

impl Drop for Consultant {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
