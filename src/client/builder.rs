//! Consultant 构建器

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{ConsultantConfig, DEFAULT_CONSUL_URL};
use crate::discovery::CatalogCache;
use crate::error::{ConsultantError, Result};
use crate::identity::ServiceIdentifier;
use crate::registry::{ServiceRegistrar, agent_self};
use crate::transport::{ConsulTransport, ReqwestTransport};
use crate::watch::{ConfigListener, ConfigPoller, ConfigValidator, ConfigWriter, SettingListener};

use super::consultant::{ConfigState, Consultant};

/// Consultant 构建器
///
/// 取值优先级：构建器方法 > [`ConsultantConfig`] > 环境变量 > 默认值。
pub struct ConsultantBuilder {
    config: ConsultantConfig,
    identity: Option<ServiceIdentifier>,
    transport: Option<Arc<dyn ConsulTransport>>,
    config_listeners: Vec<Arc<dyn ConfigListener>>,
    setting_listeners: Vec<(String, Arc<dyn SettingListener>)>,
    validator: Option<Arc<dyn ConfigValidator>>,
    initial: HashMap<String, String>,
}

impl ConsultantBuilder {
    /// 以环境变量为基础创建
    pub fn new() -> Self {
        Self::from_config(ConsultantConfig::default())
    }

    /// 以给定配置为基础创建，未设置的字段由环境变量补全
    pub fn from_config(config: ConsultantConfig) -> Self {
        Self {
            config: config.merge_env(),
            identity: None,
            transport: None,
            config_listeners: Vec::new(),
            setting_listeners: Vec::new(),
            validator: None,
            initial: HashMap::new(),
        }
    }

    pub fn with_consul_host(mut self, url: impl Into<String>) -> Self {
        self.config.consul_url = url.into();
        self
    }

    /// 声明本进程身份；未声明时使用配置或 `SERVICE_*` 环境变量
    pub fn identify_as(mut self, identity: ServiceIdentifier) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_kv_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.kv_prefix = prefix.into();
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.config.token = Some(token.into());
        self
    }

    pub fn with_catalog_cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.catalog_cache_ttl_ms = ttl.as_millis() as u64;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_health_check(mut self, path: impl Into<String>, interval: Duration) -> Self {
        self.config.health_check_path = path.into();
        self.config.health_check_interval_secs = interval.as_secs();
        self
    }

    /// 使用自定义传输层（默认基于 reqwest）
    pub fn with_transport(mut self, transport: Arc<dyn ConsulTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// 每次发布新配置时回调
    pub fn on_valid_config<L>(mut self, listener: L) -> Self
    where
        L: ConfigListener + 'static,
    {
        self.config_listeners.push(Arc::new(listener));
        self
    }

    /// 指定配置项变化时回调
    pub fn on_setting_update<L>(mut self, key: impl Into<String>, listener: L) -> Self
    where
        L: SettingListener + 'static,
    {
        self.setting_listeners.push((key.into(), Arc::new(listener)));
        self
    }

    /// 发布前校验候选配置
    pub fn validate_config_with<V>(mut self, validator: V) -> Self
    where
        V: ConfigValidator + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// 是否从 Consul 拉取配置，关闭时只使用 [`start_with`](Self::start_with) 提供的配置
    pub fn pull_config_from_consul(mut self, pull_config: bool) -> Self {
        self.config.pull_config = pull_config;
        self
    }

    /// 初始配置，在第一次拉取之前发布
    pub fn start_with(mut self, settings: HashMap<String, String>) -> Self {
        self.initial = settings;
        self
    }

    /// 构建客户端
    ///
    /// 开启配置拉取时，会先向本地 agent 补全缺失的数据中心与主机名，
    /// 然后完成第一轮配置拉取再返回。
    pub async fn build(self) -> Result<Consultant> {
        let config = self.config;
        let consul_url = match config.consul_url.trim_end_matches('/') {
            "" => DEFAULT_CONSUL_URL.to_string(),
            url => url.to_string(),
        };

        let transport: Arc<dyn ConsulTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(config.request_timeout())?),
        };

        let identity = match self.identity {
            Some(identity) => identity,
            None => config.identity()?.ok_or_else(|| {
                ConsultantError::invalid_argument(
                    "You must specify the name of the service using SERVICE_NAME=<service_name>",
                )
            })?,
        };
        let identity = with_instance(identity)?;

        let identity = if config.pull_config
            && (identity.datacenter().is_none() || identity.host_name().is_none())
        {
            let agent = agent_self(&transport, &consul_url, config.token.clone())
                .await
                .map_err(|e| {
                    ConsultantError::Startup(format!("could not query the Consul agent: {}", e))
                })?;
            identity.or_defaults(agent.datacenter, agent.node_name)?
        } else {
            identity
        };

        let state = Arc::new(ConfigState::new(self.validator));
        for listener in self.config_listeners {
            state.listeners().add_config_listener(listener);
        }
        for (key, listener) in self.setting_listeners {
            state.listeners().add_setting_listener(key, listener);
        }
        state.publish(self.initial);

        let catalog = Arc::new(
            CatalogCache::new(
                transport.clone(),
                consul_url.clone(),
                identity.datacenter().map(str::to_string),
                config.catalog_cache_ttl(),
            )
            .with_token(config.token.clone()),
        );
        let registrar = ServiceRegistrar::new(transport.clone(), consul_url.clone(), identity.clone())
            .with_token(config.token.clone())
            .with_health_check(
                config.health_check_path.clone(),
                Duration::from_secs(config.health_check_interval_secs),
            );
        let writer = ConfigWriter::new(
            transport.clone(),
            consul_url.clone(),
            config.kv_prefix.clone(),
            config.token.clone(),
        );

        let shutdown = CancellationToken::new();
        let poller_task = if config.pull_config {
            info!(service = %identity, "Fetching initial configuration from Consul");
            let sink_state = state.clone();
            let mut poller = ConfigPoller::new(
                transport,
                consul_url,
                config.kv_prefix.clone(),
                identity.clone(),
                Arc::new(move |candidate: HashMap<String, String>| {
                    if let Err(e) = sink_state.accept(candidate) {
                        warn!(error = %e, code = e.code().as_str(), "New config did not pass validation");
                    }
                }),
                shutdown.child_token(),
            )
            .with_token(config.token.clone());

            let outcome = poller.poll_once().await;
            Some(poller.spawn(outcome.next_delay()))
        } else {
            None
        };

        Ok(Consultant::new(
            identity,
            state,
            catalog,
            registrar,
            writer,
            shutdown,
            config.shutdown_timeout(),
            poller_task,
        ))
    }
}

impl Default for ConsultantBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn with_instance(identity: ServiceIdentifier) -> Result<ServiceIdentifier> {
    if identity.instance().is_some() {
        return Ok(identity);
    }
    ServiceIdentifier::with_tags(
        identity.service_name(),
        identity.datacenter().map(str::to_string),
        identity.host_name().map(str::to_string),
        Some(uuid::Uuid::new_v4().to_string()),
        identity.tags().clone(),
    )
}
