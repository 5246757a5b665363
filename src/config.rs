use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::identity::ServiceIdentifier;
use crate::utils::from_environment;

pub const DEFAULT_CONSUL_URL: &str = "http://localhost:8500";
pub const DEFAULT_KV_PREFIX: &str = "config";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ConsultantConfig {
    #[serde(default = "default_consul_url")]
    pub consul_url: String,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub datacenter: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub instance: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default = "default_kv_prefix")]
    pub kv_prefix: String,
    #[serde(default = "default_true")]
    pub pull_config: bool,
    #[serde(default = "default_catalog_cache_ttl_ms")]
    pub catalog_cache_ttl_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
    #[serde(default = "default_health_check_path")]
    pub health_check_path: String,
    #[serde(default)]
    pub token: Option<String>,
}

fn default_consul_url() -> String {
    DEFAULT_CONSUL_URL.to_string()
}

fn default_kv_prefix() -> String {
    DEFAULT_KV_PREFIX.to_string()
}

fn default_true() -> bool {
    true
}

fn default_catalog_cache_ttl_ms() -> u64 {
    5_000
}

// Consul 阻塞查询最长等待 5 分钟，留出余量
fn default_request_timeout_secs() -> u64 {
    330
}

fn default_shutdown_timeout_ms() -> u64 {
    5_000
}

fn default_health_check_interval_secs() -> u64 {
    10
}

fn default_health_check_path() -> String {
    "/_health".to_string()
}

impl Default for ConsultantConfig {
    fn default() -> Self {
        Self {
            consul_url: default_consul_url(),
            service_name: None,
            datacenter: None,
            host: None,
            instance: None,
            tags: BTreeSet::new(),
            kv_prefix: default_kv_prefix(),
            pull_config: true,
            catalog_cache_ttl_ms: default_catalog_cache_ttl_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            health_check_interval_secs: default_health_check_interval_secs(),
            health_check_path: default_health_check_path(),
            token: None,
        }
    }
}

impl ConsultantConfig {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ConsultantConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// 从环境变量读取：`CONSUL_HOST`、`CONSUL_TOKEN`、`SERVICE_NAME`、`SERVICE_DC`、
    /// `SERVICE_HOST`、`SERVICE_INSTANCE`，其余字段取默认值
    pub fn from_env() -> Self {
        Self {
            consul_url: from_environment("CONSUL_HOST").unwrap_or_else(default_consul_url),
            service_name: from_environment("SERVICE_NAME"),
            datacenter: from_environment("SERVICE_DC"),
            host: from_environment("SERVICE_HOST"),
            instance: from_environment("SERVICE_INSTANCE"),
            token: from_environment("CONSUL_TOKEN"),
            ..Self::default()
        }
    }

    /// 用环境变量补全未设置的字段
    pub fn merge_env(mut self) -> Self {
        let env = Self::from_env();
        if self.consul_url.is_empty() || self.consul_url == DEFAULT_CONSUL_URL {
            self.consul_url = env.consul_url;
        }
        self.service_name = self.service_name.or(env.service_name);
        self.datacenter = self.datacenter.or(env.datacenter);
        self.host = self.host.or(env.host);
        self.instance = self.instance.or(env.instance);
        self.token = self.token.or(env.token);
        self
    }

    /// 配置中声明的身份；未声明服务名时返回 `Ok(None)`
    pub fn identity(&self) -> Result<Option<ServiceIdentifier>> {
        let Some(service_name) = self.service_name.clone() else {
            return Ok(None);
        };
        let instance = self
            .instance
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        ServiceIdentifier::with_tags(
            service_name,
            self.datacenter.clone(),
            self.host.clone(),
            Some(instance),
            self.tags.clone(),
        )
        .map(Some)
    }

    pub fn catalog_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.catalog_cache_ttl_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
