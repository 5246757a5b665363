//! Consul 健康目录中的服务实例

use serde::{Deserialize, Deserializer, Serialize};

/// 健康检查通过时的状态值
pub const CHECK_PASSING: &str = "passing";

/// 实例所在节点
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "Node")]
    pub node: String,
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "Datacenter", default, skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<String>,
}

impl Node {
    pub fn new(node: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            address: address.into(),
            datacenter: None,
        }
    }
}

/// 注册的服务条目
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Service {
    #[serde(rename = "ID", alias = "Id")]
    pub id: String,
    #[serde(rename = "Service")]
    pub service: String,
    #[serde(rename = "Tags", default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(rename = "Address", default, deserialize_with = "null_as_default")]
    pub address: String,
    #[serde(rename = "Port")]
    pub port: u16,
}

impl Service {
    pub fn new(id: impl Into<String>, service: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            service: service.into(),
            tags: Vec::new(),
            address: String::new(),
            port,
        }
    }
}

/// 单个健康检查结果
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HealthCheck {
    #[serde(rename = "CheckID", default)]
    pub check_id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Output", default, deserialize_with = "null_as_default")]
    pub output: String,
    #[serde(rename = "ServiceID", default, deserialize_with = "null_as_default")]
    pub service_id: String,
}

impl HealthCheck {
    pub fn passing(name: impl Into<String>) -> Self {
        Self::with_status(name, CHECK_PASSING)
    }

    pub fn with_status(name: impl Into<String>, status: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            check_id: name.clone(),
            name,
            status: status.into(),
            output: String::new(),
            service_id: String::new(),
        }
    }

    pub fn is_passing(&self) -> bool {
        self.status == CHECK_PASSING
    }
}

/// `/v1/health/service/<name>` 返回的单个实例
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceInstance {
    #[serde(rename = "Node")]
    node: Node,
    #[serde(rename = "Service")]
    service: Service,
    #[serde(rename = "Checks", default, deserialize_with = "null_as_default")]
    checks: Vec<HealthCheck>,
}

impl ServiceInstance {
    pub fn new(node: Node, service: Service) -> Self {
        Self {
            node,
            service,
            checks: Vec::new(),
        }
    }

    pub fn with_checks(mut self, checks: Vec<HealthCheck>) -> Self {
        self.checks = checks;
        self
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    pub fn checks(&self) -> &[HealthCheck] {
        &self.checks
    }

    /// 所有健康检查均为 passing（没有检查视为通过）
    pub fn is_passing(&self) -> bool {
        self.checks.iter().all(HealthCheck::is_passing)
    }

    /// 可连接地址 `host:port`，服务未声明地址时使用节点地址
    pub fn address(&self) -> String {
        let host = if self.service.address.is_empty() {
            &self.node.address
        } else {
            &self.service.address
        };
        format!("{}:{}", host, self.service.port)
    }

    /// 稳定排序键 (节点名, 服务 ID)
    pub fn sort_key(&self) -> (&str, &str) {
        (&self.node.node, &self.service.id)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
