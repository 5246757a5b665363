//! 服务身份模块
//!
//! `ServiceIdentifier` 描述一个服务进程的层级身份（服务名 / 数据中心 / 主机 / 实例），
//! 同时用于判断某条配置覆盖是否作用于当前进程，以及两条覆盖之间谁更具体。

pub mod path;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConsultantError, Result};
use crate::utils::from_environment;

pub use path::{Path, PathParser};

/// 服务身份
///
/// 未设置的作用域字段在覆盖语义中表示"通配"。构造后不可变。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceIdentifier {
    service_name: String,
    datacenter: Option<String>,
    host_name: Option<String>,
    instance: Option<String>,
    tags: BTreeSet<String>,
}

impl ServiceIdentifier {
    /// 创建新的服务身份
    ///
    /// 服务名必须非空；作用域字段要么不设置，要么是非空字符串。
    pub fn new(
        service_name: impl Into<String>,
        datacenter: Option<String>,
        host_name: Option<String>,
        instance: Option<String>,
    ) -> Result<Self> {
        Self::with_tags(service_name, datacenter, host_name, instance, BTreeSet::new())
    }

    /// 创建带标签的服务身份
    pub fn with_tags(
        service_name: impl Into<String>,
        datacenter: Option<String>,
        host_name: Option<String>,
        instance: Option<String>,
        tags: BTreeSet<String>,
    ) -> Result<Self> {
        let service_name = service_name.into();
        if service_name.is_empty() {
            return Err(ConsultantError::invalid_argument(
                "You must specify a 'serviceName'!",
            ));
        }
        reject_empty("datacenter", &datacenter)?;
        reject_empty("hostName", &host_name)?;
        reject_empty("instance", &instance)?;

        Ok(Self {
            service_name,
            datacenter,
            host_name,
            instance,
            tags,
        })
    }

    /// 仅以服务名构造（所有作用域字段为通配）
    pub fn named(service_name: impl Into<String>) -> Result<Self> {
        Self::new(service_name, None, None, None)
    }

    /// 从环境变量构造身份
    ///
    /// 读取 `SERVICE_NAME`（必填）、`SERVICE_DC`、`SERVICE_HOST`、`SERVICE_INSTANCE`，
    /// 实例名缺省时生成随机 UUID。
    pub fn from_env() -> Result<Self> {
        let service_name = from_environment("SERVICE_NAME").ok_or_else(|| {
            ConsultantError::invalid_argument(
                "You must specify the name of the service using SERVICE_NAME=<service_name>",
            )
        })?;
        let instance = from_environment("SERVICE_INSTANCE")
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Self::new(
            service_name,
            from_environment("SERVICE_DC"),
            from_environment("SERVICE_HOST"),
            Some(instance),
        )
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn datacenter(&self) -> Option<&str> {
        self.datacenter.as_deref()
    }

    pub fn host_name(&self) -> Option<&str> {
        self.host_name.as_deref()
    }

    pub fn instance(&self) -> Option<&str> {
        self.instance.as_deref()
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// 返回补全了缺失作用域字段的新身份，已设置的字段保持不变
    pub fn or_defaults(&self, datacenter: Option<String>, host_name: Option<String>) -> Result<Self> {
        Self::with_tags(
            self.service_name.clone(),
            self.datacenter.clone().or(datacenter),
            self.host_name.clone().or(host_name),
            self.instance.clone(),
            self.tags.clone(),
        )
    }

    /// 判断以 `self` 为作用域的覆盖是否作用于 `target`
    ///
    /// 服务名必须一致；`self` 上设置了的字段必须与 `target` 对应字段相等，
    /// 未设置的字段匹配任意值。方向不可交换。
    pub fn applies_to(&self, target: &ServiceIdentifier) -> bool {
        self.service_name == target.service_name
            && scope_matches(&self.datacenter, &target.datacenter)
            && scope_matches(&self.host_name, &target.host_name)
            && scope_matches(&self.instance, &target.instance)
    }

    /// 判断 `self` 是否比 `other` 更具体
    ///
    /// 按 instance > host > datacenter 的顺序比较，第一个一方拥有而另一方缺少的字段
    /// 决定结果：拥有该字段的一方更具体。三个字段的有无都相同时互不更具体。
    pub fn more_specific_than(&self, other: &ServiceIdentifier) -> bool {
        let fields = [
            (self.instance.is_some(), other.instance.is_some()),
            (self.host_name.is_some(), other.host_name.is_some()),
            (self.datacenter.is_some(), other.datacenter.is_some()),
        ];
        fields
            .into_iter()
            .find(|(mine, theirs)| mine != theirs)
            .is_some_and(|(mine, _)| mine)
    }

    /// 作用域描述符，按 dc / host / instance 的规范顺序
    pub(crate) fn descriptors(&self) -> Vec<String> {
        let mut descriptors = Vec::with_capacity(3);
        if let Some(dc) = &self.datacenter {
            descriptors.push(format!("dc={}", dc));
        }
        if let Some(host) = &self.host_name {
            descriptors.push(format!("host={}", host));
        }
        if let Some(instance) = &self.instance {
            descriptors.push(format!("instance={}", instance));
        }
        descriptors
    }
}

fn reject_empty(field: &str, value: &Option<String>) -> Result<()> {
    match value {
        Some(v) if v.is_empty() => Err(ConsultantError::invalid_argument(format!(
            "You cannot specify '{}' as empty String!",
            field
        ))),
        _ => Ok(()),
    }
}

fn scope_matches(scope: &Option<String>, target: &Option<String>) -> bool {
    match (scope, target) {
        (Some(expected), Some(actual)) => expected == actual,
        (Some(_), None) => false,
        (None, _) => true,
    }
}

impl fmt::Display for ServiceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.service_name)?;
        let descriptors = self.descriptors();
        if !descriptors.is_empty() {
            write!(f, "[{}]", descriptors.join(","))?;
        }
        Ok(())
    }
}
