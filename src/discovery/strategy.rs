//! 客户端路由策略
//!
//! 所有策略共享同一个基础序列（网络距离）：本地数据中心的实例优先，
//! 其余数据中心按发现顺序的逆序依次作为回退层，每层在前一层耗尽后才取数。

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use futures::FutureExt;
use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::{ConsultantError, Result};

use super::catalog::ServiceInstanceBackend;
use super::instance::ServiceInstance;
use super::locations::{InstanceIter, ServiceLocations};

/// 默认的加权距离阈值
pub const DEFAULT_WEIGHT_THRESHOLD: f64 = 0.5;

/// 路由策略
pub trait RoutingStrategy: Send + Sync {
    /// 为 `service_name` 生成新的实例游标
    fn locate_instances(
        &self,
        backend: Arc<dyn ServiceInstanceBackend>,
        service_name: &str,
    ) -> ServiceLocations;

    /// 清除策略持有的共享状态
    fn reset(&self) {}
}

/// 默认策略：阈值 0.5 的随机加权距离
pub fn default_strategy() -> Arc<dyn RoutingStrategy> {
    Arc::new(RandomizedWeightedDistance::default())
}

fn tier(
    backend: Arc<dyn ServiceInstanceBackend>,
    service_name: String,
    datacenter: Option<String>,
) -> ServiceLocations {
    ServiceLocations::new(move || {
        let backend = backend.clone();
        let service_name = service_name.clone();
        let datacenter = datacenter.clone();
        async move {
            let instances = backend
                .list_instances(&service_name, datacenter.as_deref())
                .await?;
            Ok(Box::new(instances.into_iter()) as InstanceIter)
        }
        .boxed()
    })
}

async fn remote_tiers(
    backend: Arc<dyn ServiceInstanceBackend>,
    service_name: String,
) -> Result<Option<ServiceLocations>> {
    let local = backend.datacenter().map(str::to_string);
    let mut datacenters = backend.list_datacenters().await?;
    datacenters.reverse();

    let chain = datacenters
        .into_iter()
        .filter(|dc| Some(dc) != local.as_ref())
        .rev()
        .fold(None, |next: Option<ServiceLocations>, dc| {
            let current = tier(backend.clone(), service_name.clone(), Some(dc));
            Some(match next {
                Some(next) => current.with_fallback(next),
                None => current,
            })
        });
    Ok(chain)
}

/// 网络距离：近端优先，顺序与目录返回的顺序一致
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkDistance;

impl RoutingStrategy for NetworkDistance {
    fn locate_instances(
        &self,
        backend: Arc<dyn ServiceInstanceBackend>,
        service_name: &str,
    ) -> ServiceLocations {
        let service_name = service_name.to_string();
        let fallback_backend = backend.clone();
        let fallback_service = service_name.clone();
        tier(backend, service_name, None).with_deferred_fallback(move || {
            remote_tiers(fallback_backend.clone(), fallback_service.clone()).boxed()
        })
    }
}

/// 每层内部随机打乱，不跨层调整顺序
#[derive(Debug, Clone, Copy, Default)]
pub struct Randomized;

impl RoutingStrategy for Randomized {
    fn locate_instances(
        &self,
        backend: Arc<dyn ServiceInstanceBackend>,
        service_name: &str,
    ) -> ServiceLocations {
        NetworkDistance
            .locate_instances(backend, service_name)
            .map(|instances| {
                let mut instances: Vec<ServiceInstance> = instances.collect();
                instances.shuffle(&mut rand::thread_rng());
                Box::new(instances.into_iter())
            })
    }
}

/// 随机加权距离
///
/// 最近一层中，每个位置以 `threshold` 的概率被跳过，直到某个位置"命中"或到达末尾；
/// 命中的实例被轮转到队首，其余实例保持相对顺序。回退层不做调整。
#[derive(Debug, Clone, Copy)]
pub struct RandomizedWeightedDistance {
    threshold: f64,
}

impl Default for RandomizedWeightedDistance {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_WEIGHT_THRESHOLD,
        }
    }
}

impl RandomizedWeightedDistance {
    pub fn new(threshold: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConsultantError::invalid_argument(format!(
                "threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

/// 以几何分布挑选起始位置
pub fn pick_weighted_index<R: Rng + ?Sized>(len: usize, threshold: f64, rng: &mut R) -> usize {
    let mut index = 0;
    while index + 1 < len && rng.r#gen::<f64>() < threshold {
        index += 1;
    }
    index
}

impl RoutingStrategy for RandomizedWeightedDistance {
    fn locate_instances(
        &self,
        backend: Arc<dyn ServiceInstanceBackend>,
        service_name: &str,
    ) -> ServiceLocations {
        let threshold = self.threshold;
        NetworkDistance
            .locate_instances(backend, service_name)
            .map_primary(move |instances| {
                let mut instances: Vec<ServiceInstance> = instances.collect();
                if instances.len() > 1 {
                    let index =
                        pick_weighted_index(instances.len(), threshold, &mut rand::thread_rng());
                    instances.rotate_left(index);
                }
                Box::new(instances.into_iter())
            })
    }
}

/// 轮询公平表：服务名 -> 最近一次交出的实例
///
/// 同一策略产生的所有游标共享此表，使并发调用方依次拿到不同实例。
#[derive(Debug, Default)]
pub struct FairnessTable {
    last_requested: DashMap<String, ServiceInstance>,
}

impl FairnessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self, service_name: &str) -> Option<ServiceInstance> {
        self.last_requested
            .get(service_name)
            .map(|entry| entry.value().clone())
    }

    pub fn record(&self, service_name: &str, instance: &ServiceInstance) {
        self.last_requested
            .insert(service_name.to_string(), instance.clone());
    }

    pub fn clear(&self) {
        self.last_requested.clear();
    }
}

struct RoundRobinInstances {
    service_name: String,
    instances: Vec<ServiceInstance>,
    attempted: HashSet<usize>,
    fairness: Arc<FairnessTable>,
}

impl Iterator for RoundRobinInstances {
    type Item = ServiceInstance;

    fn next(&mut self) -> Option<ServiceInstance> {
        let len = self.instances.len();
        if self.attempted.len() >= len {
            return None;
        }

        let start = self
            .fairness
            .last(&self.service_name)
            .and_then(|last| {
                self.instances
                    .iter()
                    .position(|i| i.sort_key() == last.sort_key())
            })
            .map_or(0, |position| position + 1);

        let index = (start..start + len)
            .map(|i| i % len)
            .find(|i| !self.attempted.contains(i))?;
        self.attempted.insert(index);
        let instance = self.instances[index].clone();
        self.fairness.record(&self.service_name, &instance);
        Some(instance)
    }
}

/// 轮询：按 (节点名, 服务 ID) 稳定排序，从上一次交出的实例之后开始
#[derive(Debug, Default)]
pub struct RoundRobin {
    fairness: Arc<FairnessTable>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用外部持有的公平表
    pub fn with_fairness(fairness: Arc<FairnessTable>) -> Self {
        Self { fairness }
    }

    pub fn fairness(&self) -> &Arc<FairnessTable> {
        &self.fairness
    }
}

impl RoutingStrategy for RoundRobin {
    fn locate_instances(
        &self,
        backend: Arc<dyn ServiceInstanceBackend>,
        service_name: &str,
    ) -> ServiceLocations {
        let tier_fairness = self.fairness.clone();
        let tier_service = service_name.to_string();
        let listener_fairness = self.fairness.clone();
        let listener_service = service_name.to_string();

        NetworkDistance
            .locate_instances(backend, service_name)
            .map(move |instances| {
                let mut instances: Vec<ServiceInstance> = instances.collect();
                instances.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
                Box::new(RoundRobinInstances {
                    service_name: tier_service.clone(),
                    instances,
                    attempted: HashSet::new(),
                    fairness: tier_fairness.clone(),
                })
            })
            .with_listener(move |taken| listener_fairness.record(&listener_service, taken))
    }

    fn reset(&self) {
        self.fairness.clear();
    }
}
