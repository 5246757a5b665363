//! 服务发现与客户端路由
//!
//! - [`CatalogCache`]：带 TTL 与单飞语义的 Consul 健康目录缓存
//! - [`ServiceLocations`]：惰性、按数据中心分层回退的实例游标
//! - [`RoutingStrategy`]：基于游标的客户端负载均衡策略

pub mod catalog;
pub mod instance;
pub mod locations;
pub mod strategy;

pub use catalog::{CatalogCache, ServiceInstanceBackend};
pub use instance::{HealthCheck, Node, Service, ServiceInstance};
pub use locations::{InstanceIter, ServiceLocations};
pub use strategy::{
    FairnessTable, NetworkDistance, Randomized, RandomizedWeightedDistance, RoundRobin,
    RoutingStrategy, default_strategy,
};
