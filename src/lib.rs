//! Flare Consultant
//!
//! Consul-backed configuration watching and client-side service routing:
//! scoped KV overrides resolved per service identity, long-polled and published to
//! listeners, plus a cached health catalog with pluggable routing strategies.

pub mod config;
pub mod error;
pub mod identity;
pub mod transport;

// 配置分发
pub mod watch;

// 服务发现与注册
pub mod discovery;
pub mod registry;

pub mod client;
pub mod utils;

// Re-exports
pub use client::{Consultant, ConsultantBuilder};
pub use config::ConsultantConfig;
pub use error::{ConsultantError, ErrorCategory, ErrorCode, Result};
pub use identity::{Path, PathParser, ServiceIdentifier};
pub use transport::{ConsulRequest, ConsulResponse, ConsulTransport, ReqwestTransport};

pub use watch::{
    Changes, ConfigListener, ConfigPoller, ConfigValidator, ConfigWriter, ListenerId,
    PollOutcome, SettingChange, SettingListener,
};

pub use discovery::{
    CatalogCache, FairnessTable, NetworkDistance, Randomized, RandomizedWeightedDistance,
    RoundRobin, RoutingStrategy, ServiceInstance, ServiceInstanceBackend, ServiceLocations,
    default_strategy,
};
pub use registry::ServiceRegistrar;
