//! Consul agent 注册
//!
//! 将本服务实例注册到本地 Consul agent（附带 HTTP 健康检查），以及查询 agent 自身信息。

pub mod agent;
pub mod consul;

pub use agent::{AgentSelf, agent_self};
pub use consul::ServiceRegistrar;
