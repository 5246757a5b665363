//! 配置分发引擎
//!
//! 通过 Consul 阻塞查询持续拉取本服务的 KV 配置，按身份特异性解析覆盖，
//! 与上一次发布的配置做差异比较，并向订阅者分发细粒度的变更通知。

pub mod listener;
pub mod poller;
pub mod resolver;
pub mod sync;
pub mod writer;

pub use listener::{ConfigListener, ConfigValidator, ListenerId, ListenerRegistry, SettingListener};
pub use poller::{ConfigPoller, ConfigSink, PollOutcome};
pub use resolver::{KeyValueEntry, resolve};
pub use sync::{Changes, SettingChange, sync};
pub use writer::ConfigWriter;
