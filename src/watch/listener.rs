//! 配置订阅者与校验器

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use super::sync::Changes;

/// 整体配置订阅者：每次发布新配置时收到完整配置
pub trait ConfigListener: Send + Sync {
    fn on_config_update(&self, config: &HashMap<String, String>);
}

impl<F> ConfigListener for F
where
    F: Fn(&HashMap<String, String>) + Send + Sync,
{
    fn on_config_update(&self, config: &HashMap<String, String>) {
        self(config)
    }
}

/// 单项配置订阅者：订阅的配置项变化时收到 (名称, 旧值, 新值)
pub trait SettingListener: Send + Sync {
    fn on_setting_update(&self, key: &str, old_value: Option<&str>, new_value: Option<&str>);
}

impl<F> SettingListener for F
where
    F: Fn(&str, Option<&str>, Option<&str>) + Send + Sync,
{
    fn on_setting_update(&self, key: &str, old_value: Option<&str>, new_value: Option<&str>) {
        self(key, old_value, new_value)
    }
}

/// 配置校验器
///
/// 返回 `Err` 表示拒绝该配置：候选配置整体丢弃，已发布配置保持不变。
pub trait ConfigValidator: Send + Sync {
    fn validate_config(&self, config: &HashMap<String, String>) -> anyhow::Result<()>;
}

impl<F> ConfigValidator for F
where
    F: Fn(&HashMap<String, String>) -> anyhow::Result<()> + Send + Sync,
{
    fn validate_config(&self, config: &HashMap<String, String>) -> anyhow::Result<()> {
        self(config)
    }
}

/// 订阅句柄，用于取消订阅
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// 订阅者注册表
///
/// 可在任意线程增删订阅者；分发时先复制订阅者列表再回调，回调中可以安全地增删订阅。
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    config_listeners: DashMap<ListenerId, Arc<dyn ConfigListener>>,
    setting_listeners: DashMap<String, Vec<(ListenerId, Arc<dyn SettingListener>)>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn add_config_listener(&self, listener: Arc<dyn ConfigListener>) -> ListenerId {
        let id = self.allocate_id();
        self.config_listeners.insert(id, listener);
        id
    }

    pub fn remove_config_listener(&self, id: ListenerId) -> bool {
        self.config_listeners.remove(&id).is_some()
    }

    pub fn add_setting_listener(
        &self,
        key: impl Into<String>,
        listener: Arc<dyn SettingListener>,
    ) -> ListenerId {
        let id = self.allocate_id();
        self.setting_listeners
            .entry(key.into())
            .or_default()
            .push((id, listener));
        id
    }

    pub fn remove_setting_listener(&self, key: &str, id: ListenerId) -> bool {
        let removed = match self.setting_listeners.get_mut(key) {
            Some(mut listeners) => {
                let before = listeners.len();
                listeners.retain(|(listener_id, _)| *listener_id != id);
                before != listeners.len()
            }
            None => false,
        };
        self.setting_listeners
            .remove_if(key, |_, listeners| listeners.is_empty());
        removed
    }

    /// 当前整体配置订阅者快照（按注册顺序）
    pub fn config_listeners(&self) -> Vec<Arc<dyn ConfigListener>> {
        let mut listeners: Vec<(ListenerId, Arc<dyn ConfigListener>)> = self
            .config_listeners
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        listeners.sort_by_key(|(id, _)| *id);
        listeners.into_iter().map(|(_, listener)| listener).collect()
    }

    /// 指定配置项的订阅者快照
    pub fn setting_listeners(&self, key: &str) -> Vec<Arc<dyn SettingListener>> {
        self.setting_listeners
            .get(key)
            .map(|listeners| listeners.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default()
    }

    /// 分发变更
    ///
    /// 变更为空时不回调任何订阅者；否则先逐个回调整体订阅者，再回调受影响配置项的订阅者。
    pub fn dispatch(&self, config: &HashMap<String, String>, changes: &Changes) {
        if changes.is_empty() {
            return;
        }

        for listener in self.config_listeners() {
            listener.on_config_update(config);
        }

        for (key, change) in changes {
            for listener in self.setting_listeners(key) {
                listener.on_setting_update(
                    key,
                    change.old_value.as_deref(),
                    change.new_value.as_deref(),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::sync::SettingChange;
    use std::sync::Mutex;

    #[test]
    fn setting_listener_can_be_removed_once() {
        let registry = ListenerRegistry::new();
        let id = registry.add_setting_listener(
            "some-key",
            Arc::new(|_: &str, _: Option<&str>, _: Option<&str>| {}),
        );

        assert!(registry.remove_setting_listener("some-key", id));
        assert!(!registry.remove_setting_listener("some-key", id));
        assert!(registry.setting_listeners("some-key").is_empty());
    }

    #[test]
    fn listener_may_unsubscribe_itself_during_dispatch() {
        let registry = Arc::new(ListenerRegistry::new());
        let own_id: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let registry_ref = registry.clone();
        let own_id_ref = own_id.clone();
        let id = registry.add_config_listener(Arc::new(move |_: &HashMap<String, String>| {
            if let Some(id) = *own_id_ref.lock().unwrap() {
                registry_ref.remove_config_listener(id);
            }
        }));
        *own_id.lock().unwrap() = Some(id);

        let mut changes = Changes::new();
        changes.insert(
            "k".into(),
            SettingChange {
                old_value: None,
                new_value: Some("v".into()),
            },
        );
        registry.dispatch(&HashMap::new(), &changes);

        assert!(registry.config_listeners().is_empty());
    }
}
