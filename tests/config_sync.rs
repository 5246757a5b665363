//! 配置差异与分发测试

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use flare_consultant::watch::{ListenerRegistry, sync};
use flare_consultant::SettingChange;

fn map(entries: &[(&str, &str)]) -> HashMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn change(old: Option<&str>, new: Option<&str>) -> SettingChange {
    SettingChange {
        old_value: old.map(String::from),
        new_value: new.map(String::from),
    }
}

#[test]
fn source_settings_are_transferred() {
    let mut target = HashMap::new();
    let changes = sync(&map(&[("key-1", "some-value")]), &mut target);

    assert_eq!(target, map(&[("key-1", "some-value")]));
    assert_eq!(changes["key-1"], change(None, Some("some-value")));
}

#[test]
fn settings_missing_from_source_are_removed() {
    let mut target = map(&[("key-1", "some-value")]);
    let changes = sync(&HashMap::new(), &mut target);

    assert!(target.is_empty());
    assert_eq!(changes["key-1"], change(Some("some-value"), None));
}

#[test]
fn source_values_override_target_values() {
    let mut target = map(&[("key-1", "some-other-value")]);
    let changes = sync(&map(&[("key-1", "some-value")]), &mut target);

    assert_eq!(target["key-1"], "some-value");
    assert_eq!(changes["key-1"], change(Some("some-other-value"), Some("some-value")));
}

#[test]
fn merge_adds_modifies_and_removes() {
    let source = map(&[("key-1", "some-value"), ("key-2", "other-value")]);
    let mut target = map(&[("key-1", "some-other-value"), ("key-3", "new-value")]);

    let changes = sync(&source, &mut target);

    assert_eq!(target, source);
    assert_eq!(changes.len(), 3);
    assert_eq!(changes["key-2"], change(None, Some("other-value")));
    assert_eq!(changes["key-3"], change(Some("new-value"), None));
}

#[test]
fn syncing_twice_is_idempotent() {
    let source = map(&[("key-1", "some-value"), ("key-2", "other-value")]);
    let mut target = HashMap::new();

    sync(&source, &mut target);
    let second = sync(&source, &mut target);

    assert!(second.is_empty());
    assert_eq!(target, source);
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[test]
fn whole_config_listeners_fire_before_setting_listeners() {
    let recorder = Arc::new(Recorder::default());
    let registry = ListenerRegistry::new();

    let r = recorder.clone();
    registry.add_config_listener(Arc::new(move |config: &HashMap<String, String>| {
        r.push(format!("config:{}", config.len()))
    }));
    let r = recorder.clone();
    registry.add_setting_listener(
        "key-1",
        Arc::new(move |key: &str, old: Option<&str>, new: Option<&str>| {
            r.push(format!("{}:{:?}->{:?}", key, old, new))
        }),
    );
    let r = recorder.clone();
    registry.add_setting_listener(
        "untouched",
        Arc::new(move |key: &str, _: Option<&str>, _: Option<&str>| r.push(key.to_string())),
    );

    let mut published = map(&[("key-1", "a")]);
    let changes = sync(&map(&[("key-1", "b"), ("key-2", "c")]), &mut published);
    registry.dispatch(&published, &changes);

    assert_eq!(
        recorder.events(),
        vec![
            "config:2".to_string(),
            "key-1:Some(\"a\")->Some(\"b\")".to_string(),
        ]
    );
}

#[test]
fn empty_change_set_notifies_nobody() {
    let recorder = Arc::new(Recorder::default());
    let registry = ListenerRegistry::new();
    let r = recorder.clone();
    registry.add_config_listener(Arc::new(move |_: &HashMap<String, String>| {
        r.push("config".into())
    }));

    let mut published = map(&[("key-1", "a")]);
    let changes = sync(&map(&[("key-1", "a")]), &mut published);
    registry.dispatch(&published, &changes);

    assert!(recorder.events().is_empty());
}
