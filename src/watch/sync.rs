//! 配置差异计算

use std::collections::{BTreeMap, HashMap};

/// 单个配置项的变更（旧值 / 新值，缺失表示新增或删除）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingChange {
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// 配置项名称 -> 变更
pub type Changes = BTreeMap<String, SettingChange>;

/// 将 `source` 同步到 `target`，返回变更集合
///
/// 只在 `source` 中的键为新增，只在 `target` 中的键为删除，两边都有且值不同的键为修改。
/// 值相同的键不会出现在结果中。调用后 `target` 与 `source` 完全一致。
pub fn sync(source: &HashMap<String, String>, target: &mut HashMap<String, String>) -> Changes {
    let mut changes = Changes::new();

    for (key, new_value) in source {
        match target.insert(key.clone(), new_value.clone()) {
            Some(old_value) if &old_value == new_value => {}
            old_value => {
                changes.insert(
                    key.clone(),
                    SettingChange {
                        old_value,
                        new_value: Some(new_value.clone()),
                    },
                );
            }
        }
    }

    let removed: Vec<String> = target
        .keys()
        .filter(|key| !source.contains_key(*key))
        .cloned()
        .collect();
    for key in removed {
        let old_value = target.remove(&key);
        changes.insert(
            key,
            SettingChange {
                old_value,
                new_value: None,
            },
        );
    }

    changes
}
