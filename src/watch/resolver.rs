//! 配置覆盖解析
//!
//! 将 Consul KV 的递归读取结果解析为扁平的 `名称 -> 值` 映射：
//! 只保留作用于本服务身份的条目，同名条目取最具体的一个。

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::identity::{PathParser, ServiceIdentifier};

/// `/v1/kv/<prefix>/<service>/?recurse=true` 返回的单个条目
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeyValueEntry {
    #[serde(rename = "Key")]
    pub key: String,
    /// base64 编码的值；目录占位键为 `null`
    #[serde(rename = "Value", default)]
    pub value: Option<String>,
    #[serde(rename = "ModifyIndex", default)]
    pub modify_index: u64,
}

impl KeyValueEntry {
    pub fn new(key: impl Into<String>, value: Option<&str>) -> Self {
        Self {
            key: key.into(),
            value: value.map(|v| STANDARD.encode(v)),
            modify_index: 0,
        }
    }
}

struct Candidate<'a> {
    scope: ServiceIdentifier,
    value: Option<&'a str>,
}

/// 解析 KV 条目
///
/// 无法解析的键、目录占位键、前缀不匹配或不作用于 `identity` 的条目都会被忽略。
/// 同名配置项中更具体的覆盖胜出；同等具体时先出现的保留。
/// 胜出条目的值解码失败时整体返回错误。
pub fn resolve(
    prefix: &str,
    identity: &ServiceIdentifier,
    entries: &[KeyValueEntry],
) -> Result<HashMap<String, String>> {
    let mut candidates: HashMap<String, Candidate<'_>> = HashMap::new();

    for entry in entries {
        let path = match PathParser::parse(Some(prefix), &entry.key) {
            Ok(Some(path)) => path,
            Ok(None) => continue,
            Err(e) => {
                debug!(key = %entry.key, error = %e, "Skipping unparsable config key");
                continue;
            }
        };
        let Some(name) = path.key() else {
            continue;
        };
        if !path.id().applies_to(identity) {
            continue;
        }

        let replace = match candidates.get(name) {
            Some(current) => path.id().more_specific_than(&current.scope),
            None => true,
        };
        if replace {
            candidates.insert(
                name.to_string(),
                Candidate {
                    scope: path.id().clone(),
                    value: entry.value.as_deref(),
                },
            );
        }
    }

    let mut config = HashMap::with_capacity(candidates.len());
    for (name, candidate) in candidates {
        let value = match candidate.value {
            Some(encoded) => decode_value(encoded).inspect_err(|e| {
                warn!(key = %name, scope = %candidate.scope, error = %e, "Failed to decode config value");
            })?,
            None => String::new(),
        };
        config.insert(name, value);
    }
    Ok(config)
}

fn decode_value(encoded: &str) -> Result<String> {
    let bytes = STANDARD.decode(encoded)?;
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> ServiceIdentifier {
        ServiceIdentifier::new("oauth", Some("eu-central".into()), Some("web-1".into()), Some("master".into()))
            .unwrap()
    }

    #[test]
    fn most_specific_override_wins_regardless_of_order() {
        let entries = vec![
            KeyValueEntry::new("config/oauth/[instance=master]/timeout", Some("3")),
            KeyValueEntry::new("config/oauth/timeout", Some("1")),
            KeyValueEntry::new("config/oauth/[dc=eu-central]/timeout", Some("2")),
        ];

        let config = resolve("config", &identity(), &entries).unwrap();
        assert_eq!(config.get("timeout").map(String::as_str), Some("3"));
    }

    #[test]
    fn entries_for_other_scopes_are_ignored() {
        let entries = vec![
            KeyValueEntry::new("config/oauth/[dc=us-east]/timeout", Some("2")),
            KeyValueEntry::new("config/oauth/[host=web-2]/retries", Some("5")),
            KeyValueEntry::new("config/billing/timeout", Some("9")),
            KeyValueEntry::new("other/oauth/timeout", Some("7")),
        ];

        assert!(resolve("config", &identity(), &entries).unwrap().is_empty());
    }

    #[test]
    fn directory_and_malformed_keys_are_skipped() {
        let entries = vec![
            KeyValueEntry::new("config/oauth/", None),
            KeyValueEntry::new("config/oauth/[dc=eu-central", Some("x")),
            KeyValueEntry::new("config/oauth/some.key", Some("some-value")),
        ];

        let config = resolve("config", &identity(), &entries).unwrap();
        assert_eq!(config.len(), 1);
        assert_eq!(config["some.key"], "some-value");
    }

    #[test]
    fn undecodable_winning_value_fails_the_resolution() {
        let mut entry = KeyValueEntry::new("config/oauth/key", None);
        entry.value = Some("%%% not base64 %%%".into());

        assert!(resolve("config", &identity(), &[entry]).is_err());
    }
}
