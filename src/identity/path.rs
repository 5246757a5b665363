//! Consul KV 键路径编解码
//!
//! 键的编码格式：
//!
//! ```text
//! [prefix/]serviceName[/[dc=<v>,host=<v>,instance=<v>]][/|.]<key>
//! ```
//!
//! 渲染时作用域字段按 dc、host、instance 的规范顺序输出；解析时接受任意顺序与任意子集。

use std::fmt;

use crate::error::{ConsultantError, Result};
use crate::identity::ServiceIdentifier;

/// 解码后的 KV 键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    prefix: Option<String>,
    id: ServiceIdentifier,
    key: Option<String>,
}

impl Path {
    pub fn new(prefix: Option<String>, id: ServiceIdentifier, key: Option<String>) -> Self {
        Self {
            prefix: prefix.filter(|p| !p.is_empty()),
            id,
            key: key.filter(|k| !k.is_empty()),
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn id(&self) -> &ServiceIdentifier {
        &self.id
    }

    /// 配置项名称；目录占位键没有名称
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn is_directory(&self) -> bool {
        self.key.is_none()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(self.prefix(), &self.id, self.key()))
    }
}

/// 将 (prefix, 身份, 配置名) 渲染为 KV 键
pub fn render(prefix: Option<&str>, id: &ServiceIdentifier, key: Option<&str>) -> String {
    let mut rendered = String::new();
    if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
        rendered.push_str(prefix);
        rendered.push('/');
    }
    rendered.push_str(id.service_name());

    let descriptors = id.descriptors();
    if !descriptors.is_empty() {
        rendered.push_str("/[");
        rendered.push_str(&descriptors.join(","));
        rendered.push(']');
    }
    if let Some(key) = key.filter(|k| !k.is_empty()) {
        rendered.push('/');
        rendered.push_str(key);
    }
    rendered
}

/// KV 键解析器
pub struct PathParser;

impl PathParser {
    /// 解析 KV 键
    ///
    /// 前缀不匹配时返回 `Ok(None)`；空路径、空服务名或空作用域值返回参数错误。
    pub fn parse(prefix: Option<&str>, path: &str) -> Result<Option<Path>> {
        if path.is_empty() {
            return Err(ConsultantError::invalid_argument(
                "You must specify an 'path'!",
            ));
        }

        let prefix = prefix.filter(|p| !p.is_empty());
        let tail = match prefix {
            Some(prefix) => match path
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix('/'))
            {
                Some(rest) => rest,
                None => return Ok(None),
            },
            None => path,
        };

        let mut scope = Scope::default();
        let (service_name, key) = if let Some(index) = tail.find("/[") {
            let block = &tail[index + 2..];
            let close = block.find(']').ok_or_else(|| {
                ConsultantError::invalid_argument(format!(
                    "Unterminated scope block in path '{}'",
                    path
                ))
            })?;
            for field in block[..close].split(',') {
                scope.accept(field);
            }

            let rest = &block[close + 1..];
            let rest = rest
                .strip_prefix('.')
                .or_else(|| rest.strip_prefix('/'))
                .unwrap_or(rest);
            (&tail[..index], rest)
        } else if let Some((service_name, rest)) = tail.split_once('/') {
            (service_name, rest)
        } else {
            (tail, "")
        };

        let id = ServiceIdentifier::new(service_name, scope.datacenter, scope.host, scope.instance)?;
        Ok(Some(Path::new(
            prefix.map(String::from),
            id,
            Some(key.to_string()),
        )))
    }
}

#[derive(Default)]
struct Scope {
    datacenter: Option<String>,
    host: Option<String>,
    instance: Option<String>,
}

impl Scope {
    /// 接受一个 `name=value` 字段；同名字段只取第一次出现的值，未知字段忽略
    fn accept(&mut self, field: &str) {
        let Some((name, value)) = field.split_once('=') else {
            return;
        };
        let value = value.trim_start().to_string();
        let slot = match name.trim_end() {
            "dc" => &mut self.datacenter,
            "host" => &mut self.host,
            "instance" => &mut self.instance,
            _ => return,
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }
}
