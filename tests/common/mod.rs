//! 测试公共设施
//!
//! - [`ScriptedTransport`]：按 URL 前缀回放预设响应的 Consul 传输层
//! - [`FakeBackend`]：两个数据中心、三个服务的固定目录

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flare_consultant::discovery::{Node, Service};
use flare_consultant::{
    ConsulRequest, ConsulResponse, ConsulTransport, ConsultantError, Result, ServiceInstance,
    ServiceInstanceBackend,
};
use serde_json::json;

pub const CONSUL: &str = "http://consul.test";

#[derive(Clone)]
enum Scripted {
    Respond(ConsulResponse),
    Delayed(Duration, ConsulResponse),
    Fail(String),
    Hang,
}

/// 脚本化传输层
///
/// 每个 URL 前缀（不含 [`CONSUL`]）对应一个响应队列，取到最后一个时重复返回它；
/// 多个前缀匹配时取最长的。没有匹配的请求返回 404。
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<(String, VecDeque<Scripted>)>>,
    requests: Mutex<Vec<ConsulRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, prefix: &str, scripted: Scripted) {
        let mut routes = self.routes.lock().unwrap();
        match routes.iter_mut().find(|(p, _)| p == prefix) {
            Some((_, queue)) => queue.push_back(scripted),
            None => routes.push((prefix.to_string(), VecDeque::from([scripted]))),
        }
    }

    pub fn respond(&self, prefix: &str, response: ConsulResponse) -> &Self {
        self.push(prefix, Scripted::Respond(response));
        self
    }

    /// 延迟 `delay` 后返回
    pub fn respond_after(&self, prefix: &str, delay: Duration, response: ConsulResponse) -> &Self {
        self.push(prefix, Scripted::Delayed(delay, response));
        self
    }

    pub fn fail(&self, prefix: &str, message: &str) -> &Self {
        self.push(prefix, Scripted::Fail(message.to_string()));
        self
    }

    /// 请求永不返回，用于验证关闭时取消在途请求
    pub fn hang(&self, prefix: &str) -> &Self {
        self.push(prefix, Scripted::Hang);
        self
    }

    pub fn requests(&self) -> Vec<ConsulRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, prefix: &str) -> Vec<ConsulRequest> {
        let full = format!("{}{}", CONSUL, prefix);
        self.requests()
            .into_iter()
            .filter(|r| r.url.starts_with(&full))
            .collect()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.requests_to(prefix).len()
    }

    fn next_for(&self, url: &str) -> Option<Scripted> {
        let path = url.strip_prefix(CONSUL).unwrap_or(url);
        let mut routes = self.routes.lock().unwrap();
        let (_, queue) = routes
            .iter_mut()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl ConsulTransport for ScriptedTransport {
    async fn execute(&self, request: ConsulRequest) -> Result<ConsulResponse> {
        let scripted = self.next_for(&request.url);
        self.requests.lock().unwrap().push(request);
        match scripted {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Delayed(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            Some(Scripted::Fail(message)) => Err(ConsultantError::transport(message)),
            Some(Scripted::Hang) => futures::future::pending().await,
            None => Ok(ConsulResponse::new(404, "")),
        }
    }
}

/// KV 递归读取的响应体
pub fn kv_body(entries: &[(&str, &str)]) -> String {
    let entries: Vec<_> = entries
        .iter()
        .map(|(key, value)| json!({"Key": key, "Value": STANDARD.encode(value), "ModifyIndex": 1}))
        .collect();
    serde_json::Value::Array(entries).to_string()
}

pub fn kv_response(index: u64, entries: &[(&str, &str)]) -> ConsulResponse {
    ConsulResponse::new(200, kv_body(entries)).with_index(index.to_string())
}

pub fn agent_self_response(datacenter: &str, node_name: &str) -> ConsulResponse {
    ConsulResponse::new(
        200,
        json!({"Config": {"Datacenter": datacenter, "NodeName": node_name}}).to_string(),
    )
}

/// 健康目录响应体：每项为 (节点名, 地址, 检查状态列表)
pub fn health_body(service: &str, instances: &[(&str, &str, &[&str])]) -> String {
    let entries: Vec<_> = instances
        .iter()
        .map(|(node, address, statuses)| {
            let checks: Vec<_> = statuses
                .iter()
                .enumerate()
                .map(|(i, status)| json!({"CheckID": format!("check-{}", i), "Name": "check", "Status": status}))
                .collect();
            json!({
                "Node": {"Node": node, "Address": address},
                "Service": {"ID": format!("{}-{}", service, node), "Service": service, "Tags": [], "Address": "", "Port": 8080},
                "Checks": checks,
            })
        })
        .collect();
    serde_json::Value::Array(entries).to_string()
}

pub const SERVICE_1: &str = "hello";
pub const SERVICE_2: &str = "world";
pub const SERVICE_3: &str = "foobar";

pub fn instance(node: &str, address: &str, service: &str) -> ServiceInstance {
    let mut entry = Service::new(service, service, 8080);
    entry.address = address.to_string();
    ServiceInstance::new(Node::new(node, address), entry)
}

/// dc1（本地）与 dc2 两个数据中心的固定目录
pub struct FakeBackend {
    instances: HashMap<(String, String), Vec<ServiceInstance>>,
    calls: Mutex<Vec<(String, Option<String>)>>,
    datacenter_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        let mut instances = HashMap::new();
        for service in [SERVICE_1, SERVICE_2, SERVICE_3] {
            instances.insert(
                ("dc1".to_string(), service.to_string()),
                vec![
                    instance("app1", "10.0.0.1", service),
                    instance("app2", "10.0.0.2", service),
                    instance("app3", "10.0.0.3", service),
                ],
            );
            instances.insert(("dc2".to_string(), service.to_string()), Vec::new());
        }
        instances.insert(
            ("dc2".to_string(), SERVICE_1.to_string()),
            vec![instance("app1", "10.0.1.1", SERVICE_1)],
        );

        Arc::new(Self {
            instances,
            calls: Mutex::new(Vec::new()),
            datacenter_calls: AtomicUsize::new(0),
        })
    }

    pub fn dc1(service: &str, node: usize) -> ServiceInstance {
        instance(&format!("app{}", node), &format!("10.0.0.{}", node), service)
    }

    pub fn dc2(service: &str) -> ServiceInstance {
        instance("app1", "10.0.1.1", service)
    }

    /// 按调用顺序记录的 (服务名, 数据中心)
    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn datacenter_calls(&self) -> usize {
        self.datacenter_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceInstanceBackend for FakeBackend {
    fn datacenter(&self) -> Option<&str> {
        Some("dc1")
    }

    async fn list_instances(
        &self,
        service_name: &str,
        datacenter: Option<&str>,
    ) -> Result<Vec<ServiceInstance>> {
        self.calls
            .lock()
            .unwrap()
            .push((service_name.to_string(), datacenter.map(str::to_string)));
        let dc = datacenter.unwrap_or("dc1").to_string();
        self.instances
            .get(&(dc.clone(), service_name.to_string()))
            .cloned()
            .ok_or_else(|| ConsultantError::invalid_argument(format!("Invalid datacenter: {}", dc)))
    }

    async fn list_datacenters(&self) -> Result<Vec<String>> {
        self.datacenter_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec!["dc1".to_string(), "dc2".to_string()])
    }
}

/// 取尽游标
pub async fn drain(mut locations: flare_consultant::ServiceLocations) -> Vec<ServiceInstance> {
    let mut instances = Vec::new();
    while let Some(instance) = locations.next().await.unwrap() {
        instances.push(instance);
    }
    instances
}
