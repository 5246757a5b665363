//! 配置长轮询
//!
//! 对 `/v1/kv/<prefix>/<service>/?recurse=true` 发起 Consul 阻塞查询。
//! 每轮请求携带上一轮记录的 `X-Consul-Index`，服务端在配置变化或等待超时后返回。
//! 每轮结束后根据结果安排下一轮：
//!
//! | 结果                         | 下一轮延迟 |
//! |------------------------------|-----------|
//! | 200 成功应用                  | 500ms     |
//! | 204 / 504 无变化              | 500ms     |
//! | 404 配置不存在                | 5s        |
//! | 其他状态码、传输或解析失败     | 60s       |
//! | 接收方 panic                  | 60s       |

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ConsultantError, Result};
use crate::identity::ServiceIdentifier;
use crate::transport::{ConsulRequest, ConsulResponse, ConsulTransport};

use super::resolver::{KeyValueEntry, resolve};

pub const APPLIED_DELAY: Duration = Duration::from_millis(500);
pub const NOT_FOUND_DELAY: Duration = Duration::from_secs(5);
pub const FAILURE_DELAY: Duration = Duration::from_secs(60);

/// 新配置的接收方
pub type ConfigSink = Arc<dyn Fn(HashMap<String, String>) + Send + Sync>;

/// 单轮轮询的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// 200：配置已解析，与上次不同时交给接收方
    Applied,
    /// 204 / 504：等待超时，配置无变化
    Unchanged,
    /// 404：该服务没有任何配置，按空配置处理
    NotFound,
    /// 其他状态码、传输失败、响应无法解析或接收方 panic
    Failed,
    /// 关闭过程中被取消
    Cancelled,
}

impl PollOutcome {
    /// 下一轮轮询前的等待时间
    pub fn next_delay(&self) -> Duration {
        match self {
            PollOutcome::Applied | PollOutcome::Unchanged => APPLIED_DELAY,
            PollOutcome::NotFound => NOT_FOUND_DELAY,
            PollOutcome::Failed => FAILURE_DELAY,
            PollOutcome::Cancelled => Duration::ZERO,
        }
    }
}

/// 配置长轮询器
///
/// 同一时刻至多一轮请求在途；轮询器独占自身状态，由 [`ConfigPoller::run`] 驱动。
pub struct ConfigPoller {
    transport: Arc<dyn ConsulTransport>,
    consul_url: String,
    token: Option<String>,
    kv_prefix: String,
    identity: ServiceIdentifier,
    consul_index: Option<String>,
    resolved: HashMap<String, String>,
    sink: ConfigSink,
    shutdown: CancellationToken,
}

impl ConfigPoller {
    pub fn new(
        transport: Arc<dyn ConsulTransport>,
        consul_url: impl Into<String>,
        kv_prefix: impl Into<String>,
        identity: ServiceIdentifier,
        sink: ConfigSink,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            transport,
            consul_url: consul_url.into().trim_end_matches('/').to_string(),
            token: None,
            kv_prefix: kv_prefix.into(),
            identity,
            consul_index: None,
            resolved: HashMap::new(),
            sink,
            shutdown,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn identity(&self) -> &ServiceIdentifier {
        &self.identity
    }

    /// 最近一次成功响应记录的一致性索引
    pub fn consul_index(&self) -> Option<&str> {
        self.consul_index.as_deref()
    }

    /// 最近一次交给接收方的配置，初始为空
    pub fn resolved(&self) -> &HashMap<String, String> {
        &self.resolved
    }

    /// 本轮请求地址
    pub fn url(&self) -> String {
        let mut url = format!(
            "{}/v1/kv/{}/{}/?recurse=true",
            self.consul_url,
            self.kv_prefix,
            self.identity.service_name()
        );
        if let Some(index) = &self.consul_index {
            url.push_str("&index=");
            url.push_str(index);
        }
        url
    }

    /// 执行一轮轮询，失败只记录日志，不向外传播
    pub async fn poll_once(&mut self) -> PollOutcome {
        if self.shutdown.is_cancelled() {
            return PollOutcome::Cancelled;
        }

        let request = ConsulRequest::get(self.url()).with_token(self.token.clone());
        let transport = self.transport.clone();
        let response = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return PollOutcome::Cancelled,
            response = transport.execute(request) => response,
        };

        match response.and_then(|response| self.handle(response)) {
            Ok(outcome) => outcome,
            Err(e) if self.shutdown.is_cancelled() => {
                debug!(error = %e, "Config poll interrupted by shutdown");
                PollOutcome::Cancelled
            }
            Err(e) => {
                error!(
                    service = %self.identity.service_name(),
                    error = %e,
                    retry_in_secs = FAILURE_DELAY.as_secs(),
                    "Failed to fetch config from Consul"
                );
                PollOutcome::Failed
            }
        }
    }

    fn handle(&mut self, response: ConsulResponse) -> Result<PollOutcome> {
        match response.status {
            200 => {
                let entries: Vec<KeyValueEntry> = response.json()?;
                let config = resolve(&self.kv_prefix, &self.identity, &entries)?;
                if !self.publish(config) {
                    return Ok(PollOutcome::Failed);
                }
                self.record_index(response.consul_index.as_deref());
                Ok(PollOutcome::Applied)
            }
            404 => {
                debug!(service = %self.identity.service_name(), "No config stored in Consul");
                if !self.publish(HashMap::new()) {
                    return Ok(PollOutcome::Failed);
                }
                Ok(PollOutcome::NotFound)
            }
            204 | 504 => Ok(PollOutcome::Unchanged),
            status => Err(ConsultantError::consul(status, response.body)),
        }
    }

    fn record_index(&mut self, index: Option<&str>) {
        let Some(index) = index else {
            warn!("Consul response carried no index header");
            return;
        };
        let previous = self.consul_index.as_deref().and_then(|i| i.parse::<u64>().ok());
        match (previous, index.parse::<u64>()) {
            // 索引回退时重新开始阻塞查询
            (Some(previous), Ok(current)) if current < previous => {
                debug!(previous, current, "Consul index went backwards, resetting");
                self.consul_index = None;
            }
            _ => self.consul_index = Some(index.to_string()),
        }
    }

    /// 交给接收方；接收方 panic 时返回 `false`，保留旧配置以便下一轮重新投递
    fn publish(&mut self, config: HashMap<String, String>) -> bool {
        if self.resolved == config {
            return true;
        }
        debug!(settings = ?config, "New config detected in Consul");
        let sink = self.sink.clone();
        let delivered = config.clone();
        if catch_unwind(AssertUnwindSafe(move || sink(delivered))).is_err() {
            error!(
                service = %self.identity.service_name(),
                retry_in_secs = FAILURE_DELAY.as_secs(),
                "Config listener panicked while applying new config"
            );
            return false;
        }
        self.resolved = config;
        true
    }

    /// 等待 `initial_delay` 后持续轮询直至关闭
    pub async fn run(mut self, initial_delay: Duration) {
        let mut delay = initial_delay;
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            let outcome = self.poll_once().await;
            if outcome == PollOutcome::Cancelled {
                break;
            }
            delay = outcome.next_delay();
        }
        info!(service = %self.identity.service_name(), "Config poller stopped");
    }

    /// 在后台任务中运行
    pub fn spawn(self, initial_delay: Duration) -> JoinHandle<()> {
        tokio::spawn(self.run(initial_delay))
    }
}
