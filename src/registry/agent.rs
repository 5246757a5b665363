//! `/v1/agent/self` 查询

use std::sync::Arc;

use serde::Deserialize;

use crate::error::Result;
use crate::transport::{ConsulRequest, ConsulTransport};

/// 本地 agent 所在的数据中心与节点名
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSelf {
    pub datacenter: Option<String>,
    pub node_name: Option<String>,
}

#[allow(non_snake_case)]
#[derive(Deserialize)]
struct AgentSelfResponse {
    Config: AgentConfig,
}

#[allow(non_snake_case)]
#[derive(Deserialize)]
struct AgentConfig {
    #[serde(default)]
    Datacenter: Option<String>,
    #[serde(default)]
    NodeName: Option<String>,
}

/// 查询本地 agent 信息
pub async fn agent_self(
    transport: &Arc<dyn ConsulTransport>,
    consul_url: &str,
    token: Option<String>,
) -> Result<AgentSelf> {
    let url = format!("{}/v1/agent/self", consul_url.trim_end_matches('/'));
    let response = transport
        .execute(ConsulRequest::get(url).with_token(token))
        .await?
        .error_for_status()?;
    let parsed: AgentSelfResponse = response.json()?;

    Ok(AgentSelf {
        datacenter: parsed.Config.Datacenter.filter(|dc| !dc.is_empty()),
        node_name: parsed.Config.NodeName.filter(|node| !node.is_empty()),
    })
}
