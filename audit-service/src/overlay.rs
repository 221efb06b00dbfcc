//! 節點目錄（overlay）
//!
//! 把節點 ID 解析為可訪問的網絡地址。傳輸層在每次 piece 請求前查詢。

use crate::error::{AuditError, Result};
use crate::types::{NodeAddress, NodeId};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::debug;

/// 節點目錄接口
#[async_trait]
pub trait Overlay: Send + Sync {
    async fn lookup(&self, node_id: &NodeId) -> Result<NodeAddress>;
}

/// 配置文件中寫死的節點目錄
#[derive(Debug, Clone, Default)]
pub struct StaticOverlay {
    nodes: HashMap<NodeId, NodeAddress>,
}

impl StaticOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(nodes: &BTreeMap<String, String>) -> Self {
        let mut overlay = Self::new();
        for (id, address) in nodes {
            overlay.insert(NodeId::new(id.as_str()), address.clone());
        }
        overlay
    }

    pub fn insert(&mut self, node_id: NodeId, address: impl Into<String>) {
        self.nodes.insert(
            node_id,
            NodeAddress {
                address: address.into().trim_end_matches('/').to_string(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[async_trait]
impl Overlay for StaticOverlay {
    async fn lookup(&self, node_id: &NodeId) -> Result<NodeAddress> {
        self.nodes
            .get(node_id)
            .cloned()
            .ok_or_else(|| AuditError::OverlayLookup {
                node: node_id.clone(),
                reason: "node not in static overlay".to_string(),
            })
    }
}

/// 通過 HTTP 查詢的節點目錄
///
/// `GET /v1/nodes/{node_id}` 返回 `{"address": "..."}`
pub struct HttpOverlay {
    http_client: Client,
    base_url: String,
}

impl HttpOverlay {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http_client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Overlay for HttpOverlay {
    async fn lookup(&self, node_id: &NodeId) -> Result<NodeAddress> {
        let url = format!("{}/v1/nodes/{}", self.base_url, node_id);
        let lookup_err = |reason: String| AuditError::OverlayLookup {
            node: node_id.clone(),
            reason,
        };

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| lookup_err(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(lookup_err("unknown node".to_string())),
            status => return Err(lookup_err(format!("HTTP {}", status))),
        }

        let address = response
            .json::<NodeAddress>()
            .await
            .map_err(|e| lookup_err(format!("malformed response: {}", e)))?;

        debug!(node = %node_id, address = %address.address, "Resolved node address");
        Ok(address)
    }
}
