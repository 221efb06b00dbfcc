//! 信譽庫（statdb）客戶端
//!
//! # API 端點
//!
//! - `GET /health` - 健康檢查
//! - `POST /v1/audits/batch` - 批量記錄審計結果，響應中列出未能應用的節點
//!
//! # 錯誤分類
//!
//! - 超時、連接失敗、HTTP 5xx → `StatDbUnreachable`（可重試）
//! - HTTP 4xx → `StatDbRejected`（不重試）

use crate::error::{AuditError, Result};
use crate::types::{BatchResult, NodeUpdate};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// 信譽庫接口
///
/// 多個服務實例可以共享同一個客戶端，因此要求 `Send + Sync`
#[async_trait]
pub trait StatDb: Send + Sync {
    /// 確認信譽庫可達
    async fn health_check(&self) -> Result<()>;

    /// 批量記錄審計結果；每個節點的更新獨立且冪等
    async fn update_batch(&self, updates: &[NodeUpdate]) -> Result<BatchResult>;
}

/// 批量更新請求體
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub updates: Vec<NodeUpdate>,
}

/// 基於 HTTP 的信譽庫客戶端
pub struct HttpStatDb {
    http_client: Client,
    base_url: String,
}

impl HttpStatDb {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(url = %base_url, "Created statdb client");
        Ok(Self {
            http_client,
            base_url,
        })
    }

    fn unreachable(&self, e: reqwest::Error) -> AuditError {
        if e.is_timeout() {
            AuditError::StatDbUnreachable(format!("{}: request timeout", self.base_url))
        } else if e.is_connect() {
            AuditError::StatDbUnreachable(format!("{}: connection failed - {}", self.base_url, e))
        } else {
            AuditError::StatDbUnreachable(format!("{}: {}", self.base_url, e))
        }
    }
}

#[async_trait]
impl StatDb for HttpStatDb {
    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        if !response.status().is_success() {
            return Err(AuditError::StatDbUnreachable(format!(
                "{}: health check returned HTTP {}",
                self.base_url,
                response.status()
            )));
        }
        Ok(())
    }

    async fn update_batch(&self, updates: &[NodeUpdate]) -> Result<BatchResult> {
        let url = format!("{}/v1/audits/batch", self.base_url);
        let request = BatchRequest {
            updates: updates.to_vec(),
        };

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            let message = format!("HTTP {}: {}", status, body);
            return Err(if status.is_server_error() {
                AuditError::StatDbUnreachable(message)
            } else {
                AuditError::StatDbRejected(message)
            });
        }

        let result = response
            .json::<BatchResult>()
            .await
            .map_err(|e| AuditError::Serialization(format!("Failed to parse batch result: {}", e)))?;

        debug!(
            sent = updates.len(),
            failed = result.failed.len(),
            "Statdb batch applied"
        );
        Ok(result)
    }
}
