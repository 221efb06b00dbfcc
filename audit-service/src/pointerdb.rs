//! 指針目錄客戶端
//!
//! 指針目錄保存段元數據（piece 位置和糾刪參數）。審計服務只需要兩個操作:
//! - 隨機取一個已存儲的段
//! - 簽發本輪審計的授權令牌
//!
//! # API 端點
//!
//! - `GET /v1/segments/random` - 200 返回段，404 表示目錄為空

use crate::authorization::AuthorizationToken;
use crate::error::{AuditError, Result};
use crate::types::Segment;
use async_trait::async_trait;
use node_identity::FullIdentity;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// 指針目錄接口
#[async_trait]
pub trait PointerDirectory: Send + Sync {
    /// 均勻隨機地返回一個已存儲的段
    ///
    /// 目錄為空時返回 `NoSegmentsAvailable`，通信失敗返回 `DirectoryUnreachable`
    async fn random_segment(&self) -> Result<Segment>;

    /// 簽發一個新的授權令牌
    async fn signed_message(&self) -> Result<AuthorizationToken>;
}

/// 基於 HTTP 的指針目錄客戶端
pub struct HttpPointerDirectory {
    http_client: Client,
    base_url: String,
    identity: Arc<FullIdentity>,
    token_ttl: Duration,
}

impl HttpPointerDirectory {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        identity: Arc<FullIdentity>,
        token_ttl: Duration,
    ) -> Result<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        debug!(url = %base_url, "Created pointer directory client");

        Ok(Self {
            http_client,
            base_url,
            identity,
            token_ttl,
        })
    }
}

#[async_trait]
impl PointerDirectory for HttpPointerDirectory {
    async fn random_segment(&self) -> Result<Segment> {
        let url = format!("{}/v1/segments/random", self.base_url);

        let response = self.http_client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                AuditError::DirectoryUnreachable(format!("{}: request timeout", self.base_url))
            } else if e.is_connect() {
                AuditError::DirectoryUnreachable(format!(
                    "{}: connection failed - {}",
                    self.base_url, e
                ))
            } else {
                AuditError::DirectoryUnreachable(format!("{}: {}", self.base_url, e))
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AuditError::NoSegmentsAvailable);
        }
        if !status.is_success() {
            return Err(AuditError::DirectoryUnreachable(format!(
                "{}: HTTP {}",
                self.base_url, status
            )));
        }

        let segment = response.json::<Segment>().await.map_err(|e| {
            AuditError::Serialization(format!("Failed to parse segment: {}", e))
        })?;

        debug!(path = %segment.path, pieces = segment.pieces.len(), "Fetched random segment");
        Ok(segment)
    }

    async fn signed_message(&self) -> Result<AuthorizationToken> {
        AuthorizationToken::issue(&self.identity, self.token_ttl)
    }
}
