//! 存儲節點傳輸層
//!
//! 負責向存儲節點讀取某個 piece 的一段字節:
//! - 通過 overlay 解析節點地址
//! - 附帶授權令牌和審計員對請求的簽名
//! - 把各種失敗歸類為 [`FetchError`]
//!
//! # API 端點
//!
//! - `POST /v1/pieces/range` - 請求體為 [`PieceRequest`]，響應體為 [`PieceRangeBody`]
//!
//! # 錯誤分類
//!
//! | 情況 | 結果 |
//! |------|------|
//! | 地址解析失敗、連接失敗、超時、HTTP 5xx | `Offline` |
//! | HTTP 401 / 403 | `AuthRejected` |
//! | 其他 HTTP 4xx、響應無法解析 | `CorruptResponse` |

use crate::crypto::merkle::MerkleProof;
use crate::error::{FetchError, Result};
use crate::overlay::Overlay;
use crate::types::{NodeId, PieceRequest, PieceResponse};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use node_identity::FullIdentity;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// 請求頭: 審計員節點 ID
pub const AUDITOR_ID_HEADER: &str = "x-auditor-id";

/// 請求頭: 審計員對請求的簽名（十六進制）
pub const AUDITOR_SIGNATURE_HEADER: &str = "x-auditor-signature";

/// 存儲節點傳輸接口
#[async_trait]
pub trait PieceTransport: Send + Sync {
    /// 讀取 `node_id` 上某個 piece 的一段字節及其默克爾證明
    async fn fetch_piece(
        &self,
        node_id: &NodeId,
        request: &PieceRequest,
    ) -> std::result::Result<PieceResponse, FetchError>;
}

/// `/v1/pieces/range` 的響應體
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PieceRangeBody {
    /// share 數據（base64）
    pub data: String,

    /// share 在 piece 默克爾樹中的證明
    pub proof: MerkleProof,
}

impl PieceRangeBody {
    pub fn new(data: &[u8], proof: MerkleProof) -> Self {
        Self {
            data: STANDARD.encode(data),
            proof,
        }
    }
}

/// 基於 HTTP 的傳輸實現
pub struct HttpPieceTransport {
    http_client: Client,
    overlay: Arc<dyn Overlay>,
    identity: Arc<FullIdentity>,
}

impl HttpPieceTransport {
    /// `timeout` 是單次 HTTP 請求的上限；驗證器另有每個節點的總超時
    pub fn new(
        overlay: Arc<dyn Overlay>,
        identity: Arc<FullIdentity>,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            overlay,
            identity,
        })
    }
}

#[async_trait]
impl PieceTransport for HttpPieceTransport {
    async fn fetch_piece(
        &self,
        node_id: &NodeId,
        request: &PieceRequest,
    ) -> std::result::Result<PieceResponse, FetchError> {
        let address = self
            .overlay
            .lookup(node_id)
            .await
            .map_err(|e| FetchError::Offline(e.to_string()))?;

        let signature = self
            .identity
            .sign(&request.signing_bytes())
            .map_err(|e| FetchError::Offline(format!("failed to sign request: {}", e)))?;

        let url = format!("{}/v1/pieces/range", address.address);
        debug!(
            node = %node_id,
            piece_id = %request.piece_id,
            offset = request.offset,
            length = request.length,
            "Requesting piece range"
        );

        let response = self
            .http_client
            .post(&url)
            .header(AUDITOR_ID_HEADER, self.identity.node_id().as_str())
            .header(AUDITOR_SIGNATURE_HEADER, hex::encode(signature))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Offline(format!("{}: request timeout", address.address))
                } else if e.is_connect() {
                    FetchError::Offline(format!("{}: connection failed - {}", address.address, e))
                } else {
                    FetchError::Offline(format!("{}: {}", address.address, e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            return Err(classify_status(status, &body));
        }

        let raw = read_bounded(response, max_body_len(request.length)).await?;
        let body = serde_json::from_slice::<PieceRangeBody>(&raw)
            .map_err(|e| FetchError::CorruptResponse(format!("malformed body: {}", e)))?;

        let data = STANDARD
            .decode(body.data.as_bytes())
            .map_err(|e| FetchError::CorruptResponse(format!("data is not base64: {}", e)))?;

        Ok(PieceResponse {
            data,
            proof: body.proof,
        })
    }
}

/// 響應體中 share 以外允許的字節數（默克爾路徑和 JSON 結構）
const BODY_OVERHEAD: u64 = 64 * 1024;

/// `share_len` 字節的 share 對應的響應體上限
fn max_body_len(share_len: u64) -> u64 {
    share_len
        .div_ceil(3)
        .saturating_mul(4)
        .saturating_add(BODY_OVERHEAD)
}

/// 讀取響應體，超過 `limit` 字節即放棄
///
/// 存儲節點不可信，不能讓它決定審計員要緩衝多少數據
async fn read_bounded(
    mut response: reqwest::Response,
    limit: u64,
) -> std::result::Result<Vec<u8>, FetchError> {
    if let Some(len) = response.content_length() {
        if len > limit {
            return Err(FetchError::CorruptResponse(format!(
                "response body of {} bytes exceeds limit of {}",
                len, limit
            )));
        }
    }

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| FetchError::Offline(format!("failed to read body: {}", e)))?
    {
        if (body.len() + chunk.len()) as u64 > limit {
            return Err(FetchError::CorruptResponse(format!(
                "response body exceeds limit of {} bytes",
                limit
            )));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

fn classify_status(status: StatusCode, body: &str) -> FetchError {
    let message = format!(
        "HTTP {}: {} - {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown"),
        body
    );

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        FetchError::AuthRejected(message)
    } else if status.is_server_error() {
        FetchError::Offline(message)
    } else {
        FetchError::CorruptResponse(message)
    }
}
