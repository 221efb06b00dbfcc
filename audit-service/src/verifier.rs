//! 條帶驗證
//!
//! 對選中條帶，向段中每個 piece 的持有節點並發請求該條帶對應的 share，
//! 用段元數據中的 piece 默克爾根校驗返回的數據，並為每個節點給出結果。
//!
//! 單個節點的任何失敗都只體現在它的 [`Outcome`] 上；
//! 只有段元數據本身無效、授權過期或一開始就被取消時，整個調用才會失敗。

use crate::authorization::AuthorizationToken;
use crate::crypto::merkle::MerkleRoot;
use crate::error::{AuditError, FetchError, Result};
use crate::transport::PieceTransport;
use crate::types::{NodeId, Outcome, PieceRequest, PieceResponse, Segment, VerifiedNode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::error::Elapsed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct Verifier {
    transport: Arc<dyn PieceTransport>,
    node_timeout: Duration,
    max_concurrency: usize,
}

/// 校驗單個 piece 所需的上下文
struct PieceCheck {
    node_id: NodeId,
    piece_num: u16,
    root: MerkleRoot,
    stripe_index: u64,
    share_size: u64,
}

impl Verifier {
    pub fn new(transport: Arc<dyn PieceTransport>, node_timeout: Duration, max_concurrency: usize) -> Self {
        Self {
            transport,
            node_timeout,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// 驗證 `segment` 的第 `stripe_index` 個條帶
    ///
    /// 返回的列表按 piece 編號排序，每個 piece 恰好一項，
    /// 沒有響應的節點記為 `Offline`。
    pub async fn verify(
        &self,
        cancel: &CancellationToken,
        stripe_index: u64,
        segment: &Segment,
        authorization: &AuthorizationToken,
    ) -> Result<Vec<VerifiedNode>> {
        segment.validate()?;

        let stripe_count = segment.stripe_count();
        if stripe_index >= stripe_count {
            return Err(AuditError::InvalidStripe {
                index: stripe_index,
                count: stripe_count,
            });
        }
        if authorization.is_expired() {
            return Err(AuditError::AuthorizationExpired {
                expires_at: authorization.expires_at,
            });
        }
        if cancel.is_cancelled() {
            return Err(AuditError::Cancelled);
        }

        let (offset, length) = segment.piece_range(stripe_index);
        let mut pieces: Vec<_> = segment.pieces.iter().collect();
        pieces.sort_by_key(|piece| piece.piece_num);

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut handles = Vec::with_capacity(pieces.len());

        for piece in pieces {
            let check = PieceCheck {
                node_id: piece.node_id.clone(),
                piece_num: piece.piece_num,
                root: piece.root()?,
                stripe_index,
                share_size: length,
            };
            let request = PieceRequest {
                piece_id: segment.derive_piece_id(&piece.node_id),
                offset,
                length,
                authorization: authorization.clone(),
            };

            let transport = self.transport.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let timeout = self.node_timeout;

            let handle = tokio::spawn(async move {
                check_piece(transport, semaphore, cancel, timeout, check, request).await
            });
            handles.push((piece.node_id.clone(), piece.piece_num, handle));
        }

        let mut verified = Vec::with_capacity(handles.len());
        for (node_id, piece_num, handle) in handles {
            match handle.await {
                Ok(node) => verified.push(node),
                Err(e) => {
                    warn!(node = %node_id, piece = piece_num, error = %e, "Piece check task failed");
                    verified.push(VerifiedNode::new(node_id, piece_num, Outcome::Offline));
                }
            }
        }

        let passed = verified.iter().filter(|n| n.outcome == Outcome::Success).count();
        info!(
            path = %segment.path,
            stripe = stripe_index,
            nodes = verified.len(),
            passed,
            "Stripe verification finished"
        );

        Ok(verified)
    }
}

async fn check_piece(
    transport: Arc<dyn PieceTransport>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    timeout: Duration,
    check: PieceCheck,
    request: PieceRequest,
) -> VerifiedNode {
    let fetch = async {
        // 信號量不會被關閉
        let _permit = semaphore.acquire_owned().await.ok();
        tokio::time::timeout(timeout, transport.fetch_piece(&check.node_id, &request)).await
    };

    tokio::select! {
        _ = cancel.cancelled() => {
            debug!(node = %check.node_id, piece = check.piece_num, "Piece request interrupted by shutdown");
            VerifiedNode {
                interrupted: true,
                ..VerifiedNode::new(check.node_id, check.piece_num, Outcome::Offline)
            }
        }
        result = fetch => {
            let outcome = classify(&check, result);
            VerifiedNode::new(check.node_id, check.piece_num, outcome)
        }
    }
}

fn classify(
    check: &PieceCheck,
    result: std::result::Result<std::result::Result<PieceResponse, FetchError>, Elapsed>,
) -> Outcome {
    let response = match result {
        Err(_) => {
            warn!(node = %check.node_id, piece = check.piece_num, "Piece request timed out");
            return Outcome::Offline;
        }
        Ok(Err(FetchError::Offline(reason))) => {
            warn!(node = %check.node_id, piece = check.piece_num, %reason, "Node offline");
            return Outcome::Offline;
        }
        Ok(Err(FetchError::AuthRejected(reason))) => {
            warn!(node = %check.node_id, piece = check.piece_num, %reason, "Node rejected authorization");
            return Outcome::AuthRejected;
        }
        Ok(Err(FetchError::CorruptResponse(reason))) => {
            warn!(node = %check.node_id, piece = check.piece_num, %reason, "Node returned corrupt response");
            return Outcome::Failure;
        }
        Ok(Ok(response)) => response,
    };

    match check_share(check, &response) {
        Ok(()) => {
            debug!(node = %check.node_id, piece = check.piece_num, "Share verified");
            Outcome::Success
        }
        Err(reason) => {
            warn!(node = %check.node_id, piece = check.piece_num, %reason, "Share verification FAILED");
            Outcome::Failure
        }
    }
}

fn check_share(check: &PieceCheck, response: &PieceResponse) -> std::result::Result<(), String> {
    if response.data.len() as u64 != check.share_size {
        return Err(format!(
            "share length {} != expected {}",
            response.data.len(),
            check.share_size
        ));
    }
    if response.proof.leaf_index != check.stripe_index {
        return Err(format!(
            "proof is for leaf {} instead of stripe {}",
            response.proof.leaf_index, check.stripe_index
        ));
    }
    if !response.proof.verify(&response.data, &check.root) {
        return Err("merkle proof does not match piece root".to_string());
    }
    Ok(())
}
