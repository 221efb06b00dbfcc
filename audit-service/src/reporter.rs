//! 審計結果上報
//!
//! 把驗證器給出的節點結果轉換為信譽庫更新並批量發送。
//! 信譽庫會返回未能應用的節點子集，只有這部分會被重試。
//!
//! # 重試語義
//!
//! - 首次嘗試之後最多重試 `max_retries` 次，即最多 `max_retries + 1` 次往返
//! - 暫時性錯誤（不可達、5xx）和部分失敗都會觸發重試
//! - 不可重試的錯誤（例如 4xx）立即停止
//! - 已應用的更新不回滾；仍未解決的節點全部列在 `ReportIncomplete` 中

use crate::error::{AuditError, Result};
use crate::retry::RetryPolicy;
use crate::statdb::StatDb;
use crate::types::{NodeId, NodeUpdate, VerifiedNode};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Reporter {
    statdb: Arc<dyn StatDb>,
    policy: RetryPolicy,
}

impl Reporter {
    /// 連接信譽庫
    ///
    /// 健康檢查失敗時返回錯誤，服務無法在沒有信譽庫的情況下啟動
    pub async fn connect(statdb: Arc<dyn StatDb>, policy: RetryPolicy) -> Result<Self> {
        statdb.health_check().await?;
        info!(max_retries = policy.max_retries, "Connected to statdb");
        Ok(Self { statdb, policy })
    }

    /// 記錄一輪審計的結果
    pub async fn record_audits(&self, nodes: &[VerifiedNode]) -> Result<()> {
        let skipped = nodes.iter().filter(|n| n.interrupted).count();
        if skipped > 0 {
            debug!(skipped, "Not reporting interrupted piece requests");
        }

        let mut pending: Vec<NodeUpdate> = nodes
            .iter()
            .filter(|n| !n.interrupted)
            .map(NodeUpdate::from)
            .collect();

        if pending.is_empty() {
            return Ok(());
        }

        let total = pending.len();
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let reason = match self.statdb.update_batch(&pending).await {
                Ok(result) => {
                    pending.retain(|update| result.failed.contains(&update.node_id));
                    if pending.is_empty() {
                        info!(nodes = total, attempts = attempt, "Audit results recorded");
                        return Ok(());
                    }
                    format!("statdb failed to apply {} update(s)", pending.len())
                }
                Err(e) if e.is_transient() => e.to_string(),
                Err(e) => {
                    warn!(error = %e, attempt, "Statdb rejected batch, not retrying");
                    return Err(incomplete(&pending, attempt, e.to_string()));
                }
            };

            if attempt >= self.policy.max_attempts() {
                warn!(
                    unresolved = pending.len(),
                    attempts = attempt,
                    %reason,
                    "Giving up on statdb batch"
                );
                return Err(incomplete(&pending, attempt, reason));
            }

            let delay = self.policy.delay_before(attempt);
            warn!(
                unresolved = pending.len(),
                attempt,
                max_attempts = self.policy.max_attempts(),
                delay_ms = delay.as_millis() as u64,
                %reason,
                "Statdb batch incomplete, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn incomplete(pending: &[NodeUpdate], attempts: u32, reason: String) -> AuditError {
    AuditError::ReportIncomplete {
        nodes: pending.iter().map(|u| u.node_id.clone()).collect::<Vec<NodeId>>(),
        attempts,
        reason,
    }
}
