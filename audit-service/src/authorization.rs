//! 審計授權令牌
//!
//! 每輪審計都簽發新令牌，存儲節點據此確認請求者有權讀取 piece 數據。
//! 令牌用審計員的 Dilithium3 身份簽名，有效期很短，不跨輪次緩存。

use crate::error::{AuditError, Result};
use chrono::Utc;
use node_identity::{FullIdentity, NodeId, PeerIdentity};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 簽名的授權憑證
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationToken {
    /// 簽發者（審計員）節點 ID
    pub auditor: NodeId,

    /// 簽發者公鑰（十六進制）
    pub public_key: String,

    /// 簽發時間（Unix 秒）
    pub issued_at: i64,

    /// 過期時間（Unix 秒）
    pub expires_at: i64,

    /// 對 `auditor|issued_at|expires_at` 的簽名（十六進制）
    pub signature: String,
}

impl AuthorizationToken {
    /// 用本地身份簽發令牌
    pub fn issue(identity: &FullIdentity, ttl: Duration) -> Result<Self> {
        let issued_at = Utc::now().timestamp();
        let expires_at = i64::try_from(ttl.as_secs())
            .ok()
            .and_then(|secs| issued_at.checked_add(secs))
            .ok_or_else(|| {
                AuditError::Authorization(format!("token ttl of {}s is out of range", ttl.as_secs()))
            })?;
        let auditor = identity.node_id().clone();

        let payload = signing_payload(&auditor, issued_at, expires_at);
        let signature = identity
            .sign(&payload)
            .map_err(|e| AuditError::Authorization(format!("failed to sign token: {}", e)))?;

        Ok(Self {
            auditor,
            public_key: hex::encode(identity.public_key()),
            issued_at,
            expires_at,
            signature: hex::encode(signature),
        })
    }

    /// 令牌在 `now` 時是否已過期
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp())
    }

    /// 校驗簽名及公鑰與簽發者 ID 的綁定關係（存儲節點側使用）
    pub fn verify(&self) -> Result<bool> {
        let public_key = hex::decode(&self.public_key)
            .map_err(|e| AuditError::Authorization(format!("public key is not hex: {}", e)))?;
        let signature = match hex::decode(&self.signature) {
            Ok(sig) => sig,
            Err(_) => return Ok(false),
        };

        let peer = match PeerIdentity::new(self.auditor.clone(), public_key) {
            Ok(peer) => peer,
            Err(_) => return Ok(false),
        };

        let payload = signing_payload(&self.auditor, self.issued_at, self.expires_at);
        Ok(peer.verify(&payload, &signature)?)
    }
}

fn signing_payload(auditor: &NodeId, issued_at: i64, expires_at: i64) -> Vec<u8> {
    format!("{}|{}|{}", auditor, issued_at, expires_at).into_bytes()
}
