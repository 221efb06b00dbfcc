//! 共享數據類型定義
//!
//! 本模塊定義審計服務各組件之間傳遞的數據結構

use crate::crypto::merkle::{MerkleProof, MerkleRoot};
use crate::error::{AuditError, Result};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

pub use node_identity::NodeId;

/// 糾刪碼參數
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErasureScheme {
    /// 條帶大小（字節），一輪審計檢查的數據範圍
    pub stripe_size: u64,

    /// 恢復所需的最少 piece 數量
    pub required: u16,

    /// 編碼後的 piece 總數
    pub total: u16,
}

impl ErasureScheme {
    /// 檢查參數一致性
    pub fn validate(&self) -> Result<()> {
        if self.stripe_size == 0 {
            return Err(AuditError::InvalidSegment("stripe size is zero".to_string()));
        }
        if self.required == 0 || self.total < self.required {
            return Err(AuditError::InvalidSegment(format!(
                "erasure scheme requires {} of {} pieces",
                self.required, self.total
            )));
        }
        if self.stripe_size % self.required as u64 != 0 {
            return Err(AuditError::InvalidSegment(format!(
                "stripe size {} is not divisible by required count {}",
                self.stripe_size, self.required
            )));
        }
        Ok(())
    }

    /// 每個 piece 在一個條帶中佔用的字節數
    pub fn share_size(&self) -> u64 {
        self.stripe_size / self.required as u64
    }

    /// 給定段大小的條帶數量: `ceil(size / stripe_size)`
    pub fn stripe_count(&self, segment_size: u64) -> u64 {
        segment_size.div_ceil(self.stripe_size)
    }
}

/// 段中一個 piece 的位置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceRef {
    /// 持有該 piece 的存儲節點
    pub node_id: NodeId,

    /// piece 編號（0 到 total-1）
    pub piece_num: u16,

    /// 該 piece 所有 erasure share 的默克爾根（十六進制），每個條帶一個葉子
    pub piece_root: String,
}

impl PieceRef {
    /// 解析默克爾根
    pub fn root(&self) -> Result<MerkleRoot> {
        let bytes = hex::decode(&self.piece_root).map_err(|e| {
            AuditError::InvalidSegment(format!("piece {} root is not hex: {}", self.piece_num, e))
        })?;
        bytes.as_slice().try_into().map_err(|_| {
            AuditError::InvalidSegment(format!(
                "piece {} root must be 32 bytes, got {}",
                self.piece_num,
                bytes.len()
            ))
        })
    }
}

/// 段元數據（由指針目錄擁有，審計服務只讀）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// 段路徑
    pub path: String,

    /// 段的根 piece ID，各節點上的 piece ID 由它派生
    pub piece_id: String,

    /// 段大小（字節）
    pub size: u64,

    /// 糾刪碼參數
    pub erasure: ErasureScheme,

    /// piece 列表
    pub pieces: Vec<PieceRef>,
}

impl Segment {
    /// 條帶數量
    pub fn stripe_count(&self) -> u64 {
        self.erasure.stripe_count(self.size)
    }

    /// 驗證段可以被審計
    pub fn validate(&self) -> Result<()> {
        self.erasure.validate()?;

        if self.size == 0 {
            return Err(AuditError::InvalidSegment(format!("segment {} is empty", self.path)));
        }
        if self.pieces.is_empty() {
            return Err(AuditError::InvalidSegment(format!(
                "segment {} has no remote pieces",
                self.path
            )));
        }

        let mut seen = HashSet::with_capacity(self.pieces.len());
        for piece in &self.pieces {
            if piece.piece_num >= self.erasure.total {
                return Err(AuditError::InvalidSegment(format!(
                    "piece number {} exceeds total {}",
                    piece.piece_num, self.erasure.total
                )));
            }
            if !seen.insert(piece.piece_num) {
                return Err(AuditError::InvalidSegment(format!(
                    "duplicate piece number {}",
                    piece.piece_num
                )));
            }
            piece.root()?;
        }
        Ok(())
    }

    /// 條帶在每個 piece 中的字節範圍 `(offset, length)`
    pub fn piece_range(&self, stripe_index: u64) -> (u64, u64) {
        let share_size = self.erasure.share_size();
        (stripe_index * share_size, share_size)
    }

    /// 存儲在指定節點上的 piece ID
    pub fn derive_piece_id(&self, node_id: &NodeId) -> String {
        let mut hasher = Sha3_256::new();
        hasher.update(self.piece_id.as_bytes());
        hasher.update(node_id.as_str().as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// 一次審計選中的條帶
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stripe {
    pub index: u64,
    pub segment: Segment,
}

/// 單個節點的審計結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// 返回了正確的數據
    Success,
    /// 返回了錯誤或損壞的數據
    Failure,
    /// 無法連接或超時
    Offline,
    /// 拒絕了審計員的授權
    AuthRejected,
}

/// 帶結果的節點
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedNode {
    pub node_id: NodeId,
    pub piece_num: u16,
    pub outcome: Outcome,

    /// 服務停止時被中斷的請求，結果為 `Offline` 佔位，不會上報
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub interrupted: bool,
}

impl VerifiedNode {
    pub fn new(node_id: NodeId, piece_num: u16, outcome: Outcome) -> Self {
        Self {
            node_id,
            piece_num,
            outcome,
            interrupted: false,
        }
    }
}

/// 發送給信譽庫的單個節點更新
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeUpdate {
    pub node_id: NodeId,
    pub outcome: Outcome,

    /// 審計是否通過；`None` 表示本輪不計入審計統計
    pub audit_success: Option<bool>,

    /// 節點是否在線
    pub is_up: bool,
}

impl From<&VerifiedNode> for NodeUpdate {
    fn from(node: &VerifiedNode) -> Self {
        let (audit_success, is_up) = match node.outcome {
            Outcome::Success => (Some(true), true),
            Outcome::Failure => (Some(false), true),
            Outcome::Offline => (None, false),
            // 節點在線但拒絕授權，不能斷定數據丟失
            Outcome::AuthRejected => (None, true),
        };
        Self {
            node_id: node.node_id.clone(),
            outcome: node.outcome,
            audit_success,
            is_up,
        }
    }
}

/// 批量更新的結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    /// 信譽庫未能應用的節點
    #[serde(default)]
    pub failed: Vec<NodeId>,
}

/// 存儲節點網絡地址
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    /// HTTP API 基礎 URL，例如 `http://10.0.0.7:7777`
    pub address: String,
}

/// piece 範圍讀取請求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceRequest {
    pub piece_id: String,
    pub offset: u64,
    pub length: u64,
    pub authorization: crate::authorization::AuthorizationToken,
}

impl PieceRequest {
    /// 審計員對請求簽名的內容
    pub fn signing_bytes(&self) -> Vec<u8> {
        format!(
            "{}|{}|{}|{}",
            self.piece_id, self.offset, self.length, self.authorization.signature
        )
        .into_bytes()
    }
}

/// 存儲節點返回的 share 及其默克爾證明
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceResponse {
    pub data: Vec<u8>,
    pub proof: MerkleProof,
}

/// 審計服務配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// 信譽庫地址（`host:port`，或只寫 `:port` 表示本機）
    pub statdb_port: String,

    /// 信譽庫批量更新的最大重試次數
    pub max_retries_statdb: u32,

    /// 審計間隔（秒）
    pub interval_secs: u64,

    /// 指針目錄 API 端點
    pub pointerdb_url: String,

    /// 節點目錄 API 端點；未設置時使用 `storage_nodes`
    pub overlay_url: Option<String>,

    /// 靜態節點目錄: node_id → URL
    pub storage_nodes: BTreeMap<String, String>,

    /// 對指針目錄和信譽庫的 HTTP 請求超時（秒）
    pub http_timeout_secs: u64,

    /// 單個存儲節點 piece 請求超時（秒）
    pub node_timeout_secs: u64,

    /// 同時進行的 piece 請求上限
    pub max_concurrent_fetches: usize,

    /// 授權令牌有效期（秒）
    pub token_ttl_secs: u64,

    /// 節點身份文件路徑
    pub identity_path: Option<String>,

    /// 信譽庫重試的初始退避（毫秒）
    pub retry_initial_delay_ms: u64,

    /// 信譽庫重試的最大退避（毫秒）
    pub retry_max_delay_ms: u64,

    /// 服務保留的最多錯誤數
    pub max_retained_errors: usize,

    /// 連續失敗多少輪後停止服務；0 表示永不停止
    pub max_consecutive_failures: u32,
}

impl AuditConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn node_timeout(&self) -> Duration {
        Duration::from_secs(self.node_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// 信譽庫的完整 URL
    pub fn statdb_url(&self) -> String {
        let addr = self.statdb_port.trim();
        if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.trim_end_matches('/').to_string()
        } else if let Some(port) = addr.strip_prefix(':') {
            format!("http://127.0.0.1:{}", port)
        } else {
            format!("http://{}", addr)
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            statdb_port: ":9090".to_string(),
            max_retries_statdb: 3,
            interval_secs: 30,
            pointerdb_url: "http://127.0.0.1:7778".to_string(),
            overlay_url: None,
            storage_nodes: BTreeMap::new(),
            http_timeout_secs: 10,
            node_timeout_secs: 10,
            max_concurrent_fetches: 32,
            token_ttl_secs: 300,
            identity_path: None,
            retry_initial_delay_ms: 200,
            retry_max_delay_ms: 5000,
            max_retained_errors: 100,
            max_consecutive_failures: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme() -> ErasureScheme {
        ErasureScheme {
            stripe_size: 1024,
            required: 2,
            total: 4,
        }
    }

    fn piece(node: &str, num: u16) -> PieceRef {
        PieceRef {
            node_id: NodeId::new(node),
            piece_num: num,
            piece_root: hex::encode([7u8; 32]),
        }
    }

    fn segment(size: u64, pieces: Vec<PieceRef>) -> Segment {
        Segment {
            path: "bucket/object/s0".to_string(),
            piece_id: "root".to_string(),
            size,
            erasure: scheme(),
            pieces,
        }
    }

    #[test]
    fn test_stripe_count_rounds_up() {
        assert_eq!(scheme().stripe_count(4096), 4);
        assert_eq!(scheme().stripe_count(4097), 5);
        assert_eq!(scheme().stripe_count(1), 1);
        assert_eq!(scheme().stripe_count(0), 0);
    }

    #[test]
    fn test_piece_range() {
        let seg = segment(4096, vec![piece("a", 0)]);
        assert_eq!(seg.piece_range(0), (0, 512));
        assert_eq!(seg.piece_range(3), (1536, 512));
    }

    #[test]
    fn test_validate_rejects_bad_segments() {
        assert!(segment(4096, vec![piece("a", 0)]).validate().is_ok());
        assert!(segment(0, vec![piece("a", 0)]).validate().is_err());
        assert!(segment(4096, vec![]).validate().is_err());
        assert!(segment(4096, vec![piece("a", 0), piece("b", 0)]).validate().is_err());
        assert!(segment(4096, vec![piece("a", 9)]).validate().is_err());

        let mut bad_root = segment(4096, vec![piece("a", 0)]);
        bad_root.pieces[0].piece_root = "zz".to_string();
        assert!(bad_root.validate().is_err());

        let mut bad_scheme = segment(4096, vec![piece("a", 0)]);
        bad_scheme.erasure.stripe_size = 1000;
        bad_scheme.erasure.required = 3;
        assert!(bad_scheme.validate().is_err());
    }

    #[test]
    fn test_piece_ids_differ_per_node() {
        let seg = segment(4096, vec![piece("a", 0)]);
        let a = seg.derive_piece_id(&NodeId::new("a"));
        let b = seg.derive_piece_id(&NodeId::new("b"));
        assert_ne!(a, b);
        assert_eq!(a, seg.derive_piece_id(&NodeId::new("a")));
    }

    #[test]
    fn test_node_update_mapping() {
        let update = |outcome| NodeUpdate::from(&VerifiedNode::new(NodeId::new("n"), 0, outcome));

        assert_eq!(update(Outcome::Success).audit_success, Some(true));
        assert_eq!(update(Outcome::Failure).audit_success, Some(false));
        assert!(!update(Outcome::Offline).is_up);
        assert_eq!(update(Outcome::Offline).audit_success, None);
        assert!(update(Outcome::AuthRejected).is_up);
    }

    #[test]
    fn test_statdb_url_forms() {
        let mut config = AuditConfig::default();
        assert_eq!(config.statdb_url(), "http://127.0.0.1:9090");

        config.statdb_port = "statdb.internal:9090".to_string();
        assert_eq!(config.statdb_url(), "http://statdb.internal:9090");

        config.statdb_port = "https://statdb.example/".to_string();
        assert_eq!(config.statdb_url(), "https://statdb.example");
    }

    #[test]
    fn test_config_defaults() {
        let config = AuditConfig::default();
        assert_eq!(config.statdb_port, ":9090");
        assert_eq!(config.max_retries_statdb, 3);
        assert_eq!(config.interval(), Duration::from_secs(30));
    }
}
