//! 審計服務統一錯誤類型定義
//!
//! 使用 thiserror 定義審計循環中每一步可能出現的錯誤。
//! 單個存儲節點的失敗不是錯誤，而是 [`Outcome`](crate::types::Outcome)；
//! 只有無法繼續本輪審計的情況才會成為 `AuditError`。

use crate::types::NodeId;
use std::fmt;
use thiserror::Error;

/// 審計服務錯誤類型
#[derive(Error, Debug)]
pub enum AuditError {
    /// 指針目錄中沒有任何段
    #[error("no segments available for audit")]
    NoSegmentsAvailable,

    /// 指針目錄不可達
    #[error("pointer directory unreachable: {0}")]
    DirectoryUnreachable(String),

    /// 段元數據無效（沒有 piece、大小為零或糾刪參數錯誤）
    #[error("invalid segment: {0}")]
    InvalidSegment(String),

    /// 條帶索引超出範圍
    #[error("stripe index {index} out of range (stripe count: {count})")]
    InvalidStripe { index: u64, count: u64 },

    /// 授權令牌已過期
    #[error("authorization token expired at {expires_at}")]
    AuthorizationExpired { expires_at: i64 },

    /// 無法簽發授權令牌
    #[error("authorization error: {0}")]
    Authorization(String),

    /// 在任何請求開始之前被取消
    #[error("audit cycle cancelled")]
    Cancelled,

    /// 節點目錄查詢失敗
    #[error("overlay lookup failed for {node}: {reason}")]
    OverlayLookup { node: NodeId, reason: String },

    /// 信譽庫不可達（可重試）
    #[error("statdb unreachable: {0}")]
    StatDbUnreachable(String),

    /// 信譽庫拒絕請求（不可重試）
    #[error("statdb rejected update: {0}")]
    StatDbRejected(String),

    /// 重試耗盡後仍有節點未更新
    #[error("{} node update(s) unresolved after {attempts} attempt(s): {reason}", .nodes.len())]
    ReportIncomplete {
        nodes: Vec<NodeId>,
        attempts: u32,
        reason: String,
    },

    /// 配置錯誤
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP 請求錯誤
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// 序列化/反序列化錯誤
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O 錯誤
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 節點身份錯誤
    #[error("identity error: {0}")]
    Identity(#[from] node_identity::IdentityError),

    /// 多個錯誤的合併
    #[error(transparent)]
    Combined(#[from] CombinedError),

    /// 通用錯誤
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AuditError {
    /// 是否為暫時性故障（值得重試）
    pub fn is_transient(&self) -> bool {
        match self {
            AuditError::DirectoryUnreachable(_) => true,
            AuditError::StatDbUnreachable(_) => true,
            AuditError::HttpRequest(e) => e.is_timeout() || e.is_connect(),
            AuditError::Io(_) => true,
            _ => false,
        }
    }
}

/// Result 類型別名
pub type Result<T> = std::result::Result<T, AuditError>;

/// 從 JSON 錯誤轉換
impl From<serde_json::Error> for AuditError {
    fn from(err: serde_json::Error) -> Self {
        AuditError::Serialization(err.to_string())
    }
}

/// 單個存儲節點 piece 請求的失敗類型
///
/// 由傳輸層返回，驗證器將其轉換為節點的審計結果
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// 節點無法連接、超時或服務端錯誤
    #[error("node offline: {0}")]
    Offline(String),

    /// 節點拒絕了我們的授權
    #[error("authorization rejected: {0}")]
    AuthRejected(String),

    /// 節點返回了無法解析或不完整的響應
    #[error("corrupt response: {0}")]
    CorruptResponse(String),
}

/// 一組錯誤的合併
///
/// 服務停止時返回本次生命週期累積的所有錯誤
#[derive(Debug, Default)]
pub struct CombinedError {
    errors: Vec<AuditError>,
    dropped: usize,
}

impl CombinedError {
    pub fn new(errors: Vec<AuditError>, dropped: usize) -> Self {
        Self { errors, dropped }
    }

    pub fn errors(&self) -> &[AuditError] {
        &self.errors
    }

    /// 因超出保留上限而被丟棄的舊錯誤數量
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn len(&self) -> usize {
        self.errors.len() + self.dropped
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for CombinedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} audit error(s)", self.len())?;
        if self.dropped > 0 {
            write!(f, " ({} oldest not retained)", self.dropped)?;
        }
        for err in &self.errors {
            write!(f, "; {}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for CombinedError {}

/// 合併錯誤列表
///
/// - 沒有錯誤: `Ok(())`
/// - 恰好一個錯誤且沒有丟棄: 原樣返回
/// - 其他情況: `AuditError::Combined`
pub fn combine_errors(mut errors: Vec<AuditError>, dropped: usize) -> Result<()> {
    match (errors.len(), dropped) {
        (0, 0) => Ok(()),
        (1, 0) => Err(errors.remove(0)),
        _ => Err(AuditError::Combined(CombinedError::new(errors, dropped))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_no_errors() {
        assert!(combine_errors(Vec::new(), 0).is_ok());
    }

    #[test]
    fn test_combine_single_error_is_unwrapped() {
        let result = combine_errors(vec![AuditError::NoSegmentsAvailable], 0);
        assert!(matches!(result, Err(AuditError::NoSegmentsAvailable)));
    }

    #[test]
    fn test_combine_many_errors() {
        let result = combine_errors(
            vec![
                AuditError::NoSegmentsAvailable,
                AuditError::DirectoryUnreachable("refused".to_string()),
            ],
            3,
        );

        match result {
            Err(AuditError::Combined(combined)) => {
                assert_eq!(combined.errors().len(), 2);
                assert_eq!(combined.dropped(), 3);
                assert_eq!(combined.len(), 5);
                let text = combined.to_string();
                assert!(text.starts_with("5 audit error(s)"));
                assert!(text.contains("pointer directory unreachable: refused"));
            }
            other => panic!("expected combined error, got {:?}", other),
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(AuditError::StatDbUnreachable("timeout".to_string()).is_transient());
        assert!(AuditError::DirectoryUnreachable("reset".to_string()).is_transient());
        assert!(!AuditError::StatDbRejected("bad request".to_string()).is_transient());
        assert!(!AuditError::NoSegmentsAvailable.is_transient());
    }
}
