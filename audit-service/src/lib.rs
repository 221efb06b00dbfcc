//! 分佈式存儲網絡的段審計服務
//!
//! 本 crate 實現了一個持續運行的數據完整性審計循環:
//! 1. 從指針目錄隨機選一個段，並在段內隨機選一個條帶
//! 2. 向持有該段 piece 的所有存儲節點請求對應的 erasure share
//! 3. 用默克爾證明校驗每個 share，得出每個節點的審計結果
//! 4. 把結果批量寫入信譽庫（statdb），部分失敗時只重試未解決的節點
//!
//! # 架構
//!
//! ```text
//! ┌──────────────┐
//! │ AuditService │  ← 定時循環，錯誤累積
//! └──────┬───────┘
//!        │
//!   ┌────┴─────┬──────────┐
//!   ▼          ▼          ▼
//! Cursor    Verifier   Reporter
//!   │          │          │
//!   ▼          ▼          ▼
//! Pointer   Piece      StatDb
//! Directory Transport
//!           (Overlay)
//! ```
//!
//! 外部組件都通過 trait 接入，HTTP 實現見各模塊。
//!
//! # 示例用法
//!
//! ```no_run
//! use audit_service::{AuditConfig, AuditService, Collaborators};
//!
//! # async fn example(collaborators: Collaborators) -> audit_service::Result<()> {
//! let config = AuditConfig::default();
//! let service = AuditService::new(&config, collaborators).await?;
//!
//! let handle = service.run(config.interval())?;
//! // ...
//! handle.shutdown();
//! handle.wait().await?;
//! # Ok(())
//! # }
//! ```

pub mod authorization;
pub mod config;
pub mod crypto;
pub mod cursor;
pub mod error;
pub mod overlay;
pub mod pointerdb;
pub mod reporter;
pub mod retry;
pub mod service;
pub mod statdb;
pub mod transport;
pub mod types;
pub mod verifier;

// Re-export 常用類型
pub use authorization::AuthorizationToken;
pub use error::{AuditError, CombinedError, FetchError, Result};
pub use service::{AuditService, Collaborators, CycleReport, ServiceHandle, ServiceState};
pub use types::{AuditConfig, NodeId, Outcome, Segment, Stripe, VerifiedNode};
