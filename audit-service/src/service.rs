//! 審計服務
//!
//! 把條帶選擇、驗證和上報串成一個定時循環，在後台任務中運行。
//!
//! # 生命週期
//!
//! ```text
//! AuditService::new ──► Idle ──run()──► Running ──shutdown()/連續失敗──► Stopped
//! ```
//!
//! 每一輪:
//! 1. `Cursor::next_stripe` 選出條帶
//! 2. 指針目錄簽發授權令牌
//! 3. `Verifier::verify` 檢查所有持有節點
//! 4. `Reporter::record_audits` 更新信譽庫
//!
//! 某一步失敗時記錄錯誤並結束本輪，循環繼續。
//! 錯誤由後台任務獨佔保存，在 [`ServiceHandle::wait`] 中一次性返回。

use crate::cursor::Cursor;
use crate::error::{combine_errors, AuditError, Result};
use crate::pointerdb::PointerDirectory;
use crate::reporter::Reporter;
use crate::retry::RetryPolicy;
use crate::statdb::StatDb;
use crate::transport::PieceTransport;
use crate::types::{AuditConfig, Outcome, Stripe, VerifiedNode};
use crate::verifier::Verifier;
use anyhow::anyhow;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 服務狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Idle,
    Running,
    Stopped,
}

/// 服務依賴的外部組件
#[derive(Clone)]
pub struct Collaborators {
    pub pointers: Arc<dyn PointerDirectory>,
    pub transport: Arc<dyn PieceTransport>,
    pub statdb: Arc<dyn StatDb>,
}

/// 一輪審計的結果
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub stripe: Stripe,
    pub nodes: Vec<VerifiedNode>,
}

impl CycleReport {
    pub fn count(&self, outcome: Outcome) -> usize {
        self.nodes.iter().filter(|n| n.outcome == outcome).count()
    }
}

pub struct AuditService {
    cursor: Cursor,
    verifier: Verifier,
    reporter: Reporter,
    cancel: CancellationToken,
    state: watch::Sender<ServiceState>,
    max_retained_errors: usize,
    max_consecutive_failures: u32,
}

impl AuditService {
    /// 創建服務
    ///
    /// 信譽庫健康檢查失敗時返回錯誤
    pub async fn new(config: &AuditConfig, collaborators: Collaborators) -> Result<Self> {
        let policy = RetryPolicy::new(
            config.max_retries_statdb,
            config.retry_initial_delay_ms,
            config.retry_max_delay_ms,
        );
        let reporter = Reporter::connect(collaborators.statdb, policy).await?;

        let verifier = Verifier::new(
            collaborators.transport,
            config.node_timeout(),
            config.max_concurrent_fetches,
        );
        let (state, _) = watch::channel(ServiceState::Idle);

        Ok(Self {
            cursor: Cursor::new(collaborators.pointers),
            verifier,
            reporter,
            cancel: CancellationToken::new(),
            state,
            max_retained_errors: config.max_retained_errors,
            max_consecutive_failures: config.max_consecutive_failures,
        })
    }

    /// 調用 [`run`](Self::run) 之前的狀態，總是 `Idle`
    ///
    /// `run` 會消耗服務，之後通過 [`ServiceHandle::state`] 觀察狀態。
    pub fn state(&self) -> ServiceState {
        *self.state.borrow()
    }

    /// 執行一輪審計
    pub async fn audit_once(&self) -> Result<CycleReport> {
        let stripe = self.cursor.next_stripe().await?;
        let authorization = self.cursor.pointers().signed_message().await?;

        let nodes = self
            .verifier
            .verify(&self.cancel, stripe.index, &stripe.segment, &authorization)
            .await?;

        self.reporter.record_audits(&nodes).await?;

        Ok(CycleReport { stripe, nodes })
    }

    /// 在後台任務中按 `interval` 週期運行
    ///
    /// 第一輪在啟動後一個 `interval` 開始；上一輪未完成時下一輪順延。
    /// `interval` 為零時返回 [`AuditError::Config`]，不啟動任務。
    pub fn run(self, interval: Duration) -> Result<ServiceHandle> {
        if interval.is_zero() {
            return Err(AuditError::Config(
                "audit interval must be greater than 0".to_string(),
            ));
        }

        let cancel = self.cancel.clone();
        let state = self.state.subscribe();
        self.state.send_replace(ServiceState::Running);

        info!(interval_secs = interval.as_secs_f64(), "Audit service started");
        let task = tokio::spawn(self.run_loop(interval));

        Ok(ServiceHandle {
            cancel,
            state,
            task,
        })
    }

    async fn run_loop(self, interval: Duration) -> Result<()> {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut errors = ErrorLog::new(self.max_retained_errors);
        let mut consecutive_failures = 0u32;
        let mut cycle = 0u64;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            cycle += 1;

            match self.audit_once().await {
                Ok(report) => {
                    consecutive_failures = 0;
                    info!(
                        cycle,
                        path = %report.stripe.segment.path,
                        stripe = report.stripe.index,
                        success = report.count(Outcome::Success),
                        failure = report.count(Outcome::Failure),
                        offline = report.count(Outcome::Offline),
                        auth_rejected = report.count(Outcome::AuthRejected),
                        "Audit cycle complete"
                    );
                }
                Err(AuditError::Cancelled) if self.cancel.is_cancelled() => break,
                Err(AuditError::NoSegmentsAvailable) => {
                    // 目錄為空不算故障
                    info!(cycle, "No segments to audit");
                    errors.push(AuditError::NoSegmentsAvailable);
                }
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(cycle, consecutive_failures, error = %e, "Audit cycle failed");
                    errors.push(e);

                    if self.max_consecutive_failures > 0
                        && consecutive_failures >= self.max_consecutive_failures
                    {
                        error!(
                            consecutive_failures,
                            "Too many consecutive failed cycles, stopping audit service"
                        );
                        break;
                    }
                }
            }

            if self.cancel.is_cancelled() {
                break;
            }
        }

        self.state.send_replace(ServiceState::Stopped);
        info!(cycles = cycle, errors = errors.len(), "Audit service stopped");
        errors.into_result()
    }
}

/// 運行中服務的句柄
pub struct ServiceHandle {
    cancel: CancellationToken,
    state: watch::Receiver<ServiceState>,
    task: JoinHandle<Result<()>>,
}

impl ServiceHandle {
    /// 請求停止；進行中的節點請求會被中斷
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> ServiceState {
        if self.task.is_finished() {
            ServiceState::Stopped
        } else {
            *self.state.borrow()
        }
    }

    /// 等到服務進入 `Stopped`，不消耗句柄
    pub async fn stopped(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| *s == ServiceState::Stopped).await;
    }

    /// 等待後台任務結束，返回累積的錯誤
    pub async fn wait(self) -> Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(AuditError::Other(anyhow!("audit task failed: {}", e))),
        }
    }
}

/// 有上限的錯誤記錄，超出時丟棄最舊的
struct ErrorLog {
    errors: VecDeque<AuditError>,
    capacity: usize,
    dropped: usize,
}

impl ErrorLog {
    fn new(capacity: usize) -> Self {
        Self {
            errors: VecDeque::new(),
            capacity,
            dropped: 0,
        }
    }

    fn push(&mut self, err: AuditError) {
        if self.capacity == 0 {
            self.dropped += 1;
            return;
        }
        if self.errors.len() == self.capacity {
            self.errors.pop_front();
            self.dropped += 1;
        }
        self.errors.push_back(err);
    }

    fn len(&self) -> usize {
        self.errors.len() + self.dropped
    }

    fn into_result(self) -> Result<()> {
        combine_errors(self.errors.into(), self.dropped)
    }
}
