//! 重試策略模組
//!
//! 指數退避（Exponential Backoff），用於信譽庫批量更新的暫時性故障。

use std::time::Duration;

/// 重試配置
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// 首次嘗試之後的最大重試次數
    pub max_retries: u32,
    /// 初始延遲時間（毫秒）
    pub initial_delay_ms: u64,
    /// 延遲增長倍數
    pub multiplier: f64,
    /// 最大延遲時間（毫秒）
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 200,
            multiplier: 2.0,
            max_delay_ms: 5000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            initial_delay_ms,
            max_delay_ms,
            ..Self::default()
        }
    }

    /// 總嘗試次數上限（首次 + 重試）
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// 第 `retry` 次重試（從 1 開始）之前的等待時間
    pub fn delay_before(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let delay_ms = (self.initial_delay_ms as f64) * self.multiplier.powi(exponent);
        let delay_ms = delay_ms.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(delay_ms)
    }
}
