//! 配置管理模塊
//!
//! 負責加載和驗證審計服務配置

use crate::error::{AuditError, Result};
use crate::types::AuditConfig;
use config::{Config, File};
use std::path::Path;

/// 從配置文件加載審計服務配置
///
/// # 參數
/// - `config_path`: 配置文件路徑（支持 TOML、JSON、YAML）
///
/// 文件中未出現的字段使用 [`AuditConfig::default`] 的值。
///
/// # 示例
/// ```no_run
/// use audit_service::config::load_config;
///
/// let config = load_config("audit.toml").expect("Failed to load config");
/// println!("statdb: {}", config.statdb_url());
/// ```
pub fn load_config<P: AsRef<Path>>(config_path: P) -> Result<AuditConfig> {
    let config = Config::builder()
        .add_source(File::from(config_path.as_ref()))
        .build()
        .map_err(|e| AuditError::Config(format!("Failed to load config file: {}", e)))?;

    let audit_config: AuditConfig = config
        .try_deserialize()
        .map_err(|e| AuditError::Config(format!("Failed to parse config: {}", e)))?;

    validate_config(&audit_config)?;

    Ok(audit_config)
}

/// 從環境變量加載配置（用於容器化部署）
///
/// 環境變量前綴: `AUDIT_`
/// 示例: `AUDIT_STATDB_PORT`, `AUDIT_INTERVAL_SECS`
pub fn load_config_from_env() -> Result<AuditConfig> {
    let config = Config::builder()
        .add_source(config::Environment::with_prefix("AUDIT"))
        .build()
        .map_err(|e| AuditError::Config(format!("Failed to load env vars: {}", e)))?;

    let audit_config: AuditConfig = config
        .try_deserialize()
        .map_err(|e| AuditError::Config(format!("Failed to parse env config: {}", e)))?;

    validate_config(&audit_config)?;

    Ok(audit_config)
}

/// 授權令牌有效期上限（一天）
pub const MAX_TOKEN_TTL_SECS: u64 = 24 * 60 * 60;

/// 驗證配置的有效性
pub fn validate_config(config: &AuditConfig) -> Result<()> {
    if config.interval_secs == 0 {
        return Err(AuditError::Config(
            "interval_secs must be greater than 0".to_string(),
        ));
    }

    if config.node_timeout_secs == 0 || config.http_timeout_secs == 0 {
        return Err(AuditError::Config(
            "timeouts must be greater than 0".to_string(),
        ));
    }

    if config.max_concurrent_fetches == 0 {
        return Err(AuditError::Config(
            "max_concurrent_fetches must be greater than 0".to_string(),
        ));
    }

    // 令牌必須能撐過一輪驗證
    if config.token_ttl_secs <= config.node_timeout_secs {
        return Err(AuditError::Config(format!(
            "token_ttl_secs ({}) must exceed node_timeout_secs ({})",
            config.token_ttl_secs, config.node_timeout_secs
        )));
    }

    if config.token_ttl_secs > MAX_TOKEN_TTL_SECS {
        return Err(AuditError::Config(format!(
            "token_ttl_secs ({}) must not exceed {}",
            config.token_ttl_secs, MAX_TOKEN_TTL_SECS
        )));
    }

    if config.retry_max_delay_ms < config.retry_initial_delay_ms {
        return Err(AuditError::Config(
            "retry_max_delay_ms must be >= retry_initial_delay_ms".to_string(),
        ));
    }

    if config.statdb_port.trim().is_empty() {
        return Err(AuditError::Config("statdb_port is empty".to_string()));
    }

    // 驗證 URL 格式
    if !is_http_url(&config.pointerdb_url) {
        return Err(AuditError::Config(format!(
            "Invalid pointer directory URL: {}",
            config.pointerdb_url
        )));
    }

    if let Some(overlay_url) = &config.overlay_url {
        if !is_http_url(overlay_url) {
            return Err(AuditError::Config(format!(
                "Invalid overlay URL: {}",
                overlay_url
            )));
        }
    }

    for (node, address) in &config.storage_nodes {
        if !is_http_url(address) {
            return Err(AuditError::Config(format!(
                "Invalid address for storage node {}: {}",
                node, address
            )));
        }
    }

    Ok(())
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
