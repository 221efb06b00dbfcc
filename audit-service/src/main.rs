//! Segment Audit Node Main Program
//!
//! Runs the continuous audit loop:
//! 1. Load configuration and the node identity
//! 2. Connect to the pointer directory, overlay and statdb
//! 3. Audit a random stripe every interval until Ctrl+C
//! 4. Report the errors accumulated over the service lifetime

use anyhow::{Context, Result};
use audit_service::config;
use audit_service::overlay::{HttpOverlay, Overlay, StaticOverlay};
use audit_service::pointerdb::HttpPointerDirectory;
use audit_service::statdb::HttpStatDb;
use audit_service::transport::HttpPieceTransport;
use audit_service::{AuditConfig, AuditError, AuditService, Collaborators, Outcome};
use clap::Parser;
use node_identity::FullIdentity;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

/// Segment Audit Node for the distributed storage network
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "audit.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Run a single audit cycle and exit
    #[arg(long, default_value_t = false)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("🚀 Starting Segment Audit Node v{}", env!("CARGO_PKG_VERSION"));

    let config = load_configuration(&args.config)?;
    log_configuration(&config);

    let identity = Arc::new(initialize_identity(config.identity_path.as_deref())?);
    info!("✅ Node identity ready: {}", identity.node_id());

    let collaborators = build_collaborators(&config, identity.clone())?;
    let service = AuditService::new(&config, collaborators)
        .await
        .context("Failed to start audit service")?;

    if args.once {
        run_single_cycle(&service).await?;
    } else {
        run_daemon_mode(service, config.interval()).await?;
    }

    info!("👋 Audit node shutting down gracefully");
    Ok(())
}

/// Initialize logging system
fn init_logging(log_level: &str) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => {
            eprintln!("⚠️  Unknown log level: {}, using INFO", log_level);
            tracing::Level::INFO
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}

/// Load configuration file, falling back to environment variables
fn load_configuration(config_path: &Path) -> Result<AuditConfig> {
    info!("📋 Loading configuration: {}", config_path.display());

    if !config_path.exists() {
        warn!("Configuration file does not exist, reading AUDIT_* environment variables");
        return config::load_config_from_env().context("Failed to load configuration from env");
    }

    config::load_config(config_path).context("Failed to load configuration")
}

fn log_configuration(config: &AuditConfig) {
    info!("   - Pointer directory: {}", config.pointerdb_url);
    info!("   - Statdb: {}", config.statdb_url());
    match &config.overlay_url {
        Some(url) => info!("   - Overlay: {}", url),
        None => info!("   - Overlay: static ({} nodes)", config.storage_nodes.len()),
    }
    info!("   - Audit interval: {} seconds", config.interval_secs);
    info!("   - Statdb retries: {}", config.max_retries_statdb);

    if config.overlay_url.is_none() && config.storage_nodes.is_empty() {
        warn!("No overlay configured, every storage node will be reported offline");
    }
}

/// Load or generate the node identity
fn initialize_identity(identity_path: Option<&str>) -> Result<FullIdentity> {
    let path = match identity_path {
        Some(path) => PathBuf::from(path),
        None => dirs::home_dir()
            .context("Cannot determine home directory")?
            .join(".audit-node")
            .join("identity.json"),
    };

    if path.exists() {
        info!("🔐 Loading existing identity: {}", path.display());
        FullIdentity::load(&path).context("Failed to load identity")
    } else {
        info!("🔑 Generating new identity: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create identity directory")?;
        }

        let identity = FullIdentity::generate();
        identity.save(&path).context("Failed to save identity")?;
        Ok(identity)
    }
}

fn build_collaborators(config: &AuditConfig, identity: Arc<FullIdentity>) -> Result<Collaborators> {
    let overlay: Arc<dyn Overlay> = match &config.overlay_url {
        Some(url) => Arc::new(
            HttpOverlay::new(url.as_str(), config.http_timeout())
                .context("Failed to create overlay client")?,
        ),
        None => Arc::new(StaticOverlay::from_config(&config.storage_nodes)),
    };

    let pointers = HttpPointerDirectory::new(
        config.pointerdb_url.as_str(),
        config.http_timeout(),
        identity.clone(),
        Duration::from_secs(config.token_ttl_secs),
    )
    .context("Failed to create pointer directory client")?;

    let transport = HttpPieceTransport::new(overlay, identity, config.node_timeout())
        .context("Failed to create storage node transport")?;

    let statdb = HttpStatDb::new(config.statdb_url(), config.http_timeout())
        .context("Failed to create statdb client")?;

    Ok(Collaborators {
        pointers: Arc::new(pointers),
        transport: Arc::new(transport),
        statdb: Arc::new(statdb),
    })
}

/// Execute a single audit cycle
async fn run_single_cycle(service: &AuditService) -> Result<()> {
    info!("📊 Single audit cycle");

    match service.audit_once().await {
        Ok(report) => {
            info!(
                "   ✅ Audited {} stripe {}",
                report.stripe.segment.path, report.stripe.index
            );
            for node in &report.nodes {
                info!("      - piece {} @ {}: {:?}", node.piece_num, node.node_id, node.outcome);
            }
            info!(
                "   {} passed, {} failed, {} offline, {} rejected authorization",
                report.count(Outcome::Success),
                report.count(Outcome::Failure),
                report.count(Outcome::Offline),
                report.count(Outcome::AuthRejected)
            );
            Ok(())
        }
        Err(AuditError::NoSegmentsAvailable) => {
            info!("   ℹ️  No segments to audit");
            Ok(())
        }
        Err(e) => Err(anyhow::Error::new(e).context("Audit cycle failed")),
    }
}

/// Daemon mode
async fn run_daemon_mode(service: AuditService, interval: Duration) -> Result<()> {
    info!("🔄 Daemon mode, audit interval: {:?}", interval);

    let handle = service
        .run(interval)
        .context("Failed to start audit service")?;

    tokio::select! {
        result = signal::ctrl_c() => match result {
            Ok(()) => info!("🛑 Received Ctrl+C signal, preparing to shutdown..."),
            Err(err) => error!("❌ Cannot listen to shutdown signal: {}", err),
        },
        _ = handle.stopped() => warn!("Audit service stopped on its own"),
    }

    handle.shutdown();

    match handle.wait().await {
        Ok(()) => info!("No audit errors recorded"),
        Err(AuditError::Combined(combined)) => {
            warn!("{} audit error(s) during this run", combined.len());
            if combined.dropped() > 0 {
                warn!("   ({} oldest not retained)", combined.dropped());
            }
            for err in combined.errors() {
                warn!("   - {}", err);
            }
        }
        Err(e) => warn!("1 audit error during this run: {}", e),
    }

    Ok(())
}
