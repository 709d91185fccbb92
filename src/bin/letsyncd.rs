//! `letsyncd`: the control-plane binary. Wires together the store, runtime
//! settings cache, ACME engine, task-log bus, renewal/cleanup schedulers,
//! and the agent control plane HTTP server (spec §0, §2).

use std::sync::Arc;

use clap::Parser;
use letsync::notifications::NotificationDispatcher;
use letsync::scheduler::{CleanupScheduler, RenewalScheduler};
use letsync::server::api::start_server;
use letsync::store::Store;
use letsync::{AcmeEngine, Config, Result, SettingsCache, TaskLogBus};
use tracing_subscriber::EnvFilter;

/// Control-plane daemon: runs the ACME engine, renewal scheduler, and agent
/// control plane server as one process.
#[derive(Parser)]
#[command(name = "letsyncd")]
#[command(about = "letsync control-plane daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (spec §2). Falls back to defaults,
    /// overridable by `LETSYNC_*` environment variables either way.
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_env_overrides()?;

    tracing::info!(db_path = %config.database.path.display(), "starting letsyncd");

    // The store needs `security.encryption_key`/`security.agent_secret`
    // before it can open, but those live in the very settings table the
    // store backs (spec §2, §3). Bootstrap with an ephemeral key, load
    // settings, then reopen with the real one persisted on first boot.
    let bootstrap = Store::open(&config.database.path, [0u8; 32], Vec::new()).await?;
    let settings = SettingsCache::load(bootstrap.settings.clone()).await?;
    let encryption_key = settings.encryption_key().await?;
    let agent_secret = settings.agent_secret().await;
    drop(bootstrap);

    let store = Store::open(&config.database.path, encryption_key, agent_secret).await?;
    let tasklog = TaskLogBus::new(store.task_logs.clone(), store.task_status.clone());
    let engine = Arc::new(AcmeEngine::new(store.clone(), tasklog.clone(), config.server.http01_listen));
    let notifications = NotificationDispatcher::new(store.notification_channels.clone());

    let renewal_scheduler = Arc::new(RenewalScheduler::new(
        store.clone(),
        engine.clone(),
        notifications,
        &config.scheduler.cron,
        config.scheduler.renew_before_days,
    )?);
    let cleanup_scheduler = CleanupScheduler::new(
        store.clone(),
        std::time::Duration::from_secs(config.scheduler.cleanup_interval_secs),
    );

    tokio::spawn(renewal_scheduler.run());
    tokio::spawn(cleanup_scheduler.run());

    start_server(config.server.agent_listen, store, tasklog).await
}
