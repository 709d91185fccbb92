//! `letsync`: the agent binary. Polls a control-plane connect URL, deploys
//! changed certificates, and runs the configured reload command (spec §4.8).

use clap::Parser;
use letsync::agent_worker::AgentWorker;
use letsync::Result;
use tracing_subscriber::EnvFilter;

/// Agent worker: polls one control-plane connect URL forever, or once with
/// `--once`.
#[derive(Parser)]
#[command(name = "letsync")]
#[command(about = "letsync agent worker", long_about = None)]
#[command(version)]
struct Cli {
    /// Full agent connect URL, e.g. `https://cp.example.com/agent/{uuid}/{signature}`.
    connect_url: String,

    /// Run a single poll cycle and exit instead of looping forever.
    #[arg(long)]
    once: bool,

    /// Additional deploy path allowed outside the built-in allow-list.
    /// May be repeated.
    #[arg(long = "allow-path")]
    allow_paths: Vec<String>,

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

    tracing::info!(connect_url = %cli.connect_url, once = cli.once, "starting letsync agent worker");

    let worker = AgentWorker::new(cli.connect_url, cli.allow_paths);
    worker.run(cli.once).await
}
