use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tally_serve::{SessionConfig, TierGateConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod routes;
mod session_manager;

use session_manager::SessionManager;

#[derive(Parser, Debug)]
#[command(name = "tally-server")]
#[command(about = "Account aggregation REST API over fixture-backed wallets", long_about = None)]
struct Args {
    /// REST API server port
    #[arg(long, default_value_t = 3000)]
    port: u16,

    /// JSON file mapping wallet ids to wallet fixtures
    #[arg(long, default_value = "wallets.json")]
    wallets: PathBuf,

    /// Seconds between SDD verification checks
    #[arg(long, default_value_t = 5)]
    poll_interval_secs: u64,

    /// Seconds after which SDD verification polling gives up
    #[arg(long, default_value_t = 120)]
    poll_deadline_secs: u64,

    /// Upper bound on a single tier fetch, in seconds
    #[arg(long, default_value_t = 30)]
    tier_timeout_secs: u64,
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            tier_gate: TierGateConfig {
                fetch_timeout: Duration::from_secs(self.tier_timeout_secs),
                poll_interval: Duration::from_secs(self.poll_interval_secs),
                poll_deadline: Duration::from_secs(self.poll_deadline_secs),
            },
            ..SessionConfig::default()
        }
    }
}

async fn run_server(port: u16, manager: SessionManager) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Starting REST API server on {}", addr);

    // Create a cancellation token for graceful shutdown
    let shutdown_token = tokio_util::sync::CancellationToken::new();
    let shutdown_token_clone = shutdown_token.clone();

    // Spawn ctrl-c handler
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        shutdown_token_clone.cancel();
    });

    let app = routes::router(manager);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".to_string().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let wallets = config::load_wallets(&args.wallets).await?;
    if wallets.is_empty() {
        tracing::warn!(path = %args.wallets.display(), "No wallets configured");
    }

    let manager = SessionManager::new(wallets, args.session_config());
    run_server(args.port, manager).await
}
