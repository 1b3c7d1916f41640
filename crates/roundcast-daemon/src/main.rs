use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use roundcast_daemon::chrome::{ChromeConfig, ChromeProbes};
use roundcast_daemon::poll_loop::PollLoop;
use roundcast_daemon::store::HttpRoundStore;
use roundcast_daemon::ws_server::WsServer;

const DEFAULT_PAGE_URL: &str = "https://pancakeswap.finance/prediction?token=BNB";
const DEFAULT_STORE_URL: &str = "https://www.ivanlovo.com/pancake/add_card.php";

/// How the browser underneath the snapshot provider is bootstrapped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ExecEnv {
    /// Let chromiumoxide discover a local Chrome install.
    Development,
    /// Use the explicitly configured Chrome binary.
    Production,
}

#[derive(Parser)]
#[command(name = "roundcast", about = "Prediction round monitor and broadcaster")]
struct Cli {
    /// Port the WebSocket server listens on
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Exact browser origin allowed to subscribe (default: unrestricted)
    #[arg(long, env = "CORS_ORIGIN")]
    cors_origin: Option<String>,

    /// Remote store endpoint accepting round submissions
    #[arg(long, env = "STORE_URL", default_value = DEFAULT_STORE_URL)]
    store_url: String,

    /// Prediction page to monitor
    #[arg(long, env = "PAGE_URL", default_value = DEFAULT_PAGE_URL)]
    page_url: String,

    /// Polling interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Execution environment
    #[arg(long, env = "ROUNDCAST_ENV", value_enum, default_value = "development")]
    env: ExecEnv,

    /// Chrome binary path, used in the production environment
    #[arg(long, env = "CHROME_PATH")]
    chrome_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing. Respects RUST_LOG env var, defaults to info.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    tracing::info!(
        port = cli.port,
        page_url = %cli.page_url,
        store_url = %cli.store_url,
        poll_interval_ms = cli.poll_interval_ms,
        env = ?cli.env,
        "starting roundcast daemon"
    );

    // The snapshot provider is the one component whose startup failure is
    // fatal: without a page there is nothing to poll.
    let chrome_path = match cli.env {
        ExecEnv::Production => cli.chrome_path,
        ExecEnv::Development => None,
    };
    let probes = ChromeProbes::launch(ChromeConfig {
        page_url: cli.page_url,
        chrome_path,
    })
    .await
    .context("snapshot provider initialization failed")?;

    let (events_tx, _) = broadcast::channel(64);
    let cancel = CancellationToken::new();

    let store = Arc::new(HttpRoundStore::new(cli.store_url));
    let mut poll = PollLoop::new(
        Box::new(probes),
        store,
        events_tx.clone(),
        Duration::from_millis(cli.poll_interval_ms),
        cancel.clone(),
    );

    let addr: SocketAddr = ([0, 0, 0, 0], cli.port).into();
    let server = WsServer::new(addr, events_tx, cancel.clone())
        .with_allowed_origin(cli.cors_origin);

    tokio::select! {
        _ = poll.run() => {
            tracing::warn!("poll loop exited unexpectedly");
        }
        result = server.run() => {
            match result {
                Ok(()) => tracing::warn!("ws server exited unexpectedly"),
                Err(e) => tracing::warn!("ws server error: {e}"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
    }

    cancel.cancel();
    tracing::info!("roundcast daemon stopped");
    Ok(())
}
