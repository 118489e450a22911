//! Faucet service binary

use clap::Parser;
use regtest_faucet::logging::init_logging;
use regtest_faucet::{
    api, FaucetConfig, FaucetService, SyncPolicy, TransactionLedger, WalletCli, WalletClient,
    WalletConfig,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

/// Faucet service CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server address
    #[arg(long)]
    server_addr: Option<String>,

    /// Wallet data directory (also holds the ledger)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Run the wallet tool inside this container
    #[arg(long)]
    container: Option<String>,

    /// Node RPC URL
    #[arg(long)]
    rpc_url: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration: defaults, file, environment, CLI
    let mut config = match &args.config {
        Some(path) => FaucetConfig::from_file(path)?,
        None => FaucetConfig::default(),
    };
    config.apply_env();

    if let Some(addr) = args.server_addr {
        config.server_addr = addr;
    }

    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }

    if let Some(container) = args.container {
        config.container = Some(container);
    }

    if let Some(rpc_url) = args.rpc_url {
        config.rpc_url = rpc_url;
    }

    if args.debug {
        config.logging.level = "debug".to_string();
    }

    init_logging(&config.logging).map_err(|e| anyhow::anyhow!("{}", e))?;
    config.validate()?;

    info!("Starting regtest faucet v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Server address: {}", config.server_addr);
    info!("  Wallet tool: {}", config.cli_path);
    info!("  Data directory: {}", config.data_dir.display());
    info!("  Lightwalletd: {}", config.lightwalletd_uri);
    if let Some(container) = &config.container {
        info!("  Container: {} ({})", container, config.container_runtime);
    }
    info!("  Node RPC: {}", config.rpc_url);
    info!(
        "  Amounts: {} default, {}..={} ZEC",
        config.amount_default, config.amount_min, config.amount_max
    );
    if config.rate_limit_enabled {
        info!(
            "  Rate limit: {} requests / {}s per IP",
            config.rate_limit_requests, config.rate_limit_window_secs
        );
    } else {
        warn!("  Rate limiting disabled");
    }

    // A corrupt ledger stops startup
    let ledger = TransactionLedger::open(&config.data_dir)?;
    info!(
        "Ledger loaded from {}: {} transactions, {} ZEC sent",
        ledger.path().display(),
        ledger.len(),
        ledger.total_sent()
    );

    let wallet_config = WalletConfig::from(&config);
    let runner = Arc::new(WalletCli::new(wallet_config.clone()));
    let wallet = Arc::new(WalletClient::new(
        runner,
        wallet_config,
        SyncPolicy::from(&config),
        ledger,
    ));

    let service = Arc::new(FaucetService::new(config.clone(), wallet)?);
    info!("Faucet service initialized");

    let app = api::router(service);

    // Start server
    let addr: SocketAddr = config.server_addr.parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Shutting down gracefully");
    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
