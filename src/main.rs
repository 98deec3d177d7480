//! Crosslock coordinator - trust-minimized BTC/EVM swap settlement
//!
//! Prepares raw transactions on both chains, submits them with the release
//! predicates to a threshold-signing oracle, and broadcasts whatever the
//! returned signature shares allow.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

mod chain;
mod config;
mod coordination;
mod error;
mod metrics;
mod oracle;
mod tx;

use chain::{BtcExplorer, EvmRpc};
use config::Settings;
use coordination::{SwapEngine, SwapIntent};
use metrics::MetricsServer;
use oracle::QuorumOracleClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Crosslock coordinator v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration: btc={} evm chain {}",
        settings.btc.network, settings.evm.chain_id
    );

    // The swap is created fresh at startup; its origin time anchors the
    // deadline predicate for its whole lifetime.
    let intent = SwapIntent::from_settings(&settings, Utc::now())?;
    info!(
        "Swap {}: {} sat against {} wei, deadline {} days",
        intent.id, intent.btc_sats, intent.evm_wei, intent.deadline_days
    );

    // Chain clients
    let explorer = Arc::new(BtcExplorer::new(&settings.btc.explorer_url));
    let evm_rpc = Arc::new(EvmRpc::new(&settings.evm)?);
    info!("Chain clients initialized");

    // Signing oracle client
    let oracle_client = Arc::new(QuorumOracleClient::new(&settings.oracle.endpoint));
    info!(
        "Signing oracle at {} (evaluator {})",
        settings.oracle.endpoint, settings.oracle.evaluator_cid
    );

    // Initialize metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Swap engine
    let engine = Arc::new(SwapEngine::new(
        explorer,
        evm_rpc,
        oracle_client,
        settings.clone(),
    ));

    let engine_handle = tokio::spawn({
        let engine = engine.clone();
        let intent = intent.clone();
        async move { engine.run(&intent).await }
    });

    info!("Crosslock coordinator is running");
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Run until the swap resolves or a shutdown signal arrives
    tokio::select! {
        result = engine_handle => {
            match result? {
                Ok(Some(report)) => {
                    info!(
                        "Swap {} settled: btc={:?} evm={:?}",
                        report.swap_id, report.btc_txid, report.evm_tx_hash
                    );
                }
                Ok(None) => info!("Engine stopped before settlement"),
                Err(e) => error!("Swap aborted: {}", e),
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping...");
            engine.stop().await;
        }
    }

    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Crosslock coordinator stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,crosslock_coordinator=debug,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
