//! Nodegate - transaction gateway for UTXO and account-model nodes
//!
//! Builds, fee-estimates, signs and broadcasts transactions on behalf of
//! callers, talking to a bitcoin-style node and an ethereum-style node over
//! JSON-RPC.

use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

mod account;
mod api;
mod config;
mod error;
mod metrics;
mod pipeline;
mod rpc;
mod tx;
mod utxo;

use config::Settings;
use metrics::MetricsServer;
use pipeline::{AccountPipeline, UtxoPipeline};
use rpc::http::Credentials;
use rpc::HttpTransport;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Nodegate v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration: fee policy {:?}, nonce strategy {:?}",
        settings.bitcoin.fee_policy, settings.ethereum.nonce_strategy
    );

    // Node transports
    let bitcoin_transport = HttpTransport::new(
        &settings.bitcoin.endpoint_main,
        &settings.bitcoin.endpoint_test,
        Some(Credentials {
            user: settings.bitcoin.rpc_user.clone(),
            password: settings.bitcoin.rpc_password.clone(),
        }),
        settings.rpc.timeout(),
    )?;
    let ethereum_transport = HttpTransport::new(
        &settings.ethereum.endpoint_main,
        &settings.ethereum.endpoint_test,
        None,
        settings.rpc.timeout(),
    )?;

    let state = api::AppState {
        bitcoin: Arc::new(UtxoPipeline::new(
            Arc::new(bitcoin_transport),
            settings.bitcoin.fee_policy,
        )),
        ethereum: Arc::new(AccountPipeline::new(
            Arc::new(ethereum_transport),
            settings.ethereum.nonce_strategy,
        )),
    };

    // Start API server
    let api_handle = tokio::spawn({
        let config = settings.api.clone();
        async move {
            if let Err(e) = api::run_server(config, state).await {
                error!("API server error: {:#}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {:#}", e);
            }
        }))
    } else {
        None
    };

    info!("Nodegate is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    api_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Nodegate stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,nodegate=debug,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
