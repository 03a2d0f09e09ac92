#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Credence operator node entrypoint (systemd-friendly).
//! Loads the operator key, starts the consensus service and serves
//! metrics until a shutdown signal arrives.

use std::path::Path;
use std::sync::Arc;

use credence::core::config;
use credence::core::consensus::service::ConsensusService;
use credence::core::security::keystore;
use credence::monitoring::metrics::{self, Metrics};
use tracing::{info, warn};

fn env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .json()
        .try_init();

    let config_path = env("CREDENCE_CONFIG", "./credence.toml");
    let cfg = match config::load_or_default(Path::new(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("config load failed ({config_path}): {e}");
            std::process::exit(1);
        }
    };

    // The derived address identifies this operator toward the registry
    // and its consensus peers.
    let signer = match keystore::open_operator_signer(&cfg.node.data_dir) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("keystore open failed: {e}");
            std::process::exit(1);
        }
    };
    info!(operator = %signer.address(), data_dir = %cfg.node.data_dir, "operator identity loaded");

    let metrics = Arc::new(Metrics::new().expect("metrics init failed"));

    let (service, mut ev_rx, sweep_handle) =
        ConsensusService::spawn(cfg.engine.clone(), metrics.clone());

    // keep alive + log events
    let ev_task = tokio::spawn(async move {
        while let Some(ev) = ev_rx.recv().await {
            info!(?ev, "engine event");
        }
        warn!("engine event channel closed");
    });

    let app = metrics::router(metrics.clone());
    let listener = match tokio::net::TcpListener::bind(&cfg.http.listen_addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("metrics bind failed ({}): {e}", cfg.http.listen_addr);
            std::process::exit(1);
        }
    };
    let http_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!(error = %e, "metrics server exited");
        }
    });

    info!(
        node = %cfg.node.name,
        listen = %cfg.http.listen_addr,
        version = env!("CARGO_PKG_VERSION"),
        git = option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        "credence operator node started"
    );

    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");

    service.shutdown();
    let _ = sweep_handle.await;
    ev_task.abort();
    http_task.abort();
}
