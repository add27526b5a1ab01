//! `fle-svc` — field-level encryption sidecar entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] and [`KmsConfig`] from environment variables.
//! 2. Initialise the telemetry pipeline (JSON logs, optional OTLP spans).
//! 3. Select the KMS backend and build the shared DEK cache.
//! 4. Spawn the cache sweeper.
//! 5. Build the Axum router and serve until ctrl-c.

mod config;
mod server;
mod telemetry;

use anyhow::{Context, Result};
use fle::{create_kms_client, CacheSweeper, KmsBackendKind, KmsConfig};
use tracing::{info, warn};

use crate::config::Config;
use server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;
    let kms_cfg = KmsConfig::from_env()
        .context("KMS configuration invalid")
        .map_err(|e| {
            eprintln!("ERROR: {e:#}");
            e
        })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_port = cfg.listen_port,
        "fle-svc starting"
    );

    // -----------------------------------------------------------------------
    // 3. KMS client and DEK cache
    // -----------------------------------------------------------------------
    let kms = create_kms_client(&kms_cfg)
        .await
        .context("failed to initialise KMS client")?;
    if kms.backend() == KmsBackendKind::Unconfigured {
        warn!("no usable KMS configured; key and encrypt operations will fail until restarted with KMS_KEY_ID");
    }
    let dek_cache = kms_cfg.dek_cache();

    // -----------------------------------------------------------------------
    // 4. Background tasks
    // -----------------------------------------------------------------------
    let sweeper = CacheSweeper::start(dek_cache.clone(), kms_cfg.sweep_interval());

    // -----------------------------------------------------------------------
    // 5. HTTP server
    // -----------------------------------------------------------------------
    let state = AppState::new(kms, dek_cache.clone());
    let router = server::router::build(state);

    let addr = cfg.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down");
    sweeper.stop().await;
    dek_cache.clear().await;
    telemetry::shutdown_telemetry();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c; shutting down");
    }
}
