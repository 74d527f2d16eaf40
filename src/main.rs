//! Mini Memcached - A lightweight in-memory cache server
//!
//! Serves the memcached text protocol on `SERVER_PORT` and an HTTP admin API
//! on `ADMIN_PORT`.

use std::net::{SocketAddr, TcpListener};

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mini_memcached::api::{create_router, AppState};
use mini_memcached::{network, Config, Storage};

/// Main entry point for the cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the shared cache
/// 4. Bind the protocol listener and start the selected transport
/// 5. Serve the admin API, if enabled, until SIGINT/SIGTERM
/// 6. Stop the transport and wait for it to drain
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mini_memcached=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Mini Memcached");

    let config = Config::from_env();
    info!(
        "Configuration loaded: capacity={}B, port={}, admin_port={:?}, transport={:?}, workers={}",
        config.cache_capacity,
        config.server_port,
        config.admin_port,
        config.transport,
        config.workers
    );

    let storage = Storage::new(config.cache_capacity);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener =
        TcpListener::bind(addr).with_context(|| format!("failed to bind cache listener on {addr}"))?;

    let mut server = network::from_config(storage.clone(), &config);
    server
        .start(listener)
        .context("failed to start cache transport")?;
    info!("Cache protocol listening on {}", addr);

    match config.admin_port {
        Some(port) => {
            let admin_addr = SocketAddr::from(([0, 0, 0, 0], port));
            let admin_listener = tokio::net::TcpListener::bind(admin_addr)
                .await
                .with_context(|| format!("failed to bind admin listener on {admin_addr}"))?;
            info!("Admin API listening on http://{}", admin_addr);

            let app = create_router(AppState::new(storage));
            axum::serve(admin_listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("admin server failed")?;
        }
        None => shutdown_signal().await,
    }

    server.stop();
    tokio::task::spawn_blocking(move || server.join())
        .await
        .context("transport join task failed")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
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
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
