//! Quotagate - main entry point
//!
//! Starts the HTTP gateway. Upstream handlers for the protected
//! namespace are mounted by the embedding host; run standalone, the
//! binary serves the health probe and admission-controls everything
//! under the protected prefix.

use std::net::SocketAddr;

use axum::Router;
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;

use quotagate::{Config, create_app, init_tracing};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    let config = Config::load().map_err(|e| {
        std::io::Error::other(format!(
            "Failed to load configuration. Check DATABASE_URL and QUOTAGATE__* env vars: {}",
            e
        ))
    })?;

    init_tracing(&config.logging)?;

    tracing::info!("Starting quotagate...");
    tracing::info!(
        "Configuration loaded: server={}:{} protected_prefix={}",
        config.server.host,
        config.server.port,
        config.gateway.protected_prefix
    );

    let server_host = config.server.host.clone();
    let server_port = config.server.port;

    let app_handle = create_app(config, Router::new())
        .await
        .map_err(|e| std::io::Error::other(format!("Failed to create application: {}", e)))?;

    let addr = SocketAddr::new(server_host.parse()?, server_port);
    tracing::info!("Gateway listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app_handle.router)
        .with_graceful_shutdown(shutdown_signal(app_handle.shutdown_token))
        .await?;

    tracing::info!("Gateway shutdown complete");
    Ok(())
}

/// Handle graceful shutdown signals and cancel background tasks
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }

    shutdown_token.cancel();
}
