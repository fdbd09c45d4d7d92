pub mod bus;
pub mod config;
pub mod gateway;
pub mod glue;
pub mod sse;

pub use bus::{ProgressBus, PublishError};
pub use config::Config;
pub use gateway::{GatewayState, build_router};

use std::sync::Arc;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to bind {what}: {source}")]
    Bind {
        what: &'static str,
        source: std::io::Error,
    },
    #[error("gateway server error: {0}")]
    Serve(std::io::Error),
}

/// Bind both listeners, spawn the bus tasks, and serve the gateway until
/// SIGINT/SIGTERM. Bind failures are unrecoverable and bubble up to the
/// caller (the binary exits non-zero).
pub async fn run(config: Config) -> Result<(), RunError> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.tcp_port))
        .await
        .map_err(|source| RunError::Bind {
            what: "TCP bus listener",
            source,
        })?;
    let http_listener = tokio::net::TcpListener::bind(("0.0.0.0", config.http_port))
        .await
        .map_err(|source| RunError::Bind {
            what: "trigger gateway",
            source,
        })?;
    info!(
        tcp_port = config.tcp_port,
        http_port = config.http_port,
        "progress bus listening"
    );

    let (bus, bus_rx) = ProgressBus::new(config.chat_hub_addr.clone());
    tokio::spawn(Arc::clone(&bus).run_fanout(bus_rx));
    tokio::spawn(Arc::clone(&bus).run_watchdog());
    tokio::spawn(Arc::clone(&bus).serve_listener(listener));

    let state = GatewayState {
        bus,
        jwt_secret: config.jwt_secret.into(),
        sse_keepalive: config.sse_keepalive,
    };
    axum::serve(http_listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(RunError::Serve)?;
    info!("progress bus shut down gracefully");
    Ok(())
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
