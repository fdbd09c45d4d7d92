pub mod bus;
pub mod config;
pub mod gateway;
pub mod glue;
pub mod sse;

pub use bus::{NotifyBus, PublishError};
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

/// Bind the datagram socket and the gateway, spawn the bus tasks, and serve
/// until SIGINT/SIGTERM. Bind failures are unrecoverable and bubble up to
/// the caller (the binary exits non-zero).
pub async fn run(config: Config) -> Result<(), RunError> {
    let socket = tokio::net::UdpSocket::bind(("0.0.0.0", config.udp_port))
        .await
        .map_err(|source| RunError::Bind {
            what: "UDP bus socket",
            source,
        })?;
    let http_listener = tokio::net::TcpListener::bind(("0.0.0.0", config.http_port))
        .await
        .map_err(|source| RunError::Bind {
            what: "trigger gateway",
            source,
        })?;
    info!(
        udp_port = config.udp_port,
        http_port = config.http_port,
        "notification bus listening"
    );

    let (bus, queue_rx) = NotifyBus::new(socket, config.chat_hub_addr.clone());
    tokio::spawn(Arc::clone(&bus).run_receiver());
    tokio::spawn(Arc::clone(&bus).run_fanout(queue_rx));
    tokio::spawn(Arc::clone(&bus).run_heartbeat());

    let state = GatewayState {
        bus,
        jwt_secret: config.jwt_secret.into(),
        sse_keepalive: config.sse_keepalive,
    };
    axum::serve(http_listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(RunError::Serve)?;
    info!("notification bus shut down gracefully");
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
