pub mod config;
pub mod gateway;
pub mod hub;
pub mod room;
pub mod ws;

pub use config::Config;
pub use gateway::{GatewayState, build_router};
pub use hub::{GLOBAL_ROOM, Hub};

use std::sync::Arc;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to bind chat hub listener: {0}")]
    Bind(std::io::Error),
    #[error("chat hub server error: {0}")]
    Serve(std::io::Error),
}

/// Bind the listener, start the hub (global room included), and serve until
/// SIGINT/SIGTERM. Bind failures are unrecoverable and bubble up to the
/// caller (the binary exits non-zero).
pub async fn run(config: Config) -> Result<(), RunError> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.ws_port))
        .await
        .map_err(RunError::Bind)?;
    info!(ws_port = config.ws_port, "chat hub listening");

    let (hub, notify_rx) = Hub::new();
    hub.room(GLOBAL_ROOM).await;
    tokio::spawn(Arc::clone(&hub).run_notification_fanin(notify_rx));

    let state = GatewayState {
        hub,
        jwt_secret: config.jwt_secret.into(),
    };
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(RunError::Serve)?;
    info!("chat hub shut down gracefully");
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
