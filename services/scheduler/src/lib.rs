pub mod config;
pub mod notifier;
pub mod sources;
pub mod store;
pub mod sync;

pub use config::Config;
pub use notifier::TriggerNotifier;
pub use sources::{CatalogSource, JikanClient, MalClient, MangaDexClient, SourceError};
pub use store::{CatalogItem, CatalogStore, MemoryCatalog};
pub use sync::SyncTask;

use tracing::info;

/// Spawn one sync task per configured source and wait for SIGINT/SIGTERM.
/// The tasks are independent background loops; none of them ever blocks a
/// request handler.
pub async fn run(config: Config) {
    let notifier = TriggerNotifier::new(&config.udp_http_addr);

    let jikan = SyncTask::new(
        MemoryCatalog::new(),
        JikanClient::new(config.jikan_base_url.clone(), config.jikan_rate_limit),
        notifier.clone(),
    );
    tokio::spawn(jikan.run());

    let mangadex = SyncTask::new(
        MemoryCatalog::new(),
        MangaDexClient::new(config.mangadex_base_url.clone()),
        notifier.clone(),
    );
    tokio::spawn(mangadex.run());

    if let Some(client_id) = config.mal_client_id.clone() {
        let mal = SyncTask::new(
            MemoryCatalog::new(),
            MalClient::new(client_id),
            notifier.clone(),
        );
        tokio::spawn(mal.run());
        info!("myanimelist adapter enabled");
    }

    info!(trigger = %config.udp_http_addr, "scheduler running");
    shutdown_signal().await;
    info!("scheduler shut down");
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
