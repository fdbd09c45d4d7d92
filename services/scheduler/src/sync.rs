//! Timer-driven ingestion.
//!
//! One [`SyncTask`] per catalog source, each an independent background task:
//! a 2-second warm-up, an initial bounded refresh (the catalog count is read
//! for logging, but a non-empty store still gets the refresh), then a steady
//! 15-minute cadence with a small per-tick cap. A non-empty delta posts a
//! delta notification to the UDP bus trigger; an empty initial pass posts
//! `sync_complete`. Failures are logged and the next tick retries — no
//! backoff.

use crate::notifier::TriggerNotifier;
use crate::sources::{CatalogSource, SourceError};
use crate::store::CatalogStore;
use std::time::Duration;
use tokio::time::interval;
use tracing::{info, warn};

/// Delay before the initial pass.
pub const WARMUP_DELAY: Duration = Duration::from_secs(2);
/// Steady-state cadence.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(15 * 60);
/// Fetch bound for the initial refresh.
pub const INITIAL_FETCH_LIMIT: usize = 500;
/// Fetch bound for steady ticks.
pub const STEADY_FETCH_LIMIT: usize = 20;

pub struct SyncTask<S, A> {
    store: S,
    source: A,
    notifier: TriggerNotifier,
}

impl<S: CatalogStore, A: CatalogSource> SyncTask<S, A> {
    pub fn new(store: S, source: A, notifier: TriggerNotifier) -> Self {
        SyncTask {
            store,
            source,
            notifier,
        }
    }

    /// Run forever. Never blocks request handlers — callers spawn this.
    pub async fn run(self) {
        tokio::time::sleep(WARMUP_DELAY).await;

        match self.pass(INITIAL_FETCH_LIMIT).await {
            Ok(synced) if synced > 0 => {
                self.notify_delta(synced).await;
            }
            Ok(_) => {
                info!(source = self.source.name(), "initial sync found nothing new");
                self.notifier
                    .notify(
                        mh_protocol::kinds::SYNC_COMPLETE,
                        format!("{} sync complete, catalog up to date", self.source.name()),
                    )
                    .await;
            }
            Err(err) => {
                warn!(source = self.source.name(), error = %err, "initial sync failed, next tick retries");
            }
        }

        let mut ticker = interval(SYNC_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match self.pass(STEADY_FETCH_LIMIT).await {
                Ok(synced) if synced > 0 => self.notify_delta(synced).await,
                Ok(_) => {}
                Err(err) => {
                    warn!(source = self.source.name(), error = %err, "sync failed, next tick retries");
                }
            }
        }
    }

    /// One ingestion pass: bounded fetch, upsert, return the new-entry count.
    async fn pass(&self, limit: usize) -> Result<u64, SourceError> {
        let existing = self.store.count().await;
        info!(
            source = self.source.name(),
            existing, limit, "sync pass starting"
        );
        let items = self.source.fetch_recent(limit).await?;
        let synced = self.store.upsert(&items).await;
        info!(
            source = self.source.name(),
            fetched = items.len(),
            synced,
            "sync pass finished"
        );
        Ok(synced)
    }

    async fn notify_delta(&self, synced: u64) {
        self.notifier
            .notify(
                self.source.delta_kind(),
                format!("Synced {synced} new entries from {}", self.source.name()),
            )
            .await;
    }
}
