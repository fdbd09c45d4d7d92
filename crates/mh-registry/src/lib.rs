//! Live-peer registry shared by the fabric buses.
//!
//! Each bus keeps one [`Registry`] of its connected peers, keyed by the
//! peer's socket address string, with a last-seen instant for liveness
//! sweeps. The lock is held only for add/remove/snapshot; fan-outs iterate a
//! [`Registry::snapshot`] copy so no write ever happens under the lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry<C> {
    client: C,
    last_seen: Instant,
}

/// Thread-safe map of live endpoints with last-seen timestamps.
///
/// `C` is the per-peer handle a bus needs to reach the peer again: a shared
/// TCP writer half, a datagram destination address, an outbound queue.
#[derive(Debug)]
pub struct Registry<C> {
    inner: Arc<RwLock<HashMap<String, Entry<C>>>>,
}

impl<C> Clone for Registry<C> {
    fn clone(&self) -> Self {
        Registry {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Registry<C> {
    pub fn new() -> Self {
        Registry {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Add a peer, or refresh its last-seen if already present (idempotent).
    pub async fn register(&self, key: &str, client: C) {
        let mut map = self.inner.write().await;
        map.entry(key.to_owned())
            .and_modify(|entry| entry.last_seen = Instant::now())
            .or_insert(Entry {
                client,
                last_seen: Instant::now(),
            });
    }

    /// Remove a peer. Missing keys are not an error; returns whether the key
    /// was present.
    pub async fn unregister(&self, key: &str) -> bool {
        self.inner.write().await.remove(key).is_some()
    }

    /// Refresh a peer's last-seen to now.
    pub async fn touch(&self, key: &str) {
        if let Some(entry) = self.inner.write().await.get_mut(key) {
            entry.last_seen = Instant::now();
        }
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.inner.read().await.contains_key(key)
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Keys whose last-seen lags more than `max_idle` behind now.
    pub async fn stale(&self, max_idle: Duration) -> Vec<String> {
        let now = Instant::now();
        self.inner
            .read()
            .await
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_seen) > max_idle)
            .map(|(key, _)| key.clone())
            .collect()
    }
}

impl<C: Clone> Registry<C> {
    /// Copy of the current entries, for iteration outside the lock.
    pub async fn snapshot(&self) -> Vec<(String, C)> {
        self.inner
            .read()
            .await
            .iter()
            .map(|(key, entry)| (key.clone(), entry.client.clone()))
            .collect()
    }
}
