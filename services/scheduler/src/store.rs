//! Catalog datastore seam.
//!
//! The fabric never owns the catalog database; the surrounding system does.
//! Ingestion only needs a count and an upsert, so that is the whole trait —
//! deployments plug their store in, tests inject fakes, and the default
//! binary runs on the in-memory implementation.

use std::collections::HashMap;
use std::future::Future;
use tokio::sync::RwLock;

/// One synced catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    /// Source-scoped id (mal id, MangaDex uuid, ...).
    pub id: String,
    pub title: String,
    pub latest_chapter: Option<u32>,
}

pub trait CatalogStore: Send + Sync {
    /// Number of entries currently stored.
    fn count(&self) -> impl Future<Output = u64> + Send;

    /// Insert or refresh `items`; returns how many ids were new.
    fn upsert(&self, items: &[CatalogItem]) -> impl Future<Output = u64> + Send;
}

/// In-memory catalog, keyed by item id.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    entries: RwLock<HashMap<String, CatalogItem>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CatalogStore for MemoryCatalog {
    async fn count(&self) -> u64 {
        self.entries.read().await.len() as u64
    }

    async fn upsert(&self, items: &[CatalogItem]) -> u64 {
        let mut entries = self.entries.write().await;
        let mut added = 0;
        for item in items {
            if entries.insert(item.id.clone(), item.clone()).is_none() {
                added += 1;
            }
        }
        added
    }
}
