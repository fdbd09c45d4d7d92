//! External catalog API adapters.
//!
//! Three read-only clients feed ingestion: Jikan (unofficial MyAnimeList),
//! MangaDex, and — when a client id is configured — the official
//! MyAnimeList v2 API. Each adapter applies a client-side rate gate of at
//! least [`MIN_REQUEST_GAP`] between calls (Jikan's gap is configurable and
//! usually wider).

use crate::store::CatalogItem;
use serde::Deserialize;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Floor between any two requests to one upstream (≤ 5 req/s).
pub const MIN_REQUEST_GAP: Duration = Duration::from_millis(200);
/// Per-request timeout for every adapter.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Jikan caps page size at 25.
const JIKAN_PAGE_SIZE: usize = 25;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned {0}")]
    Status(reqwest::StatusCode),
}

pub trait CatalogSource: Send + Sync {
    /// Adapter name for logs.
    fn name(&self) -> &'static str;

    /// Notification kind emitted when this source produces a delta.
    fn delta_kind(&self) -> &'static str;

    /// Most recently updated entries, newest first, at most `limit`.
    fn fetch_recent(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<CatalogItem>, SourceError>> + Send;
}

// ---------------------------------------------------------------------------
// Rate gate
// ---------------------------------------------------------------------------

/// Serializes calls to one upstream and enforces a minimum gap between them.
struct RateGate {
    gap: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateGate {
    fn new(gap: Duration) -> Self {
        RateGate {
            gap: gap.max(MIN_REQUEST_GAP),
            last_call: Mutex::new(None),
        }
    }

    async fn wait(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(previous) = *last {
            let ready = previous + self.gap;
            let now = Instant::now();
            if ready > now {
                tokio::time::sleep_until(ready).await;
            }
        }
        *last = Some(Instant::now());
    }
}

// ---------------------------------------------------------------------------
// Jikan
// ---------------------------------------------------------------------------

pub struct JikanClient {
    client: reqwest::Client,
    base_url: String,
    gate: RateGate,
}

#[derive(Debug, Deserialize)]
struct JikanPage {
    data: Vec<JikanManga>,
}

#[derive(Debug, Deserialize)]
struct JikanManga {
    mal_id: u64,
    title: String,
    chapters: Option<u32>,
}

impl JikanClient {
    pub fn new(base_url: String, rate_limit: Duration) -> Self {
        JikanClient {
            client: http_client(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            gate: RateGate::new(rate_limit),
        }
    }
}

impl CatalogSource for JikanClient {
    fn name(&self) -> &'static str {
        "jikan"
    }

    fn delta_kind(&self) -> &'static str {
        mh_protocol::kinds::NEW_COMICS
    }

    async fn fetch_recent(&self, limit: usize) -> Result<Vec<CatalogItem>, SourceError> {
        let mut items = Vec::with_capacity(limit);
        let mut page = 1;
        while items.len() < limit {
            self.gate.wait().await;
            let url = format!(
                "{}/manga?order_by=mal_id&sort=desc&limit={}&page={}",
                self.base_url,
                JIKAN_PAGE_SIZE.min(limit - items.len()),
                page
            );
            debug!(url = %url, "jikan fetch");
            let resp = self.client.get(&url).send().await?;
            if !resp.status().is_success() {
                return Err(SourceError::Status(resp.status()));
            }
            let body: JikanPage = resp.json().await?;
            if body.data.is_empty() {
                break;
            }
            items.extend(body.data.into_iter().map(|manga| CatalogItem {
                id: format!("mal-{}", manga.mal_id),
                title: manga.title,
                latest_chapter: manga.chapters,
            }));
            page += 1;
        }
        items.truncate(limit);
        Ok(items)
    }
}

// ---------------------------------------------------------------------------
// MangaDex
// ---------------------------------------------------------------------------

pub struct MangaDexClient {
    client: reqwest::Client,
    base_url: String,
    gate: RateGate,
}

#[derive(Debug, Deserialize)]
struct MangaDexPage {
    data: Vec<MangaDexManga>,
}

#[derive(Debug, Deserialize)]
struct MangaDexManga {
    id: String,
    attributes: MangaDexAttributes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MangaDexAttributes {
    #[serde(default)]
    title: HashMap<String, String>,
    #[serde(default)]
    last_chapter: Option<String>,
}

impl MangaDexClient {
    pub fn new(base_url: String) -> Self {
        MangaDexClient {
            client: http_client(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            gate: RateGate::new(MIN_REQUEST_GAP),
        }
    }
}

impl CatalogSource for MangaDexClient {
    fn name(&self) -> &'static str {
        "mangadex"
    }

    fn delta_kind(&self) -> &'static str {
        mh_protocol::kinds::NEW_CHAPTERS
    }

    async fn fetch_recent(&self, limit: usize) -> Result<Vec<CatalogItem>, SourceError> {
        self.gate.wait().await;
        let url = format!(
            "{}/manga?limit={}&order[latestUploadedChapter]=desc",
            self.base_url, limit
        );
        debug!(url = %url, "mangadex fetch");
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(SourceError::Status(resp.status()));
        }
        let body: MangaDexPage = resp.json().await?;
        Ok(body
            .data
            .into_iter()
            .map(|manga| CatalogItem {
                id: format!("md-{}", manga.id),
                title: manga
                    .attributes
                    .title
                    .get("en")
                    .or_else(|| manga.attributes.title.values().next())
                    .cloned()
                    .unwrap_or_else(|| "Untitled".to_owned()),
                latest_chapter: manga
                    .attributes
                    .last_chapter
                    .as_deref()
                    .and_then(|chapter| chapter.parse().ok()),
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MyAnimeList v2 (requires a client id)
// ---------------------------------------------------------------------------

pub struct MalClient {
    client: reqwest::Client,
    client_id: String,
    gate: RateGate,
}

#[derive(Debug, Deserialize)]
struct MalRanking {
    data: Vec<MalRankingEntry>,
}

#[derive(Debug, Deserialize)]
struct MalRankingEntry {
    node: MalManga,
}

#[derive(Debug, Deserialize)]
struct MalManga {
    id: u64,
    title: String,
}

impl MalClient {
    pub fn new(client_id: String) -> Self {
        MalClient {
            client: http_client(),
            client_id,
            gate: RateGate::new(MIN_REQUEST_GAP),
        }
    }
}

impl CatalogSource for MalClient {
    fn name(&self) -> &'static str {
        "myanimelist"
    }

    fn delta_kind(&self) -> &'static str {
        mh_protocol::kinds::MANGA_UPDATE
    }

    async fn fetch_recent(&self, limit: usize) -> Result<Vec<CatalogItem>, SourceError> {
        self.gate.wait().await;
        let url = format!(
            "https://api.myanimelist.net/v2/manga/ranking?ranking_type=all&limit={limit}"
        );
        debug!(url = %url, "myanimelist fetch");
        let resp = self
            .client
            .get(&url)
            .header("X-MAL-CLIENT-ID", &self.client_id)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(SourceError::Status(resp.status()));
        }
        let body: MalRanking = resp.json().await?;
        Ok(body
            .data
            .into_iter()
            .map(|entry| CatalogItem {
                id: format!("mal-{}", entry.node.id),
                title: entry.node.title,
                latest_chapter: None,
            })
            .collect())
    }
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .expect("reqwest client construction cannot fail with static options")
}
