//! Fire-and-forget routing of progress updates into the chat hub.
//!
//! An update that names a `manga_id` is mirrored into the hub room of that
//! id as a `progress_update` chat event. The cascade never reports back:
//! failures are logged and the bus carries on.

use mh_protocol::ProgressUpdate;
use std::time::Duration;
use tracing::{debug, warn};

const FORWARD_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RoomGlue {
    client: reqwest::Client,
    base_url: String,
}

impl RoomGlue {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FORWARD_TIMEOUT)
            .build()
            .expect("reqwest client construction cannot fail with static options");
        RoomGlue {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Post `update` into the hub room matching its `manga_id`, if any.
    /// Spawned; never blocks the caller.
    pub fn forward_progress(&self, update: &ProgressUpdate) {
        let Some(manga_id) = update.manga_id.clone() else {
            return;
        };
        let url = format!("{}/api/v1/rooms/{}/progress", self.base_url, manga_id);
        let client = self.client.clone();
        let body = update.clone();
        tokio::spawn(async move {
            match client.post(&url).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(room = %manga_id, "progress routed to chat hub");
                }
                Ok(resp) => {
                    warn!(room = %manga_id, status = %resp.status(), "chat hub rejected progress forward");
                }
                Err(err) => {
                    warn!(room = %manga_id, error = %err, "chat hub progress forward failed");
                }
            }
        });
    }
}
