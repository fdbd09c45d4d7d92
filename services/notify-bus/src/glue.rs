//! Fire-and-forget mirroring of broadcasts into the chat hub.
//!
//! Every notification the bus fans out is also posted to the hub's trigger
//! so the `global-notifications` room carries the datagram stream. The
//! cascade never reports back: failures are logged and the bus carries on.

use mh_protocol::Notification;
use std::time::Duration;
use tracing::{debug, warn};

const FORWARD_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HubGlue {
    client: reqwest::Client,
    base_url: String,
}

impl HubGlue {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FORWARD_TIMEOUT)
            .build()
            .expect("reqwest client construction cannot fail with static options");
        HubGlue {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Post `notification` to the hub trigger. Spawned; never blocks the
    /// caller.
    pub fn forward_notification(&self, notification: &Notification) {
        let url = format!("{}/trigger", self.base_url);
        let client = self.client.clone();
        let body = notification.clone();
        tokio::spawn(async move {
            match client.post(&url).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(kind = %body.kind, "notification mirrored to chat hub");
                }
                Ok(resp) => {
                    warn!(status = %resp.status(), "chat hub rejected notification forward");
                }
                Err(err) => {
                    warn!(error = %err, "chat hub notification forward failed");
                }
            }
        });
    }
}
