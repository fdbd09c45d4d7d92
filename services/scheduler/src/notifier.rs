//! Notification producer: posts sync results to the UDP bus trigger.

use mh_protocol::Notification;
use std::time::Duration;
use tracing::{debug, warn};

const POST_TIMEOUT: Duration = Duration::from_secs(5);

/// Thin client for the notification bus trigger gateway.
#[derive(Clone)]
pub struct TriggerNotifier {
    client: reqwest::Client,
    trigger_url: String,
}

impl TriggerNotifier {
    pub fn new(udp_http_addr: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(POST_TIMEOUT)
            .build()
            .expect("reqwest client construction cannot fail with static options");
        TriggerNotifier {
            client,
            trigger_url: format!("{}/trigger", udp_http_addr.trim_end_matches('/')),
        }
    }

    /// Post one notification. Failures are logged only — the next sync tick
    /// retries the whole pass, so nothing is queued here.
    pub async fn notify(&self, kind: &str, message: String) {
        let body = Notification::new(kind, "", message);
        match self.client.post(&self.trigger_url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(kind, "sync notification posted");
            }
            Ok(resp) => {
                warn!(kind, status = %resp.status(), "notification bus rejected sync notification");
            }
            Err(err) => {
                warn!(kind, error = %err, "failed to post sync notification");
            }
        }
    }
}
