//! Push notification channel (HTTP POST to a webhook-style endpoint)

use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use tracing::{error, info, instrument};

use crate::config::PushConfig;

use super::{ChannelOutcome, Notification, priority_profile};

/// Connect timeout for push delivery
const CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Total request timeout for push delivery
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// HTTP push channel
///
/// Delivery is a single JSON POST with bounded timeouts. Any non-2xx
/// response or transport error is a failure; there are no retries here.
#[derive(Debug, Clone)]
pub struct PushChannel {
    client: Client,
    url: String,
    token: Option<String>,
}

impl PushChannel {
    pub fn new(config: &PushConfig) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("Failed to build HTTP client"),
            url: config.url.clone(),
            token: config.token.clone(),
        }
    }

    #[instrument(skip(self, note), fields(title = %note.title))]
    pub async fn send(&self, note: &Notification) -> ChannelOutcome {
        let profile = priority_profile(note.priority);

        let payload = json!({
            "title": note.title,
            "message": note.message,
            "priority": profile.urgency,
            "tags": [profile.tag],
            "timestamp": Utc::now().to_rfc3339(),
        });

        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        match request.send().await {
            Ok(response) => {
                if response.status().is_success() {
                    info!("successfully sent push notification");
                    ChannelOutcome::Delivered
                } else {
                    let status = response.status();
                    error!("push notification failed with status: {}", status);
                    ChannelOutcome::Failed(format!("unexpected status code: {status}"))
                }
            }
            Err(e) => {
                error!("failed to send push notification: {}", e);
                ChannelOutcome::Failed(e.to_string())
            }
        }
    }
}
