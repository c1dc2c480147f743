use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::core::providers::Notifier;

/// Discord rejects message content longer than this.
const MAX_CONTENT_CHARS: usize = 2000;

/// Writes notifications to the log only.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) {
        info!(target: "serverkeeper::notify", "{}", text);
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
}

fn clip(text: &str) -> String {
    if text.chars().count() <= MAX_CONTENT_CHARS {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(MAX_CONTENT_CHARS - 1).collect();
    clipped.push('…');
    clipped
}

/// Posts notifications to a Discord-compatible webhook.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, text: &str) {
        let content = clip(text);
        let result = self
            .client
            .post(&self.url)
            .json(&WebhookPayload { content: &content })
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => warn!(status = resp.status().as_u16(), "webhook rejected notification"),
            Err(e) => warn!(error = %e, "failed to deliver notification"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_discord_shaped() {
        let json = serde_json::to_string(&WebhookPayload { content: "Server started" }).unwrap();
        assert_eq!(json, r#"{"content":"Server started"}"#);
    }

    #[test]
    fn clip_limits_length() {
        let long = "a".repeat(2500);
        let clipped = clip(&long);
        assert_eq!(clipped.chars().count(), MAX_CONTENT_CHARS);
        assert!(clipped.ends_with('…'));
        assert_eq!(clip("short"), "short");
    }

    #[tokio::test]
    async fn unreachable_webhook_does_not_fail() {
        let notifier = WebhookNotifier::new(
            reqwest::Client::new(),
            "https://127.0.0.1:1/webhook".to_string(),
        );
        notifier.send("Server stopped").await;
    }
}
