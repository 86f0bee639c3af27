//! Notification sink.
//!
//! Pushes human-readable pass summaries and alerts to Discord webhooks:
//! one channel for routine logs, one for alerts that should page a human.
//! Notifications are strictly best-effort: implementations log their own
//! failures and never surface them, so a dead webhook cannot abort a pass.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::warn;

/// Best-effort message push. `is_alert` routes to the alerts channel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str, is_alert: bool);
}

// ---------------------------------------------------------------------------
// Discord webhooks
// ---------------------------------------------------------------------------

pub struct DiscordNotifier {
    http: Client,
    logs_url: String,
    alerts_url: String,
    username: String,
}

impl DiscordNotifier {
    pub fn new(logs_url: String, alerts_url: String) -> Self {
        Self {
            http: Client::new(),
            logs_url,
            alerts_url,
            username: format!("RATCHET v{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, message: &str, is_alert: bool) {
        if message.is_empty() {
            return;
        }

        let url = if is_alert { &self.alerts_url } else { &self.logs_url };
        let payload = json!({
            "username": self.username,
            "content": message,
        });

        if let Err(e) = self.http.post(url).json(&payload).send().await {
            // Suppressed: a notification failure must never fail a pass.
            warn!(error = %e, is_alert, "Failed to send notification");
        }
    }
}

// ---------------------------------------------------------------------------
// Disabled sink
// ---------------------------------------------------------------------------

/// Used when notifications are disabled; alerts still reach local logs.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, message: &str, is_alert: bool) {
        if is_alert {
            warn!("{message}");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_notifier_accepts_anything() {
        tokio_test::block_on(async {
            let notifier = NullNotifier;
            notifier.notify("routine line", false).await;
            notifier.notify("alert line", true).await;
        });
    }

    #[test]
    fn test_discord_notifier_swallows_unreachable_webhook() {
        // Unroutable address: the send fails, the call must not panic.
        tokio_test::block_on(async {
            let notifier = DiscordNotifier::new(
                "http://127.0.0.1:9/logs".to_string(),
                "http://127.0.0.1:9/alerts".to_string(),
            );
            notifier.notify("message into the void", true).await;
        });
    }

    #[test]
    fn test_username_carries_version() {
        let notifier = DiscordNotifier::new(String::new(), String::new());
        assert!(notifier.username.starts_with("RATCHET v"));
    }
}
