use std::time::Duration;

use phantom_common::Settings;
use serde_json::json;

/// Telegram notification sender. Best-effort: failures are reported to the
/// caller as `false` and never interrupt the engine.
#[derive(Clone)]
pub struct Notifier {
    http: reqwest::Client,
}

impl Notifier {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    pub async fn send(&self, settings: &Settings, text: &str) -> bool {
        if settings.tg_token.is_empty() {
            tracing::warn!("telegram notification skipped: bot token not configured");
            return false;
        }
        if settings.tg_chat_id.is_empty() {
            tracing::warn!("telegram notification skipped: chat id not configured");
            return false;
        }

        let url = format!("https://api.telegram.org/bot{}/sendMessage", settings.tg_token);
        let payload = json!({
            "chat_id": settings.tg_chat_id,
            "text": text,
        });

        match self
            .http
            .post(&url)
            .timeout(Duration::from_secs(10))
            .json(&payload)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                tracing::warn!(%status, body, "telegram API rejected notification");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to reach telegram API");
                false
            }
        }
    }
}
