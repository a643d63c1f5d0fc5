//! Operator notifications through a chat webhook.
//!
//! Messages are posted as `{"msgtype":"text","text":{"content":…}}`. With no
//! webhook configured every call is a no-op. Delivery failures are logged
//! and never propagated.

use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

#[derive(Serialize)]
struct TextBody<'a> {
    content: &'a str,
}

#[derive(Serialize)]
struct WebhookMessage<'a> {
    msgtype: &'static str,
    text: TextBody<'a>,
}

fn message(content: &str) -> WebhookMessage<'_> {
    WebhookMessage {
        msgtype: "text",
        text: TextBody { content },
    }
}

#[derive(Debug, Clone)]
pub struct Notifier {
    client: Client,
    url: Option<String>,
}

impl Notifier {
    pub fn new(url: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client, url }
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    #[instrument(level = "info", skip_all)]
    pub async fn send(&self, content: &str) {
        let Some(url) = self.url.as_deref() else {
            debug!(%content, "No webhook configured; not sending");
            return;
        };
        match self.client.post(url).json(&message(content)).send().await {
            Ok(resp) if resp.status().is_success() => info!("Webhook notified"),
            Ok(resp) => warn!(status = %resp.status(), "Webhook rejected message"),
            Err(e) => warn!(error = %e, "Webhook delivery failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_shape() {
        let body = serde_json::to_value(message("登录二维码已生成")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"msgtype": "text", "text": {"content": "登录二维码已生成"}})
        );
    }

    #[tokio::test]
    async fn test_disabled_notifier_is_noop() {
        let notifier = Notifier::new(None);
        assert!(!notifier.is_enabled());
        notifier.send("anything").await;
    }
}
