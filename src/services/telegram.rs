//! Telegram `sendMessage` delivery channel.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::error::{RemembotError, Result};
use crate::interfaces::services::DeliveryChannel;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

pub struct TelegramChannel {
    client: Client,
    base_url: String,
    token: String,
}

impl TelegramChannel {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, TELEGRAM_API_BASE)
    }

    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.base_url, self.token)
    }
}

#[async_trait]
impl DeliveryChannel for TelegramChannel {
    async fn send(&self, owner: &str, text: &str) -> Result<()> {
        let payload = json!({
            "chat_id": owner,
            "text": text,
        });

        let response = self
            .client
            .post(self.send_message_url())
            .json(&payload)
            .send()
            .await
            .map_err(|e| RemembotError::Http(format!("telegram send failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RemembotError::Http(format!(
                "telegram send returned {status}: {body}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn send_posts_chat_id_and_text() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/bottest-token/sendMessage")
                    .body_includes("\"chat_id\":\"12345\"");
                then.status(200).json_body(serde_json::json!({"ok": true}));
            })
            .await;

        let channel = TelegramChannel::with_base_url("test-token", server.base_url());
        channel
            .send("12345", "🔔 REMINDER 🔔")
            .await
            .expect("send ok");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_surfaces_as_http_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/botbad/sendMessage");
                then.status(403)
                    .json_body(serde_json::json!({"ok": false, "description": "bot was blocked"}));
            })
            .await;

        let channel = TelegramChannel::with_base_url("bad", server.base_url());
        let err = channel.send("12345", "hi").await.expect_err("must fail");
        assert!(matches!(err, RemembotError::Http(_)));
        assert!(format!("{err}").contains("403"));
    }
}
