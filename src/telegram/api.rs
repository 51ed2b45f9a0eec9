use crate::error::ArchivistError;
use crate::telegram::types::{ApiResponse, Update, User};
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;

/// Slack on top of the long-poll timeout before the HTTP client gives up.
const HTTP_GRACE_SECS: u64 = 15;

/// Blocking Bot API client over plain HTTPS.
pub struct BotApi {
    client: Client,
    base: String,
}

impl BotApi {
    pub fn new(api_base: &str, token: &str, poll_timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(poll_timeout_secs + HTTP_GRACE_SECS))
            .build()
            .context("failed to build telegram http client")?;
        Ok(Self {
            client,
            base: format!("{}/bot{token}", api_base.trim_end_matches('/')),
        })
    }

    fn call<T: DeserializeOwned>(&self, method: &str, payload: &Value) -> Result<T> {
        let url = format!("{}/{method}", self.base);
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .with_context(|| format!("telegram {method} request failed"))?;
        let envelope: ApiResponse<T> = response
            .json()
            .with_context(|| format!("telegram {method} returned an unreadable body"))?;
        unwrap_envelope(method, envelope)
    }

    pub fn get_me(&self) -> Result<User> {
        self.call("getMe", &json!({}))
    }

    /// Long-poll for updates. Passing `offset` confirms everything before it.
    pub fn get_updates(
        &self,
        offset: Option<i64>,
        limit: usize,
        timeout_secs: u64,
    ) -> Result<Vec<Update>> {
        let mut payload = json!({
            "limit": limit,
            "timeout": timeout_secs,
            "allowed_updates": ["message", "my_chat_member"],
        });
        if let Some(offset) = offset {
            payload["offset"] = json!(offset);
        }
        self.call("getUpdates", &payload)
    }

    pub fn send_message(&self, chat_id: i64, text: &str, reply_to: Option<i64>) -> Result<()> {
        let mut payload = json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(message_id) = reply_to {
            payload["reply_parameters"] = json!({
                "message_id": message_id,
                "allow_sending_without_reply": true,
            });
        }
        let _: Value = self.call("sendMessage", &payload)?;
        Ok(())
    }
}

fn unwrap_envelope<T>(method: &str, envelope: ApiResponse<T>) -> Result<T> {
    if !envelope.ok {
        return Err(ArchivistError::TelegramApi {
            method: method.to_string(),
            description: envelope
                .description
                .unwrap_or_else(|| "no description".to_string()),
        }
        .into());
    }
    envelope
        .result
        .with_context(|| format!("telegram {method} returned ok without a result"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_envelope_maps_to_api_error() {
        let envelope: ApiResponse<Vec<Update>> =
            serde_json::from_str(r#"{"ok": false, "error_code": 401, "description": "Unauthorized"}"#)
                .expect("json");
        let err = unwrap_envelope("getUpdates", envelope).expect_err("api error");
        assert_eq!(err.to_string(), "telegram getUpdates failed: Unauthorized");
        assert!(matches!(
            err.downcast_ref::<ArchivistError>(),
            Some(ArchivistError::TelegramApi { .. })
        ));
    }

    #[test]
    fn ok_envelope_yields_result() {
        let envelope: ApiResponse<Vec<Update>> =
            serde_json::from_str(r#"{"ok": true, "result": [{"update_id": 3}]}"#).expect("json");
        let updates = unwrap_envelope("getUpdates", envelope).expect("updates");
        assert_eq!(updates.len(), 1);
        assert!(updates[0].message.is_none());
    }

    #[test]
    fn base_url_embeds_token_once() {
        let api = BotApi::new("https://api.telegram.org/", "123:abc", 30).expect("api");
        assert_eq!(api.base, "https://api.telegram.org/bot123:abc");
    }
}
