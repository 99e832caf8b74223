//! Telegram Bot API sender

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::Notifier;
use crate::error::{Error, Result};

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<serde_json::Value>,
}

pub struct TelegramNotifier {
    client: Client,
    bot_token: String,
    api_base: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, api_base: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            bot_token,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    /// Bot username, used as a health check
    pub async fn get_me(&self) -> Result<String> {
        let response: TelegramResponse = self
            .client
            .get(self.method_url("getMe"))
            .send()
            .await
            .map_err(|e| Error::Notify(redact(&e.to_string(), &self.bot_token)))?
            .json()
            .await
            .map_err(|e| Error::Notify(redact(&e.to_string(), &self.bot_token)))?;

        if !response.ok {
            return Err(Error::Notify(
                response.description.unwrap_or_else(|| "getMe failed".into()),
            ));
        }

        Ok(response
            .result
            .as_ref()
            .and_then(|r| r.get("username"))
            .and_then(|u| u.as_str())
            .unwrap_or("unknown")
            .to_string())
    }
}

/// reqwest errors carry the URL, which carries the token
fn redact(text: &str, token: &str) -> String {
    if token.is_empty() {
        text.to_string()
    } else {
        text.replace(token, "***")
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, destination: &str, message: &str) -> Result<()> {
        let request = SendMessageRequest {
            chat_id: destination,
            text: message,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Notify(redact(&e.to_string(), &self.bot_token)))?;

        let status = response.status();
        let body: TelegramResponse = response
            .json()
            .await
            .map_err(|e| Error::Notify(format!("unreadable Telegram response ({}): {}", status, e)))?;

        if !body.ok {
            return Err(Error::Notify(format!(
                "Telegram rejected message ({}): {}",
                status,
                body.description.unwrap_or_default()
            )));
        }

        debug!(chat = %destination, "Telegram message delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_url() {
        let notifier =
            TelegramNotifier::new("123:abc".into(), "https://api.telegram.org/".into()).unwrap();
        assert_eq!(
            notifier.method_url("sendMessage"),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn test_redact_hides_token() {
        let msg = "error sending request for url (https://api.telegram.org/bot123:abc/sendMessage)";
        assert!(!redact(msg, "123:abc").contains("123:abc"));
    }

    #[test]
    fn test_request_body_shape() {
        let request = SendMessageRequest {
            chat_id: "-100123",
            text: "<b>hi</b>",
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["chat_id"], "-100123");
        assert_eq!(json["parse_mode"], "HTML");
    }

    #[test]
    fn test_error_response_parse() {
        let body = r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#;
        let parsed: TelegramResponse = serde_json::from_str(body).unwrap();
        assert!(!parsed.ok);
        assert_eq!(parsed.description.as_deref(), Some("Bad Request: chat not found"));
    }
}
