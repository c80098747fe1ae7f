//! Telegram Bot API sink.

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::NotificationSink;
use crate::error::{RelayError, Result};

/// Longest text accepted by `sendMessage`, in characters.
pub const TEXT_LIMIT: usize = 4096;

/// Longest document caption accepted by `sendDocument`, in characters.
pub const CAPTION_LIMIT: usize = 1024;

/// Envelope of every Bot API reply.
#[derive(Debug, Deserialize)]
struct ApiReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Delivers to one Telegram chat through the Bot API.
pub struct TelegramSink {
    client: Client,
    api_url: String,
    token: String,
    chat_id: String,
}

impl TelegramSink {
    pub fn new(token: &str, chat_id: &str) -> Result<Self> {
        if token.is_empty() || chat_id.is_empty() {
            return Err(RelayError::Config(
                "delivery.token and delivery.chat_id are required for telegram".into(),
            ));
        }
        let client = Client::builder()
            .user_agent(concat!("mailrelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RelayError::Delivery(e.without_url().to_string()))?;
        Ok(Self {
            client,
            api_url: "https://api.telegram.org".to_string(),
            token: token.to_string(),
            chat_id: chat_id.to_string(),
        })
    }

    /// Point the sink at another Bot API server.
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    fn call(&self, method: &str, request: reqwest::blocking::RequestBuilder) -> Result<()> {
        // Errors carry the request URL, which contains the token
        let response = request
            .send()
            .map_err(|e| RelayError::Delivery(format!("{method}: {}", e.without_url())))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| RelayError::Delivery(format!("{method}: {}", e.without_url())))?;
        debug!(method, status = status.as_u16(), "Bot API replied");
        check_reply(method, &body)
    }
}

impl NotificationSink for TelegramSink {
    fn send_text(&mut self, text: &str) -> Result<()> {
        check_text(text)?;
        if text.trim().is_empty() {
            debug!("Skipping empty text message");
            return Ok(());
        }
        let request = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&serde_json::json!({ "chat_id": self.chat_id, "text": text }));
        self.call("sendMessage", request)?;
        info!(chat_id = %self.chat_id, chars = text.chars().count(), "Sent text");
        Ok(())
    }

    fn send_file(&mut self, file_name: &str, bytes: &[u8], caption: Option<&str>) -> Result<()> {
        let document = Part::bytes(bytes.to_vec()).file_name(file_name.to_string());
        let mut form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .part("document", document);
        if let Some(caption) = caption {
            form = form.text("caption", truncate_caption(caption));
        }

        let request = self
            .client
            .post(self.method_url("sendDocument"))
            .multipart(form);
        self.call("sendDocument", request)?;
        info!(chat_id = %self.chat_id, file = file_name, size = bytes.len(), "Sent file");
        Ok(())
    }
}

/// Reject texts the Bot API would refuse.
fn check_text(text: &str) -> Result<()> {
    let chars = text.chars().count();
    if chars > TEXT_LIMIT {
        return Err(RelayError::Delivery(format!(
            "text of {chars} characters exceeds the {TEXT_LIMIT} character limit"
        )));
    }
    Ok(())
}

fn truncate_caption(caption: &str) -> String {
    caption.chars().take(CAPTION_LIMIT).collect()
}

/// Turn a Bot API reply body into a result.
fn check_reply(method: &str, body: &str) -> Result<()> {
    let reply: ApiReply = serde_json::from_str(body)
        .map_err(|e| RelayError::Delivery(format!("{method}: malformed reply: {e}")))?;
    if reply.ok {
        Ok(())
    } else {
        Err(RelayError::Delivery(format!(
            "{method}: {}",
            reply.description.as_deref().unwrap_or("request rejected")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_limit() {
        assert!(check_text(&"a".repeat(TEXT_LIMIT)).is_ok());
        assert!(check_text(&"ж".repeat(TEXT_LIMIT)).is_ok());
        assert!(matches!(
            check_text(&"a".repeat(TEXT_LIMIT + 1)),
            Err(RelayError::Delivery(_))
        ));
    }

    #[test]
    fn test_long_text_rejected_before_any_request() {
        let mut sink = TelegramSink::new("123:abc", "42")
            .unwrap()
            .with_api_url("http://127.0.0.1:1");
        let err = sink.send_text(&"x".repeat(5000)).unwrap_err();
        assert!(err.to_string().contains("4096"));
    }

    #[test]
    fn test_method_url() {
        let sink = TelegramSink::new("123:abc", "42")
            .unwrap()
            .with_api_url("https://bots.example.com/");
        assert_eq!(
            sink.method_url("sendMessage"),
            "https://bots.example.com/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn test_requires_token_and_chat() {
        assert!(matches!(
            TelegramSink::new("", "42"),
            Err(RelayError::Config(_))
        ));
        assert!(matches!(
            TelegramSink::new("123:abc", ""),
            Err(RelayError::Config(_))
        ));
    }

    #[test]
    fn test_check_reply() {
        assert!(check_reply("sendMessage", r#"{"ok":true,"result":{}}"#).is_ok());
        let err = check_reply(
            "sendMessage",
            r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("chat not found"));
        assert!(check_reply("sendDocument", "<html>").is_err());
    }

    #[test]
    fn test_caption_truncated() {
        let caption = "ы".repeat(CAPTION_LIMIT + 10);
        assert_eq!(truncate_caption(&caption).chars().count(), CAPTION_LIMIT);
        assert_eq!(truncate_caption("short"), "short");
    }

    #[test]
    fn test_unreachable_api_is_delivery_error_without_token() {
        let mut sink = TelegramSink::new("123:secret", "42")
            .unwrap()
            .with_api_url("http://127.0.0.1:1");
        let err = sink.send_file("a.zip", b"PK", Some("a")).unwrap_err();
        assert!(matches!(err, RelayError::Delivery(_)));
        assert!(!err.to_string().contains("secret"));
    }
}
