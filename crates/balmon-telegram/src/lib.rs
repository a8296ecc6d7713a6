// # Telegram Bot
//
// This crate provides the Telegram Bot API notifier and command transport
// for the balance monitor.
//
// ## Behavior
//
// - `send`: one `sendMessage` call per message, HTML parse mode
// - `poll`: one long-poll `getUpdates` call per tick
// - ❌ NO retries (a failed send is logged by the caller and dropped)
// - ❌ NO background tasks (the scheduler drives every request)
// - ❌ NO webhook server (polling only; the webhook is deleted at startup)
//
// ## Security Requirements
//
// - The bot token is part of every request URL, so it NEVER appears in logs
//   or error messages: URLs are stripped from reqwest errors and `Debug` is
//   redacted
//
// ## API Reference
//
// - Bot API: https://core.telegram.org/bots/api
// - Send: POST `/bot<token>/sendMessage`
// - Poll: GET `/bot<token>/getUpdates?offset=<n>&timeout=<secs>`
// - Webhook: GET `/bot<token>/deleteWebhook`

use async_trait::async_trait;
use balmon_core::traits::{Audience, CommandTransport, InboundMessage, Notifier};
use balmon_core::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

/// Telegram Bot API base URL
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Default long-poll timeout for getUpdates (30 seconds)
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

/// Default HTTP timeout for sendMessage and deleteWebhook
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Extra time granted to a long poll on top of its server-side timeout
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Envelope of every Bot API response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

/// Telegram bot acting as both notifier and command transport
///
/// # Chats
///
/// The primary chat is the operator's personal chat; the secondary chat is
/// the group that receives balance announcements. Without a group, the
/// secondary audience is delivered to the primary chat.
#[derive(Clone)]
pub struct TelegramBot {
    /// Bot token
    /// ⚠️ NEVER log this value
    token: String,

    primary_chat: i64,
    secondary_chat: i64,

    api_base: String,
    poll_timeout_secs: u64,

    client: reqwest::Client,
}

// Custom Debug implementation that hides the bot token
impl std::fmt::Debug for TelegramBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramBot")
            .field("token", &"<REDACTED>")
            .field("primary_chat", &self.primary_chat)
            .field("secondary_chat", &self.secondary_chat)
            .field("api_base", &self.api_base)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish()
    }
}

impl TelegramBot {
    /// Create a new bot
    ///
    /// # Parameters
    ///
    /// - `token`: Bot token as issued by @BotFather (`<id>:<secret>`)
    /// - `primary_chat`: Personal chat ID
    /// - `secondary_chat`: Group chat ID; `None` reuses the personal chat
    pub fn new(token: impl Into<String>, primary_chat: i64, secondary_chat: Option<i64>) -> Result<Self> {
        let token = token.into();

        if token.trim().is_empty() {
            return Err(Error::config("Telegram bot token cannot be empty"));
        }
        if !token.contains(':') {
            return Err(Error::config(
                "Telegram bot token looks malformed (expected <id>:<secret>)",
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            token,
            primary_chat,
            secondary_chat: secondary_chat.unwrap_or(primary_chat),
            api_base: TELEGRAM_API_BASE.to_string(),
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
            client,
        })
    }

    /// Point the bot at a different API server (local Bot API server, tests)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the server-side long-poll timeout; 0 makes `poll` return at once
    pub fn with_poll_timeout(mut self, secs: u64) -> Self {
        self.poll_timeout_secs = secs;
        self
    }

    /// Chat ID a message for `audience` is delivered to
    pub fn chat_for(&self, audience: Audience) -> i64 {
        match audience {
            Audience::Primary => self.primary_chat,
            Audience::Secondary => self.secondary_chat,
        }
    }

    /// Audience a message from `chat_id` came from
    ///
    /// The personal chat wins when both audiences share a chat.
    pub fn audience_of(&self, chat_id: i64) -> Option<Audience> {
        if chat_id == self.primary_chat {
            Some(Audience::Primary)
        } else if chat_id == self.secondary_chat {
            Some(Audience::Secondary)
        } else {
            None
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// Remove any webhook so that getUpdates works
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: A webhook was removed (or none was set)
    /// - `Ok(false)`: The API declined
    /// - `Err(Error)`: The API could not be reached
    pub async fn delete_webhook(&self) -> Result<bool> {
        let response = self
            .client
            .get(self.method_url("deleteWebhook"))
            .send()
            .await
            .map_err(|e| request_error("deleteWebhook", e))?;

        let body: ApiResponse<bool> = response
            .json()
            .await
            .map_err(|e| request_error("deleteWebhook", e))?;

        if !body.ok {
            tracing::warn!(
                "deleteWebhook declined: {}",
                body.description.as_deref().unwrap_or("no description")
            );
        }
        Ok(body.ok)
    }

    /// Turn a getUpdates response body into inbound messages
    ///
    /// Updates without a text message (joins, stickers, edits) are kept
    /// with empty text so the cursor still moves past them.
    pub fn parse_updates(&self, body: &str) -> Result<Vec<InboundMessage>> {
        let response: ApiResponse<Vec<Update>> = serde_json::from_str(body)
            .map_err(|e| Error::transport(format!("getUpdates: malformed response: {}", e)))?;

        if !response.ok {
            return Err(Error::transport(format!(
                "getUpdates failed: {}",
                response.description.as_deref().unwrap_or("no description")
            )));
        }

        let mut updates = response.result.unwrap_or_default();
        updates.sort_by_key(|u| u.update_id);

        Ok(updates
            .into_iter()
            .map(|update| match update.message {
                Some(message) => InboundMessage::new(
                    update.update_id,
                    self.audience_of(message.chat.id),
                    message.text.unwrap_or_default(),
                ),
                None => InboundMessage::new(update.update_id, None, ""),
            })
            .collect())
    }
}

/// Map a reqwest error without leaking the request URL (and with it the token)
fn request_error(method: &str, err: reqwest::Error) -> Error {
    Error::transport(format!("{}: {}", method, err.without_url()))
}

#[async_trait]
impl Notifier for TelegramBot {
    async fn send(&self, audience: Audience, text: &str) -> Result<()> {
        let chat_id = self.chat_for(audience);
        tracing::debug!("Sending {} chars to {} chat", text.len(), audience);

        let payload = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": false,
        });

        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&payload)
            .send()
            .await
            .map_err(|e| request_error("sendMessage", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response".to_string());

        if !status.is_success() {
            return Err(Error::transport(format!(
                "sendMessage failed: {} - {}",
                status, body
            )));
        }

        let parsed: ApiResponse<serde_json::Value> = serde_json::from_str(&body)
            .map_err(|e| Error::transport(format!("sendMessage: malformed response: {}", e)))?;
        if !parsed.ok {
            return Err(Error::transport(format!(
                "sendMessage rejected: {}",
                parsed.description.as_deref().unwrap_or("no description")
            )));
        }

        Ok(())
    }

    fn channel_name(&self) -> &'static str {
        "telegram"
    }
}

#[async_trait]
impl CommandTransport for TelegramBot {
    async fn poll(&self, since: Option<i64>) -> Result<Vec<InboundMessage>> {
        let offset = since.map_or(0, |cursor| cursor + 1);

        let response = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", self.poll_timeout_secs.to_string()),
            ])
            .timeout(Duration::from_secs(self.poll_timeout_secs) + POLL_GRACE)
            .send()
            .await
            .map_err(|e| request_error("getUpdates", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| request_error("getUpdates", e))?;

        // 409 = another instance is polling, or a webhook is still set
        if !status.is_success() && status != reqwest::StatusCode::CONFLICT {
            return Err(Error::transport(format!("getUpdates failed: {}", status)));
        }

        let messages = self.parse_updates(&body)?;
        if !messages.is_empty() {
            tracing::debug!("Received {} update(s)", messages.len());
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "123456:ABC-DEF1234ghIkl-zyx57W2v1u123ew11";

    fn bot() -> TelegramBot {
        TelegramBot::new(TOKEN, 1001, Some(-2002)).unwrap()
    }

    #[test]
    fn test_rejects_bad_tokens() {
        assert!(TelegramBot::new("", 1, None).is_err());
        assert!(TelegramBot::new("not-a-token", 1, None).is_err());
    }

    #[test]
    fn test_token_not_exposed_in_debug() {
        let debug_output = format!("{:?}", bot());
        assert!(!debug_output.contains(TOKEN));
        assert!(!debug_output.contains("ABC-DEF"));
        assert!(debug_output.contains("<REDACTED>"));
    }

    #[test]
    fn test_group_defaults_to_personal_chat() {
        let bot = TelegramBot::new(TOKEN, 1001, None).unwrap();
        assert_eq!(bot.chat_for(Audience::Secondary), 1001);
        assert_eq!(bot.audience_of(1001), Some(Audience::Primary));
    }

    #[test]
    fn test_audience_mapping() {
        let bot = bot();
        assert_eq!(bot.chat_for(Audience::Primary), 1001);
        assert_eq!(bot.chat_for(Audience::Secondary), -2002);
        assert_eq!(bot.audience_of(1001), Some(Audience::Primary));
        assert_eq!(bot.audience_of(-2002), Some(Audience::Secondary));
        assert_eq!(bot.audience_of(42), None);
    }

    #[test]
    fn test_method_url() {
        let bot = bot().with_api_base("http://localhost:8081/");
        assert_eq!(
            bot.method_url("getUpdates"),
            format!("http://localhost:8081/bot{}/getUpdates", TOKEN)
        );
    }

    #[test]
    fn test_parse_updates() {
        let body = serde_json::json!({
            "ok": true,
            "result": [
                {
                    "update_id": 501,
                    "message": {
                        "message_id": 7,
                        "chat": { "id": -2002, "type": "group" },
                        "text": "/set_balance 150"
                    }
                },
                {
                    "update_id": 500,
                    "message": {
                        "message_id": 6,
                        "chat": { "id": 1001, "type": "private" },
                        "text": "/status"
                    }
                },
                {
                    "update_id": 502,
                    "message": {
                        "message_id": 8,
                        "chat": { "id": 1001, "type": "private" },
                        "sticker": { "file_id": "x" }
                    }
                },
                { "update_id": 503, "my_chat_member": {} },
                {
                    "update_id": 504,
                    "message": { "chat": { "id": 77 }, "text": "/check" }
                }
            ]
        })
        .to_string();

        let messages = bot().parse_updates(&body).unwrap();
        assert_eq!(
            messages,
            vec![
                InboundMessage::new(500, Some(Audience::Primary), "/status"),
                InboundMessage::new(501, Some(Audience::Secondary), "/set_balance 150"),
                InboundMessage::new(502, Some(Audience::Primary), ""),
                InboundMessage::new(503, None, ""),
                InboundMessage::new(504, None, "/check"),
            ]
        );
    }

    #[test]
    fn test_parse_updates_empty() {
        let messages = bot().parse_updates(r#"{"ok":true,"result":[]}"#).unwrap();
        assert!(messages.is_empty());
    }

    #[test]
    fn test_parse_updates_api_error() {
        let body = r#"{"ok":false,"error_code":409,"description":"Conflict: terminated by other getUpdates request"}"#;
        let err = bot().parse_updates(body).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(err.to_string().contains("Conflict"));
    }

    #[test]
    fn test_parse_updates_garbage() {
        let err = bot().parse_updates("<html>Bad Gateway</html>").unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_unreachable_api_does_not_leak_token() {
        // Port 9 (discard) on localhost refuses connections
        let bot = bot().with_api_base("http://127.0.0.1:9").with_poll_timeout(0);

        let err = bot.poll(None).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(!err.to_string().contains(TOKEN));

        let err = bot.send(Audience::Primary, "hello").await.unwrap_err();
        assert!(!err.to_string().contains(TOKEN));
    }
}
