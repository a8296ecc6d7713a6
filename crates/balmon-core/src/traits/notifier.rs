// # Notifier Trait
//
// Defines the outbound side of the chat interface: delivering formatted text
// to one of two audiences.
//
// ## Implementations
//
// - Telegram Bot API: `balmon-telegram` crate

use async_trait::async_trait;

/// Notification target class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    /// The individual operator chat
    Primary,
    /// The group/broadcast chat
    Secondary,
}

impl Audience {
    /// Parse an audience name as used in configuration
    ///
    /// Accepts `primary`/`personal` and `secondary`/`group`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "primary" | "personal" => Some(Audience::Primary),
            "secondary" | "group" => Some(Audience::Secondary),
            _ => None,
        }
    }
}

impl std::fmt::Display for Audience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Audience::Primary => write!(f, "primary"),
            Audience::Secondary => write!(f, "secondary"),
        }
    }
}

/// Trait for notification channel implementations
///
/// Delivery is best-effort. Implementations make one attempt and report the
/// result; the caller logs failures and never retries.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send `text` to `audience`
    async fn send(&self, audience: Audience, text: &str) -> Result<(), crate::Error>;

    /// Get the channel name (for logging)
    fn channel_name(&self) -> &'static str;
}
