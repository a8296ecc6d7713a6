// # Command Transport Trait
//
// Defines the inbound side of the chat interface: polling for new command
// messages after a cursor.

use async_trait::async_trait;

use super::notifier::Audience;

/// A message received from the chat transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Monotonically increasing position of this message in the feed
    pub cursor: i64,
    /// Which audience sent it; `None` for chats that are neither
    pub audience: Option<Audience>,
    /// Message text (empty for non-text messages)
    pub text: String,
}

impl InboundMessage {
    /// Create a new inbound message
    pub fn new(cursor: i64, audience: Option<Audience>, text: impl Into<String>) -> Self {
        Self {
            cursor,
            audience,
            text: text.into(),
        }
    }
}

/// Trait for command transport implementations
///
/// Delivery is at-least-once: a poll may return messages that were already
/// returned before. The scheduler deduplicates by cursor, so implementations
/// need not.
#[async_trait]
pub trait CommandTransport: Send + Sync {
    /// Fetch messages newer than `since`
    ///
    /// `since == None` means no message has been seen yet. Messages come
    /// back in cursor order. Implementations may long-poll, but must return
    /// within a bounded time.
    async fn poll(&self, since: Option<i64>) -> Result<Vec<InboundMessage>, crate::Error>;
}
