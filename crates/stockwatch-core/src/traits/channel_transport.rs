// # Channel Transport Trait
//
// Defines the "send a structured message to channel C" capability the
// notification dispatcher and the reporters build on.
//
// ## Implementations
//
// - Discord REST: `stockwatch-notify-discord` crate
// - Recording transports in the contract tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Rich message body (rendered as an embed by chat transports)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEmbed {
    /// Title line
    pub title: String,
    /// Multi-line body
    pub description: String,
    /// Accent color (0xRRGGBB)
    pub color: u32,
    /// Event time
    pub timestamp: DateTime<Utc>,
}

/// One outbound message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutboundMessage {
    /// Plain text content (mentions go here)
    pub content: Option<String>,
    /// Optional rich body
    pub embed: Option<MessageEmbed>,
}

impl OutboundMessage {
    /// Plain text message
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            embed: None,
        }
    }

    /// Rich message with a content line
    pub fn embed(content: impl Into<String>, embed: MessageEmbed) -> Self {
        Self {
            content: Some(content.into()),
            embed: Some(embed),
        }
    }
}

/// Trait for notification channel transports
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform API calls to the chat service
/// - ✅ Report readiness
///
/// ## Forbidden Capabilities
/// - ❌ Retry deliveries (the dispatcher reports, never retries)
/// - ❌ Access the known-state store
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Deliver a message to a channel
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Delivered
    /// - `Err(Error::Delivery)`: Delivery failed for this destination
    async fn send(&self, channel_id: u64, message: &OutboundMessage) -> Result<(), crate::Error>;

    /// Check whether destinations are resolvable
    ///
    /// Startup waits until this succeeds before any loop is scheduled.
    async fn ready(&self) -> Result<(), crate::Error>;

    /// Get the transport name (for logging/debugging)
    fn transport_name(&self) -> &'static str;
}
