// # Discord Channel Transport
//
// This crate provides the Discord REST implementation of `ChannelTransport`.
//
// ## Implementation Status
//
// - ✅ One HTTP request per message
// - ✅ Full error propagation to the caller (the dispatcher logs and moves on)
// - ✅ HTTP timeout configured (30 seconds)
// - ✅ Specific error handling for HTTP status codes (401, 403, 404, 429, 5xx)
// - ✅ Readiness probe before any loop is scheduled
// - ❌ NO retry logic (a failed delivery is reported, never retried)
// - ❌ NO gateway connection or background tasks
//
// ## Architectural Constraints
//
// ### Trust Level: Untrusted (Channel Transport)
//
// **Allowed Capabilities**:
// - ✅ Perform HTTPS API calls to the Discord API only
// - ✅ Render messages into Discord's JSON shape
//
// **Forbidden Capabilities**:
// - ❌ Retry deliveries
// - ❌ Access the known-state store
// - ❌ Make scheduling decisions
//
// ## Security Requirements
//
// - Bot token NEVER appears in logs
// - Transport MUST fail fast if the token is empty
//
// ## API Reference
//
// - Create Message: POST `/channels/:channel_id/messages`
// - Get Current User: GET `/users/@me`

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use stockwatch_core::config::DiscordConfig;
use stockwatch_core::traits::{ChannelTransport, OutboundMessage};
use stockwatch_core::{Error, Result};

/// Discord API base URL
pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Discord rejects message content longer than this
const CONTENT_LIMIT: usize = 2000;

/// Discord REST channel transport
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose the bot token.
pub struct DiscordTransport {
    /// Bot token
    /// ⚠️ NEVER log this value
    token: String,

    /// REST API base
    api_base: String,

    /// HTTP client for API requests
    client: reqwest::Client,
}

// Custom Debug implementation that hides the bot token
impl std::fmt::Debug for DiscordTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordTransport")
            .field("token", &"<REDACTED>")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl DiscordTransport {
    /// Create a transport
    ///
    /// # Parameters
    ///
    /// - `token`: Bot token
    /// - `api_base`: REST API base, normally [`DISCORD_API_BASE`]
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the token is empty or the HTTP
    /// client cannot be built.
    pub fn new(token: impl Into<String>, api_base: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(Error::config("Discord token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            token,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Create a transport from the `discord` configuration section
    pub fn from_config(config: &DiscordConfig) -> Result<Self> {
        Self::new(config.token.clone(), config.api_base.clone())
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.token)
    }

    /// Map a non-success response to a delivery error
    async fn status_error(channel_id: u64, response: reqwest::Response) -> Error {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());

        let message = match status.as_u16() {
            401 => format!("Authentication failed: invalid bot token. Status: {}", status),
            403 => format!("Missing access to channel. Status: {}", status),
            404 => format!("Unknown channel. Status: {}", status),
            429 => format!("Rate limit exceeded. Status: {} - {}", status, error_text),
            500..=599 => format!("Discord server error (transient): {} - {}", status, error_text),
            _ => format!("Message rejected: {} - {}", status, error_text),
        };
        Error::delivery(channel_id, message)
    }
}

/// Create Message request body
#[derive(Debug, Serialize, PartialEq)]
struct CreateMessage<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    embeds: Vec<Embed<'a>>,
    allowed_mentions: AllowedMentions,
}

#[derive(Debug, Serialize, PartialEq)]
struct Embed<'a> {
    title: &'a str,
    description: &'a str,
    color: u32,
    timestamp: String,
}

#[derive(Debug, Serialize, PartialEq)]
struct AllowedMentions {
    parse: Vec<&'static str>,
}

impl<'a> CreateMessage<'a> {
    fn from_message(message: &'a OutboundMessage) -> Self {
        Self {
            content: message.content.as_deref().map(truncate_content),
            embeds: message
                .embed
                .iter()
                .map(|e| Embed {
                    title: &e.title,
                    description: &e.description,
                    color: e.color,
                    timestamp: e.timestamp.to_rfc3339(),
                })
                .collect(),
            allowed_mentions: AllowedMentions {
                parse: vec!["everyone"],
            },
        }
    }
}

fn truncate_content(content: &str) -> String {
    if content.chars().count() <= CONTENT_LIMIT {
        content.to_string()
    } else {
        content.chars().take(CONTENT_LIMIT).collect()
    }
}

#[async_trait]
impl ChannelTransport for DiscordTransport {
    async fn send(&self, channel_id: u64, message: &OutboundMessage) -> Result<()> {
        let url = format!("{}/channels/{}/messages", self.api_base, channel_id);
        let body = CreateMessage::from_message(message);

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::delivery(channel_id, format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::status_error(channel_id, response).await);
        }

        tracing::debug!("Message delivered to channel {}", channel_id);
        Ok(())
    }

    async fn ready(&self) -> Result<()> {
        let url = format!("{}/users/@me", self.api_base);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await
            .map_err(|e| Error::not_ready(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status.as_u16() {
                401 => Error::config("Discord rejected the bot token"),
                _ => Error::not_ready(format!("Discord API returned {}", status)),
            });
        }

        let user: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::not_ready(format!("Failed to parse response: {}", e)))?;
        tracing::info!(
            "Discord transport ready as {}",
            user["username"].as_str().unwrap_or("<unknown>")
        );
        Ok(())
    }

    fn transport_name(&self) -> &'static str {
        "discord"
    }
}
