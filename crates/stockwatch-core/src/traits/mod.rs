//! Core traits for the inventory watcher
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`ExhibitionSource`]: Fetch one exhibition's inventory
//! - [`TokenProvider`]: Acquire anti-bot evasion tokens
//! - [`ChannelTransport`]: Deliver messages to notification channels
//! - [`KnownStateStore`]: Persist the known-vehicle baseline

pub mod channel_transport;
pub mod exhibition_source;
pub mod state_store;

pub use channel_transport::{ChannelTransport, MessageEmbed, OutboundMessage};
pub use exhibition_source::{ExhibitionPage, ExhibitionSource, FetchOutcome, TokenProvider, Transcript};
pub use state_store::KnownStateStore;
