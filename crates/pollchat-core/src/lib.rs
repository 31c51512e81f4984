//! Core abstractions for the polling chat client.
//!
//! This crate provides the fundamental building blocks:
//! - `MessageLog` - Append-only history with live growth notifications
//! - `PresenceRoster` - Published online/offline roster snapshots
//! - `UnreadTracker` - Conversations with unseen activity
//! - `RemoteService` and `Connector` traits
//! - `ChatError` taxonomy and `EngineConfig`

pub mod config;
pub mod error;
pub mod msg_log;
pub mod roster;
pub mod traits;
pub mod types;
pub mod unread;

pub use config::{ConfigError, DEFAULT_PORT, EngineConfig};
pub use error::{ChatError, ErrorCategory, classify_http_status};
pub use msg_log::{LogEvent, MessageLog};
pub use roster::{PresenceRoster, build_roster};
pub use traits::{Connector, RemoteService};
pub use types::{
    ChatMessage, ConversationKey, Direction, EVERYONE, Endpoint, Identity, IncomingMessage,
    Recipient, User,
};
pub use unread::UnreadTracker;
