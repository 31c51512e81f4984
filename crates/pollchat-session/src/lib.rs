//! Session orchestration for the polling chat client.
//!
//! Provides:
//! - `SessionEngine` - Login/logout, sending, observable chat state
//! - `PollingLoop` - Periodic roster and message refresh
//! - `BroadcastDispatcher` - Concurrent fan-out to online peers

pub mod broadcast;
pub mod engine;
pub mod polling;
pub mod state;

pub use broadcast::{BroadcastDispatcher, BroadcastHandle, BroadcastReport};
pub use engine::{SendOutcome, SessionEngine, SkipReason};
pub use polling::{PollingLoop, PollingStats};
pub use state::EngineEvent;
