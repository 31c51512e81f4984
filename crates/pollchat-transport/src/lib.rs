//! Transport bindings for the remote chat service.
//!
//! Provides:
//! - Wire protocol (JSON request/response bodies)
//! - HTTP client binding (feature: http)
//! - In-process service for development and tests (feature: memory)

pub mod protocol;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "http")]
pub use http::{HttpConnector, HttpService};
#[cfg(feature = "memory")]
pub use memory::{MemoryConnector, MemoryService, SentMessage};
