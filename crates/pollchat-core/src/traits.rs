//! Traits the engine consumes: the remote chat service and how to reach it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{ChatError, Endpoint, IncomingMessage};

/// Operations offered by the remote chat service.
///
/// Implementations are stateless request/response bindings; the engine owns
/// all session state.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Liveness probe.
    async fn ping(&self) -> Result<bool, ChatError>;

    /// Create an account. Does not log in.
    async fn register(&self, username: &str, password: &str) -> Result<(), ChatError>;

    /// Authenticate and return an opaque session token.
    async fn login(&self, username: &str, password: &str) -> Result<String, ChatError>;

    /// End the session for `token`.
    async fn logout(&self, token: &str) -> Result<(), ChatError>;

    /// Every registered username.
    async fn list_all_users(&self) -> Result<Vec<String>, ChatError>;

    /// Usernames currently online.
    async fn list_online_users(&self) -> Result<Vec<String>, ChatError>;

    /// Send `body` to `to`. `Ok(false)` means the service refused it.
    async fn send(&self, token: &str, to: &str, body: &str) -> Result<bool, ChatError>;

    /// Messages addressed to `token`'s user since the last poll.
    async fn poll(&self, token: &str) -> Result<Vec<IncomingMessage>, ChatError>;
}

/// Produces a service binding for an endpoint.
pub trait Connector: Send + Sync {
    /// Bind to `endpoint`.
    ///
    /// # Errors
    /// Returns error if the underlying client cannot be constructed.
    fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn RemoteService>, ChatError>;
}

impl<F> Connector for F
where
    F: Fn(&Endpoint) -> Result<Arc<dyn RemoteService>, ChatError> + Send + Sync,
{
    fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn RemoteService>, ChatError> {
        self(endpoint)
    }
}
