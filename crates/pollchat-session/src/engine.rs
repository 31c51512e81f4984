//! Session engine: the caller-facing entry point.

use std::{
    collections::BTreeSet,
    sync::{Arc, PoisonError, RwLock},
};

use pollchat_core::{
    ChatError, ChatMessage, Connector, ConversationKey, EngineConfig, Endpoint, Identity,
    Recipient, RemoteService, User,
};
use tokio::sync::{Mutex, broadcast};

use crate::{
    broadcast::{BroadcastDispatcher, BroadcastHandle},
    polling::{PollTarget, PollingLoop, PollingStats},
    state::{EngineEvent, SharedState},
};

/// Why a send did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Body was empty or whitespace.
    EmptyBody,
    /// No session is active.
    NotAuthenticated,
}

/// What happened to a `send` call.
#[derive(Debug)]
pub enum SendOutcome {
    /// Nothing was sent or logged.
    Skipped(SkipReason),
    /// Direct message accepted and appended to the log.
    Delivered,
    /// Direct message refused or failed; not added to the log.
    Dropped { reason: String },
    /// Broadcast logged and dispatched; per-target sends are still running.
    Broadcast(BroadcastHandle),
}

/// Remote binding; `Disconnected` until the first ping/register/login.
enum Binding {
    Disconnected,
    Bound {
        endpoint: Endpoint,
        service: Arc<dyn RemoteService>,
    },
}

/// Credentials of the logged-in user.
#[derive(Clone)]
struct ActiveSession {
    token: String,
    username: String,
    service: Arc<dyn RemoteService>,
    epoch: u64,
}

/// Owns the session, the polling loop and all observable chat state.
///
/// Callers only ever receive snapshots.
pub struct SessionEngine<C: Connector> {
    connector: C,
    config: EngineConfig,
    state: Arc<SharedState>,
    binding: RwLock<Binding>,
    session: RwLock<Option<ActiveSession>>,
    polling: Mutex<Option<PollingLoop>>,
    dispatcher: BroadcastDispatcher,
}

impl<C: Connector> SessionEngine<C> {
    /// Create an engine that reaches the service through `connector`.
    #[must_use]
    pub fn new(connector: C, config: EngineConfig) -> Self {
        Self {
            state: SharedState::new(config.event_buffer),
            dispatcher: BroadcastDispatcher::new(config.broadcast_concurrency),
            connector,
            config,
            binding: RwLock::new(Binding::Disconnected),
            session: RwLock::new(None),
            polling: Mutex::new(None),
        }
    }

    fn bind(&self, host: &str, port: &str) -> Result<Arc<dyn RemoteService>, ChatError> {
        let endpoint = Endpoint::parse(host, port, self.config.default_port);
        if let Binding::Bound {
            endpoint: current,
            service,
        } = &*self.binding.read().unwrap_or_else(PoisonError::into_inner)
        {
            if *current == endpoint {
                return Ok(Arc::clone(service));
            }
        }

        let service = self.connector.connect(&endpoint)?;
        tracing::debug!(%endpoint, "bound remote service");
        *self.binding.write().unwrap_or_else(PoisonError::into_inner) = Binding::Bound {
            endpoint,
            service: Arc::clone(&service),
        };
        Ok(service)
    }

    fn active(&self) -> Option<ActiveSession> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Check whether the service at `host:port` answers.
    ///
    /// Any failure is reported as `false`.
    pub async fn ping(&self, host: &str, port: &str) -> bool {
        let service = match self.bind(host, port) {
            Ok(service) => service,
            Err(e) => {
                tracing::warn!("ping: cannot bind: {e}");
                return false;
            }
        };
        match service.ping().await {
            Ok(alive) => alive,
            Err(e) => {
                tracing::warn!("ping failed: {e}");
                false
            }
        }
    }

    /// Create an account. Does not log in.
    ///
    /// # Errors
    /// Returns the service's reason if registration is refused or fails.
    pub async fn register(
        &self,
        host: &str,
        port: &str,
        username: &str,
        password: &str,
    ) -> Result<(), ChatError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(ChatError::Validation(
                "username and password are required".into(),
            ));
        }
        let service = self.bind(host, port)?;
        service.register(username, password).await.inspect_err(|e| {
            tracing::warn!(%username, "registration failed: {e}");
        })
    }

    /// Authenticate and start polling.
    ///
    /// Any previous session's loop is stopped and its state discarded.
    /// Callers must not run two logins concurrently.
    ///
    /// # Errors
    /// Returns the underlying cause; the engine stays unauthenticated.
    pub async fn login(
        &self,
        host: &str,
        port: &str,
        username: &str,
        password: &str,
    ) -> Result<(), ChatError> {
        let username = username.trim();
        let service = self.bind(host, port)?;
        let token = match service.login(username, password).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(%username, "login failed: {e}");
                return Err(e);
            }
        };

        let mut polling = self.polling.lock().await;
        if let Some(previous) = polling.take() {
            previous.stop().await;
        }
        let epoch = self.state.reset();

        let session = ActiveSession {
            token,
            username: username.to_owned(),
            service,
            epoch,
        };
        *polling = Some(PollingLoop::spawn(
            PollTarget {
                service: Arc::clone(&session.service),
                token: session.token.clone(),
                username: session.username.clone(),
                epoch,
            },
            Arc::clone(&self.state),
            self.config.poll_interval,
        ));
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
        drop(polling);

        tracing::info!(%username, "logged in");
        self.state.emit(EngineEvent::SessionChanged {
            authenticated: true,
        });
        Ok(())
    }

    /// End the session. Never fails.
    ///
    /// The polling loop has exited before any state is torn down; the remote
    /// logout is best-effort.
    pub async fn logout(&self) {
        let mut polling = self.polling.lock().await;
        if let Some(loop_handle) = polling.take() {
            loop_handle.stop().await;
        }

        let Some(session) = self.active() else {
            return;
        };
        if let Err(e) = session.service.logout(&session.token).await {
            tracing::warn!(user = %session.username, "remote logout failed: {e}");
        }

        self.session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.state.reset();
        drop(polling);

        tracing::info!(user = %session.username, "logged out");
        self.state.emit(EngineEvent::SessionChanged {
            authenticated: false,
        });
    }

    /// Log out before process exit.
    pub async fn shutdown(&self) {
        self.logout().await;
    }

    /// Send `body` to `recipient`, or to every online peer for the reserved
    /// "everyone" name.
    ///
    /// Broadcasts are logged immediately and return without waiting on any
    /// recipient. Direct messages are logged only once the service accepts
    /// them; a refused or failed direct send is dropped from the log.
    pub async fn send(&self, body: &str, recipient: &str) -> SendOutcome {
        if body.trim().is_empty() {
            return SendOutcome::Skipped(SkipReason::EmptyBody);
        }
        let Some(session) = self.active() else {
            return SendOutcome::Skipped(SkipReason::NotAuthenticated);
        };

        match Recipient::parse(recipient) {
            Recipient::User(to) => self.send_direct(&session, &to, body).await,
            Recipient::Everyone | Recipient::Me => self.send_broadcast(&session, body),
        }
    }

    async fn send_direct(&self, session: &ActiveSession, to: &str, body: &str) -> SendOutcome {
        match session.service.send(&session.token, to, body).await {
            Ok(true) => {
                let message =
                    ChatMessage::outgoing(&session.username, Recipient::User(to.to_owned()), body);
                if self.state.append(session.epoch, vec![message]) {
                    tracing::debug!(%to, "message sent");
                    SendOutcome::Delivered
                } else {
                    SendOutcome::Dropped {
                        reason: "session ended before the send completed".into(),
                    }
                }
            }
            Ok(false) => {
                tracing::warn!(%to, "message rejected by server");
                SendOutcome::Dropped {
                    reason: "rejected by server".into(),
                }
            }
            Err(e) => {
                tracing::warn!(%to, "send failed: {e}");
                SendOutcome::Dropped {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn send_broadcast(&self, session: &ActiveSession, body: &str) -> SendOutcome {
        let text = format!("{}{body}", self.config.broadcast_prefix);
        let logged = self.state.append(
            session.epoch,
            vec![ChatMessage::outgoing(
                &session.username,
                Recipient::Everyone,
                text.clone(),
            )],
        );
        if !logged {
            tracing::warn!(user = %session.username, "session ended before broadcast");
            return SendOutcome::Dropped {
                reason: "session ended before the broadcast was sent".into(),
            };
        }

        let targets = self.state.online_peers(&session.username);
        tracing::info!(targets = targets.len(), "broadcasting");
        SendOutcome::Broadcast(self.dispatcher.dispatch(
            Arc::clone(&session.service),
            &session.token,
            &text,
            targets,
        ))
    }

    /// Make `key` the active conversation and mark it read.
    pub fn select_conversation(&self, key: ConversationKey) {
        self.state.select(key);
    }

    #[must_use]
    pub fn roster(&self) -> Arc<Vec<User>> {
        self.state.roster()
    }

    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.state.log().snapshot()
    }

    /// Messages of one conversation, in log order.
    #[must_use]
    pub fn conversation(&self, key: &ConversationKey) -> Vec<ChatMessage> {
        self.state.log().filter(key)
    }

    /// Stream of the current log followed by live appends, until logout.
    #[must_use]
    pub fn message_stream(&self) -> futures::stream::BoxStream<'static, ChatMessage> {
        self.state.log().history_plus_stream()
    }

    #[must_use]
    pub fn unread(&self) -> BTreeSet<ConversationKey> {
        self.state.unread()
    }

    #[must_use]
    pub fn selected_conversation(&self) -> Option<ConversationKey> {
        self.state.selected()
    }

    #[must_use]
    pub fn identity(&self) -> Identity {
        let endpoint = match &*self.binding.read().unwrap_or_else(PoisonError::into_inner) {
            Binding::Disconnected => None,
            Binding::Bound { endpoint, .. } => Some(endpoint.clone()),
        };
        self.active().map_or_else(
            || Identity {
                endpoint: endpoint.clone(),
                ..Identity::default()
            },
            |session| Identity {
                username: session.username,
                endpoint: endpoint.clone(),
                authenticated: !session.token.is_empty(),
            },
        )
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.active().is_some_and(|s| !s.token.is_empty())
    }

    /// Whether the polling loop is currently running.
    pub async fn is_polling(&self) -> bool {
        self.polling
            .lock()
            .await
            .as_ref()
            .is_some_and(PollingLoop::is_running)
    }

    pub async fn polling_stats(&self) -> Option<PollingStats> {
        self.polling.lock().await.as_ref().map(PollingLoop::stats)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.state.subscribe()
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }
}
