//! In-process chat service.
//!
//! Useful for development and tests. Holds accounts, presence and mailboxes
//! in memory and supports injecting failures. Data is lost on drop.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use pollchat_core::{ChatError, Connector, Endpoint, IncomingMessage, RemoteService};

/// A send accepted (or attempted) by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub from: String,
    pub to: String,
    pub body: String,
    pub accepted: bool,
}

#[derive(Default)]
struct State {
    accounts: BTreeMap<String, String>,
    tokens: HashMap<String, String>,
    online: BTreeSet<String>,
    mailboxes: HashMap<String, Vec<IncomingMessage>>,
    sent: Vec<SentMessage>,
    failing_recipients: HashSet<String>,
    failing_polls: usize,
    next_token: u64,
}

impl State {
    fn user_for(&self, token: &str) -> Result<String, ChatError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| ChatError::Auth("unknown or expired token".into()))
    }
}

/// In-memory implementation of [`RemoteService`].
#[derive(Default)]
pub struct MemoryService {
    state: Mutex<State>,
}

impl MemoryService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account (builder style).
    #[must_use]
    pub fn with_user(self, username: &str, password: &str) -> Self {
        self.lock()
            .accounts
            .insert(username.to_owned(), password.to_owned());
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Mark a user as online or offline without a login (another client).
    pub fn set_online(&self, username: &str, online: bool) {
        let mut state = self.lock();
        state.accounts.entry(username.to_owned()).or_default();
        if online {
            state.online.insert(username.to_owned());
        } else {
            state.online.remove(username);
        }
    }

    /// Queue a message from `from` for `to`'s next poll.
    pub fn deliver(&self, from: &str, to: &str, body: &str) {
        self.lock()
            .mailboxes
            .entry(to.to_owned())
            .or_default()
            .push(IncomingMessage::new(from, body));
    }

    /// Make every send addressed to `username` fail with a transport error.
    pub fn fail_sends_to(&self, username: &str) {
        self.lock().failing_recipients.insert(username.to_owned());
    }

    /// Make the next `count` polls fail with a transport error.
    pub fn fail_next_polls(&self, count: usize) {
        self.lock().failing_polls = count;
    }

    /// Every send attempt seen so far, in arrival order.
    #[must_use]
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.lock().sent.clone()
    }

    /// Number of live tokens.
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.lock().tokens.len()
    }

    #[must_use]
    pub fn is_online(&self, username: &str) -> bool {
        self.lock().online.contains(username)
    }
}

#[async_trait]
impl RemoteService for MemoryService {
    async fn ping(&self) -> Result<bool, ChatError> {
        Ok(true)
    }

    async fn register(&self, username: &str, password: &str) -> Result<(), ChatError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(ChatError::Validation(
                "username and password are required".into(),
            ));
        }
        let mut state = self.lock();
        if state.accounts.contains_key(username) {
            return Err(ChatError::Validation(format!(
                "user {username} already exists"
            )));
        }
        state
            .accounts
            .insert(username.to_owned(), password.to_owned());
        Ok(())
    }

    async fn login(&self, username: &str, password: &str) -> Result<String, ChatError> {
        let mut state = self.lock();
        if state.accounts.get(username).map(String::as_str) != Some(password) {
            return Err(ChatError::Auth("invalid username or password".into()));
        }
        state.next_token += 1;
        let token = format!("tok-{}-{username}", state.next_token);
        state.tokens.insert(token.clone(), username.to_owned());
        state.online.insert(username.to_owned());
        Ok(token)
    }

    async fn logout(&self, token: &str) -> Result<(), ChatError> {
        let mut state = self.lock();
        let username = state
            .tokens
            .remove(token)
            .ok_or_else(|| ChatError::Auth("unknown or expired token".into()))?;
        if !state.tokens.values().any(|u| *u == username) {
            state.online.remove(&username);
        }
        Ok(())
    }

    async fn list_all_users(&self) -> Result<Vec<String>, ChatError> {
        Ok(self.lock().accounts.keys().cloned().collect())
    }

    async fn list_online_users(&self) -> Result<Vec<String>, ChatError> {
        Ok(self.lock().online.iter().cloned().collect())
    }

    async fn send(&self, token: &str, to: &str, body: &str) -> Result<bool, ChatError> {
        let mut state = self.lock();
        let from = state.user_for(token)?;
        if state.failing_recipients.contains(to) {
            return Err(ChatError::Transport(format!("connection reset sending to {to}")));
        }
        let accepted = state.accounts.contains_key(to);
        state.sent.push(SentMessage {
            from: from.clone(),
            to: to.to_owned(),
            body: body.to_owned(),
            accepted,
        });
        if accepted {
            state
                .mailboxes
                .entry(to.to_owned())
                .or_default()
                .push(IncomingMessage::new(from, body));
        }
        Ok(accepted)
    }

    async fn poll(&self, token: &str) -> Result<Vec<IncomingMessage>, ChatError> {
        let mut state = self.lock();
        if state.failing_polls > 0 {
            state.failing_polls -= 1;
            return Err(ChatError::Transport("poll timed out".into()));
        }
        let user = state.user_for(token)?;
        Ok(state.mailboxes.remove(&user).unwrap_or_default())
    }
}

/// Hands out one shared [`MemoryService`] regardless of endpoint.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    service: Arc<MemoryService>,
}

impl MemoryConnector {
    #[must_use]
    pub const fn new(service: Arc<MemoryService>) -> Self {
        Self { service }
    }

    #[must_use]
    pub fn service(&self) -> &Arc<MemoryService> {
        &self.service
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, _endpoint: &Endpoint) -> Result<Arc<dyn RemoteService>, ChatError> {
        Ok(Arc::clone(&self.service) as Arc<dyn RemoteService>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn login_marks_user_online() {
        let service = MemoryService::new().with_user("Ada", "pw");
        assert!(
            service.login("Ada", "wrong").await.is_err(),
            "bad password must be rejected"
        );
        let token = service.login("Ada", "pw").await.unwrap();
        assert_eq!(service.list_online_users().await.unwrap(), ["Ada"]);

        service.logout(&token).await.unwrap();
        assert!(service.list_online_users().await.unwrap().is_empty());
        assert_eq!(service.active_sessions(), 0);
    }

    #[tokio::test]
    async fn register_rejects_duplicates() {
        let service = MemoryService::new();
        service.register("Ada", "pw").await.unwrap();
        let err = service.register("Ada", "pw").await.unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
        assert!(matches!(
            service.register("  ", "pw").await,
            Err(ChatError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn messages_reach_recipient_mailbox_once() {
        let service = MemoryService::new()
            .with_user("Ada", "a")
            .with_user("Bern", "b");
        let ada = service.login("Ada", "a").await.unwrap();
        let bern = service.login("Bern", "b").await.unwrap();

        assert!(service.send(&bern, "Ada", "hi").await.unwrap());
        assert!(!service.send(&bern, "Nobody", "hi").await.unwrap());

        let polled = service.poll(&ada).await.unwrap();
        assert_eq!(polled, vec![IncomingMessage::new("Bern", "hi")]);
        assert!(service.poll(&ada).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn injected_failures_are_transport_errors() {
        let service = MemoryService::new().with_user("Bern", "b");
        let token = service.login("Bern", "b").await.unwrap();
        service.set_online("Carl", true);
        service.fail_sends_to("Carl");
        service.fail_next_polls(1);

        assert!(matches!(
            service.send(&token, "Carl", "x").await,
            Err(ChatError::Transport(_))
        ));
        assert!(service.poll(&token).await.is_err());
        assert!(service.poll(&token).await.is_ok());
    }
}
