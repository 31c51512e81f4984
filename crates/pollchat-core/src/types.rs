//! Domain types shared by the engine and its transports.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reserved recipient name meaning "every online peer".
pub const EVERYONE: &str = "all";

/// Remote endpoint a session is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint from an already-parsed port.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Create an endpoint from user-entered text.
    ///
    /// A port that does not parse falls back to `default_port`.
    #[must_use]
    pub fn parse(host: &str, port: &str, default_port: u16) -> Self {
        let port = port.trim().parse().unwrap_or(default_port);
        Self::new(host.trim(), port)
    }

    /// Base URL for HTTP transports.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A message as reported by the remote poll endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Username of the sender.
    pub origin: String,
    /// Message text.
    pub body: String,
}

impl IncomingMessage {
    #[must_use]
    pub fn new(origin: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            body: body.into(),
        }
    }
}

/// Addressee of a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Recipient {
    /// Every online peer.
    Everyone,
    /// The local session (used for polled messages).
    Me,
    /// A specific user.
    User(String),
}

impl Recipient {
    /// Interpret a caller-supplied recipient name.
    ///
    /// Only the exact reserved [`EVERYONE`] name maps to
    /// [`Recipient::Everyone`]; usernames are case-sensitive, so `"ALL"` is a user.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        if name == EVERYONE {
            Self::Everyone
        } else {
            Self::User(name.to_owned())
        }
    }
}

/// Whether a message was created locally or polled from the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Sent (or broadcast) by the local session.
    Outgoing,
    /// Reported by the remote poll endpoint.
    Incoming,
}

/// One entry of the message log. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: String,
    pub recipient: Recipient,
    pub body: String,
    pub direction: Direction,
}

impl ChatMessage {
    /// A message originated by the local user.
    #[must_use]
    pub fn outgoing(sender: impl Into<String>, recipient: Recipient, body: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            recipient,
            body: body.into(),
            direction: Direction::Outgoing,
        }
    }

    /// A message received through polling; always addressed to the local session.
    #[must_use]
    pub fn incoming(message: IncomingMessage) -> Self {
        Self {
            sender: message.origin,
            recipient: Recipient::Me,
            body: message.body,
            direction: Direction::Incoming,
        }
    }

    /// True when the local session created this message.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.direction == Direction::Outgoing
    }

    /// The conversation this message belongs to.
    #[must_use]
    pub fn conversation_key(&self) -> ConversationKey {
        match (&self.recipient, self.direction) {
            (Recipient::Everyone, _) => ConversationKey::Everyone,
            (Recipient::User(peer), Direction::Outgoing) => ConversationKey::Peer(peer.clone()),
            _ => ConversationKey::Peer(self.sender.clone()),
        }
    }

    /// Whether `peer` appears as sender or addressed recipient.
    #[must_use]
    pub fn involves(&self, peer: &str) -> bool {
        self.sender == peer || matches!(&self.recipient, Recipient::User(name) if name == peer)
    }
}

/// Bucket used to group messages for display and unread tracking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "peer", rename_all = "snake_case")]
pub enum ConversationKey {
    Everyone,
    Peer(String),
}

impl ConversationKey {
    /// Key for a caller-supplied name; the reserved name maps to `Everyone`.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match Recipient::parse(name) {
            Recipient::User(peer) => Self::Peer(peer),
            _ => Self::Everyone,
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Everyone => f.write_str(EVERYONE),
            Self::Peer(peer) => f.write_str(peer),
        }
    }
}

/// One roster row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub is_online: bool,
}

impl User {
    #[must_use]
    pub fn new(username: impl Into<String>, is_online: bool) -> Self {
        Self {
            username: username.into(),
            is_online,
        }
    }
}

/// Snapshot of who the engine is logged in as.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Empty when unauthenticated.
    pub username: String,
    /// Endpoint of the current binding, if any.
    pub endpoint: Option<Endpoint>,
    pub authenticated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_falls_back_to_default() {
        let endpoint = Endpoint::parse(" chat.local ", "not-a-port", 50001);
        assert_eq!(endpoint, Endpoint::new("chat.local", 50001));
        assert_eq!(Endpoint::parse("h", "8080", 50001).port, 8080);
        assert_eq!(endpoint.base_url(), "http://chat.local:50001");
    }

    #[test]
    fn reserved_name_maps_to_everyone() {
        assert_eq!(Recipient::parse("all"), Recipient::Everyone);
        assert_eq!(Recipient::parse("Ada"), Recipient::User("Ada".into()));
        assert_eq!(ConversationKey::parse("all"), ConversationKey::Everyone);
    }

    #[test]
    fn reserved_name_match_is_exact() {
        assert_eq!(Recipient::parse("ALL"), Recipient::User("ALL".into()));
        assert_eq!(Recipient::parse("All"), Recipient::User("All".into()));
        assert_eq!(Recipient::parse(" all"), Recipient::User(" all".into()));
        assert_eq!(
            ConversationKey::parse("All"),
            ConversationKey::Peer("All".into())
        );
    }

    #[test]
    fn conversation_key_is_the_remote_side() {
        let sent = ChatMessage::outgoing("Bern", Recipient::User("Ada".into()), "hi");
        assert_eq!(sent.conversation_key(), ConversationKey::Peer("Ada".into()));

        let received = ChatMessage::incoming(IncomingMessage::new("Ada", "hey"));
        assert_eq!(received.conversation_key(), ConversationKey::Peer("Ada".into()));
        assert!(!received.is_local());

        let broadcast = ChatMessage::outgoing("Bern", Recipient::Everyone, "[Broadcast] yo");
        assert_eq!(broadcast.conversation_key(), ConversationKey::Everyone);
        assert!(broadcast.is_local());
    }

    #[test]
    fn recipient_serializes_with_tag() {
        let json = serde_json::to_string(&Recipient::User("Ada".into())).unwrap();
        assert_eq!(json, r#"{"kind":"user","name":"Ada"}"#);
        let json = serde_json::to_string(&Recipient::Everyone).unwrap();
        assert_eq!(json, r#"{"kind":"everyone"}"#);
    }
}
