//! JSON bodies exchanged with the chat server.

use pollchat_core::IncomingMessage;
use serde::{Deserialize, Serialize};

/// `POST /user/login` and `POST /user/register` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// `POST /user/logout` and `POST /chat/poll` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

/// `POST /chat/send` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequest {
    pub token: String,
    /// Recipient username.
    pub username: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse {
    pub ping: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResponse {
    pub send: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserListResponse {
    pub users: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineUsersResponse {
    pub online: Vec<String>,
}

/// One polled message as the server encodes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    /// Sender username.
    pub username: String,
    pub message: String,
}

impl From<WireMessage> for IncomingMessage {
    fn from(wire: WireMessage) -> Self {
        Self::new(wire.username, wire.message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageListResponse {
    pub messages: Vec<WireMessage>,
}

/// Error body; servers use either field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorResponse {
    /// Best human-readable reason from a raw error body.
    #[must_use]
    pub fn reason_from(body: &str) -> String {
        serde_json::from_str::<Self>(body)
            .ok()
            .and_then(|parsed| parsed.error.or(parsed.message))
            .unwrap_or_else(|| body.trim().to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_request_uses_server_field_names() {
        let body = SendRequest {
            token: "t0k".into(),
            username: "Ada".into(),
            message: "hi".into(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["username"], "Ada");
        assert_eq!(json["message"], "hi");
        assert_eq!(json["token"], "t0k");
    }

    #[test]
    fn ignores_unknown_fields_in_responses() {
        let parsed: MessageListResponse = serde_json::from_str(
            r#"{"messages":[{"username":"Ada","message":"hey","ts":17}],"extra":true}"#,
        )
        .unwrap();
        let incoming: Vec<IncomingMessage> = parsed.messages.into_iter().map(Into::into).collect();
        assert_eq!(incoming, vec![IncomingMessage::new("Ada", "hey")]);
    }

    #[test]
    fn extracts_error_reason() {
        assert_eq!(ErrorResponse::reason_from(r#"{"error":"taken"}"#), "taken");
        assert_eq!(ErrorResponse::reason_from(r#"{"message":"nope"}"#), "nope");
        assert_eq!(ErrorResponse::reason_from(" plain text \n"), "plain text");
    }
}
