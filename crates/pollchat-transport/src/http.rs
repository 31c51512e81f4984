//! HTTP/JSON binding of the remote chat service.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use pollchat_core::{ChatError, Connector, Endpoint, IncomingMessage, RemoteService};
use reqwest::{Client, Response};
use serde::{Serialize, de::DeserializeOwned};

use crate::protocol::{
    Credentials, ErrorResponse, MessageListResponse, OnlineUsersResponse, PingResponse,
    SendRequest, SendResponse, TokenRequest, TokenResponse, UserListResponse,
};

/// Chat service reached over plain HTTP.
#[derive(Clone)]
pub struct HttpService {
    client: Client,
    base_url: String,
}

impl HttpService {
    /// Create a client for `endpoint`.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(endpoint: &Endpoint, timeout: Duration) -> Result<Self, ChatError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: endpoint.base_url(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ChatError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(request_error)?;
        decode(response).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ChatError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(request_error)?;
        decode(response).await
    }
}

fn request_error(err: reqwest::Error) -> ChatError {
    if err.is_decode() {
        ChatError::Protocol(err.to_string())
    } else {
        ChatError::Transport(err.to_string())
    }
}

async fn checked(response: Response) -> Result<String, ChatError> {
    let status = response.status();
    let text = response.text().await.map_err(request_error)?;
    if status.is_success() {
        Ok(text)
    } else {
        Err(ChatError::from_status(
            status.as_u16(),
            ErrorResponse::reason_from(&text),
        ))
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ChatError> {
    let text = checked(response).await?;
    serde_json::from_str(&text).map_err(|e| ChatError::Protocol(e.to_string()))
}

#[async_trait]
impl RemoteService for HttpService {
    async fn ping(&self) -> Result<bool, ChatError> {
        let res: PingResponse = self.get_json("/ping").await?;
        Ok(res.ping)
    }

    async fn register(&self, username: &str, password: &str) -> Result<(), ChatError> {
        let body = Credentials {
            username: username.to_owned(),
            password: password.to_owned(),
        };
        let response = self
            .client
            .post(self.url("/user/register"))
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;
        // Success bodies vary between server versions; only the status matters.
        checked(response).await?;
        tracing::debug!(%username, "registered");
        Ok(())
    }

    async fn login(&self, username: &str, password: &str) -> Result<String, ChatError> {
        let body = Credentials {
            username: username.to_owned(),
            password: password.to_owned(),
        };
        let res: TokenResponse = self.post_json("/user/login", &body).await?;
        if res.token.is_empty() {
            return Err(ChatError::Protocol("server returned an empty token".into()));
        }
        Ok(res.token)
    }

    async fn logout(&self, token: &str) -> Result<(), ChatError> {
        let response = self
            .client
            .post(self.url("/user/logout"))
            .json(&TokenRequest {
                token: token.to_owned(),
            })
            .send()
            .await
            .map_err(request_error)?;
        checked(response).await.map(|_| ())
    }

    async fn list_all_users(&self) -> Result<Vec<String>, ChatError> {
        let res: UserListResponse = self.get_json("/users").await?;
        Ok(res.users)
    }

    async fn list_online_users(&self) -> Result<Vec<String>, ChatError> {
        let res: OnlineUsersResponse = self.get_json("/users/online").await?;
        Ok(res.online)
    }

    async fn send(&self, token: &str, to: &str, body: &str) -> Result<bool, ChatError> {
        let req = SendRequest {
            token: token.to_owned(),
            username: to.to_owned(),
            message: body.to_owned(),
        };
        let res: SendResponse = self.post_json("/chat/send", &req).await?;
        Ok(res.send)
    }

    async fn poll(&self, token: &str) -> Result<Vec<IncomingMessage>, ChatError> {
        let req = TokenRequest {
            token: token.to_owned(),
        };
        let res: MessageListResponse = self.post_json("/chat/poll", &req).await?;
        Ok(res.messages.into_iter().map(Into::into).collect())
    }
}

/// Builds an [`HttpService`] for whatever endpoint the engine binds to.
#[derive(Debug, Clone, Copy)]
pub struct HttpConnector {
    timeout: Duration,
}

impl HttpConnector {
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Connector for HttpConnector {
    fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn RemoteService>, ChatError> {
        Ok(Arc::new(HttpService::new(endpoint, self.timeout)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_urls_from_endpoint() {
        let service =
            HttpService::new(&Endpoint::new("chat.local", 50001), Duration::from_secs(1)).unwrap();
        assert_eq!(service.url("/users/online"), "http://chat.local:50001/users/online");
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        // Port 9 (discard) is closed on test hosts; connection is refused.
        let service =
            HttpService::new(&Endpoint::new("127.0.0.1", 9), Duration::from_millis(500)).unwrap();
        let err = service.ping().await.unwrap_err();
        assert_eq!(err.category(), pollchat_core::ErrorCategory::Transport);
    }
}
