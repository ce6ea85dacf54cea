//! Request/response calls to the backend outside the streaming path.

use std::error::Error as StdError;
use std::fmt;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::api::{
    AiProvider, Conversation, ConversationEnvelope, ConversationListItem, ConversationsEnvelope,
    LoginRequest, LoginResponse, ProvidersEnvelope, ProvidersStatusMap, User, UserEnvelope,
};
use crate::core::chat_stream::{extract_error_message, Attachment, StreamRequest};
use crate::utils::url::{construct_api_url, normalize_base_url};

#[derive(Debug)]
pub enum ApiError {
    /// The request never produced a response.
    Transport(reqwest::Error),
    /// The backend answered with a non-success status.
    Status {
        status: StatusCode,
        message: Option<String>,
    },
    /// The response body did not have the expected shape.
    Decode(reqwest::Error),
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Transport(err) => write!(f, "Request failed: {err}"),
            ApiError::Status {
                message: Some(message),
                ..
            } => write!(f, "{message}"),
            ApiError::Status {
                status,
                message: None,
            } => write!(f, "Server responded with {status}"),
            ApiError::Decode(err) => write!(f, "Unexpected response from server: {err}"),
        }
    }
}

impl StdError for ApiError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ApiError::Transport(err) | ApiError::Decode(err) => Some(err),
            ApiError::Status { .. } => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ChatClient {
    pub fn new(http: reqwest::Client, base_url: &str, token: Option<String>) -> Self {
        Self {
            http,
            base_url: normalize_base_url(base_url),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        self.send_json(
            Method::POST,
            "auth/login",
            Some(&LoginRequest { email, password }),
        )
        .await
    }

    pub async fn profile(&self) -> Result<User, ApiError> {
        let envelope: UserEnvelope = self.get("auth/profile").await?;
        Ok(envelope.user)
    }

    pub async fn providers_status(&self) -> Result<ProvidersStatusMap, ApiError> {
        let envelope: ProvidersEnvelope = self.get("chat/providers/status").await?;
        Ok(envelope.providers)
    }

    pub async fn conversations(&self) -> Result<Vec<ConversationListItem>, ApiError> {
        let envelope: ConversationsEnvelope = self.get("chat/conversations").await?;
        Ok(envelope.conversations)
    }

    pub async fn conversation(&self, id: &str) -> Result<Conversation, ApiError> {
        let envelope: ConversationEnvelope =
            self.get(&format!("chat/conversations/{id}")).await?;
        Ok(envelope.conversation)
    }

    pub async fn delete_conversation(&self, id: &str) -> Result<(), ApiError> {
        let response = self
            .request(Method::DELETE, &format!("chat/conversations/{id}"))
            .send()
            .await
            .map_err(ApiError::Transport)?;
        check_status(response).await?;
        Ok(())
    }

    /// A streaming request that shares this client's base URL and token.
    pub fn stream_request(
        &self,
        provider: AiProvider,
        message: &str,
        conversation_id: Option<&str>,
        attachments: Vec<Attachment>,
    ) -> StreamRequest {
        StreamRequest {
            base_url: self.base_url.clone(),
            token: self.token.clone(),
            provider,
            message: message.to_string(),
            conversation_id: conversation_id.map(str::to_owned),
            attachments,
        }
    }

    fn request(&self, method: Method, endpoint: &str) -> reqwest::RequestBuilder {
        let url = construct_api_url(&self.base_url, endpoint);
        debug!(%method, %url, "api request");
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.send_json::<(), T>(Method::GET, endpoint, None).await
    }

    async fn send_json<B, T>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut builder = self.request(method, endpoint);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = builder.send().await.map_err(ApiError::Transport)?;
        let response = check_status(response).await?;
        response.json::<T>().await.map_err(ApiError::Decode)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status,
        message: extract_error_message(&body),
    })
}
