use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod frame;

pub use frame::{Frame, FrameKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    Claude,
    #[default]
    Gemini,
    Deepseek,
}

impl AiProvider {
    /// Preference order used when the selected provider becomes unavailable.
    pub const ALL: [AiProvider; 3] = [AiProvider::Claude, AiProvider::Gemini, AiProvider::Deepseek];

    pub fn as_str(self) -> &'static str {
        match self {
            AiProvider::Claude => "claude",
            AiProvider::Gemini => "gemini",
            AiProvider::Deepseek => "deepseek",
        }
    }

    /// Provider to switch to after this one reports a stream error.
    pub fn fallback(self) -> AiProvider {
        match self {
            AiProvider::Claude | AiProvider::Deepseek => AiProvider::Gemini,
            AiProvider::Gemini => AiProvider::Claude,
        }
    }
}

impl fmt::Display for AiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AiProvider {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        AiProvider::ALL
            .into_iter()
            .find(|provider| provider.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| {
                format!("Unknown provider '{value}' (expected one of: claude, gemini, deepseek)")
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub path: String,
    pub name: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<AiProvider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileRef>>,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl Message {
    pub fn is_error(&self) -> bool {
        self.is_error.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub ai_provider: AiProvider,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationListItem {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub ai_provider: AiProvider,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub account_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub message: String,
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProviderStatus {
    pub available: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl ProviderStatus {
    pub fn available() -> Self {
        Self {
            available: true,
            error: None,
        }
    }
}

pub type ProvidersStatusMap = HashMap<AiProvider, ProviderStatus>;

/// JSON body for `chat/send` when no files are attached.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageBody<'a> {
    pub provider: AiProvider,
    pub message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<&'a str>,
}

#[derive(Deserialize)]
pub(crate) struct ProvidersEnvelope {
    pub providers: ProvidersStatusMap,
}

#[derive(Deserialize)]
pub(crate) struct ConversationsEnvelope {
    pub conversations: Vec<ConversationListItem>,
}

#[derive(Deserialize)]
pub(crate) struct ConversationEnvelope {
    pub conversation: Conversation,
}

#[derive(Deserialize)]
pub(crate) struct UserEnvelope {
    pub user: User,
}
