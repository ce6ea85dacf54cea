use chrono::{SecondsFormat, Utc};
use tracing::{debug, warn};

use crate::api::{
    AiProvider, Conversation, ConversationListItem, FileRef, Message, ProviderStatus,
    ProvidersStatusMap, Role,
};
use crate::core::chat_stream::{Attachment, StreamMessage};

pub const MAX_MESSAGES: usize = 50;
pub const WARN_MESSAGES: usize = 40;

/// Follow-up work the caller should perform after a store update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEffect {
    None,
    /// The backend may have created or retitled a conversation.
    RefreshConversations,
}

/// What the caller needs to issue the request for an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub provider: AiProvider,
    pub content: String,
    pub conversation_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct ConversationStore {
    pub conversations: Vec<ConversationListItem>,
    pub active_conversation_id: Option<String>,
    pub messages: Vec<Message>,
    pub selected_provider: AiProvider,
    pub is_streaming: bool,
    pub streaming_content: String,
    pub providers_status: Option<ProvidersStatusMap>,
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl ConversationStore {
    pub fn new(selected_provider: AiProvider) -> Self {
        Self {
            selected_provider,
            ..Self::default()
        }
    }

    pub fn active_conversation(&self) -> Option<&ConversationListItem> {
        let active = self.active_conversation_id.as_deref()?;
        self.conversations.iter().find(|c| c.id == active)
    }

    pub fn has_conversations(&self) -> bool {
        !self.conversations.is_empty()
    }

    pub fn is_near_limit(&self) -> bool {
        (WARN_MESSAGES..MAX_MESSAGES).contains(&self.messages.len())
    }

    pub fn is_limit_reached(&self) -> bool {
        self.messages.len() >= MAX_MESSAGES
    }

    pub fn messages_remaining(&self) -> usize {
        MAX_MESSAGES.saturating_sub(self.messages.len())
    }

    /// Unknown status counts as available.
    pub fn provider_status(&self, provider: AiProvider) -> ProviderStatus {
        self.providers_status
            .as_ref()
            .and_then(|statuses| statuses.get(&provider).cloned())
            .unwrap_or_else(ProviderStatus::available)
    }

    /// Record fresh provider health. If the selected provider went down,
    /// move to the first available one. Returns the new selection when it
    /// changed.
    pub fn apply_providers_status(&mut self, statuses: ProvidersStatusMap) -> Option<AiProvider> {
        self.providers_status = Some(statuses);
        if self.provider_status(self.selected_provider).available {
            return None;
        }

        let fallback = AiProvider::ALL
            .into_iter()
            .find(|provider| self.provider_status(*provider).available)?;
        debug!(from = %self.selected_provider, to = %fallback, "selected provider unavailable");
        self.selected_provider = fallback;
        Some(fallback)
    }

    pub fn set_conversations(&mut self, conversations: Vec<ConversationListItem>) {
        self.conversations = conversations;
    }

    pub fn select_conversation(&mut self, conversation: Conversation) {
        self.active_conversation_id = Some(conversation.id);
        self.messages = conversation.messages;
        self.selected_provider = conversation.ai_provider;
    }

    pub fn start_new_chat(&mut self) {
        self.active_conversation_id = None;
        self.messages.clear();
        self.streaming_content.clear();
    }

    pub fn remove_conversation(&mut self, id: &str) {
        self.conversations.retain(|c| c.id != id);
        if self.active_conversation_id.as_deref() == Some(id) {
            self.start_new_chat();
        }
    }

    pub fn set_provider(&mut self, provider: AiProvider) {
        self.selected_provider = provider;
    }

    /// Accept a user message for sending.
    ///
    /// Returns `None` while a response is still streaming, or when there is
    /// neither text nor an attachment. Otherwise the trimmed message is
    /// appended and the store enters the streaming state.
    pub fn begin_send(&mut self, content: &str, attachments: &[Attachment]) -> Option<PendingSend> {
        let content = content.trim();
        if self.is_streaming || (content.is_empty() && attachments.is_empty()) {
            return None;
        }

        let files = (!attachments.is_empty()).then(|| {
            attachments
                .iter()
                .map(|attachment| FileRef {
                    path: String::new(),
                    name: attachment.name.clone(),
                    mime_type: attachment.mime_type.clone(),
                })
                .collect()
        });

        self.messages.push(Message {
            role: Role::User,
            content: content.to_string(),
            provider: None,
            files,
            created_at: now_timestamp(),
            is_error: None,
        });
        self.is_streaming = true;
        self.streaming_content.clear();

        Some(PendingSend {
            provider: self.selected_provider,
            content: content.to_string(),
            conversation_id: self.active_conversation_id.clone(),
        })
    }

    pub fn apply_stream_message(&mut self, message: StreamMessage) -> StoreEffect {
        match message {
            StreamMessage::Meta(conversation_id) => {
                self.active_conversation_id = Some(conversation_id);
                StoreEffect::None
            }
            StreamMessage::Chunk(text) => {
                self.streaming_content.push_str(&text);
                StoreEffect::None
            }
            StreamMessage::Done => {
                let content = std::mem::take(&mut self.streaming_content);
                self.messages.push(Message {
                    role: Role::Assistant,
                    content,
                    provider: Some(self.selected_provider),
                    files: None,
                    created_at: now_timestamp(),
                    is_error: None,
                });
                self.is_streaming = false;
                StoreEffect::RefreshConversations
            }
            StreamMessage::Error(error) => {
                warn!(provider = %self.selected_provider, %error, "stream error");
                let failed = self.selected_provider;
                let fallback = failed.fallback();
                self.messages.push(Message {
                    role: Role::Assistant,
                    content: format!(
                        "Error: {error}. {failed} is having trouble, switching to {fallback}."
                    ),
                    provider: Some(failed),
                    files: None,
                    created_at: now_timestamp(),
                    is_error: Some(true),
                });
                self.set_provider(fallback);
                self.streaming_content.clear();
                self.is_streaming = false;
                StoreEffect::None
            }
            StreamMessage::End => {
                if self.is_streaming {
                    debug!("stream ended without a terminal frame");
                    self.streaming_content.clear();
                    self.is_streaming = false;
                }
                StoreEffect::None
            }
        }
    }
}
