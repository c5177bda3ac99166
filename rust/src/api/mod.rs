//! REST collaborator: the operations the engine needs from the chat backend.

mod http;
pub mod wire;

use async_trait::async_trait;

use crate::conversation::message::Message;
use crate::conversation::reactions::ReactionAction;
use crate::conversation::send::OutgoingMessage;
use crate::conversation::MessagePage;

pub use http::HttpChatApi;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Transport failure or network disabled; the request may or may not have reached the
    /// server.
    #[error("network error: {0}")]
    Network(String),

    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Response arrived but could not be understood.
    #[error("decode error: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            404 => ApiError::NotFound(message),
            409 => ApiError::Conflict(message),
            _ => ApiError::Rejected { status, message },
        }
    }

    /// Short string suitable for a toast or a failed-bubble caption.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Network(_) => "Network unavailable".to_string(),
            ApiError::Rejected { message, .. } if !message.is_empty() => message.clone(),
            ApiError::Rejected { status, .. } => format!("Request failed ({status})"),
            ApiError::Conflict(_) => "Conflicting update".to_string(),
            ApiError::NotFound(_) => "Conversation not found".to_string(),
            ApiError::Decode(_) => "Unexpected server response".to_string(),
        }
    }
}

#[async_trait]
pub trait ChatApi: Send + Sync {
    /// `offset` counts server rows from the newest message backwards.
    async fn fetch_messages(
        &self,
        conversation_id: &str,
        limit: u32,
        offset: usize,
    ) -> Result<MessagePage, ApiError>;

    async fn send_message(
        &self,
        conversation_id: &str,
        outgoing: &OutgoingMessage,
    ) -> Result<Message, ApiError>;

    /// Flip the caller's reaction server-side. Returns what the server ended up doing.
    async fn toggle_reaction(
        &self,
        conversation_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<ReactionAction, ApiError>;

    async fn mark_read(&self, conversation_id: &str) -> Result<(), ApiError>;

    /// Upload a local file and return its public URL.
    async fn upload_attachment(
        &self,
        conversation_id: &str,
        local_uri: &str,
    ) -> Result<String, ApiError>;
}
