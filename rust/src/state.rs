#[derive(uniffi::Record, Clone, Debug)]
pub struct AppState {
    pub rev: u64,
    pub current_user_id: String,
    pub conversation: Option<ConversationViewState>,
    pub toast: Option<String>,
}

impl AppState {
    pub fn empty(current_user_id: String) -> Self {
        Self {
            rev: 0,
            current_user_id,
            conversation: None,
            toast: None,
        }
    }
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum LoadState {
    Loading,
    Ready,
    /// Initial load failed; the host shows a retry control (`AppAction::RetryLoad`).
    Failed { reason: String },
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct ConversationViewState {
    pub conversation_id: String,
    pub peer_id: Option<String>,
    pub load_state: LoadState,
    /// Newest first.
    pub messages: Vec<ChatMessage>,
    pub can_load_older: bool,
    pub loading_older: bool,
    pub older_load_error: Option<String>,
    pub composer: ComposerState,
    pub highlighted_message_id: Option<String>,
    pub peer_last_read_at: Option<String>,
    pub self_last_read_at: Option<String>,
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    pub text: Option<String>,
    pub attachment_urls: Vec<String>,
    pub created_at: String,
    pub timestamp_ms: i64,
    pub is_mine: bool,
    pub delivery: MessageDeliveryState,
    pub reactions: Vec<ReactionSummary>,
    pub reply: Option<ReplyPreview>,
    /// Only ever set on the newest own message.
    pub show_seen: bool,
    pub is_first_in_group: bool,
    pub is_last_in_group: bool,
    pub is_highlighted: bool,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct ReactionSummary {
    pub emoji: String,
    pub count: u32,
    pub reacted_by_me: bool,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct ReplyPreview {
    pub message_id: String,
    pub sender_id: Option<String>,
    pub preview_text: String,
    /// False when the quoted message is not paged in; the host scrolls approximately.
    pub can_jump: bool,
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum MessageDeliveryState {
    Pending,
    Sent,
    Failed { reason: String },
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct ComposerState {
    pub text: String,
    pub attachments: Vec<ComposerAttachment>,
    pub reply_to: Option<ReplyPreview>,
    /// Send button enabled.
    pub can_send: bool,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct ComposerAttachment {
    pub local_uri: String,
    pub status: AttachmentUploadState,
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum AttachmentUploadState {
    Uploading,
    Uploaded { url: String },
    Failed { reason: String },
}
