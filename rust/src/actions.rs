#[derive(uniffi::Enum, Debug, Clone)]
pub enum AppAction {
    // Conversation lifecycle
    OpenConversation {
        conversation_id: String,
        peer_id: Option<String>,
    },
    CloseConversation,
    /// Retry the initial load after `LoadState::Failed`.
    RetryLoad,
    /// Re-fetch the newest page and merge it.
    RefreshConversation,
    LoadOlderMessages,
    MarkRead,

    // Composer
    UpdateDraft {
        text: String,
    },
    SetReplyTarget {
        message_id: String,
    },
    ClearReplyTarget,
    AddAttachment {
        local_uri: String,
    },
    RetryAttachment {
        local_uri: String,
    },
    RemoveAttachment {
        local_uri: String,
    },
    SendMessage,
    RetryMessage {
        message_id: String,
    },
    DiscardMessage {
        message_id: String,
    },

    // Message interactions
    ToggleReaction {
        message_id: String,
        emoji: String,
    },
    JumpToMessage {
        message_id: String,
    },

    // UI
    ClearToast,

    // Lifecycle
    Foregrounded,
}

impl AppAction {
    /// Log-safe action tag (never includes message text or file paths).
    pub fn tag(&self) -> &'static str {
        match self {
            // Conversation lifecycle
            AppAction::OpenConversation { .. } => "OpenConversation",
            AppAction::CloseConversation => "CloseConversation",
            AppAction::RetryLoad => "RetryLoad",
            AppAction::RefreshConversation => "RefreshConversation",
            AppAction::LoadOlderMessages => "LoadOlderMessages",
            AppAction::MarkRead => "MarkRead",

            // Composer
            AppAction::UpdateDraft { .. } => "UpdateDraft",
            AppAction::SetReplyTarget { .. } => "SetReplyTarget",
            AppAction::ClearReplyTarget => "ClearReplyTarget",
            AppAction::AddAttachment { .. } => "AddAttachment",
            AppAction::RetryAttachment { .. } => "RetryAttachment",
            AppAction::RemoveAttachment { .. } => "RemoveAttachment",
            AppAction::SendMessage => "SendMessage",
            AppAction::RetryMessage { .. } => "RetryMessage",
            AppAction::DiscardMessage { .. } => "DiscardMessage",

            // Message interactions
            AppAction::ToggleReaction { .. } => "ToggleReaction",
            AppAction::JumpToMessage { .. } => "JumpToMessage",

            // UI
            AppAction::ClearToast => "ClearToast",

            // Lifecycle
            AppAction::Foregrounded => "Foregrounded",
        }
    }
}
