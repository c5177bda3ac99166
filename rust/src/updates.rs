use crate::api::ApiError;
use crate::conversation::message::{Message, MessageId};
use crate::conversation::reactions::{AppliedDelta, ReactionAction};
use crate::conversation::MessagePage;
use crate::realtime::RealtimeChange;
use crate::state::AppState;
use crate::AppAction;

#[derive(uniffi::Enum, Clone, Debug)]
pub enum AppUpdate {
    FullState(AppState),
    /// Scroll request for "jump to original". `index` is the display position (newest
    /// first); absent when the target is not paged in.
    JumpRequested {
        rev: u64,
        message_id: String,
        index: Option<u32>,
    },
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
            AppUpdate::JumpRequested { rev, .. } => *rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageKind {
    Initial,
    Older,
    Refresh,
}

/// Completions of async work, each stamped with the conversation session it was issued
/// under.
#[derive(Debug)]
pub enum InternalEvent {
    PageLoaded {
        session: u64,
        kind: PageKind,
        result: Result<MessagePage, ApiError>,
    },
    SendResult {
        session: u64,
        local_id: MessageId,
        result: Result<Message, ApiError>,
    },
    ReactionResult {
        session: u64,
        delta: AppliedDelta,
        result: Result<ReactionAction, ApiError>,
    },
    MarkReadResult {
        session: u64,
        result: Result<(), ApiError>,
    },
    UploadResult {
        session: u64,
        local_uri: String,
        result: Result<String, ApiError>,
    },
    HighlightExpired {
        session: u64,
        token: u64,
    },

    // Host push
    RealtimeChangeReceived {
        change: RealtimeChange,
    },
}
