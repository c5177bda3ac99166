//! Realtime feed: decoding of row-change payloads into engine events, and the subscription
//! handle tying the host's channel to the open conversation.

use std::sync::{Arc, RwLock};

use crate::api::wire::{WireMessage, WireReactionRow};
use crate::conversation::message::{Message, MessageId};
use crate::conversation::reactions::ReactionAction;

const MESSAGES_TABLE: &str = "chat_messages";
const REACTIONS_TABLE: &str = "chat_message_reactions";

/// Row change pushed by the host's realtime client, received on the channel opened for
/// `conversation_id`.
#[derive(uniffi::Record, Clone, Debug)]
pub struct RealtimeChange {
    pub conversation_id: String,
    pub table: String,
    /// `INSERT`, `UPDATE` or `DELETE`.
    pub event_type: String,
    /// The new row for inserts, the old row for deletes.
    pub record_json: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    MessageInserted {
        message: Message,
    },
    ReactionChanged {
        message_id: MessageId,
        emoji: String,
        actor_id: String,
        action: ReactionAction,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RealtimeDecodeError {
    #[error("unsupported change {table}/{event_type}")]
    Unsupported { table: String, event_type: String },

    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("record belongs to conversation {0}")]
    OtherConversation(String),
}

/// Decode one change for `conversation_id`. Rows naming another conversation are rejected;
/// reaction deletes may omit `chat_id` and are accepted.
pub fn decode_change(
    change: &RealtimeChange,
    conversation_id: &str,
) -> Result<RealtimeEvent, RealtimeDecodeError> {
    let event_type = change.event_type.to_ascii_uppercase();
    match (change.table.as_str(), event_type.as_str()) {
        (MESSAGES_TABLE, "INSERT") => {
            let wire: WireMessage = serde_json::from_str(&change.record_json)
                .map_err(|e| RealtimeDecodeError::Malformed(e.to_string()))?;
            if wire.chat_id != conversation_id {
                return Err(RealtimeDecodeError::OtherConversation(wire.chat_id));
            }
            let message = wire
                .into_message()
                .map_err(|e| RealtimeDecodeError::Malformed(e.to_string()))?;
            Ok(RealtimeEvent::MessageInserted { message })
        }
        (REACTIONS_TABLE, "INSERT" | "DELETE") => {
            let row: WireReactionRow = serde_json::from_str(&change.record_json)
                .map_err(|e| RealtimeDecodeError::Malformed(e.to_string()))?;
            if let Some(chat_id) = row.chat_id.filter(|c| c != conversation_id) {
                return Err(RealtimeDecodeError::OtherConversation(chat_id));
            }
            let action = ReactionAction::parse(&event_type).ok_or_else(|| {
                RealtimeDecodeError::Malformed(format!("event type {event_type}"))
            })?;
            Ok(RealtimeEvent::ReactionChanged {
                message_id: MessageId::server(row.message_id),
                emoji: row.emoji,
                actor_id: row.user_id,
                action,
            })
        }
        _ => Err(RealtimeDecodeError::Unsupported {
            table: change.table.clone(),
            event_type: change.event_type.clone(),
        }),
    }
}

/// Host-side realtime transport. The host opens a channel per conversation and feeds each
/// row change back through `FfiApp::ingest_realtime_change`.
#[uniffi::export(callback_interface)]
pub trait RealtimeConnector: Send + Sync + 'static {
    fn subscribe(&self, conversation_id: String);
    fn unsubscribe(&self, conversation_id: String);
}

pub type SharedRealtimeConnector = Arc<RwLock<Option<Arc<dyn RealtimeConnector>>>>;

/// Live subscription for one open conversation. Dropping it closes the host channel.
pub struct Subscription {
    conversation_id: String,
    connector: Option<Arc<dyn RealtimeConnector>>,
}

impl Subscription {
    pub fn open(connector: &SharedRealtimeConnector, conversation_id: &str) -> Self {
        let connector = match connector.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        };
        match &connector {
            Some(c) => c.subscribe(conversation_id.to_string()),
            None => tracing::debug!(conversation_id, "no realtime connector; live updates off"),
        }
        Self {
            conversation_id: conversation_id.to_string(),
            connector,
        }
    }

    /// Whether a change received on `conversation_id`'s channel is meant for this handle.
    pub fn accepts(&self, conversation_id: &str) -> bool {
        self.conversation_id == conversation_id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(c) = self.connector.take() {
            c.unsubscribe(std::mem::take(&mut self.conversation_id));
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("conversation_id", &self.conversation_id)
            .field("connected", &self.connector.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn change(table: &str, event_type: &str, record_json: &str) -> RealtimeChange {
        RealtimeChange {
            conversation_id: "c1".into(),
            table: table.into(),
            event_type: event_type.into(),
            record_json: record_json.into(),
        }
    }

    #[test]
    fn decodes_message_insert_row() {
        let c = change(
            "chat_messages",
            "INSERT",
            r#"{"id":"m9","chat_id":"c1","sender_id":"u2","content":"yo",
                "media_urls":null,"created_at":"2025-03-01 10:00:00.5+00","reply_to_id":"m1"}"#,
        );
        let RealtimeEvent::MessageInserted { message } = decode_change(&c, "c1").unwrap() else {
            panic!("expected message insert");
        };
        assert_eq!(message.id, MessageId::server("m9"));
        assert_eq!(message.reply_to_id(), Some(&MessageId::server("m1")));
        assert!(message.reactions.is_empty());
    }

    #[test]
    fn rejects_rows_for_other_conversations() {
        let c = change(
            "chat_messages",
            "INSERT",
            r#"{"id":"m9","chat_id":"c2","sender_id":"u2","content":"yo","created_at":"2025-03-01T10:00:00Z"}"#,
        );
        assert_eq!(
            decode_change(&c, "c1"),
            Err(RealtimeDecodeError::OtherConversation("c2".into()))
        );

        let r = change(
            "chat_message_reactions",
            "INSERT",
            r#"{"message_id":"m1","user_id":"u2","emoji":"👍","chat_id":"c2"}"#,
        );
        assert!(matches!(
            decode_change(&r, "c1"),
            Err(RealtimeDecodeError::OtherConversation(_))
        ));
    }

    #[test]
    fn reaction_delete_without_chat_id_is_accepted() {
        let r = change(
            "chat_message_reactions",
            "delete",
            r#"{"message_id":"m1","user_id":"u2","emoji":"🔥"}"#,
        );
        assert_eq!(
            decode_change(&r, "c1").unwrap(),
            RealtimeEvent::ReactionChanged {
                message_id: MessageId::server("m1"),
                emoji: "🔥".into(),
                actor_id: "u2".into(),
                action: ReactionAction::Removed,
            }
        );
    }

    #[test]
    fn unsupported_and_malformed_changes() {
        assert!(matches!(
            decode_change(&change("chat_messages", "UPDATE", "{}"), "c1"),
            Err(RealtimeDecodeError::Unsupported { .. })
        ));
        assert!(matches!(
            decode_change(&change("chat_messages", "INSERT", "{not json"), "c1"),
            Err(RealtimeDecodeError::Malformed(_))
        ));
    }

    #[derive(Default)]
    struct RecordingConnector(Mutex<Vec<String>>);

    impl RealtimeConnector for RecordingConnector {
        fn subscribe(&self, conversation_id: String) {
            self.0.lock().unwrap().push(format!("+{conversation_id}"));
        }
        fn unsubscribe(&self, conversation_id: String) {
            self.0.lock().unwrap().push(format!("-{conversation_id}"));
        }
    }

    #[test]
    fn subscription_unsubscribes_on_drop() {
        let recorder = Arc::new(RecordingConnector::default());
        let connector: Arc<dyn RealtimeConnector> = recorder.clone();
        let shared: SharedRealtimeConnector = Arc::new(RwLock::new(Some(connector)));
        let sub = Subscription::open(&shared, "c1");
        assert!(sub.accepts("c1"));
        assert!(!sub.accepts("c2"));
        drop(sub);
        assert_eq!(*recorder.0.lock().unwrap(), vec!["+c1", "-c1"]);
    }
}
