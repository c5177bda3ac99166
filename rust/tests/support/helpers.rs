use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use clario_core::conversation::message::{Message, MessageId, MessageState, Reactions};
use clario_core::{
    AppReconciler, AppUpdate, ChatMessage, ConversationViewState, FfiApp, RealtimeChange,
    RealtimeConnector,
};

pub const ME: &str = "user-me";
pub const PEER: &str = "user-peer";
pub const CHAT: &str = "chat-1";

pub fn wait_until(what: &str, timeout: Duration, f: impl FnMut() -> bool) {
    wait_until_with_poll(what, timeout, Duration::from_millis(20), f);
}

pub fn wait_until_with_poll(
    what: &str,
    timeout: Duration,
    poll: Duration,
    mut f: impl FnMut() -> bool,
) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(poll);
    }
    panic!("{what}: condition not met within {timeout:?}");
}

pub fn write_config(data_dir: &str, extra: serde_json::Value) {
    let path = std::path::Path::new(data_dir).join("clario_config.json");
    let mut v = serde_json::json!({ "disable_network": true });
    if let (Some(base), Some(extra)) = (v.as_object_mut(), extra.as_object()) {
        for (k, val) in extra {
            base.insert(k.clone(), val.clone());
        }
    }
    std::fs::write(path, serde_json::to_vec(&v).unwrap()).unwrap();
}

pub fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, h, m, 0).unwrap()
}

pub fn server_message(id: &str, sender: &str, created_at: DateTime<Utc>, text: &str) -> Message {
    Message {
        id: MessageId::server(id),
        conversation_id: CHAT.to_string(),
        sender_id: sender.to_string(),
        created_at,
        text: Some(text.to_string()),
        attachment_urls: vec![],
        reply_to: None,
        reactions: Reactions::new(),
        state: MessageState::Confirmed,
    }
}

pub fn message_row(msg: &Message) -> RealtimeChange {
    let record = serde_json::json!({
        "id": msg.id.key(),
        "chat_id": msg.conversation_id,
        "sender_id": msg.sender_id,
        "content": msg.text.clone().unwrap_or_default(),
        "media_urls": msg.attachment_urls,
        "created_at": msg.created_at.to_rfc3339(),
    });
    RealtimeChange {
        conversation_id: msg.conversation_id.clone(),
        table: "chat_messages".into(),
        event_type: "INSERT".into(),
        record_json: record.to_string(),
    }
}

pub fn reaction_row(event_type: &str, message_id: &str, user_id: &str, emoji: &str) -> RealtimeChange {
    let record = serde_json::json!({
        "message_id": message_id,
        "user_id": user_id,
        "emoji": emoji,
        "chat_id": CHAT,
    });
    RealtimeChange {
        conversation_id: CHAT.into(),
        table: "chat_message_reactions".into(),
        event_type: event_type.into(),
        record_json: record.to_string(),
    }
}

pub fn conversation(app: &FfiApp) -> Option<ConversationViewState> {
    app.state().conversation
}

pub fn messages(app: &FfiApp) -> Vec<ChatMessage> {
    conversation(app).map(|c| c.messages).unwrap_or_default()
}

pub fn find_message(app: &FfiApp, id: &str) -> Option<ChatMessage> {
    messages(app).into_iter().find(|m| m.id == id)
}

pub struct TestReconciler {
    updates: Arc<Mutex<Vec<AppUpdate>>>,
}

impl TestReconciler {
    pub fn new() -> (Self, Arc<Mutex<Vec<AppUpdate>>>) {
        let updates = Arc::new(Mutex::new(vec![]));
        (
            Self {
                updates: updates.clone(),
            },
            updates,
        )
    }
}

impl AppReconciler for TestReconciler {
    fn reconcile(&self, update: AppUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

/// Records subscribe/unsubscribe calls as `+id` / `-id`.
#[derive(Clone, Default)]
pub struct RecordingConnector(pub Arc<Mutex<Vec<String>>>);

impl RealtimeConnector for RecordingConnector {
    fn subscribe(&self, conversation_id: String) {
        self.0.lock().unwrap().push(format!("+{conversation_id}"));
    }

    fn unsubscribe(&self, conversation_id: String) {
        self.0.lock().unwrap().push(format!("-{conversation_id}"));
    }
}
