use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use clario_core::conversation::message::{Message, MessageId};
use clario_core::conversation::reactions::ReactionAction;
use clario_core::conversation::send::OutgoingMessage;
use clario_core::conversation::MessagePage;
use clario_core::{ApiError, ChatApi};

use super::helpers::{at, server_message, CHAT, ME};

#[derive(Default)]
struct ServerState {
    // Oldest first, like the backend table.
    messages: Vec<Message>,
    peer_last_read_at: Option<DateTime<Utc>>,
    reactions: HashSet<(String, String)>,
    next_id: u64,
    calls: Vec<String>,
    send_failures: VecDeque<ApiError>,
    reaction_failures: VecDeque<ApiError>,
    page_failures: VecDeque<ApiError>,
    send_gate: Option<flume::Receiver<()>>,
}

/// In-memory backend for one conversation, scripted per test.
#[derive(Clone, Default)]
pub struct ScriptedChatApi {
    inner: Arc<Mutex<ServerState>>,
}

impl ScriptedChatApi {
    pub fn with_history(messages: Vec<Message>) -> Self {
        let api = Self::default();
        api.inner.lock().unwrap().messages = messages;
        api
    }

    /// `count` peer messages one minute apart, ids `h0..`.
    pub fn with_numbered_history(count: usize) -> Self {
        let messages = (0..count)
            .map(|i| {
                server_message(
                    &format!("h{i}"),
                    super::helpers::PEER,
                    at(8, 0) + ChronoDuration::minutes(i as i64),
                    &format!("message {i}"),
                )
            })
            .collect();
        Self::with_history(messages)
    }

    pub fn set_peer_last_read_at(&self, at: DateTime<Utc>) {
        self.inner.lock().unwrap().peer_last_read_at = Some(at);
    }

    pub fn fail_next_send(&self, err: ApiError) {
        self.inner.lock().unwrap().send_failures.push_back(err);
    }

    pub fn fail_next_reaction(&self, err: ApiError) {
        self.inner.lock().unwrap().reaction_failures.push_back(err);
    }

    pub fn fail_next_page(&self, err: ApiError) {
        self.inner.lock().unwrap().page_failures.push_back(err);
    }

    /// Hold every send response until the returned sender is signalled (once per send).
    pub fn gate_sends(&self) -> flume::Sender<()> {
        let (tx, rx) = flume::unbounded();
        self.inner.lock().unwrap().send_gate = Some(rx);
        tx
    }

    /// Append a message as if another client had written it.
    pub fn push_message(&self, message: Message) {
        self.inner.lock().unwrap().messages.push(message);
    }

    pub fn stored(&self, id: &str) -> Option<Message> {
        let state = self.inner.lock().unwrap();
        state
            .messages
            .iter()
            .find(|m| m.id == MessageId::server(id))
            .cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

#[async_trait]
impl ChatApi for ScriptedChatApi {
    async fn fetch_messages(
        &self,
        conversation_id: &str,
        limit: u32,
        offset: usize,
    ) -> Result<MessagePage, ApiError> {
        let mut state = self.inner.lock().unwrap();
        state
            .calls
            .push(format!("fetch:{conversation_id}:{limit}:{offset}"));
        if let Some(err) = state.page_failures.pop_front() {
            return Err(err);
        }
        if conversation_id != CHAT {
            return Err(ApiError::NotFound(conversation_id.to_string()));
        }
        let total = state.messages.len();
        let end = total.saturating_sub(offset);
        let start = end.saturating_sub(limit as usize);
        Ok(MessagePage {
            messages: state.messages[start..end].to_vec(),
            has_more: start > 0,
            peer_last_read_at: state.peer_last_read_at,
            self_last_read_at: None,
        })
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        outgoing: &OutgoingMessage,
    ) -> Result<Message, ApiError> {
        let gate = {
            let mut state = self.inner.lock().unwrap();
            state.calls.push(format!("send:{conversation_id}"));
            state.send_gate.clone()
        };
        if let Some(gate) = gate {
            let _ = gate.recv_async().await;
        }

        let mut state = self.inner.lock().unwrap();
        if let Some(err) = state.send_failures.pop_front() {
            return Err(err);
        }
        state.next_id += 1;
        let id = format!("srv-{}", state.next_id);
        let mut message = server_message(
            &id,
            ME,
            at(12, 0) + ChronoDuration::seconds(state.next_id as i64),
            outgoing.text.as_deref().unwrap_or(""),
        );
        message.text = outgoing.text.clone();
        message.attachment_urls = outgoing.attachment_urls.clone();
        message.reply_to = outgoing.reply_to.clone();
        state.messages.push(message.clone());
        Ok(message)
    }

    async fn toggle_reaction(
        &self,
        _conversation_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<ReactionAction, ApiError> {
        let mut state = self.inner.lock().unwrap();
        state.calls.push(format!("react:{message_id}:{emoji}"));
        if let Some(err) = state.reaction_failures.pop_front() {
            return Err(err);
        }
        let key = (message_id.to_string(), emoji.to_string());
        if state.reactions.remove(&key) {
            Ok(ReactionAction::Removed)
        } else {
            state.reactions.insert(key);
            Ok(ReactionAction::Added)
        }
    }

    async fn mark_read(&self, conversation_id: &str) -> Result<(), ApiError> {
        self.inner
            .lock()
            .unwrap()
            .calls
            .push(format!("mark_read:{conversation_id}"));
        Ok(())
    }

    async fn upload_attachment(
        &self,
        _conversation_id: &str,
        local_uri: &str,
    ) -> Result<String, ApiError> {
        self.inner
            .lock()
            .unwrap()
            .calls
            .push(format!("upload:{local_uri}"));
        if local_uri.contains("broken") {
            return Err(ApiError::Rejected {
                status: 413,
                message: "File too large".into(),
            });
        }
        let name = local_uri.rsplit('/').next().unwrap_or("file");
        Ok(format!("https://cdn.test/{name}"))
    }
}
