use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

const LOCAL_KEY_PREFIX: &str = "local:";

/// Message identity. Client-generated ids live in their own variant so they can never collide
/// with an id handed out by the server.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageId {
    Local(String),
    Server(String),
}

impl MessageId {
    pub fn new_local() -> Self {
        MessageId::Local(uuid::Uuid::new_v4().to_string())
    }

    pub fn server(id: impl Into<String>) -> Self {
        MessageId::Server(id.into())
    }

    pub fn is_local(&self) -> bool {
        matches!(self, MessageId::Local(_))
    }

    /// Flat string form used across the FFI boundary.
    pub fn key(&self) -> String {
        match self {
            MessageId::Local(v) => format!("{LOCAL_KEY_PREFIX}{v}"),
            MessageId::Server(v) => v.clone(),
        }
    }

    pub fn from_key(key: &str) -> Self {
        match key.strip_prefix(LOCAL_KEY_PREFIX) {
            Some(v) => MessageId::Local(v.to_string()),
            None => MessageId::Server(key.to_string()),
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageState {
    Pending,
    Confirmed,
    Failed { reason: String },
}

impl MessageState {
    pub fn is_pending(&self) -> bool {
        matches!(self, MessageState::Pending)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, MessageState::Failed { .. })
    }
}

/// Quote captured on the referencing message by the server when it was created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplySnippet {
    pub sender_id: String,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyRef {
    pub id: MessageId,
    pub snippet: Option<ReplySnippet>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReactionState {
    pub count: u32,
    pub reacted_by_me: bool,
}

/// Emoji -> count map. Entries never sit at zero: a decrement that reaches zero drops the key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reactions(BTreeMap<String, ReactionState>);

impl Reactions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from server-reported totals, dropping zero counts and clamping a "mine" flag
    /// to at least one reaction.
    pub fn from_totals(totals: impl IntoIterator<Item = (String, u32, bool)>) -> Self {
        let mut map = BTreeMap::new();
        for (emoji, count, mine) in totals {
            let count = if mine { count.max(1) } else { count };
            if count == 0 {
                continue;
            }
            map.insert(
                emoji,
                ReactionState {
                    count,
                    reacted_by_me: mine,
                },
            );
        }
        Self(map)
    }

    pub fn get(&self, emoji: &str) -> Option<ReactionState> {
        self.0.get(emoji).copied()
    }

    pub fn reacted_by_me(&self, emoji: &str) -> bool {
        self.0.get(emoji).map(|r| r.reacted_by_me).unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ReactionState)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub(crate) fn increment(&mut self, emoji: &str, mine: bool) {
        let entry = self.0.entry(emoji.to_string()).or_default();
        entry.count = entry.count.saturating_add(1);
        if mine {
            entry.reacted_by_me = true;
        }
    }

    pub(crate) fn decrement(&mut self, emoji: &str, mine: bool) {
        let Some(entry) = self.0.get_mut(emoji) else {
            return;
        };
        if mine {
            entry.reacted_by_me = false;
        }
        // Someone else's removal can't take away the reaction we still hold.
        let floor = u32::from(entry.reacted_by_me);
        entry.count = entry.count.saturating_sub(1).max(floor);
        if entry.count == 0 {
            self.0.remove(emoji);
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: String,
    pub sender_id: String,
    pub created_at: DateTime<Utc>,
    pub text: Option<String>,
    pub attachment_urls: Vec<String>,
    pub reply_to: Option<ReplyRef>,
    pub reactions: Reactions,
    pub state: MessageState,
}

impl Message {
    pub fn reply_to_id(&self) -> Option<&MessageId> {
        self.reply_to.as_ref().map(|r| &r.id)
    }

    /// Text shown when this message is quoted by a reply.
    pub fn preview_text(&self) -> String {
        match self.text.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ if !self.attachment_urls.is_empty() => "Photo".to_string(),
            _ => String::new(),
        }
    }

    /// Identity of the content a client submitted, used to recognize the realtime echo of an
    /// own send (`other`) before the direct response names its server id. A reply target is
    /// only compared when the echo carries one.
    pub(crate) fn same_content(&self, other: &Message) -> bool {
        self.sender_id == other.sender_id
            && normalized_text(self.text.as_deref()) == normalized_text(other.text.as_deref())
            && self.attachment_urls == other.attachment_urls
            && other
                .reply_to_id()
                .map_or(true, |id| self.reply_to_id() == Some(id))
    }
}

fn normalized_text(text: Option<&str>) -> &str {
    text.map(str::trim).unwrap_or("")
}
