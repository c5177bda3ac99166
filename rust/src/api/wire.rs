// JSON shapes of the chat REST API and realtime rows.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::conversation::message::{
    Message, MessageId, MessageState, Reactions, ReplyRef, ReplySnippet,
};
use crate::conversation::reactions::ReactionAction;
use crate::conversation::MessagePage;

#[derive(Debug, Clone, Deserialize)]
pub struct WireReplyTo {
    pub id: String,
    #[serde(default)]
    pub content: String,
    pub sender_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireReaction {
    pub emoji: String,
    pub count: u32,
    #[serde(default)]
    pub reacted_by_me: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireMessage {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub media_urls: Option<Vec<String>>,
    pub created_at: String,
    #[serde(default)]
    pub reply_to: Option<WireReplyTo>,
    // Raw table rows (realtime) carry only the foreign key.
    #[serde(default)]
    pub reply_to_id: Option<String>,
    #[serde(default)]
    pub reactions: Option<Vec<WireReaction>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireMessagesResponse {
    #[serde(default)]
    pub messages: Vec<WireMessage>,
    #[serde(rename = "hasMore", default)]
    pub has_more: bool,
    #[serde(default)]
    pub recipient_last_read_at: Option<String>,
    #[serde(default)]
    pub my_last_read_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendMessageBody<'a> {
    pub content: &'a str,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    pub media_urls: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReactionBody<'a> {
    pub emoji: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReactionResponse {
    pub action: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

/// Row of `chat_message_reactions` as pushed by the realtime feed.
#[derive(Debug, Clone, Deserialize)]
pub struct WireReactionRow {
    pub message_id: String,
    pub user_id: String,
    pub emoji: String,
    #[serde(default)]
    pub chat_id: Option<String>,
}

/// Accepts RFC 3339 as well as the `2025-03-01 10:00:00.123+00` form Postgres emits.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|_| ApiError::Decode(format!("invalid timestamp {raw:?}")))
}

fn parse_optional_timestamp(raw: Option<String>) -> Result<Option<DateTime<Utc>>, ApiError> {
    raw.filter(|s| !s.trim().is_empty())
        .map(|s| parse_timestamp(&s))
        .transpose()
}

impl WireMessage {
    pub fn into_message(self) -> Result<Message, ApiError> {
        let created_at = parse_timestamp(&self.created_at)?;
        let text = self
            .content
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        let reply_to = match (self.reply_to, self.reply_to_id) {
            (Some(r), _) => Some(ReplyRef {
                id: MessageId::server(r.id),
                snippet: Some(ReplySnippet {
                    sender_id: r.sender_id,
                    text: r.content,
                }),
            }),
            (None, Some(id)) if !id.is_empty() => Some(ReplyRef {
                id: MessageId::server(id),
                snippet: None,
            }),
            _ => None,
        };
        let reactions = Reactions::from_totals(
            self.reactions
                .unwrap_or_default()
                .into_iter()
                .map(|r| (r.emoji, r.count, r.reacted_by_me)),
        );
        Ok(Message {
            id: MessageId::server(self.id),
            conversation_id: self.chat_id,
            sender_id: self.sender_id,
            created_at,
            text,
            attachment_urls: self.media_urls.unwrap_or_default(),
            reply_to,
            reactions,
            state: MessageState::Confirmed,
        })
    }
}

impl WireMessagesResponse {
    pub fn into_page(self) -> Result<MessagePage, ApiError> {
        let messages = self
            .messages
            .into_iter()
            .map(WireMessage::into_message)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MessagePage {
            messages,
            has_more: self.has_more,
            peer_last_read_at: parse_optional_timestamp(self.recipient_last_read_at)?,
            self_last_read_at: parse_optional_timestamp(self.my_last_read_at)?,
        })
    }
}

impl ReactionResponse {
    pub fn into_action(self) -> Result<ReactionAction, ApiError> {
        ReactionAction::parse(&self.action)
            .ok_or_else(|| ApiError::Decode(format!("unknown reaction action {:?}", self.action)))
    }
}
