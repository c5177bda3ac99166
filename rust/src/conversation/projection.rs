// Conversation -> host view state.

use chrono::{DateTime, SecondsFormat, Utc};

use super::message::{Message, MessageState};
use super::send::{AttachmentStatus, Draft};
use super::Conversation;
use crate::state::{
    AttachmentUploadState, ChatMessage, ComposerAttachment, ComposerState,
    ConversationViewState, LoadState, MessageDeliveryState, ReactionSummary, ReplyPreview,
};

pub fn iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Conversation {
    pub fn view(&self) -> ConversationViewState {
        let me = self.current_user_id.as_str();
        let messages: Vec<&Message> = self.timeline.iter().collect();

        // "Seen" sits on the newest confirmed own message, and only if the peer read it.
        let seen_id = messages
            .iter()
            .find(|m| m.sender_id == me && m.state == MessageState::Confirmed)
            .filter(|m| self.receipts.is_seen_by_peer(m))
            .map(|m| m.id.clone());
        let highlighted = self.replies.highlighted();

        let rows = messages
            .iter()
            .enumerate()
            .map(|(i, m)| {
                // Display order is newest first: i + 1 is the older neighbour.
                let older = messages.get(i + 1);
                let newer = i.checked_sub(1).and_then(|j| messages.get(j));
                ChatMessage {
                    id: m.id.key(),
                    sender_id: m.sender_id.clone(),
                    text: m.text.clone(),
                    attachment_urls: m.attachment_urls.clone(),
                    created_at: iso(m.created_at),
                    timestamp_ms: m.created_at.timestamp_millis(),
                    is_mine: m.sender_id == me,
                    delivery: delivery(&m.state),
                    reactions: m
                        .reactions
                        .iter()
                        .map(|(emoji, r)| ReactionSummary {
                            emoji: emoji.to_string(),
                            count: r.count,
                            reacted_by_me: r.reacted_by_me,
                        })
                        .collect(),
                    reply: m.reply_to.as_ref().map(|r| self.reply_preview(r)),
                    show_seen: seen_id.as_ref() == Some(&m.id),
                    is_first_in_group: older.map_or(true, |o| o.sender_id != m.sender_id),
                    is_last_in_group: newer.map_or(true, |n| n.sender_id != m.sender_id),
                    is_highlighted: highlighted == Some(&m.id),
                }
            })
            .collect();

        ConversationViewState {
            conversation_id: self.conversation_id.clone(),
            peer_id: self.peer_id.clone(),
            load_state: self.load_state.clone(),
            messages: rows,
            can_load_older: self.load_state == LoadState::Ready && self.cursor.has_more(),
            loading_older: self.load_state == LoadState::Ready && self.cursor.in_flight(),
            older_load_error: self.older_load_error.clone(),
            composer: self.composer_state(self.sends.composer()),
            highlighted_message_id: highlighted.map(|id| id.key()),
            peer_last_read_at: self.receipts.peer_last_read_at().map(iso),
            self_last_read_at: self.receipts.self_last_read_at().map(iso),
        }
    }

    fn reply_preview(&self, reply: &super::message::ReplyRef) -> ReplyPreview {
        match self.replies.resolve(&self.timeline, reply) {
            Some(r) => ReplyPreview {
                message_id: r.message_id.key(),
                sender_id: Some(r.sender_id),
                preview_text: r.preview_text,
                can_jump: r.in_timeline,
            },
            None => ReplyPreview {
                message_id: reply.id.key(),
                sender_id: None,
                preview_text: super::reply::UNAVAILABLE_PREVIEW.to_string(),
                can_jump: false,
            },
        }
    }

    fn composer_state(&self, draft: &Draft) -> ComposerState {
        ComposerState {
            text: draft.text.clone(),
            attachments: draft
                .attachments
                .iter()
                .map(|a| ComposerAttachment {
                    local_uri: a.local_uri.clone(),
                    status: match &a.status {
                        AttachmentStatus::Uploading => AttachmentUploadState::Uploading,
                        AttachmentStatus::Uploaded { url } => {
                            AttachmentUploadState::Uploaded { url: url.clone() }
                        }
                        AttachmentStatus::Failed { reason } => AttachmentUploadState::Failed {
                            reason: reason.clone(),
                        },
                    },
                })
                .collect(),
            reply_to: draft.reply_to.as_ref().map(|r| self.reply_preview(r)),
            can_send: self.load_state == LoadState::Ready && self.sends.send_blocked().is_none(),
        }
    }
}

fn delivery(state: &MessageState) -> MessageDeliveryState {
    match state {
        MessageState::Pending => MessageDeliveryState::Pending,
        MessageState::Confirmed => MessageDeliveryState::Sent,
        MessageState::Failed { reason } => MessageDeliveryState::Failed {
            reason: reason.clone(),
        },
    }
}
