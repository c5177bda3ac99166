// Optimistic sends: provisional timeline entry first, server record later.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::message::{Message, MessageId, MessageState, Reactions, ReplyRef};
use super::timeline::{Reconciled, TimelineStore};

pub const MAX_TEXT_CHARS: usize = 2000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttachmentStatus {
    Uploading,
    Uploaded { url: String },
    Failed { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentSlot {
    pub local_uri: String,
    pub status: AttachmentStatus,
}

/// Compose state. Attachments keep their pick order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Draft {
    pub text: String,
    pub attachments: Vec<AttachmentSlot>,
    pub reply_to: Option<ReplyRef>,
}

impl Draft {
    fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachments.is_empty() && self.reply_to.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendBlocked {
    Empty,
    AttachmentUploading,
    AttachmentFailed { local_uri: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SendPhase {
    Submitting,
    Failed,
}

/// Request body for one send attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub local_id: MessageId,
    pub text: Option<String>,
    pub attachment_urls: Vec<String>,
    pub reply_to: Option<ReplyRef>,
}

#[derive(Debug, Clone)]
struct SendAttempt {
    outgoing: OutgoingMessage,
    phase: SendPhase,
}

#[derive(Debug)]
pub struct SendCoordinator {
    conversation_id: String,
    current_user_id: String,
    composer: Draft,
    attempts: HashMap<MessageId, SendAttempt>,
}

impl SendCoordinator {
    pub fn new(conversation_id: impl Into<String>, current_user_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            current_user_id: current_user_id.into(),
            composer: Draft::default(),
            attempts: HashMap::new(),
        }
    }

    pub fn composer(&self) -> &Draft {
        &self.composer
    }

    pub fn set_text(&mut self, text: &str) {
        self.composer.text = text.chars().take(MAX_TEXT_CHARS).collect();
    }

    pub fn set_reply_to(&mut self, reply_to: Option<ReplyRef>) {
        self.composer.reply_to = reply_to;
    }

    pub fn add_attachment(&mut self, local_uri: &str) -> bool {
        if self.slot(local_uri).is_some() {
            return false;
        }
        self.composer.attachments.push(AttachmentSlot {
            local_uri: local_uri.to_string(),
            status: AttachmentStatus::Uploading,
        });
        true
    }

    /// Upload finished. Ignored if the user removed the attachment meanwhile.
    pub fn attachment_uploaded(&mut self, local_uri: &str, url: String) -> bool {
        match self.slot_mut(local_uri) {
            Some(slot) if slot.status == AttachmentStatus::Uploading => {
                slot.status = AttachmentStatus::Uploaded { url };
                true
            }
            _ => false,
        }
    }

    pub fn attachment_failed(&mut self, local_uri: &str, reason: impl Into<String>) -> bool {
        match self.slot_mut(local_uri) {
            Some(slot) if slot.status == AttachmentStatus::Uploading => {
                slot.status = AttachmentStatus::Failed {
                    reason: reason.into(),
                };
                true
            }
            _ => false,
        }
    }

    /// Put a failed attachment back into the uploading state; the caller restarts the upload.
    pub fn retry_attachment(&mut self, local_uri: &str) -> bool {
        match self.slot_mut(local_uri) {
            Some(slot) if matches!(slot.status, AttachmentStatus::Failed { .. }) => {
                slot.status = AttachmentStatus::Uploading;
                true
            }
            _ => false,
        }
    }

    pub fn remove_attachment(&mut self, local_uri: &str) -> bool {
        let before = self.composer.attachments.len();
        self.composer
            .attachments
            .retain(|a| a.local_uri != local_uri);
        before != self.composer.attachments.len()
    }

    pub fn send_blocked(&self) -> Option<SendBlocked> {
        if let Some(failed) = self
            .composer
            .attachments
            .iter()
            .find(|a| matches!(a.status, AttachmentStatus::Failed { .. }))
        {
            return Some(SendBlocked::AttachmentFailed {
                local_uri: failed.local_uri.clone(),
            });
        }
        if self
            .composer
            .attachments
            .iter()
            .any(|a| a.status == AttachmentStatus::Uploading)
        {
            return Some(SendBlocked::AttachmentUploading);
        }
        if self.composer.text.trim().is_empty() && self.composer.attachments.is_empty() {
            return Some(SendBlocked::Empty);
        }
        None
    }

    /// Turn the composer into a pending timeline entry and clear it.
    pub fn begin_send(
        &mut self,
        store: &mut TimelineStore,
        now: DateTime<Utc>,
    ) -> Result<OutgoingMessage, SendBlocked> {
        if let Some(blocked) = self.send_blocked() {
            return Err(blocked);
        }
        let draft = std::mem::take(&mut self.composer);
        let text = Some(draft.text.trim().to_string()).filter(|t| !t.is_empty());
        let attachment_urls = draft
            .attachments
            .into_iter()
            .filter_map(|a| match a.status {
                AttachmentStatus::Uploaded { url } => Some(url),
                _ => None,
            })
            .collect();
        let outgoing = OutgoingMessage {
            local_id: MessageId::new_local(),
            text,
            attachment_urls,
            reply_to: draft.reply_to,
        };
        Ok(self.submit(store, outgoing, now))
    }

    pub fn confirm(
        &mut self,
        store: &mut TimelineStore,
        local_id: &MessageId,
        server: Message,
    ) -> Reconciled {
        self.attempts.remove(local_id);
        store.reconcile(local_id, server)
    }

    /// Mark the attempt failed and hand its text back to an empty composer. Returns whether
    /// the draft was restored.
    pub fn fail(
        &mut self,
        store: &mut TimelineStore,
        local_id: &MessageId,
        reason: impl Into<String>,
    ) -> bool {
        if !store.mark_failed(local_id, reason) {
            // Confirmed by a realtime echo already.
            self.attempts.remove(local_id);
            return false;
        }
        let Some(attempt) = self.attempts.get_mut(local_id) else {
            return false;
        };
        attempt.phase = SendPhase::Failed;
        if !self.composer.is_empty() {
            return false;
        }
        let outgoing = attempt.outgoing.clone();
        self.composer = Draft {
            text: outgoing.text.unwrap_or_default(),
            attachments: outgoing
                .attachment_urls
                .into_iter()
                .map(|url| AttachmentSlot {
                    local_uri: url.clone(),
                    status: AttachmentStatus::Uploaded { url },
                })
                .collect(),
            reply_to: outgoing.reply_to,
        };
        true
    }

    /// Resubmit a failed message as a fresh attempt with a new local id.
    pub fn retry(
        &mut self,
        store: &mut TimelineStore,
        failed_id: &MessageId,
        now: DateTime<Utc>,
    ) -> Option<OutgoingMessage> {
        let attempt = self.attempts.get(failed_id)?;
        if attempt.phase != SendPhase::Failed {
            return None;
        }
        store.remove_failed(failed_id)?;
        let attempt = self.attempts.remove(failed_id)?;
        let outgoing = OutgoingMessage {
            local_id: MessageId::new_local(),
            ..attempt.outgoing
        };
        Some(self.submit(store, outgoing, now))
    }

    pub fn discard(&mut self, store: &mut TimelineStore, failed_id: &MessageId) -> bool {
        if store.remove_failed(failed_id).is_none() {
            return false;
        }
        self.attempts.remove(failed_id);
        true
    }

    fn submit(
        &mut self,
        store: &mut TimelineStore,
        outgoing: OutgoingMessage,
        now: DateTime<Utc>,
    ) -> OutgoingMessage {
        let pending = Message {
            id: outgoing.local_id.clone(),
            conversation_id: self.conversation_id.clone(),
            sender_id: self.current_user_id.clone(),
            created_at: now,
            text: outgoing.text.clone(),
            attachment_urls: outgoing.attachment_urls.clone(),
            reply_to: outgoing.reply_to.clone(),
            reactions: Reactions::new(),
            state: MessageState::Pending,
        };
        store.insert_optimistic(pending);
        self.attempts.insert(
            outgoing.local_id.clone(),
            SendAttempt {
                outgoing: outgoing.clone(),
                phase: SendPhase::Submitting,
            },
        );
        outgoing
    }

    fn slot(&self, local_uri: &str) -> Option<&AttachmentSlot> {
        self.composer
            .attachments
            .iter()
            .find(|a| a.local_uri == local_uri)
    }

    fn slot_mut(&mut self, local_uri: &str) -> Option<&mut AttachmentSlot> {
        self.composer
            .attachments
            .iter_mut()
            .find(|a| a.local_uri == local_uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::message::test_support::{at, server_msg};
    use crate::conversation::timeline::RemoteInsert;

    const ME: &str = "me";

    fn setup() -> (TimelineStore, SendCoordinator) {
        let mut store = TimelineStore::new(ME);
        store.seed(vec![server_msg("a", "peer", at(10, 0), "hi")]);
        (store, SendCoordinator::new("chat-1", ME))
    }

    #[test]
    fn send_inserts_pending_and_clears_composer() {
        let (mut store, mut sends) = setup();
        sends.set_text("  hello there ");
        let out = sends.begin_send(&mut store, at(10, 1)).unwrap();
        assert_eq!(out.text.as_deref(), Some("hello there"));
        assert_eq!(sends.composer(), &Draft::default());
        assert_eq!(store.position(&out.local_id), Some(0));
        assert_eq!(sends.attempts[&out.local_id].phase, SendPhase::Submitting);
        assert!(store.get(&out.local_id).unwrap().state.is_pending());
    }

    #[test]
    fn empty_send_is_refused() {
        let (mut store, mut sends) = setup();
        sends.set_text("   ");
        assert_eq!(
            sends.begin_send(&mut store, at(10, 1)),
            Err(SendBlocked::Empty)
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn send_blocked_while_attachment_uploads() {
        let (mut store, mut sends) = setup();
        sends.add_attachment("file:///a.jpg");
        sends.add_attachment("file:///b.jpg");
        assert_eq!(
            sends.begin_send(&mut store, at(10, 1)),
            Err(SendBlocked::AttachmentUploading)
        );
        sends.attachment_uploaded("file:///a.jpg", "https://cdn/a.jpg".into());
        sends.attachment_failed("file:///b.jpg", "413");
        assert_eq!(
            sends.send_blocked(),
            Some(SendBlocked::AttachmentFailed {
                local_uri: "file:///b.jpg".into()
            })
        );

        // Removing the failed one keeps the rest of the compose state.
        assert!(sends.remove_attachment("file:///b.jpg"));
        let out = sends.begin_send(&mut store, at(10, 1)).unwrap();
        assert_eq!(out.attachment_urls, vec!["https://cdn/a.jpg".to_string()]);
        assert_eq!(out.text, None);
    }

    #[test]
    fn late_upload_for_removed_attachment_is_ignored() {
        let (_, mut sends) = setup();
        sends.add_attachment("file:///a.jpg");
        sends.remove_attachment("file:///a.jpg");
        assert!(!sends.attachment_uploaded("file:///a.jpg", "https://cdn/a.jpg".into()));
        assert!(sends.composer().attachments.is_empty());
    }

    #[test]
    fn failure_restores_text_and_keeps_failed_bubble() {
        let (mut store, mut sends) = setup();
        sends.set_text("important");
        let out = sends.begin_send(&mut store, at(10, 1)).unwrap();

        assert!(sends.fail(&mut store, &out.local_id, "network"));
        assert_eq!(sends.composer().text, "important");
        assert_eq!(sends.attempts[&out.local_id].phase, SendPhase::Failed);
        assert!(store.get(&out.local_id).unwrap().state.is_failed());
    }

    #[test]
    fn failure_does_not_clobber_new_typing() {
        let (mut store, mut sends) = setup();
        sends.set_text("first");
        let out = sends.begin_send(&mut store, at(10, 1)).unwrap();
        sends.set_text("second");
        assert!(!sends.fail(&mut store, &out.local_id, "network"));
        assert_eq!(sends.composer().text, "second");
    }

    #[test]
    fn retry_replaces_failed_entry_with_new_attempt() {
        let (mut store, mut sends) = setup();
        sends.set_text("again");
        let out = sends.begin_send(&mut store, at(10, 1)).unwrap();
        sends.fail(&mut store, &out.local_id, "network");
        sends.set_text("");

        let retried = sends.retry(&mut store, &out.local_id, at(10, 2)).unwrap();
        assert_ne!(retried.local_id, out.local_id);
        assert_eq!(retried.text.as_deref(), Some("again"));
        assert!(!store.contains(&out.local_id));
        assert_eq!(store.position(&retried.local_id), Some(0));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn response_after_echo_keeps_single_entry() {
        let (mut store, mut sends) = setup();
        sends.set_text("race");
        let out = sends.begin_send(&mut store, at(10, 1)).unwrap();

        let echo = server_msg("s1", ME, at(10, 1), "race");
        assert!(matches!(
            store.insert_remote(echo.clone()),
            RemoteInsert::Adopted { .. }
        ));
        assert_eq!(
            sends.confirm(&mut store, &out.local_id, echo),
            Reconciled::AlreadyAdopted
        );
        assert_eq!(store.len(), 2);
        assert_eq!(store.position(&MessageId::server("s1")), Some(0));
        assert!(sends.attempts.is_empty());
    }
}
