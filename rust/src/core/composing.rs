// Composer, sends, reactions and reply navigation.

use std::time::Duration;

use crate::conversation::message::Message;
use crate::conversation::reactions::{AppliedDelta, ReactionAction, ServerOutcome};
use crate::conversation::send::{OutgoingMessage, SendBlocked};

use super::*;

impl AppCore {
    pub(super) fn update_draft(&mut self, text: &str) {
        let Some(open) = self.open.as_mut() else {
            return;
        };
        open.conversation.update_draft(text);
        self.emit_state();
    }

    pub(super) fn set_reply_target(&mut self, message_id: &MessageId) {
        let Some(open) = self.open.as_mut() else {
            return;
        };
        if !open.conversation.set_reply_target(message_id) {
            tracing::debug!(message_id = %message_id, "reply target not replyable");
            return;
        }
        self.emit_state();
    }

    pub(super) fn clear_reply_target(&mut self) {
        let Some(open) = self.open.as_mut() else {
            return;
        };
        open.conversation.clear_reply_target();
        self.emit_state();
    }

    pub(super) fn add_attachment(&mut self, local_uri: String) {
        let Some(open) = self.open.as_mut() else {
            return;
        };
        if !open.conversation.add_attachment(&local_uri) {
            return;
        }
        self.start_upload(local_uri);
        self.emit_state();
    }

    pub(super) fn retry_attachment(&mut self, local_uri: String) {
        let Some(open) = self.open.as_mut() else {
            return;
        };
        if !open.conversation.retry_attachment(&local_uri) {
            return;
        }
        self.start_upload(local_uri);
        self.emit_state();
    }

    pub(super) fn remove_attachment(&mut self, local_uri: &str) {
        let Some(open) = self.open.as_mut() else {
            return;
        };
        if open.conversation.remove_attachment(local_uri) {
            self.emit_state();
        }
    }

    fn start_upload(&self, local_uri: String) {
        let Some(open) = self.open.as_ref() else {
            return;
        };
        let session = open.session;
        let conversation_id = open.conversation.id().to_string();
        let uri_for_call = local_uri.clone();
        self.spawn_api(
            move |api| async move {
                api.upload_attachment(&conversation_id, &uri_for_call)
                    .await
            },
            move |result| InternalEvent::UploadResult {
                session,
                local_uri,
                result,
            },
        );
    }

    pub(super) fn handle_upload_result(
        &mut self,
        session: u64,
        local_uri: String,
        result: Result<String, ApiError>,
    ) {
        let Some(open) = self.open_for(session) else {
            return;
        };
        // Slots removed while uploading ignore their late result.
        let changed = match result {
            Ok(url) => open.conversation.attachment_uploaded(&local_uri, url),
            Err(e) => {
                tracing::warn!(err = %e, "attachment upload failed");
                open.conversation
                    .attachment_failed(&local_uri, e.user_message())
            }
        };
        if changed {
            self.emit_state();
        }
    }

    pub(super) fn send_message(&mut self) {
        let Some(open) = self.open.as_mut() else {
            return;
        };
        if !open.conversation.is_ready() {
            tracing::debug!("send ignored until the conversation has loaded");
            return;
        }
        match open.conversation.begin_send(Utc::now()) {
            Ok(outgoing) => {
                self.submit(outgoing);
                self.emit_state();
            }
            Err(SendBlocked::Empty) => {}
            Err(blocked) => tracing::debug!(?blocked, "send blocked"),
        }
    }

    pub(super) fn retry_message(&mut self, failed_id: &MessageId) {
        let Some(open) = self.open.as_mut() else {
            return;
        };
        let Some(outgoing) = open.conversation.retry_send(failed_id, Utc::now()) else {
            return;
        };
        self.submit(outgoing);
        self.emit_state();
    }

    pub(super) fn discard_message(&mut self, failed_id: &MessageId) {
        let Some(open) = self.open.as_mut() else {
            return;
        };
        if open.conversation.discard_failed(failed_id) {
            self.emit_state();
        }
    }

    fn submit(&self, outgoing: OutgoingMessage) {
        let Some(open) = self.open.as_ref() else {
            return;
        };
        let session = open.session;
        let conversation_id = open.conversation.id().to_string();
        let local_id = outgoing.local_id.clone();
        tracing::info!(conversation_id = %conversation_id, local_id = %local_id, "send");
        self.spawn_api(
            move |api| async move { api.send_message(&conversation_id, &outgoing).await },
            move |result| InternalEvent::SendResult {
                session,
                local_id,
                result,
            },
        );
    }

    pub(super) fn handle_send_result(
        &mut self,
        session: u64,
        local_id: MessageId,
        result: Result<Message, ApiError>,
    ) {
        let Some(open) = self.open_for(session) else {
            return;
        };
        match result {
            Ok(server) => {
                let server_id = server.id.clone();
                let outcome = open.conversation.confirm_send(&local_id, server);
                tracing::info!(
                    local_id = %local_id,
                    server_id = %server_id,
                    ?outcome,
                    "send confirmed"
                );
            }
            Err(e) => {
                tracing::warn!(local_id = %local_id, err = %e, "send failed");
                open.conversation.fail_send(&local_id, e.user_message());
            }
        }
        self.emit_state();
    }

    pub(super) fn toggle_reaction(&mut self, message_id: &MessageId, emoji: &str) {
        let Some(open) = self.open.as_mut() else {
            return;
        };
        let session = open.session;
        let conversation_id = open.conversation.id().to_string();
        let Some(delta) = open.conversation.toggle_reaction(message_id, emoji) else {
            tracing::debug!(message_id = %message_id, "reaction target not reactable");
            return;
        };
        let server_message_id = delta.message_id.key();
        let emoji = delta.emoji.clone();
        let delta_for_result = delta.clone();
        self.spawn_api(
            move |api| async move {
                api.toggle_reaction(&conversation_id, &server_message_id, &emoji)
                    .await
            },
            move |result| InternalEvent::ReactionResult {
                session,
                delta: delta_for_result,
                result,
            },
        );
        tracing::debug!(
            message_id = %delta.message_id,
            action = delta.action.as_str(),
            "reaction toggled"
        );
        self.emit_state();
    }

    pub(super) fn handle_reaction_result(
        &mut self,
        session: u64,
        delta: AppliedDelta,
        result: Result<ReactionAction, ApiError>,
    ) {
        let Some(open) = self.open_for(session) else {
            return;
        };
        let answered = match result {
            Ok(action) => Ok(action),
            // The server holds the other state than we guessed.
            Err(ApiError::Conflict(reason)) => {
                tracing::debug!(message_id = %delta.message_id, reason = %reason, "reaction conflict");
                Ok(delta.action.opposite())
            }
            Err(e) => Err(e),
        };
        match answered {
            Ok(action) => match open.conversation.reaction_result(&delta, action) {
                ServerOutcome::Corrected => self.emit_state(),
                ServerOutcome::Consistent | ServerOutcome::Deferred => {}
            },
            Err(e) => {
                tracing::warn!(message_id = %delta.message_id, err = %e, "reaction failed");
                open.conversation.reaction_failed(&delta);
                self.toast("Couldn't update reaction");
            }
        }
    }

    pub(super) fn jump_to_message(&mut self, message_id: &MessageId) {
        let Some(open) = self.open.as_mut() else {
            return;
        };
        let session = open.session;
        let target = open.conversation.timeline().canonical_id(message_id);
        let (index, token) = open.conversation.jump_to(&target);
        let duration = open.conversation.highlight_duration();
        self.schedule_highlight_expiry(session, token, duration);
        self.emit_state();
        self.emit_jump(target.key(), index.and_then(|i| u32::try_from(i).ok()));
    }

    fn schedule_highlight_expiry(&self, session: u64, token: u64, after: Duration) {
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::HighlightExpired { session, token },
            )));
        });
    }
}
