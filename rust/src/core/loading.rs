// Conversation lifecycle: open/close, history pages, refresh, read markers, realtime.

use crate::conversation::{MessagePage, RealtimeEffect};
use crate::realtime::{decode_change, RealtimeChange, RealtimeDecodeError};

use super::*;

impl AppCore {
    pub(super) fn open_conversation(&mut self, conversation_id: String, peer_id: Option<String>) {
        if self
            .open
            .as_ref()
            .is_some_and(|o| o.conversation.id() == conversation_id)
        {
            return;
        }
        // Dropping the previous screen's state also closes its realtime channel.
        self.open = None;

        self.last_session += 1;
        let session = self.last_session;
        let mut conversation = Conversation::new(
            conversation_id.clone(),
            self.state.current_user_id.clone(),
            peer_id,
            self.config.page_size(),
            self.config.highlight_duration(),
        );
        let offset = conversation.begin_initial_load();
        let subscription = Subscription::open(&self.realtime, &conversation_id);
        tracing::info!(conversation_id = %conversation_id, session, "open conversation");

        self.open = Some(OpenConversation {
            session,
            conversation,
            subscription,
            refresh_in_flight: false,
        });
        if let Some(offset) = offset {
            self.request_page(PageKind::Initial, offset);
        }
        self.emit_state();
    }

    pub(super) fn close_conversation(&mut self) {
        if let Some(open) = self.open.take() {
            tracing::info!(
                conversation_id = %open.conversation.id(),
                session = open.session,
                "close conversation"
            );
            self.emit_state();
        }
    }

    pub(super) fn retry_load(&mut self) {
        let Some(open) = self.open.as_mut() else {
            return;
        };
        if !matches!(open.conversation.load_state(), LoadState::Failed { .. }) {
            return;
        }
        if let Some(offset) = open.conversation.begin_initial_load() {
            self.request_page(PageKind::Initial, offset);
        }
        self.emit_state();
    }

    pub(super) fn refresh_conversation(&mut self) {
        let Some(open) = self.open.as_mut() else {
            return;
        };
        if !open.conversation.is_ready() || open.refresh_in_flight {
            return;
        }
        open.refresh_in_flight = true;
        self.request_page(PageKind::Refresh, 0);
    }

    pub(super) fn load_older(&mut self) {
        let Some(open) = self.open.as_mut() else {
            return;
        };
        let Some(offset) = open.conversation.begin_older_load() else {
            return;
        };
        self.request_page(PageKind::Older, offset);
        self.emit_state();
    }

    pub(super) fn mark_read(&mut self) {
        let Some(open) = self.open.as_mut() else {
            return;
        };
        if !open.conversation.is_ready() {
            return;
        }
        open.conversation.record_self_read(Utc::now());
        self.send_mark_read();
        self.emit_state();
    }

    fn request_page(&self, kind: PageKind, offset: usize) {
        let Some(open) = self.open.as_ref() else {
            return;
        };
        let session = open.session;
        let conversation_id = open.conversation.id().to_string();
        let limit = open.conversation.page_size();
        tracing::debug!(conversation_id = %conversation_id, ?kind, offset, "fetch page");
        self.spawn_api(
            move |api| async move { api.fetch_messages(&conversation_id, limit, offset).await },
            move |result| InternalEvent::PageLoaded {
                session,
                kind,
                result,
            },
        );
    }

    fn send_mark_read(&self) {
        let Some(open) = self.open.as_ref() else {
            return;
        };
        let session = open.session;
        let conversation_id = open.conversation.id().to_string();
        self.spawn_api(
            move |api| async move { api.mark_read(&conversation_id).await },
            move |result| InternalEvent::MarkReadResult { session, result },
        );
    }

    pub(super) fn handle_page_loaded(
        &mut self,
        session: u64,
        kind: PageKind,
        result: Result<MessagePage, ApiError>,
    ) {
        let now = Utc::now();
        let Some(open) = self.open_for(session) else {
            return;
        };
        let conversation_id = open.conversation.id().to_string();
        match (kind, result) {
            (PageKind::Initial, Ok(page)) => {
                let count = page.messages.len();
                open.conversation.apply_initial_page(page, now);
                tracing::info!(conversation_id = %conversation_id, count, "initial page loaded");
                self.send_mark_read();
            }
            (PageKind::Initial, Err(e)) => {
                tracing::warn!(conversation_id = %conversation_id, err = %e, "initial load failed");
                open.conversation.fail_initial_load(e.user_message());
            }
            (PageKind::Older, Ok(page)) => {
                let added = open.conversation.apply_older_page(page);
                tracing::debug!(conversation_id = %conversation_id, added, "older page loaded");
            }
            (PageKind::Older, Err(e)) => {
                tracing::warn!(conversation_id = %conversation_id, err = %e, "older page failed");
                open.conversation.fail_older_load(e.user_message());
            }
            (PageKind::Refresh, Ok(page)) => {
                open.refresh_in_flight = false;
                let added = open.conversation.apply_refresh(page);
                tracing::debug!(conversation_id = %conversation_id, added, "refreshed");
            }
            (PageKind::Refresh, Err(e)) => {
                open.refresh_in_flight = false;
                tracing::warn!(conversation_id = %conversation_id, err = %e, "refresh failed");
                return;
            }
        }
        self.emit_state();
    }

    pub(super) fn handle_mark_read_result(&mut self, session: u64, result: Result<(), ApiError>) {
        if self.open_for(session).is_none() {
            return;
        }
        if let Err(e) = result {
            tracing::warn!(err = %e, "mark read failed");
            self.toast("Couldn't mark conversation as read");
        }
    }

    pub(super) fn handle_realtime_change(&mut self, change: RealtimeChange) {
        let Some(open) = self.open.as_mut() else {
            return;
        };
        if !open.subscription.accepts(&change.conversation_id) {
            tracing::debug!(
                conversation_id = %change.conversation_id,
                "realtime change for a closed channel"
            );
            return;
        }
        let event = match decode_change(&change, open.conversation.id()) {
            Ok(event) => event,
            Err(RealtimeDecodeError::OtherConversation(other)) => {
                tracing::debug!(other = %other, "realtime row for another conversation");
                return;
            }
            Err(e) => {
                tracing::warn!(table = %change.table, err = %e, "dropping realtime change");
                return;
            }
        };
        match open.conversation.apply_realtime(event, Utc::now()) {
            RealtimeEffect::Unchanged => {}
            RealtimeEffect::Changed => self.emit_state(),
            RealtimeEffect::PeerMessage => {
                self.send_mark_read();
                self.emit_state();
            }
        }
    }
}
