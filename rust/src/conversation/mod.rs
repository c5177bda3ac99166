//! Per-conversation synchronization engine.
//!
//! A [`Conversation`] is created when a conversation screen opens and dropped when it closes.
//! It owns the timeline and the derived state that annotates it (reactions, read markers,
//! reply highlight, paging, in-flight sends). Nothing here performs I/O; the actor in
//! `core` feeds it request results and realtime events.

pub mod message;
pub mod pagination;
pub mod projection;
pub mod reactions;
pub mod receipts;
pub mod reply;
pub mod send;
pub mod timeline;

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::realtime::RealtimeEvent;
use crate::state::LoadState;

use message::{Message, MessageId, ReplyRef, ReplySnippet};
use pagination::PaginationCursor;
use reactions::{AppliedDelta, ReactionAction, ReactionAggregator, RemoteOutcome, ServerOutcome};
use receipts::ReadReceiptTracker;
use reply::ReplyResolver;
use send::{OutgoingMessage, SendBlocked, SendCoordinator};
use timeline::{Reconciled, RemoteInsert, TimelineStore};

/// One page of history as returned by the server.
#[derive(Clone, Debug, Default)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub has_more: bool,
    pub peer_last_read_at: Option<DateTime<Utc>>,
    pub self_last_read_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RealtimeEffect {
    Unchanged,
    Changed,
    /// A new message from the peer landed while the conversation is open.
    PeerMessage,
}

#[derive(Debug)]
pub struct Conversation {
    conversation_id: String,
    current_user_id: String,
    peer_id: Option<String>,
    load_state: LoadState,
    older_load_error: Option<String>,
    timeline: TimelineStore,
    reactions: ReactionAggregator,
    receipts: ReadReceiptTracker,
    replies: ReplyResolver,
    cursor: PaginationCursor,
    sends: SendCoordinator,
}

impl Conversation {
    pub fn new(
        conversation_id: impl Into<String>,
        current_user_id: impl Into<String>,
        peer_id: Option<String>,
        page_size: u32,
        highlight_duration: Duration,
    ) -> Self {
        let conversation_id = conversation_id.into();
        let current_user_id = current_user_id.into();
        Self {
            timeline: TimelineStore::new(current_user_id.clone()),
            reactions: ReactionAggregator::new(current_user_id.clone()),
            receipts: ReadReceiptTracker::new(current_user_id.clone()),
            replies: ReplyResolver::new(highlight_duration),
            cursor: PaginationCursor::new(page_size),
            sends: SendCoordinator::new(conversation_id.clone(), current_user_id.clone()),
            conversation_id,
            current_user_id,
            peer_id,
            load_state: LoadState::Loading,
            older_load_error: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.conversation_id
    }

    pub fn current_user_id(&self) -> &str {
        &self.current_user_id
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load_state
    }

    pub fn is_ready(&self) -> bool {
        self.load_state == LoadState::Ready
    }

    pub fn timeline(&self) -> &TimelineStore {
        &self.timeline
    }

    pub fn receipts(&self) -> &ReadReceiptTracker {
        &self.receipts
    }

    pub fn cursor(&self) -> &PaginationCursor {
        &self.cursor
    }

    pub fn sends(&self) -> &SendCoordinator {
        &self.sends
    }

    pub fn page_size(&self) -> u32 {
        self.cursor.page_size()
    }

    pub fn highlight_duration(&self) -> Duration {
        self.replies.highlight_duration()
    }

    // ---- history ----

    /// Start (or restart after failure) the initial load. Returns the offset to fetch.
    pub fn begin_initial_load(&mut self) -> Option<usize> {
        self.load_state = LoadState::Loading;
        self.cursor.reset();
        self.cursor.begin_load()
    }

    pub fn apply_initial_page(&mut self, page: MessagePage, now: DateTime<Utc>) {
        let received = page.messages.len();
        // Realtime inserts that landed while the page was in flight survive the reseed.
        let arrived_early = self.timeline.all();
        self.timeline.seed(page.messages);
        for m in arrived_early {
            self.timeline.insert_remote(m);
        }
        self.cursor.record_page(received, page.has_more);
        self.apply_read_markers(page.peer_last_read_at, page.self_last_read_at);
        self.receipts.record_self_read(now);
        self.load_state = LoadState::Ready;
    }

    pub fn fail_initial_load(&mut self, reason: impl Into<String>) {
        self.cursor.fail_load();
        self.load_state = LoadState::Failed {
            reason: reason.into(),
        };
    }

    /// Claim the next older page. Refused until the initial load is done, when history is
    /// exhausted, or while another page is loading.
    pub fn begin_older_load(&mut self) -> Option<usize> {
        if !self.is_ready() {
            return None;
        }
        let offset = self.cursor.begin_load()?;
        self.older_load_error = None;
        Some(offset)
    }

    pub fn apply_older_page(&mut self, page: MessagePage) -> usize {
        let received = page.messages.len();
        let added = self.timeline.prepend_older(page.messages);
        self.cursor.record_page(received, page.has_more);
        self.apply_read_markers(page.peer_last_read_at, page.self_last_read_at);
        added
    }

    pub fn fail_older_load(&mut self, reason: impl Into<String>) {
        self.cursor.fail_load();
        self.older_load_error = Some(reason.into());
    }

    /// Merge a re-fetched newest page without disturbing what is already shown.
    pub fn apply_refresh(&mut self, page: MessagePage) -> usize {
        let mut added = 0;
        for m in page.messages {
            match self.timeline.insert_remote(m) {
                RemoteInsert::Inserted | RemoteInsert::Adopted { .. } => {
                    self.cursor.note_head_insert();
                    added += 1;
                }
                RemoteInsert::Duplicate => {}
            }
        }
        self.apply_read_markers(page.peer_last_read_at, page.self_last_read_at);
        added
    }

    fn apply_read_markers(&mut self, peer: Option<DateTime<Utc>>, own: Option<DateTime<Utc>>) {
        if let Some(at) = peer {
            self.receipts.record_peer_read(at);
        }
        if let Some(at) = own {
            self.receipts.record_self_read(at);
        }
    }

    // ---- realtime ----

    pub fn apply_realtime(&mut self, event: RealtimeEvent, now: DateTime<Utc>) -> RealtimeEffect {
        match event {
            RealtimeEvent::MessageInserted { message } => {
                if message.conversation_id != self.conversation_id {
                    return RealtimeEffect::Unchanged;
                }
                let from_peer = message.sender_id != self.current_user_id;
                // Before the first page lands the offset is still unknown; undercounting
                // only costs a duplicate row later, overcounting would skip one.
                let counted = self.is_ready();
                match self.timeline.insert_remote(message) {
                    RemoteInsert::Duplicate => RealtimeEffect::Unchanged,
                    RemoteInsert::Adopted { .. } => {
                        if counted {
                            self.cursor.note_head_insert();
                        }
                        RealtimeEffect::Changed
                    }
                    RemoteInsert::Inserted => {
                        if counted {
                            self.cursor.note_head_insert();
                        }
                        if from_peer {
                            self.receipts.record_self_read(now);
                            RealtimeEffect::PeerMessage
                        } else {
                            RealtimeEffect::Changed
                        }
                    }
                }
            }
            RealtimeEvent::ReactionChanged {
                message_id,
                emoji,
                actor_id,
                action,
            } => match self.reactions.apply_remote_delta(
                &mut self.timeline,
                &message_id,
                &emoji,
                &actor_id,
                action,
            ) {
                RemoteOutcome::Applied => RealtimeEffect::Changed,
                RemoteOutcome::SelfEcho | RemoteOutcome::Ignored => RealtimeEffect::Unchanged,
            },
        }
    }

    pub fn record_self_read(&mut self, at: DateTime<Utc>) {
        self.receipts.record_self_read(at);
    }

    // ---- composer and sends ----

    pub fn update_draft(&mut self, text: &str) {
        self.sends.set_text(text);
    }

    /// Quote a loaded, confirmed message in the next send.
    pub fn set_reply_target(&mut self, id: &MessageId) -> bool {
        let Some(target) = self.timeline.get(id) else {
            return false;
        };
        if target.id.is_local() {
            return false;
        }
        let reply = ReplyRef {
            id: target.id.clone(),
            snippet: Some(ReplySnippet {
                sender_id: target.sender_id.clone(),
                text: target.preview_text(),
            }),
        };
        self.sends.set_reply_to(Some(reply));
        true
    }

    pub fn clear_reply_target(&mut self) {
        self.sends.set_reply_to(None);
    }

    pub fn add_attachment(&mut self, local_uri: &str) -> bool {
        self.sends.add_attachment(local_uri)
    }

    pub fn attachment_uploaded(&mut self, local_uri: &str, url: String) -> bool {
        self.sends.attachment_uploaded(local_uri, url)
    }

    pub fn attachment_failed(&mut self, local_uri: &str, reason: impl Into<String>) -> bool {
        self.sends.attachment_failed(local_uri, reason)
    }

    pub fn retry_attachment(&mut self, local_uri: &str) -> bool {
        self.sends.retry_attachment(local_uri)
    }

    pub fn remove_attachment(&mut self, local_uri: &str) -> bool {
        self.sends.remove_attachment(local_uri)
    }

    pub fn begin_send(&mut self, now: DateTime<Utc>) -> Result<OutgoingMessage, SendBlocked> {
        self.sends.begin_send(&mut self.timeline, now)
    }

    pub fn confirm_send(&mut self, local_id: &MessageId, server: Message) -> Reconciled {
        let outcome = self.sends.confirm(&mut self.timeline, local_id, server);
        if matches!(outcome, Reconciled::Replaced | Reconciled::Inserted) {
            // A realtime copy would already have counted the new head row.
            self.cursor.note_head_insert();
        }
        outcome
    }

    pub fn fail_send(&mut self, local_id: &MessageId, reason: impl Into<String>) -> bool {
        self.sends.fail(&mut self.timeline, local_id, reason)
    }

    pub fn retry_send(&mut self, failed_id: &MessageId, now: DateTime<Utc>) -> Option<OutgoingMessage> {
        self.sends.retry(&mut self.timeline, failed_id, now)
    }

    pub fn discard_failed(&mut self, failed_id: &MessageId) -> bool {
        self.sends.discard(&mut self.timeline, failed_id)
    }

    // ---- reactions ----

    pub fn toggle_reaction(&mut self, id: &MessageId, emoji: &str) -> Option<AppliedDelta> {
        let id = self.timeline.canonical_id(id);
        self.reactions
            .apply_local_toggle(&mut self.timeline, &id, emoji)
    }

    pub fn reaction_result(&mut self, delta: &AppliedDelta, action: ReactionAction) -> ServerOutcome {
        self.reactions
            .reconcile_server_result(&mut self.timeline, delta, action)
    }

    pub fn reaction_failed(&mut self, delta: &AppliedDelta) -> bool {
        self.reactions.revert_local_toggle(&mut self.timeline, delta)
    }

    // ---- replies ----

    /// Locate a message for "jump to original" and start its highlight. Returns the display
    /// index (if paged in) and the highlight token for the expiry timer.
    pub fn jump_to(&mut self, id: &MessageId) -> (Option<usize>, u64) {
        let target = self.timeline.canonical_id(id);
        let index = self.replies.locate(&self.timeline, &target);
        let token = self.replies.begin_highlight(target);
        (index, token)
    }

    pub fn expire_highlight(&mut self, token: u64) -> bool {
        self.replies.expire_highlight(token)
    }
}
