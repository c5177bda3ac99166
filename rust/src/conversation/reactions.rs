// Optimistic reaction toggles reconciled against server responses and realtime deltas.

use std::collections::{HashMap, VecDeque};

use super::message::{MessageId, Reactions};
use super::timeline::TimelineStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReactionAction {
    Added,
    Removed,
}

impl ReactionAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "added" | "add" | "INSERT" => Some(Self::Added),
            "removed" | "remove" | "DELETE" => Some(Self::Removed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Added => Self::Removed,
            Self::Removed => Self::Added,
        }
    }

    fn holds(self) -> bool {
        matches!(self, Self::Added)
    }
}

/// What a local tap did to the timeline. `ticket` ties the server response back to this tap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedDelta {
    pub ticket: u64,
    pub message_id: MessageId,
    pub emoji: String,
    pub action: ReactionAction,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerOutcome {
    Consistent,
    Corrected,
    /// Newer taps on the same emoji are still in flight; their answers decide.
    Deferred,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteOutcome {
    Applied,
    SelfEcho,
    Ignored,
}

#[derive(Clone, Debug)]
struct Expectation {
    ticket: u64,
    // Our guess until the server answers, then the server's action.
    action: ReactionAction,
    answered: bool,
    echoed: bool,
}

type ReactionKey = (MessageId, String);

/// Taps on one (message, emoji) whose outcome is not settled yet.
#[derive(Clone, Debug)]
struct Window {
    // Whether we held the reaction before the first tap of the window.
    baseline: bool,
    // Highest-ticket server answer so far; answers can arrive out of tap order.
    latest: Option<(u64, ReactionAction)>,
}

#[derive(Debug)]
pub struct ReactionAggregator {
    current_user_id: String,
    next_ticket: u64,
    // Own toggles whose server answer and/or realtime echo are still outstanding, in tap order.
    outstanding: HashMap<ReactionKey, VecDeque<Expectation>>,
    windows: HashMap<ReactionKey, Window>,
}

impl ReactionAggregator {
    pub fn new(current_user_id: impl Into<String>) -> Self {
        Self {
            current_user_id: current_user_id.into(),
            next_ticket: 0,
            outstanding: HashMap::new(),
            windows: HashMap::new(),
        }
    }

    /// Flip the current user's reaction. Pending (local-id) messages cannot be reacted to.
    pub fn apply_local_toggle(
        &mut self,
        store: &mut TimelineStore,
        message_id: &MessageId,
        emoji: &str,
    ) -> Option<AppliedDelta> {
        if message_id.is_local() {
            return None;
        }
        let msg = store.get_mut(message_id)?;
        let held = msg.reactions.reacted_by_me(emoji);
        let action = if held {
            ReactionAction::Removed
        } else {
            ReactionAction::Added
        };
        align_mine(&mut msg.reactions, emoji, action.holds());

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let key = (message_id.clone(), emoji.to_string());
        self.windows.entry(key.clone()).or_insert(Window {
            baseline: held,
            latest: None,
        });
        self.outstanding
            .entry(key)
            .or_default()
            .push_back(Expectation {
                ticket,
                action,
                answered: false,
                echoed: false,
            });

        Some(AppliedDelta {
            ticket,
            message_id: message_id.clone(),
            emoji: emoji.to_string(),
            action,
        })
    }

    /// Fold the server's answer to one tap into local state. Once every tap in flight is
    /// resolved, local state follows the answer to the newest tap.
    pub fn reconcile_server_result(
        &mut self,
        store: &mut TimelineStore,
        delta: &AppliedDelta,
        server_action: ReactionAction,
    ) -> ServerOutcome {
        let key = (delta.message_id.clone(), delta.emoji.clone());
        if let Some(queue) = self.outstanding.get_mut(&key) {
            if let Some(pos) = queue.iter().position(|e| e.ticket == delta.ticket) {
                queue[pos].action = server_action;
                queue[pos].answered = true;
                if queue[pos].echoed {
                    queue.remove(pos);
                }
            }
            if queue.is_empty() {
                self.outstanding.remove(&key);
            }
        }
        self.record_answer(&key, delta.ticket, server_action);
        if self.unanswered(&key) {
            return ServerOutcome::Deferred;
        }

        match self.settle(store, &key) {
            Some(action) => {
                tracing::debug!(
                    message_id = %delta.message_id,
                    action = action.as_str(),
                    "reaction corrected to server result"
                );
                ServerOutcome::Corrected
            }
            None => ServerOutcome::Consistent,
        }
    }

    /// The toggle request never completed. Its optimistic change is undone once no other tap on
    /// the same emoji is still waiting for an answer.
    pub fn revert_local_toggle(&mut self, store: &mut TimelineStore, delta: &AppliedDelta) -> bool {
        let key = (delta.message_id.clone(), delta.emoji.clone());
        let mut went_through = None;
        if let Some(queue) = self.outstanding.get_mut(&key) {
            if let Some(pos) = queue.iter().position(|e| e.ticket == delta.ticket) {
                // The realtime echo shows the server applied it anyway.
                went_through = queue.remove(pos).filter(|e| e.echoed).map(|e| e.action);
            }
            if queue.is_empty() {
                self.outstanding.remove(&key);
            }
        }
        if let Some(action) = went_through {
            self.record_answer(&key, delta.ticket, action);
        }
        if self.unanswered(&key) {
            return false;
        }
        self.settle(store, &key).is_some()
    }

    fn record_answer(&mut self, key: &ReactionKey, ticket: u64, action: ReactionAction) {
        if let Some(window) = self.windows.get_mut(key) {
            if window.latest.map_or(true, |(newest, _)| ticket > newest) {
                window.latest = Some((ticket, action));
            }
        }
    }

    fn unanswered(&self, key: &ReactionKey) -> bool {
        self.outstanding
            .get(key)
            .is_some_and(|queue| queue.iter().any(|e| !e.answered))
    }

    /// Close the window for `key`: the newest answer wins, or the pre-tap state when no tap
    /// reached the server. Returns the action applied if local state changed.
    fn settle(&mut self, store: &mut TimelineStore, key: &ReactionKey) -> Option<ReactionAction> {
        let window = self.windows.remove(key)?;
        let want = match window.latest {
            Some((_, action)) => action.holds(),
            None => window.baseline,
        };
        let msg = store.get_mut(&key.0)?;
        if align_mine(&mut msg.reactions, &key.1, want) {
            Some(if want {
                ReactionAction::Added
            } else {
                ReactionAction::Removed
            })
        } else {
            None
        }
    }

    /// Apply a realtime reaction change. Echoes of our own taps are recognized and skipped.
    pub fn apply_remote_delta(
        &mut self,
        store: &mut TimelineStore,
        message_id: &MessageId,
        emoji: &str,
        actor_id: &str,
        action: ReactionAction,
    ) -> RemoteOutcome {
        if !store.contains(message_id) {
            return RemoteOutcome::Ignored;
        }

        if actor_id == self.current_user_id {
            let key = (message_id.clone(), emoji.to_string());
            let mut matched = None;
            if let Some(queue) = self.outstanding.get_mut(&key) {
                if let Some(pos) = queue.iter().position(|e| !e.echoed) {
                    matched = Some(queue[pos].action);
                    queue[pos].echoed = true;
                    if !queue[pos].answered {
                        queue[pos].action = action;
                    }
                    if queue[pos].answered {
                        queue.remove(pos);
                    }
                }
                if queue.is_empty() {
                    self.outstanding.remove(&key);
                }
            }
            if matched == Some(action) {
                return RemoteOutcome::SelfEcho;
            }
            let Some(msg) = store.get_mut(message_id) else {
                return RemoteOutcome::Ignored;
            };
            return if align_mine(&mut msg.reactions, emoji, action.holds()) {
                RemoteOutcome::Applied
            } else {
                RemoteOutcome::Ignored
            };
        }

        let Some(msg) = store.get_mut(message_id) else {
            return RemoteOutcome::Ignored;
        };
        match action {
            ReactionAction::Added => msg.reactions.increment(emoji, false),
            ReactionAction::Removed => {
                if msg.reactions.get(emoji).is_none() {
                    return RemoteOutcome::Ignored;
                }
                msg.reactions.decrement(emoji, false);
            }
        }
        RemoteOutcome::Applied
    }

}

/// Make the current user's reaction present or absent, adjusting the count once.
fn align_mine(reactions: &mut Reactions, emoji: &str, want: bool) -> bool {
    match (reactions.reacted_by_me(emoji), want) {
        (false, true) => {
            reactions.increment(emoji, true);
            true
        }
        (true, false) => {
            reactions.decrement(emoji, true);
            true
        }
        _ => false,
    }
}
