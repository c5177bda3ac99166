// Ordered, deduplicated message timeline for one conversation.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use super::message::{Message, MessageId, MessageState};

/// Position of an entry in the timeline. Iteration runs newest-first, so the largest key is
/// displayed on top.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct OrderKey {
    at: DateTime<Utc>,
    // Set for messages this client sent; they sort after anything else sharing `at`.
    send_seq: Option<u64>,
    id: MessageId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteInsert {
    Inserted,
    Duplicate,
    /// The realtime copy of one of our own pending sends took over its slot.
    Adopted { local_id: MessageId },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reconciled {
    /// Pending entry swapped for the server record.
    Replaced,
    /// Pending entry and an already-present server copy collapsed into one entry.
    Merged,
    /// A realtime echo already replaced the pending entry; its fields were refreshed.
    AlreadyAdopted,
    /// No pending entry was left; the server record was inserted like a remote one.
    Inserted,
}

#[derive(Debug)]
pub struct TimelineStore {
    current_user_id: String,
    entries: BTreeMap<OrderKey, Message>,
    index: HashMap<MessageId, OrderKey>,
    // local id -> server id, for pending entries whose server copy is already in place
    adopted: HashMap<MessageId, MessageId>,
    send_seq: u64,
}

impl TimelineStore {
    pub fn new(current_user_id: impl Into<String>) -> Self {
        Self {
            current_user_id: current_user_id.into(),
            entries: BTreeMap::new(),
            index: HashMap::new(),
            adopted: HashMap::new(),
            send_seq: 0,
        }
    }

    pub fn current_user_id(&self) -> &str {
        &self.current_user_id
    }

    /// Replace the whole timeline (initial load).
    pub fn seed(&mut self, messages: Vec<Message>) {
        self.entries.clear();
        self.index.clear();
        self.adopted.clear();
        for m in messages {
            self.insert_plain(m);
        }
    }

    /// Merge a page of older history. Returns how many entries were new.
    pub fn prepend_older(&mut self, messages: Vec<Message>) -> usize {
        let mut added = 0;
        for m in messages {
            if self.insert_plain(m) {
                added += 1;
            }
        }
        added
    }

    pub fn insert_remote(&mut self, message: Message) -> RemoteInsert {
        if self.index.contains_key(&message.id) {
            return RemoteInsert::Duplicate;
        }
        if message.sender_id == self.current_user_id {
            if let Some(local_key) = self.oldest_pending_like(&message) {
                let pending = self.remove_key(&local_key);
                let key = OrderKey {
                    at: message.created_at.max(local_key.at),
                    send_seq: local_key.send_seq,
                    id: message.id.clone(),
                };
                self.adopted
                    .insert(local_key.id.clone(), message.id.clone());
                let merged = match pending {
                    Some(p) => with_local_context(message, &p),
                    None => message,
                };
                self.insert_at(key, merged);
                return RemoteInsert::Adopted {
                    local_id: local_key.id,
                };
            }
        }
        let at = message.created_at;
        self.insert_plain(message);
        self.unpin_through(at);
        RemoteInsert::Inserted
    }

    /// Insert a provisional message at the newest position. Refuses anything that is not a
    /// pending message with a local id, or an id already present.
    pub fn insert_optimistic(&mut self, message: Message) -> bool {
        if !message.state.is_pending()
            || !message.id.is_local()
            || self.index.contains_key(&message.id)
        {
            return false;
        }
        self.send_seq += 1;
        let at = match self.newest_at() {
            Some(newest) if newest > message.created_at => newest,
            _ => message.created_at,
        };
        let key = OrderKey {
            at,
            send_seq: Some(self.send_seq),
            id: message.id.clone(),
        };
        self.insert_at(key, message);
        true
    }

    pub fn reconcile(&mut self, local_id: &MessageId, server: Message) -> Reconciled {
        let existing_server_key = self.index.get(&server.id).cloned();

        if let Some(local_key) = self.index.get(local_id).cloned() {
            let pending = self.remove_key(&local_key);
            let mut at = server.created_at.max(local_key.at);
            let mut outcome = Reconciled::Replaced;
            let mut live_reactions = None;
            if let Some(existing_key) = existing_server_key {
                at = at.max(existing_key.at);
                live_reactions = self.remove_key(&existing_key).map(|m| m.reactions);
                outcome = Reconciled::Merged;
            }
            let mut merged = match pending {
                Some(p) => with_local_context(server, &p),
                None => server,
            };
            if merged.reactions.is_empty() {
                if let Some(r) = live_reactions {
                    merged.reactions = r;
                }
            }
            self.adopted.insert(local_id.clone(), merged.id.clone());
            let key = OrderKey {
                at,
                send_seq: local_key.send_seq,
                id: merged.id.clone(),
            };
            self.insert_at(key, merged);
            return outcome;
        }

        if let Some(existing_key) = existing_server_key {
            if let Some(entry) = self.entries.get_mut(&existing_key) {
                entry.created_at = server.created_at;
                entry.text = server.text;
                entry.attachment_urls = server.attachment_urls;
                if server.reply_to.is_some() {
                    entry.reply_to = server.reply_to;
                }
                if !server.reactions.is_empty() {
                    entry.reactions = server.reactions;
                }
                entry.state = MessageState::Confirmed;
            }
            self.adopted.insert(local_id.clone(), existing_key.id);
            return Reconciled::AlreadyAdopted;
        }

        self.insert_plain(server);
        Reconciled::Inserted
    }

    /// Flip a pending entry to failed. No-op when the entry is gone or no longer pending
    /// (a realtime echo may already have confirmed it).
    pub fn mark_failed(&mut self, local_id: &MessageId, reason: impl Into<String>) -> bool {
        let Some(key) = self.index.get(local_id) else {
            return false;
        };
        match self.entries.get_mut(key) {
            Some(entry) if entry.state.is_pending() => {
                entry.state = MessageState::Failed {
                    reason: reason.into(),
                };
                true
            }
            _ => false,
        }
    }

    /// Remove a failed entry. Confirmed and pending entries stay.
    pub fn remove_failed(&mut self, id: &MessageId) -> Option<Message> {
        let key = self.index.get(id).cloned()?;
        if !self.entries.get(&key)?.state.is_failed() {
            return None;
        }
        self.remove_key(&key)
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.index.get(id).and_then(|k| self.entries.get(k))
    }

    pub(crate) fn get_mut(&mut self, id: &MessageId) -> Option<&mut Message> {
        let key = self.index.get(id)?;
        self.entries.get_mut(key)
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.index.contains_key(id)
    }

    /// Follow a local id to its confirmed replacement.
    pub fn canonical_id(&self, id: &MessageId) -> MessageId {
        match self.adopted.get(id) {
            Some(server) if !self.index.contains_key(id) => server.clone(),
            _ => id.clone(),
        }
    }

    /// Display order, most recent first.
    pub fn iter(&self) -> impl Iterator<Item = &Message> + '_ {
        self.entries.values().rev()
    }

    pub fn all(&self) -> Vec<Message> {
        self.iter().cloned().collect()
    }

    pub fn position(&self, id: &MessageId) -> Option<usize> {
        self.iter().position(|m| &m.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn newest_at(&self) -> Option<DateTime<Utc>> {
        self.entries.keys().next_back().map(|k| k.at)
    }

    fn insert_plain(&mut self, message: Message) -> bool {
        if self.index.contains_key(&message.id) {
            return false;
        }
        let key = OrderKey {
            at: message.created_at,
            send_seq: None,
            id: message.id.clone(),
        };
        self.insert_at(key, message);
        true
    }

    fn insert_at(&mut self, key: OrderKey, message: Message) {
        self.index.insert(message.id.clone(), key.clone());
        self.entries.insert(key, message);
    }

    fn remove_key(&mut self, key: &OrderKey) -> Option<Message> {
        self.index.remove(&key.id);
        self.entries.remove(key)
    }

    /// Confirmed own sends ride at the head only until the server has something at least as
    /// new; from then on they sort by their server timestamp.
    fn unpin_through(&mut self, at: DateTime<Utc>) {
        let settled: Vec<OrderKey> = self
            .entries
            .iter()
            .filter(|(k, m)| {
                k.send_seq.is_some() && m.state == MessageState::Confirmed && m.created_at <= at
            })
            .map(|(k, _)| k.clone())
            .collect();
        for key in settled {
            if let Some(m) = self.remove_key(&key) {
                self.insert_plain(m);
            }
        }
    }

    fn oldest_pending_like(&self, message: &Message) -> Option<OrderKey> {
        self.entries
            .iter()
            .find(|(k, m)| k.send_seq.is_some() && m.state.is_pending() && m.same_content(message))
            .map(|(k, _)| k.clone())
    }
}

/// Server record wins, but keep the quote context the client attached if the server copy
/// arrived without it (realtime rows carry no reply snippet).
fn with_local_context(mut server: Message, pending: &Message) -> Message {
    match (&mut server.reply_to, &pending.reply_to) {
        (None, Some(local)) => server.reply_to = Some(local.clone()),
        (Some(remote), Some(local)) if remote.id == local.id && remote.snippet.is_none() => {
            remote.snippet = local.snippet.clone();
        }
        _ => {}
    }
    server.state = MessageState::Confirmed;
    server
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::message::test_support::{at, pending_msg, server_msg};
    use crate::conversation::message::ReplyRef;

    const ME: &str = "me";
    const PEER: &str = "peer";

    fn ids(store: &TimelineStore) -> Vec<String> {
        store.iter().map(|m| m.id.key()).collect()
    }

    #[test]
    fn seed_orders_newest_first_with_id_tiebreak() {
        let mut store = TimelineStore::new(ME);
        store.seed(vec![
            server_msg("a", PEER, at(10, 0), "A"),
            server_msg("c", PEER, at(10, 1), "C"),
            server_msg("b", PEER, at(10, 1), "B"),
        ]);
        assert_eq!(ids(&store), vec!["c", "b", "a"]);
    }

    #[test]
    fn duplicate_ids_are_absorbed() {
        let mut store = TimelineStore::new(ME);
        store.seed(vec![server_msg("a", PEER, at(10, 0), "A")]);
        assert_eq!(
            store.insert_remote(server_msg("b", PEER, at(10, 1), "B")),
            RemoteInsert::Inserted
        );
        assert_eq!(
            store.insert_remote(server_msg("b", PEER, at(10, 1), "B")),
            RemoteInsert::Duplicate
        );
        let added = store.prepend_older(vec![
            server_msg("a", PEER, at(10, 0), "A"),
            server_msg("z", PEER, at(9, 0), "Z"),
            server_msg("z", PEER, at(9, 0), "Z"),
        ]);
        assert_eq!(added, 1);
        assert_eq!(ids(&store), vec!["b", "a", "z"]);
    }

    #[test]
    fn optimistic_send_stays_newest_despite_client_clock_skew() {
        let mut store = TimelineStore::new(ME);
        store.seed(vec![server_msg("a", PEER, at(10, 5), "A")]);
        let pending = pending_msg(ME, at(10, 0), "hi");
        let local_id = pending.id.clone();
        assert!(store.insert_optimistic(pending));
        assert_eq!(store.position(&local_id), Some(0));

        let outcome = store.reconcile(&local_id, server_msg("s1", ME, at(10, 2), "hi"));
        assert_eq!(outcome, Reconciled::Replaced);
        assert_eq!(ids(&store), vec!["s1", "a"]);
        assert_eq!(
            store.get(&MessageId::server("s1")).map(|m| m.state.clone()),
            Some(MessageState::Confirmed)
        );
        assert!(!store.contains(&local_id));
    }

    #[test]
    fn reconciled_send_sorts_by_server_time_once_a_newer_message_arrives() {
        let mut store = TimelineStore::new(ME);
        store.seed(vec![server_msg("a", PEER, at(10, 0), "A")]);
        // Client clock runs ahead of the server.
        let pending = pending_msg(ME, at(10, 5), "hi");
        let local_id = pending.id.clone();
        store.insert_optimistic(pending);
        store.reconcile(&local_id, server_msg("s1", ME, at(10, 1), "hi"));
        assert_eq!(ids(&store), vec!["s1", "a"]);

        store.insert_remote(server_msg("b", PEER, at(10, 2), "B"));
        assert_eq!(ids(&store), vec!["b", "s1", "a"]);
        store.insert_remote(server_msg("c", PEER, at(10, 3), "C"));
        assert_eq!(ids(&store), vec!["c", "b", "s1", "a"]);
    }

    #[test]
    fn late_arriving_older_message_leaves_fresh_send_on_top() {
        let mut store = TimelineStore::new(ME);
        store.seed(vec![server_msg("a", PEER, at(10, 0), "A")]);
        let pending = pending_msg(ME, at(10, 5), "hi");
        let local_id = pending.id.clone();
        store.insert_optimistic(pending);
        store.reconcile(&local_id, server_msg("s1", ME, at(10, 3), "hi"));

        store.insert_remote(server_msg("b", PEER, at(10, 2), "B"));
        assert_eq!(ids(&store), vec!["s1", "b", "a"]);
    }

    #[test]
    fn rapid_sends_keep_send_order() {
        let mut store = TimelineStore::new(ME);
        let first = pending_msg(ME, at(10, 0), "one");
        let second = pending_msg(ME, at(10, 0), "two");
        let (a, b) = (first.id.clone(), second.id.clone());
        store.insert_optimistic(first);
        store.insert_optimistic(second);
        assert_eq!(store.position(&b), Some(0));
        assert_eq!(store.position(&a), Some(1));
    }

    #[test]
    fn reconcile_then_realtime_echo_leaves_one_entry() {
        let mut store = TimelineStore::new(ME);
        store.seed(vec![server_msg("a", PEER, at(10, 0), "A")]);
        let pending = pending_msg(ME, at(10, 1), "hey");
        let local_id = pending.id.clone();
        store.insert_optimistic(pending);

        store.reconcile(&local_id, server_msg("s1", ME, at(10, 1), "hey"));
        assert_eq!(
            store.insert_remote(server_msg("s1", ME, at(10, 1), "hey")),
            RemoteInsert::Duplicate
        );
        assert_eq!(ids(&store), vec!["s1", "a"]);
    }

    #[test]
    fn realtime_echo_before_response_adopts_pending_entry() {
        let mut store = TimelineStore::new(ME);
        store.seed(vec![server_msg("a", PEER, at(10, 5), "A")]);
        let pending = pending_msg(ME, at(10, 0), "hey");
        let local_id = pending.id.clone();
        store.insert_optimistic(pending);

        let outcome = store.insert_remote(server_msg("s1", ME, at(10, 3), "hey"));
        assert_eq!(
            outcome,
            RemoteInsert::Adopted {
                local_id: local_id.clone()
            }
        );
        assert_eq!(ids(&store), vec!["s1", "a"]);

        let outcome = store.reconcile(&local_id, server_msg("s1", ME, at(10, 3), "hey"));
        assert_eq!(outcome, Reconciled::AlreadyAdopted);
        assert_eq!(ids(&store), vec!["s1", "a"]);
        assert_eq!(store.canonical_id(&local_id), MessageId::server("s1"));
    }

    #[test]
    fn echo_adopts_the_pending_send_with_the_same_reply_target() {
        let quote = |m: &mut Message, target: &str| {
            m.reply_to = Some(ReplyRef {
                id: MessageId::server(target),
                snippet: None,
            });
        };
        let mut store = TimelineStore::new(ME);
        let mut first = pending_msg(ME, at(10, 0), "yes");
        quote(&mut first, "a");
        let mut second = pending_msg(ME, at(10, 0), "yes");
        quote(&mut second, "b");
        let second_id = second.id.clone();
        store.insert_optimistic(first);
        store.insert_optimistic(second);

        let mut echo = server_msg("s1", ME, at(10, 0), "yes");
        quote(&mut echo, "b");
        assert_eq!(
            store.insert_remote(echo),
            RemoteInsert::Adopted {
                local_id: second_id
            }
        );
    }

    #[test]
    fn unmatched_echo_collapses_on_reconcile() {
        let mut store = TimelineStore::new(ME);
        let pending = pending_msg(ME, at(10, 0), "draft text");
        let local_id = pending.id.clone();
        store.insert_optimistic(pending);

        // Server normalized the text, so the echo is not recognized as ours.
        store.insert_remote(server_msg("s1", ME, at(10, 0), "draft  text"));
        assert_eq!(store.len(), 2);

        let outcome = store.reconcile(&local_id, server_msg("s1", ME, at(10, 0), "draft  text"));
        assert_eq!(outcome, Reconciled::Merged);
        assert_eq!(ids(&store), vec!["s1"]);
    }

    #[test]
    fn failed_entries_stay_until_removed() {
        let mut store = TimelineStore::new(ME);
        let pending = pending_msg(ME, at(10, 0), "oops");
        let local_id = pending.id.clone();
        store.insert_optimistic(pending);

        assert!(store.mark_failed(&local_id, "offline"));
        assert!(!store.mark_failed(&local_id, "again"));
        assert!(store.get(&local_id).is_some_and(|m| m.state.is_failed()));

        assert!(store.remove_failed(&MessageId::server("nope")).is_none());
        assert!(store.remove_failed(&local_id).is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn failure_after_echo_is_ignored() {
        let mut store = TimelineStore::new(ME);
        let pending = pending_msg(ME, at(10, 0), "hey");
        let local_id = pending.id.clone();
        store.insert_optimistic(pending);
        store.insert_remote(server_msg("s1", ME, at(10, 0), "hey"));

        assert!(!store.mark_failed(&local_id, "timeout"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn optimistic_insert_rejects_server_ids() {
        let mut store = TimelineStore::new(ME);
        let mut msg = pending_msg(ME, at(10, 0), "x");
        msg.id = MessageId::server("s1");
        assert!(!store.insert_optimistic(msg));
        assert!(store.is_empty());
    }
}
