use chrono::{DateTime, Utc};

use super::message::Message;

/// Read markers for the two participants of a direct conversation.
#[derive(Debug, Clone)]
pub struct ReadReceiptTracker {
    current_user_id: String,
    peer_last_read_at: Option<DateTime<Utc>>,
    self_last_read_at: Option<DateTime<Utc>>,
}

impl ReadReceiptTracker {
    pub fn new(current_user_id: impl Into<String>) -> Self {
        Self {
            current_user_id: current_user_id.into(),
            peer_last_read_at: None,
            self_last_read_at: None,
        }
    }

    /// Markers only move forward; a stale response can't un-read messages.
    pub fn record_self_read(&mut self, at: DateTime<Utc>) {
        self.self_last_read_at = Some(later(self.self_last_read_at, at));
    }

    pub fn record_peer_read(&mut self, at: DateTime<Utc>) {
        self.peer_last_read_at = Some(later(self.peer_last_read_at, at));
    }

    pub fn peer_last_read_at(&self) -> Option<DateTime<Utc>> {
        self.peer_last_read_at
    }

    pub fn self_last_read_at(&self) -> Option<DateTime<Utc>> {
        self.self_last_read_at
    }

    pub fn is_seen_by_peer(&self, message: &Message) -> bool {
        message.sender_id == self.current_user_id
            && self
                .peer_last_read_at
                .is_some_and(|read_at| message.created_at <= read_at)
    }
}

fn later(current: Option<DateTime<Utc>>, at: DateTime<Utc>) -> DateTime<Utc> {
    match current {
        Some(c) if c > at => c,
        _ => at,
    }
}
