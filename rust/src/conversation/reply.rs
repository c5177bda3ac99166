use std::time::Duration;

use super::message::{MessageId, ReplyRef};
use super::timeline::TimelineStore;

pub const DEFAULT_HIGHLIGHT_DURATION: Duration = Duration::from_secs(2);

/// Quote shown for a reply whose target is neither paged in nor carried as a snippet.
pub const UNAVAILABLE_PREVIEW: &str = "Original message unavailable";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedReply {
    pub message_id: MessageId,
    pub sender_id: String,
    pub preview_text: String,
    /// Target is paged in, so "jump to original" can land on it.
    pub in_timeline: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Highlight {
    pub message_id: MessageId,
    pub token: u64,
}

/// Quote lookup plus the transient "jumped here" highlight.
#[derive(Debug)]
pub struct ReplyResolver {
    highlight: Option<Highlight>,
    next_token: u64,
    highlight_duration: Duration,
}

impl Default for ReplyResolver {
    fn default() -> Self {
        Self::new(DEFAULT_HIGHLIGHT_DURATION)
    }
}

impl ReplyResolver {
    pub fn new(highlight_duration: Duration) -> Self {
        Self {
            highlight: None,
            next_token: 0,
            highlight_duration,
        }
    }

    /// Prefer the live timeline copy; fall back to the snippet the server stored on the
    /// referencing message.
    pub fn resolve(&self, store: &TimelineStore, reply: &ReplyRef) -> Option<ResolvedReply> {
        let target = store.canonical_id(&reply.id);
        if let Some(m) = store.get(&target) {
            return Some(ResolvedReply {
                message_id: m.id.clone(),
                sender_id: m.sender_id.clone(),
                preview_text: m.preview_text(),
                in_timeline: true,
            });
        }
        reply.snippet.as_ref().map(|s| ResolvedReply {
            message_id: target,
            sender_id: s.sender_id.clone(),
            preview_text: s.text.clone(),
            in_timeline: false,
        })
    }

    /// Index in display order (newest first). `None` when the target is not paged in; the
    /// caller decides how to approximate the scroll.
    pub fn locate(&self, store: &TimelineStore, id: &MessageId) -> Option<usize> {
        store.position(&store.canonical_id(id))
    }

    /// Start a highlight, superseding any previous one. Returns the token the expiry timer
    /// must present.
    pub fn begin_highlight(&mut self, message_id: MessageId) -> u64 {
        self.next_token += 1;
        self.highlight = Some(Highlight {
            message_id,
            token: self.next_token,
        });
        self.next_token
    }

    /// Clear the highlight if `token` is still the current one.
    pub fn expire_highlight(&mut self, token: u64) -> bool {
        match &self.highlight {
            Some(h) if h.token == token => {
                self.highlight = None;
                true
            }
            _ => false,
        }
    }

    pub fn highlighted(&self) -> Option<&MessageId> {
        self.highlight.as_ref().map(|h| &h.message_id)
    }

    pub fn highlight_duration(&self) -> Duration {
        self.highlight_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::message::test_support::{at, server_msg};
    use crate::conversation::message::ReplySnippet;

    fn store() -> TimelineStore {
        let mut store = TimelineStore::new("me");
        store.seed(vec![
            server_msg("a", "peer", at(10, 0), "original question"),
            server_msg("b", "me", at(10, 1), "answer"),
        ]);
        store
    }

    #[test]
    fn resolves_loaded_target_from_timeline() {
        let store = store();
        let resolver = ReplyResolver::default();
        let reply = ReplyRef {
            id: MessageId::server("a"),
            snippet: Some(ReplySnippet {
                sender_id: "peer".into(),
                text: "stale snippet".into(),
            }),
        };
        let r = resolver.resolve(&store, &reply).unwrap();
        assert_eq!(r.preview_text, "original question");
        assert!(r.in_timeline);
        assert_eq!(resolver.locate(&store, &reply.id), Some(1));
    }

    #[test]
    fn falls_back_to_snippet_when_not_paged_in() {
        let store = store();
        let resolver = ReplyResolver::default();
        let reply = ReplyRef {
            id: MessageId::server("old"),
            snippet: Some(ReplySnippet {
                sender_id: "peer".into(),
                text: "from last week".into(),
            }),
        };
        let r = resolver.resolve(&store, &reply).unwrap();
        assert_eq!(r.preview_text, "from last week");
        assert!(!r.in_timeline);
        assert_eq!(resolver.locate(&store, &reply.id), None);

        let bare = ReplyRef {
            id: MessageId::server("old"),
            snippet: None,
        };
        assert!(resolver.resolve(&store, &bare).is_none());
    }

    #[test]
    fn newer_highlight_supersedes_older_timer() {
        let mut resolver = ReplyResolver::default();
        let first = resolver.begin_highlight(MessageId::server("a"));
        let second = resolver.begin_highlight(MessageId::server("b"));
        assert!(!resolver.expire_highlight(first));
        assert_eq!(resolver.highlighted(), Some(&MessageId::server("b")));
        assert!(resolver.expire_highlight(second));
        assert_eq!(resolver.highlighted(), None);
    }
}
