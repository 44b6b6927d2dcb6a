use std::sync::atomic::{AtomicI64, Ordering};

use alog_core::{Comment, Log, LogId, OAuthState, RefreshToken, Session, User, UserId};
use dashmap::DashMap;

/// Process-local storage for every alog entity.
#[derive(Debug)]
pub struct MemoryStore {
    pub(crate) users: DashMap<UserId, User>,
    pub(crate) logs: DashMap<LogId, Log>,
    pub(crate) comments: DashMap<LogId, Vec<Comment>>,
    pub(crate) topics: DashMap<String, i64>,
    pub(crate) oauth_states: DashMap<String, OAuthState>,
    pub(crate) sessions: DashMap<String, Session>,
    pub(crate) refresh_tokens: DashMap<String, RefreshToken>,
    next_log_id: AtomicI64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            logs: DashMap::new(),
            comments: DashMap::new(),
            topics: DashMap::new(),
            oauth_states: DashMap::new(),
            sessions: DashMap::new(),
            refresh_tokens: DashMap::new(),
            next_log_id: AtomicI64::new(1),
        }
    }

    pub(crate) fn next_log_id(&self) -> LogId {
        self.next_log_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Adds a comment. Used to seed data; comments have no HTTP surface.
    pub fn insert_comment(&self, comment: Comment) {
        self.comments
            .entry(comment.log_id)
            .or_default()
            .push(comment);
    }

    /// Number of comments attached to `log_id`.
    #[must_use]
    pub fn comment_count(&self, log_id: LogId) -> usize {
        self.comments.get(&log_id).map_or(0, |c| c.len())
    }

    /// Number of logs tagged with `topic`.
    #[must_use]
    pub fn topic_count(&self, topic: &str) -> i64 {
        self.topics.get(topic).map_or(0, |c| *c)
    }

    /// Number of refresh tokens currently stored.
    #[must_use]
    pub fn refresh_token_count(&self) -> usize {
        self.refresh_tokens.len()
    }

    /// Number of pending OAuth states currently stored.
    #[must_use]
    pub fn oauth_state_count(&self) -> usize {
        self.oauth_states.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}
