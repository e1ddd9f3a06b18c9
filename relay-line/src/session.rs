//! Per-conversation session cache.
//!
//! Maps a conversation id to the remote chat session (and, when notebooks
//! are auto-created, the notebook) backing it. In-memory only; entries
//! live for the process lifetime with no eviction, so this assumes a
//! bounded, small set of conversations.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Cache of remote identifiers keyed by conversation id.
#[derive(Default)]
pub struct SessionCache {
    /// conversation_id → session_id
    sessions: DashMap<String, String>,
    /// conversation_id → auto-created notebook_id
    notebooks: DashMap<String, String>,
    /// Per-conversation guard for lookup-or-create sequences
    creation_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached session id for a conversation, if one exists.
    pub fn get(&self, conversation_id: &str) -> Option<String> {
        self.sessions.get(conversation_id).map(|e| e.value().clone())
    }

    /// Associate a session id with a conversation. Last write wins.
    pub fn set(&self, conversation_id: &str, session_id: &str) {
        self.sessions
            .insert(conversation_id.to_string(), session_id.to_string());
    }

    /// Cached auto-created notebook id for a conversation, if one exists.
    pub fn notebook(&self, conversation_id: &str) -> Option<String> {
        self.notebooks.get(conversation_id).map(|e| e.value().clone())
    }

    /// Associate an auto-created notebook id with a conversation.
    pub fn set_notebook(&self, conversation_id: &str, notebook_id: &str) {
        self.notebooks
            .insert(conversation_id.to_string(), notebook_id.to_string());
    }

    /// Lock guarding the lookup-or-create sequence for one conversation.
    ///
    /// Two concurrent first messages from the same conversation contend on
    /// this lock instead of racing to create duplicate remote sessions;
    /// distinct conversations never contend.
    pub fn creation_lock(&self, conversation_id: &str) -> Arc<Mutex<()>> {
        self.creation_locks
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Number of conversations with a cached session.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_none_for_unknown_conversation() {
        let cache = SessionCache::new();
        assert_eq!(cache.get("U123"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn set_then_get_roundtrip() {
        let cache = SessionCache::new();
        cache.set("U123", "sess-1");
        assert_eq!(cache.get("U123"), Some("sess-1".to_string()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn last_write_wins() {
        let cache = SessionCache::new();
        cache.set("U123", "sess-1");
        cache.set("U123", "sess-2");
        assert_eq!(cache.get("U123"), Some("sess-2".to_string()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn notebook_cache_is_independent_of_sessions() {
        let cache = SessionCache::new();
        cache.set_notebook("U123", "nb-1");
        assert_eq!(cache.notebook("U123"), Some("nb-1".to_string()));
        assert_eq!(cache.get("U123"), None);
    }

    #[test]
    fn creation_lock_is_stable_per_conversation() {
        let cache = SessionCache::new();
        let a = cache.creation_lock("U123");
        let b = cache.creation_lock("U123");
        let c = cache.creation_lock("U456");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
