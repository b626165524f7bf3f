// Conversation session storage.
//
// Sessions keep question/answer pairs so follow-up questions resolve
// references like "and in 2023?". Two windows apply on read: the model
// prompt gets the last few pairs, the caller-visible history is longer.
// Mutation goes through a per-session lock so concurrent appends to the
// same session cannot lose turns.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Q/A pairs included in the model prompt.
pub const MODEL_WINDOW_PAIRS: usize = 6;
/// Turns returned to the caller.
pub const CALLER_WINDOW_TURNS: usize = 20;
/// A session over this many turns is swept.
pub const MAX_SESSION_TURNS: usize = 100;
/// Idle time after which a session is swept.
pub const STALE_AFTER_SECS: i64 = 3600;

#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub role: String,
    pub content: String,
}

impl Turn {
    fn user(content: &str) -> Self {
        Self { role: "user".into(), content: content.to_string() }
    }

    fn assistant(content: &str) -> Self {
        Self { role: "assistant".into(), content: content.to_string() }
    }
}

pub trait SessionStore: Send + Sync {
    /// Allocate a fresh session id.
    fn create(&self) -> String;

    /// The last `pairs` question/answer pairs, oldest first.
    fn recent_pairs(&self, session_id: &str, pairs: usize) -> Vec<Turn>;

    /// Caller-visible history, capped at [`CALLER_WINDOW_TURNS`].
    fn history(&self, session_id: &str) -> Vec<Turn>;

    /// Record one completed exchange. Creates the session if the id is new,
    /// so callers may bring their own ids.
    fn append_exchange(&self, session_id: &str, question: &str, answer: &str);

    /// Drop a session. Returns whether it existed.
    fn clear(&self, session_id: &str) -> bool;

    /// Remove oversized and stale sessions.
    fn sweep(&self);
}

struct SessionState {
    turns: Vec<Turn>,
    last_active: DateTime<Utc>,
}

type SessionHandle = Arc<Mutex<SessionState>>;

/// Process-local store. The registry lock is held only to look up or insert
/// the per-session handle; turn mutation happens under the session's own
/// lock.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, session_id: &str) -> SessionHandle {
        let mut registry = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        registry
            .entry(session_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(SessionState {
                    turns: Vec::new(),
                    last_active: Utc::now(),
                }))
            })
            .clone()
    }

    fn existing(&self, session_id: &str) -> Option<SessionHandle> {
        let registry = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        registry.get(session_id).cloned()
    }

    #[cfg(test)]
    fn backdate(&self, session_id: &str, by_secs: i64) {
        if let Some(handle) = self.existing(session_id) {
            let mut state = handle.lock().unwrap();
            state.last_active = Utc::now() - Duration::seconds(by_secs);
        }
    }
}

impl SessionStore for InMemorySessionStore {
    fn create(&self) -> String {
        let id = Uuid::new_v4().to_string();
        self.handle(&id);
        id
    }

    fn recent_pairs(&self, session_id: &str, pairs: usize) -> Vec<Turn> {
        let Some(handle) = self.existing(session_id) else {
            return Vec::new();
        };
        let state = handle.lock().unwrap_or_else(|e| e.into_inner());
        let keep = pairs * 2;
        let skip = state.turns.len().saturating_sub(keep);
        state.turns[skip..].to_vec()
    }

    fn history(&self, session_id: &str) -> Vec<Turn> {
        let Some(handle) = self.existing(session_id) else {
            return Vec::new();
        };
        let state = handle.lock().unwrap_or_else(|e| e.into_inner());
        let skip = state.turns.len().saturating_sub(CALLER_WINDOW_TURNS);
        state.turns[skip..].to_vec()
    }

    fn append_exchange(&self, session_id: &str, question: &str, answer: &str) {
        let handle = self.handle(session_id);
        let mut state = handle.lock().unwrap_or_else(|e| e.into_inner());
        state.turns.push(Turn::user(question));
        state.turns.push(Turn::assistant(answer));
        state.last_active = Utc::now();
    }

    fn clear(&self, session_id: &str) -> bool {
        let mut registry = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        registry.remove(session_id).is_some()
    }

    fn sweep(&self) {
        let cutoff = Utc::now() - Duration::seconds(STALE_AFTER_SECS);
        let mut registry = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        registry.retain(|id, handle| {
            let state = handle.lock().unwrap_or_else(|e| e.into_inner());
            let keep = state.turns.len() <= MAX_SESSION_TURNS && state.last_active >= cutoff;
            if !keep {
                tracing::debug!(session = %id, turns = state.turns.len(), "sweeping session");
            }
            keep
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_appends_two_turns() {
        let store = InMemorySessionStore::new();
        let id = store.create();
        store.append_exchange(&id, "quem gastou mais?", "O deputado X.");

        let history = store.history(&id);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, "user");
        assert_eq!(history[1].role, "assistant");
    }

    #[test]
    fn test_model_window_keeps_last_pairs_only() {
        let store = InMemorySessionStore::new();
        let id = store.create();
        for i in 0..10 {
            store.append_exchange(&id, &format!("q{}", i), &format!("a{}", i));
        }

        let window = store.recent_pairs(&id, MODEL_WINDOW_PAIRS);
        assert_eq!(window.len(), MODEL_WINDOW_PAIRS * 2);
        // Oldest surviving pair is q4/a4
        assert_eq!(window[0].content, "q4");
        assert_eq!(window.last().unwrap().content, "a9");
    }

    #[test]
    fn test_caller_history_capped_at_twenty_turns() {
        let store = InMemorySessionStore::new();
        let id = store.create();
        for i in 0..30 {
            store.append_exchange(&id, &format!("q{}", i), &format!("a{}", i));
        }

        let history = store.history(&id);
        assert_eq!(history.len(), CALLER_WINDOW_TURNS);
        assert_eq!(history[0].content, "q20");
    }

    #[test]
    fn test_clear_reports_existence() {
        let store = InMemorySessionStore::new();
        let id = store.create();
        assert!(store.clear(&id));
        assert!(!store.clear(&id));
        assert!(!store.clear("never-existed"));
    }

    #[test]
    fn test_sweep_removes_stale_sessions() {
        let store = InMemorySessionStore::new();
        let stale = store.create();
        let fresh = store.create();
        store.append_exchange(&stale, "q", "a");
        store.append_exchange(&fresh, "q", "a");
        store.backdate(&stale, STALE_AFTER_SECS + 60);

        store.sweep();
        assert!(store.history(&stale).is_empty());
        assert_eq!(store.history(&fresh).len(), 2);
    }

    #[test]
    fn test_sweep_removes_oversized_sessions() {
        let store = InMemorySessionStore::new();
        let id = store.create();
        for i in 0..60 {
            store.append_exchange(&id, &format!("q{}", i), &format!("a{}", i));
        }
        assert_eq!(store.recent_pairs(&id, 1).len(), 2);

        store.sweep(); // 120 turns > 100
        assert!(store.history(&id).is_empty());
    }

    #[test]
    fn test_unknown_session_reads_empty() {
        let store = InMemorySessionStore::new();
        assert!(store.history("nope").is_empty());
        assert!(store.recent_pairs("nope", 6).is_empty());
    }
}
