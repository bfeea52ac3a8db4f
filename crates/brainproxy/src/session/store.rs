use dashmap::DashMap;
use tokio::sync::OwnedMutexGuard;

use crate::llm::Content;
use crate::sync::KeyedLocks;

/// In-memory conversation histories keyed by session id.
pub struct SessionStore {
    sessions: DashMap<String, Vec<Content>>,
    locks: Option<KeyedLocks>,
}

impl SessionStore {
    /// `locks` enables whole-turn serialization per session; `None` accepts
    /// last-writer-wins on concurrent turns.
    pub fn new(locks: Option<KeyedLocks>) -> Self {
        Self {
            sessions: DashMap::new(),
            locks,
        }
    }

    /// Copy of the history for `id`; empty for unknown sessions.
    ///
    /// Reading never creates a session, the first commit does.
    pub fn history(&self, id: &str) -> Vec<Content> {
        self.sessions
            .get(id)
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    /// Replace the history for `id`.
    pub fn store(&self, id: &str, history: Vec<Content>) {
        self.sessions.insert(id.to_string(), history);
    }

    /// Store `prior` followed by `new_turns`.
    pub fn commit(&self, id: &str, mut prior: Vec<Content>, new_turns: Vec<Content>) {
        prior.extend(new_turns);
        self.store(id, prior);
    }

    /// Drop every session; returns how many existed.
    pub fn reset_all(&self) -> usize {
        let count = self.sessions.len();
        self.sessions.clear();
        count
    }

    pub fn reset(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Per-session guard held for a full turn, when serialization is on.
    pub async fn turn_guard(&self, id: &str) -> Option<OwnedMutexGuard<()>> {
        match &self.locks {
            Some(locks) => Some(locks.acquire(id).await),
            None => None,
        }
    }
}
