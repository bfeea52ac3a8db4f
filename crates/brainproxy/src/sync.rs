//! Per-key async locks.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::debug;

/// How often idle entries are swept.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Entries untouched for longer than this are eligible for removal.
pub const MAX_IDLE_AGE: Duration = Duration::from_secs(7200);

type Slots = DashMap<String, (Arc<Mutex<()>>, Instant)>;

/// A set of async mutexes addressed by string key.
///
/// Holders of different keys never contend; holders of the same key are
/// serialized in arrival order (tokio's mutex is fair).
#[derive(Clone, Default)]
pub struct KeyedLocks {
    slots: Arc<Slots>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same as [`KeyedLocks::new`], plus a background sweeper.
    pub fn with_cleanup(name: &'static str) -> Self {
        let locks = Self::new();
        locks.clone().spawn_cleanup(CLEANUP_INTERVAL, MAX_IDLE_AGE, name);
        locks
    }

    /// Mutex for `key`, created on first use.
    pub fn get(&self, key: &str) -> Arc<Mutex<()>> {
        let now = Instant::now();
        let mut slot = self
            .slots
            .entry(key.to_string())
            .or_insert_with(|| (Arc::new(Mutex::new(())), now));
        slot.1 = now;
        Arc::clone(&slot.0)
    }

    /// Wait for and hold the lock for `key`.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        self.get(key).lock_owned().await
    }

    /// Drop entries idle for longer than `max_age` that nobody references.
    pub fn cleanup_stale(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let before = self.slots.len();
        self.slots.retain(|_, (lock, touched)| {
            Arc::strong_count(lock) > 1 || now.duration_since(*touched) <= max_age
        });
        before.saturating_sub(self.slots.len())
    }

    fn spawn_cleanup(self, interval: Duration, max_age: Duration, name: &'static str) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = self.cleanup_stale(max_age);
                if removed > 0 {
                    debug!(removed, remaining = self.len(), locks = name, "Swept idle locks");
                }
            }
        });
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_shares_a_mutex() {
        let locks = KeyedLocks::new();
        assert!(Arc::ptr_eq(&locks.get("s1"), &locks.get("s1")));
        assert!(!Arc::ptr_eq(&locks.get("s1"), &locks.get("s2")));
    }

    #[test]
    fn cleanup_removes_only_idle_unreferenced_entries() {
        let locks = KeyedLocks::new();
        let old = Instant::now() - Duration::from_secs(10);

        locks
            .slots
            .insert("idle".to_string(), (Arc::new(Mutex::new(())), old));
        let held = Arc::new(Mutex::new(()));
        locks
            .slots
            .insert("held".to_string(), (Arc::clone(&held), old));
        locks.get("fresh");

        assert_eq!(locks.cleanup_stale(Duration::from_secs(5)), 1);
        assert!(!locks.slots.contains_key("idle"));
        assert!(locks.slots.contains_key("held"));
        assert!(locks.slots.contains_key("fresh"));
    }

    #[tokio::test]
    async fn acquire_serializes_same_key() {
        let locks = KeyedLocks::new();
        let guard = locks.acquire("s1").await;

        assert!(locks.get("s1").try_lock().is_err());
        assert!(locks.get("s2").try_lock().is_ok());

        drop(guard);
        assert!(locks.get("s1").try_lock().is_ok());
    }
}
