//! Per-user mutation locks.
//!
//! Every balance read-modify-write runs while the locks of all users it touches
//! are held. Locks are taken in ascending user-id order, so two operations over
//! overlapping sets of users can never wait on each other in a cycle.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of one async mutex per user id.
#[derive(Debug, Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

/// Held locks; released on drop.
#[derive(Debug)]
pub struct UserGuards {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl UserLocks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and takes the locks of every user in `user_ids`.
    ///
    /// Duplicate ids are locked once.
    pub async fn acquire(&self, user_ids: impl IntoIterator<Item = i64>) -> UserGuards {
        let ordered: BTreeSet<i64> = user_ids.into_iter().collect();

        let mutexes: Vec<Arc<AsyncMutex<()>>> = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            ordered
                .iter()
                .map(|id| Arc::clone(locks.entry(*id).or_default()))
                .collect()
        };

        let mut guards = Vec::with_capacity(mutexes.len());
        for mutex in mutexes {
            guards.push(mutex.lock_owned().await);
        }

        UserGuards { _guards: guards }
    }

    /// Drops the registry entry of a user that no longer exists.
    ///
    /// Tasks already waiting on the old mutex still get it, then find the user gone.
    pub fn forget(&self, user_id: i64) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.remove(&user_id);
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[cfg(test)]
    fn is_locked(&self, user_id: i64) -> bool {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .get(&user_id)
            .is_some_and(|mutex| mutex.try_lock().is_err())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guards_hold_until_dropped() {
        let locks = UserLocks::new();

        let guards = locks.acquire([3, 1, 3]).await;
        assert!(locks.is_locked(1));
        assert!(locks.is_locked(3));
        assert!(!locks.is_locked(2));

        drop(guards);
        assert!(!locks.is_locked(1));
        assert!(!locks.is_locked(3));
    }

    #[tokio::test]
    async fn test_forget_drops_entry() {
        let locks = UserLocks::new();

        let guards = locks.acquire([1, 2]).await;
        locks.forget(1);
        assert_eq!(locks.tracked(), 1);
        drop(guards);

        // a forgotten id gets a fresh, unlocked mutex
        let _again = locks.acquire([1]).await;
        assert!(locks.is_locked(1));
        assert_eq!(locks.tracked(), 2);

        locks.forget(99);
        assert_eq!(locks.tracked(), 2);
    }

    #[tokio::test]
    async fn test_disjoint_sets_do_not_block() {
        let locks = UserLocks::new();

        let _first = locks.acquire([1, 2]).await;
        let _second = locks.acquire([3]).await;
        assert!(locks.is_locked(2));
        assert!(locks.is_locked(3));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_overlapping_sets_serialize() {
        let locks = Arc::new(UserLocks::new());
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..16_i64 {
            let locks = Arc::clone(&locks);
            let counter = Arc::clone(&counter);
            handles.push(tokio::spawn(async move {
                let _guards = locks.acquire([i % 3, 7]).await;
                // nobody else can be inside while user 7 is held
                let inside = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                tokio::task::yield_now().await;
                counter.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                inside
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap_or(usize::MAX), 0);
        }
    }
}
