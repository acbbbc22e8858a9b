//! Per-user write serialization
//!
//! Two near-simultaneous events for the same user must not both read a stale
//! balance and double-apply. The registry hands out one async mutex per user
//! so mutations for a user serialize while different users proceed fully in
//! parallel. Lock entries are created on first use and kept for the process
//! lifetime (user counts are bounded by the platform's member count).

use questline_types::{StoreError, StoreResult, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of per-user async locks.
#[derive(Debug, Default)]
pub struct UserLockRegistry {
    locks: Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
}

impl UserLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for one user, waiting if another task holds it.
    pub async fn acquire(&self, user: &UserId) -> StoreResult<OwnedMutexGuard<()>> {
        let lock = {
            let mut map = self
                .locks
                .lock()
                .map_err(|_| StoreError::Backend("user lock registry poisoned".to_string()))?;
            map.entry(user.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        Ok(lock.lock_owned().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_same_user_serializes() {
        let registry = Arc::new(UserLockRegistry::new());
        let counter = Arc::new(AtomicU32::new(0));
        let user = UserId::new("u1");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let counter = counter.clone();
            let user = user.clone();
            handles.push(tokio::spawn(async move {
                let _guard = registry.acquire(&user).await.expect("acquire");
                // Read-modify-write that would race without the lock
                let seen = counter.load(Ordering::SeqCst);
                tokio::task::yield_now().await;
                counter.store(seen + 1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.expect("task");
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn test_different_users_do_not_block() {
        let registry = UserLockRegistry::new();
        let _a = registry.acquire(&UserId::new("a")).await.expect("acquire");
        // Holding user a's lock must not block user b's
        let _b = registry.acquire(&UserId::new("b")).await.expect("acquire");
    }
}
