//! Per-user serialization of presence handling.
//!
//! Events for one user must be processed strictly one after another, while
//! events for different users may interleave across `.await` points. Each
//! active user gets a FIFO-fair `tokio::sync::Mutex`; the map entry is dropped
//! once nobody holds or waits on it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::types::UserId;

type LockMap = Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>;

/// A set of async locks keyed by user.
#[derive(Debug, Default)]
pub struct UserLocks {
    locks: Arc<LockMap>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until this task is the only one processing `user`.
    pub async fn acquire(&self, user: &UserId) -> UserGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(user.clone()).or_default())
        };
        let guard = lock.lock_owned().await;
        UserGuard {
            locks: Arc::clone(&self.locks),
            user: user.clone(),
            guard: Some(guard),
        }
    }

    /// Number of users with a holder or waiter.
    pub fn active(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Held while one user's event is being processed.
#[derive(Debug)]
pub struct UserGuard {
    locks: Arc<LockMap>,
    user: UserId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserGuard {
    fn drop(&mut self) {
        // Release first so the strong count below only sees the map and waiters.
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.user)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.user);
        }
    }
}
