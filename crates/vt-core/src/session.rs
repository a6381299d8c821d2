//! In-memory record of who is currently in the tracked channel.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::types::UserId;

/// Open sessions keyed by user.
///
/// Holds at most one start time per user, which is what makes the
/// at-most-one-open-session property structural rather than checked.
/// Sessions are not persisted; a restart forgets them.
#[derive(Debug, Default)]
pub struct SessionStore {
    open: HashMap<UserId, DateTime<Utc>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the user has an open session.
    pub fn has(&self, user: &UserId) -> bool {
        self.open.contains_key(user)
    }

    /// Start time of the user's open session, if any.
    pub fn entered_at(&self, user: &UserId) -> Option<DateTime<Utc>> {
        self.open.get(user).copied()
    }

    /// Opens a session starting at `at`.
    ///
    /// Does nothing if one is already open; the original start is kept.
    /// Returns true if a session was opened.
    pub fn open(&mut self, user: &UserId, at: DateTime<Utc>) -> bool {
        if self.open.contains_key(user) {
            return false;
        }
        self.open.insert(user.clone(), at);
        true
    }

    /// Closes the user's session, returning when it started.
    pub fn close(&mut self, user: &UserId) -> Option<DateTime<Utc>> {
        self.open.remove(user)
    }

    /// Re-stamps an open session's start. No-op when none is open.
    pub fn touch(&mut self, user: &UserId, at: DateTime<Utc>) {
        if let Some(entered_at) = self.open.get_mut(user) {
            *entered_at = at;
        }
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}
