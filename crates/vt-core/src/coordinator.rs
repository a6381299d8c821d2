//! Session lifecycle: turns classified presence changes into sessions,
//! audit entries, cumulative totals and notifications.
//!
//! Per user the coordinator is a two-state machine:
//!
//! | State    | Entered          | StillPresent     | Left             |
//! |----------|------------------|------------------|------------------|
//! | Idle     | open → Tracking  | adopt → Tracking | ignored          |
//! | Tracking | ignored          | touch            | close → Idle     |
//!
//! The session store is updated before any collaborator is called, and is
//! never rolled back when a collaborator fails.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::classify::{Classification, classify};
use crate::clock::Clock;
use crate::duration::{self, SessionDuration};
use crate::event::PresenceEvent;
use crate::lock::UserLocks;
use crate::record::{AccumulationMode, AuditAction, AuditEntry, CumulativeTimeRecord};
use crate::session::SessionStore;
use crate::stats::{StatsSnapshot, TrackerStats};
use crate::traits::{Notification, Notifier, PersistenceError, PresenceStore};
use crate::types::{ChannelId, UserId};

/// Static tracker settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// The voice channel whose occupancy is tracked.
    pub tracked_channel: ChannelId,
    /// How closed sessions are merged into stored totals.
    pub accumulation: AccumulationMode,
}

impl TrackerConfig {
    pub fn new(tracked_channel: ChannelId) -> Self {
        Self {
            tracked_channel,
            accumulation: AccumulationMode::default(),
        }
    }

    #[must_use]
    pub const fn with_accumulation(mut self, accumulation: AccumulationMode) -> Self {
        self.accumulation = accumulation;
        self
    }
}

/// What handling one presence event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A new session was opened.
    Opened { at: DateTime<Utc> },
    /// A same-channel update re-stamped the open session.
    Refreshed { at: DateTime<Utc> },
    /// A same-channel update arrived with no open session, so one was
    /// opened silently (no audit entry, no notification).
    Adopted { at: DateTime<Utc> },
    /// The open session was closed.
    Closed {
        entered_at: DateTime<Utc>,
        left_at: DateTime<Utc>,
        elapsed: SessionDuration,
        /// The stored total after merging, if it could be persisted.
        total: Option<SessionDuration>,
    },
    /// A duplicate or out-of-order event that changed nothing.
    DuplicateIgnored(Classification),
    /// The event did not involve the tracked channel.
    Irrelevant,
}

/// Owns the session store and drives it from presence events.
pub struct Coordinator {
    config: TrackerConfig,
    sessions: Mutex<SessionStore>,
    locks: UserLocks,
    store: Arc<dyn PresenceStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    stats: TrackerStats,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.config)
            .field("open_sessions", &self.open_sessions())
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    pub fn new(
        config: TrackerConfig,
        store: Arc<dyn PresenceStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            sessions: Mutex::new(SessionStore::new()),
            locks: UserLocks::new(),
            store,
            notifier,
            clock,
            stats: TrackerStats::default(),
        }
    }

    pub const fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Returns true if the user currently has an open session.
    pub fn is_tracking(&self, user: &UserId) -> bool {
        self.sessions().has(user)
    }

    /// Start of the user's open session, if any.
    pub fn entered_at(&self, user: &UserId) -> Option<DateTime<Utc>> {
        self.sessions().entered_at(user)
    }

    pub fn open_sessions(&self) -> usize {
        self.sessions().len()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Handles one presence notification to completion.
    ///
    /// The event time is taken from the clock on arrival, before waiting for
    /// any earlier event of the same user to finish.
    pub async fn handle(&self, event: PresenceEvent) -> Outcome {
        let at = self.clock.now();
        let classification = classify(
            event.previous_channel.as_ref(),
            event.new_channel.as_ref(),
            &self.config.tracked_channel,
        );
        debug!(
            user_id = %event.user_id,
            %classification,
            "classified presence change"
        );

        if classification == Classification::Irrelevant {
            return Outcome::Irrelevant;
        }

        let _guard = self.locks.acquire(&event.user_id).await;
        match classification {
            Classification::Entered => self.on_entered(&event, at).await,
            Classification::Left => self.on_left(&event, at).await,
            Classification::StillPresent => self.on_still_present(&event, at),
            Classification::Irrelevant => Outcome::Irrelevant,
        }
    }

    async fn on_entered(&self, event: &PresenceEvent, at: DateTime<Utc>) -> Outcome {
        let opened = self.sessions().open(&event.user_id, at);
        if !opened {
            return self.ignore_duplicate(event, Classification::Entered);
        }
        self.stats.session_opened();
        info!(user_id = %event.user_id, username = %event.username, "session opened");

        self.audit(event, AuditAction::Join, at).await;

        match self.store.find_cumulative_time(&event.user_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                let record =
                    CumulativeTimeRecord::zero(event.user_id.clone(), event.username.clone(), at);
                if let Err(err) = self
                    .store
                    .upsert_cumulative_time(&event.user_id, &record)
                    .await
                {
                    self.persistence_failed(&err, "create cumulative time record")
                        .await;
                }
            }
            Err(err) => {
                self.persistence_failed(&err, "look up cumulative time record")
                    .await;
            }
        }

        self.send(Notification::Joined {
            username: event.username.clone(),
            at,
        })
        .await;

        Outcome::Opened { at }
    }

    async fn on_left(&self, event: &PresenceEvent, at: DateTime<Utc>) -> Outcome {
        let closed = self.sessions().close(&event.user_id);
        let Some(entered_at) = closed else {
            return self.ignore_duplicate(event, Classification::Left);
        };
        self.stats.session_closed();

        let elapsed = match duration::elapsed(entered_at, at) {
            Ok(elapsed) => elapsed,
            Err(err) => {
                warn!(user_id = %event.user_id, error = %err, "session closed with zero duration");
                self.stats.malformed_timestamp();
                SessionDuration::ZERO
            }
        };
        info!(user_id = %event.user_id, username = %event.username, %elapsed, "session closed");

        self.audit(event, AuditAction::Leave, at).await;
        let total = self.merge_total(event, elapsed, at).await;

        self.send(Notification::Left {
            username: event.username.clone(),
            at,
        })
        .await;
        if let Some(total) = total {
            self.send(Notification::TotalTime {
                username: event.username.clone(),
                total,
                as_of: at,
            })
            .await;
        }

        Outcome::Closed {
            entered_at,
            left_at: at,
            elapsed,
            total,
        }
    }

    fn on_still_present(&self, event: &PresenceEvent, at: DateTime<Utc>) -> Outcome {
        let mut sessions = self.sessions();
        if sessions.has(&event.user_id) {
            sessions.touch(&event.user_id, at);
            debug!(user_id = %event.user_id, "session start re-stamped");
            Outcome::Refreshed { at }
        } else {
            sessions.open(&event.user_id, at);
            drop(sessions);
            self.stats.session_opened();
            info!(
                user_id = %event.user_id,
                username = %event.username,
                "adopted session for user already in channel"
            );
            Outcome::Adopted { at }
        }
    }

    /// Merges `elapsed` into the stored record. Returns the new total, or
    /// `None` if it could not be read or written.
    ///
    /// Only additive mode reads the stored record; overwrite writes `elapsed`
    /// unconditionally.
    async fn merge_total(
        &self,
        event: &PresenceEvent,
        elapsed: SessionDuration,
        at: DateTime<Utc>,
    ) -> Option<SessionDuration> {
        let total = match self.config.accumulation {
            AccumulationMode::Overwrite => elapsed,
            AccumulationMode::Additive => {
                match self.store.find_cumulative_time(&event.user_id).await {
                    Ok(previous) => AccumulationMode::Additive
                        .merge(previous.map(|record| record.cumulative), elapsed),
                    Err(err) => {
                        self.persistence_failed(&err, "look up cumulative time record")
                            .await;
                        return None;
                    }
                }
            }
        };
        let record = CumulativeTimeRecord {
            user_id: event.user_id.clone(),
            username: event.username.clone(),
            cumulative: total,
            last_updated_at: at,
        };
        match self
            .store
            .upsert_cumulative_time(&event.user_id, &record)
            .await
        {
            Ok(()) => Some(total),
            Err(err) => {
                self.persistence_failed(&err, "update cumulative time record")
                    .await;
                None
            }
        }
    }

    async fn audit(&self, event: &PresenceEvent, action: AuditAction, at: DateTime<Utc>) {
        let entry = AuditEntry {
            username: event.username.clone(),
            user_id: event.user_id.clone(),
            action,
            timestamp: at,
        };
        if let Err(err) = self.store.append_audit_entry(&entry).await {
            self.persistence_failed(&err, "append audit entry").await;
        }
    }

    async fn send(&self, notification: Notification) {
        let role = notification.role();
        if let Err(err) = self.notifier.notify(role, &notification).await {
            warn!(%role, error = %err, "failed to send notification");
            self.stats.notification_failure();
        }
    }

    async fn persistence_failed(&self, err: &PersistenceError, operation: &str) {
        error!(operation, error = %err, "persistence failed, continuing with in-memory state");
        self.stats.persistence_failure();
        let message = format!("{operation} failed: {err}");
        if let Err(report_err) = self.notifier.report_failure(&message).await {
            warn!(error = %report_err, "failed to report persistence failure");
            self.stats.notification_failure();
        }
    }

    fn ignore_duplicate(&self, event: &PresenceEvent, classification: Classification) -> Outcome {
        debug!(
            user_id = %event.user_id,
            %classification,
            "duplicate presence event ignored"
        );
        self.stats.duplicate_ignored();
        Outcome::DuplicateIgnored(classification)
    }

    fn sessions(&self) -> MutexGuard<'_, SessionStore> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::clock::ManualClock;
    use crate::traits::{ChannelRole, NotifyError};

    const TRACKED: &str = "1000";
    const LOBBY: &str = "2000";

    #[derive(Default)]
    struct MemoryStore {
        audit: Mutex<Vec<AuditEntry>>,
        totals: Mutex<HashMap<UserId, CumulativeTimeRecord>>,
        failing: AtomicBool,
        failing_find: AtomicBool,
    }

    impl MemoryStore {
        fn check(&self) -> Result<(), PersistenceError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(PersistenceError::new("database is locked"));
            }
            Ok(())
        }

        fn check_find(&self) -> Result<(), PersistenceError> {
            if self.failing_find.load(Ordering::SeqCst) {
                return Err(PersistenceError::new("no such table: user_total_time"));
            }
            self.check()
        }

        fn audit(&self) -> Vec<AuditEntry> {
            self.audit.lock().unwrap().clone()
        }

        fn total(&self, user: &UserId) -> Option<CumulativeTimeRecord> {
            self.totals.lock().unwrap().get(user).cloned()
        }
    }

    #[async_trait]
    impl PresenceStore for MemoryStore {
        async fn append_audit_entry(&self, entry: &AuditEntry) -> Result<(), PersistenceError> {
            tokio::task::yield_now().await;
            self.check()?;
            self.audit.lock().unwrap().push(entry.clone());
            Ok(())
        }

        async fn upsert_cumulative_time(
            &self,
            user_id: &UserId,
            record: &CumulativeTimeRecord,
        ) -> Result<(), PersistenceError> {
            tokio::task::yield_now().await;
            self.check()?;
            self.totals
                .lock()
                .unwrap()
                .insert(user_id.clone(), record.clone());
            Ok(())
        }

        async fn find_cumulative_time(
            &self,
            user_id: &UserId,
        ) -> Result<Option<CumulativeTimeRecord>, PersistenceError> {
            tokio::task::yield_now().await;
            self.check_find()?;
            Ok(self.total(user_id))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(ChannelRole, Notification)>>,
        reports: Mutex<Vec<String>>,
        failing: AtomicBool,
    }

    impl RecordingNotifier {
        fn sent(&self) -> Vec<(ChannelRole, Notification)> {
            self.sent.lock().unwrap().clone()
        }

        fn roles(&self) -> Vec<ChannelRole> {
            self.sent().into_iter().map(|(role, _)| role).collect()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(
            &self,
            role: ChannelRole,
            notification: &Notification,
        ) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push((role, notification.clone()));
            if self.failing.load(Ordering::SeqCst) {
                return Err(NotifyError::new("Missing Access"));
            }
            Ok(())
        }

        async fn report_failure(&self, message: &str) -> Result<(), NotifyError> {
            self.reports.lock().unwrap().push(message.to_string());
            if self.failing.load(Ordering::SeqCst) {
                return Err(NotifyError::new("Missing Access"));
            }
            Ok(())
        }
    }

    struct Harness {
        coordinator: Coordinator,
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        clock: Arc<ManualClock>,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn harness(accumulation: AccumulationMode) -> Harness {
        let store = Arc::new(MemoryStore::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(ManualClock::new(t0()));
        let config = TrackerConfig::new(ChannelId::new(TRACKED).unwrap())
            .with_accumulation(accumulation);
        let coordinator = Coordinator::new(
            config,
            Arc::clone(&store) as Arc<dyn PresenceStore>,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        Harness {
            coordinator,
            store,
            notifier,
            clock,
        }
    }

    fn user() -> UserId {
        UserId::new("42").unwrap()
    }

    fn event(previous: Option<&str>, new: Option<&str>) -> PresenceEvent {
        PresenceEvent::new(
            user(),
            "alice",
            previous.map(|id| ChannelId::new(id).unwrap()),
            new.map(|id| ChannelId::new(id).unwrap()),
        )
    }

    fn enter() -> PresenceEvent {
        event(None, Some(TRACKED))
    }

    fn leave() -> PresenceEvent {
        event(Some(TRACKED), None)
    }

    fn mute() -> PresenceEvent {
        event(Some(TRACKED), Some(TRACKED))
    }

    #[tokio::test]
    async fn enter_then_leave_records_session() {
        let h = harness(AccumulationMode::Overwrite);

        assert_eq!(
            h.coordinator.handle(enter()).await,
            Outcome::Opened { at: t0() }
        );
        h.clock.advance(Duration::seconds(125));
        let outcome = h.coordinator.handle(leave()).await;

        let two_five = SessionDuration::from_seconds(125);
        assert_eq!(
            outcome,
            Outcome::Closed {
                entered_at: t0(),
                left_at: t0() + Duration::seconds(125),
                elapsed: two_five,
                total: Some(two_five),
            }
        );

        let audit = h.store.audit();
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[0].action, AuditAction::Join);
        assert_eq!(audit[0].timestamp, t0());
        assert_eq!(audit[1].action, AuditAction::Leave);
        assert_eq!(audit[1].timestamp, t0() + Duration::seconds(125));

        let record = h.store.total(&user()).unwrap();
        assert_eq!(record.cumulative.to_string(), "0h 2m 5s");
        assert_eq!(record.username, "alice");

        assert_eq!(
            h.notifier.roles(),
            vec![ChannelRole::Enter, ChannelRole::Leave, ChannelRole::TotalTime]
        );
        assert_eq!(
            h.notifier.sent()[2].1,
            Notification::TotalTime {
                username: "alice".to_string(),
                total: two_five,
                as_of: t0() + Duration::seconds(125),
            }
        );
        assert!(!h.coordinator.is_tracking(&user()));
    }

    #[tokio::test]
    async fn first_join_creates_zero_record() {
        let h = harness(AccumulationMode::Overwrite);
        h.coordinator.handle(enter()).await;

        let record = h.store.total(&user()).unwrap();
        assert!(record.cumulative.is_zero());
        assert_eq!(record.last_updated_at, t0());
    }

    #[tokio::test]
    async fn join_keeps_existing_record() {
        let h = harness(AccumulationMode::Overwrite);
        let existing = CumulativeTimeRecord {
            user_id: user(),
            username: "alice".to_string(),
            cumulative: SessionDuration::from_seconds(600),
            last_updated_at: t0() - Duration::days(1),
        };
        h.store
            .totals
            .lock()
            .unwrap()
            .insert(user(), existing.clone());

        h.coordinator.handle(enter()).await;
        assert_eq!(h.store.total(&user()), Some(existing));
    }

    #[tokio::test]
    async fn leave_without_session_is_a_no_op() {
        let h = harness(AccumulationMode::Overwrite);

        assert_eq!(
            h.coordinator.handle(leave()).await,
            Outcome::DuplicateIgnored(Classification::Left)
        );
        assert!(h.store.audit().is_empty());
        assert!(h.store.total(&user()).is_none());
        assert!(h.notifier.sent().is_empty());
        assert_eq!(h.coordinator.stats().duplicates_ignored, 1);
    }

    #[tokio::test]
    async fn second_leave_is_a_no_op() {
        let h = harness(AccumulationMode::Overwrite);
        h.coordinator.handle(enter()).await;
        h.clock.advance(Duration::seconds(10));
        h.coordinator.handle(leave()).await;
        let sent = h.notifier.sent().len();

        h.clock.advance(Duration::seconds(10));
        assert_eq!(
            h.coordinator.handle(leave()).await,
            Outcome::DuplicateIgnored(Classification::Left)
        );
        assert_eq!(h.store.audit().len(), 2);
        assert_eq!(h.notifier.sent().len(), sent);
        assert_eq!(
            h.store.total(&user()).unwrap().cumulative,
            SessionDuration::from_seconds(10)
        );
    }

    #[tokio::test]
    async fn enter_while_tracking_keeps_original_start() {
        let h = harness(AccumulationMode::Overwrite);
        h.coordinator.handle(enter()).await;

        h.clock.advance(Duration::seconds(30));
        assert_eq!(
            h.coordinator.handle(event(Some(LOBBY), Some(TRACKED))).await,
            Outcome::DuplicateIgnored(Classification::Entered)
        );

        assert_eq!(h.coordinator.entered_at(&user()), Some(t0()));
        let joins = h
            .store
            .audit()
            .iter()
            .filter(|entry| entry.action == AuditAction::Join)
            .count();
        assert_eq!(joins, 1);
        assert_eq!(h.notifier.roles(), vec![ChannelRole::Enter]);
    }

    #[tokio::test]
    async fn same_channel_update_restamps_start() {
        let h = harness(AccumulationMode::Overwrite);
        h.coordinator.handle(enter()).await;

        h.clock.advance(Duration::seconds(60));
        assert_eq!(
            h.coordinator.handle(mute()).await,
            Outcome::Refreshed {
                at: t0() + Duration::seconds(60)
            }
        );

        h.clock.advance(Duration::seconds(40));
        let Outcome::Closed { elapsed, .. } = h.coordinator.handle(leave()).await else {
            panic!("expected session to close");
        };
        assert_eq!(elapsed, SessionDuration::from_seconds(40));
    }

    #[tokio::test]
    async fn same_channel_update_without_session_adopts_silently() {
        let h = harness(AccumulationMode::Overwrite);

        assert_eq!(
            h.coordinator.handle(mute()).await,
            Outcome::Adopted { at: t0() }
        );
        assert!(h.coordinator.is_tracking(&user()));
        assert!(h.store.audit().is_empty());
        assert!(h.notifier.sent().is_empty());

        h.clock.advance(Duration::seconds(5));
        assert!(matches!(
            h.coordinator.handle(leave()).await,
            Outcome::Closed { .. }
        ));
        assert_eq!(h.store.audit().len(), 1);
    }

    #[tokio::test]
    async fn moving_to_another_channel_closes_session() {
        let h = harness(AccumulationMode::Overwrite);
        h.coordinator.handle(enter()).await;
        h.clock.advance(Duration::seconds(3));

        assert!(matches!(
            h.coordinator.handle(event(Some(TRACKED), Some(LOBBY))).await,
            Outcome::Closed { .. }
        ));
        assert_eq!(
            h.coordinator.handle(event(Some(LOBBY), None)).await,
            Outcome::Irrelevant
        );
    }

    #[tokio::test]
    async fn irrelevant_events_touch_nothing() {
        let h = harness(AccumulationMode::Overwrite);
        assert_eq!(
            h.coordinator.handle(event(None, Some(LOBBY))).await,
            Outcome::Irrelevant
        );
        assert_eq!(h.coordinator.open_sessions(), 0);
        assert!(h.store.audit().is_empty());
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn overwrite_mode_keeps_only_last_session() {
        let h = harness(AccumulationMode::Overwrite);
        for seconds in [300, 20] {
            h.coordinator.handle(enter()).await;
            h.clock.advance(Duration::seconds(seconds));
            h.coordinator.handle(leave()).await;
        }
        assert_eq!(
            h.store.total(&user()).unwrap().cumulative,
            SessionDuration::from_seconds(20)
        );
    }

    #[tokio::test]
    async fn additive_mode_sums_sessions() {
        let h = harness(AccumulationMode::Additive);
        for seconds in [300, 20] {
            h.coordinator.handle(enter()).await;
            h.clock.advance(Duration::seconds(seconds));
            h.coordinator.handle(leave()).await;
        }
        let record = h.store.total(&user()).unwrap();
        assert_eq!(record.cumulative.to_string(), "0h 5m 20s");
        assert_eq!(record.last_updated_at, t0() + Duration::seconds(320));
    }

    #[tokio::test]
    async fn persistence_failure_keeps_in_memory_state() {
        let h = harness(AccumulationMode::Overwrite);
        h.store.failing.store(true, Ordering::SeqCst);

        assert_eq!(
            h.coordinator.handle(enter()).await,
            Outcome::Opened { at: t0() }
        );
        assert!(h.coordinator.is_tracking(&user()));

        h.clock.advance(Duration::seconds(9));
        let outcome = h.coordinator.handle(leave()).await;
        assert_eq!(
            outcome,
            Outcome::Closed {
                entered_at: t0(),
                left_at: t0() + Duration::seconds(9),
                elapsed: SessionDuration::from_seconds(9),
                total: None,
            }
        );

        assert!(!h.coordinator.is_tracking(&user()));
        assert_eq!(
            h.notifier.roles(),
            vec![ChannelRole::Enter, ChannelRole::Leave]
        );
        let stats = h.coordinator.stats();
        assert_eq!(stats.persistence_failures, 4);
        assert_eq!(h.notifier.reports.lock().unwrap().len(), 4);
        assert!(h.notifier.reports.lock().unwrap()[0].starts_with("append audit entry failed"));
    }

    #[tokio::test]
    async fn overwrite_mode_persists_total_when_lookup_fails() {
        let h = harness(AccumulationMode::Overwrite);
        h.coordinator.handle(enter()).await;
        h.clock.advance(Duration::seconds(125));
        h.store.failing_find.store(true, Ordering::SeqCst);

        let two_five = SessionDuration::from_seconds(125);
        let Outcome::Closed { total, .. } = h.coordinator.handle(leave()).await else {
            panic!("expected session to close");
        };
        assert_eq!(total, Some(two_five));
        assert_eq!(h.store.total(&user()).unwrap().cumulative, two_five);
        assert_eq!(
            h.notifier.roles(),
            vec![ChannelRole::Enter, ChannelRole::Leave, ChannelRole::TotalTime]
        );
        assert_eq!(h.coordinator.stats().persistence_failures, 0);
    }

    #[tokio::test]
    async fn additive_mode_skips_total_when_lookup_fails() {
        let h = harness(AccumulationMode::Additive);
        h.coordinator.handle(enter()).await;
        h.clock.advance(Duration::seconds(125));
        h.store.failing_find.store(true, Ordering::SeqCst);

        let Outcome::Closed { total, .. } = h.coordinator.handle(leave()).await else {
            panic!("expected session to close");
        };
        assert_eq!(total, None);
        assert_eq!(
            h.store.total(&user()).unwrap().cumulative,
            SessionDuration::ZERO
        );
        assert_eq!(
            h.notifier.roles(),
            vec![ChannelRole::Enter, ChannelRole::Leave]
        );
        assert_eq!(h.coordinator.stats().persistence_failures, 1);
        assert!(h.notifier.reports.lock().unwrap()[0].starts_with("look up cumulative time record failed"));
    }

    #[tokio::test]
    async fn notification_failures_do_not_interrupt_tracking() {
        let h = harness(AccumulationMode::Overwrite);
        h.notifier.failing.store(true, Ordering::SeqCst);

        assert_eq!(
            h.coordinator.handle(enter()).await,
            Outcome::Opened { at: t0() }
        );
        h.clock.advance(Duration::seconds(61));
        let Outcome::Closed { total, .. } = h.coordinator.handle(leave()).await else {
            panic!("expected session to close");
        };

        assert!(!h.coordinator.is_tracking(&user()));
        assert_eq!(total, Some(SessionDuration::from_seconds(61)));
        let audit = h.store.audit();
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[1].action, AuditAction::Leave);
        assert_eq!(
            h.store.total(&user()).unwrap().cumulative.to_string(),
            "0h 1m 1s"
        );

        let stats = h.coordinator.stats();
        assert_eq!(stats.notification_failures, 3);
        assert_eq!(stats.persistence_failures, 0);
        assert_eq!(h.notifier.sent().len(), 3);
    }

    #[tokio::test]
    async fn failed_failure_report_is_counted() {
        let h = harness(AccumulationMode::Overwrite);
        h.store.failing.store(true, Ordering::SeqCst);
        h.notifier.failing.store(true, Ordering::SeqCst);

        h.coordinator.handle(enter()).await;
        assert!(h.coordinator.is_tracking(&user()));

        // Two persistence reports and one join notification, all rejected.
        let stats = h.coordinator.stats();
        assert_eq!(stats.persistence_failures, 2);
        assert_eq!(stats.notification_failures, 3);
    }

    #[tokio::test]
    async fn clock_going_backwards_yields_zero_duration() {
        let h = harness(AccumulationMode::Overwrite);
        h.coordinator.handle(enter()).await;
        h.clock.set(t0() - Duration::seconds(30));

        let Outcome::Closed { elapsed, total, .. } = h.coordinator.handle(leave()).await else {
            panic!("expected session to close");
        };
        assert_eq!(elapsed, SessionDuration::ZERO);
        assert_eq!(total, Some(SessionDuration::ZERO));
        assert_eq!(h.coordinator.stats().malformed_timestamps, 1);
    }

    #[tokio::test]
    async fn every_short_event_sequence_keeps_at_most_one_session() {
        let kinds = [enter(), leave(), mute(), event(Some(LOBBY), None)];
        for code in 0..kinds.len().pow(4) {
            let h = harness(AccumulationMode::Additive);
            let mut rest = code;
            for _ in 0..4 {
                h.coordinator.handle(kinds[rest % kinds.len()].clone()).await;
                rest /= kinds.len();
                assert!(h.coordinator.open_sessions() <= 1, "sequence {code}");
            }

            let audit = h.store.audit();
            let joins = audit.iter().filter(|e| e.action == AuditAction::Join).count();
            let leaves = audit.len() - joins;
            // Adopted sessions close with a leave but never wrote a join.
            assert!(joins <= leaves + 1, "sequence {code}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_duplicate_enters_write_one_join() {
        let h = harness(AccumulationMode::Overwrite);
        let coordinator = Arc::new(h.coordinator);

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let coordinator = Arc::clone(&coordinator);
            tasks.push(tokio::spawn(async move { coordinator.handle(enter()).await }));
        }
        let mut opened = 0;
        for task in tasks {
            if matches!(task.await.unwrap(), Outcome::Opened { .. }) {
                opened += 1;
            }
        }

        assert_eq!(opened, 1);
        assert_eq!(h.store.audit().len(), 1);
        assert_eq!(h.notifier.roles(), vec![ChannelRole::Enter]);
        assert_eq!(coordinator.stats().duplicates_ignored, 15);
    }
}
