//! Core domain logic for the voice channel time tracker.
//!
//! This crate contains:
//! - Duration arithmetic for sessions
//! - The in-memory session store
//! - Classification of voice presence changes
//! - The session lifecycle coordinator and its collaborator traits

pub mod classify;
pub mod clock;
pub mod coordinator;
pub mod duration;
pub mod event;
pub mod lock;
pub mod record;
pub mod session;
mod stats;
pub mod traits;
pub mod types;

pub use classify::{Classification, classify};
pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{Coordinator, Outcome, TrackerConfig};
pub use duration::{DurationError, SessionDuration, elapsed, elapsed_from_text, elapsed_or_zero};
pub use event::PresenceEvent;
pub use record::{AccumulationMode, AuditAction, AuditEntry, CumulativeTimeRecord, InvalidAuditAction};
pub use session::SessionStore;
pub use stats::{StatsSnapshot, TrackerStats};
pub use traits::{
    ChannelRole, Notification, Notifier, NotifyError, PersistenceError, PresenceStore,
};
pub use types::{ChannelId, UserId, ValidationError};
