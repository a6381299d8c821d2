//! User-facing text for tracker notifications.

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};

use vt_core::Notification;

/// Renders a notification as a Discord message.
pub fn render(notification: &Notification, offset: FixedOffset) -> String {
    match notification {
        Notification::Joined { username, at } => format!(
            "```User {username} joined the voice channel at {}```",
            local(*at, offset)
        ),
        Notification::Left { username, at } => format!(
            "```User {username} left the voice channel at {}```",
            local(*at, offset)
        ),
        Notification::TotalTime {
            username,
            total,
            as_of,
        } => format!(
            "```User {username} spent a total of {} hours, {} minutes, and {} seconds in the voice channel until {}.```",
            total.hours,
            total.minutes,
            total.seconds,
            local(*as_of, offset)
        ),
    }
}

/// Renders an operator alert.
pub fn render_failure(message: &str) -> String {
    format!("⚠️ {message}")
}

fn local(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset)
        .to_rfc3339_opts(SecondsFormat::Secs, false)
}
