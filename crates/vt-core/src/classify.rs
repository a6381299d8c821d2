//! Classification of voice presence changes relative to the tracked channel.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::ChannelId;

/// What a presence change means for the tracked channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Moved into the tracked channel from elsewhere, or connected to it.
    Entered,
    /// Moved out of the tracked channel, or disconnected from it.
    Left,
    /// Still in the tracked channel (mute, deafen, stream toggles).
    StillPresent,
    /// Neither side of the change is the tracked channel.
    Irrelevant,
}

impl Classification {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Entered => "entered",
            Self::Left => "left",
            Self::StillPresent => "still_present",
            Self::Irrelevant => "irrelevant",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a change from `previous` to `new` against `tracked`.
pub fn classify(
    previous: Option<&ChannelId>,
    new: Option<&ChannelId>,
    tracked: &ChannelId,
) -> Classification {
    let was_in = previous == Some(tracked);
    let is_in = new == Some(tracked);

    match (was_in, is_in) {
        (false, true) => Classification::Entered,
        (true, false) => Classification::Left,
        (true, true) => Classification::StillPresent,
        (false, false) => Classification::Irrelevant,
    }
}
