//! Presence notifications delivered by the gateway adapter.

use serde::{Deserialize, Serialize};

use crate::types::{ChannelId, UserId};

/// A user's voice channel membership changed.
///
/// Either side may be absent: `previous_channel` is `None` when the user was
/// not connected (or the gateway did not have the old state cached), and
/// `new_channel` is `None` on disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub user_id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_channel: Option<ChannelId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_channel: Option<ChannelId>,
}

impl PresenceEvent {
    pub fn new(
        user_id: UserId,
        username: impl Into<String>,
        previous_channel: Option<ChannelId>,
        new_channel: Option<ChannelId>,
    ) -> Self {
        Self {
            user_id,
            username: username.into(),
            previous_channel,
            new_channel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_channels_deserialize_as_none() {
        let json = r#"{"user_id": "7", "username": "alice"}"#;
        let event: PresenceEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.previous_channel, None);
        assert_eq!(event.new_channel, None);
        assert_eq!(event.user_id, UserId::from(7));
    }
}
