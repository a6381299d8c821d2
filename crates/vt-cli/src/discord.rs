//! Discord gateway adapter: voice state updates in, channel messages out.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::FixedOffset;
use serenity::all::{ChannelId as DiscordChannelId, Context, EventHandler, Http, Ready, VoiceState};
use tracing::{debug, info};

use vt_core::{ChannelId, ChannelRole, Coordinator, Notification, Notifier, NotifyError, PresenceEvent, UserId};

use crate::messages;

/// Destination text channels per notification role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Routes {
    pub enter: DiscordChannelId,
    pub leave: DiscordChannelId,
    pub total_time: DiscordChannelId,
    pub operator: Option<DiscordChannelId>,
}

impl Routes {
    pub const fn channel_for(&self, role: ChannelRole) -> DiscordChannelId {
        match role {
            ChannelRole::Enter => self.enter,
            ChannelRole::Leave => self.leave,
            ChannelRole::TotalTime => self.total_time,
        }
    }
}

/// Posts tracker notifications to Discord text channels.
pub struct DiscordNotifier {
    http: Arc<Http>,
    routes: Routes,
    offset: FixedOffset,
}

impl DiscordNotifier {
    pub const fn new(http: Arc<Http>, routes: Routes, offset: FixedOffset) -> Self {
        Self {
            http,
            routes,
            offset,
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, role: ChannelRole, notification: &Notification) -> Result<(), NotifyError> {
        let channel = self.routes.channel_for(role);
        let content = messages::render(notification, self.offset);
        channel
            .say(&self.http, content)
            .await
            .map(|_| ())
            .map_err(|err| NotifyError::new(err.to_string()))
    }

    async fn report_failure(&self, message: &str) -> Result<(), NotifyError> {
        let Some(channel) = self.routes.operator else {
            return Ok(());
        };
        channel
            .say(&self.http, messages::render_failure(message))
            .await
            .map(|_| ())
            .map_err(|err| NotifyError::new(err.to_string()))
    }
}

/// Which voice updates reach the coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub guild_id: Option<u64>,
    pub ignore_bots: bool,
}

/// The parts of a voice state update the tracker cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceChange {
    pub guild_id: Option<u64>,
    pub user_id: u64,
    pub username: Option<String>,
    pub is_bot: bool,
    pub previous_channel: Option<u64>,
    pub new_channel: Option<u64>,
}

impl VoiceChange {
    /// Extracts a change from the cached old state and the new state.
    ///
    /// On disconnect the gateway may omit the member from the new state, so
    /// the old state's member is used as a fallback.
    pub fn from_states(old: Option<&VoiceState>, new: &VoiceState) -> Self {
        let member = new
            .member
            .as_ref()
            .or_else(|| old.and_then(|state| state.member.as_ref()));
        Self {
            guild_id: new
                .guild_id
                .or_else(|| old.and_then(|state| state.guild_id))
                .map(|id| id.get()),
            user_id: new.user_id.get(),
            username: member.map(|m| m.user.name.clone()),
            is_bot: member.is_some_and(|m| m.user.bot),
            previous_channel: old.and_then(|state| state.channel_id).map(|id| id.get()),
            new_channel: new.channel_id.map(|id| id.get()),
        }
    }

    /// Converts to a presence event, or `None` if the filter drops it.
    ///
    /// A missing member never drops the event: losing a leave would strand
    /// an open session. The user ID stands in for the name instead.
    pub fn into_event(self, filter: &EventFilter) -> Option<PresenceEvent> {
        if filter
            .guild_id
            .is_some_and(|wanted| self.guild_id != Some(wanted))
        {
            return None;
        }
        if filter.ignore_bots && self.is_bot {
            return None;
        }
        let username = self.username.unwrap_or_else(|| self.user_id.to_string());
        Some(PresenceEvent::new(
            UserId::from(self.user_id),
            username,
            self.previous_channel.map(ChannelId::from),
            self.new_channel.map(ChannelId::from),
        ))
    }
}

/// Feeds voice state updates into the coordinator.
pub struct PresenceHandler {
    coordinator: Arc<Coordinator>,
    filter: EventFilter,
}

impl PresenceHandler {
    pub const fn new(coordinator: Arc<Coordinator>, filter: EventFilter) -> Self {
        Self {
            coordinator,
            filter,
        }
    }
}

#[async_trait]
impl EventHandler for PresenceHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            bot = %ready.user.name,
            tracked_channel = %self.coordinator.config().tracked_channel,
            "connected to Discord gateway"
        );
    }

    async fn voice_state_update(&self, _ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let change = VoiceChange::from_states(old.as_ref(), &new);
        let Some(event) = change.into_event(&self.filter) else {
            debug!(user_id = new.user_id.get(), "voice update filtered out");
            return;
        };
        let outcome = self.coordinator.handle(event).await;
        debug!(?outcome, "presence event handled");
    }
}
