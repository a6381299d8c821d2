//! Run command: connects to Discord and tracks the configured channel.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::FixedOffset;
use serenity::all::{ChannelId as DiscordChannelId, GatewayIntents, Http};
use serenity::Client;
use tracing::info;

use vt_core::{ChannelId, Clock, Coordinator, Notifier, PresenceStore, SystemClock, TrackerConfig};
use vt_db::{Database, SharedDatabase};

use crate::Config;
use crate::discord::{DiscordNotifier, EventFilter, PresenceHandler, Routes};

/// Settings `vt run` cannot start without.
#[derive(Clone)]
pub struct BotSettings {
    pub token: String,
    pub tracked_channel: ChannelId,
    pub routes: Routes,
    pub filter: EventFilter,
    pub offset: FixedOffset,
}

impl fmt::Debug for BotSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotSettings")
            .field("token", &"[REDACTED]")
            .field("tracked_channel", &self.tracked_channel)
            .field("routes", &self.routes)
            .field("filter", &self.filter)
            .field("offset", &self.offset)
            .finish()
    }
}

impl BotSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        let token = config
            .discord_token
            .clone()
            .filter(|token| !token.trim().is_empty())
            .context("discord_token is not configured (set VT_DISCORD_TOKEN)")?;
        let tracked = required(config.tracked_channel_id, "tracked_channel_id")?;
        let routes = Routes {
            enter: DiscordChannelId::new(required(config.enter_channel_id, "enter_channel_id")?),
            leave: DiscordChannelId::new(required(config.leave_channel_id, "leave_channel_id")?),
            total_time: DiscordChannelId::new(required(
                config.total_time_channel_id,
                "total_time_channel_id",
            )?),
            operator: config
                .operator_channel_id
                .filter(|&id| id != 0)
                .map(DiscordChannelId::new),
        };
        let offset = config
            .display_offset()
            .with_context(|| format!("invalid display_offset: {}", config.display_offset))?;

        Ok(Self {
            token,
            tracked_channel: ChannelId::from(tracked),
            routes,
            filter: EventFilter {
                guild_id: config.guild_id,
                ignore_bots: config.ignore_bots,
            },
            offset,
        })
    }
}

/// Discord IDs are non-zero; `ChannelId::new` panics on zero.
fn required(value: Option<u64>, key: &str) -> Result<u64> {
    match value {
        Some(0) => anyhow::bail!("{key} must be a non-zero Discord ID"),
        Some(id) => Ok(id),
        None => anyhow::bail!("{key} is not configured"),
    }
}

pub async fn run(config: &Config) -> Result<()> {
    let settings = BotSettings::from_config(config)?;

    let db = Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    let store: Arc<dyn PresenceStore> = Arc::new(SharedDatabase::new(db));

    let notifier: Arc<dyn Notifier> = Arc::new(DiscordNotifier::new(
        Arc::new(Http::new(&settings.token)),
        settings.routes,
        settings.offset,
    ));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let tracker = TrackerConfig::new(settings.tracked_channel.clone())
        .with_accumulation(config.accumulation);
    let coordinator = Arc::new(Coordinator::new(tracker, store, notifier, clock));

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;
    let mut client = Client::builder(&settings.token, intents)
        .event_handler(PresenceHandler::new(
            Arc::clone(&coordinator),
            settings.filter,
        ))
        .await
        .context("failed to build Discord client")?;

    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down");
            shard_manager.shutdown_all().await;
        }
    });

    info!(
        tracked_channel = %settings.tracked_channel,
        accumulation = ?config.accumulation,
        database = %config.database_path.display(),
        "starting tracker"
    );
    client.start().await.context("Discord client stopped")?;

    info!(
        stats = ?coordinator.stats(),
        dropped_open_sessions = coordinator.open_sessions(),
        "tracker stopped"
    );
    Ok(())
}
