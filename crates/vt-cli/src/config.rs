//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::FixedOffset;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use vt_core::AccumulationMode;

/// Offset used when rendering timestamps in messages (Asia/Bangkok).
const DEFAULT_DISPLAY_OFFSET: &str = "+07:00";

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,

    /// Discord bot token.
    #[serde(default)]
    pub discord_token: Option<String>,

    /// Only accept voice updates from this guild.
    #[serde(default)]
    pub guild_id: Option<u64>,

    /// The voice channel to track.
    #[serde(default)]
    pub tracked_channel_id: Option<u64>,

    /// Text channel for join messages.
    #[serde(default)]
    pub enter_channel_id: Option<u64>,

    /// Text channel for leave messages.
    #[serde(default)]
    pub leave_channel_id: Option<u64>,

    /// Text channel for total-time messages.
    #[serde(default)]
    pub total_time_channel_id: Option<u64>,

    /// Text channel for persistence failure reports.
    #[serde(default)]
    pub operator_channel_id: Option<u64>,

    /// How closed sessions are merged into the stored total.
    #[serde(default)]
    pub accumulation: AccumulationMode,

    /// UTC offset for timestamps in messages, e.g. `+07:00`.
    pub display_offset: String,

    /// Skip voice updates from bot accounts.
    pub ignore_bots: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field(
                "discord_token",
                &self.discord_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("guild_id", &self.guild_id)
            .field("tracked_channel_id", &self.tracked_channel_id)
            .field("enter_channel_id", &self.enter_channel_id)
            .field("leave_channel_id", &self.leave_channel_id)
            .field("total_time_channel_id", &self.total_time_channel_id)
            .field("operator_channel_id", &self.operator_channel_id)
            .field("accumulation", &self.accumulation)
            .field("display_offset", &self.display_offset)
            .field("ignore_bots", &self.ignore_bots)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("vt.db"),
            discord_token: None,
            guild_id: None,
            tracked_channel_id: None,
            enter_channel_id: None,
            leave_channel_id: None,
            total_time_channel_id: None,
            operator_channel_id: None,
            accumulation: AccumulationMode::default(),
            display_offset: DEFAULT_DISPLAY_OFFSET.to_string(),
            ignore_bots: true,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (VT_*)
        figment = figment.merge(Env::prefixed("VT_"));

        figment.extract()
    }

    /// Parses `display_offset`.
    pub fn display_offset(&self) -> Result<FixedOffset, chrono::ParseError> {
        self.display_offset.parse()
    }
}

/// Returns the platform-specific config directory for vt.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("vt"))
}

/// Returns the platform-specific data directory for vt.
///
/// On Linux: `~/.local/share/vt`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("vt"))
}
