//! Configuration loading for the musicbot daemon
//!
//! All settings come from one TOML file resolved in priority order:
//! 1. Command-line argument (`--config`)
//! 2. `MUSICBOT_CONFIG` environment variable
//! 3. `/etc/musicbot/musicbot.toml`
//!
//! Every field has a built-in default, so a minimal file only needs the
//! values that differ from a stock install.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::bus::BusConfig;
use crate::{Error, Result};

const DEFAULT_CONFIG_PATH: &str = "/etc/musicbot/musicbot.toml";
const CONFIG_ENV_VAR: &str = "MUSICBOT_CONFIG";

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MusicBotConfig {
    #[serde(default)]
    pub irc: IrcConfig,
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub downloads: DownloadConfig,
    #[serde(default)]
    pub bus: BusConfig,
}

/// Chat identity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrcConfig {
    /// Nickname the bot answers to
    #[serde(default = "default_nickname")]
    pub nickname: String,

    /// Channel where unsolicited announcements are posted
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Command sigil, e.g. `!` in `!request`
    #[serde(default = "default_command_char")]
    pub command_char: String,
}

/// General bot behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// URL announced by the `radio` command
    #[serde(default)]
    pub stream_url: String,

    /// Log filter directive when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Player transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_player_host")]
    pub host: String,

    #[serde(default = "default_player_port")]
    pub port: u16,

    /// Optional transport password
    #[serde(default)]
    pub password: Option<String>,

    /// Seconds between playlist polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Seconds to wait before a reconnect attempt
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_secs: u64,
}

/// Download pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Library directory the player serves from
    #[serde(default = "default_music_dir")]
    pub music_dir: PathBuf,

    /// Scratch directory for in-flight downloads
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,

    /// Downloader binary, yt-dlp compatible
    #[serde(default = "default_downloader_bin")]
    pub downloader_bin: String,

    /// Tag tool binary, id3v2 compatible
    #[serde(default = "default_id3_bin")]
    pub id3_bin: String,

    /// Tracks longer than this are refused
    #[serde(default = "default_max_song_minutes")]
    pub max_song_minutes: i64,

    /// Concurrent download workers
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            nickname: default_nickname(),
            channel: default_channel(),
            command_char: default_command_char(),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            stream_url: String::new(),
            log_level: default_log_level(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            host: default_player_host(),
            port: default_player_port(),
            password: None,
            poll_interval_secs: default_poll_interval(),
            reconnect_interval_secs: default_reconnect_interval(),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            music_dir: default_music_dir(),
            tmp_dir: default_tmp_dir(),
            downloader_bin: default_downloader_bin(),
            id3_bin: default_id3_bin(),
            max_song_minutes: default_max_song_minutes(),
            workers: default_workers(),
        }
    }
}

fn default_nickname() -> String {
    "musicbot".to_string()
}

fn default_channel() -> String {
    "#musicbot".to_string()
}

fn default_command_char() -> String {
    "!".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_player_host() -> String {
    "localhost".to_string()
}

fn default_player_port() -> u16 {
    6600
}

fn default_poll_interval() -> u64 {
    1
}

fn default_reconnect_interval() -> u64 {
    5
}

fn default_music_dir() -> PathBuf {
    PathBuf::from("/var/lib/musicbot/music")
}

fn default_tmp_dir() -> PathBuf {
    PathBuf::from("/var/lib/musicbot/tmp")
}

fn default_downloader_bin() -> String {
    "yt-dlp".to_string()
}

fn default_id3_bin() -> String {
    "id3v2".to_string()
}

fn default_max_song_minutes() -> i64 {
    10
}

fn default_workers() -> usize {
    2
}

impl MusicBotConfig {
    /// Load configuration from the resolved path.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let path = resolve_config_path(cli_path);
        info!(path = %path.display(), "loading configuration");
        let content = std::fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse a TOML document into a validated configuration.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: MusicBotConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.downloads.max_song_minutes <= 0 {
            return Err(Error::Config(
                "downloads.max_song_minutes must be positive".to_string(),
            ));
        }
        if self.downloads.workers == 0 {
            return Err(Error::Config(
                "downloads.workers must be at least 1".to_string(),
            ));
        }
        if self.bus.max_subscribers == 0 {
            return Err(Error::Config(
                "bus.max_subscribers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Config file path following priority order: CLI argument, environment
/// variable, then the compiled default.
fn resolve_config_path(cli_arg: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config = MusicBotConfig::from_toml("").unwrap();
        assert_eq!(config.irc.nickname, "musicbot");
        assert_eq!(config.irc.command_char, "!");
        assert_eq!(config.player.port, 6600);
        assert_eq!(config.downloads.max_song_minutes, 10);
        assert_eq!(config.bus.max_subscribers, 16);
    }

    #[test]
    fn test_partial_sections_merge_with_defaults() {
        let toml = r##"
            [irc]
            nickname = "dj"
            channel = "#radio"

            [player]
            host = "music.local"

            [downloads]
            max_song_minutes = 15
        "##;
        let config = MusicBotConfig::from_toml(toml).unwrap();
        assert_eq!(config.irc.nickname, "dj");
        assert_eq!(config.irc.channel, "#radio");
        assert_eq!(config.player.host, "music.local");
        assert_eq!(config.player.port, 6600);
        assert_eq!(config.downloads.max_song_minutes, 15);
        assert_eq!(config.downloads.downloader_bin, "yt-dlp");
    }

    #[test]
    fn test_invalid_max_song_minutes_rejected() {
        let toml = r#"
            [downloads]
            max_song_minutes = 0
        "#;
        let err = MusicBotConfig::from_toml(toml).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let toml = r#"
            [downloads]
            workers = 0
        "#;
        assert!(MusicBotConfig::from_toml(toml).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("musicbot.toml");
        std::fs::write(&path, "[irc]\nnickname = \"filebot\"\n").unwrap();
        let config = MusicBotConfig::load(Some(path.as_path())).unwrap();
        assert_eq!(config.irc.nickname, "filebot");
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = MusicBotConfig::load(Some(Path::new("/nonexistent/musicbot.toml")))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
