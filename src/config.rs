use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::logging::LogConfig;
use crate::playback::PlaybackConfig;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application metadata
    pub metadata: ConfigMetadata,

    /// Rider thresholds used for zone labels
    #[serde(default)]
    pub athlete: AthleteSettings,

    /// Playback timer settings
    #[serde(default)]
    pub playback: PlaybackConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LogConfig,
}

/// Configuration metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

/// Rider thresholds. Unset values show as "Set FTP" / "Set max HR".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AthleteSettings {
    /// Functional threshold power in watts
    pub ftp_watts: Option<i32>,

    /// Maximum heart rate in bpm
    pub max_hr: Option<i32>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let now = Utc::now();

        AppConfig {
            metadata: ConfigMetadata {
                version: "1.0".to_string(),
                created_at: now,
                updated_at: now,
            },
            athlete: AthleteSettings::default(),
            playback: PlaybackConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

fn parse_field<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("Invalid value for {}: {} ({})", key, value, e))
}

/// Empty or "none" clears an optional threshold
fn parse_optional<T: std::str::FromStr>(key: &str, value: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    parse_field(key, trimmed).map(Some)
}

fn show_optional<T: std::fmt::Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "none".to_string())
}

/// Configuration management implementation
impl AppConfig {
    /// Keys accepted by [`AppConfig::get_value`] and [`AppConfig::set_value`]
    pub const KEYS: [&'static str; 8] = [
        "athlete.ftp_watts",
        "athlete.max_hr",
        "playback.tick_interval_ms",
        "playback.average_interval_ms",
        "playback.max_sample_gap_secs",
        "logging.level",
        "logging.format",
        "logging.file_path",
    ];

    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".intervalrs")
            .join("config.toml")
    }

    /// Load from `path`, falling back to defaults when the file is missing or
    /// unreadable
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring invalid config file");
                Self::default()
            }
        }
    }

    /// Reject settings the player cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.athlete.ftp_watts.is_some_and(|ftp| ftp <= 0) {
            bail!("athlete.ftp_watts must be positive");
        }
        if self.athlete.max_hr.is_some_and(|hr| hr <= 0) {
            bail!("athlete.max_hr must be positive");
        }
        if self.playback.tick_interval_ms == 0 {
            bail!("playback.tick_interval_ms must be at least 1");
        }
        if self.playback.average_interval_ms == 0 {
            bail!("playback.average_interval_ms must be at least 1");
        }
        if !(self.playback.max_sample_gap_secs > 0.0) {
            bail!("playback.max_sample_gap_secs must be positive");
        }
        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Result<String> {
        let value = match key {
            "athlete.ftp_watts" => show_optional(&self.athlete.ftp_watts),
            "athlete.max_hr" => show_optional(&self.athlete.max_hr),
            "playback.tick_interval_ms" => self.playback.tick_interval_ms.to_string(),
            "playback.average_interval_ms" => self.playback.average_interval_ms.to_string(),
            "playback.max_sample_gap_secs" => self.playback.max_sample_gap_secs.to_string(),
            "logging.level" => self.logging.level.to_filter().to_string(),
            "logging.format" => format!("{:?}", self.logging.format).to_lowercase(),
            "logging.file_path" => self
                .logging
                .file_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "none".to_string()),
            _ => bail!("Unknown config key: {}", key),
        };
        Ok(value)
    }

    /// Set one key from its string form. The change is validated and rolled
    /// back if it leaves the configuration unusable.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let previous = self.clone();
        match key {
            "athlete.ftp_watts" => self.athlete.ftp_watts = parse_optional(key, value)?,
            "athlete.max_hr" => self.athlete.max_hr = parse_optional(key, value)?,
            "playback.tick_interval_ms" => self.playback.tick_interval_ms = parse_field(key, value)?,
            "playback.average_interval_ms" => {
                self.playback.average_interval_ms = parse_field(key, value)?
            }
            "playback.max_sample_gap_secs" => {
                self.playback.max_sample_gap_secs = parse_field(key, value)?
            }
            "logging.level" => self.logging.level = parse_field(key, value)?,
            "logging.format" => self.logging.format = parse_field(key, value)?,
            "logging.file_path" => {
                self.logging.file_path = parse_optional::<String>(key, value)?.map(PathBuf::from)
            }
            _ => bail!("Unknown config key: {}", key),
        }

        if let Err(e) = self.validate() {
            *self = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Parse and apply a `key=value` assignment
    pub fn apply_assignment(&mut self, assignment: &str) -> Result<()> {
        let Some((key, value)) = assignment.split_once('=') else {
            bail!("Expected KEY=VALUE, got: {}", assignment);
        };
        self.set_value(key.trim(), value)
    }
}
