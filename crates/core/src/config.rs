use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::EngineSettings;

/// Configuration manager for the engine settings
/// Keeps the schema, the valid options and the persisted values apart.
/// Settings are stored in lumen.json in the working directory by default
pub struct ConfigManager {
    config_path: PathBuf,
    settings: EngineSettings,
}

/// Available configuration options with validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSchema {
    pub console: ConsoleConfigSchema,
    pub playback: PlaybackConfigSchema,
    pub output: OutputConfigSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfigSchema {
    pub channel_count: ConfigOption<usize>,
    pub sequence_count: ConfigOption<usize>,
    pub channel_increment: ConfigOption<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfigSchema {
    pub default_time_in_secs: ConfigOption<f64>,
    pub default_time_out_secs: ConfigOption<f64>,
    pub default_delay_in_secs: ConfigOption<f64>,
    pub default_delay_out_secs: ConfigOption<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfigSchema {
    pub universe_count: ConfigOption<usize>,
    pub outputs_per_universe: ConfigOption<usize>,
    pub output_increment: ConfigOption<u8>,
    pub tick_rate_hz: ConfigOption<f64>,
    pub straight_patch: ConfigOption<bool>,
}

/// Configuration option with validation and available choices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigOption<T> {
    pub default: T,
    pub valid_range: Option<(T, T)>,
    pub valid_choices: Option<Vec<T>>,
    pub description: String,
    pub requires_restart: bool,
}

impl<T> ConfigOption<T> {
    fn ranged(default: T, min: T, max: T, description: &str, requires_restart: bool) -> Self {
        Self {
            default,
            valid_range: Some((min, max)),
            valid_choices: None,
            description: description.to_string(),
            requires_restart,
        }
    }
}

/// Persisted configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    pub settings: EngineSettings,
    pub created_at: String,
    pub modified_at: String,
}

impl ConfigManager {
    /// Create a new configuration manager
    /// If no path is provided, defaults to 'lumen.json' in the current working directory
    pub fn new(config_path: Option<PathBuf>) -> Self {
        let config_path = config_path.unwrap_or_else(|| PathBuf::from("lumen.json"));

        Self {
            config_path,
            settings: EngineSettings::default(),
        }
    }

    /// Load settings from the configuration file
    /// Writes a default file if none exists yet
    pub fn load(&mut self) -> Result<EngineSettings, ConfigError> {
        if !self.config_path.exists() {
            self.save()?;
            return Ok(self.settings.clone());
        }

        let content = fs::read_to_string(&self.config_path)
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        let config_file: ConfigFile =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if config_file.version != env!("CARGO_PKG_VERSION") {
            log::warn!(
                "Config file version {} doesn't match engine version {}",
                config_file.version,
                env!("CARGO_PKG_VERSION")
            );
        }

        Self::validate_settings(&config_file.settings).map_err(ConfigError::ValidationError)?;

        self.settings = config_file.settings;
        Ok(self.settings.clone())
    }

    /// Save current settings to the configuration file
    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            if parent != Path::new("") && parent != Path::new(".") {
                fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError(e.to_string()))?;
            }
        }

        let now = chrono::Utc::now().to_rfc3339();
        let created_at = self.created_at().unwrap_or_else(|| now.clone());
        let config_file = ConfigFile {
            version: env!("CARGO_PKG_VERSION").to_string(),
            settings: self.settings.clone(),
            created_at,
            modified_at: now,
        };

        let content = serde_json::to_string_pretty(&config_file)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(&self.config_path, content)
            .map_err(|e| ConfigError::WriteError(e.to_string()))?;

        log::debug!("Saved settings to {}", self.config_path.display());
        Ok(())
    }

    /// Creation time of the file on disk, if it can be read
    fn created_at(&self) -> Option<String> {
        let content = fs::read_to_string(&self.config_path).ok()?;
        let existing: ConfigFile = serde_json::from_str(&content).ok()?;
        Some(existing.created_at)
    }

    /// Validate, update and save settings
    pub fn update_settings(&mut self, settings: EngineSettings) -> Result<(), ConfigError> {
        Self::validate_settings(&settings).map_err(ConfigError::ValidationError)?;
        self.settings = settings;
        self.save()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Get configuration schema with available options
    pub fn schema() -> ConfigSchema {
        let defaults = EngineSettings::default();
        ConfigSchema {
            console: ConsoleConfigSchema {
                channel_count: ConfigOption::ranged(
                    defaults.channel_count,
                    1,
                    4096,
                    "Number of console channels",
                    true,
                ),
                sequence_count: ConfigOption::ranged(
                    defaults.sequence_count,
                    1,
                    64,
                    "Number of sequences created at start-up",
                    true,
                ),
                channel_increment: ConfigOption::ranged(
                    defaults.channel_increment,
                    1,
                    255,
                    "Level step of the channel +/- keys",
                    false,
                ),
            },
            playback: PlaybackConfigSchema {
                default_time_in_secs: ConfigOption::ranged(
                    defaults.default_time_in_secs,
                    0.0,
                    3600.0,
                    "Fade-in time of new cues in seconds",
                    false,
                ),
                default_time_out_secs: ConfigOption::ranged(
                    defaults.default_time_out_secs,
                    0.0,
                    3600.0,
                    "Fade-out time of new cues in seconds",
                    false,
                ),
                default_delay_in_secs: ConfigOption::ranged(
                    defaults.default_delay_in_secs,
                    0.0,
                    3600.0,
                    "Delay before channels fade in, in seconds",
                    false,
                ),
                default_delay_out_secs: ConfigOption::ranged(
                    defaults.default_delay_out_secs,
                    0.0,
                    3600.0,
                    "Delay before channels fade out, in seconds",
                    false,
                ),
            },
            output: OutputConfigSchema {
                universe_count: ConfigOption::ranged(
                    defaults.universe_count,
                    1,
                    64,
                    "Number of DMX universes",
                    true,
                ),
                outputs_per_universe: ConfigOption::ranged(
                    defaults.outputs_per_universe,
                    1,
                    512,
                    "Outputs per DMX universe",
                    true,
                ),
                output_increment: ConfigOption::ranged(
                    defaults.output_increment,
                    1,
                    255,
                    "Level step of the output +/- keys",
                    false,
                ),
                tick_rate_hz: ConfigOption::ranged(
                    defaults.tick_rate_hz,
                    1.0,
                    200.0,
                    "Playback and DMX refresh rate in Hz",
                    true,
                ),
                straight_patch: ConfigOption {
                    default: defaults.straight_patch,
                    valid_range: None,
                    valid_choices: None,
                    description: "Patch channel n to output n of universe 0 at start-up"
                        .to_string(),
                    requires_restart: true,
                },
            },
        }
    }

    /// Validate settings against schema
    pub fn validate_settings(settings: &EngineSettings) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let schema = Self::schema();

        // Console settings
        check_range(&mut errors, "channel_count", settings.channel_count, &schema.console.channel_count);
        check_range(&mut errors, "sequence_count", settings.sequence_count, &schema.console.sequence_count);
        check_range(
            &mut errors,
            "channel_increment",
            settings.channel_increment,
            &schema.console.channel_increment,
        );

        // Playback settings
        check_range(
            &mut errors,
            "default_time_in_secs",
            settings.default_time_in_secs,
            &schema.playback.default_time_in_secs,
        );
        check_range(
            &mut errors,
            "default_time_out_secs",
            settings.default_time_out_secs,
            &schema.playback.default_time_out_secs,
        );
        check_range(
            &mut errors,
            "default_delay_in_secs",
            settings.default_delay_in_secs,
            &schema.playback.default_delay_in_secs,
        );
        check_range(
            &mut errors,
            "default_delay_out_secs",
            settings.default_delay_out_secs,
            &schema.playback.default_delay_out_secs,
        );

        // Output settings
        check_range(&mut errors, "universe_count", settings.universe_count, &schema.output.universe_count);
        check_range(
            &mut errors,
            "outputs_per_universe",
            settings.outputs_per_universe,
            &schema.output.outputs_per_universe,
        );
        check_range(
            &mut errors,
            "output_increment",
            settings.output_increment,
            &schema.output.output_increment,
        );
        check_range(&mut errors, "tick_rate_hz", settings.tick_rate_hz, &schema.output.tick_rate_hz);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Reset settings to defaults
    pub fn reset_to_defaults(&mut self) -> Result<(), ConfigError> {
        self.settings = EngineSettings::default();
        self.save()
    }
}

fn check_range<T>(errors: &mut Vec<String>, name: &str, value: T, option: &ConfigOption<T>)
where
    T: PartialOrd + Copy + std::fmt::Display,
{
    if let Some((min, max)) = option.valid_range {
        // Written so NaN fails too.
        if !(value >= min && value <= max) {
            errors.push(format!("{} must be between {} and {}", name, min, max));
        }
    }
}

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to write config file: {0}")]
    WriteError(String),
    #[error("Failed to parse config file: {0}")]
    ParseError(String),
    #[error("Failed to serialize config: {0}")]
    SerializeError(String),
    #[error("Config validation errors: {}", .0.join(", "))]
    ValidationError(Vec<String>),
}
