//! Pipeline Configuration
//!
//! Settings for the pipelines assembled by the `pump` binary, loaded from an
//! optional TOML file at `~/.config/pump/pump.toml`.
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables (`PUMP_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [pipeline]
//! mode = "speakable"
//! min_chars = 40
//! batch_size = 4
//! buffer_size = 8
//!
//! [source]
//! channel_capacity = 16
//!
//! [fork]
//! queue_warn_depth = 1024
//!
//! [sink]
//! format = "sse"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::fork::{ForkOptions, DEFAULT_QUEUE_WARN_DEPTH};
use crate::format::Format;
use crate::text::Segmentation;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where the configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[pipeline]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineToml {
    /// How fragments are grouped
    pub mode: Option<Segmentation>,

    /// Minimum characters per speakable chunk
    pub min_chars: Option<usize>,

    /// Segments per batch (omit to disable batching)
    pub batch_size: Option<usize>,

    /// Envelopes held before the first release
    pub buffer_size: Option<usize>,
}

/// `[source]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceToml {
    /// Fragments the input channel holds before the producer waits
    pub channel_capacity: Option<usize>,
}

/// `[fork]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ForkToml {
    /// Backlog at which a lagging branch is reported
    pub queue_warn_depth: Option<usize>,
}

/// `[sink]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkToml {
    /// Output framing
    pub format: Option<Format>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PumpToml {
    /// Pipeline section
    pub pipeline: PipelineToml,

    /// Source section
    pub source: SourceToml,

    /// Fork section
    pub fork: ForkToml,

    /// Sink section
    pub sink: SinkToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved pipeline settings
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// How fragments are grouped
    pub mode: Segmentation,

    /// Minimum characters per speakable chunk
    pub min_chars: usize,

    /// Segments per batch, `None` to emit segments one by one
    pub batch_size: Option<usize>,

    /// Envelopes held before the first release (0 disables buffering)
    pub buffer_size: usize,

    /// Backlog at which a lagging fork branch is reported
    pub fork_warn_depth: usize,

    /// Output framing
    pub format: Format,

    /// Fragments the input channel holds before the producer waits
    pub channel_capacity: usize,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    source: ConfigSource,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: Segmentation::default(),
            min_chars: 40,
            batch_size: None,
            buffer_size: 0,
            fork_warn_depth: DEFAULT_QUEUE_WARN_DEPTH,
            format: Format::default(),
            channel_capacity: 16,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl PipelineConfig {
    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Fork tuning derived from this configuration
    #[must_use]
    pub fn fork_options(&self) -> ForkOptions {
        ForkOptions::default().with_queue_warn_depth(Some(self.fork_warn_depth))
    }

    /// Reject values no pipeline can run with
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == Some(0) {
            return Err(ConfigError::ValidationError(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.fork_warn_depth == 0 {
            return Err(ConfigError::ValidationError(
                "fork queue_warn_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/pump/pump.toml` or `~/.config/pump/pump.toml`
/// if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("pump").join("pump.toml"))
}

/// Load configuration from a specific path and the environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<PipelineConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration reading environment values through `lookup`
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_with_env<F>(path: Option<PathBuf>, lookup: F) -> Result<PipelineConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = PipelineConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: PumpToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, lookup);

    Ok(config)
}

fn apply_toml_config(config: &mut PipelineConfig, toml: &PumpToml) {
    if let Some(mode) = toml.pipeline.mode {
        config.mode = mode;
    }
    if let Some(min_chars) = toml.pipeline.min_chars {
        config.min_chars = min_chars;
    }
    if toml.pipeline.batch_size.is_some() {
        config.batch_size = toml.pipeline.batch_size;
    }
    if let Some(size) = toml.pipeline.buffer_size {
        config.buffer_size = size;
    }

    if let Some(depth) = toml.fork.queue_warn_depth {
        config.fork_warn_depth = depth;
    }

    if let Some(format) = toml.sink.format {
        config.format = format;
    }
    if let Some(capacity) = toml.source.channel_capacity {
        config.channel_capacity = capacity;
    }
}

/// Parse an environment value, ignoring (and logging) malformed ones
fn parse_env<T: std::str::FromStr>(key: &str, value: Option<String>) -> Option<T> {
    let value = value?;
    match value.parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(key, value = %value, "Ignoring invalid environment value");
            None
        }
    }
}

fn apply_env_config<F>(config: &mut PipelineConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(mode) = parse_env::<Segmentation>("PUMP_MODE", lookup("PUMP_MODE")) {
        config.mode = mode;
        config.source = ConfigSource::Env;
    }
    if let Some(min_chars) = parse_env::<usize>("PUMP_MIN_CHARS", lookup("PUMP_MIN_CHARS")) {
        config.min_chars = min_chars;
        config.source = ConfigSource::Env;
    }
    if let Some(size) = parse_env::<usize>("PUMP_BATCH_SIZE", lookup("PUMP_BATCH_SIZE")) {
        config.batch_size = Some(size);
        config.source = ConfigSource::Env;
    }
    if let Some(size) = parse_env::<usize>("PUMP_BUFFER_SIZE", lookup("PUMP_BUFFER_SIZE")) {
        config.buffer_size = size;
        config.source = ConfigSource::Env;
    }
    if let Some(depth) = parse_env::<usize>("PUMP_FORK_WARN_DEPTH", lookup("PUMP_FORK_WARN_DEPTH")) {
        config.fork_warn_depth = depth;
        config.source = ConfigSource::Env;
    }
    if let Some(format) = parse_env::<Format>("PUMP_FORMAT", lookup("PUMP_FORMAT")) {
        config.format = format;
        config.source = ConfigSource::Env;
    }
    if let Some(capacity) =
        parse_env::<usize>("PUMP_CHANNEL_CAPACITY", lookup("PUMP_CHANNEL_CAPACITY"))
    {
        config.channel_capacity = capacity;
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config_from_path`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Segmentation override
    pub mode: Option<Segmentation>,

    /// Speakable chunk size override
    pub min_chars: Option<usize>,

    /// Batch size override
    pub batch_size: Option<usize>,

    /// Buffer size override
    pub buffer_size: Option<usize>,

    /// Output format override
    pub format: Option<Format>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set segmentation override
    #[must_use]
    pub fn with_mode(mut self, mode: Segmentation) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Set speakable chunk size override
    #[must_use]
    pub fn with_min_chars(mut self, min_chars: usize) -> Self {
        self.min_chars = Some(min_chars);
        self
    }

    /// Set batch size override
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    /// Set buffer size override
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }

    /// Set output format override
    #[must_use]
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut PipelineConfig) {
        if self.mode.is_some()
            || self.min_chars.is_some()
            || self.batch_size.is_some()
            || self.buffer_size.is_some()
            || self.format.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(min_chars) = self.min_chars {
            config.min_chars = min_chars;
        }
        if self.batch_size.is_some() {
            config.batch_size = self.batch_size;
        }
        if let Some(size) = self.buffer_size {
            config.buffer_size = size;
        }
        if let Some(format) = self.format {
            config.format = format;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
