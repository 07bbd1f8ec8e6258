//! Engine configuration.
//!
//! Handles loading, validating, and merging `config.toml` files. The stock
//! defaults are the base layer; a user file only needs the keys it wants to
//! change and is deep-merged on top.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [engine]
//! # concurrency = 4         # Worker threads for batch runs (omit for all cores)
//!
//! [output]
//! quality = 75              # Default lossy quality (0-100)
//! strip_metadata = true
//!
//! [text]
//! font_family = "sans-serif"
//! scratch_capacity = 5      # Scratch slots per text overlay (at least 5)
//!
//! [logging]
//! level = "info"            # off, error, warn, info, debug or trace
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Slots a shadowed text overlay takes from its scratch pool.
pub const MIN_SCRATCH_CAPACITY: usize = 5;

const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration shared by every pipeline an engine runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Parallel processing settings.
    pub engine: ProcessingConfig,
    /// Defaults for encoded output.
    pub output: OutputConfig,
    /// Text overlay settings.
    pub text: TextConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output.quality > 100 {
            return Err(ConfigError::Validation(
                "output.quality must be 0-100".into(),
            ));
        }
        if self.engine.concurrency == Some(0) {
            return Err(ConfigError::Validation(
                "engine.concurrency must be at least 1".into(),
            ));
        }
        if self.text.scratch_capacity < MIN_SCRATCH_CAPACITY {
            return Err(ConfigError::Validation(format!(
                "text.scratch_capacity must be at least {MIN_SCRATCH_CAPACITY}"
            )));
        }
        if self.text.font_family.trim().is_empty() {
            return Err(ConfigError::Validation(
                "text.font_family must not be empty".into(),
            ));
        }
        let level = self.logging.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {}",
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of worker threads for batch runs.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub concurrency: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.concurrency.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Defaults for encoded output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Quality for lossy encoders (0-100).
    pub quality: u8,
    pub strip_metadata: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            quality: 75,
            strip_metadata: true,
        }
    }
}

/// Text overlay settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TextConfig {
    /// Font family text is laid out with. Falls back to any sans-serif face.
    pub font_family: String,
    /// Scratch slots reserved for each text overlay.
    pub scratch_capacity: usize,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            font_family: "sans-serif".to_string(),
            scratch_capacity: MIN_SCRATCH_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default log level when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(EngineConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
pub fn load_raw_config(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<EngineConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: EngineConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the config from `path`, or the stock defaults when there is none.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result. A path that does not exist is an error.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = path.map(load_raw_config).transpose()?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# imgchain Configuration
# ======================
#
# All options are optional. Values shown are the defaults.
# Unknown keys are rejected to catch typos early.

# ---------------------------------------------------------------------------
# Engine
# ---------------------------------------------------------------------------
[engine]
# Worker threads used by `imgchain batch`.
# Omit to use all CPU cores. Values above the core count are clamped down.
# concurrency = 4

# ---------------------------------------------------------------------------
# Output defaults
# ---------------------------------------------------------------------------
[output]
# Quality for lossy encoders (JPEG). Range 0-100.
# Formats without a lossy quality setting ignore it.
quality = 75

# Drop EXIF, ICC and other metadata from encoded output.
strip_metadata = true

# ---------------------------------------------------------------------------
# Text overlays
# ---------------------------------------------------------------------------
[text]
# Font family for text overlays, looked up among the system fonts.
# Any sans-serif face is used when the family is not installed.
font_family = "sans-serif"

# Scratch image slots reserved per text overlay.
# A shadowed overlay needs five, so values below 5 are rejected.
scratch_capacity = 5

# ---------------------------------------------------------------------------
# Logging
# ---------------------------------------------------------------------------
[logging]
# One of: off, error, warn, info, debug, trace.
# RUST_LOG takes precedence; each -v on the command line raises the level.
level = "info"
"##
}
