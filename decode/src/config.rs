//! Decoder configuration (`decode.toml`)
//!
//! Settings are stored in TOML format in the platform-specific config
//! directory. Keys prefixed with `capture_decode.` in the layer settings file
//! override the file values.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::DEFAULT_MAX_NESTING_DEPTH;
use crate::settings::{self, Settings};

/// Prefix of decoder keys in the layer settings file
pub const SETTINGS_PREFIX: &str = "capture_decode.";

const CONFIG_FILENAME: &str = "decode.toml";

/// Decoder configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeConfig {
    /// Maximum nesting of pointers, structures and extension nodes (default: 64)
    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,
    /// How long handle resolution waits for a mapping to appear, in
    /// milliseconds (default: 0, no waiting)
    #[serde(default)]
    pub handle_wait_ms: u64,
    /// Log unmapped handles at debug instead of warn level (default: false)
    #[serde(default)]
    pub quiet_unmapped_handles: bool,
    /// Stop replay at the first call that fails to decode (default: false)
    #[serde(default)]
    pub stop_on_fatal: bool,
}

fn default_max_nesting_depth() -> usize {
    DEFAULT_MAX_NESTING_DEPTH
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            max_nesting_depth: default_max_nesting_depth(),
            handle_wait_ms: 0,
            quiet_unmapped_handles: false,
            stop_on_fatal: false,
        }
    }
}

impl DecodeConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Handle resolution timeout, `None` when resolution must not block
    pub fn handle_wait(&self) -> Option<Duration> {
        (self.handle_wait_ms > 0).then(|| Duration::from_millis(self.handle_wait_ms))
    }

    /// Override fields from `capture_decode.*` layer settings
    ///
    /// Unknown keys and unparseable values are logged and skipped.
    pub fn apply_settings(&mut self, settings: &Settings) {
        for (key, value) in settings {
            let Some(field) = key.strip_prefix(SETTINGS_PREFIX) else {
                continue;
            };
            let applied = match field {
                "max_nesting_depth" => value.parse().map(|v| self.max_nesting_depth = v).is_ok(),
                "handle_wait_ms" => value.parse().map(|v| self.handle_wait_ms = v).is_ok(),
                "quiet_unmapped_handles" => parse_bool(value)
                    .map(|v| self.quiet_unmapped_handles = v)
                    .is_some(),
                "stop_on_fatal" => parse_bool(value).map(|v| self.stop_on_fatal = v).is_some(),
                _ => {
                    warn!(key = %key, "unknown decoder setting");
                    continue;
                }
            };
            if !applied {
                warn!(key = %key, value = %value, "invalid value for decoder setting");
            }
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") || value == "1" {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") || value == "0" {
        Some(false)
    } else {
        None
    }
}

/// Returns the platform-specific configuration directory.
///
/// On Linux: `~/.config/capture-decode`
///
/// Returns `None` if the home directory cannot be determined.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("io.capture", "", "capture-decode")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Loads the configuration from disk.
///
/// Reads `decode.toml` from the platform's configuration directory.
/// Returns default values if the file doesn't exist or cannot be parsed.
pub fn load() -> DecodeConfig {
    config_dir()
        .and_then(|dir| std::fs::read_to_string(dir.join(CONFIG_FILENAME)).ok())
        .and_then(|content| DecodeConfig::from_toml_str(&content).ok())
        .unwrap_or_default()
}

/// Loads `decode.toml`, then applies the layer settings file on top.
pub fn resolve() -> DecodeConfig {
    let mut config = load();
    match settings::load_layer_settings(SETTINGS_PREFIX) {
        Ok(settings) => config.apply_settings(&settings),
        Err(e) => warn!("ignoring layer settings: {e}"),
    }
    config
}
