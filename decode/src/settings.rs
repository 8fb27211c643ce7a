//! Layer settings file (`vk_layer_settings.txt`)
//!
//! Uses the same search locations and line format as the Vulkan validation
//! layers, so a single settings file can configure every layer and tool in a
//! capture/replay setup:
//!
//! ```text
//! # comment
//! capture_decode.max_nesting_depth = 32
//! capture_decode.handle_wait_ms = "250"   # quotes are removed
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use hashbrown::HashMap;
use tracing::debug;

/// Environment variable naming the settings file or its directory
pub const SETTINGS_ENV_VAR: &str = "VK_LAYER_SETTINGS_PATH";

/// Default settings file name
pub const SETTINGS_FILENAME: &str = "vk_layer_settings.txt";

const DATA_HOME_VAR: &str = "XDG_DATA_HOME";
const USER_HOME_VAR: &str = "HOME";
const USER_SHARE_DIR: &str = ".local/share";
const SETTINGS_DIR: &str = "vulkan/settings.d";

const COMMENT_DELIMITER: char = '#';

/// Longest key or value read from one line
const MAX_TOKEN_LEN: usize = 511;

/// Parsed `key -> value` settings
pub type Settings = HashMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Strip one leading and one trailing quote (`"` or `'`), independently
pub fn remove_quotes(value: &str) -> &str {
    let is_quote = |c: u8| c == b'"' || c == b'\'';
    let bytes = value.as_bytes();
    let start = usize::from(bytes.first().is_some_and(|&c| is_quote(c)));
    let end = if bytes.last().is_some_and(|&c| is_quote(c)) {
        bytes.len() - 1
    } else {
        bytes.len()
    };
    value.get(start..end).unwrap_or("")
}

/// Parse one line into `(key, value)`
///
/// Format: optional whitespace, a key without whitespace or `=`, `=` with
/// optional whitespace around it, then a value up to the next whitespace.
/// Anything after the value is ignored.
fn parse_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_start();

    let key_end = line
        .find(|c: char| c.is_ascii_whitespace() || c == '=')
        .unwrap_or(line.len());
    if key_end == 0 || key_end > MAX_TOKEN_LEN {
        return None;
    }
    let (key, rest) = line.split_at(key_end);

    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    let value_end = rest.find(|c: char| c.is_ascii_whitespace()).unwrap_or(rest.len());
    if value_end == 0 {
        return None;
    }
    let value = &rest[..floor_char_boundary(rest, value_end.min(MAX_TOKEN_LEN))];
    Some((key, value))
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Parse settings file contents
///
/// Only keys starting with `filter` are kept (an empty filter keeps every
/// key). A later line overrides an earlier one with the same key.
pub fn parse_settings(content: &str, filter: &str) -> Settings {
    let mut settings = Settings::new();
    for line in content.lines() {
        let line = match line.find(COMMENT_DELIMITER) {
            Some(comment) => &line[..comment],
            None => line,
        };
        if let Some((key, value)) = parse_line(line) {
            if key.starts_with(filter) {
                settings.insert(key.to_string(), remove_quotes(value).to_string());
            }
        }
    }
    settings
}

/// Load and parse a settings file
pub fn load_settings_file(path: &Path, filter: &str) -> Result<Settings, SettingsError> {
    let bytes = fs::read(path).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_settings(&String::from_utf8_lossy(&bytes), filter))
}

/// Locate the settings file using the process environment and working directory
pub fn find_settings_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().unwrap_or_default();
    find_settings_file_in(|name| std::env::var(name).ok(), &cwd)
}

/// Locate the settings file
///
/// Search order: `$XDG_DATA_HOME` (or `$HOME/.local/share`) under
/// `vulkan/settings.d/`; then `$VK_LAYER_SETTINGS_PATH`, a file or a
/// directory holding the default file name; then the default file name in
/// `cwd`. Empty variables count as unset.
pub fn find_settings_file_in(env: impl Fn(&str) -> Option<String>, cwd: &Path) -> Option<PathBuf> {
    let var = |name: &str| env(name).filter(|value| !value.is_empty());

    if cfg!(unix) {
        let data_home = var(DATA_HOME_VAR)
            .map(PathBuf::from)
            .or_else(|| var(USER_HOME_VAR).map(|home| Path::new(&home).join(USER_SHARE_DIR)));
        if let Some(data_home) = data_home {
            let path = data_home.join(SETTINGS_DIR).join(SETTINGS_FILENAME);
            if path.is_file() {
                debug!(path = %path.display(), "using settings file from data home");
                return Some(path);
            }
        }
    }

    if let Some(env_path) = var(SETTINGS_ENV_VAR) {
        let mut path = PathBuf::from(env_path);
        if path.is_dir() {
            path.push(SETTINGS_FILENAME);
        }
        if path.is_file() {
            debug!(path = %path.display(), "using settings file from {SETTINGS_ENV_VAR}");
            return Some(path);
        }
    }

    let path = cwd.join(SETTINGS_FILENAME);
    if path.is_file() {
        debug!(path = %path.display(), "using settings file from working directory");
        return Some(path);
    }

    None
}

/// Find and load the settings file, if there is one
pub fn load_layer_settings(filter: &str) -> Result<Settings, SettingsError> {
    match find_settings_file() {
        Some(path) => load_settings_file(&path, filter),
        None => Ok(Settings::new()),
    }
}
