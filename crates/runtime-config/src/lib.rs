//! Viewer configuration, persisted as `packetview.toml`.
//!
//! Every key is optional; missing sections and fields fall back to the
//! defaults below so an empty file is a valid config.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Canonical config file name.
pub const CONFIG_FILE_NAME: &str = "packetview.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ViewerConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub view: ViewSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSettings {
    /// Base URL of the viewer, e.g. `http://localhost:8005`.
    #[serde(default = "default_server_url")]
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewSettings {
    /// Key the table state is persisted under.
    #[serde(default = "default_view_id")]
    pub view_id: String,
    #[serde(default = "default_page_length")]
    pub page_length: u32,
    #[serde(default = "default_false")]
    pub open_all: bool,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            view_id: default_view_id(),
            page_length: default_page_length(),
            open_all: false,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config io error: {e}"),
            Self::Parse(e) => write!(f, "invalid config: {e}"),
            Self::Serialize(e) => write!(f, "could not encode config: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl ViewerConfig {
    /// Read `path`, returning defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        let mut config: Self = toml::from_str(&content).map_err(ConfigError::Parse)?;
        config.apply_fallbacks();
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        std::fs::write(path, content).map_err(ConfigError::Io)
    }

    /// Replace values that parse but cannot be used. Returns true when any
    /// field was updated.
    pub fn apply_fallbacks(&mut self) -> bool {
        let mut changed = false;
        if self.view.page_length == 0 {
            self.view.page_length = default_page_length();
            changed = true;
        }
        if self.view.view_id.trim().is_empty() {
            self.view.view_id = default_view_id();
            changed = true;
        }
        let trimmed = self.server.url.trim_end_matches('/');
        if trimmed.len() != self.server.url.len() {
            self.server.url = trimmed.to_string();
            changed = true;
        }
        changed
    }
}

// ── Serde default functions ─────────────────────────────────────────────

fn default_false() -> bool {
    false
}
fn default_server_url() -> String {
    "http://localhost:8005".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_view_id() -> String {
    "sessionsNew".to_string()
}
fn default_page_length() -> u32 {
    50
}
