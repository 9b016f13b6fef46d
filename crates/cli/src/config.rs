use anyhow::{Context, Result};
use packetview_runtime_config::{ViewerConfig, CONFIG_FILE_NAME};
use std::path::{Path, PathBuf};

/// Environment variable that points at an alternative config file.
pub const CONFIG_ENV: &str = "PACKETVIEW_CONFIG";

/// Get the config directory path (~/.config/packetview/)
pub fn config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .context("Could not determine home directory")?;
    Ok(PathBuf::from(home).join(".config").join("packetview"))
}

/// Canonical config file path, unless overridden through `PACKETVIEW_CONFIG`.
pub fn config_path() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

pub fn load_config_from(path: &Path) -> Result<ViewerConfig> {
    ViewerConfig::load(path).with_context(|| format!("Failed to load config at {}", path.display()))
}

/// Load config from disk, returning defaults if not found.
pub fn load_config() -> Result<ViewerConfig> {
    load_config_from(&config_path()?)
}

pub fn save_config_to(config: &ViewerConfig, path: &Path) -> Result<()> {
    config
        .save(path)
        .with_context(|| format!("Failed to write config at {}", path.display()))
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub server: Option<String>,
    pub view: Option<String>,
    pub page_length: Option<u32>,
    pub timeout_secs: Option<u64>,
}

impl Overrides {
    pub fn is_empty(&self) -> bool {
        self.server.is_none()
            && self.view.is_none()
            && self.page_length.is_none()
            && self.timeout_secs.is_none()
    }

    pub fn apply(&self, config: &mut ViewerConfig) {
        if let Some(url) = &self.server {
            config.server.url = url.clone();
        }
        if let Some(view) = &self.view {
            config.view.view_id = view.clone();
        }
        if let Some(length) = self.page_length {
            config.view.page_length = length;
        }
        if let Some(timeout) = self.timeout_secs {
            config.server.timeout_secs = timeout;
        }
        config.apply_fallbacks();
    }
}

pub fn render_config(config: &ViewerConfig, path: &Path) -> String {
    let mut out = format!("Config file: {}\n\n", path.display());
    out.push_str("[server]\n");
    out.push_str(&format!("  url          = {}\n", config.server.url));
    out.push_str(&format!("  timeout_secs = {}\n\n", config.server.timeout_secs));
    out.push_str("[view]\n");
    out.push_str(&format!("  view_id      = {}\n", config.view.view_id));
    out.push_str(&format!("  page_length  = {}\n", config.view.page_length));
    out.push_str(&format!("  open_all     = {}\n", config.view.open_all));
    out
}

/// Print current config.
pub fn show_config() -> Result<()> {
    let path = config_path()?;
    let config = load_config_from(&path)?;
    print!("{}", render_config(&config, &path));
    Ok(())
}

/// Update config with provided values.
pub fn set_config(updates: &Overrides, open_all: Option<bool>) -> Result<()> {
    let path = config_path()?;
    let mut config = load_config_from(&path)?;
    updates.apply(&mut config);
    if let Some(open_all) = open_all {
        config.view.open_all = open_all;
    }
    save_config_to(&config, &path)?;
    println!("Configuration updated.");
    print!("{}", render_config(&config, &path));
    Ok(())
}
