use anyhow::{Context, Result};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use absensi_match::DEFAULT_THRESHOLD;

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("ABSENSI_CONFIG_PATH").unwrap_or("/usr/local/etc/absensi/config.toml"))
});

pub static DATA_PREFIX: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("ABSENSI_DATA_PREFIX").unwrap_or("/usr/local/etc/absensi"))
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum Euclidean distance accepted as a match.
    pub threshold: f32,
    /// JSON file listing enrolled users.
    pub directory: PathBuf,
    /// Root under which per-identity face records are stored.
    pub store_prefix: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            directory: DATA_PREFIX.join("users.json"),
            store_prefix: DATA_PREFIX.join("faces"),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            anyhow::bail!(
                "threshold must be a non-negative finite number, got {}",
                self.threshold
            );
        }
        Ok(())
    }
}

/// Per-user config location, used when the system-wide file is absent.
pub fn user_config_path() -> Option<PathBuf> {
    ProjectDirs::from("id", "absensi", "absensi").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Pick the config file to read: an explicit path wins, then the system
/// path, then the per-user path.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if CONFIG_PATH.exists() {
        return CONFIG_PATH.to_path_buf();
    }
    user_config_path().unwrap_or_else(|| CONFIG_PATH.to_path_buf())
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validating config {}", path.display()))?;
    Ok(cfg)
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
