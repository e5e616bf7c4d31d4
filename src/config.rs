//! Configuration file support.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub library: LibraryConfig,

    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LibraryConfig {
    /// Root directory of the served tree. Defaults to the working
    /// directory.
    #[serde(default)]
    pub root_dir: Option<PathBuf>,

    /// Rendition cache directory. Defaults to `<root>/.cache`.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Preferred audio language, e.g. "eng" or "fre".
    #[serde(default = "default_lang")]
    pub preferred_lang: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root_dir: None,
            cache_dir: None,
            preferred_lang: default_lang(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchConfig {
    /// Seconds a burst of filesystem events is allowed to grow before the
    /// catalog refreshes.
    #[serde(default = "default_debounce")]
    pub debounce_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_secs: default_debounce(),
        }
    }
}

fn default_lang() -> String {
    "eng".to_string()
}

fn default_debounce() -> u64 {
    10
}

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

/// Load config from the default locations, or return the defaults.
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }
    for path_str in ["./castserve.toml", "/etc/castserve/config.toml"] {
        let path = Path::new(path_str);
        if path.exists() {
            return load_config(path);
        }
    }
    Ok(Config::default())
}
