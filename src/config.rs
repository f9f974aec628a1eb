use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    pub access_token: Option<String>,
    pub api_base: Option<String>,
    pub oauth2: Option<OAuth2Settings>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct OAuth2Settings {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_url: Option<String>,
    pub refresh_margin_secs: Option<u64>,
}

impl OAuth2Settings {
    pub fn refresh_margin(&self) -> Option<Duration> {
        self.refresh_margin_secs.map(Duration::from_secs)
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        let config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;
        Ok(config)
    }

    /// OAuth2 settings with a usable client id, if any.
    pub fn oauth2(&self) -> Option<&OAuth2Settings> {
        self.oauth2
            .as_ref()
            .filter(|settings| !settings.client_id.trim().is_empty())
    }
}

pub fn config_path() -> PathBuf {
    config_dir().join("repokit").join("config.toml")
}

fn config_dir() -> PathBuf {
    if let Ok(dir) = env::var("XDG_CONFIG_HOME") {
        return Path::new(&dir).to_path_buf();
    }

    if let Ok(home) = env::var("HOME") {
        return Path::new(&home).join(".config");
    }

    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
