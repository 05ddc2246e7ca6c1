//! Configuration and credential storage

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::media::devices::DeviceSelection;

/// Application configuration
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Call session backend base URL
    pub backend_url: Option<String>,
    /// Signaling push gateway WebSocket URL
    pub signaling_url: Option<String>,
    /// Bearer token for backend and gateway auth
    pub access_token: Option<String>,
    /// This client's participant ID
    pub user_id: Option<String>,
    /// This client's display name
    pub display_name: Option<String>,
    /// Cached device selection (client-local, not part of any contract)
    #[serde(default)]
    pub devices: DeviceSelection,
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "huddle-cli", "huddle-cli")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir).context("Failed to create config directory")?;

        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;

        // Set restrictive permissions on config file (contains the token)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    pub fn backend_url(&self) -> Result<&str> {
        self.backend_url
            .as_deref()
            .context("No backend URL configured. Run `huddle-cli setup` first.")
    }

    pub fn signaling_url(&self) -> Result<&str> {
        self.signaling_url
            .as_deref()
            .context("No signaling URL configured. Run `huddle-cli setup` first.")
    }

    pub fn access_token(&self) -> Result<&str> {
        self.access_token
            .as_deref()
            .context("No access token configured. Run `huddle-cli setup` first.")
    }

    pub fn user_id(&self) -> Result<&str> {
        self.user_id
            .as_deref()
            .context("No user ID configured. Run `huddle-cli setup` first.")
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or("Huddle user")
    }
}
