//! Configuration management for backupctl
//!
//! Handles configuration loading from files and environment variables.
//! Configuration is stored in TOML format with support for multiple named profiles.

#[cfg(target_os = "macos")]
use directories::BaseDirs;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::credential::CredentialStore;
use super::error::{ConfigError, Result};
use super::polling::PollingConfig;
use crate::rest::DEFAULT_ENDPOINT;

/// Environment variable overriding the profile's project
pub const PROJECT_ENV: &str = "BACKUPCTL_PROJECT";
/// Environment variable overriding the profile's endpoint
pub const ENDPOINT_ENV: &str = "BACKUPCTL_ENDPOINT";
/// Environment variable overriding the profile's access token
pub const ACCESS_TOKEN_ENV: &str = "BACKUPCTL_ACCESS_TOKEN";

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct Config {
    /// Profile used when none is given on the command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,
    /// Map of profile name -> profile configuration
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

/// Individual profile configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Profile {
    /// Project that owns the instances
    pub project: String,
    /// Admin API endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Bearer token, or a `keyring:` reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Instance used when none is given on the command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_instance: Option<String>,
    #[serde(default, skip_serializing_if = "PollingConfig::is_default")]
    pub polling: PollingConfig,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

impl Profile {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            endpoint: default_endpoint(),
            access_token: None,
            default_instance: None,
            polling: PollingConfig::default(),
        }
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token.is_some()
    }

    /// Project, with `BACKUPCTL_PROJECT` taking precedence
    pub fn resolve_project(&self) -> Result<String> {
        CredentialStore::new().get_credential(&self.project, Some(PROJECT_ENV))
    }

    /// Endpoint, with `BACKUPCTL_ENDPOINT` taking precedence
    pub fn resolve_endpoint(&self) -> Result<String> {
        CredentialStore::new().get_credential(&self.endpoint, Some(ENDPOINT_ENV))
    }

    /// Access token, resolving keyring references and `BACKUPCTL_ACCESS_TOKEN`
    pub fn resolve_access_token(&self) -> Result<Option<String>> {
        let store = CredentialStore::new();
        match &self.access_token {
            Some(token) => store
                .get_credential(token, Some(ACCESS_TOKEN_ENV))
                .map(Some)
                .map_err(|e| {
                    ConfigError::CredentialError(format!("Failed to resolve access token: {}", e))
                }),
            None => Ok(std::env::var(ACCESS_TOKEN_ENV).ok()),
        }
    }
}

impl Config {
    /// Resolve the profile to use.
    ///
    /// Order: explicit name, `default_profile`, then the first profile by name.
    pub fn resolve_profile(&self, explicit_profile: Option<&str>) -> Result<String> {
        if let Some(profile_name) = explicit_profile {
            return Ok(profile_name.to_string());
        }

        if let Some(ref default) = self.default_profile {
            return Ok(default.clone());
        }

        if let Some((name, _)) = self.list_profiles().first() {
            return Ok((*name).clone());
        }

        Err(ConfigError::NoProfiles {
            suggestion: "Use 'backupctl profile set <name> --project <project>' to create a profile."
                .to_string(),
        })
    }

    /// Look up a profile by name
    pub fn profile(&self, name: &str) -> Result<&Profile> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound {
                name: name.to_string(),
            })
    }

    /// Load configuration from the standard location
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(config_path).map_err(|e| ConfigError::LoadError {
            path: config_path.display().to_string(),
            source: e,
        })?;

        let expanded_content = Self::expand_env_vars(&content);
        let config: Config = toml::from_str(&expanded_content)?;

        Ok(config)
    }

    /// Save configuration to the standard location
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to_path(&config_path)
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::SaveError {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        let content = toml::to_string_pretty(self)?;

        fs::write(config_path, content).map_err(|e| ConfigError::SaveError {
            path: config_path.display().to_string(),
            source: e,
        })?;

        Ok(())
    }

    /// Set or update a profile
    pub fn set_profile(&mut self, name: String, profile: Profile) {
        self.profiles.insert(name, profile);
    }

    /// Remove a profile by name, clearing the default if it pointed there
    pub fn remove_profile(&mut self, name: &str) -> Option<Profile> {
        if self.default_profile.as_deref() == Some(name) {
            self.default_profile = None;
        }
        self.profiles.remove(name)
    }

    /// List all profiles sorted by name
    pub fn list_profiles(&self) -> Vec<(&String, &Profile)> {
        let mut profiles: Vec<_> = self.profiles.iter().collect();
        profiles.sort_by_key(|(name, _)| *name);
        profiles
    }

    /// Get the path to the configuration file
    ///
    /// On macOS, `~/.config/backupctl/config.toml` is used when it (or its
    /// directory) exists, falling back to the platform location.
    ///
    /// On Linux: ~/.config/backupctl/config.toml
    /// On Windows: %APPDATA%\backupctl\backupctl\config.toml
    pub fn config_path() -> Result<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            if let Some(base_dirs) = BaseDirs::new() {
                let linux_style_path = base_dirs
                    .home_dir()
                    .join(".config")
                    .join("backupctl")
                    .join("config.toml");

                if linux_style_path.exists()
                    || linux_style_path.parent().is_some_and(|p| p.exists())
                {
                    return Ok(linux_style_path);
                }
            }
        }

        let proj_dirs = ProjectDirs::from("com", "backupctl", "backupctl")
            .ok_or(ConfigError::ConfigDirError)?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Expand `${VAR}` and `${VAR:-default}` references.
    ///
    /// Unset variables without a default are left as-is so profiles that are
    /// not in use do not need their variables set.
    ///
    /// ```toml
    /// access_token = "${PROD_TOKEN}"
    /// endpoint = "${BACKUP_ENDPOINT:-https://spanner.googleapis.com}"
    /// ```
    pub fn expand_env_vars(content: &str) -> String {
        let expanded =
            shellexpand::env_with_context_no_errors(content, |var| std::env::var(var).ok());
        expanded.to_string()
    }
}
