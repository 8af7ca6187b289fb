//! Connection management: resolve a profile into an admin client

use std::path::PathBuf;

use anyhow::Context;
use backupctl_core::config::{
    ACCESS_TOKEN_ENV, Config, ConfigError, CredentialStore, ENDPOINT_ENV, PROJECT_ENV,
    PollingConfig, Profile,
};
use backupctl_core::{DEFAULT_ENDPOINT, InstancePath, LroClient, ProgressCallback, RestAdminClient};
use tracing::{debug, info, trace};

use crate::error::{BackupCtlError, Result as CliResult};

/// Everything a workflow needs: the facade, the instance it targets and the
/// profile's polling settings.
pub struct BackupSession {
    pub lro: LroClient<RestAdminClient>,
    pub instance: InstancePath,
    pub polling: PollingConfig,
}

/// Connection settings after profile, keyring and environment resolution
#[derive(Debug, Clone)]
pub struct ResolvedConnection {
    /// Profile the settings came from; `None` when only the environment was used
    pub profile: Option<String>,
    pub project: String,
    pub endpoint: String,
    pub access_token: Option<String>,
    pub default_instance: Option<String>,
    pub polling: PollingConfig,
}

/// Connection manager for creating authenticated clients
#[derive(Clone)]
pub struct ConnectionManager {
    pub config: Config,
    pub config_path: Option<PathBuf>,
}

impl ConnectionManager {
    /// Create a new connection manager with a custom config path
    pub fn with_config_path(config: Config, config_path: Option<PathBuf>) -> Self {
        Self {
            config,
            config_path,
        }
    }

    /// Save `config` to the file this manager was loaded from
    pub fn save_config(&self, config: &Config) -> CliResult<()> {
        if let Some(ref path) = self.config_path {
            config
                .save_to_path(path)
                .context("Failed to save configuration")?;
        } else {
            config.save().context("Failed to save configuration")?;
        }
        Ok(())
    }

    /// Resolve connection settings for `profile_name`.
    ///
    /// When `--config-file` is given, environment overrides are ignored so an
    /// explicit config file fully determines the connection.
    pub fn resolve(&self, profile_name: Option<&str>) -> CliResult<ResolvedConnection> {
        let use_env_vars = self.config_path.is_none();
        debug!(
            "Config path: {:?}, use_env_vars: {}",
            self.config_path, use_env_vars
        );
        if !use_env_vars {
            info!("--config-file specified explicitly, ignoring environment variables");
        }

        let name = match self.config.resolve_profile(profile_name) {
            Ok(name) => name,
            Err(ConfigError::NoProfiles { .. })
                if use_env_vars && std::env::var(PROJECT_ENV).is_ok() =>
            {
                info!("No profiles configured, using {} from the environment", PROJECT_ENV);
                return Self::from_environment();
            }
            Err(e) => return Err(e.into()),
        };
        info!("Using profile: {}", name);
        let profile = self.config.profile(&name)?;

        let resolved = if use_env_vars {
            ResolvedConnection {
                profile: Some(name.clone()),
                project: profile.resolve_project()?,
                endpoint: profile.resolve_endpoint()?,
                access_token: profile.resolve_access_token()?,
                default_instance: profile.default_instance.clone(),
                polling: profile.polling.clone(),
            }
        } else {
            Self::from_profile_only(&name, profile)?
        };

        trace!(
            "Access token: {}",
            if resolved.access_token.is_some() {
                "configured"
            } else {
                "not set"
            }
        );
        Ok(resolved)
    }

    fn from_environment() -> CliResult<ResolvedConnection> {
        let project = std::env::var(PROJECT_ENV).map_err(|_| BackupCtlError::NoProfileConfigured)?;
        Ok(ResolvedConnection {
            profile: None,
            project,
            endpoint: std::env::var(ENDPOINT_ENV).unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
            access_token: std::env::var(ACCESS_TOKEN_ENV).ok(),
            default_instance: None,
            polling: PollingConfig::default(),
        })
    }

    fn from_profile_only(name: &str, profile: &Profile) -> CliResult<ResolvedConnection> {
        let access_token = match &profile.access_token {
            Some(token) => Some(CredentialStore::new().get_credential(token, None)?),
            None => None,
        };
        Ok(ResolvedConnection {
            profile: Some(name.to_string()),
            project: profile.project.clone(),
            endpoint: profile.endpoint.clone(),
            access_token,
            default_instance: profile.default_instance.clone(),
            polling: profile.polling.clone(),
        })
    }

    /// Build a session for `instance_id`, or the profile's default instance
    pub fn create_session(
        &self,
        profile_name: Option<&str>,
        instance_id: Option<&str>,
        progress: Option<ProgressCallback>,
    ) -> CliResult<BackupSession> {
        let resolved = self.resolve(profile_name)?;

        let instance_id = instance_id
            .map(str::to_string)
            .or_else(|| resolved.default_instance.clone())
            .ok_or_else(|| BackupCtlError::MissingInstance {
                profile: resolved
                    .profile
                    .clone()
                    .unwrap_or_else(|| "<environment>".to_string()),
            })?;
        let instance = InstancePath::new(resolved.project.as_str(), instance_id.as_str());

        info!("Connecting to {} for {}", resolved.endpoint, instance.name());
        let service = RestAdminClient::new(resolved.endpoint.as_str(), resolved.access_token)?;

        let mut lro = LroClient::new(service).poll_interval(resolved.polling.poll_interval());
        if let Some(callback) = progress {
            lro = lro.on_progress(callback);
        }

        debug!("Admin client created successfully");
        Ok(BackupSession {
            lro,
            instance,
            polling: resolved.polling,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with(profile: Profile) -> ConnectionManager {
        let mut config = Config::default();
        config.set_profile("test".to_string(), profile);
        ConnectionManager::with_config_path(config, Some(PathBuf::from("/nonexistent.toml")))
    }

    #[test]
    fn test_explicit_instance_wins() {
        let mut profile = Profile::new("test-project");
        profile.default_instance = Some("default-instance".to_string());
        let session = manager_with(profile)
            .create_session(None, Some("other-instance"), None)
            .unwrap();
        assert_eq!(
            session.instance.name(),
            "projects/test-project/instances/other-instance"
        );
    }

    #[test]
    fn test_default_instance_from_profile() {
        let mut profile = Profile::new("test-project");
        profile.default_instance = Some("default-instance".to_string());
        profile.polling.poll_interval_secs = 3;
        let session = manager_with(profile).create_session(None, None, None).unwrap();
        assert_eq!(
            session.instance.name(),
            "projects/test-project/instances/default-instance"
        );
        assert_eq!(session.polling.poll_interval_secs, 3);
    }

    #[test]
    fn test_missing_instance_is_reported() {
        let err = manager_with(Profile::new("test-project"))
            .create_session(None, None, None)
            .err()
            .unwrap();
        assert!(matches!(err, BackupCtlError::MissingInstance { ref profile } if profile == "test"));
    }

    #[test]
    fn test_unknown_profile_is_reported() {
        let err = manager_with(Profile::new("test-project"))
            .resolve(Some("missing"))
            .unwrap_err();
        assert!(matches!(err, BackupCtlError::ProfileNotFound { .. }));
    }

    #[test]
    fn test_explicit_config_ignores_environment_token() {
        let mut profile = Profile::new("test-project");
        profile.access_token = Some("file-token".to_string());
        let resolved = manager_with(profile).resolve(None).unwrap();
        assert_eq!(resolved.access_token.as_deref(), Some("file-token"));
        assert_eq!(resolved.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    #[serial_test::serial]
    fn test_environment_fallback_without_profiles() {
        unsafe {
            std::env::set_var(PROJECT_ENV, "env-project");
            std::env::set_var(ENDPOINT_ENV, "http://localhost:9020");
            std::env::remove_var(ACCESS_TOKEN_ENV);
        }

        let manager = ConnectionManager::with_config_path(Config::default(), None);
        let resolved = manager.resolve(None);

        unsafe {
            std::env::remove_var(PROJECT_ENV);
            std::env::remove_var(ENDPOINT_ENV);
        }

        let resolved = resolved.unwrap();
        assert_eq!(resolved.profile, None);
        assert_eq!(resolved.project, "env-project");
        assert_eq!(resolved.endpoint, "http://localhost:9020");
        assert!(resolved.access_token.is_none());
    }

    #[test]
    #[serial_test::serial]
    fn test_explicit_config_skips_environment_fallback() {
        unsafe {
            std::env::set_var(PROJECT_ENV, "env-project");
        }
        let manager =
            ConnectionManager::with_config_path(Config::default(), Some(PathBuf::from("/x.toml")));
        let err = manager.resolve(None).unwrap_err();
        unsafe {
            std::env::remove_var(PROJECT_ENV);
        }
        assert!(matches!(err, BackupCtlError::NoProfileConfigured));
    }
}
