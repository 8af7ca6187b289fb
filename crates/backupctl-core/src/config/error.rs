//! Configuration errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file exists but could not be read
    #[error("Cannot read backupctl config at {path}: {source}")]
    LoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Writing the config file or creating its directory failed
    #[error("Cannot write backupctl config to {path}: {source}")]
    SaveError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Cannot encode config as TOML: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Profile '{name}' not found")]
    ProfileNotFound { name: String },

    /// No profile was named and none is configured
    #[error("No profiles configured. {suggestion}")]
    NoProfiles { suggestion: String },

    /// An access token reference could not be turned into a token
    #[error("Cannot resolve access token: {0}")]
    CredentialError(String),

    #[cfg(feature = "secure-storage")]
    #[error("Keyring error: {0}")]
    KeyringError(String),

    #[error("Cannot determine the platform config directory")]
    ConfigDirError,
}

pub type Result<T> = std::result::Result<T, ConfigError>;
