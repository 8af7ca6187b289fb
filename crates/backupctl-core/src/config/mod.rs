//! Configuration and profile management for backupctl
//!
// Allow nested config module - this is intentional for the config subsystem

#![allow(clippy::module_inception)]
//!
//! # Features
//!
//! - Multiple named profiles, each bound to one project and endpoint
//! - Access tokens in plaintext, the OS keyring (optional) or the environment
//! - Environment variable expansion in config files
//! - Platform-specific config file locations
//! - Per-profile polling intervals and timeouts

pub mod config;
pub mod credential;
pub mod error;
pub mod polling;

// Re-export main types for convenience
pub use config::{ACCESS_TOKEN_ENV, Config, ENDPOINT_ENV, PROJECT_ENV, Profile};
pub use credential::{CredentialStorage, CredentialStore};
pub use error::{ConfigError, Result};
pub use polling::PollingConfig;
