//! Error types for backupctl
//!
//! Library errors are mapped onto a small set of user-facing variants, each
//! with suggestions printed as a cargo-style diagnostic.

use backupctl_core::config::ConfigError;
use backupctl_core::CoreError;
use colored::Colorize;
use thiserror::Error;

/// Cargo-style diagnostic formatter for CLI errors.
///
/// ```text
/// error: no instance given
///
///   tip: pass the instance id: backupctl list-backups my-instance
/// ```
pub struct CliDiagnostic {
    message: String,
    detail: Option<String>,
    tips: Vec<String>,
}

impl CliDiagnostic {
    pub fn error(message: &str) -> Self {
        Self {
            message: message.to_string(),
            detail: None,
            tips: Vec::new(),
        }
    }

    pub fn detail(mut self, text: &str) -> Self {
        self.detail = Some(text.to_string());
        self
    }

    pub fn tip(mut self, description: &str) -> Self {
        self.tips.push(description.to_string());
        self
    }

    /// Print the diagnostic to stderr with colored formatting.
    pub fn print(&self) {
        eprint!("{}{}", "error".red().bold(), ": ".bold());
        eprintln!("{}", self.message);

        if let Some(detail) = &self.detail {
            eprintln!("  {}", detail);
        }

        for description in &self.tips {
            eprintln!();
            eprint!("  {}{}", "tip".yellow().bold(), ": ".bold());
            eprintln!("{}", description);
        }
    }
}

/// Main error type for the backupctl application
#[derive(Error, Debug)]
pub enum BackupCtlError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Profile '{name}' not found")]
    ProfileNotFound { name: String },

    #[error("No profile configured. Use 'backupctl profile set' to configure a profile.")]
    NoProfileConfigured,

    #[error("No instance given and profile '{profile}' has no default instance")]
    MissingInstance { profile: String },

    #[error("Connection error: {message}")]
    ConnectionError { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Precondition failed: {message}")]
    PreconditionFailed { message: String },

    #[error("Operation failed: {message}")]
    OperationFailed { message: String },

    #[error("Timeout: {message}")]
    Timeout { message: String },

    #[error("API error: {message}")]
    ApiError { message: String },

    #[error("Output formatting error: {message}")]
    OutputError { message: String },
}

/// Result type for backupctl operations
pub type Result<T> = std::result::Result<T, BackupCtlError>;

impl BackupCtlError {
    /// Get helpful suggestions for resolving this error
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            BackupCtlError::ProfileNotFound { name } => vec![
                "List available profiles: backupctl profile list".to_string(),
                format!(
                    "Create profile '{}': backupctl profile set {} --project <project>",
                    name, name
                ),
            ],
            BackupCtlError::NoProfileConfigured => vec![
                "Create a profile: backupctl profile set <name> --project <project>".to_string(),
                "Or set BACKUPCTL_PROJECT (and BACKUPCTL_ACCESS_TOKEN) in the environment"
                    .to_string(),
            ],
            BackupCtlError::MissingInstance { profile } => vec![
                "Pass the instance id: backupctl <command> <instance-id>".to_string(),
                format!(
                    "Or store one: backupctl profile set {} --project <project> --default-instance <instance-id>",
                    profile
                ),
            ],
            BackupCtlError::ConnectionError { message }
                if message.contains("401") || message.to_lowercase().contains("unauth") =>
            {
                vec![
                    "Check the access token: backupctl profile show <profile>".to_string(),
                    "Refresh it and export BACKUPCTL_ACCESS_TOKEN".to_string(),
                ]
            }
            BackupCtlError::ConnectionError { .. } => vec![
                "Check network connectivity".to_string(),
                "Verify the endpoint: backupctl profile show <profile>".to_string(),
            ],
            BackupCtlError::NotFound { .. } => vec![
                "Verify the instance, database and backup ids".to_string(),
                "List backups: backupctl list-backups <instance-id>".to_string(),
            ],
            BackupCtlError::PreconditionFailed { .. } => vec![
                "The resource is not in a state that allows this change yet".to_string(),
            ],
            BackupCtlError::Timeout { .. } => vec![
                "The operation may still be running: backupctl list-backup-operations <instance-id>"
                    .to_string(),
                "Raise the timeout in the profile's [polling] table".to_string(),
            ],
            BackupCtlError::InvalidInput { .. } => {
                vec!["Check the command syntax: backupctl <command> --help".to_string()]
            }
            _ => vec![],
        }
    }

    /// Print a cargo-style diagnostic to stderr using colored formatting.
    pub fn print_diagnostic(&self) {
        let mut diag = CliDiagnostic::error(&self.to_string());
        if let BackupCtlError::OperationFailed { .. } = self {
            diag = diag.detail("The service reported the operation as failed.");
        }
        for suggestion in self.suggestions() {
            diag = diag.tip(&suggestion);
        }
        diag.print();
    }
}

impl From<CoreError> for BackupCtlError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Transport(message) => BackupCtlError::ConnectionError { message },
            CoreError::InvalidArgument(message) => BackupCtlError::InvalidInput { message },
            CoreError::PreconditionFailed(message) => {
                BackupCtlError::PreconditionFailed { message }
            }
            CoreError::NotFound(message) => BackupCtlError::NotFound { message },
            CoreError::Timeout(waited) => BackupCtlError::Timeout {
                message: format!("gave up after {} seconds", waited.as_secs()),
            },
            CoreError::OperationFailed { code, message } => BackupCtlError::OperationFailed {
                message: format!("code {}: {}", code, message),
            },
            CoreError::OperationCancelled(operation) => BackupCtlError::OperationFailed {
                message: format!("{} was cancelled", operation),
            },
            CoreError::Api { status, message } => BackupCtlError::ApiError {
                message: format!("HTTP {}: {}", status, message),
            },
            CoreError::Decode(message) => BackupCtlError::ApiError {
                message: format!("unexpected response: {}", message),
            },
            CoreError::Config(err) => BackupCtlError::from(err),
        }
    }
}

impl From<ConfigError> for BackupCtlError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ProfileNotFound { name } => BackupCtlError::ProfileNotFound { name },
            ConfigError::NoProfiles { .. } => BackupCtlError::NoProfileConfigured,
            other => BackupCtlError::Configuration(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for BackupCtlError {
    fn from(err: serde_json::Error) -> Self {
        BackupCtlError::OutputError {
            message: format!("JSON error: {}", err),
        }
    }
}

impl From<std::io::Error> for BackupCtlError {
    fn from(err: std::io::Error) -> Self {
        BackupCtlError::OutputError {
            message: format!("IO error: {}", err),
        }
    }
}

impl From<anyhow::Error> for BackupCtlError {
    fn from(err: anyhow::Error) -> Self {
        BackupCtlError::OutputError {
            message: format!("{:#}", err),
        }
    }
}
