//! CLI structure and command definitions
//!
//! Backup workflows are top-level commands; each takes the instance id as a
//! positional argument, falling back to the profile's default instance.

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

/// Database ID used when `--database-id` is not given
pub const DEFAULT_DATABASE_ID: &str = "example_db";
/// Backup ID used when `--backup-id` is not given
pub const DEFAULT_BACKUP_ID: &str = "example_backup";

/// Manage database backups: create, copy, restore, list, update and delete
#[derive(Parser, Debug)]
#[command(name = "backupctl")]
#[command(version, about = "Database backup management CLI")]
#[command(long_about = "
Database backup management CLI

Every command that changes a backup or database starts a long-running
operation on the service and waits for it to settle.

EXAMPLES:
    # Set up a profile
    backupctl profile set prod --project my-project --default-instance my-instance

    # Create a backup of example_db and wait for it
    backupctl create-backup my-instance --database-id example_db --backup-id nightly

    # Restore it into a new database
    backupctl restore-database my-instance --database-id restored_db --backup-id nightly

    # JSON output for scripting
    backupctl list-backups my-instance -o json

    # Filter output with JMESPath
    backupctl list-backups -o json -q 'sections[0].backups'

For more help on a specific command, run:
    backupctl <command> --help
")]
pub struct Cli {
    /// Profile to use for this command
    #[arg(long, short, global = true, env = "BACKUPCTL_PROFILE")]
    pub profile: Option<String>,

    /// Path to alternate configuration file
    #[arg(long, global = true, env = "BACKUPCTL_CONFIG_FILE")]
    pub config_file: Option<String>,

    /// Output format
    #[arg(long, short = 'o', global = true, value_enum, default_value = "auto")]
    pub output: OutputFormat,

    /// JMESPath query to filter output
    #[arg(long, short = 'q', global = true)]
    pub query: Option<String>,

    /// Enable verbose logging
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable status lines
    Auto,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
    /// Table format
    Table,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(flatten)]
    Backup(BackupCommands),

    /// Profile management
    #[command(subcommand, visible_alias = "prof", visible_alias = "pr")]
    #[command(after_help = "EXAMPLES:
    # Create a profile
    backupctl profile set prod --project my-project --default-instance my-instance

    # Point a profile at a local emulator
    backupctl profile set local --project test-project --endpoint http://localhost:9020

    # List all profiles
    backupctl profile list

    # Set the default profile
    backupctl profile default prod
")]
    Profile(ProfileCommands),

    /// Version information
    #[command(visible_alias = "ver", visible_alias = "v")]
    Version,

    /// Generate shell completions
    #[command(visible_alias = "comp")]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Instance, database and backup a workflow acts on
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Instance ID (defaults to the profile's default instance)
    pub instance_id: Option<String>,

    /// Database ID
    #[arg(long, default_value = DEFAULT_DATABASE_ID)]
    pub database_id: String,

    /// Backup ID
    #[arg(long, default_value = DEFAULT_BACKUP_ID)]
    pub backup_id: String,
}

/// Backup and restore workflows
#[derive(Subcommand, Debug)]
pub enum BackupCommands {
    /// Create a backup of a database and wait for it to be ready
    #[command(visible_alias = "create_backup")]
    #[command(after_help = "EXAMPLES:
    # Backup of the current state
    backupctl create-backup my-instance --database-id example_db --backup-id nightly

    # Backup of the database as of a point in time, encrypted with a KMS key
    backupctl create-backup my-instance --version-time 2024-05-01T12:00:00Z \\
        --kms-key-name projects/p/locations/l/keyRings/r/cryptoKeys/k
")]
    CreateBackup {
        #[command(flatten)]
        target: TargetArgs,

        /// Customer-managed encryption key
        #[arg(long)]
        kms_key_name: Option<String>,

        /// Point in time to back up (RFC 3339), defaults to the creation time
        #[arg(long, value_parser = parse_timestamp)]
        version_time: Option<DateTime<Utc>>,
    },

    /// Start a backup, cancel it and clean up whatever is left
    #[command(visible_alias = "cancel_backup")]
    CancelBackup {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Show progress of create and copy backup operations
    #[command(visible_alias = "list_backup_operations")]
    ListBackupOperations {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// List backups using a series of filters
    #[command(visible_alias = "list_backups")]
    ListBackups {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Extend a backup's expire time by 30 days, capped at its maximum
    #[command(visible_alias = "update_backup")]
    UpdateBackup {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Restore a backup into a new database
    #[command(visible_alias = "restore_database")]
    RestoreDatabase {
        #[command(flatten)]
        target: TargetArgs,

        /// Customer-managed encryption key for the restored database
        #[arg(long)]
        kms_key_name: Option<String>,
    },

    /// Show progress of optimizations that follow a restore
    #[command(visible_alias = "list_database_operations")]
    ListDatabaseOperations {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Delete a backup once no database references it
    #[command(visible_alias = "delete_backup")]
    DeleteBackup {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Copy an existing backup into this instance
    #[command(visible_alias = "copy_backup")]
    CopyBackup {
        #[command(flatten)]
        target: TargetArgs,

        /// Full name of the backup to copy
        /// (projects/<p>/instances/<i>/backups/<b>)
        #[arg(long)]
        source_backup: String,
    },

    /// Create a database with a version retention period, report it, then drop it
    #[command(
        name = "create-database-with-version-retention-period",
        visible_alias = "create_database_with_version_retention_period"
    )]
    CreateDatabaseWithVersionRetentionPeriod {
        #[command(flatten)]
        target: TargetArgs,

        /// Version retention period, e.g. 7d or 1h
        #[arg(long, default_value = "7d")]
        retention_period: String,
    },
}

impl BackupCommands {
    pub fn target(&self) -> &TargetArgs {
        use BackupCommands::*;
        match self {
            CreateBackup { target, .. }
            | CancelBackup { target }
            | ListBackupOperations { target }
            | ListBackups { target }
            | UpdateBackup { target }
            | RestoreDatabase { target, .. }
            | ListDatabaseOperations { target }
            | DeleteBackup { target }
            | CopyBackup { target, .. }
            | CreateDatabaseWithVersionRetentionPeriod { target, .. } => target,
        }
    }

    /// Command name as typed on the command line
    pub fn name(&self) -> &'static str {
        use BackupCommands::*;
        match self {
            CreateBackup { .. } => "create-backup",
            CancelBackup { .. } => "cancel-backup",
            ListBackupOperations { .. } => "list-backup-operations",
            ListBackups { .. } => "list-backups",
            UpdateBackup { .. } => "update-backup",
            RestoreDatabase { .. } => "restore-database",
            ListDatabaseOperations { .. } => "list-database-operations",
            DeleteBackup { .. } => "delete-backup",
            CopyBackup { .. } => "copy-backup",
            CreateDatabaseWithVersionRetentionPeriod { .. } => {
                "create-database-with-version-retention-period"
            }
        }
    }

    /// Whether the command waits on a long-running operation
    pub fn waits(&self) -> bool {
        use BackupCommands::*;
        !matches!(
            self,
            ListBackupOperations { .. }
                | ListBackups { .. }
                | UpdateBackup { .. }
                | ListDatabaseOperations { .. }
        )
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp '{}': {} (expected RFC 3339)", s, e))
}

/// Supported shells for completion generation
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    #[value(name = "powershell", alias = "power-shell")]
    PowerShell,
    Elvish,
}

/// Profile management commands
#[derive(Subcommand, Debug)]
pub enum ProfileCommands {
    /// List all configured profiles
    #[command(visible_alias = "ls", visible_alias = "l")]
    List,

    /// Show the path to the configuration file
    Path,

    /// Show details of a specific profile
    #[command(visible_alias = "sh", visible_alias = "get")]
    Show {
        /// Profile name to show
        name: String,
    },

    /// Set or create a profile
    #[command(visible_alias = "add", visible_alias = "create")]
    #[command(after_help = "EXAMPLES:
    # Profile using the public endpoint and a token from the environment
    backupctl profile set prod --project my-project --default-instance my-instance

    # Profile with a stored access token
    backupctl profile set prod --project my-project --access-token \"$(gcloud auth print-access-token)\"

    # Faster polling for a local emulator
    backupctl profile set local --project test-project \\
        --endpoint http://localhost:9020 --poll-interval 1
")]
    Set {
        /// Profile name
        name: String,

        /// Project that owns the instances
        #[arg(long)]
        project: String,

        /// Admin API endpoint
        #[arg(long, default_value = backupctl_core::DEFAULT_ENDPOINT)]
        endpoint: String,

        /// OAuth access token sent as a bearer token
        #[arg(long)]
        access_token: Option<String>,

        /// Instance used when a command omits the instance id
        #[arg(long)]
        default_instance: Option<String>,

        /// Seconds between operation polls
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        poll_interval: Option<u64>,

        /// Store the access token in the OS keyring instead of the config file
        #[cfg(feature = "secure-storage")]
        #[arg(long, requires = "access_token")]
        use_keyring: bool,
    },

    /// Remove a profile
    #[command(visible_alias = "rm", visible_alias = "del", visible_alias = "delete")]
    Remove {
        /// Profile name to remove
        name: String,

        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Set the default profile
    #[command(visible_alias = "def")]
    Default {
        /// Profile name to use by default
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_target_defaults() {
        let cli = Cli::parse_from(["backupctl", "create-backup", "my-instance"]);
        let Commands::Backup(cmd) = cli.command else {
            panic!("expected a backup command");
        };
        let target = cmd.target();
        assert_eq!(target.instance_id.as_deref(), Some("my-instance"));
        assert_eq!(target.database_id, DEFAULT_DATABASE_ID);
        assert_eq!(target.backup_id, DEFAULT_BACKUP_ID);
        assert!(cmd.waits());
    }

    #[test]
    fn test_snake_case_alias() {
        let cli = Cli::parse_from(["backupctl", "list_backups", "--backup-id", "b1"]);
        let Commands::Backup(cmd) = cli.command else {
            panic!("expected a backup command");
        };
        assert_eq!(cmd.name(), "list-backups");
        assert!(cmd.target().instance_id.is_none());
        assert_eq!(cmd.target().backup_id, "b1");
        assert!(!cmd.waits());
    }

    #[test]
    fn test_version_time_must_be_rfc3339() {
        assert!(
            Cli::try_parse_from(["backupctl", "create-backup", "i", "--version-time", "yesterday"])
                .is_err()
        );
        let cli = Cli::parse_from([
            "backupctl",
            "create-backup",
            "i",
            "--version-time",
            "2024-05-01T12:00:00+02:00",
        ]);
        let Commands::Backup(BackupCommands::CreateBackup { version_time, .. }) = cli.command
        else {
            panic!("expected create-backup");
        };
        assert_eq!(
            version_time.unwrap().to_rfc3339(),
            "2024-05-01T10:00:00+00:00"
        );
    }

    #[test]
    fn test_copy_backup_requires_source() {
        assert!(Cli::try_parse_from(["backupctl", "copy-backup", "i"]).is_err());
    }

    #[test]
    fn test_profile_poll_interval_must_be_positive() {
        let set = |interval: &str| {
            Cli::try_parse_from([
                "backupctl",
                "profile",
                "set",
                "prod",
                "--project",
                "p",
                "--poll-interval",
                interval,
            ])
        };
        assert!(set("0").is_err());
        let cli = set("5").unwrap();
        let Commands::Profile(ProfileCommands::Set { poll_interval, .. }) = cli.command else {
            panic!("expected profile set");
        };
        assert_eq!(poll_interval, Some(5));
    }
}
