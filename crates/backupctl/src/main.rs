use anyhow::Result;
use backupctl_core::config::Config;
use clap::{CommandFactory, Parser};
use clap_complete::{generate, shells};
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod connection;
mod error;
mod output;

use cli::{Cli, Commands};
use connection::ConnectionManager;
use error::BackupCtlError;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    // Load configuration from specified path or default location
    let (config, config_path) = if let Some(config_file) = &cli.config_file {
        let path = std::path::PathBuf::from(config_file);
        debug!("Loading config from explicit path: {:?}", path);
        let config = Config::load_from_path(&path)?;
        (config, Some(path))
    } else {
        debug!("Loading config from default location");
        (Config::load()?, None)
    };
    let conn_mgr = ConnectionManager::with_config_path(config, config_path);

    if let Err(e) = execute_command(&cli, &conn_mgr).await {
        e.print_diagnostic();
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    // RUST_LOG wins over the verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "backupctl=warn,backupctl_core=warn",
            1 => "backupctl=info,backupctl_core=info",
            2 => "backupctl=debug,backupctl_core=debug",
            _ => "backupctl=trace,backupctl_core=trace",
        };
        tracing_subscriber::EnvFilter::new(level)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .compact(),
        )
        .init();

    debug!("Tracing initialized with verbosity level: {}", verbose);
}

async fn execute_command(cli: &Cli, conn_mgr: &ConnectionManager) -> Result<(), BackupCtlError> {
    info!("Command: {}", format_command(&cli.command));

    let start = std::time::Instant::now();
    let result = match &cli.command {
        Commands::Version => {
            debug!("Showing version information");
            match output::OutputFormat::structured(cli.output, cli.query.as_deref()) {
                Some(fmt) => {
                    let data = serde_json::json!({
                        "version": env!("CARGO_PKG_VERSION"),
                        "name": env!("CARGO_PKG_NAME"),
                    });
                    output::print_output(&data, fmt, cli.query.as_deref())
                        .map_err(BackupCtlError::from)
                }
                None => {
                    println!("backupctl {}", env!("CARGO_PKG_VERSION"));
                    Ok(())
                }
            }
        }
        Commands::Completions { shell } => {
            debug!("Generating completions for {:?}", shell);
            generate_completions(*shell);
            Ok(())
        }
        Commands::Profile(profile_cmd) => {
            commands::profile::handle_profile_command(profile_cmd, conn_mgr, cli.output).await
        }
        Commands::Backup(backup_cmd) => {
            commands::backup::handle_backup_command(
                backup_cmd,
                conn_mgr,
                cli.profile.as_deref(),
                cli.output,
                cli.query.as_deref(),
            )
            .await
        }
    };

    let duration = start.elapsed();
    match &result {
        Ok(_) => info!("Command completed successfully in {:?}", duration),
        Err(e) => error!("Command failed after {:?}: {}", duration, e),
    }

    result
}

fn generate_completions(shell: cli::Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    let out = &mut std::io::stdout();

    match shell {
        cli::Shell::Bash => generate(shells::Bash, &mut cmd, name, out),
        cli::Shell::Zsh => generate(shells::Zsh, &mut cmd, name, out),
        cli::Shell::Fish => generate(shells::Fish, &mut cmd, name, out),
        cli::Shell::PowerShell => generate(shells::PowerShell, &mut cmd, name, out),
        cli::Shell::Elvish => generate(shells::Elvish, &mut cmd, name, out),
    }
}

/// Format command for logging, without credentials
fn format_command(command: &Commands) -> String {
    match command {
        Commands::Version => "version".to_string(),
        Commands::Completions { shell } => format!("completions {:?}", shell),
        Commands::Profile(cmd) => {
            use cli::ProfileCommands::*;
            match cmd {
                List => "profile list".to_string(),
                Path => "profile path".to_string(),
                Show { name } => format!("profile show {}", name),
                Set { name, .. } => format!("profile set {} [credentials redacted]", name),
                Remove { name, .. } => format!("profile remove {}", name),
                Default { name } => format!("profile default {}", name),
            }
        }
        Commands::Backup(cmd) => {
            let target = cmd.target();
            format!(
                "{} {} --database-id {} --backup-id {}",
                cmd.name(),
                target.instance_id.as_deref().unwrap_or("<default>"),
                target.database_id,
                target.backup_id
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_command_redacts_token() {
        let cli = Cli::parse_from([
            "backupctl",
            "profile",
            "set",
            "prod",
            "--project",
            "p",
            "--access-token",
            "secret-token",
        ]);
        let formatted = format_command(&cli.command);
        assert_eq!(formatted, "profile set prod [credentials redacted]");
        assert!(!formatted.contains("secret-token"));
    }

    #[test]
    fn test_format_backup_command() {
        let cli = Cli::parse_from(["backupctl", "delete_backup", "--backup-id", "b1"]);
        assert_eq!(
            format_command(&cli.command),
            "delete-backup <default> --database-id example_db --backup-id b1"
        );
    }
}
