//! Profile management command implementations

use backupctl_core::config::{Config, Profile};
use colored::Colorize;
use serde_json::json;
use tracing::{debug, info, trace};

use crate::cli::{OutputFormat, ProfileCommands};
use crate::connection::ConnectionManager;
use crate::error::{BackupCtlError, Result as CliResult};
use crate::output;

/// Handle profile management commands
pub async fn handle_profile_command(
    profile_cmd: &ProfileCommands,
    conn_mgr: &ConnectionManager,
    output_format: OutputFormat,
) -> CliResult<()> {
    use ProfileCommands::*;

    match profile_cmd {
        List => handle_list(conn_mgr, output_format),
        Path => handle_path(conn_mgr, output_format),
        Show { name } => handle_show(conn_mgr, name, output_format),
        Set {
            name,
            project,
            endpoint,
            access_token,
            default_instance,
            poll_interval,
            #[cfg(feature = "secure-storage")]
            use_keyring,
        } => {
            let mut profile = conn_mgr
                .config
                .profiles
                .get(name)
                .cloned()
                .unwrap_or_else(|| Profile::new(project.as_str()));
            profile.project = project.clone();
            profile.endpoint = endpoint.clone();
            if let Some(instance) = default_instance {
                profile.default_instance = Some(instance.clone());
            }
            if let Some(secs) = poll_interval {
                profile.polling.poll_interval_secs = *secs;
            }
            if let Some(token) = access_token {
                #[cfg(feature = "secure-storage")]
                let token = if *use_keyring {
                    backupctl_core::config::CredentialStore::keyring()
                        .store_credential(&format!("{}-access-token", name), token)?
                } else {
                    token.clone()
                };
                #[cfg(not(feature = "secure-storage"))]
                let token = token.clone();
                profile.access_token = Some(token);
            }
            handle_set(conn_mgr, name, profile)
        }
        Remove { name, yes } => handle_remove(conn_mgr, name, *yes),
        Default { name } => handle_default(conn_mgr, name),
    }
}

fn config_path_display(conn_mgr: &ConnectionManager) -> Option<String> {
    conn_mgr
        .config_path
        .clone()
        .or_else(|| Config::config_path().ok())
        .map(|p| p.display().to_string())
}

fn structured(output_format: OutputFormat) -> Option<output::OutputFormat> {
    output::OutputFormat::structured(output_format, None)
}

fn profile_json(conn_mgr: &ConnectionManager, name: &str, profile: &Profile) -> serde_json::Value {
    json!({
        "name": name,
        "project": profile.project,
        "endpoint": profile.endpoint,
        "default_instance": profile.default_instance,
        "access_token_configured": profile.has_access_token(),
        "is_default": conn_mgr.config.default_profile.as_deref() == Some(name),
        "polling": profile.polling,
    })
}

fn handle_list(conn_mgr: &ConnectionManager, output_format: OutputFormat) -> CliResult<()> {
    debug!("Listing all configured profiles");
    let profiles = conn_mgr.config.list_profiles();
    trace!("Found {} profiles", profiles.len());

    if let Some(fmt) = structured(output_format) {
        let list: Vec<_> = profiles
            .iter()
            .map(|(name, profile)| profile_json(conn_mgr, name, profile))
            .collect();
        let data = match fmt {
            output::OutputFormat::Table => json!(list),
            _ => json!({
                "config_path": config_path_display(conn_mgr),
                "profiles": list,
                "count": profiles.len(),
            }),
        };
        output::print_output(&data, fmt, None)?;
        return Ok(());
    }

    if let Some(path) = config_path_display(conn_mgr) {
        println!("Configuration file: {}", path);
        println!();
    }

    if profiles.is_empty() {
        info!("No profiles configured");
        println!("No profiles configured.");
        println!("Use 'backupctl profile set <name> --project <project>' to create a profile.");
        return Ok(());
    }

    for (name, profile) in profiles {
        if conn_mgr.config.default_profile.as_deref() == Some(name.as_str()) {
            println!("{} {}", name.bold().cyan(), "(default)".green());
        } else {
            println!("{}", name.bold().cyan());
        }
        println!("    {} {}", "Project:".dimmed(), profile.project);
        println!("    {} {}", "Endpoint:".dimmed(), profile.endpoint);
        if let Some(instance) = &profile.default_instance {
            println!("    {} {}", "Instance:".dimmed(), instance);
        }
    }
    Ok(())
}

fn handle_path(conn_mgr: &ConnectionManager, output_format: OutputFormat) -> CliResult<()> {
    let path = config_path_display(conn_mgr).ok_or_else(|| {
        BackupCtlError::Configuration("Failed to determine config directory".to_string())
    })?;
    match structured(output_format) {
        Some(fmt) => output::print_output(json!({ "config_path": path }), fmt, None)?,
        None => println!("{}", path),
    }
    Ok(())
}

fn handle_show(
    conn_mgr: &ConnectionManager,
    name: &str,
    output_format: OutputFormat,
) -> CliResult<()> {
    let profile = conn_mgr.config.profile(name)?;

    if let Some(fmt) = structured(output_format) {
        output::print_output(profile_json(conn_mgr, name, profile), fmt, None)?;
        return Ok(());
    }

    println!("Profile: {}", name);
    println!("Project: {}", profile.project);
    println!("Endpoint: {}", profile.endpoint);
    println!(
        "Default instance: {}",
        profile.default_instance.as_deref().unwrap_or("not set")
    );
    let token = match &profile.access_token {
        Some(t) if backupctl_core::config::CredentialStore::is_keyring_reference(t) => "keyring",
        Some(_) => "configured",
        None => "not set",
    };
    println!("Access token: {}", token);
    println!(
        "Polling: every {}s, backup timeout {}s, restore timeout {}s",
        profile.polling.poll_interval_secs,
        profile.polling.backup_timeout_secs,
        profile.polling.restore_timeout_secs
    );
    if conn_mgr.config.default_profile.as_deref() == Some(name) {
        println!("Default: yes");
    }
    Ok(())
}

fn handle_set(conn_mgr: &ConnectionManager, name: &str, profile: Profile) -> CliResult<()> {
    debug!("Setting profile: {}", name);
    let mut config = conn_mgr.config.clone();
    let first = config.profiles.is_empty();
    config.set_profile(name.to_string(), profile);
    if first {
        config.default_profile = Some(name.to_string());
    }
    conn_mgr.save_config(&config)?;

    println!("Profile '{}' saved successfully.", name);
    if first {
        println!("Set as default profile.");
    }
    Ok(())
}

fn handle_remove(conn_mgr: &ConnectionManager, name: &str, yes: bool) -> CliResult<()> {
    debug!("Removing profile: {}", name);
    conn_mgr.config.profile(name)?;

    let is_default = conn_mgr.config.default_profile.as_deref() == Some(name);
    if is_default {
        println!("Warning: '{}' is the default profile.", name);
    }

    if !yes {
        use std::io::{self, Write};
        print!("Are you sure you want to remove profile '{}'? (y/N): ", name);
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();
        if input != "y" && input != "yes" {
            println!("Profile removal cancelled.");
            return Ok(());
        }
    }

    let mut config = conn_mgr.config.clone();
    if let Some(profile) = config.remove_profile(name)
        && let Some(token) = &profile.access_token
        && let Err(e) = backupctl_core::config::CredentialStore::new().delete_credential(token)
    {
        debug!("Could not delete stored token for '{}': {}", name, e);
    }
    conn_mgr.save_config(&config)?;

    if is_default {
        println!("Default profile cleared.");
    }
    println!("Profile '{}' removed successfully.", name);
    Ok(())
}

fn handle_default(conn_mgr: &ConnectionManager, name: &str) -> CliResult<()> {
    debug!("Setting default profile: {}", name);
    conn_mgr.config.profile(name)?;

    let mut config = conn_mgr.config.clone();
    config.default_profile = Some(name.to_string());
    conn_mgr.save_config(&config)?;

    println!("Default profile set to '{}'.", name);
    Ok(())
}
