//! Backup workflow command implementations

use backupctl_core::workflows;
use tracing::debug;

use crate::cli::{BackupCommands, OutputFormat};
use crate::commands::progress;
use crate::connection::{BackupSession, ConnectionManager};
use crate::error::Result as CliResult;
use crate::output::print_report;

/// Handle a backup workflow command
pub async fn handle_backup_command(
    cmd: &BackupCommands,
    conn_mgr: &ConnectionManager,
    profile: Option<&str>,
    output: OutputFormat,
    query: Option<&str>,
) -> CliResult<()> {
    let target = cmd.target();

    // The spinner would interleave with structured output
    let spinner = (cmd.waits() && output == OutputFormat::Auto && query.is_none())
        .then(|| progress::spinner(&format!("Running {}", cmd.name())));
    let (pb, callback) = match spinner {
        Some((pb, callback)) => (Some(pb), Some(callback)),
        None => (None, None),
    };

    let session = conn_mgr.create_session(profile, target.instance_id.as_deref(), callback)?;
    debug!("Running {} against {}", cmd.name(), session.instance.name());

    let result = run(cmd, &session, output, query).await;

    if let Some(pb) = pb
        && !pb.is_finished()
    {
        pb.finish_and_clear();
    }
    result
}

async fn run(
    cmd: &BackupCommands,
    session: &BackupSession,
    output: OutputFormat,
    query: Option<&str>,
) -> CliResult<()> {
    use BackupCommands::*;

    let BackupSession {
        lro,
        instance,
        polling,
    } = session;

    match cmd {
        CreateBackup {
            target,
            kms_key_name,
            version_time,
        } => {
            let report = workflows::create_backup(
                lro,
                instance,
                &target.database_id,
                &target.backup_id,
                *version_time,
                kms_key_name.as_deref(),
                polling,
            )
            .await?;
            print_report(&report, output, query)?;
        }
        CancelBackup { target } => {
            let report = workflows::cancel_backup(
                lro,
                instance,
                &target.database_id,
                &target.backup_id,
                polling,
            )
            .await?;
            print_report(&report, output, query)?;
        }
        ListBackupOperations { target } => {
            let report = workflows::list_backup_operations(
                lro,
                instance,
                &target.database_id,
                &target.backup_id,
            )
            .await?;
            print_report(&report, output, query)?;
        }
        ListBackups { target } => {
            let report =
                workflows::list_backups(lro, instance, &target.database_id, &target.backup_id)
                    .await?;
            print_report(&report, output, query)?;
        }
        UpdateBackup { target } => {
            let report = workflows::update_backup(lro, instance, &target.backup_id).await?;
            print_report(&report, output, query)?;
        }
        RestoreDatabase {
            target,
            kms_key_name,
        } => {
            let report = workflows::restore_database(
                lro,
                instance,
                &target.database_id,
                &target.backup_id,
                kms_key_name.as_deref(),
                polling,
            )
            .await?;
            print_report(&report, output, query)?;
        }
        ListDatabaseOperations { .. } => {
            let report = workflows::list_database_operations(lro, instance).await?;
            print_report(&report, output, query)?;
        }
        DeleteBackup { target } => {
            let report =
                workflows::delete_backup(lro, instance, &target.backup_id, polling).await?;
            print_report(&report, output, query)?;
        }
        CopyBackup {
            target,
            source_backup,
        } => {
            let report =
                workflows::copy_backup(lro, instance, &target.backup_id, source_backup, polling)
                    .await?;
            print_report(&report, output, query)?;
        }
        CreateDatabaseWithVersionRetentionPeriod {
            target,
            retention_period,
        } => {
            let report = workflows::create_database_with_version_retention_period(
                lro,
                instance,
                &target.database_id,
                retention_period,
                polling,
            )
            .await?;
            print_report(&report, output, query)?;
        }
    }

    Ok(())
}
