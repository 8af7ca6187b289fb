//! Backup workflows - multi-step operations
//!
//! Each workflow composes single RPCs and the operation facade into one
//! task: submit, wait, reload the resulting resource, verify, report. The
//! returned report types serialize for structured output and implement
//! `Display` with the status line printed by the CLI.

use chrono::{DateTime, Duration as ChronoDuration, SubsecRound, Utc};
use futures::TryStreamExt;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::PollingConfig;
use crate::error::{CoreError, Result};
use crate::filters;
use crate::lro::{AdminRequest, CancelOutcome, LroClient};
use crate::service::AdminService;
use crate::types::{
    BackupDescriptor, CopyBackupRequest, CreateBackupRequest, CreateDatabaseRequest,
    EncryptionConfig, InstancePath, OperationMetadata, RestoreDatabaseRequest, short_name,
};

/// Days a new backup is kept
pub const BACKUP_RETENTION_DAYS: i64 = 14;
/// Days a backup created only to be cancelled would be kept
pub const CANCEL_BACKUP_RETENTION_DAYS: i64 = 30;
/// Days added to a backup's expire time by `update_backup`
pub const EXPIRE_EXTENSION_DAYS: i64 = 30;
/// Page size used for the paginated listing pass
pub const LIST_PAGE_SIZE: u32 = 2;
/// Size threshold of the "large backups" listing
pub const LIST_MIN_SIZE_BYTES: i64 = 100;

fn display_time(time: &Option<DateTime<Utc>>) -> String {
    match time {
        Some(t) => t.to_rfc3339(),
        None => "unknown".to_string(),
    }
}

/// A backup created or copied by a workflow
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupReport {
    pub name: String,
    pub size_bytes: i64,
    pub create_time: Option<DateTime<Utc>>,
    pub version_time: Option<DateTime<Utc>>,
    pub expire_time: Option<DateTime<Utc>>,
    /// Key requested for customer-managed encryption
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kms_key_name: Option<String>,
    /// Backup this one was copied from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_backup: Option<String>,
}

impl BackupReport {
    fn from_descriptor(backup: &BackupDescriptor) -> Self {
        Self {
            name: backup.name.clone(),
            size_bytes: backup.size_bytes,
            create_time: backup.create_time,
            version_time: backup.version_time,
            expire_time: backup.expire_time,
            kms_key_name: None,
            source_backup: None,
        }
    }
}

impl fmt::Display for BackupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Backup {} of size {} bytes was created at {}",
            self.name,
            self.size_bytes,
            display_time(&self.create_time)
        )?;
        match (&self.kms_key_name, &self.source_backup) {
            (Some(key), _) => write!(f, " using encryption key {}", key),
            (None, Some(_)) => write!(f, " with version time {}", display_time(&self.version_time)),
            (None, None) => write!(
                f,
                " for version of database at {}",
                display_time(&self.version_time)
            ),
        }
    }
}

/// How a cancelled backup creation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelStatus {
    /// No backup was left behind
    Cancelled,
    /// The backup finished first and was deleted afterwards
    CompletedBeforeCancel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CancelReport {
    pub backup: String,
    pub status: CancelStatus,
}

impl fmt::Display for CancelReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            CancelStatus::Cancelled => write!(f, "Backup creation was successfully cancelled."),
            CancelStatus::CompletedBeforeCancel => write!(
                f,
                "Backup was created before the cancel completed.\nBackup deleted."
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpireTimeReport {
    pub name: String,
    pub old_expire_time: DateTime<Utc>,
    pub new_expire_time: DateTime<Utc>,
}

impl fmt::Display for ExpireTimeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Backup {} expire time was updated from {} to {}.",
            self.name,
            self.old_expire_time.to_rfc3339(),
            self.new_expire_time.to_rfc3339()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestoreReport {
    pub database_id: String,
    pub source_database: String,
    pub backup: String,
    pub version_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kms_key_name: Option<String>,
}

impl fmt::Display for RestoreReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Database {} restored to {} from backup {}",
            self.source_database, self.database_id, self.backup
        )?;
        match &self.kms_key_name {
            Some(key) => write!(f, " with using encryption key {}.", key),
            None => write!(f, " with version time {}.", display_time(&self.version_time)),
        }
    }
}

/// One titled group of backup names
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupListSection {
    pub title: String,
    pub backups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupListReport {
    pub sections: Vec<BackupListSection>,
}

impl fmt::Display for BackupListReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for section in &self.sections {
            if !first {
                writeln!(f)?;
            }
            first = false;
            write!(f, "{}", section.title)?;
            for backup in &section.backups {
                write!(f, "\n{}", backup)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupOperationProgress {
    pub backup: String,
    /// Source database (create) or source backup (copy)
    pub source: String,
    pub progress_percent: i32,
    pub copy: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupOperationsReport {
    pub operations: Vec<BackupOperationProgress>,
}

impl fmt::Display for BackupOperationsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self
            .operations
            .iter()
            .map(|op| {
                let on = if op.copy { "source backup" } else { "database" };
                format!(
                    "Backup {} on {} {}: {}% complete.",
                    op.backup, on, op.source, op.progress_percent
                )
            })
            .collect();
        write!(f, "{}", lines.join("\n"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationProgress {
    pub database: String,
    pub progress_percent: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseOperationsReport {
    pub operations: Vec<OptimizationProgress>,
}

impl fmt::Display for DatabaseOperationsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self
            .operations
            .iter()
            .map(|op| {
                format!(
                    "Database {} restored from backup is {}% optimized.",
                    op.database, op.progress_percent
                )
            })
            .collect();
        write!(f, "{}", lines.join("\n"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteReport {
    pub name: String,
}

impl fmt::Display for DeleteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Backup {} has been deleted.", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetentionReport {
    pub database_id: String,
    pub version_retention_period: String,
    pub earliest_version_time: Option<DateTime<Utc>>,
}

impl fmt::Display for RetentionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Database {} created with version retention period {} and earliest version time {}",
            self.database_id,
            self.version_retention_period,
            display_time(&self.earliest_version_time)
        )
    }
}

async fn reload_ready_backup<S: AdminService>(service: &S, name: &str) -> Result<BackupDescriptor> {
    let backup = service.get_backup(name).await?;
    if !backup.is_ready() {
        return Err(CoreError::PreconditionFailed(format!(
            "backup {} is {} after its operation completed",
            name, backup.state
        )));
    }
    Ok(backup)
}

/// Create a backup and wait until it is ready
///
/// The backup expires 14 days from now. `version_time` picks an earlier
/// point in the database's version history; `kms_key_name` requests
/// customer-managed encryption.
pub async fn create_backup<S: AdminService, C: Clock>(
    lro: &LroClient<S, C>,
    instance: &InstancePath,
    database_id: &str,
    backup_id: &str,
    version_time: Option<DateTime<Utc>>,
    kms_key_name: Option<&str>,
    polling: &PollingConfig,
) -> Result<BackupReport> {
    let expire_time = lro.clock().utc_now() + ChronoDuration::days(BACKUP_RETENTION_DAYS);
    let request = CreateBackupRequest {
        backup_id: backup_id.to_string(),
        database: instance.database_name(database_id),
        expire_time,
        version_time,
        encryption: kms_key_name.map(EncryptionConfig::customer_managed),
    };

    let handle = lro
        .submit(instance, AdminRequest::CreateBackup(request))
        .await?;
    let timeout = polling.backup_timeout();
    lro.await_completion(&handle, timeout)
        .await?
        .into_result(handle.name(), timeout)?;

    let backup = reload_ready_backup(lro.service(), handle.target()).await?;
    info!("Backup {} is ready", backup.name);

    let mut report = BackupReport::from_descriptor(&backup);
    report.kms_key_name = kms_key_name.map(String::from);
    Ok(report)
}

/// Copy a backup and wait until the copy is ready
pub async fn copy_backup<S: AdminService, C: Clock>(
    lro: &LroClient<S, C>,
    instance: &InstancePath,
    backup_id: &str,
    source_backup: &str,
    polling: &PollingConfig,
) -> Result<BackupReport> {
    let expire_time = lro.clock().utc_now() + ChronoDuration::days(BACKUP_RETENTION_DAYS);
    let request = CopyBackupRequest {
        backup_id: backup_id.to_string(),
        source_backup: source_backup.to_string(),
        expire_time,
        encryption: None,
    };

    let handle = lro
        .submit(instance, AdminRequest::CopyBackup(request))
        .await?;
    let timeout = polling.backup_timeout();
    lro.await_completion(&handle, timeout)
        .await?
        .into_result(handle.name(), timeout)?;

    let backup = reload_ready_backup(lro.service(), handle.target()).await?;
    info!("Backup copy {} is ready", backup.name);

    let mut report = BackupReport::from_descriptor(&backup);
    report.source_backup = Some(source_backup.to_string());
    Ok(report)
}

/// Start a backup, cancel it straight away and clean up whatever is left.
///
/// Cancellation is best effort. If the backup finished first it is deleted.
pub async fn cancel_backup<S: AdminService, C: Clock>(
    lro: &LroClient<S, C>,
    instance: &InstancePath,
    database_id: &str,
    backup_id: &str,
    polling: &PollingConfig,
) -> Result<CancelReport> {
    let expire_time = lro.clock().utc_now() + ChronoDuration::days(CANCEL_BACKUP_RETENTION_DAYS);
    let request = CreateBackupRequest {
        backup_id: backup_id.to_string(),
        database: instance.database_name(database_id),
        expire_time,
        version_time: None,
        encryption: None,
    };

    let handle = lro
        .submit(instance, AdminRequest::CreateBackup(request))
        .await?;
    let outcome = lro
        .cancel_and_settle(
            &handle,
            polling.cancel_poll_interval(),
            polling.cancel_timeout(),
        )
        .await?;

    if let CancelOutcome::Failed(err) = &outcome {
        debug!("Cancelled backup operation ended with {}", err);
    }

    let name = handle.target().to_string();
    let status = match lro.service().get_backup(&name).await {
        Ok(_) => {
            if !matches!(outcome, CancelOutcome::CompletedBeforeCancel(_)) {
                warn!("Backup {} exists after cancellation", name);
            }
            lro.service().delete_backup(&name).await?;
            info!("Deleted backup {} left by the cancelled operation", name);
            CancelStatus::CompletedBeforeCancel
        }
        Err(err) if err.is_not_found() => CancelStatus::Cancelled,
        Err(err) => return Err(err),
    };

    Ok(CancelReport {
        backup: name,
        status,
    })
}

/// Push a backup's expire time out by 30 days, capped at its max expire time
pub async fn update_backup<S: AdminService, C: Clock>(
    lro: &LroClient<S, C>,
    instance: &InstancePath,
    backup_id: &str,
) -> Result<ExpireTimeReport> {
    let name = instance.backup_name(backup_id);
    let backup = lro.service().get_backup(&name).await?;

    let old_expire_time = backup
        .expire_time
        .ok_or_else(|| CoreError::Decode(format!("backup {} has no expire time", name)))?;
    let mut new_expire_time = old_expire_time + ChronoDuration::days(EXPIRE_EXTENSION_DAYS);
    if let Some(max) = backup.max_expire_time {
        new_expire_time = new_expire_time.min(max);
    }

    let updated = lro
        .service()
        .update_backup_expire_time(&name, new_expire_time)
        .await?;
    info!("Backup {} now expires at {}", name, new_expire_time);

    Ok(ExpireTimeReport {
        name,
        old_expire_time,
        new_expire_time: updated.expire_time.unwrap_or(new_expire_time),
    })
}

/// Restore a backup into a new database and wait for it
pub async fn restore_database<S: AdminService, C: Clock>(
    lro: &LroClient<S, C>,
    instance: &InstancePath,
    database_id: &str,
    backup_id: &str,
    kms_key_name: Option<&str>,
    polling: &PollingConfig,
) -> Result<RestoreReport> {
    let request = RestoreDatabaseRequest {
        database_id: database_id.to_string(),
        backup: instance.backup_name(backup_id),
        encryption: kms_key_name.map(EncryptionConfig::customer_managed),
    };

    let handle = lro
        .submit(instance, AdminRequest::RestoreDatabase(request))
        .await?;
    let timeout = polling.restore_timeout();
    lro.await_completion(&handle, timeout)
        .await?
        .into_result(handle.name(), timeout)?;

    let database = lro.service().get_database(handle.target()).await?;
    let backup_info = database
        .restore_info
        .and_then(|info| info.backup_info)
        .ok_or_else(|| {
            CoreError::Decode(format!("database {} has no restore info", database.name))
        })?;
    info!("Restored {} from {}", database.name, backup_info.backup);

    let kms_key_name = match kms_key_name {
        Some(_) => database.encryption_config.map(|c| c.kms_key_name),
        None => None,
    };

    Ok(RestoreReport {
        database_id: database_id.to_string(),
        source_database: backup_info.source_database,
        backup: backup_info.backup,
        version_time: backup_info.version_time,
        kms_key_name,
    })
}

/// Run the canned backup listings, ending with a paginated pass
pub async fn list_backups<S: AdminService, C: Clock>(
    lro: &LroClient<S, C>,
    instance: &InstancePath,
    database_id: &str,
    backup_id: &str,
) -> Result<BackupListReport> {
    let now = lro.clock().utc_now().trunc_subsecs(0);
    let expire_before = now + ChronoDuration::days(30);
    let created_since = now - ChronoDuration::days(1);

    let listings = [
        ("All backups:".to_string(), None),
        (
            format!("All backups with backup name containing \"{}\":", backup_id),
            Some(filters::name_contains(backup_id)),
        ),
        (
            format!(
                "All backups with database name containing \"{}\":",
                database_id
            ),
            Some(filters::database_contains(database_id)),
        ),
        (
            format!(
                "All backups with expire_time before \"{}\":",
                filters::format_timestamp(expire_before)
            ),
            Some(filters::expire_time_before(expire_before)),
        ),
        (
            format!(
                "All backups with backup size more than {} bytes:",
                LIST_MIN_SIZE_BYTES
            ),
            Some(filters::size_bytes_greater_than(LIST_MIN_SIZE_BYTES)),
        ),
        (
            format!(
                "All backups created after \"{}\" and are READY:",
                filters::format_timestamp(created_since)
            ),
            Some(filters::ready_created_since(created_since)),
        ),
    ];

    let mut sections = Vec::with_capacity(listings.len() + 1);
    for (title, filter) in listings {
        debug!("Listing backups with filter {:?}", filter);
        let backups: Vec<String> = lro
            .list_backups(instance, filter)
            .stream()
            .map_ok(|backup| backup.name)
            .try_collect()
            .await?;
        sections.push(BackupListSection { title, backups });
    }

    let pager = lro.list_backups(instance, None).page_size(LIST_PAGE_SIZE);
    let paged: BTreeSet<String> = pager
        .stream()
        .map_ok(|backup| backup.name)
        .try_collect()
        .await?;
    sections.push(BackupListSection {
        title: "All backups with pagination".to_string(),
        backups: paged.into_iter().collect(),
    });

    Ok(BackupListReport { sections })
}

/// Progress of create operations for a database and copies of a backup
pub async fn list_backup_operations<S: AdminService, C: Clock>(
    lro: &LroClient<S, C>,
    instance: &InstancePath,
    database_id: &str,
    backup_id: &str,
) -> Result<BackupOperationsReport> {
    use crate::lro::OperationListKind::Backup;

    let mut operations = Vec::new();

    let creates = lro
        .list_operations(
            instance,
            Backup,
            Some(filters::create_backup_operations(database_id)),
        )
        .collect_all()
        .await?;
    for op in creates {
        if let Some(OperationMetadata::CreateBackup(m)) = op.metadata {
            operations.push(BackupOperationProgress {
                backup: m.name,
                source: m.database,
                progress_percent: m.progress.progress_percent,
                copy: false,
            });
        }
    }

    let copies = lro
        .list_operations(
            instance,
            Backup,
            Some(filters::copy_backup_operations(backup_id)),
        )
        .collect_all()
        .await?;
    for op in copies {
        if let Some(OperationMetadata::CopyBackup(m)) = op.metadata {
            operations.push(BackupOperationProgress {
                backup: m.name,
                source: m.source_backup,
                progress_percent: m.progress.progress_percent,
                copy: true,
            });
        }
    }

    Ok(BackupOperationsReport { operations })
}

/// Progress of post-restore optimizations
pub async fn list_database_operations<S: AdminService, C: Clock>(
    lro: &LroClient<S, C>,
    instance: &InstancePath,
) -> Result<DatabaseOperationsReport> {
    let ops = lro
        .list_operations(
            instance,
            crate::lro::OperationListKind::Database,
            Some(filters::optimize_restored_database_operations()),
        )
        .collect_all()
        .await?;

    let operations = ops
        .into_iter()
        .filter_map(|op| match op.metadata {
            Some(OperationMetadata::OptimizeRestoredDatabase(m)) => Some(OptimizationProgress {
                database: m.name,
                progress_percent: m.progress.progress_percent,
            }),
            _ => None,
        })
        .collect();

    Ok(DatabaseOperationsReport { operations })
}

/// Delete a backup once no restored database references it any more
pub async fn delete_backup<S: AdminService, C: Clock>(
    lro: &LroClient<S, C>,
    instance: &InstancePath,
    backup_id: &str,
    polling: &PollingConfig,
) -> Result<DeleteReport> {
    let name = instance.backup_name(backup_id);
    let started = lro.clock().now();
    let mut backup = lro.service().get_backup(&name).await?;

    while !backup.referencing_databases.is_empty() {
        let elapsed = lro.clock().now().saturating_duration_since(started);
        if elapsed >= polling.reference_timeout() {
            return Err(CoreError::Timeout(polling.reference_timeout()));
        }
        info!(
            "Waiting for {} to stop referencing {}",
            backup.referencing_databases.join(", "),
            short_name(&name)
        );
        lro.clock().sleep(polling.reference_poll_interval()).await;
        backup = lro.service().get_backup(&name).await?;
    }

    lro.service().delete_backup(&name).await?;
    match lro.service().get_backup(&name).await {
        Err(err) if err.is_not_found() => {}
        Ok(_) => {
            return Err(CoreError::PreconditionFailed(format!(
                "backup {} still exists after delete",
                name
            )));
        }
        Err(err) => return Err(err),
    }

    info!("Deleted backup {}", name);
    Ok(DeleteReport { name })
}

/// DDL for the sample schema plus the retention option
pub fn version_retention_ddl(database_id: &str, retention_period: &str) -> Vec<String> {
    vec![
        "CREATE TABLE Singers (\
         SingerId   INT64 NOT NULL,\
         FirstName  STRING(1024),\
         LastName   STRING(1024),\
         SingerInfo BYTES(MAX)\
         ) PRIMARY KEY (SingerId)"
            .to_string(),
        "CREATE TABLE Albums (\
         SingerId     INT64 NOT NULL,\
         AlbumId      INT64 NOT NULL,\
         AlbumTitle   STRING(MAX)\
         ) PRIMARY KEY (SingerId, AlbumId),\
         INTERLEAVE IN PARENT Singers ON DELETE CASCADE"
            .to_string(),
        format!(
            "ALTER DATABASE `{}` SET OPTIONS (version_retention_period = '{}')",
            database_id, retention_period
        ),
    ]
}

/// Create a database with a version retention period, report it, drop it
pub async fn create_database_with_version_retention_period<S: AdminService, C: Clock>(
    lro: &LroClient<S, C>,
    instance: &InstancePath,
    database_id: &str,
    retention_period: &str,
    polling: &PollingConfig,
) -> Result<RetentionReport> {
    let request = CreateDatabaseRequest {
        create_statement: format!("CREATE DATABASE `{}`", database_id),
        extra_statements: version_retention_ddl(database_id, retention_period),
    };

    let handle = lro
        .submit(instance, AdminRequest::CreateDatabase(request))
        .await?;
    let timeout = polling.create_database_timeout();
    lro.await_completion(&handle, timeout)
        .await?
        .into_result(handle.name(), timeout)?;

    let database = lro.service().get_database(handle.target()).await?;
    let report = RetentionReport {
        database_id: short_name(&database.name).to_string(),
        version_retention_period: database
            .version_retention_period
            .clone()
            .unwrap_or_default(),
        earliest_version_time: database.earliest_version_time,
    };

    lro.service().drop_database(&database.name).await?;
    info!("Dropped database {}", database.name);
    Ok(report)
}
