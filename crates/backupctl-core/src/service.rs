//! Remote service contract
//!
//! Everything backupctl does is a call into the database admin service. The
//! contract is a trait so the facade and workflows receive an explicitly
//! constructed client instead of reaching for a process-wide connection, and
//! so tests can swap in an in-memory service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{
    BackupDescriptor, CopyBackupRequest, CreateBackupRequest, CreateDatabaseRequest,
    DatabaseDescriptor, InstancePath, Operation, Page, PageRequest, RestoreDatabaseRequest,
};

/// Administrative RPCs for the backup and restore lifecycle
#[async_trait]
pub trait AdminService: Send + Sync {
    async fn create_backup(
        &self,
        instance: &InstancePath,
        request: &CreateBackupRequest,
    ) -> Result<Operation>;

    async fn copy_backup(
        &self,
        instance: &InstancePath,
        request: &CopyBackupRequest,
    ) -> Result<Operation>;

    async fn restore_database(
        &self,
        instance: &InstancePath,
        request: &RestoreDatabaseRequest,
    ) -> Result<Operation>;

    async fn create_database(
        &self,
        instance: &InstancePath,
        request: &CreateDatabaseRequest,
    ) -> Result<Operation>;

    /// Fetch the current state of an operation
    async fn get_operation(&self, name: &str) -> Result<Operation>;

    /// Ask the service to cancel an operation. Advisory only.
    async fn cancel_operation(&self, name: &str) -> Result<()>;

    async fn list_backups(
        &self,
        instance: &InstancePath,
        request: &PageRequest,
    ) -> Result<Page<BackupDescriptor>>;

    async fn list_backup_operations(
        &self,
        instance: &InstancePath,
        request: &PageRequest,
    ) -> Result<Page<Operation>>;

    async fn list_database_operations(
        &self,
        instance: &InstancePath,
        request: &PageRequest,
    ) -> Result<Page<Operation>>;

    /// Fails with `NotFound` when the backup does not exist
    async fn get_backup(&self, name: &str) -> Result<BackupDescriptor>;

    async fn update_backup_expire_time(
        &self,
        name: &str,
        expire_time: DateTime<Utc>,
    ) -> Result<BackupDescriptor>;

    async fn delete_backup(&self, name: &str) -> Result<()>;

    async fn get_database(&self, name: &str) -> Result<DatabaseDescriptor>;

    async fn drop_database(&self, name: &str) -> Result<()>;
}
