//! Wire types for the database admin API
//!
//! Field names follow the service's JSON mapping (camelCase, int64 as
//! strings, RFC 3339 timestamps). Everything here is a read-only snapshot:
//! a descriptor reflects the state at the moment it was fetched and has to
//! be fetched again before it can be trusted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

/// Status code the service uses for a cancelled operation
pub const CANCELLED_CODE: i32 = 1;

/// `@type` of create-backup operation metadata
pub const CREATE_BACKUP_METADATA_TYPE: &str =
    "type.googleapis.com/google.spanner.admin.database.v1.CreateBackupMetadata";
/// `@type` of copy-backup operation metadata
pub const COPY_BACKUP_METADATA_TYPE: &str =
    "type.googleapis.com/google.spanner.admin.database.v1.CopyBackupMetadata";
/// `@type` of restore-database operation metadata
pub const RESTORE_DATABASE_METADATA_TYPE: &str =
    "type.googleapis.com/google.spanner.admin.database.v1.RestoreDatabaseMetadata";
/// `@type` of the post-restore optimization operation metadata
pub const OPTIMIZE_RESTORED_DATABASE_METADATA_TYPE: &str =
    "type.googleapis.com/google.spanner.admin.database.v1.OptimizeRestoredDatabaseMetadata";
/// `@type` of create-database operation metadata
pub const CREATE_DATABASE_METADATA_TYPE: &str =
    "type.googleapis.com/google.spanner.admin.database.v1.CreateDatabaseMetadata";

/// Fully-qualified instance a request is scoped to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstancePath {
    pub project: String,
    pub instance: String,
}

impl InstancePath {
    pub fn new(project: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            instance: instance.into(),
        }
    }

    /// `projects/{project}/instances/{instance}`
    pub fn name(&self) -> String {
        format!("projects/{}/instances/{}", self.project, self.instance)
    }

    pub fn backup_name(&self, backup_id: &str) -> String {
        format!("{}/backups/{}", self.name(), backup_id)
    }

    pub fn database_name(&self, database_id: &str) -> String {
        format!("{}/databases/{}", self.name(), database_id)
    }
}

impl fmt::Display for InstancePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Last path segment of a resource name
pub fn short_name(resource: &str) -> &str {
    resource.rsplit('/').next().unwrap_or(resource)
}

/// Check a backup or database id against the service naming rules:
/// 2-60 characters, lowercase letter first, `[a-z0-9_-]` inside, no trailing
/// `_` or `-`.
pub fn validate_resource_id(kind: &str, id: &str) -> Result<()> {
    let len = id.chars().count();
    if !(2..=60).contains(&len) {
        return Err(CoreError::InvalidArgument(format!(
            "{} id '{}' must be between 2 and 60 characters",
            kind, id
        )));
    }

    let mut chars = id.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    let body_ok = id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    let last_ok = id
        .chars()
        .last()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());

    if first_ok && body_ok && last_ok {
        Ok(())
    } else {
        Err(CoreError::InvalidArgument(format!(
            "{} id '{}' must match [a-z][a-z0-9_-]*[a-z0-9]",
            kind, id
        )))
    }
}

/// Lifecycle state of a backup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackupState {
    Creating,
    Ready,
    /// Also covers states this client does not know about
    #[default]
    #[serde(rename = "STATE_UNSPECIFIED", other)]
    Unspecified,
}

impl fmt::Display for BackupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupState::Unspecified => write!(f, "STATE_UNSPECIFIED"),
            BackupState::Creating => write!(f, "CREATING"),
            BackupState::Ready => write!(f, "READY"),
        }
    }
}

/// Encryption details reported on a backup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionInfo {
    #[serde(default)]
    pub encryption_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms_key_version: Option<String>,
}

/// Snapshot of a backup's identity, size and timing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub database: String,
    #[serde(default, with = "int64_string")]
    pub size_bytes: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_expire_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub state: BackupState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub referencing_databases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_info: Option<EncryptionInfo>,
}

impl BackupDescriptor {
    pub fn is_ready(&self) -> bool {
        self.state == BackupState::Ready
    }

    /// KMS key version protecting this backup, if customer managed
    pub fn encryption_key(&self) -> Option<&str> {
        self.encryption_info
            .as_ref()
            .and_then(|info| info.kms_key_version.as_deref())
    }
}

/// How a new resource should be encrypted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EncryptionType {
    #[serde(rename = "GOOGLE_DEFAULT_ENCRYPTION")]
    ProviderDefault,
    CustomerManagedEncryption,
}

impl EncryptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncryptionType::ProviderDefault => "GOOGLE_DEFAULT_ENCRYPTION",
            EncryptionType::CustomerManagedEncryption => "CUSTOMER_MANAGED_ENCRYPTION",
        }
    }
}

/// Encryption settings sent with create, copy and restore requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionConfig {
    pub encryption_type: EncryptionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms_key_name: Option<String>,
}

impl EncryptionConfig {
    /// Customer-managed encryption key (CMEK)
    pub fn customer_managed(kms_key_name: impl Into<String>) -> Self {
        Self {
            encryption_type: EncryptionType::CustomerManagedEncryption,
            kms_key_name: Some(kms_key_name.into()),
        }
    }
}

/// Backup details carried by restore metadata and restore info
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    #[serde(default)]
    pub backup: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source_database: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreInfo {
    #[serde(default)]
    pub source_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_info: Option<BackupInfo>,
}

/// Encryption configuration as reported on a database
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseEncryption {
    #[serde(default)]
    pub kms_key_name: String,
}

/// Snapshot of a database
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_info: Option<RestoreInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_config: Option<DatabaseEncryption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_retention_period: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earliest_version_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationProgress {
    #[serde(default)]
    pub progress_percent: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBackupMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub progress: OperationProgress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyBackupMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub source_backup: String,
    #[serde(default)]
    pub progress: OperationProgress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreDatabaseMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub source_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_info: Option<BackupInfo>,
    #[serde(default)]
    pub progress: OperationProgress,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub optimize_database_operation_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeRestoredDatabaseMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub progress: OperationProgress,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDatabaseMetadata {
    #[serde(default)]
    pub database: String,
}

/// Typed operation metadata, discriminated by its `@type` URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum OperationMetadata {
    #[serde(rename = "type.googleapis.com/google.spanner.admin.database.v1.CreateBackupMetadata")]
    CreateBackup(CreateBackupMetadata),
    #[serde(rename = "type.googleapis.com/google.spanner.admin.database.v1.CopyBackupMetadata")]
    CopyBackup(CopyBackupMetadata),
    #[serde(
        rename = "type.googleapis.com/google.spanner.admin.database.v1.RestoreDatabaseMetadata"
    )]
    RestoreDatabase(RestoreDatabaseMetadata),
    #[serde(
        rename = "type.googleapis.com/google.spanner.admin.database.v1.OptimizeRestoredDatabaseMetadata"
    )]
    OptimizeRestoredDatabase(OptimizeRestoredDatabaseMetadata),
    #[serde(
        rename = "type.googleapis.com/google.spanner.admin.database.v1.CreateDatabaseMetadata"
    )]
    CreateDatabase(CreateDatabaseMetadata),
    #[serde(other)]
    Unknown,
}

impl OperationMetadata {
    /// Completion percentage, for metadata kinds that track progress
    pub fn progress_percent(&self) -> Option<i32> {
        match self {
            OperationMetadata::CreateBackup(m) => Some(m.progress.progress_percent),
            OperationMetadata::CopyBackup(m) => Some(m.progress.progress_percent),
            OperationMetadata::RestoreDatabase(m) => Some(m.progress.progress_percent),
            OperationMetadata::OptimizeRestoredDatabase(m) => Some(m.progress.progress_percent),
            OperationMetadata::CreateDatabase(_) | OperationMetadata::Unknown => None,
        }
    }

    /// Name of the resource the operation acts on
    pub fn resource_name(&self) -> Option<&str> {
        match self {
            OperationMetadata::CreateBackup(m) => Some(&m.name),
            OperationMetadata::CopyBackup(m) => Some(&m.name),
            OperationMetadata::RestoreDatabase(m) => Some(&m.name),
            OperationMetadata::OptimizeRestoredDatabase(m) => Some(&m.name),
            OperationMetadata::CreateDatabase(m) => Some(&m.database),
            OperationMetadata::Unknown => None,
        }
    }
}

/// Error status attached to a finished operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

impl OperationError {
    pub fn is_cancelled(&self) -> bool {
        self.code == CANCELLED_CODE
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code {}: {}", self.code, self.message)
    }
}

/// Long-running operation as returned by submit and poll calls
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<OperationMetadata>,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
}

impl Operation {
    pub fn progress_percent(&self) -> Option<i32> {
        self.metadata.as_ref().and_then(|m| m.progress_percent())
    }
}

/// Create a backup of `database`
#[derive(Debug, Clone, PartialEq)]
pub struct CreateBackupRequest {
    pub backup_id: String,
    /// Full database name
    pub database: String,
    pub expire_time: DateTime<Utc>,
    pub version_time: Option<DateTime<Utc>>,
    pub encryption: Option<EncryptionConfig>,
}

/// Copy an existing backup, possibly across instances
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyBackupRequest {
    pub backup_id: String,
    /// Full name of the backup to copy
    pub source_backup: String,
    pub expire_time: DateTime<Utc>,
    #[serde(rename = "encryptionConfig", skip_serializing_if = "Option::is_none")]
    pub encryption: Option<EncryptionConfig>,
}

/// Restore a backup into a new database
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreDatabaseRequest {
    pub database_id: String,
    /// Full name of the backup to restore from
    pub backup: String,
    #[serde(rename = "encryptionConfig", skip_serializing_if = "Option::is_none")]
    pub encryption: Option<EncryptionConfig>,
}

/// Create a database from DDL
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDatabaseRequest {
    pub create_statement: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_statements: Vec<String>,
}

/// Parameters for one page of a list call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub filter: Option<String>,
    pub page_size: Option<u32>,
    pub page_token: Option<String>,
}

/// One page of list results
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

impl<T> Page<T> {
    /// Build a page, treating an empty token as "no more pages"
    pub fn new(items: Vec<T>, next_page_token: Option<String>) -> Self {
        Self {
            items,
            next_page_token: next_page_token.filter(|t| !t.is_empty()),
        }
    }
}

/// int64 values travel as JSON strings but some servers send numbers
mod int64_string {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Str(String),
            Num(i64),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Str(s) => s.parse().map_err(D::Error::custom),
            Repr::Num(n) => Ok(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_instance_path_names() {
        let instance = InstancePath::new("my-project", "my-instance");
        assert_eq!(instance.name(), "projects/my-project/instances/my-instance");
        assert_eq!(
            instance.backup_name("b1"),
            "projects/my-project/instances/my-instance/backups/b1"
        );
        assert_eq!(
            instance.database_name("db"),
            "projects/my-project/instances/my-instance/databases/db"
        );
        assert_eq!(short_name(&instance.backup_name("b1")), "b1");
    }

    #[test]
    fn test_validate_resource_id() {
        assert!(validate_resource_id("backup", "example_backup").is_ok());
        assert!(validate_resource_id("backup", "b1").is_ok());
        assert!(validate_resource_id("backup", "a").is_err());
        assert!(validate_resource_id("backup", "1backup").is_err());
        assert!(validate_resource_id("backup", "backup-").is_err());
        assert!(validate_resource_id("backup", "Backup").is_err());
        assert!(validate_resource_id("backup", &"b".repeat(61)).is_err());
    }

    #[test]
    fn test_backup_descriptor_from_wire() {
        let backup: BackupDescriptor = serde_json::from_value(json!({
            "name": "projects/p/instances/i/backups/b1",
            "database": "projects/p/instances/i/databases/db",
            "sizeBytes": "4096",
            "createTime": "2024-05-01T10:00:00.123456Z",
            "expireTime": "2024-05-15T10:00:00Z",
            "state": "READY",
            "referencingDatabases": ["projects/p/instances/i/databases/restored"],
            "encryptionInfo": {
                "encryptionType": "CUSTOMER_MANAGED_ENCRYPTION",
                "kmsKeyVersion": "projects/p/locations/l/keyRings/r/cryptoKeys/k/cryptoKeyVersions/1"
            }
        }))
        .unwrap();

        assert_eq!(backup.size_bytes, 4096);
        assert!(backup.is_ready());
        assert_eq!(backup.referencing_databases.len(), 1);
        assert!(backup.encryption_key().unwrap().ends_with("cryptoKeyVersions/1"));
    }

    #[test]
    fn test_backup_size_accepts_number_and_unknown_state() {
        let backup: BackupDescriptor =
            serde_json::from_value(json!({"name": "b", "sizeBytes": 12, "state": "DELETING"}))
                .unwrap();
        assert_eq!(backup.size_bytes, 12);
        assert_eq!(backup.state, BackupState::Unspecified);
    }

    #[test]
    fn test_backup_state_wire_names() {
        for (wire, state) in [
            ("CREATING", BackupState::Creating),
            ("READY", BackupState::Ready),
            ("STATE_UNSPECIFIED", BackupState::Unspecified),
        ] {
            assert_eq!(serde_json::from_value::<BackupState>(json!(wire)).unwrap(), state);
            assert_eq!(serde_json::to_value(state).unwrap(), json!(wire));
        }
        assert_eq!(BackupState::default(), BackupState::Unspecified);
    }

    #[test]
    fn test_operation_metadata_tagging() {
        let op: Operation = serde_json::from_value(json!({
            "name": "projects/p/instances/i/backups/b1/operations/op1",
            "metadata": {
                "@type": CREATE_BACKUP_METADATA_TYPE,
                "name": "projects/p/instances/i/backups/b1",
                "database": "projects/p/instances/i/databases/db",
                "progress": {"progressPercent": 42}
            }
        }))
        .unwrap();

        assert!(!op.done);
        assert_eq!(op.progress_percent(), Some(42));
        match op.metadata.unwrap() {
            OperationMetadata::CreateBackup(m) => {
                assert_eq!(short_name(&m.database), "db");
            }
            other => panic!("unexpected metadata: {:?}", other),
        }
    }

    #[test]
    fn test_metadata_type_constants_match_tags() {
        let cases = [
            CREATE_BACKUP_METADATA_TYPE,
            COPY_BACKUP_METADATA_TYPE,
            RESTORE_DATABASE_METADATA_TYPE,
            OPTIMIZE_RESTORED_DATABASE_METADATA_TYPE,
            CREATE_DATABASE_METADATA_TYPE,
        ];
        for type_url in cases {
            let metadata: OperationMetadata =
                serde_json::from_value(json!({ "@type": type_url })).unwrap();
            assert_ne!(metadata, OperationMetadata::Unknown, "{}", type_url);
        }

        let unknown: OperationMetadata =
            serde_json::from_value(json!({"@type": "type.googleapis.com/Other"})).unwrap();
        assert_eq!(unknown, OperationMetadata::Unknown);
    }

    #[test]
    fn test_copy_request_body_shape() {
        let request = CopyBackupRequest {
            backup_id: "copy".to_string(),
            source_backup: "projects/p/instances/i/backups/b1".to_string(),
            expire_time: "2024-05-15T10:00:00Z".parse().unwrap(),
            encryption: Some(EncryptionConfig::customer_managed("key")),
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["backupId"], "copy");
        assert_eq!(body["sourceBackup"], "projects/p/instances/i/backups/b1");
        assert_eq!(
            body["encryptionConfig"]["encryptionType"],
            "CUSTOMER_MANAGED_ENCRYPTION"
        );
        assert_eq!(body["encryptionConfig"]["kmsKeyName"], "key");
    }

    #[test]
    fn test_page_empty_token_is_last_page() {
        let page = Page::new(vec![1, 2], Some(String::new()));
        assert!(page.next_page_token.is_none());
    }
}
