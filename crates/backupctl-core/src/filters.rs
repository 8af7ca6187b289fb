//! Builders for list filter expressions
//!
//! Filters are opaque to backupctl: these helpers only assemble the strings
//! the service understands, nothing here parses or validates them.

use chrono::{DateTime, Utc};

use crate::types::{
    COPY_BACKUP_METADATA_TYPE, CREATE_BACKUP_METADATA_TYPE,
    OPTIMIZE_RESTORED_DATABASE_METADATA_TYPE,
};

/// Timestamp as used inside filters, e.g. `2024-05-01T12:00:00Z`
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Backups whose name contains `backup_id`
pub fn name_contains(backup_id: &str) -> String {
    format!("name:{}", backup_id)
}

/// Backups whose source database name contains `database_id`
pub fn database_contains(database_id: &str) -> String {
    format!("database:{}", database_id)
}

pub fn expire_time_before(time: DateTime<Utc>) -> String {
    format!("expire_time < \"{}\"", format_timestamp(time))
}

pub fn size_bytes_greater_than(bytes: i64) -> String {
    format!("size_bytes > {}", bytes)
}

/// Ready backups created at or after `time`
pub fn ready_created_since(time: DateTime<Utc>) -> String {
    format!(
        "create_time >= \"{}\" AND state:READY",
        format_timestamp(time)
    )
}

/// Create-backup operations for databases whose name contains `database_id`
pub fn create_backup_operations(database_id: &str) -> String {
    format!(
        "(metadata.@type:{}) AND (metadata.database:{})",
        CREATE_BACKUP_METADATA_TYPE, database_id
    )
}

/// Copy-backup operations whose source backup name contains `backup_id`
pub fn copy_backup_operations(backup_id: &str) -> String {
    format!(
        "(metadata.@type:{}) AND (metadata.source_backup:{})",
        COPY_BACKUP_METADATA_TYPE, backup_id
    )
}

/// Optimizations that run after a restore
pub fn optimize_restored_database_operations() -> String {
    format!("(metadata.@type:{})", OPTIMIZE_RESTORED_DATABASE_METADATA_TYPE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_is_zero_padded_utc() {
        let time: DateTime<Utc> = "2024-05-01T07:08:09.123456Z".parse().unwrap();
        assert_eq!(format_timestamp(time), "2024-05-01T07:08:09Z");
    }

    #[test]
    fn test_backup_filters() {
        let time: DateTime<Utc> = "2024-05-31T12:00:00Z".parse().unwrap();
        assert_eq!(name_contains("example_backup"), "name:example_backup");
        assert_eq!(database_contains("example_db"), "database:example_db");
        assert_eq!(
            expire_time_before(time),
            "expire_time < \"2024-05-31T12:00:00Z\""
        );
        assert_eq!(size_bytes_greater_than(100), "size_bytes > 100");
        assert_eq!(
            ready_created_since(time),
            "create_time >= \"2024-05-31T12:00:00Z\" AND state:READY"
        );
    }

    #[test]
    fn test_operation_filters() {
        assert_eq!(
            create_backup_operations("example_db"),
            "(metadata.@type:type.googleapis.com/google.spanner.admin.database.v1.CreateBackupMetadata) AND (metadata.database:example_db)"
        );
        assert!(copy_backup_operations("b1").ends_with("AND (metadata.source_backup:b1)"));
        assert!(optimize_restored_database_operations().contains("OptimizeRestoredDatabaseMetadata"));
    }
}
