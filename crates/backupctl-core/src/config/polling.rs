//! Polling intervals and timeouts stored per profile
//!
//! Defaults mirror the waits the backup workflows have always used: 35
//! minutes for backup creation and copy, about 27 minutes for restore, and
//! a 5 minute interval while a cancellation settles.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Polling configuration for long-running operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Seconds between polls of a running operation
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// How long to wait for a backup to be created or copied
    #[serde(default = "default_backup_timeout")]
    pub backup_timeout_secs: u64,

    /// How long to wait for a restore
    #[serde(default = "default_restore_timeout")]
    pub restore_timeout_secs: u64,

    /// How long to wait for a database to be created
    #[serde(default = "default_create_database_timeout")]
    pub create_database_timeout_secs: u64,

    /// Seconds between polls after cancellation was requested
    #[serde(default = "default_cancel_poll_interval")]
    pub cancel_poll_interval_secs: u64,

    /// Upper bound on waiting for a cancelled operation to settle
    #[serde(default = "default_cancel_timeout")]
    pub cancel_timeout_secs: u64,

    /// Seconds between checks for databases still referencing a backup
    #[serde(default = "default_reference_poll_interval")]
    pub reference_poll_interval_secs: u64,

    /// Upper bound on waiting for referencing databases to go away
    #[serde(default = "default_reference_timeout")]
    pub reference_timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            backup_timeout_secs: default_backup_timeout(),
            restore_timeout_secs: default_restore_timeout(),
            create_database_timeout_secs: default_create_database_timeout(),
            cancel_poll_interval_secs: default_cancel_poll_interval(),
            cancel_timeout_secs: default_cancel_timeout(),
            reference_poll_interval_secs: default_reference_poll_interval(),
            reference_timeout_secs: default_reference_timeout(),
        }
    }
}

impl PollingConfig {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub fn poll_interval(&self) -> Duration {
        interval(self.poll_interval_secs)
    }

    pub fn backup_timeout(&self) -> Duration {
        Duration::from_secs(self.backup_timeout_secs)
    }

    pub fn restore_timeout(&self) -> Duration {
        Duration::from_secs(self.restore_timeout_secs)
    }

    pub fn create_database_timeout(&self) -> Duration {
        Duration::from_secs(self.create_database_timeout_secs)
    }

    pub fn cancel_poll_interval(&self) -> Duration {
        interval(self.cancel_poll_interval_secs)
    }

    pub fn cancel_timeout(&self) -> Duration {
        Duration::from_secs(self.cancel_timeout_secs)
    }

    pub fn reference_poll_interval(&self) -> Duration {
        interval(self.reference_poll_interval_secs)
    }

    pub fn reference_timeout(&self) -> Duration {
        Duration::from_secs(self.reference_timeout_secs)
    }
}

/// Intervals never drop below one second
fn interval(secs: u64) -> Duration {
    Duration::from_secs(secs.max(1))
}

// Default value functions for serde
fn default_poll_interval() -> u64 {
    10
}

fn default_backup_timeout() -> u64 {
    2100
}

fn default_restore_timeout() -> u64 {
    1600
}

fn default_create_database_timeout() -> u64 {
    30
}

fn default_cancel_poll_interval() -> u64 {
    300
}

fn default_cancel_timeout() -> u64 {
    6 * 3600
}

fn default_reference_poll_interval() -> u64 {
    30
}

fn default_reference_timeout() -> u64 {
    6 * 3600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_table_keeps_other_defaults() {
        let polling: PollingConfig = toml::from_str("poll_interval_secs = 2").unwrap();
        assert_eq!(polling.poll_interval(), Duration::from_secs(2));
        assert_eq!(polling.backup_timeout(), Duration::from_secs(2100));
        assert_eq!(polling.restore_timeout(), Duration::from_secs(1600));
        assert_eq!(polling.cancel_poll_interval(), Duration::from_secs(300));
        assert!(!polling.is_default());
    }

    #[test]
    fn test_defaults() {
        let polling = PollingConfig::default();
        assert!(polling.is_default());
        assert_eq!(polling.create_database_timeout(), Duration::from_secs(30));
        assert_eq!(polling.reference_poll_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_zero_intervals_are_raised_to_one_second() {
        let polling: PollingConfig = toml::from_str(
            "poll_interval_secs = 0\ncancel_poll_interval_secs = 0\nreference_poll_interval_secs = 0",
        )
        .unwrap();
        assert_eq!(polling.poll_interval(), Duration::from_secs(1));
        assert_eq!(polling.cancel_poll_interval(), Duration::from_secs(1));
        assert_eq!(polling.reference_poll_interval(), Duration::from_secs(1));
    }
}
