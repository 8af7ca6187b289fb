//! # backupctl-core
//!
//! Library behind the `backupctl` CLI: create, copy, restore, list, update
//! and delete database backups through the admin API, tracking each
//! long-running operation until it settles.
//!
//! ## Layers
//!
//! - [`AdminService`] - the remote contract, one method per RPC.
//!   [`RestAdminClient`] implements it over HTTPS/JSON; tests use an
//!   in-memory stub.
//! - [`LroClient`] - submits requests and polls the returned operations as
//!   an explicit state machine ([`PollState`]) driven by a [`Clock`].
//! - [`Pager`] - lazy, restartable listing across pages.
//! - [`workflows`] - the end-to-end backup tasks built on the layers above.
//! - [`config`] - profiles, credentials and polling settings.
//!
//! ## Example
//!
//! ```rust,no_run
//! use backupctl_core::{InstancePath, LroClient, RestAdminClient, workflows};
//! use backupctl_core::config::PollingConfig;
//!
//! # async fn run() -> backupctl_core::Result<()> {
//! let service = RestAdminClient::new("https://spanner.googleapis.com", Some("token".into()))?;
//! let lro = LroClient::new(service);
//! let instance = InstancePath::new("my-project", "my-instance");
//!
//! let report = workflows::create_backup(
//!     &lro,
//!     &instance,
//!     "example_db",
//!     "example_backup",
//!     None,
//!     None,
//!     &PollingConfig::default(),
//! )
//! .await?;
//! println!("{}", report);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod filters;
pub mod lro;
pub mod pager;
pub mod progress;
pub mod rest;
pub mod service;
pub mod types;
pub mod workflows;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

// Re-export commonly used types
pub use clock::{Clock, SystemClock};
pub use error::{CoreError, Result};
pub use lro::{
    AdminRequest, CancelOutcome, LroClient, OperationHandle, OperationKind, OperationListKind,
    OperationResult, PollState,
};
pub use pager::Pager;
pub use progress::{ProgressCallback, ProgressEvent};
pub use rest::{DEFAULT_ENDPOINT, RestAdminClient};
pub use service::AdminService;
pub use types::{
    BackupDescriptor, BackupState, DatabaseDescriptor, EncryptionConfig, InstancePath, Operation,
    OperationError, OperationMetadata,
};

#[cfg(any(test, feature = "test-support"))]
pub use clock::FakeClock;
