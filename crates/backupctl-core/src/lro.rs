//! Long-running operation facade
//!
//! Every administrative request follows the same shape: submit, get an
//! operation handle back, poll until the service reports it done (or give
//! up), then look at the result. [`LroClient`] owns that loop.
//!
//! Polling is an explicit state machine. Each poll produces a snapshot that
//! [`PollState::evaluate`] classifies as `Pending`, `Done`, `Cancelled` or
//! `TimedOut`; only `Pending` leads to another sleep. Time comes from the
//! injected [`Clock`], sleeps use a fixed interval and are clamped to the
//! remaining budget, so `await_completion` returns no later than
//! `timeout + poll_interval`.

use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{CoreError, Result};
use crate::pager::Pager;
use crate::progress::{ProgressCallback, ProgressEvent, emit};
use crate::service::AdminService;
use crate::types::{
    BackupDescriptor, CopyBackupRequest, CreateBackupRequest, CreateDatabaseRequest,
    InstancePath, Operation, OperationError, RestoreDatabaseRequest, validate_resource_id,
};

/// Default time between polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Kind of administrative request behind an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    CreateBackup,
    CopyBackup,
    RestoreDatabase,
    CreateDatabase,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::CreateBackup => write!(f, "create backup"),
            OperationKind::CopyBackup => write!(f, "copy backup"),
            OperationKind::RestoreDatabase => write!(f, "restore database"),
            OperationKind::CreateDatabase => write!(f, "create database"),
        }
    }
}

/// A request that starts a long-running operation
#[derive(Debug, Clone, PartialEq)]
pub enum AdminRequest {
    CreateBackup(CreateBackupRequest),
    CopyBackup(CopyBackupRequest),
    RestoreDatabase(RestoreDatabaseRequest),
    CreateDatabase(CreateDatabaseRequest),
}

impl AdminRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            AdminRequest::CreateBackup(_) => OperationKind::CreateBackup,
            AdminRequest::CopyBackup(_) => OperationKind::CopyBackup,
            AdminRequest::RestoreDatabase(_) => OperationKind::RestoreDatabase,
            AdminRequest::CreateDatabase(_) => OperationKind::CreateDatabase,
        }
    }

    /// Full name of the resource this request creates
    pub fn target(&self, instance: &InstancePath) -> Result<String> {
        match self {
            AdminRequest::CreateBackup(r) => Ok(instance.backup_name(&r.backup_id)),
            AdminRequest::CopyBackup(r) => Ok(instance.backup_name(&r.backup_id)),
            AdminRequest::RestoreDatabase(r) => Ok(instance.database_name(&r.database_id)),
            AdminRequest::CreateDatabase(r) => {
                let id = database_id_from_statement(&r.create_statement).ok_or_else(|| {
                    CoreError::InvalidArgument(format!(
                        "cannot find database name in '{}'",
                        r.create_statement
                    ))
                })?;
                Ok(instance.database_name(id))
            }
        }
    }

    fn validate(&self, clock: &dyn Clock) -> Result<()> {
        let now = clock.utc_now();
        match self {
            AdminRequest::CreateBackup(r) => {
                validate_resource_id("backup", &r.backup_id)?;
                if r.expire_time <= now {
                    return Err(CoreError::InvalidArgument(format!(
                        "expire time {} is not in the future",
                        r.expire_time
                    )));
                }
                if let Some(version_time) = r.version_time
                    && version_time > now
                {
                    return Err(CoreError::InvalidArgument(format!(
                        "version time {} is in the future",
                        version_time
                    )));
                }
                Ok(())
            }
            AdminRequest::CopyBackup(r) => {
                validate_resource_id("backup", &r.backup_id)?;
                if r.source_backup.is_empty() {
                    return Err(CoreError::InvalidArgument(
                        "source backup is required".to_string(),
                    ));
                }
                if r.expire_time <= now {
                    return Err(CoreError::InvalidArgument(format!(
                        "expire time {} is not in the future",
                        r.expire_time
                    )));
                }
                Ok(())
            }
            AdminRequest::RestoreDatabase(r) => validate_resource_id("database", &r.database_id),
            AdminRequest::CreateDatabase(r) => {
                let id = database_id_from_statement(&r.create_statement).unwrap_or_default();
                validate_resource_id("database", id)
            }
        }
    }
}

/// Pull the database id out of `CREATE DATABASE `name``
fn database_id_from_statement(statement: &str) -> Option<&str> {
    let rest = statement.trim();
    let prefix = "CREATE DATABASE";
    let head = rest.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    let id = rest.get(prefix.len()..)?.trim().trim_matches('`');
    (!id.is_empty()).then_some(id)
}

/// Transient reference to a submitted operation
#[derive(Debug, Clone, PartialEq)]
pub struct OperationHandle {
    name: String,
    kind: OperationKind,
    target: String,
}

impl OperationHandle {
    pub fn new(name: impl Into<String>, kind: OperationKind, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            target: target.into(),
        }
    }

    /// Operation name used for polling and cancellation
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Full name of the resource the operation creates
    pub fn target(&self) -> &str {
        &self.target
    }
}

/// Normalized outcome of waiting on an operation
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult<T> {
    Success(T),
    Cancelled,
    Failed(OperationError),
    /// Polling deadline passed; the operation itself was left running
    TimedOut,
}

impl<T> OperationResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, OperationResult::Success(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OperationResult<U> {
        match self {
            OperationResult::Success(value) => OperationResult::Success(f(value)),
            OperationResult::Cancelled => OperationResult::Cancelled,
            OperationResult::Failed(err) => OperationResult::Failed(err),
            OperationResult::TimedOut => OperationResult::TimedOut,
        }
    }

    /// Turn anything but `Success` into an error
    pub fn into_result(self, operation: &str, timeout: Duration) -> Result<T> {
        match self {
            OperationResult::Success(value) => Ok(value),
            OperationResult::Cancelled => {
                Err(CoreError::OperationCancelled(operation.to_string()))
            }
            OperationResult::Failed(err) => Err(CoreError::OperationFailed {
                code: err.code,
                message: err.message,
            }),
            OperationResult::TimedOut => Err(CoreError::Timeout(timeout)),
        }
    }
}

/// Final state after a cancellation request has settled
///
/// Cancellation is advisory, so the operation may still have finished
/// successfully; that case is reported separately so callers can clean up
/// the resource it produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome<T> {
    Cancelled,
    CompletedBeforeCancel(T),
    Failed(OperationError),
}

/// State of one polling step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Pending,
    Done,
    Cancelled,
    TimedOut,
}

impl PollState {
    /// Classify a snapshot taken `elapsed` after polling started.
    ///
    /// A finished operation is never reported as timed out, even when the
    /// snapshot arrives after the deadline.
    pub fn evaluate(operation: &Operation, elapsed: Duration, timeout: Duration) -> Self {
        if operation.done {
            match &operation.error {
                Some(err) if err.is_cancelled() => PollState::Cancelled,
                _ => PollState::Done,
            }
        } else if elapsed >= timeout {
            PollState::TimedOut
        } else {
            PollState::Pending
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Pending)
    }
}

/// Which operation collection to list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationListKind {
    Backup,
    Database,
}

/// Facade over an [`AdminService`] that submits requests and tracks the
/// resulting operations.
pub struct LroClient<S, C = SystemClock> {
    service: S,
    clock: C,
    poll_interval: Duration,
    on_progress: Option<ProgressCallback>,
}

impl<S: AdminService> LroClient<S, SystemClock> {
    pub fn new(service: S) -> Self {
        Self::with_clock(service, SystemClock)
    }
}

impl<S: AdminService, C: Clock> LroClient<S, C> {
    pub fn with_clock(service: S, clock: C) -> Self {
        Self {
            service,
            clock,
            poll_interval: DEFAULT_POLL_INTERVAL,
            on_progress: None,
        }
    }

    /// Fixed time between polls. A zero interval is ignored.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        if interval.is_zero() {
            warn!(
                "Ignoring zero poll interval, keeping {:?}",
                self.poll_interval
            );
        } else {
            self.poll_interval = interval;
        }
        self
    }

    /// The interval to sleep between polls; zero falls back to the client's
    fn pace(&self, interval: Duration) -> Duration {
        if interval.is_zero() {
            self.poll_interval
        } else {
            interval
        }
    }

    /// Receive progress events while operations are tracked
    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Send one administrative request and return a handle to its operation
    pub async fn submit(
        &self,
        instance: &InstancePath,
        request: AdminRequest,
    ) -> Result<OperationHandle> {
        request.validate(&self.clock)?;
        let target = request.target(instance)?;
        let kind = request.kind();
        debug!("Submitting {} for {}", kind, target);

        let operation = match &request {
            AdminRequest::CreateBackup(r) => self.service.create_backup(instance, r).await?,
            AdminRequest::CopyBackup(r) => self.service.copy_backup(instance, r).await?,
            AdminRequest::RestoreDatabase(r) => self.service.restore_database(instance, r).await?,
            AdminRequest::CreateDatabase(r) => self.service.create_database(instance, r).await?,
        };

        if operation.name.is_empty() {
            return Err(CoreError::Decode(
                "service returned an operation without a name".to_string(),
            ));
        }

        info!("Started {} operation {}", kind, operation.name);
        emit(
            &self.on_progress,
            ProgressEvent::Started {
                operation: operation.name.clone(),
            },
        );
        Ok(OperationHandle::new(operation.name, kind, target))
    }

    /// Poll until the operation is done or `timeout` elapses.
    ///
    /// Timing out does not cancel the remote operation.
    pub async fn await_completion(
        &self,
        handle: &OperationHandle,
        timeout: Duration,
    ) -> Result<OperationResult<Operation>> {
        self.await_completion_every(handle, timeout, self.poll_interval)
            .await
    }

    /// [`await_completion`](Self::await_completion) with an explicit interval
    pub async fn await_completion_every(
        &self,
        handle: &OperationHandle,
        timeout: Duration,
        interval: Duration,
    ) -> Result<OperationResult<Operation>> {
        let started = self.clock.now();
        let name = handle.name();
        let interval = self.pace(interval);

        loop {
            let operation = self.service.get_operation(name).await?;
            let elapsed = self.clock.now().saturating_duration_since(started);

            match PollState::evaluate(&operation, elapsed, timeout) {
                PollState::Pending => {
                    debug!(
                        "Operation {} pending ({:?}% after {:?})",
                        name,
                        operation.progress_percent(),
                        elapsed
                    );
                    emit(
                        &self.on_progress,
                        ProgressEvent::Polling {
                            operation: name.to_string(),
                            progress_percent: operation.progress_percent(),
                            elapsed,
                        },
                    );
                    let remaining = timeout.saturating_sub(elapsed);
                    self.clock.sleep(interval.min(remaining)).await;
                }
                PollState::Done => {
                    return Ok(match operation.error {
                        Some(err) => {
                            debug!("Operation {} failed: {}", name, err);
                            emit(
                                &self.on_progress,
                                ProgressEvent::Failed {
                                    operation: name.to_string(),
                                    error: err.to_string(),
                                },
                            );
                            OperationResult::Failed(err)
                        }
                        None => {
                            debug!("Operation {} completed after {:?}", name, elapsed);
                            emit(
                                &self.on_progress,
                                ProgressEvent::Completed {
                                    operation: name.to_string(),
                                },
                            );
                            OperationResult::Success(operation)
                        }
                    });
                }
                PollState::Cancelled => {
                    debug!("Operation {} was cancelled", name);
                    emit(
                        &self.on_progress,
                        ProgressEvent::Cancelled {
                            operation: name.to_string(),
                        },
                    );
                    return Ok(OperationResult::Cancelled);
                }
                PollState::TimedOut => {
                    warn!("Stopped waiting for operation {} after {:?}", name, elapsed);
                    emit(
                        &self.on_progress,
                        ProgressEvent::TimedOut {
                            operation: name.to_string(),
                            waited: elapsed,
                        },
                    );
                    return Ok(OperationResult::TimedOut);
                }
            }
        }
    }

    /// Request cancellation. Best effort: the operation may still complete.
    ///
    /// Cancelling an operation that already finished is a no-op.
    pub async fn cancel(&self, handle: &OperationHandle) -> Result<()> {
        match self.service.cancel_operation(handle.name()).await {
            Ok(()) => {}
            Err(err) if err.is_precondition_failed() => {
                debug!(
                    "Operation {} already finished, nothing to cancel",
                    handle.name()
                );
            }
            Err(err) => return Err(err),
        }
        emit(
            &self.on_progress,
            ProgressEvent::CancelRequested {
                operation: handle.name().to_string(),
            },
        );
        Ok(())
    }

    /// Poll at a fixed interval until the operation reports done.
    ///
    /// Unlike [`await_completion`](Self::await_completion) this returns the
    /// raw final snapshot and treats running past `timeout` as an error.
    pub async fn wait_until_done(
        &self,
        handle: &OperationHandle,
        interval: Duration,
        timeout: Duration,
    ) -> Result<Operation> {
        let started = self.clock.now();
        let interval = self.pace(interval);
        loop {
            let operation = self.service.get_operation(handle.name()).await?;
            if operation.done {
                return Ok(operation);
            }
            let elapsed = self.clock.now().saturating_duration_since(started);
            if elapsed >= timeout {
                return Err(CoreError::Timeout(timeout));
            }
            emit(
                &self.on_progress,
                ProgressEvent::Polling {
                    operation: handle.name().to_string(),
                    progress_percent: operation.progress_percent(),
                    elapsed,
                },
            );
            self.clock
                .sleep(interval.min(timeout.saturating_sub(elapsed)))
                .await;
        }
    }

    /// Request cancellation, then poll until the operation is done.
    ///
    /// Fails with `Timeout` if it is still running after `timeout`.
    pub async fn cancel_and_settle(
        &self,
        handle: &OperationHandle,
        interval: Duration,
        timeout: Duration,
    ) -> Result<CancelOutcome<Operation>> {
        self.cancel(handle).await?;
        let operation = self.wait_until_done(handle, interval, timeout).await?;

        match operation.error.clone() {
            Some(err) if err.is_cancelled() => {
                emit(
                    &self.on_progress,
                    ProgressEvent::Cancelled {
                        operation: handle.name().to_string(),
                    },
                );
                Ok(CancelOutcome::Cancelled)
            }
            Some(err) => Ok(CancelOutcome::Failed(err)),
            None => {
                warn!(
                    "Operation {} completed before the cancellation took effect",
                    handle.name()
                );
                Ok(CancelOutcome::CompletedBeforeCancel(operation))
            }
        }
    }

    /// Lazily list backup or database operations matching `filter`
    pub fn list_operations(
        &self,
        instance: &InstancePath,
        kind: OperationListKind,
        filter: Option<String>,
    ) -> Pager<'_, Operation> {
        let instance = instance.clone();
        Pager::new(move |request| {
            let instance = instance.clone();
            Box::pin(async move {
                match kind {
                    OperationListKind::Backup => {
                        self.service
                            .list_backup_operations(&instance, &request)
                            .await
                    }
                    OperationListKind::Database => {
                        self.service
                            .list_database_operations(&instance, &request)
                            .await
                    }
                }
            })
        })
        .filter_opt(filter)
    }

    /// Lazily list backups matching `filter`
    pub fn list_backups(
        &self,
        instance: &InstancePath,
        filter: Option<String>,
    ) -> Pager<'_, BackupDescriptor> {
        let instance = instance.clone();
        Pager::new(move |request| {
            let instance = instance.clone();
            Box::pin(async move { self.service.list_backups(&instance, &request).await })
        })
        .filter_opt(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::testing::StubAdminService;
    use crate::types::CANCELLED_CODE;
    use chrono::{DateTime, Utc};
    use std::sync::{Arc, Mutex};

    fn origin() -> DateTime<Utc> {
        "2024-05-01T12:00:00Z".parse().unwrap()
    }

    fn instance() -> InstancePath {
        InstancePath::new("test-project", "test-instance")
    }

    fn create_request(backup_id: &str) -> AdminRequest {
        AdminRequest::CreateBackup(CreateBackupRequest {
            backup_id: backup_id.to_string(),
            database: instance().database_name("example_db"),
            expire_time: origin() + chrono::Duration::days(14),
            version_time: None,
            encryption: None,
        })
    }

    fn client(stub: StubAdminService) -> (LroClient<StubAdminService, FakeClock>, FakeClock) {
        let clock = FakeClock::new(origin());
        let client = LroClient::with_clock(stub, clock.clone()).poll_interval(Duration::from_secs(10));
        (client, clock)
    }

    #[test]
    fn test_poll_state_transitions() {
        let timeout = Duration::from_secs(60);
        let mut op = Operation {
            name: "op".to_string(),
            ..Default::default()
        };

        assert_eq!(
            PollState::evaluate(&op, Duration::from_secs(5), timeout),
            PollState::Pending
        );
        assert_eq!(
            PollState::evaluate(&op, timeout, timeout),
            PollState::TimedOut
        );

        op.done = true;
        assert_eq!(
            PollState::evaluate(&op, Duration::from_secs(500), timeout),
            PollState::Done
        );

        op.error = Some(OperationError {
            code: CANCELLED_CODE,
            message: "CANCELLED".to_string(),
        });
        assert_eq!(
            PollState::evaluate(&op, Duration::ZERO, timeout),
            PollState::Cancelled
        );

        op.error = Some(OperationError {
            code: 13,
            message: "internal".to_string(),
        });
        assert_eq!(
            PollState::evaluate(&op, Duration::ZERO, timeout),
            PollState::Done
        );
        assert!(PollState::Done.is_terminal());
        assert!(!PollState::Pending.is_terminal());
    }

    #[test]
    fn test_database_id_from_statement() {
        assert_eq!(
            database_id_from_statement("CREATE DATABASE `example_db`"),
            Some("example_db")
        );
        assert_eq!(
            database_id_from_statement("create database example_db"),
            Some("example_db")
        );
        assert_eq!(database_id_from_statement("CREATE TABLE t"), None);
        assert_eq!(database_id_from_statement("CREATE DATABAS\u{20ac}x"), None);
        assert_eq!(database_id_from_statement("\u{e9}"), None);
    }

    #[tokio::test]
    async fn test_submit_rejects_non_ascii_create_statement() {
        let stub = StubAdminService::new(origin());
        let (client, _clock) = client(stub);

        let request = AdminRequest::CreateDatabase(CreateDatabaseRequest {
            create_statement: "CREATE DATABAS\u{20ac}x".to_string(),
            extra_statements: Vec::new(),
        });
        let err = client.submit(&instance(), request).await.unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(client.service().submitted(), 0);
    }

    #[tokio::test]
    async fn test_zero_interval_falls_back_to_client_interval() {
        let stub = StubAdminService::new(origin()).complete_after(3);
        stub.insert_database(&instance().database_name("example_db"));
        let clock = FakeClock::new(origin());
        let client = LroClient::with_clock(stub, clock.clone()).poll_interval(Duration::ZERO);

        let handle = client
            .submit(&instance(), create_request("b1"))
            .await
            .unwrap();
        let result = client
            .await_completion_every(&handle, Duration::from_secs(2100), Duration::ZERO)
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(clock.sleeps(), vec![DEFAULT_POLL_INTERVAL; 2]);
    }

    #[tokio::test]
    async fn test_submit_and_await_success() {
        let stub = StubAdminService::new(origin()).complete_after(3);
        stub.insert_database(&instance().database_name("example_db"));
        let (client, clock) = client(stub);

        let handle = client
            .submit(&instance(), create_request("b1"))
            .await
            .unwrap();
        assert_eq!(handle.kind(), OperationKind::CreateBackup);
        assert_eq!(handle.target(), instance().backup_name("b1"));

        let result = client
            .await_completion(&handle, Duration::from_secs(2100))
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(10); 2]);
    }

    #[tokio::test]
    async fn test_await_times_out_within_budget_and_leaves_operation_running() {
        let stub = StubAdminService::new(origin()).never_complete();
        stub.insert_database(&instance().database_name("example_db"));
        let (client, clock) = client(stub);

        let handle = client
            .submit(&instance(), create_request("b1"))
            .await
            .unwrap();
        let timeout = Duration::from_secs(25);
        let result = client.await_completion(&handle, timeout).await.unwrap();

        assert_eq!(result, OperationResult::TimedOut);
        assert!(clock.elapsed() <= timeout + Duration::from_secs(10));
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_secs(10),
                Duration::from_secs(10),
                Duration::from_secs(5)
            ]
        );
        assert_eq!(client.service().cancel_count(handle.name()), 0);
        let op = client.service().get_operation(handle.name()).await.unwrap();
        assert!(!op.done);
    }

    #[tokio::test]
    async fn test_timeout_bound_holds_for_many_budgets() {
        for secs in [0u64, 1, 9, 10, 11, 99, 2100] {
            let stub = StubAdminService::new(origin()).never_complete();
            stub.insert_database(&instance().database_name("example_db"));
            let (client, clock) = client(stub);
            let handle = client
                .submit(&instance(), create_request("b1"))
                .await
                .unwrap();

            let timeout = Duration::from_secs(secs);
            let result = client.await_completion(&handle, timeout).await.unwrap();

            assert_eq!(result, OperationResult::TimedOut);
            assert!(
                clock.elapsed() <= timeout + Duration::from_secs(10),
                "timeout {:?} waited {:?}",
                timeout,
                clock.elapsed()
            );
        }
    }

    #[tokio::test]
    async fn test_failed_operation_reported() {
        let stub = StubAdminService::new(origin()).fail_with(9, "database is being modified");
        stub.insert_database(&instance().database_name("example_db"));
        let (client, _clock) = client(stub);

        let handle = client
            .submit(&instance(), create_request("b1"))
            .await
            .unwrap();
        let result = client
            .await_completion(&handle, Duration::from_secs(60))
            .await
            .unwrap();

        match result {
            OperationResult::Failed(err) => assert_eq!(err.code, 9),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let stub = StubAdminService::new(origin()).complete_after(2);
        stub.insert_database(&instance().database_name("example_db"));
        let (client, _clock) = client(stub);

        let handle = client
            .submit(&instance(), create_request("b1"))
            .await
            .unwrap();
        let outcome = client
            .cancel_and_settle(&handle, Duration::from_secs(300), Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(outcome, CancelOutcome::Cancelled);

        let before = client.service().get_operation(handle.name()).await.unwrap();
        client.cancel(&handle).await.unwrap();
        let after = client.service().get_operation(handle.name()).await.unwrap();

        assert_eq!(before, after);
        assert!(
            client
                .service()
                .get_backup(&instance().backup_name("b1"))
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn test_cancel_race_reports_completion() {
        let stub = StubAdminService::new(origin())
            .complete_after(2)
            .ignore_cancellation();
        stub.insert_database(&instance().database_name("example_db"));
        let (client, clock) = client(stub);

        let handle = client
            .submit(&instance(), create_request("b1"))
            .await
            .unwrap();
        let outcome = client
            .cancel_and_settle(&handle, Duration::from_secs(300), Duration::from_secs(3600))
            .await
            .unwrap();

        assert!(matches!(outcome, CancelOutcome::CompletedBeforeCancel(_)));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(300)]);
        let backup = client
            .service()
            .get_backup(&instance().backup_name("b1"))
            .await
            .unwrap();
        assert!(backup.is_ready());
    }

    #[tokio::test]
    async fn test_progress_events_in_order() {
        let stub = StubAdminService::new(origin()).complete_after(2);
        stub.insert_database(&instance().database_name("example_db"));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let (client, _clock) = client(stub);
        let client = client.on_progress(Box::new(move |event| {
            sink.lock().unwrap().push(event);
        }));

        let handle = client
            .submit(&instance(), create_request("b1"))
            .await
            .unwrap();
        client
            .await_completion(&handle, Duration::from_secs(60))
            .await
            .unwrap();

        let events = events.lock().unwrap();
        assert!(matches!(events[0], ProgressEvent::Started { .. }));
        assert!(matches!(events[1], ProgressEvent::Polling { .. }));
        assert!(matches!(events.last(), Some(ProgressEvent::Completed { .. })));
    }

    #[tokio::test]
    async fn test_submit_rejects_invalid_requests_locally() {
        let stub = StubAdminService::new(origin());
        let (client, _clock) = client(stub);

        let err = client
            .submit(&instance(), create_request("Bad Id"))
            .await
            .unwrap_err();
        assert!(err.is_invalid_argument());

        let expired = AdminRequest::CreateBackup(CreateBackupRequest {
            backup_id: "b1".to_string(),
            database: instance().database_name("example_db"),
            expire_time: origin() - chrono::Duration::days(1),
            version_time: None,
            encryption: None,
        });
        let err = client.submit(&instance(), expired).await.unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(client.service().submitted(), 0);
    }

    #[tokio::test]
    async fn test_into_result_mapping() {
        let timeout = Duration::from_secs(5);
        assert_eq!(
            OperationResult::Success(1).into_result("op", timeout).unwrap(),
            1
        );
        assert!(
            OperationResult::<i32>::TimedOut
                .into_result("op", timeout)
                .unwrap_err()
                .is_timeout()
        );
        assert!(matches!(
            OperationResult::<i32>::Cancelled.into_result("op", timeout),
            Err(CoreError::OperationCancelled(_))
        ));
    }
}
