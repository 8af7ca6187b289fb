//! In-memory [`AdminService`] for tests
//!
//! `StubAdminService` keeps backups, databases and operations in memory and
//! lets a test script how operations progress: complete after N polls,
//! never complete, fail, or ignore cancellation. List calls honour a small
//! subset of the service filter language (`field:substring`, comparisons on
//! sizes and timestamps, terms joined by `AND`) and page with index tokens.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use crate::error::{CoreError, Result};
use crate::service::AdminService;
use crate::types::{
    BackupDescriptor, BackupInfo, BackupState, CANCELLED_CODE, CopyBackupMetadata,
    CopyBackupRequest, CreateBackupMetadata, CreateBackupRequest, CreateDatabaseMetadata,
    CreateDatabaseRequest, DatabaseDescriptor, DatabaseEncryption, EncryptionConfig,
    EncryptionInfo, InstancePath, Operation, OperationError, OperationMetadata,
    OperationProgress, OptimizeRestoredDatabaseMetadata, Page, PageRequest, RestoreDatabaseMetadata,
    RestoreDatabaseRequest, RestoreInfo, short_name,
};

/// Size given to backups the stub creates
pub const STUB_BACKUP_SIZE: i64 = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    AfterPolls(u32),
    Never,
}

/// What happens to the stub's resources when an operation ends
#[derive(Debug, Clone)]
enum Effect {
    Backup {
        name: String,
        encryption: Option<EncryptionConfig>,
    },
    Restore {
        database: String,
        backup: String,
    },
    CreateDatabase {
        database: String,
    },
    Nothing,
}

#[derive(Debug)]
struct StubOperation {
    operation: Operation,
    polls: u32,
    effect: Effect,
}

#[derive(Debug, Default)]
struct StubState {
    backups: BTreeMap<String, BackupDescriptor>,
    databases: BTreeMap<String, DatabaseDescriptor>,
    operations: Vec<StubOperation>,
    cancels: HashMap<String, u32>,
    backup_reads: HashMap<String, u32>,
    submitted: usize,
    next_id: u64,
}

/// Scriptable in-memory admin service
#[derive(Debug)]
pub struct StubAdminService {
    now: DateTime<Utc>,
    completion: Completion,
    failure: Option<OperationError>,
    ignore_cancel: bool,
    references_clear_after: Option<u32>,
    state: Mutex<StubState>,
}

impl StubAdminService {
    /// Stub whose notion of "now" is `now`; operations finish on first poll
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            completion: Completion::AfterPolls(1),
            failure: None,
            ignore_cancel: false,
            references_clear_after: None,
            state: Mutex::new(StubState::default()),
        }
    }

    /// Operations report done on the `polls`-th `get_operation` call
    pub fn complete_after(mut self, polls: u32) -> Self {
        self.completion = Completion::AfterPolls(polls.max(1));
        self
    }

    /// Operations stay pending until cancelled
    pub fn never_complete(mut self) -> Self {
        self.completion = Completion::Never;
        self
    }

    /// Operations finish with this error instead of succeeding
    pub fn fail_with(mut self, code: i32, message: &str) -> Self {
        self.failure = Some(OperationError {
            code,
            message: message.to_string(),
        });
        self
    }

    /// Accept cancel requests but let operations run to completion
    pub fn ignore_cancellation(mut self) -> Self {
        self.ignore_cancel = true;
        self
    }

    /// Referencing databases disappear after `reads` `get_backup` calls
    pub fn references_clear_after(mut self, reads: u32) -> Self {
        self.references_clear_after = Some(reads);
        self
    }

    fn state(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert_database(&self, name: &str) {
        self.state().databases.insert(
            name.to_string(),
            DatabaseDescriptor {
                name: name.to_string(),
                state: "READY".to_string(),
                create_time: Some(self.now),
                ..Default::default()
            },
        );
    }

    pub fn insert_backup(&self, backup: BackupDescriptor) {
        self.state().backups.insert(backup.name.clone(), backup);
    }

    /// Insert a finished operation as-is
    pub fn insert_operation(&self, operation: Operation) {
        self.state().operations.push(StubOperation {
            operation,
            polls: 0,
            effect: Effect::Nothing,
        });
    }

    pub fn backup(&self, name: &str) -> Option<BackupDescriptor> {
        self.state().backups.get(name).cloned()
    }

    pub fn database(&self, name: &str) -> Option<DatabaseDescriptor> {
        self.state().databases.get(name).cloned()
    }

    /// Number of requests that started an operation
    pub fn submitted(&self) -> usize {
        self.state().submitted
    }

    /// Number of cancel calls made for `operation`
    pub fn cancel_count(&self, operation: &str) -> u32 {
        self.state().cancels.get(operation).copied().unwrap_or(0)
    }

    fn start(
        &self,
        state: &mut StubState,
        resource: &str,
        metadata: OperationMetadata,
        effect: Effect,
    ) -> Operation {
        state.next_id += 1;
        state.submitted += 1;
        let operation = Operation {
            name: format!("{}/operations/op-{}", resource, state.next_id),
            metadata: Some(metadata),
            ..Default::default()
        };
        state.operations.push(StubOperation {
            operation: operation.clone(),
            polls: 0,
            effect,
        });
        operation
    }

    fn finish(&self, state: &mut StubState, index: usize) {
        let effect = state.operations[index].effect.clone();

        if let Some(err) = &self.failure {
            remove_pending(state, &effect);
            let op = &mut state.operations[index].operation;
            op.done = true;
            op.error = Some(err.clone());
            return;
        }

        let response = match effect {
            Effect::Backup { name, encryption } => {
                let backup = state.backups.get_mut(&name).map(|backup| {
                    backup.state = BackupState::Ready;
                    backup.size_bytes = STUB_BACKUP_SIZE;
                    backup.create_time = Some(self.now);
                    backup.max_expire_time = Some(self.now + ChronoDuration::days(366));
                    if backup.version_time.is_none() {
                        backup.version_time = Some(self.now);
                    }
                    backup.encryption_info = Some(match encryption {
                        Some(config) => EncryptionInfo {
                            encryption_type: config.encryption_type.as_str().to_string(),
                            kms_key_version: config
                                .kms_key_name
                                .map(|key| format!("{}/cryptoKeyVersions/1", key)),
                        },
                        None => EncryptionInfo {
                            encryption_type: "GOOGLE_DEFAULT_ENCRYPTION".to_string(),
                            kms_key_version: None,
                        },
                    });
                    backup.clone()
                });
                backup.and_then(|b| serde_json::to_value(b).ok())
            }
            Effect::Restore { database, backup } => {
                if let Some(b) = state.backups.get_mut(&backup) {
                    b.referencing_databases.push(database.clone());
                }
                let db = state.databases.get_mut(&database).map(|db| {
                    db.state = "READY_OPTIMIZING".to_string();
                    db.clone()
                });
                state.next_id += 1;
                let optimize = Operation {
                    name: format!("{}/operations/optimize-{}", database, state.next_id),
                    metadata: Some(OperationMetadata::OptimizeRestoredDatabase(
                        OptimizeRestoredDatabaseMetadata {
                            name: database.clone(),
                            progress: OperationProgress {
                                progress_percent: 50,
                                start_time: Some(self.now),
                                end_time: None,
                            },
                        },
                    )),
                    ..Default::default()
                };
                if let Some(OperationMetadata::RestoreDatabase(m)) =
                    &mut state.operations[index].operation.metadata
                {
                    m.optimize_database_operation_name = optimize.name.clone();
                }
                state.operations.push(StubOperation {
                    operation: optimize,
                    polls: 0,
                    effect: Effect::Nothing,
                });
                db.and_then(|d| serde_json::to_value(d).ok())
            }
            Effect::CreateDatabase { database } => {
                let db = state.databases.get_mut(&database).map(|db| {
                    db.state = "READY".to_string();
                    db.clone()
                });
                db.and_then(|d| serde_json::to_value(d).ok())
            }
            Effect::Nothing => None,
        };

        let op = &mut state.operations[index].operation;
        op.done = true;
        op.response = response;
        set_progress(op, 100);
    }

    fn check_expire_time(&self, expire_time: DateTime<Utc>) -> Result<()> {
        if expire_time <= self.now {
            return Err(CoreError::InvalidArgument(
                "expire time must be in the future".to_string(),
            ));
        }
        if expire_time > self.now + ChronoDuration::days(366) {
            return Err(CoreError::InvalidArgument(
                "expire time must be within 366 days".to_string(),
            ));
        }
        Ok(())
    }
}

fn remove_pending(state: &mut StubState, effect: &Effect) {
    match effect {
        Effect::Backup { name, .. } => {
            state.backups.remove(name);
        }
        Effect::Restore { database, .. } | Effect::CreateDatabase { database } => {
            state.databases.remove(database);
        }
        Effect::Nothing => {}
    }
}

fn set_progress(operation: &mut Operation, percent: i32) {
    let progress = match &mut operation.metadata {
        Some(OperationMetadata::CreateBackup(m)) => &mut m.progress,
        Some(OperationMetadata::CopyBackup(m)) => &mut m.progress,
        Some(OperationMetadata::RestoreDatabase(m)) => &mut m.progress,
        Some(OperationMetadata::OptimizeRestoredDatabase(m)) => &mut m.progress,
        _ => return,
    };
    progress.progress_percent = percent;
}

fn in_instance(name: &str, instance: &InstancePath) -> bool {
    name.starts_with(&format!("{}/", instance.name()))
}

fn retention_period(statements: &[String]) -> Option<String> {
    statements.iter().find_map(|statement| {
        let (_, rest) = statement.split_once("version_retention_period")?;
        let start = rest.find('\'')? + 1;
        let len = rest[start..].find('\'')?;
        Some(rest[start..start + len].to_string())
    })
}

fn page_of<T: Clone>(items: Vec<T>, request: &PageRequest) -> Result<Page<T>> {
    let start = match request.page_token.as_deref() {
        Some(token) => token
            .parse::<usize>()
            .map_err(|_| CoreError::InvalidArgument(format!("bad page token '{}'", token)))?,
        None => 0,
    };
    let size = request
        .page_size
        .filter(|&s| s > 0)
        .map(|s| s as usize)
        .unwrap_or(items.len().max(1));
    let end = (start + size).min(items.len());
    let next = (end < items.len()).then(|| end.to_string());
    let slice = items.get(start..end).map(<[T]>::to_vec).unwrap_or_default();
    Ok(Page::new(slice, next))
}

/// Value of a field as seen by the filter matcher
enum Field {
    Text(String),
    Int(i64),
    Time(Option<DateTime<Utc>>),
}

trait Filterable {
    fn field(&self, key: &str) -> Option<Field>;
}

impl Filterable for BackupDescriptor {
    fn field(&self, key: &str) -> Option<Field> {
        Some(match key {
            "name" => Field::Text(self.name.clone()),
            "database" => Field::Text(self.database.clone()),
            "state" => Field::Text(self.state.to_string()),
            "size_bytes" => Field::Int(self.size_bytes),
            "create_time" => Field::Time(self.create_time),
            "expire_time" => Field::Time(self.expire_time),
            "version_time" => Field::Time(self.version_time),
            _ => return None,
        })
    }
}

impl Filterable for Operation {
    fn field(&self, key: &str) -> Option<Field> {
        let metadata = self.metadata.as_ref();
        Some(match key {
            "name" => Field::Text(self.name.clone()),
            "done" => Field::Text(self.done.to_string()),
            "metadata.@type" => Field::Text(
                match metadata {
                    Some(m) => serde_json::to_value(m)
                        .ok()
                        .and_then(|v| v.get("@type").and_then(|t| t.as_str()).map(String::from))
                        .unwrap_or_default(),
                    None => String::new(),
                },
            ),
            "metadata.name" => {
                Field::Text(metadata.and_then(|m| m.resource_name()).unwrap_or("").to_string())
            }
            "metadata.database" => Field::Text(match metadata {
                Some(OperationMetadata::CreateBackup(m)) => m.database.clone(),
                _ => String::new(),
            }),
            "metadata.source_backup" => Field::Text(match metadata {
                Some(OperationMetadata::CopyBackup(m)) => m.source_backup.clone(),
                _ => String::new(),
            }),
            _ => return None,
        })
    }
}

fn matches_filter<T: Filterable>(item: &T, filter: Option<&str>) -> Result<bool> {
    let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) else {
        return Ok(true);
    };

    for term in filter.split(" AND ") {
        let term = term.trim().trim_start_matches('(').trim_end_matches(')').trim();
        if !matches_term(item, term)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_term<T: Filterable>(item: &T, term: &str) -> Result<bool> {
    let unsupported = || CoreError::InvalidArgument(format!("unsupported filter term '{}'", term));

    let comparison = [">=", "<=", "!=", ">", "<", "="]
        .iter()
        .find_map(|op| term.find(op).map(|i| (i, *op)));

    let (key, op, value) = match comparison {
        Some((i, op)) => (&term[..i], op, &term[i + op.len()..]),
        None => {
            let (key, value) = term.split_once(':').ok_or_else(unsupported)?;
            (key, ":", value)
        }
    };
    let key = key.trim();
    let value = value.trim().trim_matches('"');
    let field = item.field(key).ok_or_else(unsupported)?;

    let ordering = match field {
        Field::Text(text) => {
            return match op {
                ":" => Ok(text.contains(value)),
                "=" => Ok(text == value),
                "!=" => Ok(text != value),
                _ => Err(unsupported()),
            };
        }
        Field::Int(n) => {
            let rhs: i64 = value.parse().map_err(|_| unsupported())?;
            n.cmp(&rhs)
        }
        Field::Time(None) => return Ok(false),
        Field::Time(Some(t)) => {
            let rhs: DateTime<Utc> = value.parse().map_err(|_| unsupported())?;
            t.cmp(&rhs)
        }
    };

    use std::cmp::Ordering::*;
    Ok(match op {
        ">=" => ordering != Less,
        "<=" => ordering != Greater,
        "!=" => ordering != Equal,
        ">" => ordering == Greater,
        "<" => ordering == Less,
        "=" | ":" => ordering == Equal,
        _ => return Err(unsupported()),
    })
}

#[async_trait]
impl AdminService for StubAdminService {
    async fn create_backup(
        &self,
        instance: &InstancePath,
        request: &CreateBackupRequest,
    ) -> Result<Operation> {
        self.check_expire_time(request.expire_time)?;
        let mut state = self.state();
        if !state.databases.contains_key(&request.database) {
            return Err(CoreError::NotFound(request.database.clone()));
        }
        let name = instance.backup_name(&request.backup_id);
        if state.backups.contains_key(&name) {
            return Err(CoreError::PreconditionFailed(format!(
                "backup {} already exists",
                name
            )));
        }

        state.backups.insert(
            name.clone(),
            BackupDescriptor {
                name: name.clone(),
                database: request.database.clone(),
                expire_time: Some(request.expire_time),
                version_time: request.version_time,
                state: BackupState::Creating,
                ..Default::default()
            },
        );
        let metadata = OperationMetadata::CreateBackup(CreateBackupMetadata {
            name: name.clone(),
            database: request.database.clone(),
            progress: OperationProgress {
                start_time: Some(self.now),
                ..Default::default()
            },
            cancel_time: None,
        });
        let effect = Effect::Backup {
            name: name.clone(),
            encryption: request.encryption.clone(),
        };
        Ok(self.start(&mut state, &name, metadata, effect))
    }

    async fn copy_backup(
        &self,
        instance: &InstancePath,
        request: &CopyBackupRequest,
    ) -> Result<Operation> {
        self.check_expire_time(request.expire_time)?;
        let mut state = self.state();
        let source = state
            .backups
            .get(&request.source_backup)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(request.source_backup.clone()))?;
        if !source.is_ready() {
            return Err(CoreError::PreconditionFailed(format!(
                "source backup {} is not ready",
                source.name
            )));
        }
        let name = instance.backup_name(&request.backup_id);
        if state.backups.contains_key(&name) {
            return Err(CoreError::PreconditionFailed(format!(
                "backup {} already exists",
                name
            )));
        }

        state.backups.insert(
            name.clone(),
            BackupDescriptor {
                name: name.clone(),
                database: source.database.clone(),
                expire_time: Some(request.expire_time),
                version_time: source.version_time,
                state: BackupState::Creating,
                ..Default::default()
            },
        );
        let metadata = OperationMetadata::CopyBackup(CopyBackupMetadata {
            name: name.clone(),
            source_backup: request.source_backup.clone(),
            progress: OperationProgress {
                start_time: Some(self.now),
                ..Default::default()
            },
            cancel_time: None,
        });
        let effect = Effect::Backup {
            name: name.clone(),
            encryption: request.encryption.clone(),
        };
        Ok(self.start(&mut state, &name, metadata, effect))
    }

    async fn restore_database(
        &self,
        instance: &InstancePath,
        request: &RestoreDatabaseRequest,
    ) -> Result<Operation> {
        let mut state = self.state();
        let backup = state
            .backups
            .get(&request.backup)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(request.backup.clone()))?;
        let name = instance.database_name(&request.database_id);
        if state.databases.contains_key(&name) {
            return Err(CoreError::PreconditionFailed(format!(
                "database {} already exists",
                name
            )));
        }

        let backup_info = BackupInfo {
            backup: backup.name.clone(),
            version_time: backup.version_time,
            create_time: backup.create_time,
            source_database: backup.database.clone(),
        };
        state.databases.insert(
            name.clone(),
            DatabaseDescriptor {
                name: name.clone(),
                state: "CREATING".to_string(),
                create_time: Some(self.now),
                restore_info: Some(RestoreInfo {
                    source_type: "BACKUP".to_string(),
                    backup_info: Some(backup_info.clone()),
                }),
                encryption_config: request
                    .encryption
                    .as_ref()
                    .and_then(|e| e.kms_key_name.clone())
                    .map(|kms_key_name| DatabaseEncryption { kms_key_name }),
                ..Default::default()
            },
        );
        let metadata = OperationMetadata::RestoreDatabase(RestoreDatabaseMetadata {
            name: name.clone(),
            source_type: "BACKUP".to_string(),
            backup_info: Some(backup_info),
            progress: OperationProgress {
                start_time: Some(self.now),
                ..Default::default()
            },
            optimize_database_operation_name: String::new(),
        });
        let effect = Effect::Restore {
            database: name.clone(),
            backup: backup.name,
        };
        Ok(self.start(&mut state, &name, metadata, effect))
    }

    async fn create_database(
        &self,
        instance: &InstancePath,
        request: &CreateDatabaseRequest,
    ) -> Result<Operation> {
        let id = request
            .create_statement
            .trim()
            .rsplit(' ')
            .next()
            .unwrap_or_default()
            .trim_matches('`');
        let name = instance.database_name(id);
        let mut state = self.state();
        if state.databases.contains_key(&name) {
            return Err(CoreError::PreconditionFailed(format!(
                "database {} already exists",
                name
            )));
        }

        let retention = retention_period(&request.extra_statements);
        state.databases.insert(
            name.clone(),
            DatabaseDescriptor {
                name: name.clone(),
                state: "CREATING".to_string(),
                create_time: Some(self.now),
                earliest_version_time: Some(self.now),
                version_retention_period: Some(retention.unwrap_or_else(|| "1h".to_string())),
                ..Default::default()
            },
        );
        let metadata = OperationMetadata::CreateDatabase(CreateDatabaseMetadata {
            database: name.clone(),
        });
        let effect = Effect::CreateDatabase {
            database: name.clone(),
        };
        Ok(self.start(&mut state, &name, metadata, effect))
    }

    async fn get_operation(&self, name: &str) -> Result<Operation> {
        let mut state = self.state();
        let index = state
            .operations
            .iter()
            .position(|op| op.operation.name == name)
            .ok_or_else(|| CoreError::NotFound(name.to_string()))?;

        if !state.operations[index].operation.done {
            state.operations[index].polls += 1;
            let polls = state.operations[index].polls;
            match self.completion {
                Completion::AfterPolls(n) if polls >= n => self.finish(&mut state, index),
                _ => {
                    let percent = match self.completion {
                        Completion::AfterPolls(n) => (polls * 100 / n) as i32,
                        Completion::Never => 10,
                    };
                    set_progress(&mut state.operations[index].operation, percent);
                }
            }
        }
        Ok(state.operations[index].operation.clone())
    }

    async fn cancel_operation(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        *state.cancels.entry(name.to_string()).or_insert(0) += 1;
        let index = state
            .operations
            .iter()
            .position(|op| op.operation.name == name)
            .ok_or_else(|| CoreError::NotFound(name.to_string()))?;

        if state.operations[index].operation.done {
            return Err(CoreError::PreconditionFailed(format!(
                "operation {} has already finished",
                name
            )));
        }
        if self.ignore_cancel {
            return Ok(());
        }

        let effect = state.operations[index].effect.clone();
        remove_pending(&mut state, &effect);
        let now = self.now;
        let op = &mut state.operations[index].operation;
        op.done = true;
        op.error = Some(OperationError {
            code: CANCELLED_CODE,
            message: "CANCELLED".to_string(),
        });
        match &mut op.metadata {
            Some(OperationMetadata::CreateBackup(m)) => m.cancel_time = Some(now),
            Some(OperationMetadata::CopyBackup(m)) => m.cancel_time = Some(now),
            _ => {}
        }
        Ok(())
    }

    async fn list_backups(
        &self,
        instance: &InstancePath,
        request: &PageRequest,
    ) -> Result<Page<BackupDescriptor>> {
        let state = self.state();
        let mut items = Vec::new();
        for backup in state.backups.values() {
            if in_instance(&backup.name, instance)
                && matches_filter(backup, request.filter.as_deref())?
            {
                items.push(backup.clone());
            }
        }
        page_of(items, request)
    }

    async fn list_backup_operations(
        &self,
        instance: &InstancePath,
        request: &PageRequest,
    ) -> Result<Page<Operation>> {
        let state = self.state();
        let mut items = Vec::new();
        for op in state.operations.iter().map(|o| &o.operation) {
            let is_backup_op = matches!(
                op.metadata,
                Some(OperationMetadata::CreateBackup(_)) | Some(OperationMetadata::CopyBackup(_))
            );
            if is_backup_op
                && in_instance(&op.name, instance)
                && matches_filter(op, request.filter.as_deref())?
            {
                items.push(op.clone());
            }
        }
        page_of(items, request)
    }

    async fn list_database_operations(
        &self,
        instance: &InstancePath,
        request: &PageRequest,
    ) -> Result<Page<Operation>> {
        let state = self.state();
        let mut items = Vec::new();
        for op in state.operations.iter().map(|o| &o.operation) {
            let is_database_op = matches!(
                op.metadata,
                Some(OperationMetadata::RestoreDatabase(_))
                    | Some(OperationMetadata::OptimizeRestoredDatabase(_))
                    | Some(OperationMetadata::CreateDatabase(_))
            );
            if is_database_op
                && in_instance(&op.name, instance)
                && matches_filter(op, request.filter.as_deref())?
            {
                items.push(op.clone());
            }
        }
        page_of(items, request)
    }

    async fn get_backup(&self, name: &str) -> Result<BackupDescriptor> {
        let mut state = self.state();
        let reads = {
            let reads = state.backup_reads.entry(name.to_string()).or_insert(0);
            *reads += 1;
            *reads
        };
        let backup = state
            .backups
            .get_mut(name)
            .ok_or_else(|| CoreError::NotFound(name.to_string()))?;
        if self
            .references_clear_after
            .is_some_and(|after| reads > after)
        {
            backup.referencing_databases.clear();
        }
        Ok(backup.clone())
    }

    async fn update_backup_expire_time(
        &self,
        name: &str,
        expire_time: DateTime<Utc>,
    ) -> Result<BackupDescriptor> {
        let mut state = self.state();
        let backup = state
            .backups
            .get_mut(name)
            .ok_or_else(|| CoreError::NotFound(name.to_string()))?;
        if backup.max_expire_time.is_some_and(|max| expire_time > max) {
            return Err(CoreError::InvalidArgument(format!(
                "expire time {} is past the max expire time",
                expire_time
            )));
        }
        backup.expire_time = Some(expire_time);
        Ok(backup.clone())
    }

    async fn delete_backup(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        let backup = state
            .backups
            .get(name)
            .ok_or_else(|| CoreError::NotFound(name.to_string()))?;
        if !backup.referencing_databases.is_empty() {
            return Err(CoreError::PreconditionFailed(format!(
                "backup {} is referenced by {}",
                short_name(name),
                backup.referencing_databases.join(", ")
            )));
        }
        state.backups.remove(name);
        Ok(())
    }

    async fn get_database(&self, name: &str) -> Result<DatabaseDescriptor> {
        self.state()
            .databases
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(name.to_string()))
    }

    async fn drop_database(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        state
            .databases
            .remove(name)
            .ok_or_else(|| CoreError::NotFound(name.to_string()))?;
        for backup in state.backups.values_mut() {
            backup.referencing_databases.retain(|db| db != name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2024-05-01T12:00:00Z".parse().unwrap()
    }

    fn backup(name: &str, size: i64, state: BackupState) -> BackupDescriptor {
        BackupDescriptor {
            name: format!("projects/p/instances/i/backups/{}", name),
            database: "projects/p/instances/i/databases/example_db".to_string(),
            size_bytes: size,
            create_time: Some(now()),
            expire_time: Some(now() + ChronoDuration::days(10)),
            state,
            ..Default::default()
        }
    }

    #[test]
    fn test_filter_terms() {
        let b = backup("example_backup", 4096, BackupState::Ready);

        assert!(matches_filter(&b, Some("name:example")).unwrap());
        assert!(!matches_filter(&b, Some("name:other")).unwrap());
        assert!(matches_filter(&b, Some("size_bytes > 100")).unwrap());
        assert!(
            matches_filter(
                &b,
                Some("create_time >= \"2024-04-30T12:00:00Z\" AND state:READY")
            )
            .unwrap()
        );
        assert!(!matches_filter(&b, Some("expire_time < \"2024-05-02T00:00:00Z\"")).unwrap());
        assert!(matches_filter(&b, Some("(database:example_db)")).unwrap());
        assert!(matches_filter(&b, None).unwrap());
    }

    #[test]
    fn test_unsupported_filter_rejected() {
        let b = backup("b1", 1, BackupState::Ready);
        let err = matches_filter(&b, Some("owner:alice")).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_page_of_index_tokens() {
        let request = PageRequest {
            page_size: Some(2),
            page_token: Some("2".to_string()),
            ..Default::default()
        };
        let page = page_of(vec![1, 2, 3, 4, 5], &request).unwrap();
        assert_eq!(page.items, vec![3, 4]);
        assert_eq!(page.next_page_token.as_deref(), Some("4"));
    }

    #[test]
    fn test_retention_period_from_ddl() {
        let ddl = vec![
            "CREATE TABLE Singers (SingerId INT64 NOT NULL) PRIMARY KEY (SingerId)".to_string(),
            "ALTER DATABASE `db` SET OPTIONS (version_retention_period = '7d')".to_string(),
        ];
        assert_eq!(retention_period(&ddl).as_deref(), Some("7d"));
    }

    #[tokio::test]
    async fn test_delete_refused_while_referenced() {
        let stub = StubAdminService::new(now());
        let mut b = backup("b1", 1, BackupState::Ready);
        b.referencing_databases = vec!["projects/p/instances/i/databases/restored".to_string()];
        stub.insert_backup(b.clone());

        let err = stub.delete_backup(&b.name).await.unwrap_err();
        assert!(err.is_precondition_failed());
        assert!(stub.backup(&b.name).is_some());
    }
}
