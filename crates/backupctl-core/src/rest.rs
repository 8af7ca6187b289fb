//! HTTPS/JSON implementation of [`AdminService`]
//!
//! Talks to the database admin REST surface (`/v1/projects/*/instances/*/...`)
//! with bearer-token authentication.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

use crate::error::{CoreError, Result};
use crate::service::AdminService;
use crate::types::{
    BackupDescriptor, CopyBackupRequest, CreateBackupRequest, CreateDatabaseRequest,
    DatabaseDescriptor, InstancePath, Operation, Page, PageRequest, RestoreDatabaseRequest,
};

/// Public endpoint of the admin API
pub const DEFAULT_ENDPOINT: &str = "https://spanner.googleapis.com";

/// User agent string for backupctl HTTP requests
const USER_AGENT: &str = concat!("backupctl/", env!("CARGO_PKG_VERSION"));

/// Per-request timeout. Long-running work is tracked through operations,
/// so individual calls should return quickly.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// REST client for the admin API
#[derive(Clone)]
pub struct RestAdminClient {
    http: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl std::fmt::Debug for RestAdminClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestAdminClient")
            .field("base_url", &self.base_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListBackupsResponse {
    #[serde(default)]
    backups: Vec<BackupDescriptor>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListOperationsResponse {
    #[serde(default)]
    operations: Vec<Operation>,
    #[serde(default)]
    next_page_token: Option<String>,
}

impl RestAdminClient {
    /// Create a client for `base_url` (e.g. [`DEFAULT_ENDPOINT`])
    pub fn new(base_url: impl Into<String>, access_token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_http_client(http, base_url, access_token))
    }

    /// Create a client around a preconfigured `reqwest::Client`
    pub fn with_http_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        access_token: Option<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            access_token,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, resource: &str) -> Result<Url> {
        Ok(Url::parse(&format!("{}/v1/{}", self.base_url, resource))?)
    }

    fn page_url(&self, resource: &str, request: &PageRequest) -> Result<Url> {
        let mut url = self.url(resource)?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(filter) = &request.filter {
                query.append_pair("filter", filter);
            }
            if let Some(size) = request.page_size {
                query.append_pair("pageSize", &size.to_string());
            }
            if let Some(token) = &request.page_token {
                query.append_pair("pageToken", token);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!("{} {}", method, url);
        let builder = self.http.request(method, url);
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        trace!("Error body: {}", body);
        let (status_name, message) = match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => (envelope.error.status, envelope.error.message),
            Err(_) => (None, body),
        };
        debug!("Request failed with HTTP {}: {}", status.as_u16(), message);
        Err(CoreError::from_status(
            status.as_u16(),
            status_name.as_deref(),
            message,
        ))
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = Self::check(builder.send().await?).await?;
        let body = response.text().await?;
        trace!("Response body: {}", body);
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_empty(&self, builder: RequestBuilder) -> Result<()> {
        Self::check(builder.send().await?).await?;
        Ok(())
    }

    async fn list_operations(
        &self,
        resource: &str,
        request: &PageRequest,
    ) -> Result<Page<Operation>> {
        let url = self.page_url(resource, request)?;
        let response: ListOperationsResponse = self.send(self.request(Method::GET, url)).await?;
        Ok(Page::new(response.operations, response.next_page_token))
    }
}

#[async_trait]
impl AdminService for RestAdminClient {
    async fn create_backup(
        &self,
        instance: &InstancePath,
        request: &CreateBackupRequest,
    ) -> Result<Operation> {
        let mut url = self.url(&format!("{}/backups", instance.name()))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("backupId", &request.backup_id);
            if let Some(encryption) = &request.encryption {
                query.append_pair(
                    "encryptionConfig.encryptionType",
                    encryption.encryption_type.as_str(),
                );
                if let Some(key) = &encryption.kms_key_name {
                    query.append_pair("encryptionConfig.kmsKeyName", key);
                }
            }
        }

        let mut body = json!({
            "database": request.database,
            "expireTime": request.expire_time,
        });
        if let Some(version_time) = request.version_time {
            body["versionTime"] = json!(version_time);
        }

        self.send(self.request(Method::POST, url).json(&body)).await
    }

    async fn copy_backup(
        &self,
        instance: &InstancePath,
        request: &CopyBackupRequest,
    ) -> Result<Operation> {
        let url = self.url(&format!("{}/backups:copy", instance.name()))?;
        self.send(self.request(Method::POST, url).json(request))
            .await
    }

    async fn restore_database(
        &self,
        instance: &InstancePath,
        request: &RestoreDatabaseRequest,
    ) -> Result<Operation> {
        let url = self.url(&format!("{}/databases:restore", instance.name()))?;
        self.send(self.request(Method::POST, url).json(request))
            .await
    }

    async fn create_database(
        &self,
        instance: &InstancePath,
        request: &CreateDatabaseRequest,
    ) -> Result<Operation> {
        let url = self.url(&format!("{}/databases", instance.name()))?;
        self.send(self.request(Method::POST, url).json(request))
            .await
    }

    async fn get_operation(&self, name: &str) -> Result<Operation> {
        let url = self.url(name)?;
        self.send(self.request(Method::GET, url)).await
    }

    async fn cancel_operation(&self, name: &str) -> Result<()> {
        let url = self.url(&format!("{}:cancel", name))?;
        self.send_empty(self.request(Method::POST, url).json(&json!({})))
            .await
    }

    async fn list_backups(
        &self,
        instance: &InstancePath,
        request: &PageRequest,
    ) -> Result<Page<BackupDescriptor>> {
        let url = self.page_url(&format!("{}/backups", instance.name()), request)?;
        let response: ListBackupsResponse = self.send(self.request(Method::GET, url)).await?;
        Ok(Page::new(response.backups, response.next_page_token))
    }

    async fn list_backup_operations(
        &self,
        instance: &InstancePath,
        request: &PageRequest,
    ) -> Result<Page<Operation>> {
        self.list_operations(&format!("{}/backupOperations", instance.name()), request)
            .await
    }

    async fn list_database_operations(
        &self,
        instance: &InstancePath,
        request: &PageRequest,
    ) -> Result<Page<Operation>> {
        self.list_operations(&format!("{}/databaseOperations", instance.name()), request)
            .await
    }

    async fn get_backup(&self, name: &str) -> Result<BackupDescriptor> {
        let url = self.url(name)?;
        self.send(self.request(Method::GET, url)).await
    }

    async fn update_backup_expire_time(
        &self,
        name: &str,
        expire_time: DateTime<Utc>,
    ) -> Result<BackupDescriptor> {
        let mut url = self.url(name)?;
        url.query_pairs_mut().append_pair("updateMask", "expireTime");
        let body = json!({ "expireTime": expire_time });
        self.send(self.request(Method::PATCH, url).json(&body))
            .await
    }

    async fn delete_backup(&self, name: &str) -> Result<()> {
        let url = self.url(name)?;
        self.send_empty(self.request(Method::DELETE, url)).await
    }

    async fn get_database(&self, name: &str) -> Result<DatabaseDescriptor> {
        let url = self.url(name)?;
        self.send(self.request(Method::GET, url)).await
    }

    async fn drop_database(&self, name: &str) -> Result<()> {
        let url = self.url(name)?;
        self.send_empty(self.request(Method::DELETE, url)).await
    }
}
