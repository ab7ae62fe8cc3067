//! OpenStack Swift container storage.
//!
//! Level archives are uploaded whole with `?extract-archive=<format>`, and
//! Swift unpacks them server side into one object per entry. The bulk
//! response is checked for per-entry errors since Swift answers 200/201 even
//! when some entries failed.

use std::path::Path;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::{debug, info};

use crate::archive::ArchiveFormat;
use crate::error::StorageError;

use super::template::{join_uri, THUMBNAIL_NAMING_FORMAT, TILE_NAMING_FORMAT};
use super::{object_name, StorageProvider};

pub(crate) const BACKEND: &str = "swift";

const AUTH_USER: &str = "X-Auth-User";
const AUTH_KEY: &str = "X-Auth-Key";
const AUTH_TOKEN: &str = "X-Auth-Token";
const STORAGE_URL: &str = "X-Storage-Url";
const CONTAINER_READ: &str = "X-Container-Read";

/// ACL making a container's objects and listings world readable.
const PUBLIC_READ_ACL: &str = ".r:*,.rlistings";

/// Settings for [`SwiftStorage`].
#[derive(Debug, Clone)]
pub struct SwiftConfig {
    /// v1 authentication endpoint (e.g. `https://swift.example.org/auth/v1.0`)
    pub auth_url: String,

    /// Account user (`account:user`)
    pub user: String,

    /// Account key
    pub key: String,

    /// Container receiving tiles and thumbnails
    pub container: String,

    /// Public base URL of the container, overriding the storage URL
    pub public_url: Option<String>,
}

/// Body of a bulk extraction response (`Accept: application/json`).
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BulkResponse {
    #[serde(rename = "Number Files Created", default)]
    pub files_created: u64,

    #[serde(rename = "Response Status", default)]
    pub status: String,

    #[serde(rename = "Response Body", default)]
    pub body: String,

    /// `[object name, status]` pairs of failed entries
    #[serde(rename = "Errors", default)]
    pub errors: Vec<Vec<String>>,
}

impl BulkResponse {
    /// Whether every entry was extracted.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && (self.status.is_empty() || self.status.starts_with('2'))
    }
}

/// Parse a bulk extraction response body.
pub fn parse_bulk_response(body: &str) -> Result<BulkResponse, serde_json::Error> {
    serde_json::from_str(body)
}

/// Uploads artifacts into a Swift container.
#[derive(Debug, Clone)]
pub struct SwiftStorage {
    client: Client,
    token: String,
    container_url: String,
    base_url: String,
}

impl SwiftStorage {
    /// Authenticate, create the container and make it publicly readable.
    pub async fn connect(config: &SwiftConfig) -> Result<Self, StorageError> {
        let client = Client::new();

        let response = client
            .get(&config.auth_url)
            .header(AUTH_USER, &config.user)
            .header(AUTH_KEY, &config.key)
            .send()
            .await
            .map_err(|e| setup_error(format!("authentication request failed: {e}")))?;
        let response = expect_success(response, "authentication").map_err(setup_error)?;

        let storage_url = header(&response, STORAGE_URL)?;
        let token = header(&response, AUTH_TOKEN)?;

        let container_url = format!(
            "{}/{}",
            storage_url.trim_end_matches('/'),
            urlencoding::encode(&config.container)
        );
        let base_url = config
            .public_url
            .as_deref()
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| container_url.clone());

        let storage = Self {
            client,
            token,
            container_url,
            base_url,
        };
        storage.create_public_container().await?;

        info!(container = %config.container, "Swift container ready");
        Ok(storage)
    }

    async fn create_public_container(&self) -> Result<(), StorageError> {
        let response = self
            .client
            .put(&self.container_url)
            .header(AUTH_TOKEN, &self.token)
            .send()
            .await
            .map_err(|e| setup_error(format!("container creation failed: {e}")))?;
        expect_success(response, "container creation").map_err(setup_error)?;

        let response = self
            .client
            .post(&self.container_url)
            .header(AUTH_TOKEN, &self.token)
            .header(CONTAINER_READ, PUBLIC_READ_ACL)
            .send()
            .await
            .map_err(|e| setup_error(format!("setting container ACL failed: {e}")))?;
        expect_success(response, "setting container ACL").map_err(setup_error)?;

        Ok(())
    }

    fn object_url(&self, name: &str) -> String {
        let encoded: Vec<_> = name.split('/').map(urlencoding::encode).collect();
        format!("{}/{}", self.container_url, encoded.join("/"))
    }
}

#[async_trait]
impl StorageProvider for SwiftStorage {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn commit_file(&self, file: &Path) -> Result<(), StorageError> {
        let name = object_name(file)?;
        let data = tokio::fs::read(file).await?;

        let response = self
            .client
            .put(self.object_url(&name))
            .header(AUTH_TOKEN, &self.token)
            .header(CONTENT_TYPE, "image/jpeg")
            .body(data)
            .send()
            .await
            .map_err(|e| commit_error(&name, e.to_string()))?;
        expect_success(response, "upload").map_err(|m| commit_error(&name, m))?;
        Ok(())
    }

    async fn commit_archive(&self, file: &Path) -> Result<(), StorageError> {
        let name = object_name(file)?;
        let format = ArchiveFormat::from_path(file)
            .ok_or_else(|| commit_error(&name, "unknown archive format".to_string()))?;
        let data = tokio::fs::read(file).await?;

        let response = self
            .client
            .put(format!(
                "{}?extract-archive={}",
                self.container_url,
                format.extension()
            ))
            .header(AUTH_TOKEN, &self.token)
            .header(ACCEPT, "application/json")
            .body(data)
            .send()
            .await
            .map_err(|e| commit_error(&name, e.to_string()))?;
        let response =
            expect_success(response, "bulk extraction").map_err(|m| commit_error(&name, m))?;

        let body = response
            .text()
            .await
            .map_err(|e| commit_error(&name, e.to_string()))?;
        let bulk = parse_bulk_response(&body).map_err(|e| commit_error(&name, e.to_string()))?;

        if !bulk.is_success() {
            return Err(commit_error(
                &name,
                format!(
                    "bulk extraction reported {} ({} errors)",
                    bulk.status,
                    bulk.errors.len()
                ),
            ));
        }

        debug!(archive = %name, objects = bulk.files_created, "Extracted archive in container");
        Ok(())
    }

    fn tiles_uri(&self) -> String {
        join_uri(&self.base_url, TILE_NAMING_FORMAT)
    }

    fn thumbnail_uri(&self) -> String {
        join_uri(&self.base_url, THUMBNAIL_NAMING_FORMAT)
    }
}

fn setup_error(message: String) -> StorageError {
    StorageError::Setup {
        backend: BACKEND,
        message,
    }
}

fn commit_error(name: &str, message: String) -> StorageError {
    StorageError::Commit {
        name: name.to_string(),
        message,
    }
}

fn expect_success(response: Response, action: &str) -> Result<Response, String> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(format!("{action} returned HTTP {status}"))
    }
}

fn header(response: &Response, name: &str) -> Result<String, StorageError> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| setup_error(format!("authentication response lacks {name}")))
}
