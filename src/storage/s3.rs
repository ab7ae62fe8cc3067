//! S3-compatible bucket storage.
//!
//! S3 has no server-side archive extraction, so level archives are read
//! locally and every entry is uploaded as its own object, keyed by the entry
//! name. Reading and uploading overlap through a small bounded channel so a
//! level archive is never held in memory at once.

use std::io;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::archive;
use crate::error::StorageError;

use super::template::{join_uri, THUMBNAIL_NAMING_FORMAT, TILE_NAMING_FORMAT};
use super::{object_name, StorageProvider};

pub(crate) const BACKEND: &str = "s3";

/// Region where buckets must be created without a location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// How many times to probe for a freshly created bucket.
const BUCKET_WAIT_ATTEMPTS: u32 = 20;

/// Delay between bucket existence probes.
const BUCKET_WAIT_INTERVAL: Duration = Duration::from_millis(500);

/// Entries buffered between the archive reader and the uploader.
const UPLOAD_QUEUE_DEPTH: usize = 16;

/// Settings for [`S3Storage`].
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Bucket receiving tiles and thumbnails
    pub bucket: String,

    /// Custom endpoint for S3-compatible services (MinIO, etc.)
    pub endpoint: Option<String>,

    /// AWS region
    pub region: String,

    /// Public base URL of the bucket, overriding the derived one
    pub public_url: Option<String>,
}

/// Public base URL of a bucket.
///
/// Uses the explicit public URL if configured, then the custom endpoint in
/// path style, then the virtual-hosted AWS URL.
pub fn s3_base_url(config: &S3Config) -> String {
    if let Some(url) = &config.public_url {
        return url.trim_end_matches('/').to_string();
    }
    match &config.endpoint {
        Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), config.bucket),
        None => format!(
            "https://{}.s3.{}.amazonaws.com",
            config.bucket, config.region
        ),
    }
}

/// Create an S3 client with optional custom endpoint and region.
///
/// Custom endpoints use path-style addressing, which S3-compatible services
/// generally require.
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}

/// Uploads artifacts into an S3 bucket.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    base_url: String,
}

impl S3Storage {
    /// Create the bucket if needed and wait until it is reachable.
    pub async fn connect(config: &S3Config) -> Result<Self, StorageError> {
        let client = create_s3_client(config.endpoint.as_deref(), &config.region).await;
        let storage = Self {
            client,
            bucket: config.bucket.clone(),
            base_url: s3_base_url(config),
        };

        storage.create_bucket(&config.region).await?;
        storage.wait_until_exists().await?;

        info!(bucket = %storage.bucket, "S3 bucket ready");
        Ok(storage)
    }

    /// Get the bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn create_bucket(&self, region: &str) -> Result<(), StorageError> {
        let mut request = self.client.create_bucket().bucket(&self.bucket);
        if region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                debug!(bucket = %self.bucket, "Created bucket");
                Ok(())
            }
            Err(e) => {
                let owned = e
                    .as_service_error()
                    .map(|se| se.is_bucket_already_owned_by_you())
                    .unwrap_or(false);
                if owned {
                    Ok(())
                } else {
                    Err(StorageError::Setup {
                        backend: BACKEND,
                        message: format!("cannot create bucket {}: {}", self.bucket, e),
                    })
                }
            }
        }
    }

    async fn wait_until_exists(&self) -> Result<(), StorageError> {
        let mut last_error = String::new();
        for _ in 0..BUCKET_WAIT_ATTEMPTS {
            match self.client.head_bucket().bucket(&self.bucket).send().await {
                Ok(_) => return Ok(()),
                Err(e) => last_error = e.to_string(),
            }
            tokio::time::sleep(BUCKET_WAIT_INTERVAL).await;
        }
        Err(StorageError::Setup {
            backend: BACKEND,
            message: format!("bucket {} never became reachable: {}", self.bucket, last_error),
        })
    }

    async fn put_object(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("image/jpeg")
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| StorageError::Commit {
                name: key.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }
}

#[async_trait]
impl StorageProvider for S3Storage {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn commit_file(&self, file: &Path) -> Result<(), StorageError> {
        let name = object_name(file)?;
        let data = tokio::fs::read(file).await?;
        self.put_object(&name, data).await
    }

    async fn commit_archive(&self, file: &Path) -> Result<(), StorageError> {
        let name = object_name(file)?;
        let (tx, mut rx) = mpsc::channel::<(String, Vec<u8>)>(UPLOAD_QUEUE_DEPTH);

        let archive_path = file.to_path_buf();
        let reader = tokio::task::spawn_blocking(move || {
            archive::for_each_entry(&archive_path, |entry, data| {
                tx.blocking_send((entry, data))
                    .map_err(|_| io::Error::other("upload stopped"))
            })
        });

        let mut uploaded = 0usize;
        let mut upload_result = Ok(());
        while let Some((key, data)) = rx.recv().await {
            if let Err(e) = self.put_object(&key, data).await {
                upload_result = Err(e);
                break;
            }
            uploaded += 1;
        }
        drop(rx);

        let read_result = reader.await.map_err(|e| StorageError::Commit {
            name: name.clone(),
            message: e.to_string(),
        })?;

        upload_result?;
        read_result.map_err(|e| StorageError::Commit {
            name: name.clone(),
            message: e.to_string(),
        })?;

        debug!(archive = %name, objects = uploaded, "Uploaded archive entries");
        Ok(())
    }

    fn tiles_uri(&self) -> String {
        join_uri(&self.base_url, TILE_NAMING_FORMAT)
    }

    fn thumbnail_uri(&self) -> String {
        join_uri(&self.base_url, THUMBNAIL_NAMING_FORMAT)
    }
}
