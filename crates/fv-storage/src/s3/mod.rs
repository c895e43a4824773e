//! S3-compatible object storage
//!
//! Objects are written through the [`ObjectStore`] seam so the backend can
//! be exercised without a bucket. [`AwsObjectStore`] is the production
//! implementation. Direct-upload policies live in [`policy`].

mod client;
pub mod policy;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use fv_core::config::{S3Config, StorageSettings};
use tracing::{info, instrument};

use crate::backend::{KeyFn, StorageBackend, StorageCore, StorageOptions};
use crate::error::{StorageError, StorageResult};
use crate::model::{Attachment, FieldShape, Metadata};
use crate::transform::Transformation;

pub use client::AwsObjectStore;
pub use policy::{DirectUpload, DirectUploadPayload};

const DEFAULT_BASE_URL: &str = "https://s3.amazonaws.com";

/// Response to a metadata-only object request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectHead {
    /// HTTP status of the request
    pub status: u16,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
}

impl ObjectHead {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Minimal object store operations used by [`S3Storage`]
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a local file under `key`
    async fn put_file(
        &self,
        path: &Path,
        key: &str,
        acl: &str,
        content_type: Option<String>,
    ) -> StorageResult<()>;

    /// Delete the object stored under `key`
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Fetch object headers without the body
    async fn head(&self, key: &str) -> StorageResult<ObjectHead>;
}

/// Object storage backend
pub struct S3Storage {
    config: S3Config,
    core: StorageCore,
    store: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for S3Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Storage")
            .field("bucket", &self.config.bucket)
            .field("region", &self.config.region)
            .field("endpoint", &self.config.endpoint)
            .field("core", &self.core)
            .finish()
    }
}

impl S3Storage {
    /// Create a backend over an existing object store
    pub fn new(config: S3Config, options: StorageOptions, store: Arc<dyn ObjectStore>) -> StorageResult<Self> {
        if config.access_key_id.is_empty()
            || config.secret_access_key.is_empty()
            || config.bucket.is_empty()
        {
            return Err(StorageError::Configuration(
                "Key, secret or bucket is undefined".to_string(),
            ));
        }
        if policy::expires_in(config.direct_expiration_secs).is_none() {
            return Err(StorageError::Configuration(
                "Direct upload expiration is out of range".to_string(),
            ));
        }

        info!(bucket = %config.bucket, region = %config.region, "S3 storage initialized");

        Ok(Self {
            config,
            core: StorageCore::new(options),
            store,
        })
    }

    /// Create a backend talking to S3 through the AWS SDK
    pub async fn connect(config: S3Config, options: StorageOptions) -> StorageResult<Self> {
        let store = AwsObjectStore::connect(&config).await;
        Self::new(config, options, Arc::new(store))
    }

    pub async fn from_settings(settings: &StorageSettings) -> StorageResult<Self> {
        let config = settings
            .s3
            .clone()
            .ok_or_else(|| StorageError::Configuration("S3 storage is not configured".to_string()))?;

        Self::connect(config, StorageOptions::from_settings(settings)).await
    }

    pub fn with_transformation(mut self, stage: Arc<dyn Transformation>) -> Self {
        self.core = self.core.with_transformation(stage);
        self
    }

    pub fn with_key_fn(mut self, key_fn: KeyFn) -> Self {
        self.core = self.core.with_key_fn(key_fn);
        self
    }

    pub fn config(&self) -> &S3Config {
        &self.config
    }

    /// Service base URL
    pub fn base_url(&self) -> &str {
        self.config
            .endpoint
            .as_deref()
            .map(|e| e.trim_end_matches('/'))
            .unwrap_or(DEFAULT_BASE_URL)
    }

    /// URL clients post direct uploads to
    pub fn bucket_url(&self) -> String {
        format!("{}/{}", self.base_url(), self.config.bucket)
    }

    /// Public URL of a stored object
    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.bucket_url(), key)
    }
}

#[async_trait]
impl StorageBackend for S3Storage {
    fn name(&self) -> &str {
        "s3"
    }

    fn core(&self) -> &StorageCore {
        &self.core
    }

    #[instrument(skip(self, attachment), fields(storage = "s3", bucket = %self.config.bucket))]
    async fn save(&self, attachment: &Attachment) -> StorageResult<Metadata> {
        let key = attachment.require_key()?;
        let acl = attachment.acl.as_deref().unwrap_or(self.config.acl.as_str());

        self.store
            .put_file(&attachment.path, key, acl, attachment.content_type.clone())
            .await?;

        info!(key, acl, "Object uploaded");

        Ok(Metadata::new(
            key,
            attachment.size.unwrap_or_default(),
            attachment.content_type.clone(),
        ))
    }

    #[instrument(skip(self, metadata), fields(storage = "s3", key = %metadata.key))]
    async fn remove(&self, metadata: &Metadata) -> StorageResult<()> {
        if metadata.key.is_empty() {
            return Err(StorageError::MissingKey);
        }

        self.store.delete(&metadata.key).await?;
        info!("Object deleted");
        Ok(())
    }

    fn describe_fields(&self) -> FieldShape {
        FieldShape::standard()
            .require_type()
            .with_virtual("url", self.bucket_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> S3Config {
        S3Config::new("uploads", "AKIAEXAMPLE", "secret")
    }

    #[test]
    fn test_construction_requires_credentials() {
        let store = Arc::new(MockObjectStore::new());

        for config in [
            S3Config::new("", "key", "secret"),
            S3Config::new("bucket", "", "secret"),
            S3Config::new("bucket", "key", ""),
        ] {
            let result = S3Storage::new(config, StorageOptions::default(), store.clone());
            assert!(matches!(result, Err(StorageError::Configuration(_))));
        }
    }

    #[test]
    fn test_construction_rejects_unrepresentable_expiration() {
        let store = Arc::new(MockObjectStore::new());

        for secs in [u64::MAX, 100_000_000_000_000_000] {
            let mut config = config();
            config.direct_expiration_secs = secs;
            let result = S3Storage::new(config, StorageOptions::default(), store.clone());
            assert!(matches!(result, Err(StorageError::Configuration(_))));
        }
    }

    #[test]
    fn test_urls() {
        let storage =
            S3Storage::new(config(), StorageOptions::default(), Arc::new(MockObjectStore::new())).unwrap();
        assert_eq!(storage.bucket_url(), "https://s3.amazonaws.com/uploads");
        assert_eq!(storage.object_url("a/b"), "https://s3.amazonaws.com/uploads/a/b");

        let mut custom = config();
        custom.endpoint = Some("http://localhost:9000/".to_string());
        let storage =
            S3Storage::new(custom, StorageOptions::default(), Arc::new(MockObjectStore::new())).unwrap();
        assert_eq!(storage.object_url("k"), "http://localhost:9000/uploads/k");
    }

    #[test]
    fn test_describe_fields() {
        let storage =
            S3Storage::new(config(), StorageOptions::default(), Arc::new(MockObjectStore::new())).unwrap();
        let shape = storage.describe_fields();

        assert!(shape.field("type").unwrap().required);
        let values = shape.virtual_values(&Metadata::new("abc", 1, None));
        assert_eq!(
            values.get("url").and_then(|v| v.as_str()),
            Some("https://s3.amazonaws.com/uploads/abc")
        );
    }

    #[tokio::test]
    async fn test_save_uses_configured_acl() {
        let mut store = MockObjectStore::new();
        store
            .expect_put_file()
            .withf(|path, key, acl, content_type| {
                path == Path::new("/tmp/upload")
                    && key == "k1"
                    && acl == "public-read"
                    && content_type.as_deref() == Some("image/png")
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let storage = S3Storage::new(config(), StorageOptions::default(), Arc::new(store)).unwrap();
        let attachment = Attachment::new("/tmp/upload")
            .key("k1")
            .size(10)
            .content_type("image/png");

        let metadata = storage.save(&attachment).await.unwrap();
        assert_eq!(metadata, Metadata::new("k1", 10, Some("image/png".into())));
    }

    #[tokio::test]
    async fn test_save_prefers_attachment_acl() {
        let mut store = MockObjectStore::new();
        store
            .expect_put_file()
            .withf(|_, _, acl, _| acl == "private")
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let storage = S3Storage::new(config(), StorageOptions::default(), Arc::new(store)).unwrap();
        storage
            .save(&Attachment::new("/tmp/upload").key("k1").acl("private"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_save_propagates_store_errors() {
        let mut store = MockObjectStore::new();
        store
            .expect_put_file()
            .returning(|_, _, _, _| Err(StorageError::BackendError("connection reset".into())));

        let storage = S3Storage::new(config(), StorageOptions::default(), Arc::new(store)).unwrap();
        let result = storage.save(&Attachment::new("/tmp/upload").key("k1")).await;
        assert!(matches!(result, Err(StorageError::BackendError(_))));
    }

    #[tokio::test]
    async fn test_remove() {
        let mut store = MockObjectStore::new();
        store
            .expect_delete()
            .withf(|key| key == "k1")
            .times(1)
            .returning(|_| Ok(()));

        let storage = S3Storage::new(config(), StorageOptions::default(), Arc::new(store)).unwrap();
        storage.remove(&Metadata::new("k1", 1, None)).await.unwrap();

        let result = storage.remove(&Metadata::new("", 1, None)).await;
        assert!(matches!(result, Err(StorageError::MissingKey)));
    }
}
