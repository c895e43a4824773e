//! AWS SDK object store

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client as S3Client;
use fv_core::config::S3Config;
use tracing::{debug, instrument};

use super::{ObjectHead, ObjectStore};
use crate::error::{StorageError, StorageResult};

/// [`ObjectStore`] backed by `aws-sdk-s3`
#[derive(Debug, Clone)]
pub struct AwsObjectStore {
    client: S3Client,
    bucket: String,
}

impl AwsObjectStore {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build a client from static credentials
    pub async fn connect(config: &S3Config) -> Self {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "fieldvault",
        );

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(config.path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Self::new(S3Client::from_conf(builder.build()), config.bucket.clone())
    }
}

#[async_trait]
impl ObjectStore for AwsObjectStore {
    #[instrument(skip(self, path), fields(bucket = %self.bucket))]
    async fn put_file(
        &self,
        path: &Path,
        key: &str,
        acl: &str,
        content_type: Option<String>,
    ) -> StorageResult<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::BackendError(format!("Cannot read {}: {}", path.display(), e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .acl(ObjectCannedAcl::from(acl))
            .set_content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;

        debug!("Object put");
        Ok(())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;
        Ok(())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn head(&self, key: &str) -> StorageResult<ObjectHead> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(ObjectHead {
                status: 200,
                content_type: output.content_type().map(str::to_string),
                content_length: output.content_length().and_then(|len| u64::try_from(len).ok()),
            }),
            Err(err) => match err.raw_response() {
                // service answered with an error status (404, 403, ...)
                Some(response) => Ok(ObjectHead {
                    status: response.status().as_u16(),
                    ..Default::default()
                }),
                None => Err(StorageError::BackendError(err.to_string())),
            },
        }
    }
}
