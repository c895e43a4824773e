//! Transformation pipeline
//!
//! A backend may carry an ordered list of stages (thumbnailing, digests,
//! ...). Each stage contributes a metadata fragment; fragments are merged
//! shallowly, later stages overwriting earlier ones.

use std::sync::Arc;

use async_trait::async_trait;
use fv_core::BoxError;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument};

use crate::error::{StorageError, StorageResult};
use crate::model::Attachment;

/// A single transformation stage
#[async_trait]
pub trait Transformation: Send + Sync {
    /// Stage name for logging and errors
    fn name(&self) -> &str;

    /// Process the attachment and return a metadata fragment
    async fn process(&self, attachment: &Attachment) -> Result<Map<String, Value>, BoxError>;
}

/// Run every stage in order, stopping at the first failure
#[instrument(skip_all, fields(stages = stages.len()))]
pub async fn run_pipeline(
    stages: &[Arc<dyn Transformation>],
    attachment: &Attachment,
) -> StorageResult<Map<String, Value>> {
    let mut metadata = Map::new();

    for stage in stages {
        let fragment = stage
            .process(attachment)
            .await
            .map_err(|source| StorageError::Transformation {
                stage: stage.name().to_string(),
                source,
            })?;

        debug!(stage = stage.name(), fields = fragment.len(), "Transformation applied");
        metadata.extend(fragment);
    }

    Ok(metadata)
}

/// Records the SHA-256 digest of the source file as `digest`
#[derive(Debug, Default, Clone)]
pub struct DigestTransformation;

impl DigestTransformation {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transformation for DigestTransformation {
    fn name(&self) -> &str {
        "digest"
    }

    async fn process(&self, attachment: &Attachment) -> Result<Map<String, Value>, BoxError> {
        let mut file = tokio::fs::File::open(&attachment.path).await?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; 64 * 1024];

        loop {
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        let mut fragment = Map::new();
        fragment.insert("digest".into(), Value::String(hex::encode(hasher.finalize())));
        Ok(fragment)
    }
}
