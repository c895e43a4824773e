//! Storage backend contract
//!
//! Provides a unified interface for attachment storage backends. Key
//! generation, validation and the transformation pipeline are shared by all
//! backends through [`StorageCore`]; physical I/O is backend specific.

use std::sync::Arc;

use async_trait::async_trait;
use fv_core::config::{KeyConfig, LimitsConfig, StorageSettings};
use serde_json::{Map, Value};

use crate::error::{StorageResult, ValidationError};
use crate::keys::KeyGenerator;
use crate::model::{Attachment, FieldShape, Metadata};
use crate::transform::{run_pipeline, Transformation};

/// Custom key generator replacing the default one
pub type KeyFn = Arc<dyn Fn(&Attachment) -> StorageResult<String> + Send + Sync>;

/// Options shared by every backend
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    /// Validation limits
    pub limits: LimitsConfig,
    /// Key generation
    pub keys: KeyConfig,
}

impl StorageOptions {
    pub fn from_settings(settings: &StorageSettings) -> Self {
        Self {
            limits: settings.limits.clone(),
            keys: settings.keys.clone(),
        }
    }

    /// Restrict attachments to the given content types
    pub fn types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.limits.types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn min_size(mut self, min: u64) -> Self {
        self.limits.min_size = Some(min);
        self
    }

    pub fn max_size(mut self, max: u64) -> Self {
        self.limits.max_size = Some(max);
        self
    }

    pub fn keys(mut self, keys: KeyConfig) -> Self {
        self.keys = keys;
        self
    }
}

/// Check an attachment's type and size against the configured limits
pub fn validate_attachment(limits: &LimitsConfig, attachment: &Attachment) -> Result<(), ValidationError> {
    if !limits.types.is_empty() {
        let content_type = attachment
            .content_type
            .as_deref()
            .ok_or(ValidationError::TypeUndefined)?;

        if !limits.types.iter().any(|t| t == content_type) {
            return Err(ValidationError::TypeNotAllowed {
                actual: content_type.to_string(),
                allowed: limits.types.clone(),
            });
        }
    }

    let size = attachment.size.unwrap_or_default();

    if let Some(max) = limits.max_size {
        if size > max {
            return Err(ValidationError::TooLarge { size, max });
        }
    }

    if let Some(min) = limits.min_size {
        if size < min {
            return Err(ValidationError::TooSmall { size, min });
        }
    }

    Ok(())
}

/// Behavior common to all backends
pub struct StorageCore {
    options: StorageOptions,
    keys: KeyGenerator,
    key_fn: Option<KeyFn>,
    transformations: Vec<Arc<dyn Transformation>>,
}

impl Default for StorageCore {
    fn default() -> Self {
        Self::new(StorageOptions::default())
    }
}

impl std::fmt::Debug for StorageCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageCore")
            .field("options", &self.options)
            .field("custom_keys", &self.key_fn.is_some())
            .field(
                "transformations",
                &self.transformations.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl StorageCore {
    pub fn new(options: StorageOptions) -> Self {
        let keys = KeyGenerator::new(options.keys.clone());
        Self {
            options,
            keys,
            key_fn: None,
            transformations: Vec::new(),
        }
    }

    pub fn options(&self) -> &StorageOptions {
        &self.options
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.options.limits
    }

    /// Append a transformation stage
    pub fn with_transformation(mut self, stage: Arc<dyn Transformation>) -> Self {
        self.transformations.push(stage);
        self
    }

    /// Replace the default key generator
    pub fn with_key_fn(mut self, key_fn: KeyFn) -> Self {
        self.key_fn = Some(key_fn);
        self
    }

    pub fn transformations(&self) -> &[Arc<dyn Transformation>] {
        &self.transformations
    }

    /// Explicit key, else the custom generator, else a unique key
    pub fn generate_key(&self, attachment: &Attachment) -> StorageResult<String> {
        if let Some(key) = attachment.key.as_deref().filter(|k| !k.is_empty()) {
            return Ok(key.to_string());
        }

        match &self.key_fn {
            Some(key_fn) => key_fn(attachment),
            None => Ok(self.keys.generate()),
        }
    }

    pub fn validate(&self, attachment: &Attachment) -> Result<(), ValidationError> {
        validate_attachment(&self.options.limits, attachment)
    }

    pub async fn transform(&self, attachment: &Attachment) -> StorageResult<Map<String, Value>> {
        run_pipeline(&self.transformations, attachment).await
    }
}

/// Storage backend trait
///
/// Backends are bound to document fields as `Arc<dyn StorageBackend>`.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Shared key, validation and transformation behavior
    fn core(&self) -> &StorageCore;

    /// Resolve the storage key for an attachment
    async fn generate_key(&self, attachment: &Attachment) -> StorageResult<String> {
        self.core().generate_key(attachment)
    }

    /// Enforce the content type allow-list and size bounds
    fn validate(&self, attachment: &Attachment) -> Result<(), ValidationError> {
        self.core().validate(attachment)
    }

    /// Run every transformation stage
    async fn transform(&self, attachment: &Attachment) -> StorageResult<Map<String, Value>> {
        self.core().transform(attachment).await
    }

    /// Persist the attachment under `attachment.key`
    async fn save(&self, attachment: &Attachment) -> StorageResult<Metadata>;

    /// Delete the object described by stored metadata
    async fn remove(&self, metadata: &Metadata) -> StorageResult<()>;

    /// Field shape this backend's metadata needs in the owning document
    fn describe_fields(&self) -> FieldShape {
        FieldShape::standard()
    }
}
