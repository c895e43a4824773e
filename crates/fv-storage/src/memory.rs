//! In-memory storage for testing

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::backend::{KeyFn, StorageBackend, StorageCore, StorageOptions};
use crate::error::{StorageError, StorageResult};
use crate::model::{Attachment, FieldShape, Metadata};
use crate::transform::Transformation;

/// A backend call observed by [`MemoryStorage`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageEvent {
    Saved(String),
    Removed(String),
}

/// Keeps saved metadata in a map instead of writing bytes anywhere
#[derive(Debug)]
pub struct MemoryStorage {
    core: StorageCore,
    objects: RwLock<HashMap<String, Metadata>>,
    events: RwLock<Vec<StorageEvent>>,
    fail_saves: AtomicBool,
    fail_removes: AtomicBool,
    shape: FieldShape,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::with_options(StorageOptions::default())
    }

    pub fn with_options(options: StorageOptions) -> Self {
        Self {
            core: StorageCore::new(options),
            objects: RwLock::new(HashMap::new()),
            events: RwLock::new(Vec::new()),
            fail_saves: AtomicBool::new(false),
            fail_removes: AtomicBool::new(false),
            shape: FieldShape::standard(),
        }
    }

    pub fn with_transformation(mut self, stage: Arc<dyn Transformation>) -> Self {
        self.core = self.core.with_transformation(stage);
        self
    }

    pub fn with_key_fn(mut self, key_fn: KeyFn) -> Self {
        self.core = self.core.with_key_fn(key_fn);
        self
    }

    pub fn with_shape(mut self, shape: FieldShape) -> Self {
        self.shape = shape;
        self
    }

    /// Make subsequent saves fail
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent removes fail
    pub fn fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Every save and remove, in call order
    pub async fn events(&self) -> Vec<StorageEvent> {
        self.events.read().await.clone()
    }

    /// Keys of every removed object, in call order
    pub async fn removed(&self) -> Vec<String> {
        self.events
            .read()
            .await
            .iter()
            .filter_map(|event| match event {
                StorageEvent::Removed(key) => Some(key.clone()),
                StorageEvent::Saved(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    fn core(&self) -> &StorageCore {
        &self.core
    }

    async fn save(&self, attachment: &Attachment) -> StorageResult<Metadata> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::BackendError("memory storage rejected save".to_string()));
        }

        let metadata = Metadata::from_attachment(attachment)?;

        self.objects
            .write()
            .await
            .insert(metadata.key.clone(), metadata.clone());
        self.events
            .write()
            .await
            .push(StorageEvent::Saved(metadata.key.clone()));

        debug!(key = %metadata.key, "Object stored in memory");
        Ok(metadata)
    }

    async fn remove(&self, metadata: &Metadata) -> StorageResult<()> {
        if metadata.key.is_empty() {
            return Err(StorageError::MissingKey);
        }
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(StorageError::BackendError("memory storage rejected remove".to_string()));
        }

        self.objects.write().await.remove(&metadata.key);
        self.events
            .write()
            .await
            .push(StorageEvent::Removed(metadata.key.clone()));
        Ok(())
    }

    fn describe_fields(&self) -> FieldShape {
        self.shape.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage_save_remove() {
        let storage = MemoryStorage::new();
        let attachment = Attachment::new("/tmp/a.txt").key("k1").size(13).content_type("text/plain");

        let metadata = storage.save(&attachment).await.unwrap();
        assert_eq!(metadata, Metadata::new("k1", 13, Some("text/plain".into())));
        assert!(storage.contains("k1").await);

        storage.remove(&metadata).await.unwrap();
        assert!(storage.is_empty().await);
        assert_eq!(
            storage.events().await,
            vec![StorageEvent::Saved("k1".into()), StorageEvent::Removed("k1".into())]
        );
        assert_eq!(storage.removed().await, vec!["k1".to_string()]);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let storage = MemoryStorage::new();
        storage.fail_saves(true);
        let result = storage.save(&Attachment::new("/tmp/a").key("k")).await;
        assert!(matches!(result, Err(StorageError::BackendError(_))));

        storage.fail_removes(true);
        let result = storage.remove(&Metadata::new("k", 1, None)).await;
        assert!(matches!(result, Err(StorageError::BackendError(_))));
        assert!(storage.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_requires_key() {
        let storage = MemoryStorage::new();
        let result = storage.remove(&Metadata::new("", 0, None)).await;
        assert!(matches!(result, Err(StorageError::MissingKey)));
    }
}
