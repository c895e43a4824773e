//! Local filesystem storage

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fv_core::config::StorageSettings;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::backend::{KeyFn, StorageBackend, StorageCore, StorageOptions};
use crate::error::{StorageError, StorageResult};
use crate::model::{Attachment, Metadata};
use crate::transform::Transformation;

/// Stores attachments as files under a root directory
#[derive(Debug)]
pub struct LocalStorage {
    /// Root directory for storage
    root: PathBuf,
    /// Copy the source instead of moving it
    copy: bool,
    core: StorageCore,
}

impl LocalStorage {
    /// Create a new local storage
    pub fn new(root: impl AsRef<Path>, options: StorageOptions) -> StorageResult<Self> {
        let root = root.as_ref();
        if root.as_os_str().is_empty() {
            return Err(StorageError::Configuration("Path is not defined".to_string()));
        }

        Ok(Self {
            root: root.to_path_buf(),
            copy: false,
            core: StorageCore::new(options),
        })
    }

    pub fn from_settings(settings: &StorageSettings) -> StorageResult<Self> {
        let file = settings
            .file
            .as_ref()
            .ok_or_else(|| StorageError::Configuration("Path is not defined".to_string()))?;

        Ok(Self::new(&file.path, StorageOptions::from_settings(settings))?.with_copy(file.copy))
    }

    pub fn with_copy(mut self, copy: bool) -> Self {
        self.copy = copy;
        self
    }

    pub fn with_transformation(mut self, stage: std::sync::Arc<dyn Transformation>) -> Self {
        self.core = self.core.with_transformation(stage);
        self
    }

    pub fn with_key_fn(mut self, key_fn: KeyFn) -> Self {
        self.core = self.core.with_key_fn(key_fn);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a full path
    pub fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() {
            return Err(StorageError::MissingKey);
        }

        // Prevent directory traversal
        if key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        Ok(self.root.join(key))
    }

    /// Ensure parent directory exists
    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Rename, falling back to copy and delete across filesystems
    async fn move_file(from: &Path, to: &Path) -> StorageResult<()> {
        if let Err(e) = fs::rename(from, to).await {
            debug!(error = %e, "Rename failed, copying instead");
            fs::copy(from, to).await?;
            fs::remove_file(from).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    fn name(&self) -> &str {
        "local"
    }

    fn core(&self) -> &StorageCore {
        &self.core
    }

    #[instrument(skip(self, attachment), fields(storage = "local", key = ?attachment.key))]
    async fn save(&self, attachment: &Attachment) -> StorageResult<Metadata> {
        let key = attachment.require_key()?;
        let target = self.path_for(key)?;
        self.ensure_parent(&target).await?;

        if self.copy {
            fs::copy(&attachment.path, &target).await?;
        } else {
            Self::move_file(&attachment.path, &target).await?;
        }

        let size = match attachment.size {
            Some(size) => size,
            None => fs::metadata(&target).await?.len(),
        };

        info!(path = ?target, size, "File stored");

        Ok(Metadata::new(key, size, attachment.content_type.clone()))
    }

    #[instrument(skip(self, metadata), fields(storage = "local", key = %metadata.key))]
    async fn remove(&self, metadata: &Metadata) -> StorageResult<()> {
        let path = self.path_for(&metadata.key)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                info!(path = ?path, "File deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = ?path, "File to delete does not exist");
                Err(StorageError::NotFound(metadata.key.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fv_core::config::{FileStorageConfig, KeyConfig};

    async fn source_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, data).await.unwrap();
        path
    }

    #[test]
    fn test_requires_root() {
        let result = LocalStorage::new("", StorageOptions::default());
        assert!(matches!(result, Err(StorageError::Configuration(_))));

        let result = LocalStorage::from_settings(&StorageSettings::default());
        assert!(matches!(result, Err(StorageError::Configuration(_))));
    }

    #[test]
    fn test_path_for_rejects_traversal() {
        let storage = LocalStorage::new("/var/files", StorageOptions::default()).unwrap();

        assert_eq!(
            storage.path_for("ab/cd/key").unwrap(),
            PathBuf::from("/var/files/ab/cd/key")
        );
        assert!(matches!(storage.path_for("../etc/passwd"), Err(StorageError::InvalidKey(_))));
        assert!(matches!(storage.path_for("/etc/passwd"), Err(StorageError::InvalidKey(_))));
        assert!(matches!(storage.path_for(""), Err(StorageError::MissingKey)));
    }

    #[tokio::test]
    async fn test_save_moves_file() {
        let sources = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let source = source_file(sources.path(), "upload.txt", b"Hello, World!").await;

        let storage = LocalStorage::new(root.path(), StorageOptions::default()).unwrap();
        let attachment = Attachment::new(&source).key("ab/cd/abcdef").content_type("text/plain");

        let metadata = storage.save(&attachment).await.unwrap();
        assert_eq!(metadata, Metadata::new("ab/cd/abcdef", 13, Some("text/plain".into())));

        assert!(!source.exists());
        let stored = fs::read(root.path().join("ab/cd/abcdef")).await.unwrap();
        assert_eq!(stored, b"Hello, World!");
    }

    #[tokio::test]
    async fn test_save_copies_file() {
        let sources = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let source = source_file(sources.path(), "upload.txt", b"copy me").await;

        let settings = StorageSettings {
            file: Some(FileStorageConfig {
                path: root.path().to_string_lossy().into_owned(),
                copy: true,
            }),
            ..Default::default()
        };
        let storage = LocalStorage::from_settings(&settings).unwrap();

        storage
            .save(&Attachment::new(&source).key("copied").size(7))
            .await
            .unwrap();

        assert!(source.exists());
        assert!(root.path().join("copied").exists());
    }

    #[tokio::test]
    async fn test_save_requires_key() {
        let root = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(root.path(), StorageOptions::default()).unwrap();

        let result = storage.save(&Attachment::new("/tmp/whatever")).await;
        assert!(matches!(result, Err(StorageError::MissingKey)));
    }

    #[tokio::test]
    async fn test_remove() {
        let sources = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let source = source_file(sources.path(), "upload.bin", b"data").await;
        let storage = LocalStorage::new(root.path(), StorageOptions::default()).unwrap();

        let metadata = storage.save(&Attachment::new(&source).key("k1")).await.unwrap();
        assert!(root.path().join("k1").exists());

        storage.remove(&metadata).await.unwrap();
        assert!(!root.path().join("k1").exists());

        let again = storage.remove(&metadata).await;
        assert!(matches!(again, Err(StorageError::NotFound(_))));

        let keyless = Metadata::new("", 0, None);
        assert!(matches!(storage.remove(&keyless).await, Err(StorageError::MissingKey)));
    }

    #[tokio::test]
    async fn test_generated_keys_are_sharded() {
        let storage = LocalStorage::new(
            "/var/files",
            StorageOptions::default().keys(KeyConfig {
                dir_length: Some(2),
                dir_count: Some(2),
                ..Default::default()
            }),
        )
        .unwrap();

        let key = storage.generate_key(&Attachment::new("/tmp/a")).await.unwrap();
        assert_eq!(key.split('/').count(), 3);
    }
}
