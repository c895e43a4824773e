//! Attachment Service
//!
//! Orchestrates attaching files to document fields, detaching them and
//! clearing every attachment of a document. Physical I/O is delegated to
//! the backend bound to the field; the document only ever holds metadata.

use std::cmp::Reverse;
use std::sync::Arc;

use fv_core::document::Document;
use fv_core::path::{join, split_index};
use fv_storage::{Attachment, Metadata, StorageBackend, StorageError};
use futures::future::join_all;
use serde_json::Value;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::{AttachmentError, AttachmentResult};
use crate::registry::{FieldBinding, FieldRegistry};

/// A stored attachment scheduled for removal by detach-all
struct DetachTarget {
    path: String,
    /// Parent array path and element index for array fields
    element: Option<(String, usize)>,
    value: Value,
    storage: Arc<dyn StorageBackend>,
}

/// Attachment service
#[derive(Debug, Clone)]
pub struct AttachmentService {
    registry: Arc<FieldRegistry>,
}

impl AttachmentService {
    pub fn new(registry: Arc<FieldRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    pub fn can_attach(&self, path: &str) -> bool {
        self.registry.can_attach(path)
    }

    fn binding(&self, path: &str) -> AttachmentResult<&FieldBinding> {
        self.registry
            .field_options(path)
            .ok_or_else(|| AttachmentError::BindingNotFound(path.to_string()))
    }

    /// Store a file and record its metadata at `path`
    ///
    /// Stages run in order and the first failure aborts. Nothing is rolled
    /// back: a stored object stays stored when a later stage fails.
    #[instrument(skip(self, doc, attachment), fields(source = ?attachment.path))]
    pub async fn attach<D: Document + ?Sized>(
        &self,
        doc: &mut D,
        path: &str,
        mut attachment: Attachment,
        persist: bool,
    ) -> AttachmentResult<Metadata> {
        let binding = self.binding(path)?;
        let storage = &binding.storage;

        // Attach targets the field itself, never an element of it
        if split_index(path).is_some() {
            return Err(AttachmentError::InvalidIndex(path.to_string()));
        }

        if !fs::try_exists(&attachment.path).await? {
            return Err(AttachmentError::SourceNotFound(attachment.path));
        }

        let key = storage
            .generate_key(&attachment)
            .await
            .map_err(AttachmentError::KeyGeneration)?;
        attachment.key = Some(key);

        if attachment.content_type.is_none() {
            attachment.content_type = attachment.guess_content_type();
        }

        if attachment.size.is_none() {
            attachment.size = Some(fs::metadata(&attachment.path).await?.len());
        }

        storage.validate(&attachment)?;

        let transformed = storage
            .transform(&attachment)
            .await
            .map_err(AttachmentError::Transformation)?;

        let metadata = storage
            .save(&attachment)
            .await
            .map_err(AttachmentError::Save)?
            .merged_over(transformed);

        debug!(key = %metadata.key, storage = storage.name(), "Attachment stored");

        if binding.is_array {
            let mut items = match doc.get(path) {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            };
            items.push(metadata.to_value());
            doc.set(path, Value::Array(items))?;
        } else {
            if let Some(previous) = doc.get(path).filter(|v| !v.is_null()) {
                let previous = Metadata::from_stored(previous).map_err(AttachmentError::Remove)?;
                storage
                    .remove(&previous)
                    .await
                    .map_err(AttachmentError::Remove)?;
                debug!(key = %previous.key, "Replaced attachment removed");
            }
            doc.set(path, metadata.to_value())?;
        }

        if persist {
            doc.save().await.map_err(AttachmentError::Persistence)?;
        }

        info!(key = %metadata.key, size = metadata.size, "Attachment attached");
        Ok(metadata)
    }

    /// Remove the stored object at `path` and clear its metadata
    ///
    /// Array fields need the element index as the last path segment.
    /// Returns false when nothing was attached.
    #[instrument(skip(self, doc))]
    pub async fn detach<D: Document + ?Sized>(&self, doc: &mut D, path: &str) -> AttachmentResult<bool> {
        let binding = self.binding(path)?;

        let current = match doc.get(path) {
            None | Some(Value::Null) => {
                debug!("Nothing attached");
                return Ok(false);
            }
            Some(value) => value,
        };

        let element = if binding.is_array {
            let (parent, index) =
                split_index(path).ok_or_else(|| AttachmentError::InvalidIndex(path.to_string()))?;
            Some((parent.to_string(), index))
        } else {
            None
        };

        let metadata = Metadata::from_stored(current).map_err(AttachmentError::Remove)?;
        binding
            .storage
            .remove(&metadata)
            .await
            .map_err(AttachmentError::Remove)?;

        match element {
            Some((parent, index)) => splice(doc, &parent, index)?,
            None => doc.unset(path),
        }

        info!(key = %metadata.key, "Attachment detached");
        Ok(true)
    }

    /// Detach every attachment found in the document
    ///
    /// Removals run concurrently; metadata is cleared for each one that
    /// succeeded. The first failure, in document order, is returned once
    /// all removals have finished. Returns the number of detached items.
    #[instrument(skip(self, doc))]
    pub async fn detach_all<D: Document + ?Sized>(&self, doc: &mut D) -> AttachmentResult<usize> {
        let snapshot = doc.snapshot();
        let mut targets = Vec::new();
        self.collect_targets(&snapshot, None, &mut targets);

        debug!(targets = targets.len(), "Detaching all attachments");

        let results = join_all(targets.iter().map(|target| async move {
            match Metadata::from_stored(target.value.clone()) {
                Ok(metadata) => target.storage.remove(&metadata).await,
                Err(e) => Err(e),
            }
        }))
        .await;

        let mut first_error: Option<StorageError> = None;
        let mut scalars = Vec::new();
        let mut elements = Vec::new();

        for (target, result) in targets.iter().zip(results) {
            match result {
                Ok(()) => match &target.element {
                    Some((parent, index)) => elements.push((parent.as_str(), *index)),
                    None => scalars.push(target.path.as_str()),
                },
                Err(e) => {
                    warn!(path = %target.path, error = %e, "Detach failed");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        for path in &scalars {
            doc.unset(path);
        }

        // highest index first so earlier indices stay valid
        elements.sort_by_key(|&(_, index)| Reverse(index));
        for (parent, index) in &elements {
            splice(doc, parent, *index)?;
        }

        match first_error {
            Some(e) => Err(AttachmentError::Remove(e)),
            None => {
                let detached = scalars.len() + elements.len();
                info!(detached, "All attachments detached");
                Ok(detached)
            }
        }
    }

    fn collect_targets(&self, value: &Value, parent: Option<&str>, targets: &mut Vec<DetachTarget>) {
        let Value::Object(map) = value else {
            return;
        };

        for (key, child) in map {
            if !child.is_object() && !child.is_array() {
                continue;
            }

            let path = join(parent, key);

            if let Some(binding) = self.registry.field_options(&path) {
                match child {
                    Value::Array(items) if binding.is_array => {
                        for (index, item) in items.iter().enumerate() {
                            if item.is_null() {
                                continue;
                            }
                            targets.push(DetachTarget {
                                path: join(Some(path.as_str()), &index.to_string()),
                                element: Some((path.clone(), index)),
                                value: item.clone(),
                                storage: binding.storage.clone(),
                            });
                        }
                    }
                    _ => targets.push(DetachTarget {
                        path: path.clone(),
                        element: None,
                        value: child.clone(),
                        storage: binding.storage.clone(),
                    }),
                }
                continue;
            }

            // arrays of sub-documents are not searched
            if child.is_object() {
                self.collect_targets(child, Some(path.as_str()), targets);
            }
        }
    }

    /// Hook to run before a document is removed
    pub async fn before_remove<D: Document + ?Sized>(&self, doc: &mut D) -> AttachmentResult<()> {
        if self.registry.options().detach_all_on_remove {
            self.detach_all(doc).await?;
        }
        Ok(())
    }

    /// [`attach`](Self::attach) holding the document lock for the whole call
    pub async fn attach_exclusive<D: Document>(
        &self,
        doc: &Mutex<D>,
        path: &str,
        attachment: Attachment,
        persist: bool,
    ) -> AttachmentResult<Metadata> {
        let mut guard = doc.lock().await;
        self.attach(&mut *guard, path, attachment, persist).await
    }

    /// [`detach`](Self::detach) holding the document lock for the whole call
    pub async fn detach_exclusive<D: Document>(&self, doc: &Mutex<D>, path: &str) -> AttachmentResult<bool> {
        let mut guard = doc.lock().await;
        self.detach(&mut *guard, path).await
    }

    /// [`detach_all`](Self::detach_all) holding the document lock for the whole call
    pub async fn detach_all_exclusive<D: Document>(&self, doc: &Mutex<D>) -> AttachmentResult<usize> {
        let mut guard = doc.lock().await;
        self.detach_all(&mut *guard).await
    }
}

/// Remove one element from the array at `parent`
fn splice<D: Document + ?Sized>(doc: &mut D, parent: &str, index: usize) -> AttachmentResult<()> {
    match doc.get(parent) {
        Some(Value::Array(mut items)) if index < items.len() => {
            items.remove(index);
            doc.set(parent, Value::Array(items))?;
            Ok(())
        }
        _ => Err(AttachmentError::InvalidIndex(join(Some(parent), &index.to_string()))),
    }
}
