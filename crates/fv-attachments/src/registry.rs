//! Field registry
//!
//! Built once from a [`Schema`]: every attachment field is bound to its
//! backend under its full schema path. The table is immutable afterwards
//! and answers lookups for concrete document paths.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use fv_core::config::StorageSettings;
use fv_core::path::{join, schema_path};
use fv_storage::{FieldShape, Metadata, StorageBackend};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::RegistryError;
use crate::schema::{FieldType, Schema};

/// An attachment field bound to its backend
#[derive(Clone)]
pub struct FieldBinding {
    /// Full schema path
    pub path: String,
    /// Field holds a list of attachments
    pub is_array: bool,
    pub storage: Arc<dyn StorageBackend>,
    /// Shape the backend's metadata takes in the document
    pub shape: FieldShape,
}

impl fmt::Debug for FieldBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldBinding")
            .field("path", &self.path)
            .field("is_array", &self.is_array)
            .field("storage", &self.storage.name())
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegistryOptions {
    /// Detach every attachment before a document is removed
    pub detach_all_on_remove: bool,
}

impl RegistryOptions {
    pub fn from_settings(settings: &StorageSettings) -> Self {
        Self {
            detach_all_on_remove: settings.detach_all_on_remove,
        }
    }
}

/// Immutable table of attachment bindings keyed by schema path
#[derive(Debug, Default)]
pub struct FieldRegistry {
    bindings: HashMap<String, FieldBinding>,
    options: RegistryOptions,
}

impl FieldRegistry {
    pub fn build(schema: &Schema, options: RegistryOptions) -> Result<Self, RegistryError> {
        let mut bindings = HashMap::new();
        Self::register(schema, None, &mut bindings)?;

        debug!(fields = bindings.len(), "Field registry built");
        Ok(Self { bindings, options })
    }

    fn register(
        schema: &Schema,
        parent: Option<&str>,
        bindings: &mut HashMap<String, FieldBinding>,
    ) -> Result<(), RegistryError> {
        for field in schema.fields() {
            let path = join(parent, &field.name);

            match &field.kind {
                FieldType::Plain => {}
                FieldType::Nested(nested) => Self::register(nested, Some(path.as_str()), bindings)?,
                FieldType::Attachment { storage, array } => {
                    if bindings.contains_key(&path) {
                        return Err(RegistryError::DuplicateField(path));
                    }

                    debug!(path = %path, storage = storage.name(), array, "Attachment field registered");
                    bindings.insert(
                        path.clone(),
                        FieldBinding {
                            path,
                            is_array: *array,
                            storage: storage.clone(),
                            shape: storage.describe_fields(),
                        },
                    );
                }
            }
        }
        Ok(())
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    /// Binding for a document path (indices are ignored)
    pub fn field_options(&self, path: &str) -> Option<&FieldBinding> {
        if path.is_empty() {
            return None;
        }
        self.bindings.get(&schema_path(path))
    }

    pub fn storage(&self, path: &str) -> Option<Arc<dyn StorageBackend>> {
        self.field_options(path).map(|binding| binding.storage.clone())
    }

    pub fn can_attach(&self, path: &str) -> bool {
        self.field_options(path).is_some()
    }

    pub fn shape(&self, path: &str) -> Option<&FieldShape> {
        self.field_options(path).map(|binding| &binding.shape)
    }

    /// Derived values (such as an object URL) for stored metadata
    pub fn virtual_fields(&self, path: &str, metadata: &Metadata) -> Option<Map<String, Value>> {
        self.shape(path).map(|shape| shape.virtual_values(metadata))
    }

    /// Registered schema paths, sorted
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.bindings.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fv_storage::MemoryStorage;
    use serde_json::json;

    fn schema(storage: Arc<MemoryStorage>) -> Schema {
        Schema::new()
            .field("title")
            .attachment("preview", storage.clone())
            .attachments("gallery", storage.clone())
            .nested(
                "parts",
                Schema::new()
                    .field("caption")
                    .attachment("file", storage.clone())
                    .nested("extra", Schema::new().attachments("scans", storage)),
            )
    }

    #[test]
    fn test_build_registers_attachment_leaves() {
        let registry =
            FieldRegistry::build(&schema(Arc::new(MemoryStorage::new())), RegistryOptions::default())
                .unwrap();

        assert_eq!(
            registry.paths(),
            vec!["gallery", "parts.extra.scans", "parts.file", "preview"]
        );
        assert!(!registry.field_options("preview").unwrap().is_array);
        assert!(registry.field_options("gallery").unwrap().is_array);
        assert!(!registry.options().detach_all_on_remove);
    }

    #[test]
    fn test_lookups_normalize_paths() {
        let registry =
            FieldRegistry::build(&schema(Arc::new(MemoryStorage::new())), RegistryOptions::default())
                .unwrap();

        assert!(registry.can_attach("preview"));
        assert!(registry.can_attach("gallery.3"));
        assert!(registry.can_attach("parts.0.file"));
        assert!(registry.can_attach("parts.2.extra.scans.1"));
        assert!(!registry.can_attach("title"));
        assert!(!registry.can_attach("parts"));
        assert!(!registry.can_attach("unknown"));
        assert!(!registry.can_attach(""));

        assert_eq!(registry.storage("parts.1.file").unwrap().name(), "memory");
        assert!(registry.storage("parts.caption").is_none());
    }

    #[test]
    fn test_duplicate_field() {
        let storage = Arc::new(MemoryStorage::new());
        let schema = Schema::new()
            .attachment("avatar", storage.clone())
            .attachments("avatar", storage);

        let result = FieldRegistry::build(&schema, RegistryOptions::default());
        assert_eq!(result.unwrap_err(), RegistryError::DuplicateField("avatar".into()));
    }

    #[test]
    fn test_shape_and_virtual_fields() {
        let storage = Arc::new(
            MemoryStorage::new()
                .with_shape(FieldShape::standard().with_virtual("url", "https://cdn.example.com")),
        );
        let registry = FieldRegistry::build(
            &Schema::new().attachment("photo", storage),
            RegistryOptions { detach_all_on_remove: true },
        )
        .unwrap();

        let shape = registry.shape("photo").unwrap();
        assert!(shape.field("key").unwrap().required);

        let values = registry
            .virtual_fields("photo", &Metadata::new("a/b.png", 3, None))
            .unwrap();
        assert_eq!(values.get("url"), Some(&json!("https://cdn.example.com/a/b.png")));
        assert!(registry.options().detach_all_on_remove);
    }

    #[test]
    fn test_options_from_settings() {
        let settings = StorageSettings {
            detach_all_on_remove: true,
            ..Default::default()
        };
        assert!(RegistryOptions::from_settings(&settings).detach_all_on_remove);
    }
}
