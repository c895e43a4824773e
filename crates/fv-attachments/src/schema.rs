//! Schema description
//!
//! Documents declare which of their fields hold attachments and which
//! backend stores them. Nested schemas describe sub-documents; a nested
//! schema used for array elements is declared the same way, since indices
//! never appear in schema paths.

use std::fmt;
use std::sync::Arc;

use fv_storage::StorageBackend;

/// Kind of a declared field
#[derive(Clone)]
pub enum FieldType {
    /// Ordinary value, ignored by the attachment engine
    Plain,
    /// Attachment metadata, stored by `storage`
    Attachment {
        storage: Arc<dyn StorageBackend>,
        array: bool,
    },
    /// Sub-document
    Nested(Schema),
}

impl fmt::Debug for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Plain => f.write_str("Plain"),
            FieldType::Attachment { storage, array } => f
                .debug_struct("Attachment")
                .field("storage", &storage.name())
                .field("array", array)
                .finish(),
            FieldType::Nested(schema) => f.debug_tuple("Nested").field(schema).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchemaField {
    pub name: String,
    pub kind: FieldType,
}

/// Ordered list of declared fields
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<SchemaField>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, name: impl Into<String>, kind: FieldType) -> Self {
        self.fields.push(SchemaField {
            name: name.into(),
            kind,
        });
        self
    }

    /// Declare a plain field
    pub fn field(self, name: impl Into<String>) -> Self {
        self.push(name, FieldType::Plain)
    }

    /// Declare a field holding a single attachment
    pub fn attachment(self, name: impl Into<String>, storage: Arc<dyn StorageBackend>) -> Self {
        self.push(name, FieldType::Attachment { storage, array: false })
    }

    /// Declare a field holding a list of attachments
    pub fn attachments(self, name: impl Into<String>, storage: Arc<dyn StorageBackend>) -> Self {
        self.push(name, FieldType::Attachment { storage, array: true })
    }

    /// Declare a sub-document
    pub fn nested(self, name: impl Into<String>, schema: Schema) -> Self {
        self.push(name, FieldType::Nested(schema))
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }
}
