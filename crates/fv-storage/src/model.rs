//! Attachment Model
//!
//! [`Attachment`] is the transient input of an attach call, [`Metadata`] is
//! what ends up stored on the document field.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{StorageError, StorageResult};

/// Metadata keys owned by the backend's `save` result
const RESERVED_KEYS: [&str; 3] = ["key", "size", "type"];

/// A file waiting to be attached
#[derive(Debug, Clone, Default)]
pub struct Attachment {
    /// Location of the local (usually temporary) source file
    pub path: PathBuf,
    /// Storage key; generated by the backend when not supplied
    pub key: Option<String>,
    /// MIME content type; guessed from the filename when not supplied
    pub content_type: Option<String>,
    /// Size in bytes; read from the filesystem when not supplied
    pub size: Option<u64>,
    /// Name of the file as uploaded, used for type inference
    pub original_filename: Option<String>,
    /// Per-upload ACL override (object storage)
    pub acl: Option<String>,
    /// Additional values passed through to backends and transformations
    pub extra: Map<String, Value>,
}

impl Attachment {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn content_type(mut self, ct: impl Into<String>) -> Self {
        self.content_type = Some(ct.into());
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn original_filename(mut self, name: impl Into<String>) -> Self {
        self.original_filename = Some(name.into());
        self
    }

    pub fn acl(mut self, acl: impl Into<String>) -> Self {
        self.acl = Some(acl.into());
        self
    }

    pub fn extra(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extra.insert(name.into(), value);
        self
    }

    /// Guess the content type from the original filename, falling back to
    /// the source path. Unknown extensions yield `None`.
    pub fn guess_content_type(&self) -> Option<String> {
        let name = self
            .original_filename
            .as_deref()
            .map(Path::new)
            .unwrap_or(self.path.as_path());

        mime_guess::from_path(name).first().map(|m| m.to_string())
    }

    /// The resolved key, failing when none has been assigned yet
    pub fn require_key(&self) -> StorageResult<&str> {
        match self.key.as_deref() {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(StorageError::MissingKey),
        }
    }
}

/// Metadata recorded on the document in place of the file bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Backend-assigned storage key
    pub key: String,
    /// File size in bytes
    #[serde(default)]
    pub size: u64,
    /// MIME content type
    #[serde(rename = "type", default)]
    pub content_type: Option<String>,
    /// Backend or transformation specific values
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Metadata {
    pub fn new(key: impl Into<String>, size: u64, content_type: Option<String>) -> Self {
        Self {
            key: key.into(),
            size,
            content_type,
            extra: Map::new(),
        }
    }

    /// Metadata for an attachment whose key, size and type are resolved
    pub fn from_attachment(attachment: &Attachment) -> StorageResult<Self> {
        Ok(Self::new(
            attachment.require_key()?,
            attachment.size.unwrap_or_default(),
            attachment.content_type.clone(),
        ))
    }

    /// Shallow-merge this metadata over an accumulated fragment.
    ///
    /// Values of `self` win on key collisions; `key`, `size` and `type`
    /// always come from `self`.
    pub fn merged_over(self, mut base: Map<String, Value>) -> Self {
        for reserved in RESERVED_KEYS {
            base.remove(reserved);
        }
        base.extend(self.extra);
        Self {
            key: self.key,
            size: self.size,
            content_type: self.content_type,
            extra: base,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Parse a value read back from a document field.
    ///
    /// Only `key` is required. `size` may be missing or a numeric string
    /// (header values recorded by direct uploads) and then reads as 0 when
    /// it cannot be parsed.
    pub fn from_stored(value: Value) -> StorageResult<Self> {
        let Value::Object(mut fields) = value else {
            return Err(StorageError::MissingKey);
        };

        let key = match fields.remove("key") {
            Some(Value::String(key)) if !key.is_empty() => key,
            _ => return Err(StorageError::MissingKey),
        };
        let size = match fields.remove("size") {
            Some(Value::Number(n)) => n.as_u64().unwrap_or_default(),
            Some(Value::String(s)) => s.trim().parse().unwrap_or_default(),
            _ => 0,
        };
        let content_type = match fields.remove("type") {
            Some(Value::String(t)) => Some(t),
            _ => None,
        };

        Ok(Self {
            key,
            size,
            content_type,
            extra: fields,
        })
    }
}

/// Value type of a document field contributed by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Number,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind, required: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            required,
        }
    }
}

/// Derived field computed as `<base_url>/<key>`, never stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualField {
    pub name: String,
    pub base_url: String,
}

impl VirtualField {
    pub fn compute(&self, metadata: &Metadata) -> Value {
        Value::String(format!("{}/{}", self.base_url, metadata.key))
    }
}

/// Structural shape a backend requires of its document field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldShape {
    pub fields: Vec<FieldSpec>,
    pub virtuals: Vec<VirtualField>,
}

impl Default for FieldShape {
    fn default() -> Self {
        Self::standard()
    }
}

impl FieldShape {
    /// `key` and `size` required, `type` optional
    pub fn standard() -> Self {
        Self {
            fields: vec![
                FieldSpec::new("key", FieldKind::String, true),
                FieldSpec::new("size", FieldKind::Number, true),
                FieldSpec::new("type", FieldKind::String, false),
            ],
            virtuals: Vec::new(),
        }
    }

    /// Mark the `type` field as required
    pub fn require_type(mut self) -> Self {
        for field in &mut self.fields {
            if field.name == "type" {
                field.required = true;
            }
        }
        self
    }

    pub fn with_virtual(mut self, name: impl Into<String>, base_url: impl Into<String>) -> Self {
        self.virtuals.push(VirtualField {
            name: name.into(),
            base_url: base_url.into(),
        });
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Compute every virtual field for a stored metadata record
    pub fn virtual_values(&self, metadata: &Metadata) -> Map<String, Value> {
        self.virtuals
            .iter()
            .map(|v| (v.name.clone(), v.compute(metadata)))
            .collect()
    }
}
