//! # fv-storage
//!
//! Storage backends for fieldvault attachments.
//!
//! Every backend implements [`StorageBackend`]: key generation, validation
//! and transformation come from the shared [`StorageCore`], physical I/O is
//! backend specific.
//!
//! Backends:
//! - [`LocalStorage`]: files under a root directory
//! - [`S3Storage`]: S3-compatible object storage with signed direct uploads
//! - [`MemoryStorage`]: in-memory, for tests

pub mod backend;
pub mod error;
pub mod keys;
pub mod local;
pub mod memory;
pub mod model;
pub mod s3;
pub mod transform;

pub use backend::{KeyFn, StorageBackend, StorageCore, StorageOptions};
pub use error::{PolicyError, StorageError, StorageResult, ValidationError};
pub use keys::KeyGenerator;
pub use local::LocalStorage;
pub use memory::{MemoryStorage, StorageEvent};
pub use model::{Attachment, FieldKind, FieldShape, FieldSpec, Metadata, VirtualField};
pub use s3::{DirectUpload, DirectUploadPayload, ObjectHead, ObjectStore, S3Storage};
pub use transform::{DigestTransformation, Transformation};
