//! # fv-attachments
//!
//! Binds stored files to fields of structured documents.
//!
//! A [`Schema`] declares which fields hold attachments and which backend
//! stores them. The [`FieldRegistry`] built from it resolves concrete
//! document paths (`parts.0.file`) to their binding, and the
//! [`AttachmentService`] runs attach, detach and detach-all against any
//! [`fv_core::Document`].

pub mod error;
pub mod registry;
pub mod schema;
pub mod service;

pub use error::{AttachmentError, AttachmentResult, RegistryError};
pub use registry::{FieldBinding, FieldRegistry, RegistryOptions};
pub use schema::{FieldType, Schema, SchemaField};
pub use service::AttachmentService;
