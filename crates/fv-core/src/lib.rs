//! # fv-core
//!
//! Core types, traits, and utilities for fieldvault.
//!
//! This crate provides the building blocks shared by the storage and
//! attachment crates:
//! - Document path normalization (`images.0` -> `images`)
//! - The document boundary trait and an in-memory JSON document
//! - Storage configuration loading
//! - Tracing setup

pub mod config;
pub mod document;
pub mod error;
pub mod path;
pub mod telemetry;

pub use document::{Document, JsonDocument};
pub use error::*;
pub use path::schema_path;
