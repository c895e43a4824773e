//! Storage errors

use fv_core::BoxError;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Key is undefined")]
    MissingKey,
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("Storage configuration error: {0}")]
    Configuration(String),
    #[error("Storage backend error: {0}")]
    BackendError(String),
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),
    #[error("Transformation {stage} failed: {source}")]
    Transformation {
        stage: String,
        #[source]
        source: BoxError,
    },
    #[error("Direct upload error: {0}")]
    Policy(#[from] PolicyError),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Attachment rejected by the backend's constraints
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Type of file is undefined")]
    TypeUndefined,
    #[error("Type {actual} is not allowed (allowed: {allowed:?})")]
    TypeNotAllowed { actual: String, allowed: Vec<String> },
    #[error("File size {size} is bigger than maxSize {max}")]
    TooLarge { size: u64, max: u64 },
    #[error("File size {size} is smaller than minSize {min}")]
    TooSmall { size: u64, min: u64 },
}

/// Direct-upload policy errors
///
/// None of these are retryable: the client has to request a new policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Direct upload payload is missing policy or signature")]
    IncompletePayload,
    #[error("Policy signature does not match")]
    SignatureMismatch,
    #[error("Policy is malformed: {0}")]
    Malformed(String),
    #[error("Policy conditions do not define a key")]
    ConditionMissing,
    #[error("Object header {0} is missing")]
    RemoteHeaderMissing(&'static str),
}

impl StorageError {
    pub fn error_code(&self) -> &'static str {
        match self {
            StorageError::NotFound(_) => "not_found",
            StorageError::IoError(_) => "io_error",
            StorageError::MissingKey => "missing_key",
            StorageError::InvalidKey(_) => "invalid_key",
            StorageError::Configuration(_) => "configuration_error",
            StorageError::BackendError(_) => "backend_error",
            StorageError::KeyGeneration(_) => "key_generation_failed",
            StorageError::Transformation { .. } => "transformation_failed",
            StorageError::Policy(PolicyError::IncompletePayload) => "policy_incomplete",
            StorageError::Policy(PolicyError::SignatureMismatch) => "policy_signature_mismatch",
            StorageError::Policy(PolicyError::Malformed(_)) => "policy_malformed",
            StorageError::Policy(PolicyError::ConditionMissing) => "policy_condition_missing",
            StorageError::Policy(PolicyError::RemoteHeaderMissing(_)) => "remote_header_missing",
        }
    }
}
