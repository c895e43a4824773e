//! Signed direct-upload policies
//!
//! A client asks for a policy, posts the file straight to the bucket with
//! it, then hands the policy back so the stored object can be recorded.
//! Policies are base64 JSON signed with HMAC-SHA1 over the base64 string.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha1::Sha1;
use tracing::{debug, instrument, warn};

use super::S3Storage;
use crate::backend::StorageBackend;
use crate::error::{PolicyError, StorageError, StorageResult};
use crate::model::{Attachment, Metadata};

type HmacSha1 = Hmac<Sha1>;

/// Upper bound of the size range condition when only a minimum is set
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 5 * 1024 * 1024;

/// Everything a client needs to upload directly to the bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectUpload {
    pub key: String,
    pub acl: String,
    pub url: String,
    pub access_key_id: String,
    pub policy: String,
    pub signature: String,
    pub success_action_status: String,
    pub max_size: Option<u64>,
    pub min_size: Option<u64>,
    pub types: Vec<String>,
    pub min_width: Option<u32>,
    pub min_height: Option<u32>,
}

/// Policy handed back by the client after uploading
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectUploadPayload {
    #[serde(default)]
    pub policy: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
}

impl DirectUploadPayload {
    pub fn new(policy: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            policy: Some(policy.into()),
            signature: Some(signature.into()),
        }
    }
}

impl From<&DirectUpload> for DirectUploadPayload {
    fn from(upload: &DirectUpload) -> Self {
        Self::new(upload.policy.clone(), upload.signature.clone())
    }
}

/// base64(HMAC-SHA1(secret, policy))
pub fn sign_policy(secret: &str, policy: &str) -> StorageResult<String> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|e| StorageError::Configuration(format!("Invalid signing secret: {}", e)))?;
    mac.update(policy.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Check a client-supplied signature in constant time
pub fn verify_policy(secret: &str, policy: &str, signature: &str) -> StorageResult<bool> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|e| StorageError::Configuration(format!("Invalid signing secret: {}", e)))?;
    mac.update(policy.as_bytes());

    let Ok(expected) = STANDARD.decode(signature) else {
        return Ok(false);
    };
    Ok(mac.verify_slice(&expected).is_ok())
}

/// Expiration instant `secs` from now, `None` when it cannot be represented
pub fn expires_in(secs: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(secs).ok()?;
    Utc::now().checked_add_signed(Duration::try_seconds(secs)?)
}

/// Serialize and base64-encode a policy document
pub fn encode_policy(expiration: DateTime<Utc>, conditions: Vec<Value>) -> String {
    let document = json!({
        "expiration": expiration.to_rfc3339_opts(SecondsFormat::Millis, true),
        "conditions": conditions,
    });
    STANDARD.encode(document.to_string())
}

pub fn decode_policy(policy: &str) -> Result<Value, PolicyError> {
    let bytes = STANDARD
        .decode(policy)
        .map_err(|e| PolicyError::Malformed(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| PolicyError::Malformed(e.to_string()))
}

/// First condition object carrying a `key`
pub fn policy_key(policy: &Value) -> Result<String, PolicyError> {
    let conditions = policy
        .get("conditions")
        .and_then(Value::as_array)
        .ok_or(PolicyError::ConditionMissing)?;

    conditions
        .iter()
        .filter_map(|condition| condition.get("key").and_then(Value::as_str))
        .find(|key| !key.is_empty())
        .map(str::to_string)
        .ok_or(PolicyError::ConditionMissing)
}

impl S3Storage {
    /// Policy conditions for an upload under `key`
    pub fn policy_conditions(&self, key: &str) -> Vec<Value> {
        let config = &self.config;
        let limits = self.core.limits();

        let mut conditions = vec![
            json!({ "bucket": config.bucket }),
            json!({ "acl": config.acl }),
            json!({ "success_action_status": config.success_action_status }),
            json!({ "key": key }),
        ];

        if let Some(prefix) = config.content_type_starts_with.as_deref().filter(|p| !p.is_empty()) {
            conditions.push(json!(["starts-with", "$Content-Type", prefix]));
        }

        if limits.min_size.is_some() || limits.max_size.is_some() {
            conditions.push(json!([
                "content-length-range",
                limits.min_size.unwrap_or(0),
                limits.max_size.unwrap_or(DEFAULT_MAX_UPLOAD_SIZE),
            ]));
        }

        conditions
    }

    /// Issue a signed policy for a client-side upload
    #[instrument(skip(self, attachment), fields(storage = "s3", bucket = %self.config.bucket))]
    pub async fn direct_upload(&self, attachment: &Attachment) -> StorageResult<DirectUpload> {
        let key = self.generate_key(attachment).await?;
        let expiration = expires_in(self.config.direct_expiration_secs).ok_or_else(|| {
            StorageError::Configuration("Direct upload expiration is out of range".to_string())
        })?;

        let policy = encode_policy(expiration, self.policy_conditions(&key));
        let signature = sign_policy(&self.config.secret_access_key, &policy)?;
        let limits = self.core.limits();

        debug!(key = %key, %expiration, "Direct upload policy issued");

        Ok(DirectUpload {
            key,
            acl: self.config.acl.clone(),
            url: self.bucket_url(),
            access_key_id: self.config.access_key_id.clone(),
            policy,
            signature,
            success_action_status: self.config.success_action_status.clone(),
            max_size: limits.max_size,
            min_size: limits.min_size,
            types: limits.types.clone(),
            min_width: limits.min_width,
            min_height: limits.min_height,
        })
    }

    /// Verify the signature and decode the policy
    pub fn validate_direct_upload_policy(&self, payload: &DirectUploadPayload) -> StorageResult<Value> {
        let (policy, signature) = match (payload.policy.as_deref(), payload.signature.as_deref()) {
            (Some(policy), Some(signature)) if !policy.is_empty() && !signature.is_empty() => {
                (policy, signature)
            }
            _ => return Err(PolicyError::IncompletePayload.into()),
        };

        if !verify_policy(&self.config.secret_access_key, policy, signature)? {
            warn!("Direct upload signature mismatch");
            return Err(PolicyError::SignatureMismatch.into());
        }

        Ok(decode_policy(policy)?)
    }

    /// Verify the payload and recover the key it was issued for
    pub fn validate_direct_upload_policy_key(&self, payload: &DirectUploadPayload) -> StorageResult<String> {
        let policy = self.validate_direct_upload_policy(payload)?;
        Ok(policy_key(&policy)?)
    }

    /// Record an object the client uploaded with a policy from
    /// [`direct_upload`](Self::direct_upload)
    #[instrument(skip(self, payload), fields(storage = "s3", bucket = %self.config.bucket))]
    pub async fn save_by_direct_upload(&self, payload: &DirectUploadPayload) -> StorageResult<Metadata> {
        let key = self.validate_direct_upload_policy_key(payload)?;
        let head = self.store.head(&key).await?;

        if !head.is_success() {
            return Err(StorageError::BackendError(format!(
                "Status code is {}",
                head.status
            )));
        }

        let content_type = head
            .content_type
            .ok_or(PolicyError::RemoteHeaderMissing("content-type"))?;
        let size = head
            .content_length
            .ok_or(PolicyError::RemoteHeaderMissing("content-length"))?;

        debug!(key = %key, size, "Direct upload confirmed");
        Ok(Metadata::new(key, size, Some(content_type)))
    }
}
