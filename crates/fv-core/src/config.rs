//! Configuration types and loading
//!
//! Settings for storage backends, key generation, validation limits and the
//! field registry. Loaded from environment variables or from a config file
//! with an environment overlay.

use serde::{Deserialize, Serialize};

/// Storage configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Local filesystem backend
    pub file: Option<FileStorageConfig>,

    /// S3-compatible object storage backend
    pub s3: Option<S3Config>,

    /// Key generation
    pub keys: KeyConfig,

    /// Validation limits, also echoed to direct-upload clients
    pub limits: LimitsConfig,

    /// Detach every attachment before a document is removed
    pub detach_all_on_remove: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileStorageConfig {
    /// Root directory for stored files
    pub path: String,
    /// Copy the source file instead of moving it
    #[serde(default)]
    pub copy: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct S3Config {
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub path_style: bool,
    #[serde(default = "default_acl")]
    pub acl: String,
    /// Lifetime of direct-upload policies
    #[serde(default = "default_direct_expiration_secs")]
    pub direct_expiration_secs: u64,
    #[serde(default = "default_success_action_status")]
    pub success_action_status: String,
    #[serde(default)]
    pub content_type_starts_with: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_acl() -> String {
    "public-read".to_string()
}

fn default_direct_expiration_secs() -> u64 {
    60 * 60
}

fn default_success_action_status() -> String {
    "201".to_string()
}

impl S3Config {
    pub fn new(
        bucket: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            region: default_region(),
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            endpoint: None,
            path_style: false,
            acl: default_acl(),
            direct_expiration_secs: default_direct_expiration_secs(),
            success_action_status: default_success_action_status(),
            content_type_starts_with: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Append a random UUID to the generated token
    pub secured: bool,
    /// Fixed prefix for every key
    pub key_path: Option<String>,
    /// Length of each shard directory name
    pub dir_length: Option<usize>,
    /// Number of shard directories
    pub dir_count: Option<usize>,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            secured: true,
            key_path: None,
            dir_length: None,
            dir_count: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Allowed content types (empty = allow all)
    pub types: Vec<String>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub min_width: Option<u32>,
    pub min_height: Option<u32>,
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Environment variable not set: {0}")]
    MissingEnvVar(String),
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
    #[error("Config file error: {0}")]
    FileError(#[from] config::ConfigError),
}

const ENV_PREFIX: &str = "FIELDVAULT";

fn env(name: &str) -> Option<String> {
    std::env::var(format!("{}_{}", ENV_PREFIX, name)).ok()
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env(name) {
        Some(raw) => raw.parse().map(Some).map_err(|e: T::Err| ConfigError::InvalidValue {
            key: format!("{}_{}", ENV_PREFIX, name),
            message: e.to_string(),
        }),
        None => Ok(None),
    }
}

fn parse_bool(v: &str) -> bool {
    v == "true" || v == "1" || v == "yes"
}

impl StorageSettings {
    /// Load configuration from `FIELDVAULT_*` environment variables
    ///
    /// A `.env` file in the working directory is read first when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let mut settings = Self::default();

        // File storage
        if let Some(path) = env("FILE_PATH") {
            settings.file = Some(FileStorageConfig {
                path,
                copy: env("FILE_COPY").map(|v| parse_bool(&v)).unwrap_or(false),
            });
        }

        // S3 storage
        if let Some(bucket) = env("S3_BUCKET") {
            let access_key_id = env("S3_ACCESS_KEY_ID")
                .ok_or_else(|| ConfigError::MissingEnvVar(format!("{}_S3_ACCESS_KEY_ID", ENV_PREFIX)))?;
            let secret_access_key = env("S3_SECRET_ACCESS_KEY").ok_or_else(|| {
                ConfigError::MissingEnvVar(format!("{}_S3_SECRET_ACCESS_KEY", ENV_PREFIX))
            })?;

            let mut s3 = S3Config::new(bucket, access_key_id, secret_access_key);
            if let Some(region) = env("S3_REGION") {
                s3.region = region;
            }
            s3.endpoint = env("S3_ENDPOINT");
            s3.path_style = env("S3_PATH_STYLE").map(|v| parse_bool(&v)).unwrap_or(false);
            if let Some(acl) = env("S3_ACL") {
                s3.acl = acl;
            }
            if let Some(secs) = parse_env("S3_DIRECT_EXPIRATION_SECS")? {
                s3.direct_expiration_secs = secs;
            }
            if let Some(status) = env("S3_SUCCESS_ACTION_STATUS") {
                s3.success_action_status = status;
            }
            s3.content_type_starts_with = env("S3_CONTENT_TYPE_STARTS_WITH");
            settings.s3 = Some(s3);
        }

        // Keys
        if let Some(v) = env("KEY_SECURED") {
            settings.keys.secured = parse_bool(&v);
        }
        settings.keys.key_path = env("KEY_PATH");
        settings.keys.dir_length = parse_env("KEY_DIR_LENGTH")?;
        settings.keys.dir_count = parse_env("KEY_DIR_COUNT")?;

        // Limits
        if let Some(types) = env("TYPES") {
            settings.limits.types = types
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
        }
        settings.limits.min_size = parse_env("MIN_SIZE")?;
        settings.limits.max_size = parse_env("MAX_SIZE")?;
        settings.limits.min_width = parse_env("MIN_WIDTH")?;
        settings.limits.min_height = parse_env("MIN_HEIGHT")?;

        if let Some(v) = env("DETACH_ALL_ON_REMOVE") {
            settings.detach_all_on_remove = parse_bool(&v);
        }

        Ok(settings)
    }

    /// Load configuration from a file (TOML, YAML or JSON, by extension)
    /// overlaid with `FIELDVAULT__SECTION__KEY` environment variables.
    ///
    /// A missing file is not an error; the defaults are used instead.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = StorageSettings::default();
        assert!(settings.file.is_none());
        assert!(settings.s3.is_none());
        assert!(settings.keys.secured);
        assert!(settings.limits.types.is_empty());
        assert!(!settings.detach_all_on_remove);
    }

    #[test]
    fn test_s3_defaults() {
        let s3 = S3Config::new("bucket", "key", "secret");
        assert_eq!(s3.acl, "public-read");
        assert_eq!(s3.direct_expiration_secs, 3600);
        assert_eq!(s3.success_action_status, "201");
        assert_eq!(s3.region, "us-east-1");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
detach_all_on_remove = true

[file]
path = "/var/fieldvault"
copy = true

[s3]
bucket = "uploads"
access_key_id = "AKIA"
secret_access_key = "secret"

[keys]
secured = false
dir_length = 2
dir_count = 3

[limits]
types = ["image/png", "image/jpeg"]
max_size = 1048576
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let settings = StorageSettings::load(&path).unwrap();

        assert!(settings.detach_all_on_remove);
        let fs = settings.file.unwrap();
        assert_eq!(fs.path, "/var/fieldvault");
        assert!(fs.copy);

        let s3 = settings.s3.unwrap();
        assert_eq!(s3.bucket, "uploads");
        assert_eq!(s3.acl, "public-read");
        assert_eq!(s3.direct_expiration_secs, 3600);

        assert!(!settings.keys.secured);
        assert_eq!(settings.keys.dir_length, Some(2));
        assert_eq!(settings.keys.dir_count, Some(3));
        assert_eq!(settings.limits.types.len(), 2);
        assert_eq!(settings.limits.max_size, Some(1048576));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let settings = StorageSettings::load("/nonexistent/fieldvault-config").unwrap();
        assert!(settings.file.is_none());
        assert!(settings.keys.secured);
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool("1"));
        assert!(parse_bool("yes"));
        assert!(!parse_bool("no"));
    }
}
