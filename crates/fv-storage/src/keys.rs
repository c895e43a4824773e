//! Storage key generation
//!
//! Keys are built from a process-unique token (timestamp, process
//! fingerprint and a rolling counter, base 36), optionally followed by a
//! random UUID, and then reversed character by character. Existing stored
//! keys use this layout, so the reversal must stay.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use fv_core::config::KeyConfig;
use uuid::Uuid;

const DIRECTORY_SEPARATOR: &str = "/";
const COUNTER_WIDTH: usize = 4;
const COUNTER_MODULUS: u64 = 36 * 36 * 36 * 36;

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn padded_base36(value: u64, width: usize) -> String {
    format!("{:0>width$}", to_base36(value), width = width)
}

/// Split the front of a key into `dir_count` directory names of
/// `dir_length` characters each.
///
/// Returns `None` when the key is shorter than `dir_length * dir_count`.
pub fn key_to_dirs(key: &str, dir_length: usize, dir_count: usize) -> Option<String> {
    if dir_length == 0 || dir_count == 0 {
        return None;
    }

    let needed = dir_length.checked_mul(dir_count)?;
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < needed {
        return None;
    }

    let dirs: Vec<String> = chars
        .chunks(dir_length)
        .take(dir_count)
        .map(|chunk| chunk.iter().collect())
        .collect();

    Some(dirs.join(DIRECTORY_SEPARATOR))
}

/// Per-backend key generator
#[derive(Debug)]
pub struct KeyGenerator {
    config: KeyConfig,
    fingerprint: String,
    counter: AtomicU64,
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new(KeyConfig::default())
    }
}

impl KeyGenerator {
    pub fn new(config: KeyConfig) -> Self {
        let instance = Uuid::new_v4().simple().to_string();
        let fingerprint = format!(
            "{}{}",
            padded_base36(u64::from(std::process::id()) % COUNTER_MODULUS, COUNTER_WIDTH),
            &instance[..4]
        );

        Self {
            config,
            fingerprint,
            counter: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &KeyConfig {
        &self.config
    }

    fn next_count(&self) -> String {
        let count = self.counter.fetch_add(1, Ordering::Relaxed) % COUNTER_MODULUS;
        padded_base36(count, COUNTER_WIDTH)
    }

    /// Process-unique token: timestamp + counter, with the process
    /// fingerprint in between unless `short`
    pub fn token(&self, short: bool) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        if short {
            format!("{}{}", to_base36(millis), self.next_count())
        } else {
            format!("{}{}{}", to_base36(millis), self.fingerprint, self.next_count())
        }
    }

    /// Generate the bare (unprefixed) key
    pub fn raw_key(&self) -> String {
        let key = if self.config.secured {
            format!("{}-{}", self.token(false), Uuid::new_v4())
        } else {
            self.token(true)
        };

        key.chars().rev().collect()
    }

    /// Apply the configured key path or directory sharding to a key
    pub fn place(&self, key: String) -> String {
        if let Some(prefix) = self.config.key_path.as_deref().filter(|p| !p.is_empty()) {
            return format!(
                "{}{}{}",
                prefix.trim_end_matches(DIRECTORY_SEPARATOR),
                DIRECTORY_SEPARATOR,
                key
            );
        }

        if let (Some(dir_length), Some(dir_count)) = (self.config.dir_length, self.config.dir_count) {
            if let Some(dirs) = key_to_dirs(&key, dir_length, dir_count) {
                return format!("{}{}{}", dirs, DIRECTORY_SEPARATOR, key);
            }
        }

        key
    }

    /// Generate a new unique key
    pub fn generate(&self) -> String {
        self.place(self.raw_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(padded_base36(1, 4), "0001");
    }

    #[test]
    fn test_key_to_dirs() {
        assert_eq!(key_to_dirs("abcdefgh", 2, 3), Some("ab/cd/ef".to_string()));
        assert_eq!(key_to_dirs("abcdef", 2, 3), Some("ab/cd/ef".to_string()));
        assert_eq!(key_to_dirs("abcde", 2, 3), None);
        assert_eq!(key_to_dirs("abcdef", 0, 3), None);
        assert_eq!(key_to_dirs("abcdef", usize::MAX, 2), None);
    }

    #[test]
    fn test_secured_key_is_reversed_uuid() {
        let generator = KeyGenerator::default();
        let key = generator.generate();

        // reversed: the UUID comes first, then the token
        let (uuid_part, token_part) = key.split_at(36);
        let uuid: String = uuid_part.chars().rev().collect();
        assert!(Uuid::parse_str(&uuid).is_ok());
        assert!(token_part.starts_with('-'));
    }

    #[test]
    fn test_short_key() {
        let generator = KeyGenerator::new(KeyConfig {
            secured: false,
            ..Default::default()
        });
        let key = generator.generate();
        assert!(!key.contains('-'));
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
        // counter is the last part of the token, so it leads after reversal
        assert!(key.starts_with("0000"));
    }

    #[test]
    fn test_keys_are_unique() {
        let generator = KeyGenerator::new(KeyConfig {
            secured: false,
            ..Default::default()
        });
        let keys: HashSet<String> = (0..1000).map(|_| generator.generate()).collect();
        assert_eq!(keys.len(), 1000);
    }

    #[test]
    fn test_key_path_prefix() {
        let generator = KeyGenerator::new(KeyConfig {
            key_path: Some("uploads/".to_string()),
            dir_length: Some(2),
            dir_count: Some(2),
            ..Default::default()
        });
        let key = generator.generate();
        assert!(key.starts_with("uploads/"));
        assert_eq!(key.matches('/').count(), 1);
    }

    #[test]
    fn test_sharded_key() {
        let generator = KeyGenerator::new(KeyConfig {
            dir_length: Some(2),
            dir_count: Some(3),
            ..Default::default()
        });
        let key = generator.generate();
        let parts: Vec<&str> = key.split('/').collect();
        assert_eq!(parts.len(), 4);
        assert!(parts[..3].iter().all(|p| p.len() == 2));
        assert!(parts[3].starts_with(&format!("{}{}{}", parts[0], parts[1], parts[2])));
    }

    #[test]
    fn test_place_skips_sharding_for_short_keys() {
        let generator = KeyGenerator::new(KeyConfig {
            dir_length: Some(4),
            dir_count: Some(4),
            ..Default::default()
        });
        assert_eq!(generator.place("short".to_string()), "short");
        assert_eq!(
            generator.place("abcdefghijklmnopq".to_string()),
            "abcd/efgh/ijkl/mnop/abcdefghijklmnopq"
        );
    }
}
