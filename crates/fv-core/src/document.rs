//! Document boundary
//!
//! The attachment engine never owns documents. It reads and writes field
//! values through [`Document`] and asks the document to persist itself.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{DocumentError, DocumentResult};
use crate::path::{is_index, SEPARATOR};

/// Access to a structured document instance
///
/// Paths are dot separated; numeric segments address array elements.
#[async_trait]
pub trait Document: Send + Sync {
    /// Read the value at a path, `None` when absent
    fn get(&self, path: &str) -> Option<Value>;

    /// Write a value at a path, creating missing intermediate objects
    fn set(&mut self, path: &str, value: Value) -> DocumentResult<()>;

    /// Remove the value at a path (no-op when absent)
    fn unset(&mut self, path: &str);

    /// Materialize the whole document as a value tree
    fn snapshot(&self) -> Value;

    /// Persist the document
    async fn save(&mut self) -> DocumentResult<()>;
}

/// In-memory document backed by a JSON value
#[derive(Debug, Clone)]
pub struct JsonDocument {
    root: Value,
    revision: u64,
    fail_saves: bool,
}

impl Default for JsonDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonDocument {
    pub fn new() -> Self {
        Self::from_value(Value::Object(Map::new()))
    }

    pub fn from_value(root: Value) -> Self {
        Self {
            root,
            revision: 0,
            fail_saves: false,
        }
    }

    /// Number of successful saves
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Make every subsequent save fail (testing persistence errors)
    pub fn fail_saves(mut self) -> Self {
        self.fail_saves = true;
        self
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    fn segments(path: &str) -> DocumentResult<Vec<&str>> {
        if path.is_empty() {
            return Err(DocumentError::EmptyPath);
        }
        Ok(path.split(SEPARATOR).collect())
    }

    fn lookup<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
        match value {
            Value::Object(map) => map.get(segment),
            Value::Array(items) if is_index(segment) => {
                segment.parse::<usize>().ok().and_then(|i| items.get(i))
            }
            _ => None,
        }
    }
}

#[async_trait]
impl Document for JsonDocument {
    fn get(&self, path: &str) -> Option<Value> {
        let segments = Self::segments(path).ok()?;
        let mut current = &self.root;
        for segment in segments {
            current = Self::lookup(current, segment)?;
        }
        Some(current.clone())
    }

    fn set(&mut self, path: &str, value: Value) -> DocumentResult<()> {
        let segments = Self::segments(path)?;
        let (last, parents) = segments
            .split_last()
            .ok_or(DocumentError::EmptyPath)?;

        let mut current = &mut self.root;
        for segment in parents {
            current = match current {
                Value::Object(map) => map
                    .entry(segment.to_string())
                    .or_insert_with(|| Value::Object(Map::new())),
                Value::Array(items) if is_index(segment) => {
                    let index: usize = segment.parse().map_err(|_| DocumentError::NotContainer {
                        path: path.to_string(),
                        segment: segment.to_string(),
                    })?;
                    items.get_mut(index).ok_or(DocumentError::IndexOutOfBounds {
                        path: path.to_string(),
                        index,
                    })?
                }
                _ => {
                    return Err(DocumentError::NotContainer {
                        path: path.to_string(),
                        segment: segment.to_string(),
                    })
                }
            };
            if current.is_null() {
                *current = Value::Object(Map::new());
            }
        }

        match current {
            Value::Object(map) => {
                map.insert(last.to_string(), value);
                Ok(())
            }
            Value::Array(items) if is_index(last) => {
                let index: usize = last.parse().map_err(|_| DocumentError::NotContainer {
                    path: path.to_string(),
                    segment: last.to_string(),
                })?;
                let len = items.len();
                match items.get_mut(index) {
                    Some(slot) => {
                        *slot = value;
                        Ok(())
                    }
                    None if index == len => {
                        items.push(value);
                        Ok(())
                    }
                    None => Err(DocumentError::IndexOutOfBounds {
                        path: path.to_string(),
                        index,
                    }),
                }
            }
            _ => Err(DocumentError::NotContainer {
                path: path.to_string(),
                segment: last.to_string(),
            }),
        }
    }

    fn unset(&mut self, path: &str) {
        let Ok(segments) = Self::segments(path) else {
            return;
        };
        let Some((last, parents)) = segments.split_last() else {
            return;
        };

        let mut current = &mut self.root;
        for segment in parents {
            let next = match current {
                Value::Object(map) => map.get_mut(*segment),
                Value::Array(items) if is_index(segment) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get_mut(i)),
                _ => None,
            };
            match next {
                Some(next) => current = next,
                None => return,
            }
        }

        match current {
            Value::Object(map) => {
                map.remove(*last);
            }
            Value::Array(items) if is_index(last) => {
                if let Some(slot) = last.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                    *slot = Value::Null;
                }
            }
            _ => {}
        }
    }

    fn snapshot(&self) -> Value {
        self.root.clone()
    }

    async fn save(&mut self) -> DocumentResult<()> {
        if self.fail_saves {
            return Err(DocumentError::Persistence("document store unavailable".into()));
        }
        self.revision += 1;
        debug!(revision = self.revision, "Document saved");
        Ok(())
    }
}
