//! Document path helpers
//!
//! Concrete document paths address values inside a document and may carry
//! array indices (`parts.0.file`). Schema paths name the declared field and
//! never contain indices (`parts.file`).

/// Segment separator used by document and schema paths
pub const SEPARATOR: char = '.';

/// Returns true when the segment is one or more ASCII digits, nothing else
pub fn is_index(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

/// Convert a concrete document path into the schema path used for lookups.
///
/// Every purely numeric segment is dropped, the others keep their order.
///
/// ```
/// use fv_core::path::schema_path;
///
/// assert_eq!(schema_path("parts.0.file.2"), "parts.file");
/// assert_eq!(schema_path("part.0asd.file"), "part.0asd.file");
/// ```
pub fn schema_path(doc_path: &str) -> String {
    doc_path
        .split(SEPARATOR)
        .filter(|segment| !is_index(segment))
        .collect::<Vec<_>>()
        .join(".")
}

/// Split a trailing array index off a document path.
///
/// Returns `None` when the last segment is not an index.
pub fn split_index(doc_path: &str) -> Option<(&str, usize)> {
    let (parent, last) = doc_path.rsplit_once(SEPARATOR)?;
    if !is_index(last) {
        return None;
    }
    last.parse().ok().map(|index| (parent, index))
}

/// Append a key to a parent path
pub fn join(parent: Option<&str>, key: &str) -> String {
    match parent {
        Some(parent) if !parent.is_empty() => format!("{}{}{}", parent, SEPARATOR, key),
        _ => key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_path() {
        assert_eq!(schema_path("image"), "image");
        assert_eq!(schema_path("image.0"), "image");
        assert_eq!(schema_path("part.0.file"), "part.file");
        assert_eq!(schema_path("part.0.file.2"), "part.file");
        assert_eq!(schema_path("part.0.file.2.text"), "part.file.text");
        assert_eq!(
            schema_path("part.0asd.file.2bs.text"),
            "part.0asd.file.2bs.text"
        );
    }

    #[test]
    fn test_schema_path_keeps_order() {
        assert_eq!(schema_path("a.1.b.22.c.333.d"), "a.b.c.d");
        assert_eq!(schema_path("images.10"), "images");
    }

    #[test]
    fn test_is_index() {
        assert!(is_index("0"));
        assert!(is_index("42"));
        assert!(!is_index(""));
        assert!(!is_index("0asd"));
        assert!(!is_index("-1"));
        assert!(!is_index("1.5"));
    }

    #[test]
    fn test_split_index() {
        assert_eq!(split_index("images.3"), Some(("images", 3)));
        assert_eq!(split_index("parts.0.files.1"), Some(("parts.0.files", 1)));
        assert_eq!(split_index("images"), None);
        assert_eq!(split_index("parts.0.file"), None);
    }

    #[test]
    fn test_join() {
        assert_eq!(join(None, "image"), "image");
        assert_eq!(join(Some(""), "image"), "image");
        assert_eq!(join(Some("sub"), "file"), "sub.file");
    }
}
