//! YAML front matter splitting

use serde_json::{Map, Value};

use crate::error::{SyncError, SyncResult};

/// Front-matter fields, in file order
pub type Metadata = Map<String, Value>;

const DELIMITER: &str = "---";

/// Split raw file text into front-matter fields and the remaining body
///
/// Text without a leading `---` block is returned whole with empty
/// metadata. Front matter that parses to something other than a mapping is
/// ignored.
pub fn split_front_matter(text: &str) -> SyncResult<(Metadata, &str)> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let Some((yaml, body)) = find_block(text) else {
        return Ok((Metadata::new(), text));
    };

    if yaml.trim().is_empty() {
        return Ok((Metadata::new(), body));
    }

    let value: Value = serde_yaml::from_str(yaml).map_err(|e| SyncError::FrontMatter {
        details: e.to_string(),
    })?;

    let metadata = match value {
        Value::Object(map) => map,
        _ => Metadata::new(),
    };
    Ok((metadata, body))
}

/// Locate the YAML between the opening and closing delimiter lines
fn find_block(text: &str) -> Option<(&str, &str)> {
    let mut lines = text.split_inclusive('\n');
    let first = lines.next()?;
    if first.trim_end() != DELIMITER {
        return None;
    }

    let start = first.len();
    let mut offset = start;
    for line in lines {
        if line.trim_end() == DELIMITER {
            let yaml = &text[start..offset];
            let body = &text[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }
    None
}

/// Read a scalar front-matter field as text
///
/// Numbers and booleans are stringified; empty strings count as absent.
pub fn text_field(metadata: &Metadata, key: &str) -> Option<String> {
    let value = match metadata.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Read a front-matter field as a list of strings
///
/// Accepts a YAML sequence or a comma-separated string.
pub fn list_field(metadata: &Metadata, key: &str) -> Vec<String> {
    match metadata.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_front_matter() {
        let text = "---\ntitle: Hello\ntags: [a, b]\n---\n# Body\n";
        let (meta, body) = split_front_matter(text).unwrap();
        assert_eq!(meta["title"], "Hello");
        assert_eq!(list_field(&meta, "tags"), vec!["a", "b"]);
        assert_eq!(body, "# Body\n");
    }

    #[test]
    fn test_no_front_matter() {
        let text = "Just text\n---\nmore";
        let (meta, body) = split_front_matter(text).unwrap();
        assert!(meta.is_empty());
        assert_eq!(body, text);
    }

    #[test]
    fn test_unclosed_front_matter_is_body() {
        let text = "---\ntitle: Hello\nno closing";
        let (meta, body) = split_front_matter(text).unwrap();
        assert!(meta.is_empty());
        assert_eq!(body, text);
    }

    #[test]
    fn test_crlf_and_empty_front_matter() {
        let (meta, body) = split_front_matter("---\r\n---\r\nbody").unwrap();
        assert!(meta.is_empty());
        assert_eq!(body, "body");
    }

    #[test]
    fn test_non_mapping_front_matter_ignored() {
        let (meta, body) = split_front_matter("---\n- a\n- b\n---\nbody").unwrap();
        assert!(meta.is_empty());
        assert_eq!(body, "body");
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        let err = split_front_matter("---\ntitle: [unclosed\n---\nbody").unwrap_err();
        assert!(matches!(err, SyncError::FrontMatter { .. }));
    }

    #[test]
    fn test_field_helpers() {
        let (meta, _) =
            split_front_matter("---\nauthor: Ada\nyear: 2024\ntags: x, y ,\nempty: ''\n---\n")
                .unwrap();
        assert_eq!(text_field(&meta, "author"), Some("Ada".to_string()));
        assert_eq!(text_field(&meta, "year"), Some("2024".to_string()));
        assert_eq!(text_field(&meta, "empty"), None);
        assert_eq!(text_field(&meta, "missing"), None);
        assert_eq!(list_field(&meta, "tags"), vec!["x", "y"]);
    }
}
