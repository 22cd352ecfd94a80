//! Loading the raw Genesis export into a JSON value tree.
//!
//! Exporters sometimes wrap the JSON payload in extra text (log lines, a
//! JavaScript assignment, trailing garbage). When strict parsing fails the
//! loader retries on the substring between the first `{` and the last `}`.

use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that abort a whole import. Everything else is a per-object skip.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Parse document text, recovering the outermost `{...}` span on failure.
///
/// The strict-parse diagnostic is reported when recovery also fails.
pub fn parse_document(text: &str) -> Result<Value, DocumentError> {
    let strict_err = match serde_json::from_str(text) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    if let Some(span) = outer_object_span(text) {
        if let Ok(value) = serde_json::from_str(span) {
            log::warn!(
                "Document is not valid JSON ({}); recovered the outer object span",
                strict_err
            );
            return Ok(value);
        }
    }

    Err(DocumentError::Parse(strict_err))
}

/// Read a document from disk. Invalid UTF-8 sequences are replaced, not fatal.
pub fn read_document(path: &Path) -> Result<Value, DocumentError> {
    let bytes = std::fs::read(path).map_err(|source| DocumentError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8_lossy(&bytes);
    parse_document(&text)
}

fn outer_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strict_json_parses_directly() {
        let value = parse_document(r#"{"objects": []}"#).unwrap();
        assert_eq!(value, json!({ "objects": [] }));
    }

    #[test]
    fn wrapped_payload_is_recovered() {
        let text = "var model = {\"objects\": [{\"name\": \"A\"}]};\n// exported";
        let value = parse_document(text).unwrap();
        assert_eq!(value["objects"][0]["name"], "A");
    }

    #[test]
    fn unrecoverable_text_reports_parse_error() {
        let err = parse_document("not json at all").unwrap_err();
        assert!(matches!(err, DocumentError::Parse(_)));
        assert!(err.to_string().starts_with("JSON parse error"));
    }

    #[test]
    fn reversed_braces_are_not_recovered() {
        assert!(parse_document("} garbage {").is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_document(Path::new("no/such/model.json")).unwrap_err();
        assert!(matches!(err, DocumentError::Io { .. }));
    }
}
