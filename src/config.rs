use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;

/// Names and limits used to find one semantic attribute inside an object record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AttributeQuery {
    /// Named-array names, probed in order. The first present name wins.
    pub preferred_names: Vec<String>,
    /// Minimum length of a numeric array considered by the shape fallback.
    pub min_len: usize,
    /// Whether to fall back to the first 3-divisible numeric array when no name matches.
    pub shape_fallback: bool,
}

impl AttributeQuery {
    pub fn new(preferred_names: &[&str], shape_fallback: bool) -> Self {
        Self {
            preferred_names: preferred_names.iter().map(|s| s.to_string()).collect(),
            min_len: 3,
            shape_fallback,
        }
    }
}

impl Default for AttributeQuery {
    fn default() -> Self {
        Self {
            preferred_names: Vec::new(),
            min_len: 3,
            shape_fallback: false,
        }
    }
}

/// Configuration for a Genesis JSON import
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub position: AttributeQuery,
    pub normal: AttributeQuery,
    pub uv: AttributeQuery,
    /// Keys that may hold the flat triangle index array of an object.
    pub index_keys: Vec<String>,
    /// Root keys that may hold the object collection.
    pub object_collection_keys: Vec<String>,
    pub transforms_key: String,
    /// Case-insensitive substrings used by the last-resort vertex key scan.
    pub position_key_hints: Vec<String>,
    /// `parentId` value meaning "no parent".
    pub parent_sentinel: i64,
    pub fallback_name_prefix: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            position: AttributeQuery::new(
                &["aPosition", "aPos", "positions", "vertices", "aVertex", "position"],
                true,
            ),
            normal: AttributeQuery::new(&["aNormal", "normals", "normal"], false),
            uv: AttributeQuery::new(&["aUV0", "uv", "uvs", "aUV", "texcoords"], false),
            index_keys: to_strings(&["indices", "faces", "triangles"]),
            object_collection_keys: to_strings(&["objects", "meshes"]),
            transforms_key: "transforms".to_string(),
            position_key_hints: to_strings(&["position", "vertex"]),
            parent_sentinel: -1,
            fallback_name_prefix: "GenesisObject".to_string(),
        }
    }
}

impl ImportConfig {
    /// Load overrides from a JSON file. Missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path.display(), e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path.display(), e))?;
        Ok(config)
    }

    /// Name given to an object record without a `name` field.
    pub fn fallback_name(&self, index: usize) -> String {
        format!("{}_{}", self.fallback_name_prefix, index)
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_accepted_keys() {
        let config = ImportConfig::default();
        assert_eq!(config.position.preferred_names[0], "aPosition");
        assert_eq!(config.index_keys, vec!["indices", "faces", "triangles"]);
        assert_eq!(config.object_collection_keys, vec!["objects", "meshes"]);
        assert!(config.position.shape_fallback);
        assert!(!config.uv.shape_fallback);
        assert!(!config.normal.shape_fallback);
        assert_eq!(config.parent_sentinel, -1);
    }

    #[test]
    fn fallback_name_uses_record_position() {
        let config = ImportConfig::default();
        assert_eq!(config.fallback_name(4), "GenesisObject_4");
    }

    #[test]
    fn partial_overrides_keep_other_defaults() {
        let config: ImportConfig = serde_json::from_str(
            r#"{ "uv": { "preferred_names": ["st"] }, "parent_sentinel": 0 }"#,
        )
        .unwrap();
        assert_eq!(config.uv.preferred_names, vec!["st"]);
        assert_eq!(config.uv.min_len, 3);
        assert!(!config.uv.shape_fallback);
        assert_eq!(config.parent_sentinel, 0);
        assert_eq!(config.position, ImportConfig::default().position);
    }

    #[test]
    fn from_file_reports_missing_file() {
        let err = ImportConfig::from_file(Path::new("does/not/exist.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
