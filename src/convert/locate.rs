//! Finding position, normal and UV arrays in schema-less JSON.
//!
//! Lookup runs in two phases. The named-array phase indexes every
//! `{ "name": ..., "data": [...] }` object in the subtree and probes the
//! preferred names in order. The shape phase, when enabled for the role,
//! takes the first numeric array whose length is a multiple of three.

use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::config::AttributeQuery;

/// Geometric meaning of an attribute array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticRole {
    Position,
    Normal,
    Uv,
}

impl SemanticRole {
    pub fn default_stride(self) -> usize {
        match self {
            SemanticRole::Position | SemanticRole::Normal => 3,
            SemanticRole::Uv => 2,
        }
    }
}

/// A flat numeric attribute array and the element count of one logical value.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedArray {
    pub name: String,
    pub data: Vec<f64>,
    pub stride: usize,
}

impl NamedArray {
    /// Read `N` consecutive values at every stride step.
    ///
    /// Groups that would run past the end of the data are dropped.
    pub fn groups<const N: usize>(&self) -> Vec<[f64; N]> {
        let stride = self.stride.max(1);
        (0..self.data.len())
            .step_by(stride)
            .filter(|&i| i + N <= self.data.len())
            .map(|i| std::array::from_fn(|k| self.data[i + k]))
            .collect()
    }
}

/// Locate the array playing `role` under `node`. `None` means the attribute is absent.
pub fn locate(node: &Value, query: &AttributeQuery, role: SemanticRole) -> Option<NamedArray> {
    let candidates = collect_named_arrays(node);
    for name in &query.preferred_names {
        if let Some(entry) = candidates.get(name.as_str()) {
            return named_entry_to_array(name, entry, role);
        }
    }

    if !query.shape_fallback {
        return None;
    }

    collect_numeric_arrays(node, query.min_len)
        .into_iter()
        .find(|(_, values)| values.len() % 3 == 0)
        .and_then(|(name, values)| {
            Some(NamedArray {
                name: name.to_string(),
                data: numeric_values(values)?,
                stride: 3,
            })
        })
}

/// Convert a JSON array to floats if every element is a number.
pub(crate) fn numeric_values(values: &[Value]) -> Option<Vec<f64>> {
    values.iter().map(Value::as_f64).collect()
}

fn is_numeric_array(values: &[Value]) -> bool {
    values.iter().all(Value::is_number)
}

fn named_entry_to_array(
    name: &str,
    entry: &Map<String, Value>,
    role: SemanticRole,
) -> Option<NamedArray> {
    let data = entry.get("data").and_then(Value::as_array)?;
    let stride = entry
        .get("stride")
        .and_then(Value::as_u64)
        .filter(|&s| s > 0)
        .map(|s| s as usize)
        .unwrap_or_else(|| role.default_stride());

    Some(NamedArray {
        name: name.to_string(),
        data: numeric_values(data)?,
        stride,
    })
}

/// Index named arrays by name. The first occurrence in depth-first order wins.
fn collect_named_arrays(node: &Value) -> HashMap<&str, &Map<String, Value>> {
    fn visit<'a>(node: &'a Value, found: &mut HashMap<&'a str, &'a Map<String, Value>>) {
        match node {
            Value::Object(map) => {
                let name = map.get("name").and_then(Value::as_str);
                let data = map.get("data").and_then(Value::as_array);
                if let (Some(name), Some(data)) = (name, data) {
                    if is_numeric_array(data) {
                        found.entry(name).or_insert(map);
                    }
                }
                for value in map.values() {
                    visit(value, found);
                }
            }
            Value::Array(values) => {
                for value in values {
                    visit(value, found);
                }
            }
            _ => {}
        }
    }

    let mut found = HashMap::new();
    visit(node, &mut found);
    found
}

/// Numeric arrays of at least `min_len` elements held directly by an object field,
/// paired with their field name in walk order. Repeated field names are all kept.
fn collect_numeric_arrays(node: &Value, min_len: usize) -> Vec<(&str, &Vec<Value>)> {
    fn visit<'a>(node: &'a Value, min_len: usize, found: &mut Vec<(&'a str, &'a Vec<Value>)>) {
        match node {
            Value::Object(map) => {
                for (key, value) in map {
                    match value {
                        Value::Array(values)
                            if values.len() >= min_len && is_numeric_array(values) =>
                        {
                            found.push((key.as_str(), values));
                        }
                        _ => visit(value, min_len, found),
                    }
                }
            }
            Value::Array(values) => {
                for value in values {
                    visit(value, min_len, found);
                }
            }
            _ => {}
        }
    }

    let mut found = Vec::new();
    visit(node, min_len, &mut found);
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query(names: &[&str], shape_fallback: bool) -> AttributeQuery {
        AttributeQuery::new(names, shape_fallback)
    }

    #[test]
    fn earlier_preferred_name_wins_over_traversal_order() {
        let node = json!({
            "buffers": [
                { "name": "positions", "data": [9, 9, 9] },
                { "name": "aPosition", "data": [1, 2, 3] }
            ]
        });
        let found = locate(&node, &query(&["aPosition", "positions"], true), SemanticRole::Position)
            .unwrap();
        assert_eq!(found.name, "aPosition");
        assert_eq!(found.data, vec![1.0, 2.0, 3.0]);

        let found = locate(&node, &query(&["positions", "aPosition"], true), SemanticRole::Position)
            .unwrap();
        assert_eq!(found.data, vec![9.0, 9.0, 9.0]);
    }

    #[test]
    fn name_match_suppresses_shape_fallback() {
        let node = json!({
            "extra": [5, 5, 5, 5, 5, 5],
            "attr": { "name": "aPos", "data": [1, 0, 0] }
        });
        let found = locate(&node, &query(&["aPos"], true), SemanticRole::Position).unwrap();
        assert_eq!(found.name, "aPos");
        assert_eq!(found.data, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn shape_fallback_takes_first_multiple_of_three() {
        let node = json!({
            "weights": [1, 2, 3, 4],
            "nested": { "coords": [0, 1, 2, 3, 4, 5] }
        });
        let found = locate(&node, &query(&["aPosition"], true), SemanticRole::Position).unwrap();
        assert_eq!(found.name, "coords");
        assert_eq!(found.stride, 3);
        assert_eq!(found.data.len(), 6);
    }

    #[test]
    fn shape_fallback_sees_repeated_field_names() {
        let node = json!({
            "attributes": [
                { "name": "weights", "data": [1, 2, 3, 4] },
                { "name": "POSITION", "data": [0, 0, 0, 1, 0, 0, 0, 1, 0] }
            ]
        });
        let found = locate(&node, &query(&["aPosition"], true), SemanticRole::Position).unwrap();
        assert_eq!(found.name, "data");
        assert_eq!(found.data, vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn shape_fallback_disabled_returns_none() {
        let node = json!({ "coords": [0, 1, 2] });
        assert!(locate(&node, &query(&["uv"], false), SemanticRole::Uv).is_none());
    }

    #[test]
    fn first_named_occurrence_is_kept() {
        let node = json!([
            { "name": "uv", "data": [0.5, 0.5] },
            { "name": "uv", "data": [1.0, 1.0] }
        ]);
        let found = locate(&node, &query(&["uv"], false), SemanticRole::Uv).unwrap();
        assert_eq!(found.data, vec![0.5, 0.5]);
    }

    #[test]
    fn stride_comes_from_node_or_role() {
        let node = json!({
            "a": { "name": "uv", "data": [0, 0, 9, 1, 1, 9], "stride": 3 },
            "b": { "name": "normals", "data": [0, 0, 1] },
            "c": { "name": "texcoords", "data": [0, 0], "stride": 0 }
        });
        let uv = locate(&node, &query(&["uv"], false), SemanticRole::Uv).unwrap();
        assert_eq!(uv.stride, 3);
        assert_eq!(uv.groups::<2>(), vec![[0.0, 0.0], [1.0, 1.0]]);

        let normals = locate(&node, &query(&["normals"], false), SemanticRole::Normal).unwrap();
        assert_eq!(normals.stride, 3);

        let texcoords = locate(&node, &query(&["texcoords"], false), SemanticRole::Uv).unwrap();
        assert_eq!(texcoords.stride, 2);
    }

    #[test]
    fn non_numeric_named_data_is_ignored() {
        let node = json!({
            "a": { "name": "aPosition", "data": ["x", "y", "z"] },
            "b": { "name": "aPosition", "data": [1, 2, 3] }
        });
        let found = locate(&node, &query(&["aPosition"], false), SemanticRole::Position).unwrap();
        assert_eq!(found.data, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn bools_are_not_numbers() {
        let node = json!({ "flags": [true, false, true] });
        assert!(locate(&node, &query(&[], true), SemanticRole::Position).is_none());
    }

    #[test]
    fn groups_drop_trailing_partial_values() {
        let array = NamedArray {
            name: "p".to_string(),
            data: vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0],
            stride: 3,
        };
        assert_eq!(array.groups::<3>(), vec![[0.0, 1.0, 2.0], [3.0, 4.0, 5.0]]);
    }

    #[test]
    fn groups_follow_wide_stride() {
        let array = NamedArray {
            name: "p".to_string(),
            data: vec![0.0, 1.0, 2.0, 1.0, 3.0, 4.0, 5.0, 1.0],
            stride: 4,
        };
        assert_eq!(array.groups::<3>(), vec![[0.0, 1.0, 2.0], [3.0, 4.0, 5.0]]);
    }
}
