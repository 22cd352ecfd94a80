//! Rebuilding one mesh object from an untyped object record.

use glam::{DVec2, DVec3};
use serde_json::{Map, Value};
use thiserror::Error;

use super::json_integer;
use super::locate::{locate, numeric_values, SemanticRole};
use super::transform::{TransformIndex, WorldTransform};
use crate::config::ImportConfig;
use crate::scene::MeshSink;

/// Why an object record produced no mesh. The import continues with the next record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SkipReason {
    #[error("object record is not a JSON object")]
    MalformedRecord,

    #[error("no index array under any accepted key")]
    NoIndexData,

    #[error("index element at position {position} is not an integer")]
    IndexNotIntegral { position: usize },

    #[error("no vertex position data found")]
    NoPositionData,

    #[error("index {max_index} exceeds vertex count {vertex_count}")]
    IndexOutOfRange { max_index: i64, vertex_count: usize },

    #[error("no valid triangles")]
    NoValidTriangles,

    #[error("mesh build rejected: {0}")]
    MeshBuildRejected(String),
}

/// Geometry rebuilt from one object record.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructedMesh {
    /// Name from the object record. The sink may stage the object under a
    /// different name, e.g. `SceneCollector` suffixes duplicates with `.001`.
    pub name: String,
    pub vertices: Vec<DVec3>,
    pub triangles: Vec<[u32; 3]>,
    pub uv_per_vertex: Option<Vec<DVec2>>,
    pub normal_per_loop: Option<Vec<DVec3>>,
    pub world_transform: WorldTransform,
}

impl ReconstructedMesh {
    pub fn loop_count(&self) -> usize {
        self.triangles.len() * 3
    }

    /// Per-vertex UVs spread over loops. Loops whose vertex has no UV stay `None`.
    pub fn uv_per_loop(&self) -> Option<Vec<Option<DVec2>>> {
        self.uv_per_vertex
            .as_ref()
            .map(|uvs| spread_over_loops(&self.triangles, uvs))
    }
}

/// Rebuild the object at `position` in the object collection and hand it to `sink`.
pub fn reconstruct_object<S: MeshSink>(
    record: &Value,
    position: usize,
    transforms: &TransformIndex,
    config: &ImportConfig,
    sink: &mut S,
) -> Result<ReconstructedMesh, SkipReason> {
    let map = record.as_object().ok_or(SkipReason::MalformedRecord)?;
    let name = object_name(map, position, config);

    let indices = extract_indices(map, config)?;
    let vertices = extract_vertices(record, map, config)?;
    check_index_bounds(&indices, vertices.len())?;
    let triangles = triangulate(&indices, vertices.len())?;

    let handle = sink
        .build_mesh(&name, &vertices, &triangles)
        .map_err(|e| SkipReason::MeshBuildRejected(e.to_string()))?;

    let world_transform = match map.get("transformId").and_then(json_integer) {
        Some(id) if transforms.contains(id) => {
            let world = transforms.world_transform(id);
            let (scale, rotation, translation) = world.to_scale_rotation_translation();
            if let Err(e) = sink.set_world_transform(&handle, translation, rotation, scale) {
                log::warn!("Object '{}': failed to apply world transform: {}", name, e);
            }
            world
        }
        _ => WorldTransform::IDENTITY,
    };

    let uv_per_vertex = extract_uv_per_vertex(record, config).and_then(|uvs| {
        match sink.set_uv(&handle, &spread_over_loops(&triangles, &uvs)) {
            Ok(()) => Some(uvs),
            Err(e) => {
                log::warn!("Object '{}': UVs not applied: {}", name, e);
                None
            }
        }
    });

    let normal_per_loop = extract_normals_per_loop(record, &triangles, config).and_then(|normals| {
        match sink.set_custom_normals(&handle, &normals) {
            Ok(()) => Some(normals),
            Err(e) => {
                log::warn!("Object '{}': normals not applied: {}", name, e);
                None
            }
        }
    });

    log::debug!(
        "Object '{}': {} vertices, {} indices ({} triangles), UVs: {}, normals: {}",
        name,
        vertices.len(),
        indices.len(),
        triangles.len(),
        uv_per_vertex.is_some(),
        normal_per_loop.is_some()
    );

    Ok(ReconstructedMesh {
        name,
        vertices,
        triangles,
        uv_per_vertex,
        normal_per_loop,
        world_transform,
    })
}

/// The record's `name`, or `<prefix>_<position>` when it has none.
pub fn object_name(map: &Map<String, Value>, position: usize, config: &ImportConfig) -> String {
    map.get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| config.fallback_name(position))
}

/// Read the flat index array from the first accepted key holding a non-empty array.
pub fn extract_indices(
    map: &Map<String, Value>,
    config: &ImportConfig,
) -> Result<Vec<i64>, SkipReason> {
    for key in &config.index_keys {
        match map.get(key) {
            None | Some(Value::Null) => continue,
            Some(Value::Array(values)) if values.is_empty() => continue,
            Some(Value::Array(values)) => {
                return values
                    .iter()
                    .enumerate()
                    .map(|(position, value)| {
                        coerce_index(value).ok_or(SkipReason::IndexNotIntegral { position })
                    })
                    .collect();
            }
            Some(_) => return Err(SkipReason::IndexNotIntegral { position: 0 }),
        }
    }
    Err(SkipReason::NoIndexData)
}

fn coerce_index(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite())
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Find vertex positions with the attribute locator, then by scanning the record's own keys.
pub fn extract_vertices(
    record: &Value,
    map: &Map<String, Value>,
    config: &ImportConfig,
) -> Result<Vec<DVec3>, SkipReason> {
    if let Some(attribute) = locate(record, &config.position, SemanticRole::Position) {
        let vertices: Vec<DVec3> = attribute
            .groups::<3>()
            .into_iter()
            .map(DVec3::from_array)
            .collect();
        if vertices.is_empty() {
            return Err(SkipReason::NoPositionData);
        }
        return Ok(vertices);
    }

    scan_position_keys(map, config).ok_or(SkipReason::NoPositionData)
}

fn scan_position_keys(map: &Map<String, Value>, config: &ImportConfig) -> Option<Vec<DVec3>> {
    map.iter()
        .filter(|(key, _)| {
            let key = key.to_lowercase();
            config
                .position_key_hints
                .iter()
                .any(|hint| key.contains(&hint.to_lowercase()))
        })
        .filter_map(|(_, value)| value.as_array())
        .filter(|values| !values.is_empty() && values.len() % 3 == 0)
        .find_map(|values| numeric_values(values))
        .map(|data| {
            data.chunks_exact(3)
                .map(|c| DVec3::new(c[0], c[1], c[2]))
                .collect()
        })
}

/// Reject index data referencing vertices that do not exist.
pub fn check_index_bounds(indices: &[i64], vertex_count: usize) -> Result<(), SkipReason> {
    match indices.iter().max() {
        Some(&max_index) if max_index >= vertex_count as i64 => Err(SkipReason::IndexOutOfRange {
            max_index,
            vertex_count,
        }),
        _ => Ok(()),
    }
}

/// Group indices into triangles, keeping only groups fully inside `[0, vertex_count)`.
///
/// A trailing group of fewer than three indices is dropped.
pub fn triangulate(indices: &[i64], vertex_count: usize) -> Result<Vec<[u32; 3]>, SkipReason> {
    let in_range = |i: i64| i >= 0 && (i as u64) < vertex_count as u64 && i <= u32::MAX as i64;
    let triangles: Vec<[u32; 3]> = indices
        .chunks_exact(3)
        .filter(|group| group.iter().all(|&i| in_range(i)))
        .map(|group| [group[0] as u32, group[1] as u32, group[2] as u32])
        .collect();

    let dropped = indices.len() / 3 - triangles.len();
    if dropped > 0 {
        log::warn!("Dropped {} triangles with out-of-range indices", dropped);
    }
    if indices.len() % 3 != 0 {
        log::warn!(
            "Truncated {} indices to maintain triangle integrity",
            indices.len() % 3
        );
    }

    if triangles.is_empty() {
        Err(SkipReason::NoValidTriangles)
    } else {
        Ok(triangles)
    }
}

/// One UV per vertex, read at the attribute stride.
pub fn extract_uv_per_vertex(record: &Value, config: &ImportConfig) -> Option<Vec<DVec2>> {
    let attribute = locate(record, &config.uv, SemanticRole::Uv)?;
    if attribute.data.len() < attribute.stride {
        return None;
    }
    let uvs: Vec<DVec2> = attribute
        .groups::<2>()
        .into_iter()
        .map(DVec2::from_array)
        .collect();
    (!uvs.is_empty()).then_some(uvs)
}

/// One normal per loop, read at `vertex_index * stride`.
///
/// Loops whose normal would run past the data get `(0, 0, 1)`.
pub fn extract_normals_per_loop(
    record: &Value,
    triangles: &[[u32; 3]],
    config: &ImportConfig,
) -> Option<Vec<DVec3>> {
    let attribute = locate(record, &config.normal, SemanticRole::Normal)?;
    let data = &attribute.data;
    if data.is_empty() || data.len() < attribute.stride {
        return None;
    }

    let normals = triangles
        .iter()
        .flatten()
        .map(|&vertex| {
            let offset = vertex as usize * attribute.stride;
            if offset + 2 < data.len() {
                DVec3::new(data[offset], data[offset + 1], data[offset + 2])
            } else {
                DVec3::Z
            }
        })
        .collect();
    Some(normals)
}

fn spread_over_loops(triangles: &[[u32; 3]], per_vertex: &[DVec2]) -> Vec<Option<DVec2>> {
    triangles
        .iter()
        .flatten()
        .map(|&vertex| per_vertex.get(vertex as usize).copied())
        .collect()
}
