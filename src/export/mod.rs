//! Writers for collected scenes.

pub mod dae;
pub mod gltf;

use glam::Vec3;

use crate::scene::SceneObject;

/// Vertex streams ready for a per-vertex format.
///
/// Objects with per-loop UVs or normals are split so that every loop gets its
/// own vertex. Unassigned UV loops become `(0, 0)`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ExportGeometry {
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub uvs: Option<Vec<[f32; 2]>>,
    pub indices: Vec<u32>,
}

impl ExportGeometry {
    pub fn from_object(object: &SceneObject) -> Self {
        if !object.has_loop_attributes() {
            return Self {
                positions: object.positions.clone(),
                normals: None,
                uvs: None,
                indices: object.loop_vertices().collect(),
            };
        }

        let positions = object
            .loop_vertices()
            .map(|v| object.positions[v as usize])
            .collect();
        let uvs = object
            .loop_uvs
            .as_ref()
            .map(|uvs| uvs.iter().map(|uv| uv.unwrap_or([0.0, 0.0])).collect());

        Self {
            positions,
            normals: object.loop_normals.clone(),
            uvs,
            indices: (0..object.loop_count() as u32).collect(),
        }
    }
}

/// Unit-length normal, or `+Z` when the input has no direction.
pub(crate) fn normalize_or_up(normal: [f32; 3]) -> [f32; 3] {
    Vec3::from_array(normal).try_normalize().unwrap_or(Vec3::Z).to_array()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Placement;

    #[test]
    fn per_loop_split_keeps_corner_order() {
        let object = SceneObject {
            name: "Tri".to_string(),
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            triangles: vec![[2, 0, 1]],
            loop_uvs: Some(vec![Some([0.5, 0.5]), None, Some([1.0, 0.0])]),
            loop_normals: None,
            placement: Placement::default(),
        };
        let geometry = ExportGeometry::from_object(&object);
        assert_eq!(geometry.positions[0], [0.0, 1.0, 0.0]);
        assert_eq!(geometry.uvs, Some(vec![[0.5, 0.5], [0.0, 0.0], [1.0, 0.0]]));
        assert_eq!(geometry.indices, vec![0, 1, 2]);
    }

    #[test]
    fn zero_normal_points_up() {
        assert_eq!(normalize_or_up([0.0, 0.0, 0.0]), [0.0, 0.0, 1.0]);
        assert_eq!(normalize_or_up([0.0, 3.0, 0.0]), [0.0, 1.0, 0.0]);
    }
}
