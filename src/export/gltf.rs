use anyhow::{anyhow, Result};
use gltf_json::buffer::View as BufferView;
use gltf_json::{
    accessor, buffer, material, mesh, scene, validation, Accessor, Asset, Buffer, Index, Material,
    Mesh, Node, Root, Scene,
};
use std::{collections::BTreeMap, path::Path};

use super::{normalize_or_up, ExportGeometry};
use crate::scene::SceneObject;

/// Write collected objects as glTF 2.0 JSON with a sibling `.bin` buffer.
pub fn write_gltf(objects: &[SceneObject], output_path: &Path) -> Result<()> {
    let gltf_path = output_path.with_extension("gltf");
    let bin_path = output_path.with_extension("bin");
    let bin_uri = bin_path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("Invalid output path: {}", output_path.display()))?
        .to_string();

    let (gltf_root, buffer_data) = build_gltf(objects, &bin_uri)?;

    let gltf_json = serde_json::to_string_pretty(&gltf_root)?;
    std::fs::write(&gltf_path, gltf_json)?;
    if !buffer_data.is_empty() {
        std::fs::write(&bin_path, buffer_data)?;
    }

    log::info!(
        "Wrote {} mesh(es) to {}",
        gltf_root.meshes.len(),
        gltf_path.display()
    );
    Ok(())
}

/// Build the glTF document and its binary buffer. The buffer is referenced by `bin_uri`.
pub fn build_gltf(objects: &[SceneObject], bin_uri: &str) -> Result<(Root, Vec<u8>)> {
    let mut gltf_root = Root {
        asset: Asset {
            generator: Some(format!("genesis_importer {}", env!("CARGO_PKG_VERSION"))),
            version: "2.0".to_string(),
            ..Default::default()
        },
        ..Default::default()
    };

    let mut buffer_data = Vec::new();
    let mut accessors = Vec::new();
    let mut buffer_views = Vec::new();
    let mut meshes = Vec::new();
    let mut nodes = Vec::new();

    for object in objects {
        let geometry = ExportGeometry::from_object(object);
        let mesh_index = meshes.len();
        meshes.push(create_mesh(
            object,
            &geometry,
            &mut buffer_data,
            &mut buffer_views,
            &mut accessors,
        )?);
        nodes.push(create_mesh_node(object, mesh_index));
    }

    if !buffer_data.is_empty() {
        let buffer = Buffer {
            byte_length: validation::USize64::from(buffer_data.len()),
            uri: Some(bin_uri.to_string()),
            name: None,
            extensions: Default::default(),
            extras: Default::default(),
        };
        gltf_root.buffers = vec![buffer];
    }

    let scene_nodes = (0..nodes.len()).map(|i| Index::new(i as u32)).collect();
    gltf_root.scenes = vec![Scene {
        name: Some("Scene".to_string()),
        nodes: scene_nodes,
        extensions: Default::default(),
        extras: Default::default(),
    }];
    gltf_root.scene = Some(Index::new(0));

    gltf_root.buffer_views = buffer_views;
    gltf_root.accessors = accessors;
    gltf_root.meshes = meshes;
    gltf_root.nodes = nodes;
    if !gltf_root.meshes.is_empty() {
        gltf_root.materials = vec![default_material()];
    }

    Ok((gltf_root, buffer_data))
}

fn default_material() -> Material {
    Material {
        name: Some("DefaultMaterial".to_string()),
        pbr_metallic_roughness: material::PbrMetallicRoughness {
            base_color_factor: material::PbrBaseColorFactor([1.0, 1.0, 1.0, 1.0]),
            metallic_factor: material::StrengthFactor(0.0),
            roughness_factor: material::StrengthFactor(1.0),
            base_color_texture: None,
            metallic_roughness_texture: None,
            extensions: Default::default(),
            extras: Default::default(),
        },
        alpha_cutoff: None,
        alpha_mode: validation::Checked::Valid(material::AlphaMode::Opaque),
        double_sided: false,
        normal_texture: None,
        occlusion_texture: None,
        emissive_texture: None,
        emissive_factor: material::EmissiveFactor([0.0, 0.0, 0.0]),
        extensions: Default::default(),
        extras: Default::default(),
    }
}

fn create_mesh(
    object: &SceneObject,
    geometry: &ExportGeometry,
    buffer_data: &mut Vec<u8>,
    buffer_views: &mut Vec<BufferView>,
    accessors: &mut Vec<Accessor>,
) -> Result<Mesh> {
    let position_accessor_index = create_vec3_accessor(
        &geometry.positions,
        buffer_data,
        buffer_views,
        accessors,
        "POSITION",
    )?;

    let normal_accessor_index = match &geometry.normals {
        Some(normals) => {
            let unit: Vec<[f32; 3]> = normals.iter().map(|n| normalize_or_up(*n)).collect();
            Some(create_vec3_accessor(
                &unit,
                buffer_data,
                buffer_views,
                accessors,
                "NORMAL",
            )?)
        }
        None => None,
    };

    let texcoord_accessor_index = match &geometry.uvs {
        Some(uvs) => Some(create_vec2_accessor(
            uvs,
            buffer_data,
            buffer_views,
            accessors,
        )?),
        None => None,
    };

    let indices_accessor_index =
        create_indices_accessor(&geometry.indices, buffer_data, buffer_views, accessors)?;

    let mut attributes = BTreeMap::new();
    attributes.insert(
        validation::Checked::Valid(mesh::Semantic::Positions),
        Index::new(position_accessor_index as u32),
    );
    if let Some(normal_idx) = normal_accessor_index {
        attributes.insert(
            validation::Checked::Valid(mesh::Semantic::Normals),
            Index::new(normal_idx as u32),
        );
    }
    if let Some(texcoord_idx) = texcoord_accessor_index {
        attributes.insert(
            validation::Checked::Valid(mesh::Semantic::TexCoords(0)),
            Index::new(texcoord_idx as u32),
        );
    }

    let primitive = mesh::Primitive {
        attributes,
        indices: Some(Index::new(indices_accessor_index as u32)),
        material: Some(Index::new(0)),
        mode: validation::Checked::Valid(mesh::Mode::Triangles),
        targets: None,
        extensions: Default::default(),
        extras: Default::default(),
    };

    Ok(Mesh {
        name: Some(format!("{}_mesh", object.name)),
        primitives: vec![primitive],
        weights: None,
        extensions: Default::default(),
        extras: Default::default(),
    })
}

fn create_mesh_node(object: &SceneObject, mesh_index: usize) -> Node {
    let placement = object.placement;
    let translation = placement.translation.as_vec3();
    let rotation = placement.rotation.as_quat();
    let scale = placement.scale.as_vec3();

    Node {
        name: Some(object.name.clone()),
        translation: Some(translation.to_array()),
        rotation: Some(scene::UnitQuaternion(rotation.to_array())),
        scale: Some(scale.to_array()),
        children: None,
        camera: None,
        mesh: Some(Index::new(mesh_index as u32)),
        skin: None,
        matrix: None,
        weights: None,
        extensions: Default::default(),
        extras: Default::default(),
    }
}

/// Append a buffer view over `byte_length` bytes starting at `byte_offset`.
fn push_buffer_view(
    buffer_views: &mut Vec<BufferView>,
    byte_offset: usize,
    byte_length: usize,
    byte_stride: Option<usize>,
    target: buffer::Target,
) -> usize {
    buffer_views.push(BufferView {
        buffer: Index::new(0),
        byte_offset: Some(validation::USize64::from(byte_offset)),
        byte_length: validation::USize64::from(byte_length),
        byte_stride: byte_stride.map(buffer::Stride),
        target: Some(validation::Checked::Valid(target)),
        name: None,
        extensions: Default::default(),
        extras: Default::default(),
    });
    buffer_views.len() - 1
}

fn create_vec3_accessor(
    data: &[[f32; 3]],
    buffer_data: &mut Vec<u8>,
    buffer_views: &mut Vec<BufferView>,
    accessors: &mut Vec<Accessor>,
    accessor_type: &str,
) -> Result<usize> {
    let byte_offset = buffer_data.len();
    let byte_length = data.len() * 3 * 4; // 3 components * 4 bytes per f32

    for vec in data {
        for component in vec {
            buffer_data.extend_from_slice(&component.to_le_bytes());
        }
    }

    let buffer_view_index = push_buffer_view(
        buffer_views,
        byte_offset,
        byte_length,
        Some(12),
        buffer::Target::ArrayBuffer,
    );

    // POSITION accessors must carry bounds
    let (min, max) = if accessor_type == "POSITION" {
        let mut min_vals = [f32::INFINITY; 3];
        let mut max_vals = [f32::NEG_INFINITY; 3];

        for vec in data {
            for (i, &val) in vec.iter().enumerate() {
                min_vals[i] = min_vals[i].min(val);
                max_vals[i] = max_vals[i].max(val);
            }
        }
        (Some(min_vals.to_vec()), Some(max_vals.to_vec()))
    } else {
        (None, None)
    };

    let accessor = Accessor {
        buffer_view: Some(Index::new(buffer_view_index as u32)),
        byte_offset: Some(validation::USize64::from(0u64)),
        component_type: validation::Checked::Valid(accessor::GenericComponentType(
            accessor::ComponentType::F32,
        )),
        count: validation::USize64::from(data.len()),
        type_: validation::Checked::Valid(accessor::Type::Vec3),
        min: min.map(|v| serde_json::Value::Array(v.into_iter().map(serde_json::Value::from).collect())),
        max: max.map(|v| serde_json::Value::Array(v.into_iter().map(serde_json::Value::from).collect())),
        sparse: None,
        normalized: false,
        name: None,
        extensions: Default::default(),
        extras: Default::default(),
    };

    accessors.push(accessor);
    Ok(accessors.len() - 1)
}

fn create_vec2_accessor(
    data: &[[f32; 2]],
    buffer_data: &mut Vec<u8>,
    buffer_views: &mut Vec<BufferView>,
    accessors: &mut Vec<Accessor>,
) -> Result<usize> {
    let byte_offset = buffer_data.len();
    let byte_length = data.len() * 2 * 4;

    for vec in data {
        for component in vec {
            buffer_data.extend_from_slice(&component.to_le_bytes());
        }
    }

    let buffer_view_index = push_buffer_view(
        buffer_views,
        byte_offset,
        byte_length,
        Some(8),
        buffer::Target::ArrayBuffer,
    );

    let accessor = Accessor {
        buffer_view: Some(Index::new(buffer_view_index as u32)),
        byte_offset: Some(validation::USize64::from(0u64)),
        component_type: validation::Checked::Valid(accessor::GenericComponentType(
            accessor::ComponentType::F32,
        )),
        count: validation::USize64::from(data.len()),
        type_: validation::Checked::Valid(accessor::Type::Vec2),
        min: None,
        max: None,
        sparse: None,
        normalized: false,
        name: None,
        extensions: Default::default(),
        extras: Default::default(),
    };

    accessors.push(accessor);
    Ok(accessors.len() - 1)
}

fn create_indices_accessor(
    indices: &[u32],
    buffer_data: &mut Vec<u8>,
    buffer_views: &mut Vec<BufferView>,
    accessors: &mut Vec<Accessor>,
) -> Result<usize> {
    let byte_offset = buffer_data.len();
    let byte_length = indices.len() * 4;

    for &index in indices {
        buffer_data.extend_from_slice(&index.to_le_bytes());
    }

    let buffer_view_index = push_buffer_view(
        buffer_views,
        byte_offset,
        byte_length,
        None,
        buffer::Target::ElementArrayBuffer,
    );

    let accessor = Accessor {
        buffer_view: Some(Index::new(buffer_view_index as u32)),
        byte_offset: Some(validation::USize64::from(0u64)),
        component_type: validation::Checked::Valid(accessor::GenericComponentType(
            accessor::ComponentType::U32,
        )),
        count: validation::USize64::from(indices.len()),
        type_: validation::Checked::Valid(accessor::Type::Scalar),
        min: None,
        max: None,
        sparse: None,
        normalized: false,
        name: None,
        extensions: Default::default(),
        extras: Default::default(),
    };

    accessors.push(accessor);
    Ok(accessors.len() - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Placement;
    use glam::DVec3;

    fn object(loop_uvs: Option<Vec<Option<[f32; 2]>>>) -> SceneObject {
        SceneObject {
            name: "Quad".to_string(),
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
            triangles: vec![[0, 1, 2], [0, 2, 3]],
            loop_uvs,
            loop_normals: None,
            placement: Placement {
                translation: DVec3::new(0.0, 0.0, 5.0),
                ..Placement::default()
            },
        }
    }

    #[test]
    fn indexed_geometry_without_loop_attributes() {
        let (root, buffer) = build_gltf(&[object(None)], "scene.bin").unwrap();

        assert_eq!(root.meshes.len(), 1);
        assert_eq!(root.nodes.len(), 1);
        assert_eq!(root.accessors.len(), 2);
        assert_eq!(root.accessors[0].count, validation::USize64::from(4usize));
        assert_eq!(root.accessors[1].count, validation::USize64::from(6usize));
        // 4 positions * 12 bytes + 6 indices * 4 bytes
        assert_eq!(buffer.len(), 4 * 12 + 6 * 4);
        assert_eq!(root.buffers[0].uri.as_deref(), Some("scene.bin"));
        assert_eq!(root.nodes[0].translation, Some([0.0, 0.0, 5.0]));
        assert_eq!(root.nodes[0].name.as_deref(), Some("Quad"));
    }

    #[test]
    fn loop_attributes_split_vertices() {
        let uvs = vec![Some([0.0, 0.0]), Some([1.0, 0.0]), None, Some([0.0, 0.0]), None, Some([0.0, 1.0])];
        let (root, _) = build_gltf(&[object(Some(uvs))], "scene.bin").unwrap();

        assert_eq!(root.accessors.len(), 3);
        assert_eq!(root.accessors[0].count, validation::USize64::from(6usize));
        assert_eq!(root.accessors[1].count, validation::USize64::from(6usize));
        let attributes = &root.meshes[0].primitives[0].attributes;
        assert!(attributes.contains_key(&validation::Checked::Valid(mesh::Semantic::TexCoords(0))));
    }

    #[test]
    fn empty_scene_has_no_buffer() {
        let (root, buffer) = build_gltf(&[], "scene.bin").unwrap();
        assert!(buffer.is_empty());
        assert!(root.buffers.is_empty());
        assert!(root.materials.is_empty());
        assert_eq!(root.scenes.len(), 1);
    }
}
