use anyhow::Result;
use glam::Mat4;
use std::io::Write;
use std::path::Path;
use xmltree::{Element, XMLNode};

use super::normalize_or_up;
use crate::scene::SceneObject;

/// Write collected objects to a COLLADA 1.4.1 (.dae) file.
pub fn write_dae(objects: &[SceneObject], output_path: &Path) -> Result<()> {
    let collada = build_collada(objects)?;

    let mut file = std::fs::File::create(output_path)?;
    collada.write(&mut file)?;
    file.flush()?;

    log::info!(
        "Wrote {} geometry node(s) to {}",
        objects.len(),
        output_path.display()
    );
    Ok(())
}

/// Build the COLLADA document for `objects`.
pub fn build_collada(objects: &[SceneObject]) -> Result<Element> {
    let mut collada = Element::new("COLLADA");
    collada.attributes.insert(
        "xmlns".to_string(),
        "http://www.collada.org/2005/11/COLLADASchema".to_string(),
    );
    collada
        .attributes
        .insert("version".to_string(), "1.4.1".to_string());

    collada.children.push(XMLNode::Element(build_asset()));

    let mut library_geometries = Element::new("library_geometries");
    for (object_index, object) in objects.iter().enumerate() {
        let geom = build_geometry_element(object, object_index)?;
        library_geometries.children.push(XMLNode::Element(geom));
    }
    collada.children.push(XMLNode::Element(library_geometries));

    let mut library_visual_scenes = Element::new("library_visual_scenes");
    let mut visual_scene = Element::new("visual_scene");
    visual_scene
        .attributes
        .insert("id".to_string(), "Scene".to_string());
    visual_scene
        .attributes
        .insert("name".to_string(), "Scene".to_string());

    for (object_index, object) in objects.iter().enumerate() {
        visual_scene
            .children
            .push(XMLNode::Element(build_object_node(object, object_index)));
    }

    library_visual_scenes
        .children
        .push(XMLNode::Element(visual_scene));
    collada
        .children
        .push(XMLNode::Element(library_visual_scenes));

    let mut scene_elem = Element::new("scene");
    let mut inst_vs = Element::new("instance_visual_scene");
    inst_vs
        .attributes
        .insert("url".to_string(), "#Scene".to_string());
    scene_elem.children.push(XMLNode::Element(inst_vs));
    collada.children.push(XMLNode::Element(scene_elem));

    Ok(collada)
}

fn geometry_id(object: &SceneObject, object_index: usize) -> String {
    format!("geom_{}_{}", object_index, sanitize_id(&object.name))
}

fn build_object_node(object: &SceneObject, object_index: usize) -> Element {
    let mut node = Element::new("node");
    node.attributes
        .insert("id".to_string(), format!("node_{}", object_index));
    node.attributes
        .insert("name".to_string(), object.name.clone());

    let mut matrix = Element::new("matrix");
    matrix
        .attributes
        .insert("sid".to_string(), "transform".to_string());
    matrix
        .children
        .push(XMLNode::Text(matrix_to_string(object.placement.matrix().as_mat4())));
    node.children.push(XMLNode::Element(matrix));

    let mut inst_geom = Element::new("instance_geometry");
    inst_geom.attributes.insert(
        "url".to_string(),
        format!("#{}", geometry_id(object, object_index)),
    );
    node.children.push(XMLNode::Element(inst_geom));

    node
}

fn build_geometry_element(object: &SceneObject, object_index: usize) -> Result<Element> {
    let normals: Option<Vec<[f32; 3]>> = object
        .loop_normals
        .as_ref()
        .map(|normals| normals.iter().map(|n| normalize_or_up(*n)).collect());
    let texcoords: Option<Vec<[f32; 2]>> = object
        .loop_uvs
        .as_ref()
        .map(|uvs| uvs.iter().map(|uv| uv.unwrap_or([0.0, 0.0])).collect());

    let geom_id = geometry_id(object, object_index);

    let mut geometry = Element::new("geometry");
    geometry
        .attributes
        .insert("id".to_string(), geom_id.clone());
    geometry
        .attributes
        .insert("name".to_string(), format!("{}_mesh", object.name));

    let mut mesh = Element::new("mesh");

    let pos_source_id = format!("{}-positions", geom_id);
    mesh.children.push(XMLNode::Element(build_source_float_vec3(
        &pos_source_id,
        &object.positions,
    )));

    let normal_source_id = format!("{}-normals", geom_id);
    if let Some(norms) = &normals {
        mesh.children
            .push(XMLNode::Element(build_source_float_vec3(&normal_source_id, norms)));
    }

    let texcoord_source_id = format!("{}-texcoord0", geom_id);
    if let Some(uvs) = &texcoords {
        mesh.children
            .push(XMLNode::Element(build_source_float_vec2(&texcoord_source_id, uvs)));
    }

    let mut vertices = Element::new("vertices");
    let vertices_id = format!("{}-vertices", geom_id);
    vertices
        .attributes
        .insert("id".to_string(), vertices_id.clone());
    vertices.children.push(XMLNode::Element(build_input(
        "POSITION",
        &pos_source_id,
        None,
    )));
    mesh.children.push(XMLNode::Element(vertices));

    let mut triangles = Element::new("triangles");
    triangles
        .attributes
        .insert("count".to_string(), object.triangles.len().to_string());
    triangles
        .children
        .push(XMLNode::Element(build_input("VERTEX", &vertices_id, Some(0))));

    let mut current_offset = 1;
    if normals.is_some() {
        triangles.children.push(XMLNode::Element(build_input(
            "NORMAL",
            &normal_source_id,
            Some(current_offset),
        )));
        current_offset += 1;
    }
    if texcoords.is_some() {
        let mut in_t = build_input("TEXCOORD", &texcoord_source_id, Some(current_offset));
        in_t.attributes.insert("set".to_string(), "0".to_string());
        triangles.children.push(XMLNode::Element(in_t));
        current_offset += 1;
    }

    // Positions are indexed per vertex, normals and UVs per loop
    let mut p = Element::new("p");
    let mut values: Vec<String> = Vec::with_capacity(object.loop_count() * current_offset);
    for (loop_index, vertex) in object.loop_vertices().enumerate() {
        values.push(vertex.to_string());
        if normals.is_some() {
            values.push(loop_index.to_string());
        }
        if texcoords.is_some() {
            values.push(loop_index.to_string());
        }
    }
    p.children.push(XMLNode::Text(values.join(" ")));
    triangles.children.push(XMLNode::Element(p));

    mesh.children.push(XMLNode::Element(triangles));
    geometry.children.push(XMLNode::Element(mesh));
    Ok(geometry)
}

fn build_input(semantic: &str, source_id: &str, offset: Option<usize>) -> Element {
    let mut input = Element::new("input");
    input
        .attributes
        .insert("semantic".to_string(), semantic.to_string());
    input
        .attributes
        .insert("source".to_string(), format!("#{}", source_id));
    if let Some(offset) = offset {
        input
            .attributes
            .insert("offset".to_string(), offset.to_string());
    }
    input
}

fn build_asset() -> Element {
    let mut asset = Element::new("asset");

    let mut contributor = Element::new("contributor");
    let mut authoring_tool = Element::new("authoring_tool");
    authoring_tool.children.push(XMLNode::Text(format!(
        "genesis_importer {}",
        env!("CARGO_PKG_VERSION")
    )));
    contributor
        .children
        .push(XMLNode::Element(authoring_tool));
    asset.children.push(XMLNode::Element(contributor));

    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    for tag in ["created", "modified"] {
        let mut elem = Element::new(tag);
        elem.children.push(XMLNode::Text(timestamp.clone()));
        asset.children.push(XMLNode::Element(elem));
    }

    // Genesis coordinates are written without axis conversion
    let mut up_axis = Element::new("up_axis");
    up_axis.children.push(XMLNode::Text("Z_UP".to_string()));
    asset.children.push(XMLNode::Element(up_axis));

    asset
}

fn build_source_float_vec3(id: &str, data: &[[f32; 3]]) -> Element {
    let flat: Vec<f32> = data.iter().flat_map(|v| [v[0], v[1], v[2]]).collect();
    build_source_float_array(id, &flat, &["X", "Y", "Z"])
}

fn build_source_float_vec2(id: &str, data: &[[f32; 2]]) -> Element {
    let flat: Vec<f32> = data.iter().flat_map(|v| [v[0], v[1]]).collect();
    build_source_float_array(id, &flat, &["S", "T"])
}

fn build_source_float_array(id: &str, flat_data: &[f32], params: &[&str]) -> Element {
    let stride = params.len();

    let mut source = Element::new("source");
    source.attributes.insert("id".to_string(), id.to_string());

    let mut float_array = Element::new("float_array");
    float_array
        .attributes
        .insert("id".to_string(), format!("{}-array", id));
    float_array
        .attributes
        .insert("count".to_string(), flat_data.len().to_string());
    float_array.children.push(XMLNode::Text(
        flat_data
            .iter()
            .map(|v| format_float(*v))
            .collect::<Vec<_>>()
            .join(" "),
    ));
    source.children.push(XMLNode::Element(float_array));

    let mut tech = Element::new("technique_common");
    let mut accessor = Element::new("accessor");
    accessor
        .attributes
        .insert("source".to_string(), format!("#{}-array", id));
    accessor
        .attributes
        .insert("count".to_string(), (flat_data.len() / stride).to_string());
    accessor
        .attributes
        .insert("stride".to_string(), stride.to_string());

    for name in params {
        let mut param = Element::new("param");
        param.attributes.insert("name".to_string(), name.to_string());
        param
            .attributes
            .insert("type".to_string(), "float".to_string());
        accessor.children.push(XMLNode::Element(param));
    }

    tech.children.push(XMLNode::Element(accessor));
    source.children.push(XMLNode::Element(tech));
    source
}

/// Space separated values of `matrix` in row-major order.
fn matrix_to_string(matrix: Mat4) -> String {
    matrix
        .transpose()
        .to_cols_array()
        .iter()
        .map(|&v| format_float(v))
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_float(value: f32) -> String {
    if value == 0.0 {
        "0".to_string()
    } else {
        format!("{:.6}", value)
    }
}

/// Replace characters that are not valid in an XML id.
fn sanitize_id(name: &str) -> String {
    let id: String = name
        .chars()
        .map(|ch| match ch {
            c if c.is_alphanumeric() || c == '_' || c == '-' => c,
            _ => '_',
        })
        .collect();
    if id.is_empty() {
        "id".to_string()
    } else {
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Placement;
    use glam::DVec3;

    fn child<'a>(element: &'a Element, name: &str) -> &'a Element {
        element
            .get_child(name)
            .unwrap_or_else(|| panic!("missing <{}>", name))
    }

    fn text(element: &Element) -> String {
        element.get_text().map(|t| t.into_owned()).unwrap_or_default()
    }

    fn tri(loop_normals: Option<Vec<[f32; 3]>>) -> SceneObject {
        SceneObject {
            name: "Tri 1".to_string(),
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            triangles: vec![[0, 1, 2]],
            loop_uvs: None,
            loop_normals,
            placement: Placement {
                translation: DVec3::new(1.0, 2.0, 3.0),
                ..Placement::default()
            },
        }
    }

    #[test]
    fn geometry_without_loop_attributes() {
        let collada = build_collada(&[tri(None)]).unwrap();
        let geometry = child(child(&collada, "library_geometries"), "geometry");
        assert_eq!(geometry.attributes["id"], "geom_0_Tri_1");

        let triangles = child(child(geometry, "mesh"), "triangles");
        assert_eq!(triangles.attributes["count"], "1");
        assert_eq!(text(child(triangles, "p")), "0 1 2");
    }

    #[test]
    fn loop_normals_are_indexed_per_loop() {
        let collada = build_collada(&[tri(Some(vec![[0.0, 0.0, 2.0]; 3]))]).unwrap();
        let mesh = child(child(child(&collada, "library_geometries"), "geometry"), "mesh");
        let triangles = child(mesh, "triangles");
        assert_eq!(text(child(triangles, "p")), "0 0 1 1 2 2");

        let normals = mesh
            .children
            .iter()
            .filter_map(XMLNode::as_element)
            .find(|e| e.name == "source" && e.attributes["id"].ends_with("-normals"))
            .unwrap();
        assert_eq!(text(child(normals, "float_array")), "0 0 1.000000 0 0 1.000000 0 0 1.000000");
    }

    #[test]
    fn node_matrix_is_row_major() {
        let collada = build_collada(&[tri(None)]).unwrap();
        let node = child(child(child(&collada, "library_visual_scenes"), "visual_scene"), "node");
        assert_eq!(node.attributes["name"], "Tri 1");
        assert_eq!(
            text(child(node, "matrix")),
            "1.000000 0 0 1.000000 0 1.000000 0 2.000000 0 0 1.000000 3.000000 0 0 0 1.000000"
        );
    }

    #[test]
    fn sanitize_id_replaces_unsafe_characters() {
        assert_eq!(sanitize_id("a b/c"), "a_b_c");
        assert_eq!(sanitize_id(""), "id");
    }
}
