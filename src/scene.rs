//! Scene materialization for reconstructed meshes.
//!
//! The importer never owns scene objects. It hands geometry, per-loop
//! attributes and placements to a [`MeshSink`]. [`SceneCollector`] is the
//! in-memory sink used by the exporters and the command line tool.

use anyhow::{anyhow, Result};
use glam::{DMat4, DQuat, DVec2, DVec3};

/// Receiver of imported geometry.
///
/// Loops are numbered triangle-major: loop `3 * t + c` is corner `c` of triangle `t`.
pub trait MeshSink {
    type Handle;

    /// Create a mesh object. An error skips the object.
    fn build_mesh(
        &mut self,
        name: &str,
        vertices: &[DVec3],
        triangles: &[[u32; 3]],
    ) -> Result<Self::Handle>;

    /// Assign one UV per loop. `None` leaves that loop unassigned.
    fn set_uv(&mut self, handle: &Self::Handle, per_loop: &[Option<DVec2>]) -> Result<()>;

    fn set_custom_normals(&mut self, handle: &Self::Handle, per_loop: &[DVec3]) -> Result<()>;

    fn set_world_transform(
        &mut self,
        handle: &Self::Handle,
        translation: DVec3,
        rotation: DQuat,
        scale: DVec3,
    ) -> Result<()>;
}

/// Object placement as translation, rotation and scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub translation: DVec3,
    pub rotation: DQuat,
    pub scale: DVec3,
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            translation: DVec3::ZERO,
            rotation: DQuat::IDENTITY,
            scale: DVec3::ONE,
        }
    }
}

impl Placement {
    pub fn matrix(&self) -> DMat4 {
        DMat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// A mesh object staged for export.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub triangles: Vec<[u32; 3]>,
    pub loop_uvs: Option<Vec<Option<[f32; 2]>>>,
    pub loop_normals: Option<Vec<[f32; 3]>>,
    pub placement: Placement,
}

impl SceneObject {
    pub fn loop_count(&self) -> usize {
        self.triangles.len() * 3
    }

    /// Vertex index of every loop in loop order.
    pub fn loop_vertices(&self) -> impl Iterator<Item = u32> + '_ {
        self.triangles.iter().flatten().copied()
    }

    pub fn has_loop_attributes(&self) -> bool {
        self.loop_uvs.is_some() || self.loop_normals.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHandle(usize);

/// Collects imported objects in memory.
#[derive(Debug, Default)]
pub struct SceneCollector {
    objects: Vec<SceneObject>,
}

impl SceneCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn into_objects(self) -> Vec<SceneObject> {
        self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn object_mut(&mut self, handle: &ObjectHandle) -> Result<&mut SceneObject> {
        self.objects
            .get_mut(handle.0)
            .ok_or_else(|| anyhow!("Unknown object handle {}", handle.0))
    }

    /// Suffix `.001`, `.002`, ... until the name is unused.
    fn unique_name(&self, name: &str) -> String {
        let taken = |candidate: &str| self.objects.iter().any(|o| o.name == candidate);
        if !taken(name) {
            return name.to_string();
        }
        (1..)
            .map(|n| format!("{}.{:03}", name, n))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| name.to_string())
    }
}

impl MeshSink for SceneCollector {
    type Handle = ObjectHandle;

    fn build_mesh(
        &mut self,
        name: &str,
        vertices: &[DVec3],
        triangles: &[[u32; 3]],
    ) -> Result<ObjectHandle> {
        if vertices.is_empty() {
            return Err(anyhow!("Mesh '{}' has no vertices", name));
        }
        if triangles.is_empty() {
            return Err(anyhow!("Mesh '{}' has no triangles", name));
        }
        if u32::try_from(vertices.len()).is_err() {
            return Err(anyhow!(
                "Mesh '{}' has {} vertices, more than a u32 index can address",
                name,
                vertices.len()
            ));
        }

        let positions: Vec<[f32; 3]> = vertices.iter().map(|v| v.as_vec3().to_array()).collect();
        if let Some(bad) = positions.iter().position(|p| p.iter().any(|c| !c.is_finite())) {
            return Err(anyhow!(
                "Mesh '{}' has a non-finite vertex at index {}",
                name,
                bad
            ));
        }

        let vertex_count = vertices.len() as u32;
        if let Some(triangle) = triangles.iter().find(|t| t.iter().any(|&i| i >= vertex_count)) {
            return Err(anyhow!(
                "Mesh '{}' has triangle {:?} referencing a missing vertex (vertex count: {})",
                name,
                triangle,
                vertex_count
            ));
        }

        let name = self.unique_name(name);
        log::debug!(
            "Staged mesh '{}': {} vertices, {} triangles",
            name,
            positions.len(),
            triangles.len()
        );

        self.objects.push(SceneObject {
            name,
            positions,
            triangles: triangles.to_vec(),
            loop_uvs: None,
            loop_normals: None,
            placement: Placement::default(),
        });
        Ok(ObjectHandle(self.objects.len() - 1))
    }

    fn set_uv(&mut self, handle: &ObjectHandle, per_loop: &[Option<DVec2>]) -> Result<()> {
        let object = self.object_mut(handle)?;
        if per_loop.len() != object.loop_count() {
            return Err(anyhow!(
                "Mesh '{}': UV count ({}) != loop count ({})",
                object.name,
                per_loop.len(),
                object.loop_count()
            ));
        }
        object.loop_uvs = Some(
            per_loop
                .iter()
                .map(|uv| uv.map(|uv| uv.as_vec2().to_array()))
                .collect(),
        );
        Ok(())
    }

    fn set_custom_normals(&mut self, handle: &ObjectHandle, per_loop: &[DVec3]) -> Result<()> {
        let object = self.object_mut(handle)?;
        if per_loop.len() != object.loop_count() {
            return Err(anyhow!(
                "Mesh '{}': Normal count ({}) != loop count ({})",
                object.name,
                per_loop.len(),
                object.loop_count()
            ));
        }
        if per_loop.iter().any(|n| !n.is_finite()) {
            return Err(anyhow!("Mesh '{}' has non-finite normals", object.name));
        }
        object.loop_normals = Some(per_loop.iter().map(|n| n.as_vec3().to_array()).collect());
        Ok(())
    }

    fn set_world_transform(
        &mut self,
        handle: &ObjectHandle,
        translation: DVec3,
        rotation: DQuat,
        scale: DVec3,
    ) -> Result<()> {
        let object = self.object_mut(handle)?;
        if !(translation.is_finite() && rotation.is_finite() && scale.is_finite()) {
            return Err(anyhow!("Mesh '{}' has a non-finite placement", object.name));
        }
        object.placement = Placement {
            translation,
            rotation,
            scale,
        };
        Ok(())
    }
}
