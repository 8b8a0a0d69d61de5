//! Scene graph nodes
//!
//! A loaded asset is a tree of [`SceneNode`]s. Only mesh nodes are drawable;
//! groups exist to keep the asset's structure. Transforms are baked into the
//! vertex data at load time, so nodes carry no matrices.

use std::sync::Arc;

use cgmath::Vector3;

use crate::gfx::{
    geometry::{Aabb, Geometry},
    rendering::renderer::MeshHandle,
    resources::material::{Material, MaterialId},
};

#[derive(Debug)]
pub enum SceneNode {
    Mesh(MeshNode),
    Group(GroupNode),
}

/// Drawable node: geometry plus a shared material reference
#[derive(Debug)]
pub struct MeshNode {
    pub name: String,
    pub geometry: Geometry,
    pub material: Arc<Material>,
    pub(crate) gpu: Option<MeshHandle>,
    pub(crate) dirty: bool,
}

impl MeshNode {
    pub fn new(name: impl Into<String>, geometry: Geometry, material: Arc<Material>) -> Self {
        Self {
            name: name.into(),
            geometry,
            material,
            gpu: None,
            dirty: true,
        }
    }

    /// Handle of the uploaded buffers, `None` until the session syncs the node
    pub fn gpu_handle(&self) -> Option<MeshHandle> {
        self.gpu
    }

    /// Flags the geometry for re-upload on the next sync
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

#[derive(Debug, Default)]
pub struct GroupNode {
    pub name: String,
    pub children: Vec<SceneNode>,
}

impl GroupNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: SceneNode) -> Self {
        self.children.push(child);
        self
    }
}

impl SceneNode {
    pub fn name(&self) -> &str {
        match self {
            SceneNode::Mesh(mesh) => &mesh.name,
            SceneNode::Group(group) => &group.name,
        }
    }

    pub fn visit_meshes<'a, F: FnMut(&'a MeshNode)>(&'a self, f: &mut F) {
        match self {
            SceneNode::Mesh(mesh) => f(mesh),
            SceneNode::Group(group) => {
                for child in &group.children {
                    child.visit_meshes(f);
                }
            }
        }
    }

    pub fn visit_meshes_mut<F: FnMut(&mut MeshNode)>(&mut self, f: &mut F) {
        match self {
            SceneNode::Mesh(mesh) => f(mesh),
            SceneNode::Group(group) => {
                for child in &mut group.children {
                    child.visit_meshes_mut(f);
                }
            }
        }
    }
}

/// The single asset shown by a session
#[derive(Debug)]
pub struct LoadedObject {
    pub name: String,
    pub root: SceneNode,
}

impl LoadedObject {
    pub fn new(name: impl Into<String>, root: SceneNode) -> Self {
        Self {
            name: name.into(),
            root,
        }
    }

    pub fn visit_meshes<'a, F: FnMut(&'a MeshNode)>(&'a self, f: &mut F) {
        self.root.visit_meshes(f);
    }

    pub fn visit_meshes_mut<F: FnMut(&mut MeshNode)>(&mut self, f: &mut F) {
        self.root.visit_meshes_mut(f);
    }

    pub fn mesh_count(&self) -> usize {
        let mut count = 0;
        self.visit_meshes(&mut |_| count += 1);
        count
    }

    pub fn vertex_count(&self) -> usize {
        let mut count = 0;
        self.visit_meshes(&mut |mesh| count += mesh.geometry.vertex_count());
        count
    }

    /// Bounding volume of every vertex, `None` when the object has no vertices
    pub fn bounds(&self) -> Option<Aabb> {
        let mut bounds: Option<Aabb> = None;
        self.visit_meshes(&mut |mesh| {
            if let Some(mesh_bounds) = mesh.geometry.bounds() {
                bounds = Some(match bounds {
                    Some(b) => b.union(&mesh_bounds),
                    None => mesh_bounds,
                });
            }
        });
        bounds
    }

    /// Moves the object so its bounding-box center sits at the origin
    ///
    /// Returns the former center. Empty objects are left untouched.
    pub fn recenter(&mut self) -> Vector3<f32> {
        let Some(bounds) = self.bounds() else {
            return Vector3::new(0.0, 0.0, 0.0);
        };
        let center = bounds.center();
        let offset = [-center.x, -center.y, -center.z];
        self.visit_meshes_mut(&mut |mesh| {
            mesh.geometry.translate(offset);
            mesh.mark_dirty();
        });
        center
    }

    /// Every distinct material referenced by a mesh, in first-use order
    pub fn unique_materials(&self) -> Vec<Arc<Material>> {
        let mut seen: Vec<MaterialId> = Vec::new();
        let mut materials = Vec::new();
        self.visit_meshes(&mut |mesh| {
            if !seen.contains(&mesh.material.id()) {
                seen.push(mesh.material.id());
                materials.push(Arc::clone(&mesh.material));
            }
        });
        materials
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::geometry::primitives::cube;

    fn two_cubes() -> LoadedObject {
        let shared = Arc::new(Material::default());
        let root = GroupNode::new("root")
            .with_child(SceneNode::Mesh(MeshNode::new(
                "a",
                cube(2.0, [5.0, 5.0, 5.0]),
                Arc::clone(&shared),
            )))
            .with_child(SceneNode::Group(GroupNode::new("inner").with_child(
                SceneNode::Mesh(MeshNode::new("b", cube(2.0, [9.0, 5.0, 5.0]), shared)),
            )));
        LoadedObject::new("pair", SceneNode::Group(root))
    }

    #[test]
    fn test_visit_reaches_nested_meshes() {
        let object = two_cubes();
        assert_eq!(object.mesh_count(), 2);
        assert_eq!(object.vertex_count(), 48);
        assert_eq!(object.unique_materials().len(), 1);
    }

    #[test]
    fn test_recenter_round_trip() {
        let mut object = two_cubes();
        let before = object.bounds().unwrap();

        let center = object.recenter();
        assert_eq!(center, Vector3::new(7.0, 5.0, 5.0));

        let after = object.bounds().unwrap();
        assert!(after.center().x.abs() < 1e-5);
        assert!(after.center().y.abs() < 1e-5);
        assert!(after.center().z.abs() < 1e-5);
        assert_eq!(after.size(), before.size());

        object.visit_meshes_mut(&mut |mesh| mesh.geometry.translate(center.into()));
        assert_eq!(object.bounds().unwrap(), before);
    }

    #[test]
    fn test_empty_object_has_no_bounds() {
        let mut object = LoadedObject::new("empty", SceneNode::Group(GroupNode::new("root")));
        assert!(object.bounds().is_none());
        assert_eq!(object.recenter(), Vector3::new(0.0, 0.0, 0.0));
    }
}
