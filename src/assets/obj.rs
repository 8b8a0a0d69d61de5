//! Wavefront OBJ via `tobj`
//!
//! MTL libraries live next to the OBJ on disk and cannot be resolved from a
//! byte stream, so every model gets the shared default material.

use std::{io::BufReader, sync::Arc};

use crate::{
    error::LoadError,
    gfx::{
        geometry::Geometry,
        resources::material::Material,
        scene::node::{GroupNode, LoadedObject, MeshNode, SceneNode},
    },
};

/// Parses OBJ text into a scene graph named `name`
pub fn parse(bytes: &[u8], name: &str) -> Result<LoadedObject, LoadError> {
    let mut reader = BufReader::new(bytes);
    let (models, _materials) = tobj::load_obj_buf(
        &mut reader,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |_| Err(tobj::LoadError::OpenFileFailed),
    )
    .map_err(|e| LoadError::Parse(format!("OBJ: {e}")))?;

    if models.iter().all(|m| m.mesh.positions.is_empty()) {
        return Err(LoadError::Parse("OBJ contains no geometry".to_string()));
    }

    let material = Arc::new(Material::default());
    let mut root = GroupNode::new(name);

    for (i, model) in models.iter().enumerate() {
        let mesh = &model.mesh;
        if mesh.positions.is_empty() {
            continue;
        }
        let positions: Vec<[f32; 3]> = mesh
            .positions
            .chunks_exact(3)
            .map(|p| [p[0], p[1], p[2]])
            .collect();
        if let Some(&bad) = mesh.indices.iter().find(|&&i| i as usize >= positions.len()) {
            return Err(LoadError::Parse(format!("OBJ index {bad} out of range")));
        }

        // Use normals from OBJ if available, otherwise calculate them
        let normals = if !mesh.normals.is_empty() && mesh.normals.len() == mesh.positions.len() {
            mesh.normals.chunks_exact(3).map(|n| [n[0], n[1], n[2]]).collect()
        } else {
            Geometry::calculate_normals(&positions, &mesh.indices)
        };

        let mut geometry = Geometry::new(positions, normals, mesh.indices.clone());
        if !mesh.texcoords.is_empty() && mesh.texcoords.len() / 2 == geometry.vertex_count() {
            // OBJ puts v = 0 at the bottom
            geometry = geometry.with_uvs(
                mesh.texcoords
                    .chunks_exact(2)
                    .map(|t| [t[0], 1.0 - t[1]])
                    .collect(),
            );
        }

        let mesh_name = if model.name.is_empty() {
            format!("mesh_{i}")
        } else {
            model.name.clone()
        };
        root.children.push(SceneNode::Mesh(MeshNode::new(
            mesh_name,
            geometry,
            Arc::clone(&material),
        )));
    }

    let object = LoadedObject::new(name, SceneNode::Group(root));
    log::info!(
        "OBJ '{}': {} meshes, {} vertices",
        name,
        object.mesh_count(),
        object.vertex_count()
    );
    Ok(object)
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// Unit quad in the XY plane made of two triangles
    pub const QUAD: &str = "o Quad
v -1 -1 0
v 1 -1 0
v 1 1 0
v -1 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
f 1/1 2/2 3/3 4/4
";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_is_triangulated() {
        let object = parse(fixtures::QUAD.as_bytes(), "quad").unwrap();
        assert_eq!(object.mesh_count(), 1);
        object.visit_meshes(&mut |mesh| {
            assert_eq!(mesh.name, "Quad");
            assert_eq!(mesh.geometry.triangle_count(), 2);
            assert_eq!(mesh.geometry.normals[0], [0.0, 0.0, 1.0]);
            assert!(mesh.geometry.uvs.is_some());
        });
    }

    #[test]
    fn test_empty_obj_is_parse_error() {
        assert!(matches!(parse(b"# nothing here\n", "empty"), Err(LoadError::Parse(_))));
    }
}
