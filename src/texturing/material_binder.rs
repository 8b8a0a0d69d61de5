use std::sync::Arc;

use crate::{
    config::{PbrConfig, MAX_TEXTURE_DIMENSION},
    error::MaterialError,
    gfx::{
        geometry::Geometry,
        resources::material::Material,
        scene::node::LoadedObject,
    },
    texturing::maps::EncodedMapSet,
};

/// Builds one PBR material from a synthesized map set and binds it to every mesh
#[derive(Debug, Clone)]
pub struct MaterialBinder {
    metalness: f32,
    ao_intensity: f32,
}

impl MaterialBinder {
    pub fn new(config: &PbrConfig) -> Self {
        Self {
            metalness: config.metalness,
            ao_intensity: config.ao_intensity,
        }
    }

    /// Replaces every mesh's material with one shared PBR material
    ///
    /// All four maps are decoded before the object is touched, so any error
    /// leaves the current materials in place. Returns the new material.
    pub fn apply(
        &self,
        object: Option<&mut LoadedObject>,
        maps: &EncodedMapSet,
    ) -> Result<Arc<Material>, MaterialError> {
        let object = object.ok_or(MaterialError::NoObjectLoaded)?;
        let mut decoded = maps.decode()?;
        for role in decoded.fit_within(MAX_TEXTURE_DIMENSION) {
            log::warn!(
                "{} map exceeds {} px and was downscaled",
                role.key(),
                MAX_TEXTURE_DIMENSION
            );
        }

        let material = Arc::new(Material::pbr(
            "Synthesized PBR",
            Arc::new(decoded),
            self.metalness,
            self.ao_intensity,
        ));

        let mut provisioned = 0;
        object.visit_meshes_mut(&mut |mesh| {
            if ensure_secondary_uvs(&mut mesh.geometry) {
                mesh.mark_dirty();
                provisioned += 1;
            }
            mesh.material = Arc::clone(&material);
        });
        if provisioned > 0 {
            log::debug!("Provisioned secondary UVs on {} meshes", provisioned);
        }
        log::info!(
            "Applied PBR material {:?} to '{}' ({} meshes)",
            material.id(),
            object.name,
            object.mesh_count()
        );
        Ok(material)
    }
}

/// Adds a `uv2` set copied from the primary UVs, or zeros when there are none
///
/// Returns whether the geometry changed.
pub fn ensure_secondary_uvs(geometry: &mut Geometry) -> bool {
    if geometry.uv2.is_some() {
        return false;
    }
    let uv2 = match &geometry.uvs {
        Some(uvs) => uvs.clone(),
        None => vec![[0.0, 0.0]; geometry.vertex_count()],
    };
    geometry.uv2 = Some(uv2);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        gfx::{
            geometry::primitives::cube,
            resources::pbr_maps::MapRole,
            scene::node::{GroupNode, MeshNode, SceneNode},
        },
        texturing::maps::fixtures::full_set,
    };

    fn object() -> LoadedObject {
        let without_uvs = {
            let mut geometry = cube(1.0, [0.0; 3]);
            geometry.uvs = None;
            geometry
        };
        let root = GroupNode::new("root")
            .with_child(SceneNode::Mesh(MeshNode::new(
                "a",
                cube(1.0, [0.0; 3]),
                Arc::new(Material::default()),
            )))
            .with_child(SceneNode::Mesh(MeshNode::new(
                "b",
                without_uvs,
                Arc::new(Material::default()),
            )));
        LoadedObject::new("pair", SceneNode::Group(root))
    }

    #[test]
    fn test_one_shared_material() {
        let mut object = object();
        let binder = MaterialBinder::new(&PbrConfig::default());
        let material = binder.apply(Some(&mut object), &full_set()).unwrap();

        let materials = object.unique_materials();
        assert_eq!(materials.len(), 1);
        assert_eq!(materials[0].id(), material.id());
        assert!((material.metallic - 0.1).abs() < 1e-6);
        assert_eq!(material.occlusion_strength, 1.0);
        assert_eq!(material.texture_count(), 4);
    }

    #[test]
    fn test_secondary_uvs_are_provisioned() {
        let mut object = object();
        MaterialBinder::new(&PbrConfig::default())
            .apply(Some(&mut object), &full_set())
            .unwrap();
        object.visit_meshes(&mut |mesh| {
            let uv2 = mesh.geometry.uv2.as_ref().unwrap();
            assert_eq!(uv2.len(), mesh.geometry.vertex_count());
            match &mesh.geometry.uvs {
                Some(uvs) => assert_eq!(uvs, uv2),
                None => assert!(uv2.iter().all(|uv| *uv == [0.0, 0.0])),
            }
        });
    }

    #[test]
    fn test_missing_map_leaves_object_untouched() {
        let mut object = object();
        let before: Vec<_> = object.unique_materials().iter().map(|m| m.id()).collect();
        let mut maps = full_set();
        maps.remove(MapRole::Roughness);

        let result = MaterialBinder::new(&PbrConfig::default()).apply(Some(&mut object), &maps);
        assert_eq!(result.unwrap_err(), MaterialError::MissingMap("roughness"));

        let after: Vec<_> = object.unique_materials().iter().map(|m| m.id()).collect();
        assert_eq!(before, after);
        object.visit_meshes(&mut |mesh| assert!(mesh.geometry.uv2.is_none()));
    }

    #[test]
    fn test_oversized_map_is_downscaled() {
        let wide = image::RgbaImage::from_pixel(MAX_TEXTURE_DIMENSION + 4, 2, image::Rgba([9, 9, 9, 255]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        wide.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
        let maps = full_set().with(MapRole::Albedo, bytes.into_inner());

        let mut object = object();
        let material = MaterialBinder::new(&PbrConfig::default())
            .apply(Some(&mut object), &maps)
            .unwrap();
        let albedo = &material.maps.as_ref().unwrap().albedo;
        assert_eq!(albedo.width(), MAX_TEXTURE_DIMENSION);
        assert_eq!(albedo.height(), 1);
    }

    #[test]
    fn test_no_object() {
        let result = MaterialBinder::new(&PbrConfig::default()).apply(None, &full_set());
        assert_eq!(result.unwrap_err(), MaterialError::NoObjectLoaded);
    }
}
