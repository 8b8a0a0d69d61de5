//! Material system for PBR rendering
//!
//! [`Material`] is the CPU-side description shared between mesh nodes through
//! an `Arc`. Every material gets a process-unique [`MaterialId`] so renderers
//! can cache one GPU binding per material no matter how many meshes use it.
//! [`GpuMaterial`] is that binding: a uniform buffer, the material's map
//! textures and a bind group in the layout described by [`MaterialBindings`].

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use wgpu::Device;

use super::{pbr_maps::MapRole, pbr_maps::PbrMapSet, texture_resource::TextureResource};
use crate::wgpu_utils::{
    binding_builder::{BindGroupBuilder, BindGroupLayoutBuilder, BindGroupLayoutWithDesc},
    uniform_buffer::UniformBuffer,
};

static NEXT_MATERIAL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique material identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(u64);

impl MaterialId {
    fn next() -> Self {
        MaterialId(NEXT_MATERIAL_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Lighting model of a material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Shading {
    #[default]
    Lit,
    /// Outputs the base color untouched by lights
    Unlit,
}

/// Material definition with PBR properties
///
/// Not `Clone`: a copy would share the id of a different instance. Build a
/// new material instead.
#[derive(Debug)]
pub struct Material {
    id: MaterialId,
    pub name: String,
    pub shading: Shading,
    pub base_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub normal_scale: f32,
    /// Strength of the AO map (sampled through the secondary UV set)
    pub occlusion_strength: f32,
    pub emissive: [f32; 3],
    pub maps: Option<Arc<PbrMapSet>>,
}

impl Default for Material {
    fn default() -> Self {
        Self::new("Default", [0.8, 0.8, 0.8, 1.0], 0.0, 0.5)
    }
}

impl Material {
    /// Creates a new lit material with basic PBR properties
    ///
    /// # Arguments
    /// * `name` - Display name, not required to be unique
    /// * `base_color` - RGBA base color
    /// * `metallic` - Metallic factor (0.0 = dielectric, 1.0 = metallic)
    /// * `roughness` - Surface roughness (0.0 = mirror, 1.0 = rough)
    pub fn new(name: &str, base_color: [f32; 4], metallic: f32, roughness: f32) -> Self {
        Self {
            id: MaterialId::next(),
            name: name.to_string(),
            shading: Shading::Lit,
            base_color,
            metallic: metallic.clamp(0.0, 1.0),
            roughness: roughness.clamp(0.0, 1.0),
            normal_scale: 1.0,
            occlusion_strength: 1.0,
            emissive: [0.0, 0.0, 0.0],
            maps: None,
        }
    }

    /// Flat color that ignores scene lighting
    pub fn flat_unlit(name: &str, color: [f32; 3]) -> Self {
        Self::new(name, [color[0], color[1], color[2], 1.0], 0.0, 1.0).with_shading(Shading::Unlit)
    }

    /// Textured material driven entirely by a synthesized map set
    pub fn pbr(name: &str, maps: Arc<PbrMapSet>, metallic: f32, occlusion_strength: f32) -> Self {
        let mut material = Self::new(name, [1.0, 1.0, 1.0, 1.0], metallic, 1.0);
        material.occlusion_strength = occlusion_strength.max(0.0);
        material.maps = Some(maps);
        material
    }

    pub fn id(&self) -> MaterialId {
        self.id
    }

    pub fn with_emission(mut self, r: f32, g: f32, b: f32) -> Self {
        self.emissive = [r, g, b];
        self
    }

    pub fn with_shading(mut self, shading: Shading) -> Self {
        self.shading = shading;
        self
    }

    /// Number of GPU textures a binding of this material owns
    pub fn texture_count(&self) -> usize {
        if self.maps.is_some() {
            MapRole::ALL.len()
        } else {
            0
        }
    }

    pub fn uniform(&self) -> MaterialUniform {
        let mut flags = 0;
        if self.shading == Shading::Unlit {
            flags |= MaterialUniform::FLAG_UNLIT;
        }
        if self.maps.is_some() {
            flags |= MaterialUniform::FLAG_HAS_MAPS;
        }
        MaterialUniform {
            base_color: self.base_color,
            metallic: self.metallic,
            roughness: self.roughness,
            normal_scale: self.normal_scale,
            occlusion_strength: self.occlusion_strength,
            emissive: self.emissive,
            flags,
        }
    }
}

/// GPU uniform data for materials
///
/// Must match `MaterialUniform` in `pbr.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniform {
    pub base_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub normal_scale: f32,
    pub occlusion_strength: f32,
    pub emissive: [f32; 3],
    pub flags: u32,
}

impl MaterialUniform {
    pub const FLAG_UNLIT: u32 = 1;
    pub const FLAG_HAS_MAPS: u32 = 2;
}

type MaterialUBO = UniformBuffer<MaterialUniform>;

/// Material bind group layout shared by every material of a renderer
///
/// Slot order: uniform, albedo, normal, roughness, ao, sampler.
pub struct MaterialBindings {
    bind_group_layout: BindGroupLayoutWithDesc,
    fallback: [TextureResource; 4],
}

impl MaterialBindings {
    pub fn new(device: &Device, queue: &wgpu::Queue) -> Self {
        let bind_group_layout = BindGroupLayoutBuilder::new()
            .uniform(wgpu::ShaderStages::FRAGMENT)
            .fragment_texture()
            .fragment_texture()
            .fragment_texture()
            .fragment_texture()
            .fragment_sampler()
            .create(device, "Material Bind Group");

        // Neutral maps: white albedo, flat normal, full roughness, no occlusion
        let fallback = [
            TextureResource::create_solid(device, queue, [255, 255, 255, 255], true, "Fallback Albedo"),
            TextureResource::create_solid(device, queue, [128, 128, 255, 255], false, "Fallback Normal"),
            TextureResource::create_solid(device, queue, [255, 255, 255, 255], false, "Fallback Roughness"),
            TextureResource::create_solid(device, queue, [255, 255, 255, 255], false, "Fallback AO"),
        ];

        MaterialBindings {
            bind_group_layout,
            fallback,
        }
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout.layout
    }

    /// Number of textures owned by the shared fallback set
    pub fn fallback_texture_count(&self) -> usize {
        self.fallback.len()
    }
}

/// GPU resources of one material
pub struct GpuMaterial {
    ubo: MaterialUBO,
    textures: Vec<TextureResource>,
    bind_group: wgpu::BindGroup,
}

impl GpuMaterial {
    pub fn new(
        device: &Device,
        queue: &wgpu::Queue,
        bindings: &MaterialBindings,
        material: &Material,
    ) -> Self {
        let ubo = MaterialUBO::new(device, &format!("Material UBO: {}", material.name), &material.uniform());

        let textures: Vec<TextureResource> = match &material.maps {
            Some(maps) => maps
                .iter()
                .map(|(role, image)| {
                    TextureResource::create_from_rgba(
                        device,
                        queue,
                        image,
                        role.is_srgb(),
                        &format!("{} {}", material.name, role.key()),
                    )
                })
                .collect(),
            None => Vec::new(),
        };

        let sources: &[TextureResource] = if textures.is_empty() {
            &bindings.fallback
        } else {
            &textures
        };

        let bind_group = BindGroupBuilder::new(&bindings.bind_group_layout)
            .resource(ubo.binding_resource())
            .texture(&sources[0].view)
            .texture(&sources[1].view)
            .texture(&sources[2].view)
            .texture(&sources[3].view)
            .sampler(&sources[0].sampler)
            .create(device, &format!("Material: {}", material.name));

        Self {
            ubo,
            textures,
            bind_group,
        }
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Frees the uniform buffer and owned maps; shared fallbacks are untouched
    pub fn destroy(&self) {
        self.ubo.destroy();
        for texture in &self.textures {
            texture.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn maps() -> Arc<PbrMapSet> {
        let image = RgbaImage::new(2, 2);
        Arc::new(PbrMapSet {
            albedo: image.clone(),
            normal: image.clone(),
            roughness: image.clone(),
            ao: image,
        })
    }

    #[test]
    fn test_material_ids_are_unique() {
        let a = Material::default();
        let b = Material::default();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_uniform_flags() {
        let unlit = Material::flat_unlit("Bake", [1.0, 1.0, 1.0]);
        assert_eq!(unlit.uniform().flags, MaterialUniform::FLAG_UNLIT);
        assert_eq!(unlit.texture_count(), 0);

        let textured = Material::pbr("Synth", maps(), 0.1, 1.0);
        assert_eq!(textured.uniform().flags, MaterialUniform::FLAG_HAS_MAPS);
        assert_eq!(textured.uniform().metallic, 0.1);
        assert_eq!(textured.texture_count(), 4);
    }

    #[test]
    fn test_uniform_size_is_16_byte_aligned() {
        assert_eq!(std::mem::size_of::<MaterialUniform>() % 16, 0);
    }
}
