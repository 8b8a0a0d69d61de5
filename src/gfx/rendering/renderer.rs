//! The seam between the scene session and a rendering backend
//!
//! A [`Renderer`] owns every GPU object. The session only ever sees opaque
//! [`MeshHandle`]s and [`MaterialHandle`]s and describes each frame with a
//! [`FrameDesc`]. Implementations report every allocation into the shared
//! [`ResourceCounters`].

use image::RgbaImage;

use crate::{
    error::RenderError,
    gfx::{
        camera::CameraUniform,
        geometry::Geometry,
        resources::{material::Material, tracking::ResourceCounters},
        scene::{GridSettings, LightRig},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialHandle(pub(crate) u64);

/// Fails with [`RenderError::TextureTooLarge`] when either side exceeds `max`
pub fn check_texture_size(width: u32, height: u32, max: u32) -> Result<(), RenderError> {
    if width > max || height > max {
        return Err(RenderError::TextureTooLarge { width, height, max });
    }
    Ok(())
}

/// Every map of `material` must fit within `max`
pub fn check_material_maps(material: &Material, max: u32) -> Result<(), RenderError> {
    if let Some(maps) = &material.maps {
        for (_, map) in maps.iter() {
            check_texture_size(map.width(), map.height(), max)?;
        }
    }
    Ok(())
}

/// One mesh drawn with one material
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawItem {
    pub mesh: MeshHandle,
    pub material: MaterialHandle,
}

/// Everything a renderer needs to draw one frame
#[derive(Debug, Clone, Copy)]
pub struct FrameDesc<'a> {
    pub camera: CameraUniform,
    /// Linear RGB clear color
    pub clear_color: [f32; 3],
    pub lights: &'a LightRig,
    pub grid: Option<&'a GridSettings>,
    pub draws: &'a [DrawItem],
}

pub trait Renderer {
    /// Counters this renderer reports into
    fn counters(&self) -> &ResourceCounters;

    /// Size of the presentation surface in device pixels
    fn size(&self) -> (u32, u32);

    fn resize(&mut self, width: u32, height: u32);

    fn upload_mesh(&mut self, geometry: &Geometry) -> Result<MeshHandle, RenderError>;

    /// Frees the mesh's vertex and index buffers; unknown handles are ignored
    fn release_mesh(&mut self, handle: MeshHandle);

    fn upload_material(&mut self, material: &Material) -> Result<MaterialHandle, RenderError>;

    /// Frees the material's uniform, textures and bind group
    fn release_material(&mut self, handle: MaterialHandle);

    /// Draws one frame to the presentation surface
    fn render(&mut self, frame: &FrameDesc) -> Result<(), RenderError>;

    /// Size of the offscreen capture target; `None` follows the surface size
    fn capture_size(&self) -> Option<(u32, u32)>;

    /// Changes the offscreen capture target size
    ///
    /// Any cached target of a different size is released.
    fn set_capture_size(&mut self, size: Option<(u32, u32)>);

    /// Draws one frame offscreen and reads the pixels back as RGBA8
    fn capture(&mut self, frame: &FrameDesc) -> Result<RgbaImage, RenderError>;
}

impl<R: Renderer + ?Sized> Renderer for Box<R> {
    fn counters(&self) -> &ResourceCounters {
        (**self).counters()
    }

    fn size(&self) -> (u32, u32) {
        (**self).size()
    }

    fn resize(&mut self, width: u32, height: u32) {
        (**self).resize(width, height)
    }

    fn upload_mesh(&mut self, geometry: &Geometry) -> Result<MeshHandle, RenderError> {
        (**self).upload_mesh(geometry)
    }

    fn release_mesh(&mut self, handle: MeshHandle) {
        (**self).release_mesh(handle)
    }

    fn upload_material(&mut self, material: &Material) -> Result<MaterialHandle, RenderError> {
        (**self).upload_material(material)
    }

    fn release_material(&mut self, handle: MaterialHandle) {
        (**self).release_material(handle)
    }

    fn render(&mut self, frame: &FrameDesc) -> Result<(), RenderError> {
        (**self).render(frame)
    }

    fn capture_size(&self) -> Option<(u32, u32)> {
        (**self).capture_size()
    }

    fn set_capture_size(&mut self, size: Option<(u32, u32)>) {
        (**self).set_capture_size(size)
    }

    fn capture(&mut self, frame: &FrameDesc) -> Result<RgbaImage, RenderError> {
        (**self).capture(frame)
    }
}
