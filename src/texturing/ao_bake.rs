//! Top-down ambient-occlusion guide bake
//!
//! Renders the loaded object once from above with a flat white unlit
//! material over a black background into a square offscreen target. Every
//! piece of state the bake changes is held by a guard that puts it back when
//! dropped, so early returns and render failures restore the scene too.
//! Guards are created in the order materials, background, target size and
//! therefore restore in the reverse order.

use std::{
    io::Cursor,
    ops::{Deref, DerefMut},
    sync::Arc,
};

use image::{ImageFormat, RgbaImage};

use crate::{
    config::MAX_TEXTURE_DIMENSION,
    error::BakeError,
    gfx::{
        camera::{Camera, TopDownOrthoCamera},
        geometry::{framing::MIN_EXTENT, Aabb},
        rendering::renderer::{DrawItem, FrameDesc, MaterialHandle, Renderer},
        resources::material::Material,
        scene::{node::LoadedObject, LightRig, Scene},
    },
};

/// RGBA8 result of a bake
#[derive(Debug, Clone, PartialEq)]
pub struct BakedImage {
    pub image: RgbaImage,
}

impl BakedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// PNG encoding handed to the synthesis collaborator
    pub fn to_png(&self) -> Result<Vec<u8>, BakeError> {
        let mut bytes = Cursor::new(Vec::new());
        self.image
            .write_to(&mut bytes, ImageFormat::Png)
            .map_err(|e| BakeError::Encode(e.to_string()))?;
        Ok(bytes.into_inner())
    }
}

/// Rebinds every mesh to one material, restoring the originals on drop
pub struct MaterialOverride<'a> {
    object: &'a mut LoadedObject,
    saved: Vec<Arc<Material>>,
}

impl<'a> MaterialOverride<'a> {
    pub fn new(object: &'a mut LoadedObject, material: Arc<Material>) -> Self {
        let mut saved = Vec::new();
        object.visit_meshes_mut(&mut |mesh| {
            saved.push(std::mem::replace(&mut mesh.material, Arc::clone(&material)));
        });
        Self { object, saved }
    }
}

impl Deref for MaterialOverride<'_> {
    type Target = LoadedObject;

    fn deref(&self) -> &LoadedObject {
        self.object
    }
}

impl Drop for MaterialOverride<'_> {
    fn drop(&mut self) {
        // Same traversal order as `new`
        let mut saved = std::mem::take(&mut self.saved).into_iter();
        self.object.visit_meshes_mut(&mut |mesh| {
            if let Some(material) = saved.next() {
                mesh.material = material;
            }
        });
    }
}

/// Swaps the clear color and hides the grid, restoring both on drop
pub struct BackgroundOverride<'a> {
    background: &'a mut [f32; 3],
    grid_visible: &'a mut bool,
    saved_background: [f32; 3],
    saved_grid_visible: bool,
}

impl<'a> BackgroundOverride<'a> {
    pub fn new(background: &'a mut [f32; 3], grid_visible: &'a mut bool, color: [f32; 3]) -> Self {
        let saved_background = std::mem::replace(background, color);
        let saved_grid_visible = std::mem::replace(grid_visible, false);
        Self {
            background,
            grid_visible,
            saved_background,
            saved_grid_visible,
        }
    }

    pub fn color(&self) -> [f32; 3] {
        *self.background
    }
}

impl Drop for BackgroundOverride<'_> {
    fn drop(&mut self) {
        *self.background = self.saved_background;
        *self.grid_visible = self.saved_grid_visible;
    }
}

/// Sets the renderer's capture size, restoring the previous one on drop
///
/// The presentation surface, and with it the live viewport, is untouched.
pub struct TargetSizeOverride<'a, R: Renderer + ?Sized> {
    renderer: &'a mut R,
    saved: Option<(u32, u32)>,
}

impl<'a, R: Renderer + ?Sized> TargetSizeOverride<'a, R> {
    pub fn new(renderer: &'a mut R, size: (u32, u32)) -> Self {
        let saved = renderer.capture_size();
        renderer.set_capture_size(Some(size));
        Self { renderer, saved }
    }
}

impl<R: Renderer + ?Sized> Deref for TargetSizeOverride<'_, R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.renderer
    }
}

impl<R: Renderer + ?Sized> DerefMut for TargetSizeOverride<'_, R> {
    fn deref_mut(&mut self) -> &mut R {
        self.renderer
    }
}

impl<R: Renderer + ?Sized> Drop for TargetSizeOverride<'_, R> {
    fn drop(&mut self) {
        self.renderer.set_capture_size(self.saved);
    }
}

pub struct AoBaker {
    resolution: u32,
}

impl AoBaker {
    pub fn new(resolution: u32) -> Self {
        Self {
            resolution: resolution.clamp(1, MAX_TEXTURE_DIMENSION),
        }
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Bakes the scene's object; every mesh must already be uploaded
    ///
    /// The temporary bake material is uploaded for the duration of the call
    /// and released before returning, on success and on failure.
    pub fn bake<R: Renderer + ?Sized>(
        &self,
        renderer: &mut R,
        scene: &mut Scene,
    ) -> Result<BakedImage, BakeError> {
        let parts = scene.bake_parts();
        let object = parts.object.ok_or(BakeError::NotReady)?;
        let lights = *parts.lights;

        let bake_material = Arc::new(Material::flat_unlit("AO Bake", [1.0, 1.0, 1.0]));
        let material_handle = renderer.upload_material(&bake_material)?;

        let result = {
            // Restored in reverse order: target size, background, materials
            let materials = MaterialOverride::new(object, Arc::clone(&bake_material));
            let bounds = materials.bounds().unwrap_or_else(Aabb::empty_at_origin);
            let camera = TopDownOrthoCamera::new(bounds.center(), bounds.max_dim().max(MIN_EXTENT));
            let background = BackgroundOverride::new(parts.background, parts.grid_visible, [0.0; 3]);
            let mut target = TargetSizeOverride::new(renderer, (self.resolution, self.resolution));
            render_bake(&mut *target, &materials, &camera, background.color(), &lights, material_handle)
        };

        renderer.release_material(material_handle);
        match &result {
            Ok(image) => log::info!("AO bake finished at {}x{}", image.width(), image.height()),
            Err(err) => log::warn!("AO bake failed, scene restored: {}", err),
        }
        result
    }
}

fn render_bake<R: Renderer + ?Sized>(
    renderer: &mut R,
    object: &LoadedObject,
    camera: &TopDownOrthoCamera,
    clear_color: [f32; 3],
    lights: &LightRig,
    material: MaterialHandle,
) -> Result<BakedImage, BakeError> {
    let mut draws = Vec::new();
    let mut missing = false;
    object.visit_meshes(&mut |mesh| match mesh.gpu_handle() {
        Some(handle) => draws.push(DrawItem {
            mesh: handle,
            material,
        }),
        None => missing = true,
    });
    if missing {
        return Err(BakeError::NotReady);
    }

    let image = renderer.capture(&FrameDesc {
        camera: camera.uniform(),
        clear_color,
        lights,
        grid: None,
        draws: &draws,
    })?;
    Ok(BakedImage { image })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ViewerConfig,
        gfx::{
            geometry::primitives::cube,
            rendering::HeadlessRenderer,
            resources::ResourceCounters,
            scene::node::{GroupNode, MeshNode, SceneNode},
        },
    };

    fn scene_with_cube(renderer: &mut HeadlessRenderer) -> Scene {
        let mut scene = Scene::new(&ViewerConfig::default());
        let mut mesh = MeshNode::new("cube", cube(1.0, [0.0; 3]), Arc::new(Material::default()));
        mesh.gpu = Some(renderer.upload_mesh(&mesh.geometry).unwrap());
        mesh.dirty = false;
        scene.replace_object(LoadedObject::new(
            "cube",
            SceneNode::Group(GroupNode::new("root").with_child(SceneNode::Mesh(mesh))),
        ));
        scene
    }

    #[test]
    fn test_guards_restore_in_reverse_order() {
        let mut background = [0.1, 0.2, 0.3];
        let mut grid_visible = true;
        {
            let guard = BackgroundOverride::new(&mut background, &mut grid_visible, [0.0; 3]);
            assert_eq!(guard.color(), [0.0; 3]);
        }
        assert_eq!(background, [0.1, 0.2, 0.3]);
        assert!(grid_visible);
    }

    #[test]
    fn test_resolution_is_clamped_to_texture_limit() {
        assert_eq!(AoBaker::new(10_000).resolution(), MAX_TEXTURE_DIMENSION);
        assert_eq!(AoBaker::new(0).resolution(), 1);
        assert_eq!(AoBaker::new(512).resolution(), 512);
    }

    #[test]
    fn test_bake_is_square_and_restores_state() {
        let counters = ResourceCounters::new();
        let mut renderer = HeadlessRenderer::new(320, 200, counters.clone());
        let mut scene = scene_with_cube(&mut renderer);
        let before = counters.snapshot();
        let material_before = scene.object().unwrap().unique_materials()[0].id();

        let baked = AoBaker::new(32).bake(&mut renderer, &mut scene).unwrap();
        assert_eq!((baked.width(), baked.height()), (32, 32));
        // The cube fills the top-down view exactly
        assert_eq!(baked.image.get_pixel(16, 16).0, [255, 255, 255, 255]);

        assert_eq!(renderer.capture_size(), None);
        assert_eq!(renderer.size(), (320, 200));
        assert_eq!(scene.background, ViewerConfig::default().background);
        assert!(scene.grid_visible);
        assert_eq!(scene.object().unwrap().unique_materials()[0].id(), material_before);
        assert_eq!(counters.snapshot().buffers, before.buffers);
        assert_eq!(counters.snapshot().material_bindings, before.material_bindings);

        let png = baked.to_png().unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }

    #[test]
    fn test_failed_bake_restores_state() {
        let counters = ResourceCounters::new();
        let mut renderer = HeadlessRenderer::new(64, 64, counters.clone());
        let mut scene = scene_with_cube(&mut renderer);
        renderer.set_capture_size(Some((10, 10)));
        let material_before = scene.object().unwrap().unique_materials()[0].id();
        let bindings_before = counters.snapshot().material_bindings;

        renderer.fail_next_capture();
        let result = AoBaker::new(16).bake(&mut renderer, &mut scene);
        assert!(matches!(result, Err(BakeError::Render(_))));

        assert_eq!(renderer.capture_size(), Some((10, 10)));
        assert!(scene.grid_visible);
        assert_eq!(scene.background, ViewerConfig::default().background);
        assert_eq!(scene.object().unwrap().unique_materials()[0].id(), material_before);
        assert_eq!(counters.snapshot().material_bindings, bindings_before);
    }

    #[test]
    fn test_bake_without_object_is_not_ready() {
        let mut renderer = HeadlessRenderer::new(8, 8, ResourceCounters::new());
        let mut scene = Scene::new(&ViewerConfig::default());
        assert_eq!(
            AoBaker::new(8).bake(&mut renderer, &mut scene),
            Err(BakeError::NotReady)
        );
    }
}
