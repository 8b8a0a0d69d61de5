//! Device-free renderer
//!
//! [`HeadlessRenderer`] implements [`Renderer`] with a small scanline-free
//! CPU rasterizer: triangles are transformed by the frame's view-projection,
//! filled with barycentric coverage tests against a depth buffer and shaded
//! with a Lambert approximation of `pbr.wgsl`. It keeps the same resource
//! accounting as the wgpu engine, so leak checks run without a GPU.

use std::{collections::HashMap, sync::Arc};

use cgmath::{InnerSpace, Matrix4, Vector3, Vector4};
use image::{Rgba, RgbaImage};

use crate::{
    config::MAX_TEXTURE_DIMENSION,
    error::RenderError,
    gfx::{
        geometry::Geometry,
        resources::{
            material::{Material, MaterialUniform},
            pbr_maps::PbrMapSet,
            tracking::{ResourceCounters, ResourceKind},
        },
        scene::{vertex::Vertex3D, GridSettings, LightRig},
    },
};

use super::renderer::{
    check_material_maps, check_texture_size, FrameDesc, MaterialHandle, MeshHandle, Renderer,
};

/// Buffers and textures owned by the renderer itself (globals, depth, fallbacks)
const BASE_BUFFERS: usize = 2;
const BASE_TEXTURES: usize = 5;

struct CpuMesh {
    vertices: Vec<Vertex3D>,
    indices: Vec<u32>,
}

struct CpuMaterial {
    uniform: MaterialUniform,
    maps: Option<Arc<PbrMapSet>>,
    texture_count: usize,
}

/// What the most recent `render` or `capture` call drew
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    pub clear_color: [f32; 3],
    pub draw_count: usize,
    pub grid_drawn: bool,
    pub materials: Vec<MaterialHandle>,
    pub size: (u32, u32),
}

pub struct HeadlessRenderer {
    size: (u32, u32),
    counters: ResourceCounters,
    meshes: HashMap<u64, CpuMesh>,
    materials: HashMap<u64, CpuMaterial>,
    next_handle: u64,
    capture_size: Option<(u32, u32)>,
    capture_target: Option<(u32, u32)>,
    frames_rendered: usize,
    last_frame: Option<FrameRecord>,
    last_image: Option<RgbaImage>,
    fail_next_capture: bool,
}

impl HeadlessRenderer {
    pub fn new(width: u32, height: u32, counters: ResourceCounters) -> Self {
        counters.created(ResourceKind::Device, 1);
        counters.created(ResourceKind::Buffer, BASE_BUFFERS);
        counters.created(ResourceKind::Texture, BASE_TEXTURES);
        log::debug!("Headless renderer created at {}x{}", width, height);
        Self {
            size: (width.max(1), height.max(1)),
            counters,
            meshes: HashMap::new(),
            materials: HashMap::new(),
            next_handle: 1,
            capture_size: None,
            capture_target: None,
            frames_rendered: 0,
            last_frame: None,
            last_image: None,
            fail_next_capture: false,
        }
    }

    /// Makes the next `capture` call fail with a readback error
    pub fn fail_next_capture(&mut self) {
        self.fail_next_capture = true;
    }

    pub fn frames_rendered(&self) -> usize {
        self.frames_rendered
    }

    pub fn last_frame(&self) -> Option<&FrameRecord> {
        self.last_frame.as_ref()
    }

    /// Pixels of the most recent presented frame
    pub fn last_image(&self) -> Option<&RgbaImage> {
        self.last_image.as_ref()
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    /// Uniform of an uploaded material
    pub fn material_uniform(&self, handle: MaterialHandle) -> Option<MaterialUniform> {
        self.materials.get(&handle.0).map(|m| m.uniform)
    }

    fn next_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn release_capture_target(&mut self) {
        if self.capture_target.take().is_some() {
            self.counters.released(ResourceKind::Texture, 2);
        }
    }

    fn record(&mut self, frame: &FrameDesc, size: (u32, u32)) {
        self.last_frame = Some(FrameRecord {
            clear_color: frame.clear_color,
            draw_count: frame.draws.len(),
            grid_drawn: frame.grid.is_some(),
            materials: frame.draws.iter().map(|d| d.material).collect(),
            size,
        });
    }

    fn rasterize(&self, frame: &FrameDesc, (width, height): (u32, u32)) -> Result<RgbaImage, RenderError> {
        let clear = Rgba(encode_color(frame.clear_color, 1.0));
        let mut image = RgbaImage::from_pixel(width, height, clear);
        let mut depth = vec![f32::INFINITY; (width * height) as usize];
        let view_proj = Matrix4::from(frame.camera.view_proj);
        let eye = Vector3::new(
            frame.camera.view_position[0],
            frame.camera.view_position[1],
            frame.camera.view_position[2],
        );

        for draw in frame.draws {
            let mesh = self.meshes.get(&draw.mesh.0).ok_or(RenderError::UnknownHandle {
                kind: "mesh",
                id: draw.mesh.0,
            })?;
            let material = self
                .materials
                .get(&draw.material.0)
                .ok_or(RenderError::UnknownHandle {
                    kind: "material",
                    id: draw.material.0,
                })?;

            let projected: Vec<Option<ScreenVertex>> = mesh
                .vertices
                .iter()
                .map(|v| project(&view_proj, v.position, width, height))
                .collect();

            for triangle in mesh.indices.chunks_exact(3) {
                let corners = [triangle[0] as usize, triangle[1] as usize, triangle[2] as usize];
                let (Some(Some(a)), Some(Some(b)), Some(Some(c))) = (
                    projected.get(corners[0]),
                    projected.get(corners[1]),
                    projected.get(corners[2]),
                ) else {
                    // Behind the eye or out of range; no clipping here
                    continue;
                };
                let source = [
                    &mesh.vertices[corners[0]],
                    &mesh.vertices[corners[1]],
                    &mesh.vertices[corners[2]],
                ];
                fill_triangle(
                    [a, b, c],
                    &mut depth,
                    width,
                    height,
                    |x, y, weights| {
                        let color = shade(material, frame.lights, eye, &source, weights);
                        image.put_pixel(x, y, Rgba(color));
                    },
                );
            }
        }

        if let Some(grid) = frame.grid {
            draw_grid(&mut image, &depth, &view_proj, grid);
        }

        Ok(image)
    }
}

#[derive(Debug, Clone, Copy)]
struct ScreenVertex {
    x: f32,
    y: f32,
    z: f32,
}

fn project(view_proj: &Matrix4<f32>, position: [f32; 3], width: u32, height: u32) -> Option<ScreenVertex> {
    let clip = view_proj * Vector4::new(position[0], position[1], position[2], 1.0);
    if clip.w <= f32::EPSILON {
        return None;
    }
    let ndc = clip.truncate() / clip.w;
    Some(ScreenVertex {
        x: (ndc.x + 1.0) * 0.5 * width as f32,
        y: (1.0 - ndc.y) * 0.5 * height as f32,
        z: ndc.z,
    })
}

fn edge(a: &ScreenVertex, b: &ScreenVertex, px: f32, py: f32) -> f32 {
    (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)
}

/// Fills pixels whose centers fall inside the triangle, either winding
fn fill_triangle<F: FnMut(u32, u32, [f32; 3])>(
    [a, b, c]: [&ScreenVertex; 3],
    depth: &mut [f32],
    width: u32,
    height: u32,
    mut plot: F,
) {
    let area = edge(a, b, c.x, c.y);
    if area.abs() <= f32::EPSILON {
        return;
    }

    let min_x = a.x.min(b.x).min(c.x).floor().max(0.0) as u32;
    let min_y = a.y.min(b.y).min(c.y).floor().max(0.0) as u32;
    let max_x = (a.x.max(b.x).max(c.x).ceil().max(0.0) as u32).min(width);
    let max_y = (a.y.max(b.y).max(c.y).ceil().max(0.0) as u32).min(height);

    for y in min_y..max_y {
        for x in min_x..max_x {
            let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
            let w0 = edge(b, c, px, py) / area;
            let w1 = edge(c, a, px, py) / area;
            let w2 = edge(a, b, px, py) / area;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }
            let z = w0 * a.z + w1 * b.z + w2 * c.z;
            if !(0.0..=1.0).contains(&z) {
                continue;
            }
            let index = (y * width + x) as usize;
            if z < depth[index] {
                depth[index] = z;
                plot(x, y, [w0, w1, w2]);
            }
        }
    }
}

fn interpolate<const N: usize>(values: [[f32; N]; 3], weights: [f32; 3]) -> [f32; N] {
    let mut out = [0.0; N];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = values[0][i] * weights[0] + values[1][i] * weights[1] + values[2][i] * weights[2];
    }
    out
}

fn sample(image: &RgbaImage, uv: [f32; 2]) -> [f32; 4] {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return [1.0; 4];
    }
    let u = uv[0].rem_euclid(1.0);
    let v = uv[1].rem_euclid(1.0);
    let x = ((u * w as f32) as u32).min(w - 1);
    let y = ((v * h as f32) as u32).min(h - 1);
    let p = image.get_pixel(x, y).0;
    [
        p[0] as f32 / 255.0,
        p[1] as f32 / 255.0,
        p[2] as f32 / 255.0,
        p[3] as f32 / 255.0,
    ]
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f32) -> f32 {
    let c = c.clamp(0.0, 1.0);
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

/// Encodes a linear color the way an sRGB render target stores it
fn encode_color(rgb: [f32; 3], alpha: f32) -> [u8; 4] {
    [
        (linear_to_srgb(rgb[0]) * 255.0).round() as u8,
        (linear_to_srgb(rgb[1]) * 255.0).round() as u8,
        (linear_to_srgb(rgb[2]) * 255.0).round() as u8,
        (alpha.clamp(0.0, 1.0) * 255.0).round() as u8,
    ]
}

fn shade(
    material: &CpuMaterial,
    lights: &LightRig,
    eye: Vector3<f32>,
    source: &[&Vertex3D; 3],
    weights: [f32; 3],
) -> [u8; 4] {
    let uniform = &material.uniform;
    let uv = interpolate([source[0].uv, source[1].uv, source[2].uv], weights);
    let uv2 = interpolate([source[0].uv2, source[1].uv2, source[2].uv2], weights);

    let mut base = uniform.base_color;
    let mut occlusion = 1.0;
    let mut roughness = uniform.roughness;
    if let Some(maps) = &material.maps {
        let albedo = sample(&maps.albedo, uv);
        for i in 0..3 {
            base[i] *= srgb_to_linear(albedo[i]);
        }
        base[3] *= albedo[3];
        roughness *= sample(&maps.roughness, uv)[1];
        let ao = sample(&maps.ao, uv2)[0];
        occlusion = 1.0 + (ao - 1.0) * uniform.occlusion_strength;
    }

    if uniform.flags & MaterialUniform::FLAG_UNLIT != 0 {
        return encode_color([base[0], base[1], base[2]], base[3]);
    }

    let normal = Vector3::from(interpolate(
        [source[0].normal, source[1].normal, source[2].normal],
        weights,
    ));
    let position = Vector3::from(interpolate(
        [source[0].position, source[1].position, source[2].position],
        weights,
    ));
    let n = if normal.magnitude2() > 0.0 {
        normal.normalize()
    } else {
        Vector3::unit_y()
    };
    let l = Vector3::from(lights.direction_to_light());
    let n_dot_l = n.dot(l).max(0.0);

    // Crude highlight standing in for the GGX lobe
    let v = (eye - position).normalize();
    let h = (v + l).normalize();
    let shininess = 2.0 / (roughness.clamp(0.04, 1.0).powi(4)) - 2.0;
    let specular = 0.04 * n.dot(h).max(0.0).powf(shininess.max(1.0)) * n_dot_l;

    let inv_pi = std::f32::consts::FRAC_1_PI;
    let mut rgb = [0.0; 3];
    for (i, channel) in rgb.iter_mut().enumerate() {
        let diffuse = base[i] * (1.0 - uniform.metallic);
        let direct = (diffuse * inv_pi) * lights.directional_color[i] * lights.directional_intensity * n_dot_l
            + specular * lights.directional_color[i] * lights.directional_intensity;
        let indirect =
            diffuse * inv_pi * lights.ambient_color[i] * lights.ambient_intensity * occlusion;
        *channel = direct + indirect + uniform.emissive[i];
    }
    encode_color(rgb, base[3])
}

/// Plots grid line endpoints sampled along each segment, depth-tested only
/// against the cleared value so lines never cover the mesh
fn draw_grid(image: &mut RgbaImage, depth: &[f32], view_proj: &Matrix4<f32>, grid: &GridSettings) {
    let (width, height) = image.dimensions();
    let color = Rgba(encode_color(grid.color, 1.0));
    let vertices = grid.line_vertices();
    for segment in vertices.chunks_exact(2) {
        let (p0, p1) = (segment[0].position, segment[1].position);
        let steps = (width.max(height) * 2) as usize;
        for step in 0..=steps {
            let t = step as f32 / steps as f32;
            let point = [
                p0[0] + (p1[0] - p0[0]) * t,
                p0[1] + (p1[1] - p0[1]) * t,
                p0[2] + (p1[2] - p0[2]) * t,
            ];
            let Some(screen) = project(view_proj, point, width, height) else {
                continue;
            };
            if screen.x < 0.0 || screen.y < 0.0 || !(0.0..=1.0).contains(&screen.z) {
                continue;
            }
            let (x, y) = (screen.x as u32, screen.y as u32);
            if x >= width || y >= height {
                continue;
            }
            if depth[(y * width + x) as usize].is_infinite() {
                image.put_pixel(x, y, color);
            }
        }
    }
}

impl Renderer for HeadlessRenderer {
    fn counters(&self) -> &ResourceCounters {
        &self.counters
    }

    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.size = (width, height);
    }

    fn upload_mesh(&mut self, geometry: &Geometry) -> Result<MeshHandle, RenderError> {
        let handle = self.next_handle();
        self.meshes.insert(
            handle,
            CpuMesh {
                vertices: geometry.to_vertices(),
                indices: geometry.indices.clone(),
            },
        );
        self.counters.created(ResourceKind::Buffer, 2);
        Ok(MeshHandle(handle))
    }

    fn release_mesh(&mut self, handle: MeshHandle) {
        if self.meshes.remove(&handle.0).is_some() {
            self.counters.released(ResourceKind::Buffer, 2);
        }
    }

    fn upload_material(&mut self, material: &Material) -> Result<MaterialHandle, RenderError> {
        check_material_maps(material, MAX_TEXTURE_DIMENSION)?;
        let handle = self.next_handle();
        let texture_count = material.texture_count();
        self.materials.insert(
            handle,
            CpuMaterial {
                uniform: material.uniform(),
                maps: material.maps.clone(),
                texture_count,
            },
        );
        self.counters.created(ResourceKind::Buffer, 1);
        self.counters.created(ResourceKind::Texture, texture_count);
        self.counters.created(ResourceKind::MaterialBinding, 1);
        Ok(MaterialHandle(handle))
    }

    fn release_material(&mut self, handle: MaterialHandle) {
        if let Some(material) = self.materials.remove(&handle.0) {
            self.counters.released(ResourceKind::Buffer, 1);
            self.counters.released(ResourceKind::Texture, material.texture_count);
            self.counters.released(ResourceKind::MaterialBinding, 1);
        }
    }

    fn render(&mut self, frame: &FrameDesc) -> Result<(), RenderError> {
        let size = self.size;
        let image = self.rasterize(frame, size)?;
        self.last_image = Some(image);
        self.record(frame, size);
        self.frames_rendered += 1;
        Ok(())
    }

    fn capture_size(&self) -> Option<(u32, u32)> {
        self.capture_size
    }

    fn set_capture_size(&mut self, size: Option<(u32, u32)>) {
        if self.capture_size != size {
            self.capture_size = size;
            self.release_capture_target();
        }
    }

    fn capture(&mut self, frame: &FrameDesc) -> Result<RgbaImage, RenderError> {
        let size = self.capture_size.unwrap_or(self.size);
        check_texture_size(size.0, size.1, MAX_TEXTURE_DIMENSION)?;
        if self.capture_target != Some(size) {
            self.release_capture_target();
            self.capture_target = Some(size);
            self.counters.created(ResourceKind::Texture, 2);
        }
        if std::mem::take(&mut self.fail_next_capture) {
            return Err(RenderError::Readback("injected capture failure".to_string()));
        }
        let image = self.rasterize(frame, size)?;
        self.record(frame, size);
        Ok(image)
    }
}

impl Drop for HeadlessRenderer {
    /// Releases the renderer's own resources only
    ///
    /// Meshes and materials still uploaded are owner leaks; they stay in the
    /// counters.
    fn drop(&mut self) {
        if !self.meshes.is_empty() || !self.materials.is_empty() {
            log::warn!(
                "Headless renderer dropped with {} meshes and {} materials still uploaded",
                self.meshes.len(),
                self.materials.len()
            );
        }
        self.release_capture_target();
        self.counters.released(ResourceKind::Buffer, BASE_BUFFERS);
        self.counters.released(ResourceKind::Texture, BASE_TEXTURES);
        self.counters.released(ResourceKind::Device, 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::{
        camera::{Camera, TopDownOrthoCamera},
        geometry::primitives::cube,
        rendering::renderer::DrawItem,
    };

    fn rig() -> LightRig {
        LightRig {
            ambient_color: [1.0; 3],
            ambient_intensity: 1.5,
            directional_color: [1.0; 3],
            directional_intensity: 2.5,
            directional_position: [5.0, 10.0, 7.5],
        }
    }

    #[test]
    fn test_counters_follow_uploads() {
        let counters = ResourceCounters::new();
        {
            let mut renderer = HeadlessRenderer::new(64, 64, counters.clone());
            let mesh = renderer.upload_mesh(&cube(1.0, [0.0; 3])).unwrap();
            let material = renderer.upload_material(&Material::default()).unwrap();
            let stats = counters.snapshot();
            assert_eq!(stats.buffers, BASE_BUFFERS + 3);
            assert_eq!(stats.material_bindings, 1);

            renderer.release_mesh(mesh);
            renderer.release_material(material);
            renderer.release_mesh(mesh);
            assert_eq!(counters.snapshot().buffers, BASE_BUFFERS);
        }
        assert!(counters.snapshot().is_empty());
    }

    #[test]
    fn test_drop_leaves_outstanding_uploads_counted() {
        let counters = ResourceCounters::new();
        {
            let mut renderer = HeadlessRenderer::new(16, 16, counters.clone());
            renderer.upload_mesh(&cube(1.0, [0.0; 3])).unwrap();
            renderer.upload_material(&Material::default()).unwrap();
        }
        let stats = counters.snapshot();
        assert_eq!(stats.buffers, 3);
        assert_eq!(stats.material_bindings, 1);
        assert_eq!(stats.devices, 0);
    }

    #[test]
    fn test_unlit_top_down_capture() {
        let counters = ResourceCounters::new();
        let mut renderer = HeadlessRenderer::new(32, 32, counters);
        let mesh = renderer.upload_mesh(&cube(1.0, [0.0; 3])).unwrap();
        let material = renderer
            .upload_material(&Material::flat_unlit("White", [1.0; 3]))
            .unwrap();
        renderer.set_capture_size(Some((16, 16)));

        // Frame a volume twice the cube's size so the corners stay empty
        let camera = TopDownOrthoCamera::new(Vector3::new(0.0, 0.0, 0.0), 2.0);
        let lights = rig();
        let draws = [DrawItem { mesh, material }];
        let image = renderer
            .capture(&FrameDesc {
                camera: camera.uniform(),
                clear_color: [0.0; 3],
                lights: &lights,
                grid: None,
                draws: &draws,
            })
            .unwrap();

        assert_eq!(image.dimensions(), (16, 16));
        assert_eq!(image.get_pixel(8, 8).0, [255, 255, 255, 255]);
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_injected_capture_failure() {
        let mut renderer = HeadlessRenderer::new(8, 8, ResourceCounters::new());
        renderer.fail_next_capture();
        let lights = rig();
        let frame = FrameDesc {
            camera: Default::default(),
            clear_color: [0.0; 3],
            lights: &lights,
            grid: None,
            draws: &[],
        };
        assert!(matches!(renderer.capture(&frame), Err(RenderError::Readback(_))));
        assert!(renderer.capture(&frame).is_ok());
    }

    #[test]
    fn test_oversized_capture_is_rejected_before_allocation() {
        let counters = ResourceCounters::new();
        let mut renderer = HeadlessRenderer::new(8, 8, counters.clone());
        let before = counters.snapshot();
        renderer.set_capture_size(Some((5000, 5000)));
        let lights = rig();
        let result = renderer.capture(&FrameDesc {
            camera: Default::default(),
            clear_color: [0.0; 3],
            lights: &lights,
            grid: None,
            draws: &[],
        });
        assert_eq!(
            result.unwrap_err(),
            RenderError::TextureTooLarge {
                width: 5000,
                height: 5000,
                max: MAX_TEXTURE_DIMENSION,
            }
        );
        assert_eq!(counters.snapshot(), before);
        assert!(renderer.last_frame().is_none());
    }

    #[test]
    fn test_oversized_material_map_is_rejected() {
        let counters = ResourceCounters::new();
        let mut renderer = HeadlessRenderer::new(8, 8, counters.clone());
        let small = RgbaImage::new(2, 2);
        let maps = PbrMapSet {
            albedo: RgbaImage::new(MAX_TEXTURE_DIMENSION + 1, 1),
            normal: small.clone(),
            roughness: small.clone(),
            ao: small,
        };
        let material = Material::pbr("Huge", Arc::new(maps), 0.0, 1.0);
        assert!(matches!(
            renderer.upload_material(&material),
            Err(RenderError::TextureTooLarge { .. })
        ));
        assert_eq!(counters.snapshot().material_bindings, 0);
    }

    #[test]
    fn test_render_records_frame() {
        let mut renderer = HeadlessRenderer::new(8, 8, ResourceCounters::new());
        let lights = rig();
        let grid = GridSettings {
            size: 10.0,
            divisions: 10,
            color: [0.27; 3],
        };
        renderer
            .render(&FrameDesc {
                camera: Default::default(),
                clear_color: [0.1, 0.2, 0.3],
                lights: &lights,
                grid: Some(&grid),
                draws: &[],
            })
            .unwrap();
        let record = renderer.last_frame().unwrap();
        assert!(record.grid_drawn);
        assert_eq!(record.draw_count, 0);
        assert_eq!(renderer.frames_rendered(), 1);
    }
}
