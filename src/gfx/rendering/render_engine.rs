//! WGPU-based renderer
//!
//! Owns the surface, device and queue plus every GPU object the session
//! creates through the [`Renderer`] trait. Draws the PBR pipeline and the grid
//! helper into the surface or into an offscreen capture target that is read
//! back to the CPU.

use std::{collections::HashMap, sync::Arc};

use image::RgbaImage;
use wgpu::{util::DeviceExt, TextureFormat};

use crate::{
    config::MAX_TEXTURE_DIMENSION,
    error::RenderError,
    gfx::{
        geometry::Geometry,
        resources::{
            global_bindings::{update_global_ubo, GlobalBindings, GlobalUBO},
            material::{GpuMaterial, Material, MaterialBindings},
            texture_resource::TextureResource,
            tracking::{ResourceCounters, ResourceKind},
        },
        scene::GridSettings,
    },
    wgpu_utils::{
        binding_builder::{BindGroupBuilder, BindGroupLayoutBuilder, BindGroupLayoutWithDesc},
        uniform_buffer::UniformBuffer,
    },
};

use super::{
    pipeline_manager::{PipelineConfig, PipelineManager},
    readback::read_texture_rgba8,
    renderer::{
        check_material_maps, check_texture_size, FrameDesc, MaterialHandle, MeshHandle, Renderer,
    },
};

const PBR_PIPELINE: &str = "PBR";
const GRID_PIPELINE: &str = "Grid";

/// Vertex and index buffers of one uploaded mesh
pub struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

pub trait DrawMesh {
    fn draw_mesh(&mut self, mesh: &GpuMesh);
}

impl DrawMesh for wgpu::RenderPass<'_> {
    fn draw_mesh(&mut self, mesh: &GpuMesh) {
        if mesh.index_count == 0 {
            return;
        }
        self.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        self.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        self.draw_indexed(0..mesh.index_count, 0, 0..1);
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct GridUniform {
    color: [f32; 4],
}

struct GridBuffers {
    settings: GridSettings,
    vertex_buffer: wgpu::Buffer,
    vertex_count: u32,
    ubo: UniformBuffer<GridUniform>,
    bind_group: wgpu::BindGroup,
}

struct CaptureTarget {
    color: TextureResource,
    depth: TextureResource,
}

/// Core rendering engine managing GPU resources and draw calls
pub struct RenderEngine {
    surface: wgpu::Surface<'static>,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    config: wgpu::SurfaceConfiguration,
    format: TextureFormat,
    depth_texture: TextureResource,
    pipeline_manager: PipelineManager,
    global_ubo: GlobalUBO,
    global_bind_group: wgpu::BindGroup,
    capture_ubo: GlobalUBO,
    capture_bind_group: wgpu::BindGroup,
    material_bindings: MaterialBindings,
    grid_layout: BindGroupLayoutWithDesc,
    grid: Option<GridBuffers>,
    meshes: HashMap<u64, GpuMesh>,
    materials: HashMap<u64, GpuMaterial>,
    next_handle: u64,
    capture_size: Option<(u32, u32)>,
    capture_target: Option<CaptureTarget>,
    counters: ResourceCounters,
}

impl RenderEngine {
    /// Creates a new render engine for the given window
    ///
    /// Picks an sRGB surface format when the adapter offers one, creates the
    /// depth buffer and registers the PBR and grid pipelines.
    pub async fn new(
        window: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
        counters: ResourceCounters,
    ) -> Result<RenderEngine, RenderError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window)
            .map_err(|e| RenderError::Surface(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| RenderError::Adapter(e.to_string()))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("WGPU Device"),
                required_features: wgpu::Features::default(),
                required_limits: wgpu::Limits {
                    max_texture_dimension_2d: MAX_TEXTURE_DIMENSION,
                    ..wgpu::Limits::downlevel_defaults()
                },
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| RenderError::Device(e.to_string()))?;
        counters.created(ResourceKind::Device, 1);

        let surface_capabilities = surface.get_capabilities(&adapter);
        let format = surface_capabilities
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_capabilities.formats.first().copied())
            .ok_or_else(|| RenderError::Surface("surface reports no formats".to_string()))?;
        log::info!("Surface format: {:?}", format);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_capabilities
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let depth_texture =
            TextureResource::create_depth_texture(&device, config.width, config.height, "depth_texture");
        counters.created(ResourceKind::Texture, 1);

        let global_bindings = GlobalBindings::new(&device);
        let global_ubo = GlobalUBO::zeroed(&device, "Global UBO");
        let global_bind_group =
            global_bindings.create_bind_group(&device, &global_ubo, "Global Bind Group");
        let capture_ubo = GlobalUBO::zeroed(&device, "Capture Global UBO");
        let capture_bind_group =
            global_bindings.create_bind_group(&device, &capture_ubo, "Capture Global Bind Group");
        counters.created(ResourceKind::Buffer, 2);

        let material_bindings = MaterialBindings::new(&device, &queue);
        counters.created(ResourceKind::Texture, material_bindings.fallback_texture_count());

        let grid_layout = BindGroupLayoutBuilder::new()
            .uniform(wgpu::ShaderStages::FRAGMENT)
            .create(&device, "Grid Bind Group");

        let device: Arc<wgpu::Device> = device.into();
        let queue: Arc<wgpu::Queue> = queue.into();
        let mut pipeline_manager = PipelineManager::new(device.clone());

        pipeline_manager.load_shader("pbr", include_str!("pbr.wgsl"));
        pipeline_manager.load_shader("grid", include_str!("grid.wgsl"));

        // Imported meshes do not guarantee consistent winding
        pipeline_manager.build(
            PBR_PIPELINE,
            &PipelineConfig::new("pbr", format)
                .with_cull_mode(None)
                .with_depth(TextureResource::DEPTH_FORMAT, true)
                .with_layouts(&[global_bindings.bind_group_layout(), material_bindings.bind_group_layout()]),
        )?;
        pipeline_manager.build(
            GRID_PIPELINE,
            &PipelineConfig::new("grid", format)
                .lines()
                .with_cull_mode(None)
                .with_depth(TextureResource::DEPTH_FORMAT, false)
                .with_layouts(&[global_bindings.bind_group_layout(), &grid_layout.layout]),
        )?;

        Ok(RenderEngine {
            surface,
            device,
            queue,
            config,
            format,
            depth_texture,
            pipeline_manager,
            global_ubo,
            global_bind_group,
            capture_ubo,
            capture_bind_group,
            material_bindings,
            grid_layout,
            grid: None,
            meshes: HashMap::new(),
            materials: HashMap::new(),
            next_handle: 1,
            capture_size: None,
            capture_target: None,
            counters,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.format
    }

    fn next_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    /// Rebuilds the grid buffers when the settings changed
    fn ensure_grid(&mut self, settings: &GridSettings) {
        if self.grid.as_ref().is_some_and(|grid| grid.settings == *settings) {
            return;
        }
        self.release_grid();

        let vertices = settings.line_vertices();
        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Grid Vertex Buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let [r, g, b] = settings.color;
        let ubo = UniformBuffer::new(&self.device, "Grid UBO", &GridUniform { color: [r, g, b, 1.0] });
        let bind_group = BindGroupBuilder::new(&self.grid_layout)
            .resource(ubo.binding_resource())
            .create(&self.device, "Grid Bind Group");
        self.counters.created(ResourceKind::Buffer, 2);

        self.grid = Some(GridBuffers {
            settings: *settings,
            vertex_buffer,
            vertex_count: vertices.len() as u32,
            ubo,
            bind_group,
        });
    }

    fn release_grid(&mut self) {
        if let Some(grid) = self.grid.take() {
            grid.vertex_buffer.destroy();
            grid.ubo.destroy();
            self.counters.released(ResourceKind::Buffer, 2);
        }
    }

    fn ensure_capture_target(&mut self) -> (u32, u32) {
        let size = self
            .capture_size
            .unwrap_or((self.config.width, self.config.height));
        let matches = self
            .capture_target
            .as_ref()
            .is_some_and(|t| (t.color.texture.width(), t.color.texture.height()) == size);
        if !matches {
            self.release_capture_target();
            let color = TextureResource::create_render_target(
                &self.device,
                size.0,
                size.1,
                self.format,
                "Capture Color Target",
            );
            let depth =
                TextureResource::create_depth_texture(&self.device, size.0, size.1, "Capture Depth");
            self.counters.created(ResourceKind::Texture, 2);
            self.capture_target = Some(CaptureTarget { color, depth });
        }
        size
    }

    fn release_capture_target(&mut self) {
        if let Some(target) = self.capture_target.take() {
            target.color.destroy();
            target.depth.destroy();
            self.counters.released(ResourceKind::Texture, 2);
        }
    }

    /// Records the scene pass into `encoder`
    fn encode_scene(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        color_view: &wgpu::TextureView,
        depth_view: &wgpu::TextureView,
        globals: &wgpu::BindGroup,
        frame: &FrameDesc,
    ) {
        let [r, g, b] = frame.clear_color;
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Main Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: r as f64,
                        g: g as f64,
                        b: b as f64,
                        a: 1.0,
                    }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        render_pass.set_bind_group(0, globals, &[]);

        if let Some(pipeline) = self.pipeline_manager.pipeline(PBR_PIPELINE) {
            render_pass.set_pipeline(pipeline);
            for draw in frame.draws {
                let (Some(mesh), Some(material)) = (
                    self.meshes.get(&draw.mesh.0),
                    self.materials.get(&draw.material.0),
                ) else {
                    log::warn!("Skipping draw with unknown handles {:?}", draw);
                    continue;
                };
                render_pass.set_bind_group(1, material.bind_group(), &[]);
                render_pass.draw_mesh(mesh);
            }
        }

        if frame.grid.is_some() {
            if let (Some(pipeline), Some(grid)) =
                (self.pipeline_manager.pipeline(GRID_PIPELINE), self.grid.as_ref())
            {
                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(1, &grid.bind_group, &[]);
                render_pass.set_vertex_buffer(0, grid.vertex_buffer.slice(..));
                render_pass.draw(0..grid.vertex_count, 0..1);
            }
        }
    }
}

impl Renderer for RenderEngine {
    fn counters(&self) -> &ResourceCounters {
        &self.counters
    }

    fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Resizes the surface and recreates the depth buffer
    ///
    /// Zero-sized requests (minimized windows) are ignored.
    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);

        self.depth_texture.destroy();
        self.depth_texture =
            TextureResource::create_depth_texture(&self.device, width, height, "depth_texture");
    }

    fn upload_mesh(&mut self, geometry: &Geometry) -> Result<MeshHandle, RenderError> {
        let vertices = geometry.to_vertices();
        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Vertex Buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Index Buffer"),
            contents: bytemuck::cast_slice(&geometry.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        self.counters.created(ResourceKind::Buffer, 2);

        let handle = self.next_handle();
        self.meshes.insert(
            handle,
            GpuMesh {
                vertex_buffer,
                index_buffer,
                index_count: geometry.indices.len() as u32,
            },
        );
        Ok(MeshHandle(handle))
    }

    fn release_mesh(&mut self, handle: MeshHandle) {
        if let Some(mesh) = self.meshes.remove(&handle.0) {
            mesh.vertex_buffer.destroy();
            mesh.index_buffer.destroy();
            self.counters.released(ResourceKind::Buffer, 2);
        }
    }

    fn upload_material(&mut self, material: &Material) -> Result<MaterialHandle, RenderError> {
        check_material_maps(material, self.device.limits().max_texture_dimension_2d)?;
        let gpu = GpuMaterial::new(&self.device, &self.queue, &self.material_bindings, material);
        self.counters.created(ResourceKind::Buffer, 1);
        self.counters.created(ResourceKind::Texture, gpu.texture_count());
        self.counters.created(ResourceKind::MaterialBinding, 1);

        let handle = self.next_handle();
        self.materials.insert(handle, gpu);
        Ok(MaterialHandle(handle))
    }

    fn release_material(&mut self, handle: MaterialHandle) {
        if let Some(gpu) = self.materials.remove(&handle.0) {
            gpu.destroy();
            self.counters.released(ResourceKind::Buffer, 1);
            self.counters.released(ResourceKind::Texture, gpu.texture_count());
            self.counters.released(ResourceKind::MaterialBinding, 1);
        }
    }

    fn render(&mut self, frame: &FrameDesc) -> Result<(), RenderError> {
        let surface_texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return Err(RenderError::SurfaceLost);
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("Surface timed out, skipping frame");
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(RenderError::OutOfMemory),
            Err(other) => return Err(RenderError::Surface(other.to_string())),
        };

        if let Some(grid) = frame.grid {
            self.ensure_grid(grid);
        }
        update_global_ubo(&mut self.global_ubo, &self.queue, frame.camera, frame.lights);

        let surface_texture_view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        self.encode_scene(
            &mut encoder,
            &surface_texture_view,
            &self.depth_texture.view,
            &self.global_bind_group,
            frame,
        );

        self.queue.submit(std::iter::once(encoder.finish()));
        surface_texture.present();
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
        let (width, height) = self
            .capture_size
            .unwrap_or((self.config.width, self.config.height));
        check_texture_size(width, height, self.device.limits().max_texture_dimension_2d)?;
        if let Some(grid) = frame.grid {
            self.ensure_grid(grid);
        }
        self.ensure_capture_target();
        update_global_ubo(&mut self.capture_ubo, &self.queue, frame.camera, frame.lights);

        let target = self
            .capture_target
            .as_ref()
            .ok_or_else(|| RenderError::Readback("capture target missing".to_string()))?;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Capture Encoder"),
            });
        self.encode_scene(
            &mut encoder,
            &target.color.view,
            &target.depth.view,
            &self.capture_bind_group,
            frame,
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        read_texture_rgba8(&self.device, &self.queue, &target.color.texture)
    }
}

impl Drop for RenderEngine {
    fn drop(&mut self) {
        let meshes: Vec<u64> = self.meshes.keys().copied().collect();
        for handle in meshes {
            self.release_mesh(MeshHandle(handle));
        }
        let materials: Vec<u64> = self.materials.keys().copied().collect();
        for handle in materials {
            self.release_material(MaterialHandle(handle));
        }
        self.release_grid();
        self.release_capture_target();

        self.counters.released(ResourceKind::Texture, 1);
        self.counters
            .released(ResourceKind::Texture, self.material_bindings.fallback_texture_count());
        self.counters.released(ResourceKind::Buffer, 2);
        self.counters.released(ResourceKind::Device, 1);
        log::info!("Render engine released");
    }
}
