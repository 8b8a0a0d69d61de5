//! Named render pipelines
//!
//! Shaders are compiled once under a name, then each pipeline is built
//! eagerly from a [`PipelineConfig`] referring to one of them. The engine only
//! needs two pipelines (lit meshes and the grid) so nothing is deferred.

use std::{collections::HashMap, sync::Arc};

use crate::{
    error::RenderError,
    gfx::scene::vertex::{LineVertex, Vertex3D},
};

/// Vertex buffer layout a pipeline consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexKind {
    Mesh,
    Line,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub shader: String,
    pub color_format: wgpu::TextureFormat,
    pub bind_group_layouts: Vec<wgpu::BindGroupLayout>,
    pub vertex_kind: VertexKind,
    pub cull_mode: Option<wgpu::Face>,
    /// Depth target format and whether the pipeline writes depth
    pub depth: Option<(wgpu::TextureFormat, bool)>,
    pub blend: Option<wgpu::BlendState>,
}

impl PipelineConfig {
    /// Opaque triangles with back-face culling and no depth
    pub fn new(shader: &str, color_format: wgpu::TextureFormat) -> Self {
        Self {
            shader: shader.to_owned(),
            color_format,
            bind_group_layouts: Vec::new(),
            vertex_kind: VertexKind::Mesh,
            cull_mode: Some(wgpu::Face::Back),
            depth: None,
            blend: Some(wgpu::BlendState::REPLACE),
        }
    }

    pub fn with_layouts(mut self, layouts: &[&wgpu::BindGroupLayout]) -> Self {
        self.bind_group_layouts = layouts.iter().map(|layout| (*layout).clone()).collect();
        self
    }

    pub fn with_cull_mode(mut self, face: Option<wgpu::Face>) -> Self {
        self.cull_mode = face;
        self
    }

    pub fn with_depth(mut self, format: wgpu::TextureFormat, write: bool) -> Self {
        self.depth = Some((format, write));
        self
    }

    /// Line list topology over [`LineVertex`] buffers
    pub fn lines(mut self) -> Self {
        self.vertex_kind = VertexKind::Line;
        self
    }

    fn topology(&self) -> wgpu::PrimitiveTopology {
        match self.vertex_kind {
            VertexKind::Mesh => wgpu::PrimitiveTopology::TriangleList,
            VertexKind::Line => wgpu::PrimitiveTopology::LineList,
        }
    }
}

pub struct PipelineManager {
    device: Arc<wgpu::Device>,
    shaders: HashMap<String, wgpu::ShaderModule>,
    pipelines: HashMap<String, wgpu::RenderPipeline>,
}

impl PipelineManager {
    pub fn new(device: Arc<wgpu::Device>) -> Self {
        Self {
            device,
            shaders: HashMap::new(),
            pipelines: HashMap::new(),
        }
    }

    /// Compiles a WGSL module under `name`
    pub fn load_shader(&mut self, name: &str, source: &str) {
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(name),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        self.shaders.insert(name.to_owned(), module);
    }

    /// Builds the pipeline `name`, replacing any previous one
    pub fn build(&mut self, name: &str, config: &PipelineConfig) -> Result<(), RenderError> {
        let shader = self.shaders.get(&config.shader).ok_or_else(|| {
            RenderError::Device(format!("pipeline '{}' uses unknown shader '{}'", name, config.shader))
        })?;

        let layouts: Vec<&wgpu::BindGroupLayout> = config.bind_group_layouts.iter().collect();
        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{} Layout", name)),
            bind_group_layouts: &layouts,
            push_constant_ranges: &[],
        });

        let buffers = [match config.vertex_kind {
            VertexKind::Mesh => Vertex3D::desc(),
            VertexKind::Line => LineVertex::desc(),
        }];
        let targets = [Some(wgpu::ColorTargetState {
            format: config.color_format,
            blend: config.blend,
            write_mask: wgpu::ColorWrites::ALL,
        })];

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(name),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: shader,
                entry_point: Some("vs_main"),
                buffers: &buffers,
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: shader,
                entry_point: Some("fs_main"),
                targets: &targets,
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: config.topology(),
                cull_mode: config.cull_mode,
                ..Default::default()
            },
            depth_stencil: config.depth.map(|(format, write)| wgpu::DepthStencilState {
                format,
                depth_write_enabled: write,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        log::debug!("Built pipeline '{}'", name);
        self.pipelines.insert(name.to_owned(), pipeline);
        Ok(())
    }

    pub fn pipeline(&self, name: &str) -> Option<&wgpu::RenderPipeline> {
        self.pipelines.get(name)
    }
}
