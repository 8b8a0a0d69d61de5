//! # Graphics Module
//!
//! Camera systems, geometry math, the scene graph, GPU resources and the
//! rendering backends.
//!
//! ## Architecture Overview
//!
//! - **Camera System** ([`camera`]) - Damped orbit camera and the top-down bake camera
//! - **Geometry** ([`geometry`]) - Mesh attributes, bounding volumes and auto-framing
//! - **Scene Management** ([`scene`]) - Tagged-variant scene graph, lights and grid
//! - **Resource Management** ([`resources`]) - Materials, textures and live-resource counters
//! - **Rendering** ([`rendering`]) - The [`Renderer`] seam with wgpu and headless backends
//!
//! ## Usage
//!
//! ```no_run
//! use meshkiln::gfx::{rendering::HeadlessRenderer, resources::ResourceCounters};
//!
//! let counters = ResourceCounters::new();
//! let renderer = HeadlessRenderer::new(800, 600, counters.clone());
//! drop(renderer);
//! assert!(counters.snapshot().is_empty());
//! ```
//!
//! [`Renderer`]: rendering::Renderer

pub mod camera;
pub mod geometry;
pub mod rendering;
pub mod resources;
pub mod scene;

// Re-export commonly used types
pub use camera::orbit_camera::OrbitCamera;
pub use rendering::{HeadlessRenderer, RenderEngine, Renderer};
