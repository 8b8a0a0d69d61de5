//! Core rendering functionality
//!
//! The [`Renderer`] trait is the only way the rest of the crate touches the
//! GPU. [`RenderEngine`] drives wgpu; [`HeadlessRenderer`] rasterizes on the
//! CPU for offline captures and tests.

pub mod headless;
pub mod pipeline_manager;
pub mod readback;
pub mod render_engine;
pub mod renderer;

pub use headless::{FrameRecord, HeadlessRenderer};
pub use pipeline_manager::{PipelineConfig, PipelineManager};
pub use render_engine::RenderEngine;
pub use renderer::{DrawItem, FrameDesc, MaterialHandle, MeshHandle, Renderer};
