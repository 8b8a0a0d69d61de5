//! Small wgpu helpers shared by the renderer and the GPU resources
//!
//! - [`binding_builder`] - Slot-numbered bind group layouts and bind groups
//! - [`uniform_buffer`] - Typed uniform buffers that skip redundant writes

pub mod binding_builder;
pub mod uniform_buffer;

pub use binding_builder::{BindGroupBuilder, BindGroupLayoutBuilder, BindGroupLayoutWithDesc};
pub use uniform_buffer::UniformBuffer;
