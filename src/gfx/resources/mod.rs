// src/gfx/resources/mod.rs
//! GPU resource management
//!
//! Materials, textures, uniform bindings and the live-resource counters the
//! renderers report into.

pub mod global_bindings;
pub mod material;
pub mod pbr_maps;
pub mod texture_resource;
pub mod tracking;

// Re-export main types
pub use global_bindings::{update_global_ubo, GlobalBindings, GlobalUBO};
pub use material::{Material, MaterialId, Shading};
pub use pbr_maps::{MapRole, PbrMapSet};
pub use texture_resource::TextureResource;
pub use tracking::{ResourceCounters, ResourceKind, ResourceStats};
