//! # Scene Module
//!
//! The scene graph shown by a session and the vertex formats it is drawn with.
//!
//! ## Key Components
//!
//! - [`Scene`] - Background, lights, grid helper and the single loaded object
//! - [`LoadedObject`] - A tree of [`SceneNode`]s produced by the asset loader
//! - [`MeshNode`] - Geometry plus a shared material reference
//! - [`Vertex3D`] - GPU vertex with position, normal and two UV sets

pub mod node;
pub mod scene;
pub mod vertex;

// Re-export main types
pub use node::{GroupNode, LoadedObject, MeshNode, SceneNode};
pub use scene::{BakeParts, GridSettings, LightRig, Scene};
pub use vertex::{LineVertex, Vertex3D};
