//! Meshkiln
//!
//! A wgpu mesh viewer that auto-frames FBX and OBJ assets, bakes a top-down
//! ambient-occlusion guide image and swaps in synthesized PBR texture sets.

pub mod app;
pub mod assets;
pub mod config;
pub mod error;
pub mod gfx;
pub mod prelude;
pub mod session;
pub mod texturing;
pub mod wgpu_utils;

// Re-export main types for convenience
pub use app::MeshkilnApp;
pub use session::SceneSession;

/// Creates a viewer with the default configuration
pub fn default() -> anyhow::Result<MeshkilnApp> {
    MeshkilnApp::new(config::ViewerConfig::default())
}
