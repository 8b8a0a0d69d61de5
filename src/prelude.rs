//! # Meshkiln Prelude
//!
//! Commonly used types in one import.
//!
//! ```no_run
//! use meshkiln::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut app = MeshkilnApp::new(ViewerConfig::default())?;
//!     app.open("model.fbx")?;
//!     app.run()
//! }
//! ```

// Application and session
pub use crate::app::MeshkilnApp;
pub use crate::config::ViewerConfig;
pub use crate::session::{SceneSession, SessionEvent, SessionState};

// Assets
pub use crate::assets::{load_blocking, ByteSource, LoadProgress, MeshFormat};

// Graphics and scene types
pub use crate::gfx::camera::{CameraInput, OrbitCamera};
pub use crate::gfx::geometry::{frame_bounds, Aabb, Framing, Geometry};
pub use crate::gfx::rendering::{HeadlessRenderer, RenderEngine, Renderer};
pub use crate::gfx::resources::{Material, ResourceCounters};
pub use crate::gfx::scene::{LoadedObject, Scene, SceneNode};

// Texturing pipeline
pub use crate::texturing::{BakedImage, EncodedMapSet, TextureSynthesizer};

// Errors
pub use crate::error::{BakeError, LoadError, MaterialError, RenderError, SynthesisError, TexturingError};
