//! # Assets
//!
//! Turns a byte stream into a recentered [`LoadedObject`].
//!
//! - [`source`] - Byte sources with declared lengths, and mesh formats
//! - [`loader`] - Worker-thread loading with progress and supersession
//! - [`fbx`] - Binary and ASCII FBX
//! - [`obj`] - Wavefront OBJ
//!
//! ## Usage
//!
//! ```no_run
//! use meshkiln::assets::{load_blocking, ByteSource, MeshFormat};
//!
//! let source = ByteSource::from_path("model.fbx")?;
//! let object = load_blocking(source, MeshFormat::Fbx, 64 * 1024, |progress| {
//!     println!("{progress:?}");
//! })?;
//! println!("{} meshes", object.mesh_count());
//! # Ok::<(), meshkiln::error::LoadError>(())
//! ```
//!
//! [`LoadedObject`]: crate::gfx::scene::node::LoadedObject

pub mod fbx;
pub mod loader;
pub mod obj;
pub mod source;

pub use loader::{load_blocking, AssetLoader, LoadEvent, LoadProgress, LoadTicket};
pub use source::{ByteSource, MeshFormat};
