//! # Texturing
//!
//! The bake → synthesize → apply pipeline.
//!
//! - [`ao_bake`] - Top-down AO guide render with scoped state restoration
//! - [`synthesis`] - The external synthesizer contract and its worker thread
//! - [`maps`] - Encoded map sets as returned by a synthesizer
//! - [`material_binder`] - One shared PBR material over every mesh

pub mod ao_bake;
pub mod maps;
pub mod material_binder;
pub mod synthesis;

pub use ao_bake::{AoBaker, BakedImage};
pub use maps::EncodedMapSet;
pub use material_binder::MaterialBinder;
pub use synthesis::{JobId, SynthesisJobs, TextureSynthesizer};
