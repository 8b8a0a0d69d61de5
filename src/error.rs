//! Error taxonomy for the viewer core
//!
//! Every failure in the core is recoverable at the session level. Loads leave
//! the displayed object in place, bakes restore the pre-bake scene and
//! synthesis/material errors keep the current material.

use thiserror::Error;

/// Terminal failure of one load attempt
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    /// The container is malformed
    #[error("failed to parse mesh container: {0}")]
    Parse(String),

    /// The stream ended before the container (or declared size) was complete
    #[error("mesh data is incomplete: {0}")]
    IncompleteData(String),

    /// The container is valid but uses something the loader cannot handle
    #[error("unsupported mesh feature: {0}")]
    UnsupportedFeature(String),

    /// The byte source itself failed
    #[error("failed to read mesh data: {0}")]
    Io(String),

    /// A newer load replaced this one before it finished
    #[error("load was superseded by a newer request")]
    Superseded,

    /// The loader worker panicked
    #[error("loader crashed: {0}")]
    Crashed(String),
}

impl From<std::io::Error> for LoadError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => LoadError::IncompleteData(err.to_string()),
            _ => LoadError::Io(err.to_string()),
        }
    }
}

/// Failures of the GPU (or headless) renderer
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("no compatible graphics adapter: {0}")]
    Adapter(String),

    #[error("graphics device request failed: {0}")]
    Device(String),

    #[error("surface creation failed: {0}")]
    Surface(String),

    #[error("surface was lost and the frame was skipped")]
    SurfaceLost,

    #[error("graphics device ran out of memory")]
    OutOfMemory,

    #[error("pixel readback failed: {0}")]
    Readback(String),

    #[error("unknown {kind} handle {id}")]
    UnknownHandle { kind: &'static str, id: u64 },

    #[error("{width}x{height} texture exceeds the {max} pixel limit")]
    TextureTooLarge { width: u32, height: u32, max: u32 },
}

/// Failures of the ambient-occlusion bake
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BakeError {
    /// No object is loaded or the renderer is not running
    #[error("AO bake requires a loaded object and a running renderer")]
    NotReady,

    #[error("AO bake render failed: {0}")]
    Render(#[from] RenderError),

    #[error("AO bake image encoding failed: {0}")]
    Encode(String),
}

/// Failures reported by the external texture synthesis collaborator
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SynthesisError {
    #[error("synthesis request failed: {0}")]
    Network(String),

    #[error("synthesis request timed out")]
    Timeout,

    /// The collaborator answered but broke the four-map contract
    #[error("synthesis contract violated: {0}")]
    ContractViolation(String),

    #[error("synthesis request was not authorized")]
    Unauthorized,

    /// The synthesizer panicked on its worker thread
    #[error("synthesizer crashed: {0}")]
    Crashed(String),
}

/// Failures of the PBR material binder
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MaterialError {
    #[error("failed to decode {role} map: {reason}")]
    Decode { role: &'static str, reason: String },

    /// A map set without all four roles was offered
    #[error("map set is missing the {0} map")]
    MissingMap(&'static str),

    #[error("no object is loaded to receive the material")]
    NoObjectLoaded,
}

/// Failures of the bake → synthesize → apply pipeline
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TexturingError {
    #[error("a texturing job is already in flight")]
    Busy,

    #[error(transparent)]
    Bake(#[from] BakeError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Material(#[from] MaterialError),
}

/// Invalid viewer configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Text of a panic payload caught on a worker thread
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
