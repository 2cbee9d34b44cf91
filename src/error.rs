//! Crate-level error types.

use thiserror::Error;

use crate::gpu::render_context::RenderContextError;

/// Errors produced by the rendering core.
///
/// Every error surfaces synchronously to the immediate caller; nothing is
/// retried internally.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A handle whose generation no longer matches its slot, or whose index
    /// is out of range.
    #[error("invalid {kind} handle (index {index}, generation {generation})")]
    InvalidHandle {
        /// Resource kind the handle refers to.
        kind: &'static str,
        /// Raw slot index carried by the handle.
        index: u32,
        /// Generation carried by the handle.
        generation: u32,
    },
    /// Decoding or validating an image or mesh payload failed.
    #[error("resource load failure: {0}")]
    ResourceLoad(String),
    /// Malformed construction inputs or an invalid pipeline state.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// GPU context initialization failure.
    #[error("GPU error: {0}")]
    Gpu(#[from] RenderContextError),
    /// Shader composition failure.
    #[error("shader '{label}' failed to compose: {message}")]
    Shader {
        /// Shader file path.
        label: String,
        /// Composer diagnostic.
        message: String,
    },
    /// Generic I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML options parsing/serialization failure.
    #[error("options parse error: {0}")]
    OptionsParse(String),
}

impl RenderError {
    /// `true` for [`RenderError::InvalidHandle`].
    #[must_use]
    pub fn is_invalid_handle(&self) -> bool {
        matches!(self, Self::InvalidHandle { .. })
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = RenderError> = std::result::Result<T, E>;
