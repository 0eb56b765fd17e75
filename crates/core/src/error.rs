//! Workspace-level error type.

use thiserror::Error;

/// Errors shared across the carousel crates.
#[derive(Error, Debug)]
pub enum Error {
    /// A Vulkan operation failed outside the RHI layer
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Creating or driving the window failed
    #[error("Window error: {0}")]
    Window(String),

    /// Creating or querying the presentation surface failed
    #[error("Surface error: {0}")]
    Surface(String),

    /// Wrapped I/O failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything without a more specific bucket
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result alias using the workspace error type.
pub type Result<T> = std::result::Result<T, Error>;
