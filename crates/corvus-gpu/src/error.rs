//! GPU error types.

use std::path::PathBuf;

use ash::prelude::VkResult;
use ash::vk;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// A Vulkan object could not be created. Never recovered from.
    #[error("Failed to {operation}: {result}")]
    Fatal {
        operation: &'static str,
        result: vk::Result,
    },

    /// Vulkan error outside of object creation.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Required extension not supported.
    #[error("Required extension not supported: {0}")]
    ExtensionNotSupported(String),

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// A shader binary could not be read.
    #[error("Failed to load shader {}: {source}", path.display())]
    ShaderLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl GpuError {
    /// Whether this error came from a failed object creation.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

/// Tag a Vulkan result with the operation that produced it.
pub trait VkResultExt<T> {
    /// Map a failure into [`GpuError::Fatal`] naming `operation`.
    fn fatal(self, operation: &'static str) -> Result<T>;
}

impl<T> VkResultExt<T> for VkResult<T> {
    fn fatal(self, operation: &'static str) -> Result<T> {
        self.map_err(|result| GpuError::Fatal { operation, result })
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
