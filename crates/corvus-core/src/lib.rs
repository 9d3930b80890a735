//! Core types for the Corvus engine.
//!
//! This crate provides the foundational pieces shared by the other crates:
//! - Error types
//! - Startup configuration
//! - Diagnostics timing context

pub mod config;
pub mod diagnostics;
pub mod error;

pub use config::StartupConfig;
pub use diagnostics::Diagnostics;
pub use error::{Error, Result};

/// Engine-wide constants
pub mod constants {
    /// Engine name reported to the Vulkan driver.
    pub const ENGINE_NAME: &str = "Corvus";
    /// Default number of frames the CPU may record ahead of the GPU.
    pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;
}
