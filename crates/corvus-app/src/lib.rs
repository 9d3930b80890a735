//! Windowed viewport for the Corvus engine.
//!
//! This crate ties the Vulkan layer to an OS window:
//! - A winit window driven by pumped events
//! - The frame loop state machine and the backend seam it drives
//! - The renderer that owns the Vulkan resources
//! - The runner that handles startup, the steady-state loop and teardown
//!
//! # Example
//!
//! ```no_run
//! use corvus_app::{init_logging, run, StartupConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging();
//!     run(StartupConfig::new("Viewport").with_size(1280, 720))
//! }
//! ```

pub mod frame_loop;
pub mod renderer;
mod runner;
pub mod stats;
pub mod window;

pub use frame_loop::{FrameBackend, FrameLoop, FrameStatus};
pub use renderer::Renderer;
pub use runner::{init_logging, run};
pub use stats::FrameStats;
pub use window::WinitWindow;

// Re-export commonly used types for convenience
pub use corvus_core::{Diagnostics, StartupConfig};
pub use corvus_gpu::{GpuContext, GpuContextBuilder, PresentationWindow};
