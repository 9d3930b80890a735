//! Vulkan abstraction layer for the Corvus viewport.
//!
//! This crate provides:
//! - Vulkan instance, surface and device management
//! - Swapchain negotiation and recreation
//! - Frame slot synchronization objects
//! - Render pass, graphics pipeline and mesh upload

pub mod capabilities;
pub mod command;
pub mod context;
pub mod error;
pub mod instance;
pub mod memory;
pub mod mesh;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use capabilities::{GpuCapabilities, GpuVendor};
pub use command::CommandPool;
pub use context::{GpuContext, GpuContextBuilder, QueueFamilyIndices, QueueRole};
pub use error::{GpuError, Result, VkResultExt};
pub use memory::{GpuAllocator, GpuBuffer};
pub use mesh::Mesh;
pub use pipeline::{GraphicsPipeline, GraphicsPipelineConfig};
pub use render_pass::RenderPass;
pub use shader::load_spirv;
pub use surface::{wait_for_drawable_extent, PresentationWindow, SurfaceContext, SurfaceSupport};
pub use swapchain::{AcquireOutcome, PresentOutcome, RecreateOutcome, Swapchain, SwapchainConfig};
pub use sync::{FrameSlot, FrameSlots};
pub use vertex::Vertex;
