//! Presentation surface management.
//!
//! Holds the Vulkan surface and the loaders needed to build swapchains for
//! it, and defines what the engine needs from the window that owns it.

use crate::context::GpuContext;
use crate::error::{GpuError, Result, VkResultExt};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// What the renderer needs from the OS window it presents into.
pub trait PresentationWindow {
    /// Current framebuffer size in pixels. Zero while minimized.
    fn drawable_size(&self) -> (u32, u32);

    /// Block until at least one window event has been processed.
    fn wait_events(&mut self);

    /// Return whether the window was resized since the last call, clearing the flag.
    fn take_resized(&mut self) -> bool;

    /// Whether the user has asked to close the window.
    fn close_requested(&self) -> bool;
}

/// Block until the window has a non-zero drawable area.
///
/// A minimized window reports 0x0; events are pumped until it is restored.
/// Returns `None` if the window is closed while waiting.
pub fn wait_for_drawable_extent<W>(window: &mut W) -> Option<vk::Extent2D>
where
    W: PresentationWindow + ?Sized,
{
    let (mut width, mut height) = window.drawable_size();
    if width == 0 || height == 0 {
        tracing::info!("Window minimized, waiting for a drawable area");
    }
    while width == 0 || height == 0 {
        if window.close_requested() {
            tracing::info!("Window closed while minimized");
            return None;
        }
        window.wait_events();
        (width, height) = window.drawable_size();
    }
    Some(vk::Extent2D { width, height })
}

/// Create a Vulkan surface for `window`.
///
/// # Safety
/// The instance must have been created with the window system's surface extensions.
pub(crate) unsafe fn create_surface<W>(
    entry: &ash::Entry,
    instance: &ash::Instance,
    window: &W,
) -> Result<(vk::SurfaceKHR, ash::khr::surface::Instance)>
where
    W: HasDisplayHandle + HasWindowHandle,
{
    let display = window
        .display_handle()
        .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
    let window_handle = window
        .window_handle()
        .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?;

    let surface = unsafe {
        ash_window::create_surface(
            entry,
            instance,
            display.as_raw(),
            window_handle.as_raw(),
            None,
        )
    }
    .fatal("create window surface")?;

    let surface_loader = ash::khr::surface::Instance::new(entry, instance);

    tracing::info!("Window surface created");

    Ok((surface, surface_loader))
}

/// Surface context for windowed rendering.
///
/// Manages the Vulkan surface and swapchain loader for a window.
pub struct SurfaceContext {
    /// The Vulkan surface handle.
    pub surface: vk::SurfaceKHR,
    /// Surface extension loader.
    pub surface_loader: ash::khr::surface::Instance,
    /// Swapchain extension loader.
    pub swapchain_loader: ash::khr::swapchain::Device,
}

impl SurfaceContext {
    pub(crate) const fn new(
        surface: vk::SurfaceKHR,
        surface_loader: ash::khr::surface::Instance,
        swapchain_loader: ash::khr::swapchain::Device,
    ) -> Self {
        Self {
            surface,
            surface_loader,
            swapchain_loader,
        }
    }

    /// Query surface capabilities, formats and present modes.
    ///
    /// Always asks the driver; results are never cached since they change
    /// with window size and display mode.
    pub fn support(&self, gpu: &GpuContext) -> Result<SurfaceSupport> {
        unsafe {
            let capabilities = self
                .surface_loader
                .get_physical_device_surface_capabilities(gpu.physical_device(), self.surface)
                .fatal("query surface capabilities")?;

            let formats = self
                .surface_loader
                .get_physical_device_surface_formats(gpu.physical_device(), self.surface)
                .fatal("query surface formats")?;

            let present_modes = self
                .surface_loader
                .get_physical_device_surface_present_modes(gpu.physical_device(), self.surface)
                .fatal("query surface present modes")?;

            Ok(SurfaceSupport {
                capabilities,
                formats,
                present_modes,
            })
        }
    }

    /// Destroy the surface.
    ///
    /// # Safety
    /// The surface must not be in use and no swapchain may reference it.
    pub unsafe fn destroy(&self) {
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
        }
        tracing::info!("Window surface destroyed");
    }
}

/// Surface capability query result.
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    /// Raw surface capabilities.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}
