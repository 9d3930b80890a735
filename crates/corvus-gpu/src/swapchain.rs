//! Swapchain management.
//!
//! The swapchain and everything derived from its images (views and
//! framebuffers) are built together and torn down together. Nothing is
//! patched in place: a stale swapchain is destroyed and negotiated again
//! from a fresh surface query.

use crate::context::GpuContext;
use crate::error::{GpuError, Result, VkResultExt};
use crate::surface::{wait_for_drawable_extent, PresentationWindow, SurfaceContext, SurfaceSupport};
use ash::vk;

/// Preferred swapchain format: 32-bit BGRA with sRGB encoding.
pub const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Result of asking for the next presentable image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image was acquired. `suboptimal` means it can still be used but the
    /// swapchain should be rebuilt after presenting.
    Acquired { image_index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface; no image was acquired.
    OutOfDate,
}

/// Result of handing an image to the presentation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Presented against a swapchain that still matches the surface.
    Presented,
    /// The swapchain is out of date or suboptimal and must be rebuilt.
    Stale,
}

/// What [`Swapchain::recreate`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecreateOutcome {
    /// New swapchain and image views exist; framebuffers are still to be built.
    /// `format_changed` means render passes built for the old format can no
    /// longer be used with the new image views.
    Rebuilt { format_changed: bool },
    /// The window was closed while minimized. The old swapchain is untouched.
    WindowClosed,
}

impl RecreateOutcome {
    /// Outcome of a rebuild that went from `previous` to `current` format.
    pub fn rebuilt(previous: vk::Format, current: vk::Format) -> Self {
        Self::Rebuilt {
            format_changed: previous != current,
        }
    }
}

/// Everything negotiated with the surface before creating a swapchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainConfig {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainConfig {
    /// Negotiate swapchain parameters from a surface query and the window's drawable size.
    pub fn negotiate(support: &SurfaceSupport, window_extent: vk::Extent2D) -> Result<Self> {
        let surface_format = select_surface_format(&support.formats).ok_or_else(|| {
            GpuError::InvalidState("Surface reports no supported formats".to_string())
        })?;

        Ok(Self {
            surface_format,
            present_mode: select_present_mode(&support.present_modes),
            extent: calculate_extent(
                &support.capabilities,
                window_extent.width,
                window_extent.height,
            ),
            image_count: select_image_count(&support.capabilities),
            pre_transform: support.capabilities.current_transform,
        })
    }
}

/// Swapchain wrapper.
pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a new swapchain for `surface`.
    ///
    /// Capabilities are queried fresh on every call. Views and framebuffers
    /// are not created here; see [`Self::create_image_views`] and
    /// [`Self::create_framebuffers`].
    pub fn create(
        gpu: &GpuContext,
        surface: &SurfaceContext,
        window_extent: vk::Extent2D,
    ) -> Result<Self> {
        let support = surface.support(gpu)?;
        let config = SwapchainConfig::negotiate(&support, window_extent)?;

        tracing::debug!(
            "Swapchain negotiated: {:?}/{:?}, {:?}, {}x{}, {} images requested",
            config.surface_format.format,
            config.surface_format.color_space,
            config.present_mode,
            config.extent.width,
            config.extent.height,
            config.image_count
        );

        let families = gpu.queue_families();
        let family_indices = [families.graphics, families.present];

        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.surface)
            .min_image_count(config.image_count)
            .image_format(config.surface_format.format)
            .image_color_space(config.surface_format.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(config.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true);

        // Images shared across two families need concurrent access
        create_info = if families.is_shared() {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        };

        let swapchain = unsafe {
            surface
                .swapchain_loader
                .create_swapchain(&create_info, None)
        }
        .fatal("create swapchain")?;

        let images = unsafe { surface.swapchain_loader.get_swapchain_images(swapchain) }
            .fatal("get swapchain images")?;

        tracing::info!(
            "Swapchain created: {}x{} ({} images)",
            config.extent.width,
            config.extent.height,
            images.len()
        );

        Ok(Self {
            swapchain,
            images,
            image_views: Vec::new(),
            framebuffers: Vec::new(),
            format: config.surface_format.format,
            color_space: config.surface_format.color_space,
            present_mode: config.present_mode,
            extent: config.extent,
        })
    }

    /// Build one 2D color view per swapchain image.
    ///
    /// Views are recorded as they are created, so [`Self::destroy`] releases
    /// them even if a later one fails.
    pub fn create_image_views(&mut self, device: &ash::Device) -> Result<()> {
        self.image_views.reserve(self.images.len());

        for &image in &self.images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .base_mip_level(0)
                        .level_count(1)
                        .base_array_layer(0)
                        .layer_count(1),
                );

            let view = unsafe { device.create_image_view(&view_info, None) }
                .fatal("create swapchain image view")?;
            self.image_views.push(view);
        }

        Ok(())
    }

    /// Build one framebuffer per image view for `render_pass`, sized to the swapchain extent.
    pub fn create_framebuffers(
        &mut self,
        device: &ash::Device,
        render_pass: vk::RenderPass,
    ) -> Result<()> {
        self.framebuffers.reserve(self.image_views.len());

        for &view in &self.image_views {
            let attachments = [view];
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(self.extent.width)
                .height(self.extent.height)
                .layers(1);

            let framebuffer = unsafe { device.create_framebuffer(&framebuffer_info, None) }
                .fatal("create framebuffer")?;
            self.framebuffers.push(framebuffer);
        }

        Ok(())
    }

    /// Whether every image has a view and a framebuffer.
    pub fn is_complete(&self) -> bool {
        self.image_views.len() == self.images.len() && self.framebuffers.len() == self.images.len()
    }

    /// Framebuffer for the given image index.
    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index as usize).copied()
    }

    /// Rebuild the swapchain and its image views.
    ///
    /// Blocks while the window is minimized, then waits for the device to go
    /// idle before destroying anything. Framebuffers are left to the caller,
    /// which must rebuild its render pass first if the format changed.
    pub fn recreate<W>(
        &mut self,
        gpu: &GpuContext,
        surface: &SurfaceContext,
        window: &mut W,
    ) -> Result<RecreateOutcome>
    where
        W: PresentationWindow + ?Sized,
    {
        let Some(window_extent) = wait_for_drawable_extent(window) else {
            return Ok(RecreateOutcome::WindowClosed);
        };
        gpu.wait_idle()?;

        unsafe {
            self.destroy(gpu.device(), &surface.swapchain_loader);
        }

        let previous_format = self.format;
        *self = Self::create(gpu, surface, window_extent)?;
        self.create_image_views(gpu.device())?;

        let outcome = RecreateOutcome::rebuilt(previous_format, self.format);
        if matches!(outcome, RecreateOutcome::Rebuilt { format_changed: true }) {
            tracing::warn!(
                "Swapchain format changed from {:?} to {:?}",
                previous_format,
                self.format
            );
        }

        tracing::info!(
            "Swapchain recreated: {}x{}",
            self.extent.width,
            self.extent.height
        );

        Ok(outcome)
    }

    /// Acquire the next image, signaling `semaphore` when it is ready.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn acquire_next_image(
        &self,
        swapchain_loader: &ash::khr::swapchain::Device,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> Result<AcquireOutcome> {
        let result = unsafe {
            swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout_ns,
                semaphore,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            }),
            // OUT_OF_DATE means no image was acquired; caller must recreate the swapchain.
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(GpuError::Fatal {
                operation: "acquire swapchain image",
                result: e,
            }),
        }
    }

    /// Present an image once all `wait_semaphores` are signaled.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn present(
        &self,
        swapchain_loader: &ash::khr::swapchain::Device,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<PresentOutcome> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { swapchain_loader.queue_present(queue, &present_info) };

        match result {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Stale),
            Err(e) => Err(GpuError::Fatal {
                operation: "present swapchain image",
                result: e,
            }),
        }
    }

    /// Destroy framebuffers, then image views, then the swapchain itself.
    ///
    /// # Safety
    /// The device must be valid and none of the resources may be in use.
    pub unsafe fn destroy(
        &mut self,
        device: &ash::Device,
        swapchain_loader: &ash::khr::swapchain::Device,
    ) {
        unsafe {
            for framebuffer in self.framebuffers.drain(..) {
                device.destroy_framebuffer(framebuffer, None);
            }
            for view in self.image_views.drain(..) {
                device.destroy_image_view(view, None);
            }
            swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
        self.swapchain = vk::SwapchainKHR::null();
        self.images.clear();

        tracing::info!("Swapchain destroyed");
    }
}

/// Select the surface format, preferring [`PREFERRED_FORMAT`] and falling back
/// to the first one offered.
///
/// Returns `None` only when `available` is empty.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|format| {
            format.format == PREFERRED_FORMAT.format
                && format.color_space == PREFERRED_FORMAT.color_space
        })
        .or_else(|| available.first())
        .copied()
}

/// Select the present mode: mailbox (low-latency triple buffering) when
/// offered, FIFO otherwise.
pub fn select_present_mode(available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if available.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        // FIFO is the only mode every implementation must support
        vk::PresentModeKHR::FIFO
    }
}

/// Request one image more than the minimum, capped at the maximum (0 = unbounded).
pub const fn select_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && image_count > capabilities.max_image_count {
        capabilities.max_image_count
    } else {
        image_count
    }
}

/// Calculate swapchain extent.
///
/// Uses the surface's current extent unless it is the `u32::MAX` sentinel,
/// in which case the window size is clamped to the supported range.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired_width: u32,
    desired_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: desired_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn capabilities(
        current: (u32, u32),
        min: (u32, u32),
        max: (u32, u32),
        image_counts: (u32, u32),
    ) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: image_counts.0,
            max_image_count: image_counts.1,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            ..Default::default()
        }
    }

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn preferred_format_is_chosen_when_listed() {
        let available = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            PREFERRED_FORMAT,
        ];
        assert_eq!(select_surface_format(&available), Some(PREFERRED_FORMAT));
    }

    #[test]
    fn preferred_format_needs_matching_color_space() {
        let available = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(
                vk::Format::B8G8R8A8_SRGB,
                vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT,
            ),
        ];
        assert_eq!(select_surface_format(&available), Some(available[0]));
    }

    #[test]
    fn first_format_is_fallback() {
        let available = [
            format(vk::Format::A2B10G10R10_UNORM_PACK32, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(select_surface_format(&available), Some(available[0]));
    }

    #[test]
    fn no_formats_yields_none() {
        assert_eq!(select_surface_format(&[]), None);
    }

    #[test]
    fn mailbox_preferred() {
        let available = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(select_present_mode(&available), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn fifo_fallback() {
        let available = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO_RELAXED];
        assert_eq!(select_present_mode(&available), vk::PresentModeKHR::FIFO);
        assert_eq!(select_present_mode(&[]), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn image_count_is_min_plus_one() {
        let caps = capabilities((800, 600), (1, 1), (4096, 4096), (2, 8));
        assert_eq!(select_image_count(&caps), 3);
    }

    #[test]
    fn image_count_capped_at_max() {
        let caps = capabilities((800, 600), (1, 1), (4096, 4096), (3, 3));
        assert_eq!(select_image_count(&caps), 3);
    }

    #[test]
    fn image_count_unbounded_when_max_is_zero() {
        let caps = capabilities((800, 600), (1, 1), (4096, 4096), (4, 0));
        assert_eq!(select_image_count(&caps), 5);
    }

    #[test]
    fn current_extent_used_when_defined() {
        let caps = capabilities((1280, 720), (1, 1), (4096, 4096), (2, 0));
        assert_eq!(calculate_extent(&caps, 640, 480), extent(1280, 720));
    }

    #[test]
    fn window_size_clamped_when_extent_undefined() {
        let caps = capabilities((u32::MAX, u32::MAX), (200, 100), (1920, 1080), (2, 0));
        assert_eq!(calculate_extent(&caps, 4000, 50), extent(1920, 100));
        assert_eq!(calculate_extent(&caps, 100, 2000), extent(200, 1080));
        assert_eq!(calculate_extent(&caps, 800, 600), extent(800, 600));
    }

    #[test]
    fn extent_always_within_bounds() {
        let caps = capabilities((u32::MAX, u32::MAX), (64, 48), (2560, 1440), (2, 0));
        for width in [1, 63, 64, 65, 1000, 2559, 2560, 2561, 10_000] {
            for height in [1, 47, 48, 49, 700, 1439, 1440, 1441, 10_000] {
                let e = calculate_extent(&caps, width, height);
                assert!((64..=2560).contains(&e.width), "width {} out of range", e.width);
                assert!((48..=1440).contains(&e.height), "height {} out of range", e.height);
            }
        }
    }

    fn support() -> SurfaceSupport {
        SurfaceSupport {
            capabilities: capabilities((u32::MAX, u32::MAX), (1, 1), (3840, 2160), (2, 4)),
            formats: vec![
                format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
                PREFERRED_FORMAT,
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        }
    }

    #[test]
    fn negotiation_combines_all_choices() {
        let config = SwapchainConfig::negotiate(&support(), extent(1600, 900)).unwrap();
        assert_eq!(config.surface_format, PREFERRED_FORMAT);
        assert_eq!(config.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!(config.extent, extent(1600, 900));
        assert_eq!(config.image_count, 3);
    }

    #[test]
    fn negotiation_is_repeatable_without_resize() {
        let support = support();
        let first = SwapchainConfig::negotiate(&support, extent(1600, 900)).unwrap();
        let second = SwapchainConfig::negotiate(&support, extent(1600, 900)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn negotiation_follows_fresh_capabilities() {
        let mut support = support();
        let before = SwapchainConfig::negotiate(&support, extent(1600, 900)).unwrap();

        // Display mode change: smaller maximum extent and tighter image counts
        support.capabilities.max_image_extent = extent(1280, 720);
        support.capabilities.min_image_count = 3;
        support.capabilities.max_image_count = 3;
        let after = SwapchainConfig::negotiate(&support, extent(1600, 900)).unwrap();

        assert_eq!(before.surface_format, after.surface_format);
        assert_eq!(after.extent, extent(1280, 720));
        assert_eq!(after.image_count, 3);
    }

    #[test]
    fn negotiation_fails_without_formats() {
        let mut support = support();
        support.formats.clear();
        assert!(SwapchainConfig::negotiate(&support, extent(800, 600)).is_err());
    }

    #[test]
    fn same_format_keeps_render_pass() {
        let outcome = RecreateOutcome::rebuilt(vk::Format::B8G8R8A8_SRGB, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(outcome, RecreateOutcome::Rebuilt { format_changed: false });
    }

    #[test]
    fn new_format_is_reported() {
        let outcome =
            RecreateOutcome::rebuilt(vk::Format::B8G8R8A8_SRGB, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(outcome, RecreateOutcome::Rebuilt { format_changed: true });
    }
}
