//! GPU context management.

use crate::capabilities::GpuCapabilities;
use crate::error::{GpuError, Result, VkResultExt};
use crate::instance::{create_instance, DebugMessenger};
use crate::memory::GpuAllocator;
use crate::surface::{create_surface, SurfaceContext};
use ash::vk;
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::{c_char, CStr};
use std::sync::Arc;

/// Role a queue plays in the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueRole {
    /// Receives recorded command buffers.
    Graphics,
    /// Receives presentation requests.
    Present,
}

/// Main GPU context holding Vulkan resources.
pub struct GpuContext {
    // Entry must be kept alive for the lifetime of the context
    #[allow(dead_code)]
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) debug_messenger: Option<DebugMessenger>,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: Arc<ash::Device>,
    pub(crate) capabilities: GpuCapabilities,
    pub(crate) allocator: Mutex<GpuAllocator>,

    // Queue families and queues
    pub(crate) queue_families: QueueFamilyIndices,
    pub(crate) graphics_queue: vk::Queue,
    pub(crate) present_queue: vk::Queue,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the physical device handle.
    pub const fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get the Vulkan instance handle.
    pub const fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get GPU capabilities.
    pub const fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    /// Get the queue serving `role`.
    pub const fn queue(&self, role: QueueRole) -> vk::Queue {
        match role {
            QueueRole::Graphics => self.graphics_queue,
            QueueRole::Present => self.present_queue,
        }
    }

    /// Get the queue family index serving `role`.
    pub const fn queue_family(&self, role: QueueRole) -> u32 {
        self.queue_families.get(role)
    }

    /// Queue family indices in use.
    pub const fn queue_families(&self) -> QueueFamilyIndices {
        self.queue_families
    }

    /// Get access to the GPU allocator.
    pub const fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    /// Wait for device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            // Shutdown allocator BEFORE destroying device
            self.allocator.lock().shutdown();

            self.device.destroy_device(None);
            if let Some(messenger) = self.debug_messenger.take() {
                messenger.destroy();
            }
            self.instance.destroy_instance(None);
        }

        tracing::info!("GPU context destroyed");
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "Corvus".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    #[must_use]
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    #[must_use]
    pub const fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Build the GPU context and the surface for `window`.
    ///
    /// The surface is returned separately; it must be destroyed (via
    /// [`SurfaceContext::destroy`]) before the context is dropped.
    pub fn build<W>(self, window: &W) -> Result<(GpuContext, SurfaceContext)>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?
            .as_raw();

        // Load Vulkan entry point
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::Other(format!("Failed to load Vulkan: {e}")))?;

        let (instance, validation_enabled) =
            unsafe { create_instance(&entry, &self.app_name, display, self.enable_validation) }?;

        // Every early return from here on destroys what the guard holds
        let mut guard = InstanceGuard::new(instance);

        if validation_enabled {
            guard.debug_messenger = Some(unsafe { DebugMessenger::new(&entry, &guard.instance) }?);
        }

        let (surface, surface_loader) =
            unsafe { create_surface(&entry, &guard.instance, window) }?;
        guard.surface = Some((surface, surface_loader.clone()));

        // Select best physical device that can present to the surface
        let (physical_device, queue_families, capabilities) =
            unsafe { select_physical_device(&guard.instance, &surface_loader, surface) }?;

        tracing::info!("Selected GPU: {}", capabilities.summary());

        let (device, graphics_queue, present_queue) =
            unsafe { create_device(&guard.instance, physical_device, queue_families)? };

        let device = Arc::new(device);

        let allocator =
            match unsafe { GpuAllocator::new(&guard.instance, device.clone(), physical_device) } {
                Ok(allocator) => allocator,
                Err(e) => {
                    unsafe { device.destroy_device(None) };
                    return Err(e);
                }
            };

        let swapchain_loader = ash::khr::swapchain::Device::new(&guard.instance, &device);
        let surface = SurfaceContext::new(surface, surface_loader, swapchain_loader);
        let (instance, debug_messenger) = guard.release();

        let context = GpuContext {
            entry,
            instance,
            debug_messenger,
            physical_device,
            device,
            capabilities,
            allocator: Mutex::new(allocator),
            queue_families,
            graphics_queue,
            present_queue,
        };

        Ok((context, surface))
    }
}

/// Instance-level objects created before the device exists.
///
/// Dropping the guard destroys the surface, the messenger and the instance in
/// that order. [`Self::release`] hands them over instead.
struct InstanceGuard {
    instance: ash::Instance,
    debug_messenger: Option<DebugMessenger>,
    surface: Option<(vk::SurfaceKHR, ash::khr::surface::Instance)>,
    released: bool,
}

impl InstanceGuard {
    const fn new(instance: ash::Instance) -> Self {
        Self {
            instance,
            debug_messenger: None,
            surface: None,
            released: false,
        }
    }

    /// Give up ownership; the surface is expected to have been moved into a
    /// [`SurfaceContext`] by now.
    fn release(mut self) -> (ash::Instance, Option<DebugMessenger>) {
        self.released = true;
        self.surface = None;
        (self.instance.clone(), self.debug_messenger.take())
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        unsafe {
            if let Some((surface, loader)) = self.surface.take() {
                loader.destroy_surface(surface, None);
            }
            if let Some(messenger) = self.debug_messenger.take() {
                messenger.destroy();
            }
            self.instance.destroy_instance(None);
        }

        tracing::debug!("Partially built GPU context released");
    }
}

/// Queue family indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Family index serving `role`.
    pub const fn get(&self, role: QueueRole) -> u32 {
        match role {
            QueueRole::Graphics => self.graphics,
            QueueRole::Present => self.present,
        }
    }

    /// Whether one family serves both roles.
    pub const fn is_shared(&self) -> bool {
        self.graphics == self.present
    }
}

/// Find graphics and present queue families, preferring one that does both.
///
/// # Safety
/// The instance, physical device and surface must be valid.
unsafe fn find_queue_families(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
) -> Option<QueueFamilyIndices> {
    let queue_families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    let mut graphics_family = None;
    let mut present_family = None;

    for (i, family) in queue_families.iter().enumerate() {
        let i = i as u32;

        let graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let present = unsafe {
            surface_loader.get_physical_device_surface_support(physical_device, i, surface)
        }
        .unwrap_or(false);

        if graphics && present {
            return Some(QueueFamilyIndices {
                graphics: i,
                present: i,
            });
        }

        if graphics && graphics_family.is_none() {
            graphics_family = Some(i);
        }
        if present && present_family.is_none() {
            present_family = Some(i);
        }
    }

    Some(QueueFamilyIndices {
        graphics: graphics_family?,
        present: present_family?,
    })
}

/// Required device extensions.
fn required_device_extensions() -> Vec<&'static CStr> {
    vec![
        ash::khr::swapchain::NAME,
        #[cfg(target_os = "macos")]
        ash::khr::portability_subset::NAME,
    ]
}

/// Select the best physical device that can render and present to `surface`.
///
/// # Safety
/// The instance and surface must be valid.
unsafe fn select_physical_device(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, QueueFamilyIndices, GpuCapabilities)> {
    let devices = unsafe { instance.enumerate_physical_devices() }.fatal("enumerate GPUs")?;

    let mut best: Option<(vk::PhysicalDevice, QueueFamilyIndices, GpuCapabilities)> = None;

    for device in devices {
        let capabilities = unsafe { GpuCapabilities::query(instance, device) };

        let Some(families) =
            (unsafe { find_queue_families(instance, surface_loader, surface, device) })
        else {
            tracing::debug!("{}: no graphics/present queue", capabilities.device_name);
            continue;
        };

        if let Some(missing) = required_device_extensions()
            .into_iter()
            .find(|ext| !capabilities.supports_extension(ext))
        {
            tracing::debug!("{}: missing {:?}", capabilities.device_name, missing);
            continue;
        }

        // A surface with no formats or present modes cannot back a swapchain
        let adequate = unsafe {
            let formats = surface_loader
                .get_physical_device_surface_formats(device, surface)
                .unwrap_or_default();
            let modes = surface_loader
                .get_physical_device_surface_present_modes(device, surface)
                .unwrap_or_default();
            !formats.is_empty() && !modes.is_empty()
        };
        if !adequate {
            tracing::debug!("{}: surface support inadequate", capabilities.device_name);
            continue;
        }

        let better = best
            .as_ref()
            .map_or(true, |(_, _, current)| capabilities.score() > current.score());
        if better {
            best = Some((device, families, capabilities));
        }
    }

    best.ok_or(GpuError::NoSuitableDevice)
}

/// Create the logical device and retrieve queues.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_families: QueueFamilyIndices,
) -> Result<(ash::Device, vk::Queue, vk::Queue)> {
    let mut unique_families = vec![queue_families.graphics];
    if !queue_families.is_shared() {
        unique_families.push(queue_families.present);
    }

    let queue_priority = 1.0_f32;
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(std::slice::from_ref(&queue_priority))
        })
        .collect();

    let extension_names: Vec<*const c_char> = required_device_extensions()
        .iter()
        .map(|ext| ext.as_ptr())
        .collect();

    let features = vk::PhysicalDeviceFeatures::default();

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .enabled_features(&features);

    let device = unsafe { instance.create_device(physical_device, &device_create_info, None) }
        .fatal("create logical device")?;

    let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
    let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };

    tracing::info!(
        "Logical device created (graphics family {}, present family {})",
        queue_families.graphics,
        queue_families.present
    );

    Ok((device, graphics_queue, present_queue))
}
