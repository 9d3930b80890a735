//! Synchronization primitives.

use crate::command::CommandPool;
use crate::error::{GpuError, Result, VkResultExt};
use ash::vk;

/// Create a semaphore.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    let semaphore = unsafe { device.create_semaphore(&create_info, None) }.fatal("create semaphore")?;
    Ok(semaphore)
}

/// Create a fence.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    let fence = unsafe { device.create_fence(&create_info, None) }.fatal("create fence")?;
    Ok(fence)
}

/// Wait for a fence to be signaled.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn wait_for_fence(device: &ash::Device, fence: vk::Fence, timeout_ns: u64) -> Result<()> {
    unsafe { device.wait_for_fences(&[fence], true, timeout_ns) }.fatal("wait for fence")
}

/// Reset a fence to unsignaled state.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn reset_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    unsafe { device.reset_fences(&[fence]) }.fatal("reset fence")
}

/// Per-slot resources for one frame in flight.
pub struct FrameSlot {
    /// Command buffer re-recorded every time the slot is used
    pub command_buffer: vk::CommandBuffer,
    /// Signaled when the acquired image is ready to be rendered to
    pub image_available: vk::Semaphore,
    /// Signaled when rendering is complete and the image may be presented
    pub render_finished: vk::Semaphore,
    /// Signaled when the GPU has finished the slot's last submission.
    /// Created signaled so the first wait on a fresh slot returns immediately.
    pub in_flight: vk::Fence,
}

impl FrameSlot {
    /// Create the slot's synchronization objects around `command_buffer`.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device, command_buffer: vk::CommandBuffer) -> Result<Self> {
        let mut slot = Self {
            command_buffer,
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight: vk::Fence::null(),
        };

        // Destroying a null handle is a no-op, so a half-built slot can be released as is
        if let Err(e) = unsafe { slot.create_sync_objects(device) } {
            unsafe { slot.destroy(device) };
            return Err(e);
        }

        Ok(slot)
    }

    unsafe fn create_sync_objects(&mut self, device: &ash::Device) -> Result<()> {
        unsafe {
            self.image_available = create_semaphore(device)?;
            self.render_finished = create_semaphore(device)?;
            self.in_flight = create_fence(device, true)?;
        }
        Ok(())
    }

    /// Block until the slot's previous submission has completed.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn wait(&self, device: &ash::Device) -> Result<()> {
        unsafe { wait_for_fence(device, self.in_flight, u64::MAX) }
    }

    /// Unsignal the fence ahead of a new submission.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn reset(&self, device: &ash::Device) -> Result<()> {
        unsafe { reset_fence(device, self.in_flight) }
    }

    /// Destroy the synchronization objects. The command buffer is freed with its pool.
    ///
    /// # Safety
    /// The device must be valid and the slot must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_fence(self.in_flight, None);
        }
    }
}

/// Fixed set of frame slots, one per frame in flight.
pub struct FrameSlots {
    slots: Vec<FrameSlot>,
}

impl FrameSlots {
    /// Allocate `frames_in_flight` command buffers from `pool` and build a slot around each.
    ///
    /// # Safety
    /// The device must be valid and `pool` must belong to it.
    pub unsafe fn new(device: &ash::Device, pool: &CommandPool, frames_in_flight: usize) -> Result<Self> {
        if frames_in_flight == 0 {
            return Err(GpuError::InvalidState(
                "At least one frame in flight is required".to_string(),
            ));
        }

        let command_buffers = unsafe {
            pool.allocate_command_buffers(
                device,
                vk::CommandBufferLevel::PRIMARY,
                frames_in_flight as u32,
            )
        }?;

        let mut slots = Self {
            slots: Vec::with_capacity(frames_in_flight),
        };
        for command_buffer in command_buffers {
            match unsafe { FrameSlot::new(device, command_buffer) } {
                Ok(slot) => slots.slots.push(slot),
                Err(e) => {
                    unsafe { slots.destroy(device) };
                    return Err(e);
                }
            }
        }

        tracing::debug!("Created {} frame slots", slots.len());

        Ok(slots)
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether there are no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot at `index`.
    pub fn get(&self, index: usize) -> Result<&FrameSlot> {
        self.slots.get(index).ok_or_else(|| {
            GpuError::InvalidState(format!(
                "Frame slot {index} out of range ({} slots)",
                self.slots.len()
            ))
        })
    }

    /// Destroy every slot's synchronization objects.
    ///
    /// # Safety
    /// The device must be valid and no slot may be in use.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        for slot in self.slots.drain(..) {
            unsafe { slot.destroy(device) };
        }
    }
}
