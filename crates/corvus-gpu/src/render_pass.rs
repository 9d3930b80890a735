//! Render pass for drawing straight into swapchain images.

use crate::error::{Result, VkResultExt};
use ash::vk;

/// Single-subpass render pass with one color attachment.
///
/// The attachment is cleared on load, stored, and left in
/// `PRESENT_SRC_KHR` ready for presentation.
pub struct RenderPass {
    pub render_pass: vk::RenderPass,
    pub format: vk::Format,
}

impl RenderPass {
    /// Create a render pass targeting images of `format`.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device, format: vk::Format) -> Result<Self> {
        let color_attachment = vk::AttachmentDescription::default()
            .format(format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

        let color_attachment_ref = vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        let color_attachments = [color_attachment_ref];
        let subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_attachments);

        // The layout transition must wait until the image has been released by the presentation engine
        let dependency = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE);

        let attachments = [color_attachment];
        let subpasses = [subpass];
        let dependencies = [dependency];
        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.create_render_pass(&create_info, None) }
            .fatal("create render pass")?;

        tracing::debug!("Render pass created for {:?}", format);

        Ok(Self {
            render_pass,
            format,
        })
    }

    /// Begin the pass on `framebuffer`, clearing to `clear_color`.
    ///
    /// # Safety
    /// The command buffer must be recording and the framebuffer must be compatible.
    pub unsafe fn begin(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    ) {
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: clear_color,
            },
        }];

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        unsafe { device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE) };
    }

    /// End the pass.
    ///
    /// # Safety
    /// The command buffer must be inside this render pass.
    pub unsafe fn end(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        unsafe { device.cmd_end_render_pass(cmd) };
    }

    /// Destroy the render pass.
    ///
    /// # Safety
    /// The device must be valid and no framebuffer or pipeline may still use it.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe { device.destroy_render_pass(self.render_pass, None) };
    }
}
