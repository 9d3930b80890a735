//! Vulkan resources for the viewport and the frame protocol over them.

use std::path::Path;

use ash::vk;
use corvus_core::StartupConfig;
use corvus_gpu::command::{end_command_buffer, reset_and_begin, submit_command_buffers};
use corvus_gpu::mesh::quad;
use corvus_gpu::{
    load_spirv, wait_for_drawable_extent, AcquireOutcome, CommandPool, FrameSlots, GpuContext,
    GpuContextBuilder, GpuError, GraphicsPipeline, GraphicsPipelineConfig, Mesh, PresentOutcome,
    PresentationWindow, QueueRole, RecreateOutcome, RenderPass, Result, SurfaceContext, Swapchain,
    Vertex,
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{error, info};

use crate::frame_loop::FrameBackend;

/// Background color behind the mesh.
pub const CLEAR_COLOR: [f32; 4] = [0.01, 0.01, 0.01, 1.0];

/// Owns every Vulkan object the viewport uses.
///
/// Everything after the device context is optional so that a renderer that
/// failed halfway through construction can still be torn down. Teardown runs
/// in reverse construction order, skips what was never built, and destroys
/// the surface before the device context is dropped.
pub struct Renderer {
    mesh: Option<Mesh>,
    slots: Option<FrameSlots>,
    command_pool: Option<CommandPool>,
    pipeline: Option<GraphicsPipeline>,
    swapchain: Option<Swapchain>,
    render_pass: Option<RenderPass>,
    pipeline_config: GraphicsPipelineConfig,
    surface: SurfaceContext,
    gpu: GpuContext,
    torn_down: bool,
}

impl Renderer {
    /// Build the device, swapchain, pipeline, frame slots and the default mesh.
    ///
    /// Shaders are resolved before any Vulkan object exists. If a later step
    /// fails, everything built so far is released before the error is returned.
    pub fn new<W>(window: &mut W, config: &StartupConfig) -> Result<Self>
    where
        W: PresentationWindow + HasDisplayHandle + HasWindowHandle,
    {
        let pipeline_config = GraphicsPipelineConfig::new(
            shader_code(
                config.vertex_shader.as_deref(),
                corvus_shaders::simple_vertex_shader,
            )?,
            shader_code(
                config.fragment_shader.as_deref(),
                corvus_shaders::simple_fragment_shader,
            )?,
        )
        .with_vertex_input(Vertex::binding_descriptions(), Vertex::attribute_descriptions());

        let (gpu, surface) = GpuContextBuilder::new()
            .app_name(&config.title)
            .validation(config.validation)
            .build(&*window)?;

        let mut renderer = Self {
            mesh: None,
            slots: None,
            command_pool: None,
            pipeline: None,
            swapchain: None,
            render_pass: None,
            pipeline_config,
            surface,
            gpu,
            torn_down: false,
        };

        // On error the partial renderer is dropped, which runs teardown
        renderer.build_resources(window, config.frames_in_flight)?;

        Ok(renderer)
    }

    fn build_resources<W>(&mut self, window: &mut W, frames_in_flight: usize) -> Result<()>
    where
        W: PresentationWindow + ?Sized,
    {
        let window_extent = wait_for_drawable_extent(window).ok_or_else(|| {
            GpuError::InvalidState("Window closed before it could be drawn to".to_string())
        })?;

        let device = self.gpu.device();
        let swapchain = self
            .swapchain
            .insert(Swapchain::create(&self.gpu, &self.surface, window_extent)?);

        // SAFETY: Device is valid
        let render_pass = self
            .render_pass
            .insert(unsafe { RenderPass::new(device, swapchain.format) }?);
        swapchain.create_image_views(device)?;
        swapchain.create_framebuffers(device, render_pass.render_pass)?;

        // SAFETY: Device is valid and the render pass was created from it
        self.pipeline = Some(unsafe {
            GraphicsPipeline::new(device, render_pass.render_pass, &self.pipeline_config)
        }?);

        // SAFETY: Device is valid
        let command_pool = self.command_pool.insert(unsafe {
            CommandPool::resettable(device, self.gpu.queue_family(QueueRole::Graphics))
        }?);
        // SAFETY: Device is valid and the pool belongs to it
        let slots = self
            .slots
            .insert(unsafe { FrameSlots::new(device, command_pool, frames_in_flight) }?);

        let (vertices, indices) = quad();
        self.mesh = Some(Mesh::upload(&self.gpu, &vertices, &indices)?);

        info!(
            "Renderer ready: {} frames in flight, {} swapchain images",
            slots.len(),
            swapchain.images.len()
        );

        Ok(())
    }

    pub const fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    /// Release every Vulkan object except the device context itself.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        info!("Starting cleanup...");
        if let Err(e) = self.gpu.wait_idle() {
            error!("Failed to wait idle: {e}");
        }

        if let Some(mut mesh) = self.mesh.take() {
            if let Err(e) = mesh.destroy(&self.gpu) {
                error!("Failed to free mesh buffers: {e}");
            }
        }

        let device = self.gpu.device();
        // SAFETY: Device is idle and every object below was created from it
        unsafe {
            if let Some(mut slots) = self.slots.take() {
                slots.destroy(device);
            }
            if let Some(command_pool) = self.command_pool.take() {
                command_pool.destroy(device);
            }
            if let Some(pipeline) = self.pipeline.take() {
                pipeline.destroy(device);
            }
            if let Some(mut swapchain) = self.swapchain.take() {
                swapchain.destroy(device, &self.surface.swapchain_loader);
            }
            if let Some(render_pass) = self.render_pass.take() {
                render_pass.destroy(device);
            }
            self.surface.destroy();
        }

        info!("Cleanup complete");
    }

    /// Replace the render pass and pipeline after the swapchain format changed.
    fn rebuild_render_pass(&mut self, format: vk::Format) -> Result<()> {
        let device = self.gpu.device();

        // SAFETY: Swapchain recreation left the device idle, and command
        // buffers that reference these objects are re-recorded before reuse
        unsafe {
            if let Some(pipeline) = self.pipeline.take() {
                pipeline.destroy(device);
            }
            if let Some(render_pass) = self.render_pass.take() {
                render_pass.destroy(device);
            }
        }

        // SAFETY: Device is valid
        let render_pass = self
            .render_pass
            .insert(unsafe { RenderPass::new(device, format) }?);
        // SAFETY: Device is valid and the render pass was created from it
        self.pipeline = Some(unsafe {
            GraphicsPipeline::new(device, render_pass.render_pass, &self.pipeline_config)
        }?);

        info!("Render pass and pipeline rebuilt for {format:?}");
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// SPIR-V for one pipeline stage: the file at `path` if given, else the built-in shader.
fn shader_code(path: Option<&Path>, built_in: fn() -> &'static [u32]) -> Result<Vec<u32>> {
    match path {
        Some(path) => load_spirv(path),
        None => Ok(built_in().to_vec()),
    }
}

fn missing(what: &str) -> GpuError {
    GpuError::InvalidState(format!("Renderer has no {what}"))
}

impl FrameBackend for Renderer {
    fn frames_in_flight(&self) -> usize {
        self.slots.as_ref().map_or(0, FrameSlots::len)
    }

    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        let slots = self.slots.as_ref().ok_or_else(|| missing("frame slots"))?;
        // SAFETY: Device is valid and owns the slot's fence
        unsafe { slots.get(slot)?.wait(self.gpu.device()) }
    }

    fn reset_slot_fence(&mut self, slot: usize) -> Result<()> {
        let slots = self.slots.as_ref().ok_or_else(|| missing("frame slots"))?;
        // SAFETY: Device is valid and the fence was just waited on
        unsafe { slots.get(slot)?.reset(self.gpu.device()) }
    }

    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
        let slots = self.slots.as_ref().ok_or_else(|| missing("frame slots"))?;
        let swapchain = self.swapchain.as_ref().ok_or_else(|| missing("swapchain"))?;
        let semaphore = slots.get(slot)?.image_available;
        // SAFETY: Swapchain and semaphore belong to this device and the
        // semaphore has no pending signal
        unsafe {
            swapchain.acquire_next_image(&self.surface.swapchain_loader, semaphore, u64::MAX)
        }
    }

    fn record(&mut self, slot: usize, image_index: u32) -> Result<()> {
        let device = self.gpu.device();
        let slots = self.slots.as_ref().ok_or_else(|| missing("frame slots"))?;
        let swapchain = self.swapchain.as_ref().ok_or_else(|| missing("swapchain"))?;
        let render_pass = self.render_pass.as_ref().ok_or_else(|| missing("render pass"))?;
        let pipeline = self.pipeline.as_ref().ok_or_else(|| missing("pipeline"))?;
        let mesh = self.mesh.as_ref().ok_or_else(|| missing("mesh"))?;

        let cmd = slots.get(slot)?.command_buffer;
        let framebuffer = swapchain.framebuffer(image_index).ok_or_else(|| {
            GpuError::InvalidState(format!("No framebuffer for swapchain image {image_index}"))
        })?;
        let extent = swapchain.extent;

        // SAFETY: The slot's fence has been waited on, so its command buffer
        // is not in use, and every bound object belongs to this device
        unsafe {
            reset_and_begin(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;

            render_pass.begin(device, cmd, framebuffer, extent, CLEAR_COLOR);
            pipeline.bind(device, cmd, extent);
            mesh.bind(device, cmd);
            mesh.draw(device, cmd);
            render_pass.end(device, cmd);

            end_command_buffer(device, cmd)
        }
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        let slots = self.slots.as_ref().ok_or_else(|| missing("frame slots"))?;
        let frame = slots.get(slot)?;

        let command_buffers = [frame.command_buffer];
        let wait_semaphores = [frame.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [frame.render_finished];

        // SAFETY: Command buffer has finished recording and the fence was reset
        unsafe {
            submit_command_buffers(
                self.gpu.device(),
                self.gpu.queue(QueueRole::Graphics),
                &command_buffers,
                &wait_semaphores,
                &wait_stages,
                &signal_semaphores,
                frame.in_flight,
            )
        }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome> {
        let slots = self.slots.as_ref().ok_or_else(|| missing("frame slots"))?;
        let swapchain = self.swapchain.as_ref().ok_or_else(|| missing("swapchain"))?;
        let render_finished = slots.get(slot)?.render_finished;
        // SAFETY: Image was acquired from this swapchain and the semaphore is
        // signaled by the submission just made
        unsafe {
            swapchain.present(
                &self.surface.swapchain_loader,
                self.gpu.queue(QueueRole::Present),
                image_index,
                &[render_finished],
            )
        }
    }

    fn recreate_swapchain(&mut self, window: &mut dyn PresentationWindow) -> Result<()> {
        let swapchain = self.swapchain.as_mut().ok_or_else(|| missing("swapchain"))?;
        let format_changed = match swapchain.recreate(&self.gpu, &self.surface, window)? {
            RecreateOutcome::WindowClosed => return Ok(()),
            RecreateOutcome::Rebuilt { format_changed } => format_changed,
        };
        let format = swapchain.format;

        if format_changed {
            self.rebuild_render_pass(format)?;
        }

        let swapchain = self.swapchain.as_mut().ok_or_else(|| missing("swapchain"))?;
        let render_pass = self.render_pass.as_ref().ok_or_else(|| missing("render pass"))?;
        swapchain.create_framebuffers(self.gpu.device(), render_pass.render_pass)?;
        debug_assert!(swapchain.is_complete());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raw_window_handle::{DisplayHandle, HandleError, WindowHandle};
    use std::cell::Cell;

    /// Window with no native handles that counts how often they are requested.
    struct HeadlessWindow {
        handle_requests: Cell<usize>,
    }

    impl HeadlessWindow {
        fn new() -> Self {
            Self {
                handle_requests: Cell::new(0),
            }
        }
    }

    impl PresentationWindow for HeadlessWindow {
        fn drawable_size(&self) -> (u32, u32) {
            (800, 600)
        }

        fn wait_events(&mut self) {}

        fn take_resized(&mut self) -> bool {
            false
        }

        fn close_requested(&self) -> bool {
            false
        }
    }

    impl HasWindowHandle for HeadlessWindow {
        fn window_handle(&self) -> std::result::Result<WindowHandle<'_>, HandleError> {
            self.handle_requests.set(self.handle_requests.get() + 1);
            Err(HandleError::Unavailable)
        }
    }

    impl HasDisplayHandle for HeadlessWindow {
        fn display_handle(&self) -> std::result::Result<DisplayHandle<'_>, HandleError> {
            self.handle_requests.set(self.handle_requests.get() + 1);
            Err(HandleError::Unavailable)
        }
    }

    #[test]
    fn missing_shader_fails_before_any_vulkan_object() {
        let mut window = HeadlessWindow::new();
        let config = StartupConfig::default().with_vertex_shader("corvus-missing.vert.spv");

        let result = Renderer::new(&mut window, &config);

        assert!(matches!(result, Err(GpuError::ShaderLoad { .. })));
        assert_eq!(window.handle_requests.get(), 0);
    }

    #[test]
    fn built_in_shaders_need_no_files() {
        let mut window = HeadlessWindow::new();
        let config = StartupConfig::default();

        // Shaders resolve, so construction gets as far as the window handles
        let result = Renderer::new(&mut window, &config);

        assert!(matches!(result, Err(GpuError::SurfaceCreation(_))));
        assert!(window.handle_requests.get() > 0);
    }

    #[test]
    fn shader_override_is_read_from_disk() {
        let path =
            std::env::temp_dir().join(format!("corvus-override-{}.spv", std::process::id()));
        let words = [0x0723_0203_u32, 0x0001_0000, 0, 1, 0];
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        std::fs::write(&path, bytes).unwrap();

        let code = shader_code(Some(path.as_path()), corvus_shaders::simple_vertex_shader).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(code, words);
    }

    #[test]
    fn built_in_shader_used_without_override() {
        let code = shader_code(None, corvus_shaders::simple_fragment_shader).unwrap();
        assert_eq!(code, corvus_shaders::simple_fragment_shader());
    }
}
