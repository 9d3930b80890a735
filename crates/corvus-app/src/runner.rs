//! Startup, steady-state loop and shutdown.

use std::time::Instant;

use anyhow::Context;
use corvus_core::{Diagnostics, StartupConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::frame_loop::{FrameBackend, FrameLoop};
use crate::renderer::Renderer;
use crate::stats::FrameStats;
use crate::window::WinitWindow;

/// Install the global `tracing` subscriber.
///
/// Honours `RUST_LOG`; defaults to `info`.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

/// Open the window, build the renderer and draw until the window is closed.
///
/// Every Vulkan object is released before this returns, including on error.
pub fn run(config: StartupConfig) -> anyhow::Result<()> {
    config.validate()?;

    info!("{} starting...", config.title);

    let mut window = WinitWindow::new(&config)?;
    let mut renderer = Renderer::new(&mut window, &config).context("Failed to initialize renderer")?;
    info!("GPU: {}", renderer.gpu().capabilities().summary());

    let mut frame_loop = FrameLoop::new(renderer.frames_in_flight())?;
    let mut diagnostics = Diagnostics::new(config.profile);
    let mut stats = FrameStats::default();

    while window.poll_events() {
        let frame_start = Instant::now();
        let status = frame_loop
            .draw_frame(&mut renderer, &mut window, &mut diagnostics)
            .with_context(|| format!("Frame {} failed", frame_loop.frame_count()))?;
        stats.record(frame_start.elapsed(), status);
    }

    stats.report();
    info!("Swapchain rebuilt {} times", frame_loop.recreations());

    diagnostics.clear();
    renderer.teardown();

    Ok(())
}
