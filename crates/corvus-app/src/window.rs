//! winit-backed presentation window.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use corvus_core::StartupConfig;
use corvus_gpu::PresentationWindow;
use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use tracing::{debug, info};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Fullscreen, Icon, Window, WindowAttributes, WindowId};

/// Event state shared with winit while events are pumped.
struct WindowState {
    attributes: Option<WindowAttributes>,
    window: Option<Window>,
    size: PhysicalSize<u32>,
    resized: bool,
    close_requested: bool,
    creation_error: Option<String>,
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let Some(attributes) = self.attributes.take() else {
            return;
        };

        match event_loop.create_window(attributes) {
            Ok(window) => {
                self.size = window.inner_size();
                info!("Window created: {}x{}", self.size.width, self.size.height);
                self.window = Some(window);
            }
            Err(e) => {
                self.creation_error = Some(e.to_string());
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.close_requested = true;
            }
            WindowEvent::Resized(size) => {
                debug!("Window resized to {}x{}", size.width, size.height);
                self.size = size;
                self.resized = true;
            }
            _ => {}
        }
    }
}

/// OS window plus the event loop that feeds it.
///
/// Events are pumped on demand rather than handed to `run_app`, so the
/// frame loop stays in control of the thread.
pub struct WinitWindow {
    event_loop: EventLoop<()>,
    state: WindowState,
}

impl WinitWindow {
    /// Open a window described by `config` and wait for it to appear.
    pub fn new(config: &StartupConfig) -> anyhow::Result<Self> {
        let event_loop = EventLoop::new().context("Failed to create event loop")?;

        let mut attributes = Window::default_attributes()
            .with_title(&config.title)
            .with_inner_size(PhysicalSize::new(config.width, config.height));
        if config.fullscreen {
            attributes = attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }
        if let Some(icon_path) = &config.icon_path {
            attributes = attributes.with_window_icon(Some(load_icon(icon_path)?));
        }

        let mut window = Self {
            event_loop,
            state: WindowState {
                attributes: Some(attributes),
                window: None,
                size: PhysicalSize::new(config.width, config.height),
                resized: false,
                close_requested: false,
                creation_error: None,
            },
        };

        while window.state.window.is_none() {
            let status = window
                .event_loop
                .pump_app_events(Some(Duration::from_millis(16)), &mut window.state);
            if let Some(error) = window.state.creation_error.take() {
                bail!("Failed to create window: {error}");
            }
            if let PumpStatus::Exit(code) = status {
                bail!("Event loop exited with code {code} before the window was created");
            }
        }

        Ok(window)
    }

    /// Process pending events without blocking. Returns `false` once the
    /// window has been asked to close.
    pub fn poll_events(&mut self) -> bool {
        let status = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.state);
        if matches!(status, PumpStatus::Exit(_)) {
            self.state.close_requested = true;
        }
        !self.state.close_requested
    }
}

impl PresentationWindow for WinitWindow {
    fn drawable_size(&self) -> (u32, u32) {
        let size = self
            .state
            .window
            .as_ref()
            .map_or(self.state.size, Window::inner_size);
        (size.width, size.height)
    }

    fn wait_events(&mut self) {
        let status = self.event_loop.pump_app_events(None, &mut self.state);
        if matches!(status, PumpStatus::Exit(_)) {
            self.state.close_requested = true;
        }
    }

    fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.state.resized)
    }

    fn close_requested(&self) -> bool {
        self.state.close_requested
    }
}

impl HasWindowHandle for WinitWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        self.state
            .window
            .as_ref()
            .ok_or(HandleError::Unavailable)?
            .window_handle()
    }
}

impl HasDisplayHandle for WinitWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        self.state
            .window
            .as_ref()
            .ok_or(HandleError::Unavailable)?
            .display_handle()
    }
}

/// Decode an image file into a window icon.
pub fn load_icon(path: &Path) -> anyhow::Result<Icon> {
    let image = image::open(path)
        .with_context(|| format!("Failed to open icon {}", path.display()))?
        .into_rgba8();
    let (width, height) = image.dimensions();
    Icon::from_rgba(image.into_raw(), width, height)
        .map_err(|e| anyhow!("Invalid icon {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_icon_is_reported() {
        let path = std::env::temp_dir().join("corvus-missing-icon.png");
        let err = load_icon(&path).unwrap_err();
        assert!(err.to_string().contains("corvus-missing-icon.png"));
    }
}
