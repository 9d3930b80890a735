//! Startup configuration.

use std::path::PathBuf;

use crate::constants::DEFAULT_FRAMES_IN_FLIGHT;
use crate::error::{Error, Result};

/// Parameters the engine needs before the first window and device exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupConfig {
    /// Window title.
    pub title: String,
    /// Cover the primary monitor instead of opening a window.
    pub fullscreen: bool,
    /// Initial window width in pixels (ignored in fullscreen).
    pub width: u32,
    /// Initial window height in pixels (ignored in fullscreen).
    pub height: u32,
    /// Optional window icon image.
    pub icon_path: Option<PathBuf>,
    /// Pre-compiled SPIR-V vertex shader. `None` uses the built-in one.
    pub vertex_shader: Option<PathBuf>,
    /// Pre-compiled SPIR-V fragment shader. `None` uses the built-in one.
    pub fragment_shader: Option<PathBuf>,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Number of frame slots the CPU may record ahead of the GPU.
    pub frames_in_flight: usize,
    /// Emit named-interval timings at trace level.
    pub profile: bool,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            title: "Corvus Viewport".to_string(),
            fullscreen: false,
            width: 1920,
            height: 1080,
            icon_path: None,
            vertex_shader: None,
            fragment_shader: None,
            validation: cfg!(debug_assertions),
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            profile: false,
        }
    }
}

impl StartupConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    #[must_use]
    pub const fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Enable or disable fullscreen.
    #[must_use]
    pub const fn with_fullscreen(mut self, fullscreen: bool) -> Self {
        self.fullscreen = fullscreen;
        self
    }

    /// Set the window icon.
    #[must_use]
    pub fn with_icon(mut self, path: impl Into<PathBuf>) -> Self {
        self.icon_path = Some(path.into());
        self
    }

    /// Replace both built-in shaders with SPIR-V binaries on disk.
    #[must_use]
    pub fn with_shaders(
        mut self,
        vertex_shader: impl Into<PathBuf>,
        fragment_shader: impl Into<PathBuf>,
    ) -> Self {
        self.vertex_shader = Some(vertex_shader.into());
        self.fragment_shader = Some(fragment_shader.into());
        self
    }

    /// Replace the built-in vertex shader.
    #[must_use]
    pub fn with_vertex_shader(mut self, path: impl Into<PathBuf>) -> Self {
        self.vertex_shader = Some(path.into());
        self
    }

    /// Replace the built-in fragment shader.
    #[must_use]
    pub fn with_fragment_shader(mut self, path: impl Into<PathBuf>) -> Self {
        self.fragment_shader = Some(path.into());
        self
    }

    /// Enable or disable validation layers.
    #[must_use]
    pub const fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Set the number of frames in flight.
    #[must_use]
    pub const fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Enable or disable diagnostics timing.
    #[must_use]
    pub const fn with_profiling(mut self, profile: bool) -> Self {
        self.profile = profile;
        self
    }

    /// Check the configuration before any window or GPU object is created.
    pub fn validate(&self) -> Result<()> {
        if !self.fullscreen && (self.width == 0 || self.height == 0) {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }

        if self.frames_in_flight == 0 {
            return Err(Error::Config(
                "at least one frame in flight is required".to_string(),
            ));
        }

        let empty_path =
            |path: &Option<PathBuf>| path.as_ref().is_some_and(|p| p.as_os_str().is_empty());
        if empty_path(&self.vertex_shader) || empty_path(&self.fragment_shader) {
            return Err(Error::Config("shader paths must not be empty".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = StartupConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frames_in_flight, 2);
    }

    #[test]
    fn default_config_uses_built_in_shaders() {
        let config = StartupConfig::default();
        assert!(config.vertex_shader.is_none());
        assert!(config.fragment_shader.is_none());
    }

    #[test]
    fn one_shader_can_be_replaced() {
        let config = StartupConfig::default().with_fragment_shader("tint.frag.spv");
        assert!(config.vertex_shader.is_none());
        assert_eq!(config.fragment_shader, Some(PathBuf::from("tint.frag.spv")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_sets_fields() {
        let config = StartupConfig::new("Test")
            .with_size(800, 600)
            .with_icon("icon.png")
            .with_shaders("a.vert.spv", "a.frag.spv")
            .with_frames_in_flight(3);

        assert_eq!(config.title, "Test");
        assert_eq!((config.width, config.height), (800, 600));
        assert_eq!(config.icon_path, Some(PathBuf::from("icon.png")));
        assert_eq!(config.vertex_shader, Some(PathBuf::from("a.vert.spv")));
        assert_eq!(config.frames_in_flight, 3);
    }

    #[test]
    fn zero_window_size_rejected() {
        let config = StartupConfig::default().with_size(0, 600);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn zero_size_allowed_in_fullscreen() {
        let config = StartupConfig::default()
            .with_size(0, 0)
            .with_fullscreen(true);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_frames_in_flight_rejected() {
        let config = StartupConfig::default().with_frames_in_flight(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_shader_path_rejected() {
        let config = StartupConfig::default().with_shaders("", "frag.spv");
        assert!(config.validate().is_err());
    }
}
