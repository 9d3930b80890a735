//! Corvus viewport demo.
//!
//! Opens a window and draws a colored quad with a fixed graphics pipeline,
//! rebuilding the swapchain whenever the window is resized or minimized.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p corvus-viewer -- [OPTIONS]
//! ```
//!
//! The built-in shaders are compiled into the binary. `--vertex-shader` and
//! `--fragment-shader` replace them with pre-compiled SPIR-V from disk.
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use corvus_app::{init_logging, run};
use corvus_core::constants::DEFAULT_FRAMES_IN_FLIGHT;
use corvus_core::StartupConfig;
use tracing::error;

#[derive(clap::Parser, Debug)]
#[command(about = "Corvus viewport demo", long_about = None)]
struct Args {
    /// Window title.
    #[arg(long, default_value = "Corvus Viewport")]
    title: String,

    /// Cover the primary monitor instead of opening a window.
    #[arg(short, long)]
    fullscreen: bool,

    /// Window width in pixels.
    #[arg(long, default_value_t = 1920)]
    width: u32,

    /// Window height in pixels.
    #[arg(long, default_value_t = 1080)]
    height: u32,

    /// Window icon image (PNG or JPEG).
    #[arg(long)]
    icon: Option<PathBuf>,

    /// Pre-compiled SPIR-V vertex shader to use instead of the built-in one.
    #[arg(long)]
    vertex_shader: Option<PathBuf>,

    /// Pre-compiled SPIR-V fragment shader to use instead of the built-in one.
    #[arg(long)]
    fragment_shader: Option<PathBuf>,

    /// Force Vulkan validation layers on.
    #[arg(long, conflicts_with = "no_validation")]
    validation: bool,

    /// Force Vulkan validation layers off.
    #[arg(long)]
    no_validation: bool,

    /// Frames the CPU may record ahead of the GPU.
    #[arg(long, default_value_t = DEFAULT_FRAMES_IN_FLIGHT)]
    frames_in_flight: usize,

    /// Log named-interval timings at trace level.
    #[arg(long)]
    profile: bool,
}

impl Args {
    fn into_config(self) -> StartupConfig {
        // Validation defaults to on in debug builds unless forced either way
        let validation = if self.validation {
            true
        } else if self.no_validation {
            false
        } else {
            cfg!(debug_assertions)
        };

        let mut config = StartupConfig::new(self.title)
            .with_size(self.width, self.height)
            .with_fullscreen(self.fullscreen)
            .with_validation(validation)
            .with_frames_in_flight(self.frames_in_flight)
            .with_profiling(self.profile);
        if let Some(icon) = self.icon {
            config = config.with_icon(icon);
        }
        if let Some(path) = self.vertex_shader {
            config = config.with_vertex_shader(path);
        }
        if let Some(path) = self.fragment_shader {
            config = config.with_fragment_shader(path);
        }
        config
    }
}

fn main() -> ExitCode {
    init_logging();

    let config = Args::parse().into_config();

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> StartupConfig {
        let argv = std::iter::once("corvus-viewer").chain(args.iter().copied());
        Args::try_parse_from(argv).unwrap().into_config()
    }

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn defaults_match_startup_config() {
        let config = parse(&[]);
        let defaults = StartupConfig::default();
        assert_eq!(config.title, defaults.title);
        assert_eq!((config.width, config.height), (defaults.width, defaults.height));
        assert_eq!(config.vertex_shader, defaults.vertex_shader);
        assert_eq!(config.fragment_shader, defaults.fragment_shader);
        assert_eq!(config.frames_in_flight, defaults.frames_in_flight);
        assert_eq!(config.validation, defaults.validation);
        assert!(!config.fullscreen);
        assert!(config.icon_path.is_none());
    }

    #[test]
    fn plain_run_uses_built_in_shaders() {
        let config = parse(&[]);
        assert!(config.vertex_shader.is_none());
        assert!(config.fragment_shader.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn arguments_map_to_fields() {
        let config = parse(&[
            "--title",
            "Demo",
            "--fullscreen",
            "--width",
            "800",
            "--height",
            "600",
            "--icon",
            "icon.png",
            "--vertex-shader",
            "a.spv",
            "--fragment-shader",
            "b.spv",
            "--no-validation",
            "--frames-in-flight",
            "3",
            "--profile",
        ]);

        assert_eq!(config.title, "Demo");
        assert!(config.fullscreen);
        assert_eq!((config.width, config.height), (800, 600));
        assert_eq!(config.icon_path, Some(PathBuf::from("icon.png")));
        assert_eq!(config.vertex_shader, Some(PathBuf::from("a.spv")));
        assert_eq!(config.fragment_shader, Some(PathBuf::from("b.spv")));
        assert!(!config.validation);
        assert_eq!(config.frames_in_flight, 3);
        assert!(config.profile);
    }

    #[test]
    fn validation_flags_conflict() {
        let argv = ["corvus-viewer", "--validation", "--no-validation"];
        assert!(Args::try_parse_from(argv).is_err());
    }

    #[test]
    fn zero_frames_in_flight_fails_validation() {
        let config = parse(&["--frames-in-flight", "0"]);
        assert!(config.validate().is_err());
    }
}
