//! Frame timing statistics reported at shutdown.

use std::time::Duration;

use tracing::info;

use crate::frame_loop::FrameStatus;

#[derive(Debug, Clone, Default)]
pub struct FrameStats {
    presented: u64,
    skipped: u64,
    recreated: u64,
    total_time: Duration,
    shortest: Option<Duration>,
    longest: Option<Duration>,
}

impl FrameStats {
    /// Account for one call of the frame loop that took `elapsed`.
    pub fn record(&mut self, elapsed: Duration, status: FrameStatus) {
        match status {
            FrameStatus::Presented => self.presented += 1,
            FrameStatus::Recreated => {
                self.presented += 1;
                self.recreated += 1;
            }
            // Skipped frames draw nothing and would skew the rates
            FrameStatus::Skipped => {
                self.skipped += 1;
                return;
            }
        }

        self.total_time += elapsed;
        self.shortest = Some(self.shortest.map_or(elapsed, |d| d.min(elapsed)));
        self.longest = Some(self.longest.map_or(elapsed, |d| d.max(elapsed)));
    }

    pub const fn presented(&self) -> u64 {
        self.presented
    }

    pub const fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Highest instantaneous rate, from the shortest frame.
    pub fn max_fps(&self) -> Option<f64> {
        self.shortest.and_then(rate)
    }

    /// Lowest instantaneous rate, from the longest frame.
    pub fn min_fps(&self) -> Option<f64> {
        self.longest.and_then(rate)
    }

    /// Presented frames per second of frame time.
    pub fn avg_fps(&self) -> Option<f64> {
        let secs = self.total_time.as_secs_f64();
        (self.presented > 0 && secs > 0.0).then(|| self.presented as f64 / secs)
    }

    /// Log a summary at info level.
    pub fn report(&self) {
        if self.presented == 0 {
            info!("No frames presented");
            return;
        }

        info!("FPS Statistics:");
        if let (Some(min), Some(max), Some(avg)) = (self.min_fps(), self.max_fps(), self.avg_fps())
        {
            info!("  Min: {:.1}", min);
            info!("  Max: {:.1}", max);
            info!("  Avg: {:.1}", avg);
        }
        info!("  Total frames: {}", self.presented);
        info!("  Skipped: {}", self.skipped);
        info!("  Swapchain rebuilds: {}", self.recreated);
    }
}

fn rate(frame_time: Duration) -> Option<f64> {
    let secs = frame_time.as_secs_f64();
    (secs > 0.0).then(|| 1.0 / secs)
}
