//! Named-interval timing for diagnostics.
//!
//! A `Diagnostics` value is owned by the runner and passed by reference to
//! whatever wants to time a section of work.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Ad-hoc interval timer keyed by name.
#[derive(Debug, Default)]
pub struct Diagnostics {
    enabled: bool,
    intervals: HashMap<String, Instant>,
}

impl Diagnostics {
    /// Create a diagnostics context.
    ///
    /// When `enabled` is false every call is a no-op.
    pub fn new(enabled: bool) -> Self {
        if enabled {
            tracing::info!("Diagnostics timing enabled");
        }
        Self {
            enabled,
            intervals: HashMap::new(),
        }
    }

    /// Whether timings are being collected.
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Start (or restart) the interval `name`.
    pub fn start(&mut self, name: &str) {
        if self.enabled {
            self.intervals.insert(name.to_string(), Instant::now());
        }
    }

    /// Stop the interval `name` and report how long it ran.
    ///
    /// Returns `None` when disabled or when the interval was never started.
    pub fn stop(&mut self, name: &str) -> Option<Duration> {
        if !self.enabled {
            return None;
        }

        match self.intervals.remove(name) {
            Some(start) => {
                let elapsed = start.elapsed();
                tracing::trace!("Timer [{}] took {} microseconds", name, elapsed.as_micros());
                Some(elapsed)
            }
            None => {
                tracing::error!("Timer [{}] was not started", name);
                None
            }
        }
    }

    /// Number of intervals started but not yet stopped.
    pub fn pending(&self) -> usize {
        self.intervals.len()
    }

    /// Drop all pending intervals.
    pub fn clear(&mut self) {
        self.intervals.clear();
    }
}
