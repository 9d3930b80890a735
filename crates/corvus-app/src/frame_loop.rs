//! Per-frame protocol: wait, acquire, record, submit, present, advance.
//!
//! The loop only sequences calls; everything that touches Vulkan lives behind
//! [`FrameBackend`]. Swapchain staleness is handled here by asking the backend
//! to rebuild, and is never surfaced to the caller as an error.

use corvus_core::Diagnostics;
use corvus_gpu::{AcquireOutcome, GpuError, PresentOutcome, PresentationWindow, Result};
use tracing::{debug, trace};

/// GPU-side operations the frame loop drives, addressed by frame slot.
pub trait FrameBackend {
    /// Number of frame slots.
    fn frames_in_flight(&self) -> usize;

    /// Block until the slot's previous submission has completed.
    fn wait_for_slot(&mut self, slot: usize) -> Result<()>;

    /// Unsignal the slot's fence ahead of a submission.
    fn reset_slot_fence(&mut self, slot: usize) -> Result<()>;

    /// Acquire the next swapchain image, signaling the slot's image-available semaphore.
    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome>;

    /// Reset and re-record the slot's command buffer against `image_index`.
    fn record(&mut self, slot: usize, image_index: u32) -> Result<()>;

    /// Submit the slot's command buffer, signaling its fence on completion.
    fn submit(&mut self, slot: usize) -> Result<()>;

    /// Present `image_index` once the slot's rendering has finished.
    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome>;

    /// Rebuild the swapchain and everything derived from it.
    fn recreate_swapchain(&mut self, window: &mut dyn PresentationWindow) -> Result<()>;
}

/// What happened to one call of [`FrameLoop::draw_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Submitted and presented against a still-valid swapchain.
    Presented,
    /// Submitted and presented, then the swapchain was rebuilt.
    Recreated,
    /// Acquire found the swapchain out of date; it was rebuilt and nothing was submitted.
    Skipped,
}

/// Frame slot rotation and the acquire/present state machine.
#[derive(Debug)]
pub struct FrameLoop {
    frames_in_flight: usize,
    current_frame: usize,
    frame_count: u64,
    recreations: u64,
}

impl FrameLoop {
    pub fn new(frames_in_flight: usize) -> Result<Self> {
        if frames_in_flight == 0 {
            return Err(GpuError::InvalidState(
                "At least one frame in flight is required".to_string(),
            ));
        }

        Ok(Self {
            frames_in_flight,
            current_frame: 0,
            frame_count: 0,
            recreations: 0,
        })
    }

    /// Slot the next call to [`Self::draw_frame`] will use.
    pub const fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Frames submitted so far.
    pub const fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Swapchain rebuilds triggered so far.
    pub const fn recreations(&self) -> u64 {
        self.recreations
    }

    /// Run one frame on the current slot, then advance to the next slot.
    ///
    /// The slot index advances even when the frame is skipped or the
    /// swapchain is rebuilt.
    pub fn draw_frame<B>(
        &mut self,
        backend: &mut B,
        window: &mut dyn PresentationWindow,
        diagnostics: &mut Diagnostics,
    ) -> Result<FrameStatus>
    where
        B: FrameBackend + ?Sized,
    {
        let slot = self.current_frame;
        diagnostics.start("frame");

        let status = self.run_slot(slot, backend, window, diagnostics)?;

        self.current_frame = (slot + 1) % self.frames_in_flight;
        diagnostics.stop("frame");

        trace!("Frame slot {slot}: {status:?}");
        Ok(status)
    }

    fn run_slot<B>(
        &mut self,
        slot: usize,
        backend: &mut B,
        window: &mut dyn PresentationWindow,
        diagnostics: &mut Diagnostics,
    ) -> Result<FrameStatus>
    where
        B: FrameBackend + ?Sized,
    {
        backend.wait_for_slot(slot)?;

        let (image_index, suboptimal) = match backend.acquire_image(slot)? {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => (image_index, suboptimal),
            AcquireOutcome::OutOfDate => {
                // Fence is still signaled, so the next wait on this slot returns at once
                debug!("Swapchain out of date on acquire");
                self.recreate(backend, window, diagnostics)?;
                return Ok(FrameStatus::Skipped);
            }
        };

        backend.reset_slot_fence(slot)?;
        backend.record(slot, image_index)?;
        backend.submit(slot)?;
        self.frame_count += 1;

        let presented = backend.present(slot, image_index)?;
        let resized = window.take_resized();

        if suboptimal || resized || presented == PresentOutcome::Stale {
            debug!(
                "Rebuilding swapchain after present (suboptimal: {suboptimal}, resized: {resized}, stale: {})",
                presented == PresentOutcome::Stale
            );
            self.recreate(backend, window, diagnostics)?;
            return Ok(FrameStatus::Recreated);
        }

        Ok(FrameStatus::Presented)
    }

    fn recreate<B>(
        &mut self,
        backend: &mut B,
        window: &mut dyn PresentationWindow,
        diagnostics: &mut Diagnostics,
    ) -> Result<()>
    where
        B: FrameBackend + ?Sized,
    {
        diagnostics.start("swapchain.recreate");
        backend.recreate_swapchain(window)?;
        diagnostics.stop("swapchain.recreate");
        self.recreations += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvus_gpu::wait_for_drawable_extent;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Wait(usize),
        Blocked(usize),
        Reset(usize),
        Acquire(usize),
        Record(usize, u32),
        Submit(usize),
        Present(usize, u32),
        Recreate,
    }

    /// Backend that models fences and in-flight submissions on the CPU.
    ///
    /// Pending GPU work completes only when a wait blocks on it; waiting on an
    /// unsignaled fence with nothing pending would hang forever and panics instead.
    struct MockBackend {
        slots: usize,
        signaled: Vec<bool>,
        pending: Vec<bool>,
        acquires: VecDeque<AcquireOutcome>,
        presents: VecDeque<PresentOutcome>,
        image_count: u32,
        next_image: u32,
        extent: (u32, u32),
        recorded_extents: Vec<(u32, u32)>,
        calls: Vec<Call>,
    }

    impl MockBackend {
        fn new(slots: usize) -> Self {
            Self {
                slots,
                signaled: vec![true; slots],
                pending: vec![false; slots],
                acquires: VecDeque::new(),
                presents: VecDeque::new(),
                image_count: 3,
                next_image: 0,
                extent: (800, 600),
                recorded_extents: Vec::new(),
                calls: Vec::new(),
            }
        }

        fn count(&self, call: Call) -> usize {
            self.calls.iter().filter(|&&c| c == call).count()
        }

        fn count_where(&self, f: impl Fn(&Call) -> bool) -> usize {
            self.calls.iter().filter(|c| f(c)).count()
        }
    }

    impl FrameBackend for MockBackend {
        fn frames_in_flight(&self) -> usize {
            self.slots
        }

        fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
            self.calls.push(Call::Wait(slot));
            if !self.signaled[slot] {
                assert!(
                    self.pending[slot],
                    "slot {slot} waits on a fence no submission will signal"
                );
                self.calls.push(Call::Blocked(slot));
                self.pending[slot] = false;
                self.signaled[slot] = true;
            }
            Ok(())
        }

        fn reset_slot_fence(&mut self, slot: usize) -> Result<()> {
            self.calls.push(Call::Reset(slot));
            self.signaled[slot] = false;
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
            self.calls.push(Call::Acquire(slot));
            Ok(self.acquires.pop_front().unwrap_or_else(|| {
                let image_index = self.next_image;
                self.next_image = (self.next_image + 1) % self.image_count;
                AcquireOutcome::Acquired {
                    image_index,
                    suboptimal: false,
                }
            }))
        }

        fn record(&mut self, slot: usize, image_index: u32) -> Result<()> {
            assert!(
                !self.pending[slot],
                "slot {slot} command buffer re-recorded while in flight"
            );
            self.calls.push(Call::Record(slot, image_index));
            self.recorded_extents.push(self.extent);
            Ok(())
        }

        fn submit(&mut self, slot: usize) -> Result<()> {
            assert!(!self.signaled[slot], "slot {slot} submitted with a signaled fence");
            self.calls.push(Call::Submit(slot));
            self.pending[slot] = true;
            Ok(())
        }

        fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome> {
            self.calls.push(Call::Present(slot, image_index));
            Ok(self.presents.pop_front().unwrap_or(PresentOutcome::Presented))
        }

        fn recreate_swapchain(&mut self, window: &mut dyn PresentationWindow) -> Result<()> {
            self.calls.push(Call::Recreate);
            // A window closed while minimized keeps the old swapchain
            if let Some(extent) = wait_for_drawable_extent(window) {
                self.extent = (extent.width, extent.height);
            }
            Ok(())
        }
    }

    struct MockWindow {
        size: (u32, u32),
        restored_size: (u32, u32),
        resized: bool,
        waits: usize,
        close_on_wait: bool,
        closed: bool,
    }

    impl MockWindow {
        fn new(width: u32, height: u32) -> Self {
            Self {
                size: (width, height),
                restored_size: (width, height),
                resized: false,
                waits: 0,
                close_on_wait: false,
                closed: false,
            }
        }
    }

    impl PresentationWindow for MockWindow {
        fn drawable_size(&self) -> (u32, u32) {
            self.size
        }

        fn wait_events(&mut self) {
            self.waits += 1;
            if self.close_on_wait {
                self.closed = true;
            } else {
                self.size = self.restored_size;
            }
        }

        fn take_resized(&mut self) -> bool {
            std::mem::take(&mut self.resized)
        }

        fn close_requested(&self) -> bool {
            self.closed
        }
    }

    fn diagnostics() -> Diagnostics {
        Diagnostics::new(false)
    }

    #[test]
    fn zero_frames_in_flight_rejected() {
        assert!(FrameLoop::new(0).is_err());
    }

    #[test]
    fn steady_state_call_order() {
        let mut backend = MockBackend::new(2);
        let mut window = MockWindow::new(800, 600);
        let mut frames = FrameLoop::new(2).unwrap();

        let status = frames
            .draw_frame(&mut backend, &mut window, &mut diagnostics())
            .unwrap();

        assert_eq!(status, FrameStatus::Presented);
        assert_eq!(
            backend.calls,
            vec![
                Call::Wait(0),
                Call::Acquire(0),
                Call::Reset(0),
                Call::Record(0, 0),
                Call::Submit(0),
                Call::Present(0, 0),
            ]
        );
        assert_eq!(frames.current_frame(), 1);
        assert_eq!(frames.frame_count(), 1);
    }

    #[test]
    fn third_frame_blocks_on_first_slot() {
        let mut backend = MockBackend::new(2);
        let mut window = MockWindow::new(800, 600);
        let mut frames = FrameLoop::new(2).unwrap();
        let mut diagnostics = diagnostics();

        for _ in 0..2 {
            frames
                .draw_frame(&mut backend, &mut window, &mut diagnostics)
                .unwrap();
        }
        assert_eq!(backend.count_where(|c| matches!(c, Call::Blocked(_))), 0);

        frames
            .draw_frame(&mut backend, &mut window, &mut diagnostics)
            .unwrap();

        // Frame 3 reuses slot 0 and must wait for frame 1's work before recording
        let blocked = backend
            .calls
            .iter()
            .position(|&c| c == Call::Blocked(0))
            .expect("third frame did not wait on slot 0");
        let rerecord = backend
            .calls
            .iter()
            .rposition(|&c| matches!(c, Call::Record(0, _)))
            .unwrap();
        assert!(blocked < rerecord);
        assert_eq!(backend.count(Call::Blocked(1)), 0);
        assert_eq!(frames.frame_count(), 3);
    }

    #[test]
    fn out_of_date_acquire_skips_and_recreates() {
        let mut backend = MockBackend::new(2);
        backend.acquires.push_back(AcquireOutcome::OutOfDate);
        let mut window = MockWindow::new(1024, 768);
        let mut frames = FrameLoop::new(2).unwrap();
        let mut diagnostics = diagnostics();

        let status = frames
            .draw_frame(&mut backend, &mut window, &mut diagnostics)
            .unwrap();

        assert_eq!(status, FrameStatus::Skipped);
        assert_eq!(
            backend.calls,
            vec![Call::Wait(0), Call::Acquire(0), Call::Recreate]
        );
        assert_eq!(frames.current_frame(), 1);
        assert_eq!(frames.frame_count(), 0);
        assert_eq!(frames.recreations(), 1);

        let status = frames
            .draw_frame(&mut backend, &mut window, &mut diagnostics)
            .unwrap();
        assert_eq!(status, FrameStatus::Presented);
        assert_eq!(backend.recorded_extents, vec![(1024, 768)]);
    }

    #[test]
    fn skipped_frame_leaves_slot_usable() {
        let mut backend = MockBackend::new(2);
        backend.acquires.push_back(AcquireOutcome::OutOfDate);
        let mut window = MockWindow::new(800, 600);
        let mut frames = FrameLoop::new(2).unwrap();
        let mut diagnostics = diagnostics();

        // Slot 0 skipped, slot 1 presented, slot 0 again must not hang
        for _ in 0..3 {
            frames
                .draw_frame(&mut backend, &mut window, &mut diagnostics)
                .unwrap();
        }

        assert_eq!(backend.count(Call::Blocked(0)), 0);
        assert_eq!(backend.count(Call::Submit(0)), 1);
        assert_eq!(frames.frame_count(), 2);
        assert_eq!(frames.current_frame(), 1);
    }

    #[test]
    fn suboptimal_acquire_recreates_after_present() {
        let mut backend = MockBackend::new(2);
        backend.acquires.push_back(AcquireOutcome::Acquired {
            image_index: 2,
            suboptimal: true,
        });
        let mut window = MockWindow::new(800, 600);
        let mut frames = FrameLoop::new(2).unwrap();

        let status = frames
            .draw_frame(&mut backend, &mut window, &mut diagnostics())
            .unwrap();

        assert_eq!(status, FrameStatus::Recreated);
        assert_eq!(
            &backend.calls[3..],
            &[
                Call::Record(0, 2),
                Call::Submit(0),
                Call::Present(0, 2),
                Call::Recreate
            ]
        );
    }

    #[test]
    fn stale_present_recreates() {
        let mut backend = MockBackend::new(2);
        backend.presents.push_back(PresentOutcome::Stale);
        let mut window = MockWindow::new(800, 600);
        let mut frames = FrameLoop::new(2).unwrap();

        let status = frames
            .draw_frame(&mut backend, &mut window, &mut diagnostics())
            .unwrap();

        assert_eq!(status, FrameStatus::Recreated);
        assert_eq!(backend.calls.last(), Some(&Call::Recreate));
        assert_eq!(frames.current_frame(), 1);
        assert_eq!(frames.frame_count(), 1);
    }

    #[test]
    fn resize_flag_is_consumed_once() {
        let mut backend = MockBackend::new(2);
        let mut window = MockWindow::new(800, 600);
        window.resized = true;
        let mut frames = FrameLoop::new(2).unwrap();
        let mut diagnostics = diagnostics();

        let first = frames
            .draw_frame(&mut backend, &mut window, &mut diagnostics)
            .unwrap();
        let second = frames
            .draw_frame(&mut backend, &mut window, &mut diagnostics)
            .unwrap();

        assert_eq!(first, FrameStatus::Recreated);
        assert_eq!(second, FrameStatus::Presented);
        assert!(!window.resized);
        assert_eq!(backend.count(Call::Recreate), 1);
    }

    #[test]
    fn recreation_waits_out_minimized_window() {
        let mut backend = MockBackend::new(2);
        backend.acquires.push_back(AcquireOutcome::OutOfDate);
        let mut window = MockWindow::new(0, 0);
        window.restored_size = (640, 480);
        let mut frames = FrameLoop::new(2).unwrap();
        let mut diagnostics = diagnostics();

        frames
            .draw_frame(&mut backend, &mut window, &mut diagnostics)
            .unwrap();
        assert_eq!(window.waits, 1);
        assert_eq!(backend.extent, (640, 480));

        frames
            .draw_frame(&mut backend, &mut window, &mut diagnostics)
            .unwrap();
        assert_eq!(backend.recorded_extents, vec![(640, 480)]);
    }

    #[test]
    fn closing_minimized_window_ends_recreation() {
        let mut backend = MockBackend::new(2);
        backend.acquires.push_back(AcquireOutcome::OutOfDate);
        let mut window = MockWindow::new(0, 0);
        window.close_on_wait = true;
        let mut frames = FrameLoop::new(2).unwrap();

        // Never restored; returns only because the close request ends the wait
        let status = frames
            .draw_frame(&mut backend, &mut window, &mut diagnostics())
            .unwrap();

        assert_eq!(status, FrameStatus::Skipped);
        assert_eq!(window.waits, 1);
        assert!(window.close_requested());
        assert_eq!(backend.extent, (800, 600));
        assert_eq!(frames.current_frame(), 1);
    }

    #[test]
    fn slot_index_wraps() {
        let mut backend = MockBackend::new(3);
        let mut window = MockWindow::new(800, 600);
        let mut frames = FrameLoop::new(3).unwrap();
        let mut diagnostics = diagnostics();

        let mut seen = Vec::new();
        for _ in 0..7 {
            seen.push(frames.current_frame());
            frames
                .draw_frame(&mut backend, &mut window, &mut diagnostics)
                .unwrap();
        }

        assert_eq!(seen, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(frames.current_frame(), 1);
    }

    #[test]
    fn backend_errors_propagate() {
        struct FailingPresent(MockBackend);

        impl FrameBackend for FailingPresent {
            fn frames_in_flight(&self) -> usize {
                self.0.frames_in_flight()
            }
            fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
                self.0.wait_for_slot(slot)
            }
            fn reset_slot_fence(&mut self, slot: usize) -> Result<()> {
                self.0.reset_slot_fence(slot)
            }
            fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
                self.0.acquire_image(slot)
            }
            fn record(&mut self, slot: usize, image_index: u32) -> Result<()> {
                self.0.record(slot, image_index)
            }
            fn submit(&mut self, slot: usize) -> Result<()> {
                self.0.submit(slot)
            }
            fn present(&mut self, _slot: usize, _image_index: u32) -> Result<PresentOutcome> {
                Err(GpuError::Fatal {
                    operation: "present swapchain image",
                    result: ash::vk::Result::ERROR_DEVICE_LOST,
                })
            }
            fn recreate_swapchain(&mut self, window: &mut dyn PresentationWindow) -> Result<()> {
                self.0.recreate_swapchain(window)
            }
        }

        let mut backend = FailingPresent(MockBackend::new(2));
        let mut window = MockWindow::new(800, 600);
        let mut frames = FrameLoop::new(2).unwrap();

        let err = frames
            .draw_frame(&mut backend, &mut window, &mut diagnostics())
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(frames.current_frame(), 0);
    }
}
