//! Frame-in-flight bookkeeping.
//!
//! The ring maps the monotonically increasing frame counter onto `N` frame
//! slots and tracks whether a frame is currently being recorded. It holds
//! no GPU objects; the backend owns one set of slot resources per index.
//!
//! # Synchronization Flow
//!
//! ```text
//! begin_frame (slot = counter % N)
//!   1. wait on the slot fence (CPU waits for frame counter - N)
//!   2. reset the slot's command pool
//!   3. acquire a swapchain image (signals image_available)
//!   4. reset the slot fence, begin the command buffer
//! end_frame
//!   5. submit: wait image_available, signal render_finished + fence
//!   6. present: wait render_finished
//!   7. counter += 1
//! ```

use tracing::trace;

/// Recording state of the ring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Recording { slot: u32, image_index: u32 },
}

/// Maps frame numbers to frame slots.
#[derive(Debug)]
pub struct FrameRing {
    counter: u64,
    size: u32,
    state: FrameState,
}

impl FrameRing {
    /// Creates a ring of `size` slots.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn new(size: u32) -> Self {
        assert!(size > 0, "frame ring needs at least one slot");
        Self {
            counter: 0,
            size,
            state: FrameState::Idle,
        }
    }

    /// Slot used by frame number `counter`.
    #[inline]
    pub fn slot_for(&self, counter: u64) -> u32 {
        (counter % u64::from(self.size)) as u32
    }

    /// Slot of the frame that begins next (or is being recorded).
    #[inline]
    pub fn current_slot(&self) -> u32 {
        self.slot_for(self.counter)
    }

    /// Frames completed so far.
    #[inline]
    pub fn counter(&self) -> u64 {
        self.counter
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    #[inline]
    pub fn state(&self) -> FrameState {
        self.state
    }

    #[inline]
    pub fn is_recording(&self) -> bool {
        matches!(self.state, FrameState::Recording { .. })
    }

    /// `(slot, image_index)` of the frame being recorded.
    pub fn recording(&self) -> Option<(u32, u32)> {
        match self.state {
            FrameState::Recording { slot, image_index } => Some((slot, image_index)),
            FrameState::Idle => None,
        }
    }

    /// Enters the recording state for the current slot.
    ///
    /// # Panics
    ///
    /// Panics if a frame is already being recorded.
    pub fn begin(&mut self, image_index: u32) -> u32 {
        assert!(
            !self.is_recording(),
            "begin_frame called while frame {} is still recording",
            self.counter
        );
        let slot = self.current_slot();
        self.state = FrameState::Recording { slot, image_index };
        trace!("Frame {} recording in slot {} (image {})", self.counter, slot, image_index);
        slot
    }

    /// Leaves the recording state and advances the counter.
    ///
    /// # Panics
    ///
    /// Panics if no frame is being recorded.
    pub fn finish(&mut self) {
        assert!(self.is_recording(), "end_frame called without a matching begin_frame");
        self.state = FrameState::Idle;
        self.counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_for_wraps() {
        let ring = FrameRing::new(3);
        let slots: Vec<u32> = (0..7).map(|c| ring.slot_for(c)).collect();
        assert_eq!(slots, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_begin_finish_advances() {
        let mut ring = FrameRing::new(2);
        assert_eq!(ring.begin(5), 0);
        assert_eq!(ring.recording(), Some((0, 5)));
        ring.finish();
        assert_eq!(ring.counter(), 1);
        assert_eq!(ring.current_slot(), 1);
        assert_eq!(ring.state(), FrameState::Idle);
    }

    #[test]
    fn test_single_slot_ring() {
        let mut ring = FrameRing::new(1);
        for _ in 0..3 {
            assert_eq!(ring.begin(0), 0);
            ring.finish();
        }
        assert_eq!(ring.counter(), 3);
    }

    #[test]
    #[should_panic(expected = "still recording")]
    fn test_double_begin_panics() {
        let mut ring = FrameRing::new(2);
        ring.begin(0);
        ring.begin(1);
    }

    #[test]
    #[should_panic(expected = "without a matching begin_frame")]
    fn test_finish_without_begin_panics() {
        FrameRing::new(2).finish();
    }
}
