//! The downward interface: the external motor queue that actually drives
//! stepper pulses. The motion core never depends on a concrete stepper
//! driver, only on this trait.

/// Program-flow event kinds queued by [`crate::MotionCore::queued_stop`],
/// `queued_start`, `queued_end` and their `async_*` counterparts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopKind {
    Stop,
    Start,
    End,
}

/// The motor queue consumed by the motion core. A real implementation is
/// driven by a timer interrupt that dequeues segment records; this trait
/// only describes the foreground-safe interface the core polls and writes
/// to. `test_motor_buffer` must be safe to poll from the foreground while an
/// interrupt handler drains the same queue concurrently.
pub trait MotorQueue<const AXES: usize> {
    /// Capacity probe. `false` means the core must retry rather than emit.
    fn test_motor_buffer(&mut self) -> bool;

    /// Emits one step-pulse segment: a per-axis signed step delta and a
    /// duration in microseconds.
    fn queue_line(&mut self, delta_steps: [i32; AXES], microseconds: u32);

    /// Emits one timed, non-motion hold.
    fn queue_dwell(&mut self, microseconds: u32);

    /// Emits one program-flow event.
    fn queue_stops(&mut self, kind: StopKind);

    /// Immediate control passthrough, bypassing the queue entirely.
    fn stop(&mut self);
    fn start(&mut self);
    fn end(&mut self);

    /// `true` while the downstream still has outstanding work to drain.
    /// Consulted by `MotionCore::is_busy`.
    fn is_busy(&self) -> bool;
}

/// Test-support implementation of [`MotorQueue`] backed by a fixed-capacity
/// `heapless::Deque`, so it runs identically on host and on an MCU target.
/// Not part of the public motion-core API surface beyond tests and
/// examples.
#[cfg(any(test, feature = "std"))]
pub mod recording {
    use super::{MotorQueue, StopKind};
    use heapless::Deque;

    /// One record emitted to the simulated downstream queue.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum Emitted<const AXES: usize> {
        Line {
            delta_steps: [i32; AXES],
            microseconds: u32,
        },
        Dwell {
            microseconds: u32,
        },
        Stops(StopKind),
        ImmediateStop,
        ImmediateStart,
        ImmediateEnd,
    }

    /// A `MotorQueue` that records every call instead of driving hardware,
    /// for deterministic trace assertions in tests and examples.
    pub struct RecordingMotorQueue<const AXES: usize, const CAP: usize> {
        trace: Deque<Emitted<AXES>, CAP>,
        /// When `false`, `test_motor_buffer` reports full and every `queue_*`
        /// call is refused; used to exercise `Status::Retry` paths.
        capacity_available: bool,
        busy: bool,
    }

    impl<const AXES: usize, const CAP: usize> RecordingMotorQueue<AXES, CAP> {
        pub fn new() -> Self {
            Self {
                trace: Deque::new(),
                capacity_available: true,
                busy: false,
            }
        }

        /// Simulates the downstream queue filling up (or draining again).
        pub fn set_capacity_available(&mut self, available: bool) {
            self.capacity_available = available;
        }

        pub fn trace(&self) -> &Deque<Emitted<AXES>, CAP> {
            &self.trace
        }

        pub fn len(&self) -> usize {
            self.trace.len()
        }

        pub fn is_empty(&self) -> bool {
            self.trace.is_empty()
        }

        pub fn pop_front(&mut self) -> Option<Emitted<AXES>> {
            self.trace.pop_front()
        }

        /// Marks the simulated downstream as drained, so `is_busy` reports
        /// `false` again (a real consumer would do this as it empties the
        /// queue on the ISR side).
        pub fn drain(&mut self) {
            self.busy = false;
        }
    }

    impl<const AXES: usize, const CAP: usize> Default for RecordingMotorQueue<AXES, CAP> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<const AXES: usize, const CAP: usize> MotorQueue<AXES> for RecordingMotorQueue<AXES, CAP> {
        fn test_motor_buffer(&mut self) -> bool {
            self.capacity_available && !self.trace.is_full()
        }

        fn queue_line(&mut self, delta_steps: [i32; AXES], microseconds: u32) {
            self.busy = true;
            let _ = self.trace.push_back(Emitted::Line {
                delta_steps,
                microseconds,
            });
        }

        fn queue_dwell(&mut self, microseconds: u32) {
            self.busy = true;
            let _ = self.trace.push_back(Emitted::Dwell { microseconds });
        }

        fn queue_stops(&mut self, kind: StopKind) {
            self.busy = true;
            let _ = self.trace.push_back(Emitted::Stops(kind));
        }

        fn stop(&mut self) {
            let _ = self.trace.push_back(Emitted::ImmediateStop);
        }

        fn start(&mut self) {
            let _ = self.trace.push_back(Emitted::ImmediateStart);
        }

        fn end(&mut self) {
            self.busy = false;
            let _ = self.trace.push_back(Emitted::ImmediateEnd);
        }

        fn is_busy(&self) -> bool {
            self.busy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::recording::{Emitted, RecordingMotorQueue};
    use super::*;

    #[test]
    fn recording_queue_captures_emitted_lines() {
        let mut q: RecordingMotorQueue<4, 8> = RecordingMotorQueue::new();
        assert!(q.test_motor_buffer());
        q.queue_line([800, 0, 0, 0], 6000);
        assert_eq!(q.len(), 1);
        assert_eq!(
            q.pop_front(),
            Some(Emitted::Line {
                delta_steps: [800, 0, 0, 0],
                microseconds: 6000
            })
        );
    }

    #[test]
    fn capacity_unavailable_is_reported_by_test_motor_buffer() {
        let mut q: RecordingMotorQueue<4, 8> = RecordingMotorQueue::new();
        q.set_capacity_available(false);
        assert!(!q.test_motor_buffer());
    }

    #[test]
    fn is_busy_tracks_emitted_and_drained_state() {
        let mut q: RecordingMotorQueue<4, 8> = RecordingMotorQueue::new();
        assert!(!q.is_busy());
        q.queue_dwell(1000);
        assert!(q.is_busy());
        q.drain();
        assert!(!q.is_busy());
    }
}
