//! The move buffer pool (C2): a fixed-size ring of `MoveBuffer` records with
//! write-reservation, publish and run-release discipline.
//!
//! `spec.md` §9 flags the historical implementation's cyclic forward/backward
//! neighbour pointers for replacement by index arithmetic in a safer
//! language. `BufferPool` follows that redesign: slots are addressed by
//! `usize` index modulo `POOL_SIZE`, and the three cursors (`w`, `q`, `r`)
//! are the only mutable queue state.

#[cfg(feature = "trace-events")]
use tracing::debug;

/// Lifecycle state of a pool slot. The only legal transitions are
/// `Empty -> Loading -> Queued -> Running -> Empty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferState {
    #[default]
    Empty,
    Loading,
    Queued,
    Running,
}

/// Dispatch discriminator for a queued record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveType {
    #[default]
    None,
    Accel,
    Cruise,
    Decel,
    Line,
    Arc,
    Dwell,
    Start,
    Stop,
    End,
}

/// Per-record continuation state, advanced by the runtime that owns the
/// currently-running slot. `ForceEnd` is reachable from any state via the
/// async-kill path (`spec.md` §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveState {
    #[default]
    New,
    Running1,
    Running2,
    Finalize,
    ForceEnd,
}

/// One element of the move queue.
///
/// `target`/`unit_vec` are sized to `AXES`. Arc-only fields are always
/// present but only meaningful when `move_type == MoveType::Arc`.
#[derive(Debug, Clone, Copy)]
pub struct MoveBuffer<const AXES: usize> {
    pub buffer_state: BufferState,
    pub move_type: MoveType,
    pub move_state: MoveState,

    pub target: [f64; AXES],
    pub unit_vec: [f64; AXES],
    pub length: f64,
    /// Total duration (linear/ramp moves) or dwell time, in minutes unless
    /// stated otherwise at the call site.
    pub time: f64,
    pub starting_velocity: f64,
    pub ending_velocity: f64,

    // Arc-only fields (spec.md §3).
    pub theta: f64,
    pub radius: f64,
    pub angular_travel: f64,
    pub linear_travel: f64,
    pub axis_1: usize,
    pub axis_2: usize,
    pub axis_linear: usize,

    // Per-record runtime continuation (spec.md §9: "cooperative continuation
    // -> explicit state objects", held on the record rather than a scratch
    // singleton).
    /// Remaining segment count for the arc runtime (C3) and the jerk-ramp
    /// runtime (C5, counted across both halves).
    pub segment_count: u32,
    /// Monotonic time accumulator sampled by the jerk-ramp runtime's cubic
    /// velocity curves; restarted at zero on each new region.
    pub elapsed_time: f64,
    /// Running arc angle for the arc runtime, distinct from `theta` (the
    /// starting angle, used once to compute `center_1`/`center_2`).
    pub theta_progress: f64,
    pub center_1: f64,
    pub center_2: f64,
}

impl<const AXES: usize> Default for MoveBuffer<AXES> {
    fn default() -> Self {
        Self {
            buffer_state: BufferState::default(),
            move_type: MoveType::default(),
            move_state: MoveState::default(),
            target: [0.0; AXES],
            unit_vec: [0.0; AXES],
            length: 0.0,
            time: 0.0,
            starting_velocity: 0.0,
            ending_velocity: 0.0,
            theta: 0.0,
            radius: 0.0,
            angular_travel: 0.0,
            linear_travel: 0.0,
            axis_1: 0,
            axis_2: 1,
            axis_linear: 2,
            segment_count: 0,
            elapsed_time: 0.0,
            theta_progress: 0.0,
            center_1: 0.0,
            center_2: 0.0,
        }
    }
}

impl<const AXES: usize> MoveBuffer<AXES> {
    /// Resets every field except `buffer_state`, which the pool sets
    /// explicitly right after this call (`spec.md` §4.1: "zero the slot
    /// preserving link fields" — here there are no link fields to preserve,
    /// since links were replaced by index arithmetic, but the state write
    /// ordering is kept the same for clarity).
    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// The move buffer pool. `POOL_SIZE` must be at least
/// `MotionConfig::MAX_BUFFERS_NEEDED` and is normally much larger so the
/// queue can absorb several moves' worth of lookahead.
pub struct BufferPool<const AXES: usize, const POOL_SIZE: usize> {
    records: [MoveBuffer<AXES>; POOL_SIZE],
    /// Next slot to reserve for writing.
    w: usize,
    /// Next slot to publish from among those already reserved.
    q: usize,
    /// Current running slot.
    r: usize,
}

impl<const AXES: usize, const POOL_SIZE: usize> BufferPool<AXES, POOL_SIZE> {
    pub fn new() -> Self {
        Self {
            records: [MoveBuffer::default(); POOL_SIZE],
            w: 0,
            q: 0,
            r: 0,
        }
    }

    /// Resets every slot to `Empty` and all cursors to slot 0.
    pub fn init(&mut self) {
        for slot in self.records.iter_mut() {
            slot.reset();
        }
        self.w = 0;
        self.q = 0;
        self.r = 0;
    }

    #[inline]
    fn next(idx: usize) -> usize {
        (idx + 1) % POOL_SIZE
    }

    #[inline]
    fn prev(idx: usize) -> usize {
        (idx + POOL_SIZE - 1) % POOL_SIZE
    }

    /// True iff the next `n` slots starting at `w` are all `Empty`. Does not
    /// move any cursor.
    pub fn test_write(&self, n: usize) -> bool {
        let mut idx = self.w;
        for _ in 0..n {
            if self.records[idx].buffer_state != BufferState::Empty {
                return false;
            }
            idx = Self::next(idx);
        }
        true
    }

    /// Reserves the slot at `w` for writing and returns its index, or `None`
    /// if that slot is not `Empty`. On success the slot is zeroed (state
    /// becomes `Loading`) and `w` advances.
    pub fn get_write_buffer(&mut self) -> Option<usize> {
        let idx = self.w;
        if self.records[idx].buffer_state != BufferState::Empty {
            return None;
        }
        self.records[idx].reset();
        self.records[idx].buffer_state = BufferState::Loading;
        self.w = Self::next(self.w);
        #[cfg(feature = "trace-events")]
        debug!(idx, "buffer slot Empty -> Loading");
        Some(idx)
    }

    /// Rolls back the most-recently-gotten write slot, marking it `Empty`
    /// again. Only valid immediately after a successful `get_write_buffer`
    /// with no intervening `get_write_buffer`/`queue_write_buffer` call.
    pub fn unget_write_buffer(&mut self) {
        self.w = Self::prev(self.w);
        self.records[self.w].reset();
        #[cfg(feature = "trace-events")]
        debug!(idx = self.w, "buffer slot Loading -> Empty (unget)");
    }

    /// Publishes the slot at `q` as `Queued` with the given type, resets its
    /// continuation state to `New`, and advances `q`.
    pub fn queue_write_buffer(&mut self, move_type: MoveType) {
        let idx = self.q;
        self.records[idx].buffer_state = BufferState::Queued;
        self.records[idx].move_type = move_type;
        self.records[idx].move_state = MoveState::New;
        self.q = Self::next(self.q);
        #[cfg(feature = "trace-events")]
        debug!(idx, ?move_type, "buffer slot Loading -> Queued");
    }

    /// Index of the slot immediately before `w`: the most recently queued or
    /// still-loading predecessor, used by the junction planner for look-back.
    pub fn prev_buffer_index(&self) -> usize {
        Self::prev(self.w)
    }

    /// Index of the slot at `r` if it is `Queued` (promoted to `Running` by
    /// this call) or already `Running`; `None` otherwise.
    pub fn get_run_buffer(&mut self) -> Option<usize> {
        let idx = self.r;
        match self.records[idx].buffer_state {
            BufferState::Queued => {
                self.records[idx].buffer_state = BufferState::Running;
                #[cfg(feature = "trace-events")]
                debug!(idx, "buffer slot Queued -> Running");
                Some(idx)
            }
            BufferState::Running => Some(idx),
            _ => None,
        }
    }

    /// Releases the currently running slot back to `Empty` and advances `r`.
    pub fn end_run_buffer(&mut self) {
        let idx = self.r;
        self.records[idx].reset();
        self.r = Self::next(self.r);
        #[cfg(feature = "trace-events")]
        debug!(idx, "buffer slot Running -> Empty");
    }

    pub fn buffer(&self, idx: usize) -> &MoveBuffer<AXES> {
        &self.records[idx]
    }

    pub fn buffer_mut(&mut self, idx: usize) -> &mut MoveBuffer<AXES> {
        &mut self.records[idx]
    }

    /// `true` once every slot has drained back to `Empty` and the cursors
    /// have caught up with each other (`spec.md` §8, property 5).
    pub fn is_drained(&self) -> bool {
        self.r == self.w && self.w == self.q
    }
}

impl<const AXES: usize, const POOL_SIZE: usize> Default for BufferPool<AXES, POOL_SIZE> {
    fn default() -> Self {
        Self::new()
    }
}
