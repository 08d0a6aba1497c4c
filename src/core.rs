//! `MotionCore`: the single owned value that holds everything the planner
//! and runtimes need, rather than relying on module-level singletons. It
//! threads the buffer pool, the junction/region planner and the per-type
//! runtimes together and exposes the motion core's upward interface.

use crate::buffer::{BufferPool, BufferState, MoveState, MoveType};
use crate::config::{MotionConfig, PathControlMode};
use crate::errors::Status;
use crate::geom;
use crate::mathx::sqrt;
use crate::motor_queue::MotorQueue;
use crate::planner::{self, PlannerScratch, RegionPlan};
use crate::runtime;

#[cfg(feature = "trace-events")]
use tracing::{debug, warn};

/// The motion core. Generic over the axis count, the downstream motor queue
/// implementation, and the buffer pool size (must be at least
/// `MotionConfig::<AXES>::MAX_BUFFERS_NEEDED`, and normally much larger so
/// the queue can absorb several moves' worth of lookahead).
pub struct MotionCore<const AXES: usize, Q: MotorQueue<AXES>, const POOL_SIZE: usize> {
    config: MotionConfig<AXES>,
    pool: BufferPool<AXES, POOL_SIZE>,
    planner: PlannerScratch<AXES>,
    /// The machine's actual current position, updated by the runtimes as
    /// segments are emitted. Distinct from `planner.position`, which tracks
    /// the end of the last *queued* region regardless of how much of it has
    /// actually run.
    position: [f64; AXES],
    motor_queue: Q,
}

impl<const AXES: usize, Q: MotorQueue<AXES>, const POOL_SIZE: usize> MotionCore<AXES, Q, POOL_SIZE> {
    pub fn new(config: MotionConfig<AXES>, motor_queue: Q) -> Self {
        let mut core = Self {
            config,
            pool: BufferPool::new(),
            planner: PlannerScratch::new(),
            position: [0.0; AXES],
            motor_queue,
        };
        core.pool.init();
        core
    }

    pub fn config(&self) -> &MotionConfig<AXES> {
        &self.config
    }

    pub fn motor_queue(&self) -> &Q {
        &self.motor_queue
    }

    pub fn motor_queue_mut(&mut self) -> &mut Q {
        &mut self.motor_queue
    }

    /// Zeroes every record, the planner scratch, and the queue cursors.
    pub fn init(&mut self) {
        self.pool.init();
        self.planner = PlannerScratch::new();
        self.position = [0.0; AXES];
    }

    /// Rewrites the machine's current position without queuing a move.
    /// Only valid once the queue is fully drained; otherwise a logic error
    /// (`Status::Err`) rather than silently rewriting geometry out from
    /// under an in-flight move.
    pub fn set_position(&mut self, position: [f64; AXES]) -> Status {
        if self.is_busy() {
            return Status::Err;
        }
        self.planner.position = position;
        self.position = position;
        Status::Ok
    }

    /// True from the first queueing call until the last emitted segment has
    /// drained downstream.
    pub fn is_busy(&self) -> bool {
        !self.pool.is_drained() || self.motor_queue.is_busy()
    }

    /// Queues a simple, non-jerk-planned line as a single buffer.
    pub fn line(&mut self, target: [f64; AXES], minutes: f64) -> Status {
        let delta = geom::sub(&target, &self.planner.position);
        let length = geom::length(&delta);
        if length < self.config.min_line_length {
            return Status::ZeroLengthMove;
        }
        if !self.pool.test_write(1) {
            #[cfg(feature = "trace-events")]
            warn!("line: buffer pool full, refusing to queue");
            return Status::BufferFullFatal;
        }
        let unit_vec = geom::normalize(&delta, length);
        let idx = match self.pool.get_write_buffer() {
            Some(idx) => idx,
            None => {
                #[cfg(feature = "trace-events")]
                warn!("line: get_write_buffer failed after a successful test_write");
                return Status::BufferFullFatal;
            }
        };
        let velocity = length / minutes;
        {
            let buf = self.pool.buffer_mut(idx);
            buf.target = target;
            buf.unit_vec = unit_vec;
            buf.length = length;
            buf.time = minutes;
            buf.starting_velocity = velocity;
            buf.ending_velocity = velocity;
        }
        self.pool.queue_write_buffer(MoveType::Line);
        self.planner.position = target;
        self.planner.unit_vec = unit_vec;
        Status::Ok
    }

    /// A jerk-planned line with junction blending. Orchestrates junction
    /// planning (plus the previous-tail rewrite) and the region solve, then
    /// queues up to three regions: head, body, tail.
    pub fn aline(&mut self, target: [f64; AXES], minutes: f64) -> Status {
        let delta = geom::sub(&target, &self.planner.position);
        let length = geom::length(&delta);
        if length < self.config.min_line_length {
            return Status::ZeroLengthMove;
        }
        if !self.pool.test_write(MotionConfig::<AXES>::MAX_BUFFERS_NEEDED) {
            #[cfg(feature = "trace-events")]
            warn!("aline: buffer pool lacks room for MAX_BUFFERS_NEEDED, refusing to queue");
            return Status::BufferFullFatal;
        }

        let unit_vec = geom::normalize(&delta, length);
        let requested_target_velocity = length / minutes;

        let prev_idx = self.pool.prev_buffer_index();
        let prev = self.pool.buffer(prev_idx);
        let prev_state = prev.buffer_state;
        let prev_type = prev.move_type;
        let prev_unit_vec = prev.unit_vec;
        let prev_starting_velocity = prev.starting_velocity;
        let prev_length = prev.length;

        let prev_is_live = matches!(prev_state, BufferState::Queued | BufferState::Running);
        let previous_velocity = if prev_is_live { prev_starting_velocity } else { 0.0 };
        let fallback_path_mode = if prev_is_live {
            self.config.path_control_mode
        } else {
            PathControlMode::ExactStop
        };
        let prev_is_arc = prev_is_live && prev_type == MoveType::Arc;

        // An arc predecessor skips the angular-jerk downgrade table
        // entirely and hands its own velocity straight through as this
        // move's initial velocity.
        let initial_velocity = if prev_is_arc {
            previous_velocity
        } else {
            let angular_jerk = planner::angular_jerk_estimate(
                &unit_vec,
                &prev_unit_vec,
                previous_velocity,
                self.config.max_velocity,
            );
            let decision = planner::select_path_and_velocity(
                fallback_path_mode,
                angular_jerk,
                previous_velocity,
                requested_target_velocity,
                self.config.angular_jerk_lower,
                self.config.angular_jerk_upper,
            );
            #[cfg(feature = "trace-events")]
            if decision.path_mode != fallback_path_mode {
                debug!(
                    from = ?fallback_path_mode,
                    to = ?decision.path_mode,
                    angular_jerk,
                    "path-control downgrade at junction"
                );
            }
            decision.initial_velocity
        };

        let mut region = match planner::solve_regions(
            length,
            initial_velocity,
            requested_target_velocity,
            self.config.max_linear_jerk,
            self.config.min_line_length,
            self.config.rounding_error,
            self.config.strict_convergence,
            MotionConfig::<AXES>::MAX_CONVERGENCE_ITERATIONS,
        ) {
            Ok(r) => r,
            Err(status) => {
                #[cfg(feature = "trace-events")]
                debug!(?status, length, "region planner failed to converge");
                return status;
            }
        };

        // spec.md §4.2: an arc predecessor skips the junction downgrade table
        // entirely and proceeds straight to the region solve, queueing only
        // body and tail (no head). Fold whatever head the region solve
        // produced back into body so the total length is still conserved.
        if prev_is_arc && region.head_length > 0.0 {
            #[cfg(feature = "trace-events")]
            debug!(
                head_length = region.head_length,
                "folding head into body after an arc predecessor"
            );
            region.body_length += region.head_length;
            region.head_length = 0.0;
        }

        if prev_state == BufferState::Queued && !prev_is_arc {
            self.rewrite_previous_tail(prev_idx, prev_length, prev_unit_vec, previous_velocity, region.initial_velocity);
        }

        self.queue_regions(target, unit_vec, region)
    }

    /// Reserves and queues the non-empty regions of `region`, in
    /// head -> body -> tail order, advancing `planner.position` after each
    /// one.
    fn queue_regions(&mut self, target: [f64; AXES], unit_vec: [f64; AXES], region: RegionPlan) -> Status {
        let specs = [
            (region.head_length, MoveType::Accel, region.initial_velocity, region.target_velocity),
            (region.body_length, MoveType::Cruise, region.target_velocity, region.target_velocity),
            (region.tail_length, MoveType::Decel, region.target_velocity, region.final_velocity),
        ];

        let mut queued_any = false;
        for (len, move_type, v_start, v_end) in specs {
            if len < self.config.min_line_length {
                continue;
            }
            let idx = match self.pool.get_write_buffer() {
                Some(idx) => idx,
                None => {
                    #[cfg(feature = "trace-events")]
                    warn!(?move_type, "queue_regions: get_write_buffer failed after test_write preflight");
                    return Status::BufferFullFatal;
                }
            };
            let new_position = geom::add(&self.planner.position, &geom::scale(&unit_vec, len));
            {
                let buf = self.pool.buffer_mut(idx);
                buf.unit_vec = unit_vec;
                buf.length = len;
                buf.starting_velocity = v_start;
                buf.ending_velocity = v_end;
                buf.target = new_position;
                let mean_velocity = (v_start + v_end) / 2.0;
                buf.time = if mean_velocity > 0.0 { len / mean_velocity } else { 0.0 };
            }
            self.pool.queue_write_buffer(move_type);
            self.planner.position = new_position;
            queued_any = true;
        }

        if queued_any {
            self.planner.unit_vec = unit_vec;
        } else {
            // Length conservation collapsed every region below the floor;
            // still land exactly on target so a follow-on aline measures
            // distance from the right place.
            self.planner.position = target;
        }
        Status::Ok
    }

    /// Shrinks the previous move's already-queued tail so it now decelerates
    /// into this move's initial velocity instead of all the way to zero,
    /// inserting a fresh short decel to make up the difference. Only called
    /// when the previous buffer is `Queued` (not `Running`) and not an arc.
    fn rewrite_previous_tail(
        &mut self,
        prev_idx: usize,
        prev_length: f64,
        prev_unit_vec: [f64; AXES],
        v_prev: f64,
        v_initial: f64,
    ) {
        if v_initial.abs() <= self.config.rounding_error {
            return;
        }
        if (v_initial - v_prev).abs() <= self.config.rounding_error {
            let buf = self.pool.buffer_mut(prev_idx);
            buf.move_type = MoveType::Cruise;
            buf.starting_velocity = v_prev;
            buf.ending_velocity = v_prev;
            return;
        }

        // v_initial is always within [0, v_prev] here (the junction
        // decision table never produces an initial velocity outside that
        // range), so `shrink` never exceeds `prev_length`: region_length is
        // monotone in the velocity gap, and |v_prev - v_initial| <= |v_prev
        // - 0|.
        let shrink = planner::region_length(v_prev, v_initial, self.config.max_linear_jerk);
        if shrink < self.config.min_line_length {
            return;
        }

        let cruise_length = prev_length - shrink;
        let old_target;
        {
            let buf = self.pool.buffer_mut(prev_idx);
            old_target = buf.target;
            let new_mid = geom::sub(&old_target, &geom::scale(&prev_unit_vec, shrink));
            buf.move_type = MoveType::Cruise;
            buf.length = cruise_length;
            buf.target = new_mid;
            buf.ending_velocity = v_prev;
        }

        // This was already accounted for in `aline`'s test_write(4)
        // preflight; failure here would be an invariant violation.
        if let Some(new_idx) = self.pool.get_write_buffer() {
            let buf = self.pool.buffer_mut(new_idx);
            buf.unit_vec = prev_unit_vec;
            buf.length = shrink;
            buf.target = old_target;
            buf.starting_velocity = v_prev;
            buf.ending_velocity = v_initial;
            let mean_velocity = (v_prev + v_initial) / 2.0;
            buf.time = if mean_velocity > 0.0 { shrink / mean_velocity } else { 0.0 };
            self.pool.queue_write_buffer(MoveType::Decel);
        }
    }

    /// Queues a helical or planar arc as a single buffer, bypassing the
    /// junction/region planner entirely: an arc is dispatched straight to
    /// the arc runtime.
    ///
    /// `offset` is accepted for interface fidelity but not independently
    /// used: the canonical-machine layer upstream is assumed to have
    /// already resolved it into `theta`/`radius`, which is all the arc
    /// runtime needs to derive the centre.
    #[allow(clippy::too_many_arguments)]
    pub fn arc(
        &mut self,
        target: [f64; AXES],
        offset: [f64; 3],
        theta: f64,
        radius: f64,
        angular_travel: f64,
        linear_travel: f64,
        axis_1: usize,
        axis_2: usize,
        axis_linear: usize,
        minutes: f64,
    ) -> Status {
        let _ = offset;
        if !self.pool.test_write(1) {
            #[cfg(feature = "trace-events")]
            warn!("arc: buffer pool full, refusing to queue");
            return Status::BufferFullFatal;
        }
        let planar_length = crate::mathx::abs(angular_travel) * radius;
        let length = sqrt(planar_length * planar_length + linear_travel * linear_travel);
        if length < self.config.min_line_length {
            return Status::ZeroLengthMove;
        }

        let idx = match self.pool.get_write_buffer() {
            Some(idx) => idx,
            None => {
                #[cfg(feature = "trace-events")]
                warn!("arc: get_write_buffer failed after a successful test_write");
                return Status::BufferFullFatal;
            }
        };
        let delta = geom::sub(&target, &self.planner.position);
        let unit_vec = geom::normalize(&delta, geom::length(&delta));
        let velocity = length / minutes;
        {
            let buf = self.pool.buffer_mut(idx);
            buf.target = target;
            buf.unit_vec = unit_vec;
            buf.length = length;
            buf.time = minutes;
            buf.starting_velocity = velocity;
            buf.ending_velocity = velocity;
            buf.theta = theta;
            buf.radius = radius;
            buf.angular_travel = angular_travel;
            buf.linear_travel = linear_travel;
            buf.axis_1 = axis_1;
            buf.axis_2 = axis_2;
            buf.axis_linear = axis_linear;
        }
        self.pool.queue_write_buffer(MoveType::Arc);
        self.planner.position = target;
        self.planner.unit_vec = unit_vec;
        Status::Ok
    }

    /// Queues a timed, non-motion hold.
    pub fn dwell(&mut self, seconds: f64) -> Status {
        if !self.pool.test_write(1) {
            #[cfg(feature = "trace-events")]
            warn!("dwell: buffer pool full, refusing to queue");
            return Status::BufferFullFatal;
        }
        let idx = match self.pool.get_write_buffer() {
            Some(idx) => idx,
            None => {
                #[cfg(feature = "trace-events")]
                warn!("dwell: get_write_buffer failed after a successful test_write");
                return Status::BufferFullFatal;
            }
        };
        self.pool.buffer_mut(idx).time = seconds;
        self.pool.queue_write_buffer(MoveType::Dwell);
        Status::Ok
    }

    pub fn queued_stop(&mut self) -> Status {
        self.queue_stop_family(MoveType::Stop)
    }

    pub fn queued_start(&mut self) -> Status {
        self.queue_stop_family(MoveType::Start)
    }

    pub fn queued_end(&mut self) -> Status {
        self.queue_stop_family(MoveType::End)
    }

    fn queue_stop_family(&mut self, move_type: MoveType) -> Status {
        if !self.pool.test_write(1) {
            #[cfg(feature = "trace-events")]
            warn!(?move_type, "queue_stop_family: buffer pool full, refusing to queue");
            return Status::BufferFullFatal;
        }
        if self.pool.get_write_buffer().is_none() {
            #[cfg(feature = "trace-events")]
            warn!(?move_type, "queue_stop_family: get_write_buffer failed after a successful test_write");
            return Status::BufferFullFatal;
        }
        self.pool.queue_write_buffer(move_type);
        Status::Ok
    }

    /// Immediate, out-of-queue control. Bypasses the buffer pool entirely.
    pub fn async_stop(&mut self) -> Status {
        self.motor_queue.stop();
        Status::Ok
    }

    pub fn async_start(&mut self) -> Status {
        self.motor_queue.start();
        Status::Ok
    }

    /// The side-channel kill path: halts the downstream immediately and
    /// tears down the currently running record without a graceful drain.
    /// This is the only way to abandon a `Running` record outside of the
    /// ordinary drain-to-completion dispatcher loop.
    pub fn async_end(&mut self) -> Status {
        self.motor_queue.end();
        if let Some(idx) = self.pool.get_run_buffer() {
            self.pool.buffer_mut(idx).move_state = MoveState::ForceEnd;
            self.pool.end_run_buffer();
        }
        Status::Ok
    }

    /// The cooperative dispatcher tick: advances (or starts) whichever
    /// record is currently running, one segment at a time.
    pub fn dispatch(&mut self, kill: bool) -> Status {
        let idx = match self.pool.get_run_buffer() {
            Some(idx) => idx,
            None => return Status::NoOp,
        };

        if kill {
            self.pool.buffer_mut(idx).move_state = MoveState::ForceEnd;
            self.pool.end_run_buffer();
            return Status::Ok;
        }

        let move_type = self.pool.buffer(idx).move_type;
        let status = match move_type {
            MoveType::Line => runtime::run_line(self.pool.buffer(idx), &mut self.position, &self.config, &mut self.motor_queue),
            MoveType::Arc => runtime::run_arc(self.pool.buffer_mut(idx), &mut self.position, &self.config, &mut self.motor_queue),
            MoveType::Dwell => runtime::run_dwell(self.pool.buffer(idx), &mut self.motor_queue),
            MoveType::Start | MoveType::Stop | MoveType::End => runtime::run_stop_family(move_type, &mut self.motor_queue),
            MoveType::Accel | MoveType::Cruise | MoveType::Decel => {
                runtime::run_ramp(self.pool.buffer_mut(idx), &mut self.position, &self.config, &mut self.motor_queue)
            }
            MoveType::None => Status::Err,
        };

        if status == Status::Retry {
            return Status::Retry;
        }

        #[cfg(feature = "trace-events")]
        debug!(?move_type, ?status, "buffer drained by dispatcher");

        self.pool.end_run_buffer();
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AxisConfig;
    use crate::motor_queue::recording::RecordingMotorQueue;

    type TestCore = MotionCore<4, RecordingMotorQueue<4, 128>, 16>;

    fn test_config() -> MotionConfig<4> {
        MotionConfig {
            axes: [
                AxisConfig::linear(80.0, 6000.0, 12000.0),
                AxisConfig::linear(80.0, 6000.0, 12000.0),
                AxisConfig::linear(400.0, 600.0, 1200.0),
                AxisConfig::linear(100.0, 3000.0, 6000.0),
            ],
            max_linear_jerk: 5.0e7,
            mm_per_arc_segment: 0.5,
            min_segment_time: 10.0 / 60_000.0,
            angular_jerk_lower: 0.15,
            angular_jerk_upper: 0.6,
            min_line_length: 1.0e-6,
            rounding_error: 1.0e-6,
            max_velocity: 36000.0,
            path_control_mode: PathControlMode::Continuous,
            strict_convergence: false,
        }
    }

    // spec.md §4.2: an arc predecessor must skip the junction downgrade
    // table and queue only body and tail, never an Accel head, even when
    // the requested target velocity exceeds the arc's exit velocity.
    #[test]
    fn aline_after_arc_queues_no_accel_head() {
        let mut core: TestCore = MotionCore::new(test_config(), RecordingMotorQueue::new());
        let status = core.arc(
            [10.0, 10.0, 0.0, 0.0],
            [10.0, 0.0, 0.0],
            0.0,
            10.0,
            -core::f64::consts::FRAC_PI_2,
            0.0,
            0,
            1,
            2,
            0.5,
        );
        assert_eq!(status, Status::Ok);

        assert_eq!(core.aline([30.0, 10.0, 0.0, 0.0], 0.001), Status::Ok);

        let mut saw_head = false;
        let mut saw_body_or_tail = false;
        for i in 0..16 {
            let buf = core.pool.buffer(i);
            if buf.buffer_state == BufferState::Queued {
                match buf.move_type {
                    MoveType::Accel => saw_head = true,
                    MoveType::Cruise | MoveType::Decel => saw_body_or_tail = true,
                    _ => {}
                }
            }
        }
        assert!(!saw_head, "arc predecessor must not queue an Accel head");
        assert!(saw_body_or_tail, "the aline after an arc must still queue body and/or tail");
    }
}
