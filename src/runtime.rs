//! Per-type move runtimes: the line runtime (C4, `spec.md` §4.6), the arc
//! generator (C3, §4.7), the jerk-ramp runtime (C5, §4.8) and the ancillary
//! dwell/stop/start/end runtimes (§4.9).
//!
//! Every runtime here is a *continuation*: it may return [`Status::Retry`]
//! to yield before completion and is called again on the next dispatcher
//! tick, resuming from state held on the [`MoveBuffer`] itself (`spec.md`
//! §9: "cooperative continuation -> explicit state objects"). Per §5, a
//! runtime suspends only at the top of an invocation (before any mutation)
//! or between segments — never mid-segment with partial side effects. All
//! four begin by polling `MotorQueue::test_motor_buffer`; if it reports
//! full, they return `Retry` without touching any state.

use crate::buffer::{MoveBuffer, MoveState, MoveType};
use crate::config::MotionConfig;
use crate::errors::Status;
use crate::geom;
use crate::kinematics;
use crate::mathx::{ceil, cos, round, sin};
use crate::motor_queue::{MotorQueue, StopKind};

const MINUTES_TO_MICROSECONDS: f64 = 60.0e6;

fn microseconds_from_minutes(minutes: f64) -> u32 {
    let us = round(minutes * MINUTES_TO_MICROSECONDS);
    if us <= 0.0 {
        0
    } else if us >= u32::MAX as f64 {
        u32::MAX
    } else {
        us as u32
    }
}

/// C4: a simple (non-jerk-planned) line, executed as a single segment.
/// `spec.md` §4.6.
pub fn run_line<const AXES: usize, Q: MotorQueue<AXES>>(
    buf: &MoveBuffer<AXES>,
    position: &mut [f64; AXES],
    cfg: &MotionConfig<AXES>,
    queue: &mut Q,
) -> Status {
    if !queue.test_motor_buffer() {
        return Status::Retry;
    }
    let delta = kinematics::step_delta(&cfg.axes, position, &buf.target);
    let microseconds = microseconds_from_minutes(buf.time);
    queue.queue_line(delta, microseconds);
    *position = buf.target;
    Status::Ok
}

/// C3: converts a queued arc record into a finite sequence of short straight
/// segments. `spec.md` §4.7.
pub fn run_arc<const AXES: usize, Q: MotorQueue<AXES>>(
    buf: &mut MoveBuffer<AXES>,
    position: &mut [f64; AXES],
    cfg: &MotionConfig<AXES>,
    queue: &mut Q,
) -> Status {
    if !queue.test_motor_buffer() {
        return Status::Retry;
    }

    let segment_count_total = arc_segment_count(buf.length, cfg.mm_per_arc_segment);
    let delta_theta = buf.angular_travel / segment_count_total as f64;
    let delta_linear = buf.linear_travel / segment_count_total as f64;
    let segment_minutes = buf.time / segment_count_total as f64;
    let segment_us = microseconds_from_minutes(segment_minutes);

    if buf.move_state == MoveState::New {
        buf.center_1 = position[buf.axis_1] - sin(buf.theta) * buf.radius;
        buf.center_2 = position[buf.axis_2] - cos(buf.theta) * buf.radius;
        buf.theta_progress = buf.theta;
        buf.segment_count = segment_count_total;
        buf.move_state = MoveState::Running1;
    }

    buf.theta_progress += delta_theta;
    let mut next_position = *position;
    next_position[buf.axis_1] = buf.center_1 + sin(buf.theta_progress) * buf.radius;
    next_position[buf.axis_2] = buf.center_2 + cos(buf.theta_progress) * buf.radius;
    next_position[buf.axis_linear] += delta_linear;

    let delta = kinematics::step_delta(&cfg.axes, position, &next_position);
    queue.queue_line(delta, segment_us);
    *position = next_position;
    buf.segment_count -= 1;

    if buf.segment_count > 0 {
        Status::Retry
    } else {
        *position = buf.target;
        Status::Ok
    }
}

fn arc_segment_count(length: f64, mm_per_arc_segment: f64) -> u32 {
    if mm_per_arc_segment <= 0.0 || length <= 0.0 {
        return 1;
    }
    let n = ceil(length / mm_per_arc_segment);
    if n < 1.0 {
        1
    } else {
        n as u32
    }
}

/// C5: the jerk-ramp runtime. Executes `Accel`/`Decel` as a pair of
/// constant-time-step cubic-velocity halves and `Cruise` as a single
/// constant-velocity segment. `spec.md` §4.8.
pub fn run_ramp<const AXES: usize, Q: MotorQueue<AXES>>(
    buf: &mut MoveBuffer<AXES>,
    position: &mut [f64; AXES],
    cfg: &MotionConfig<AXES>,
    queue: &mut Q,
) -> Status {
    if !queue.test_motor_buffer() {
        return Status::Retry;
    }

    if buf.move_type == MoveType::Cruise {
        let microseconds = if buf.ending_velocity > 0.0 {
            microseconds_from_minutes(buf.length / buf.ending_velocity)
        } else {
            0
        };
        let delta = kinematics::step_delta(&cfg.axes, position, &buf.target);
        queue.queue_line(delta, microseconds);
        *position = buf.target;
        return Status::Ok;
    }

    let v_s = buf.starting_velocity;
    let v_e = buf.ending_velocity;
    let v_m = (v_s + v_e) / 2.0;
    if v_m <= 0.0 {
        *position = buf.target;
        return Status::Ok;
    }
    let total_time = buf.length / v_m;
    let linear_jerk_div2 = cfg.max_linear_jerk / 2.0;
    let a_m = total_time * linear_jerk_div2;

    let segments_total = round(round(total_time / cfg.min_segment_time) / 2.0);
    if !segments_total.is_finite() || segments_total < 1.0 {
        *position = buf.target;
        return Status::Ok;
    }
    let half_segments = segments_total as u32;
    let delta_t = total_time / (2.0 * half_segments as f64);
    if !delta_t.is_finite() || delta_t <= 0.0 {
        *position = buf.target;
        return Status::Ok;
    }
    let segment_us = microseconds_from_minutes(delta_t);

    if buf.move_state == MoveState::New {
        buf.segment_count = 2 * half_segments;
        buf.elapsed_time = delta_t / 2.0;
        buf.move_state = MoveState::Running1;
    }

    let accelerating = buf.move_type == MoveType::Accel;
    let in_first_half = buf.segment_count > half_segments;
    let t = buf.elapsed_time;
    let velocity = if in_first_half {
        if accelerating {
            v_s + linear_jerk_div2 * t * t
        } else {
            v_s - linear_jerk_div2 * t * t
        }
    } else if accelerating {
        v_m + t * a_m - linear_jerk_div2 * t * t
    } else {
        v_m - t * a_m + linear_jerk_div2 * t * t
    };

    let delta_pos = geom::scale(&buf.unit_vec, velocity * delta_t);
    let next_position = geom::add(position, &delta_pos);
    let delta = kinematics::step_delta(&cfg.axes, position, &next_position);
    queue.queue_line(delta, segment_us);
    *position = next_position;

    buf.elapsed_time += delta_t;
    buf.segment_count -= 1;
    if buf.segment_count == half_segments {
        // First half just finished; the second half's own clock restarts
        // at its own midpoint sample (spec.md §4.8).
        buf.elapsed_time = delta_t / 2.0;
    }

    if buf.segment_count > 0 {
        return Status::Retry;
    }

    // Finalize segment: closes any residual step-rounding gap so long aline
    // chains do not drift (spec.md §4.8, §9 "finalize segment").
    let residual = geom::length(&geom::sub(&buf.target, position));
    if residual >= cfg.min_line_length && v_e > 0.0 {
        let us = microseconds_from_minutes(residual / v_e);
        let delta = kinematics::step_delta(&cfg.axes, position, &buf.target);
        queue.queue_line(delta, us);
    }
    *position = buf.target;
    Status::Ok
}

/// Single-segment dwell: `spec.md` §4.5/§4.9.
pub fn run_dwell<const AXES: usize, Q: MotorQueue<AXES>>(
    buf: &MoveBuffer<AXES>,
    queue: &mut Q,
) -> Status {
    if !queue.test_motor_buffer() {
        return Status::Retry;
    }
    let us = round(buf.time * 1.0e6);
    let us = if us < 0.0 {
        0
    } else if us >= u32::MAX as f64 {
        u32::MAX
    } else {
        us as u32
    };
    queue.queue_dwell(us);
    Status::Ok
}

/// Single-segment program-flow transitions: `spec.md` §4.5/§4.9.
pub fn run_stop_family<const AXES: usize, Q: MotorQueue<AXES>>(
    move_type: MoveType,
    queue: &mut Q,
) -> Status {
    if !queue.test_motor_buffer() {
        return Status::Retry;
    }
    let kind = match move_type {
        MoveType::Start => StopKind::Start,
        MoveType::Stop => StopKind::Stop,
        MoveType::End => StopKind::End,
        _ => return Status::Err,
    };
    queue.queue_stops(kind);
    Status::Ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AxisConfig;
    use crate::motor_queue::recording::RecordingMotorQueue;

    fn cfg() -> MotionConfig<4> {
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
            path_control_mode: crate::config::PathControlMode::Continuous,
            strict_convergence: false,
        }
    }

    #[test]
    fn line_runtime_emits_one_segment_and_closes_position() {
        let cfg = cfg();
        let mut queue: RecordingMotorQueue<4, 8> = RecordingMotorQueue::new();
        let mut position = [0.0; 4];
        let mut buf: MoveBuffer<4> = MoveBuffer::default();
        buf.target = [10.0, 0.0, 0.0, 0.0];
        buf.time = 10.0 / 6000.0; // 10mm @ 6000 mm/min

        let status = run_line(&buf, &mut position, &cfg, &mut queue);
        assert_eq!(status, Status::Ok);
        assert_eq!(position, [10.0, 0.0, 0.0, 0.0]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn line_runtime_retries_when_downstream_full() {
        let cfg = cfg();
        let mut queue: RecordingMotorQueue<4, 8> = RecordingMotorQueue::new();
        queue.set_capacity_available(false);
        let mut position = [0.0; 4];
        let buf: MoveBuffer<4> = MoveBuffer::default();
        assert_eq!(run_line(&buf, &mut position, &cfg, &mut queue), Status::Retry);
        assert_eq!(position, [0.0; 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn ramp_runtime_drives_accel_to_completion_and_lands_on_target() {
        let cfg = cfg();
        let mut queue: RecordingMotorQueue<4, 64> = RecordingMotorQueue::new();
        let mut position = [0.0; 4];
        let mut buf: MoveBuffer<4> = MoveBuffer::default();
        buf.move_type = MoveType::Accel;
        buf.unit_vec = [1.0, 0.0, 0.0, 0.0];
        buf.length = 5.0;
        buf.starting_velocity = 0.0;
        buf.ending_velocity = 6000.0;
        buf.target = [5.0, 0.0, 0.0, 0.0];

        let mut status = run_ramp(&mut buf, &mut position, &cfg, &mut queue);
        let mut iterations = 0;
        while status == Status::Retry {
            status = run_ramp(&mut buf, &mut position, &cfg, &mut queue);
            iterations += 1;
            assert!(iterations < 10_000, "ramp runtime failed to converge to Ok");
        }
        assert_eq!(status, Status::Ok);
        assert_eq!(position, [5.0, 0.0, 0.0, 0.0]);
        assert!(queue.len() >= 2);
    }

    #[test]
    fn cruise_runtime_emits_a_single_segment() {
        let cfg = cfg();
        let mut queue: RecordingMotorQueue<4, 8> = RecordingMotorQueue::new();
        let mut position = [0.0; 4];
        let mut buf: MoveBuffer<4> = MoveBuffer::default();
        buf.move_type = MoveType::Cruise;
        buf.starting_velocity = 6000.0;
        buf.ending_velocity = 6000.0;
        buf.length = 10.0;
        buf.target = [10.0, 0.0, 0.0, 0.0];

        let status = run_ramp(&mut buf, &mut position, &cfg, &mut queue);
        assert_eq!(status, Status::Ok);
        assert_eq!(queue.len(), 1);
        assert_eq!(position, [10.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn arc_runtime_traces_a_quarter_circle_and_lands_on_target() {
        let cfg = cfg();
        let mut queue: RecordingMotorQueue<4, 256> = RecordingMotorQueue::new();
        let mut position = [0.0, 0.0, 0.0, 0.0];
        let mut buf: MoveBuffer<4> = MoveBuffer::default();
        buf.target = [10.0, 10.0, 0.0, 0.0];
        buf.theta = 0.0;
        buf.radius = 10.0;
        buf.angular_travel = -core::f64::consts::FRAC_PI_2;
        buf.linear_travel = 0.0;
        buf.axis_1 = 0;
        buf.axis_2 = 1;
        buf.axis_linear = 2;
        buf.length = core::f64::consts::PI * 10.0 / 2.0;
        buf.time = 0.5;

        let mut status = run_arc(&mut buf, &mut position, &cfg, &mut queue);
        let mut iterations = 0;
        while status == Status::Retry {
            status = run_arc(&mut buf, &mut position, &cfg, &mut queue);
            iterations += 1;
            assert!(iterations < 10_000, "arc runtime failed to converge to Ok");
        }
        assert_eq!(status, Status::Ok);
        assert!((position[0] - 10.0).abs() < 1e-6);
        assert!((position[1] - 10.0).abs() < 1e-6);
    }

    #[test]
    fn dwell_runtime_converts_seconds_to_microseconds() {
        let mut queue: RecordingMotorQueue<4, 8> = RecordingMotorQueue::new();
        let mut buf: MoveBuffer<4> = MoveBuffer::default();
        buf.time = 0.25;
        assert_eq!(run_dwell(&buf, &mut queue), Status::Ok);
        match queue.pop_front() {
            Some(crate::motor_queue::recording::Emitted::Dwell { microseconds }) => {
                assert_eq!(microseconds, 250_000);
            }
            other => panic!("unexpected emission: {other:?}"),
        }
    }
}
