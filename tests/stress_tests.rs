//! Adversarial stress tests: queue exhaustion, high move-rate chains, and
//! long runs of many small segments (junction blending should not collapse
//! to a stop at every corner).

use motion_core::{
    AxisConfig, Emitted, MotionConfig, MotionCore, PathControlMode, RecordingMotorQueue, Status,
};

const JERK: f64 = 5.0e7;
const AXES: usize = 4;

fn config() -> MotionConfig<AXES> {
    MotionConfig {
        axes: [
            AxisConfig::linear(80.0, 6000.0, 12000.0),
            AxisConfig::linear(80.0, 6000.0, 12000.0),
            AxisConfig::linear(400.0, 600.0, 1200.0),
            AxisConfig::linear(100.0, 3000.0, 6000.0),
        ],
        max_linear_jerk: JERK,
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

/// A small pool so write-reservation exhaustion is reachable without
/// thousands of queued alines.
const SMALL_POOL: usize = 8;
type SmallCore = MotionCore<AXES, RecordingMotorQueue<AXES, 64>, SMALL_POOL>;

#[test]
fn queueing_past_pool_capacity_reports_buffer_full_fatal() {
    let mut c: SmallCore = MotionCore::new(config(), RecordingMotorQueue::new());

    let mut queued = 0;
    let mut saw_fatal = false;
    for i in 1..=100 {
        match c.aline([i as f64, 0.0, 0.0, 0.0], 0.1) {
            Status::Ok => queued += 1,
            Status::BufferFullFatal => {
                saw_fatal = true;
                break;
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    assert!(saw_fatal, "expected the pool to eventually refuse a write reservation");
    assert!(queued > 0);

    // Draining frees slots, so the next aline succeeds again.
    while c.dispatch(false) != Status::NoOp {}
    assert_eq!(c.aline([1000.0, 0.0, 0.0, 0.0], 0.1), Status::Ok);
}

/// Rapidly queued moves at a high target velocity must never emit a
/// zero-duration segment (an infinite step rate) and must close the
/// position gap exactly via the finalize segment.
#[test]
fn high_velocity_chain_never_emits_a_zero_duration_segment() {
    const POOL: usize = 64;
    let mut c: MotionCore<AXES, RecordingMotorQueue<AXES, 4096>, POOL> =
        MotionCore::new(config(), RecordingMotorQueue::new());

    let mut target = 0.0;
    for _ in 0..20 {
        target += 50.0;
        assert_eq!(c.aline([target, 0.0, 0.0, 0.0], 0.005), Status::Ok);
        drain_some(&mut c);
    }
    let trace = drain_all(&mut c);

    let mut steps = 0i64;
    for e in &trace {
        match e {
            Emitted::Line { delta_steps, microseconds } => {
                assert_ne!(*microseconds, 0, "segment must not be instantaneous");
                steps += delta_steps[0] as i64;
            }
            Emitted::Dwell { .. } => {}
            _ => {}
        }
    }
    let expected = (target * 80.0).round() as i64;
    assert!((steps - expected).abs() <= 1);
}

/// A polygon approximation of a circle: many short alines at a shallow
/// corner angle each. Under `Continuous` path control with a low angular
/// jerk estimate, the chain should blend through most corners rather than
/// stopping completely at each one.
#[test]
fn many_small_segments_blend_through_shallow_corners() {
    const POOL: usize = 48;
    let mut c: MotionCore<AXES, RecordingMotorQueue<AXES, 8192>, POOL> =
        MotionCore::new(config(), RecordingMotorQueue::new());

    let segments = 72; // 5 degree steps around a circle: shallow corners.
    let radius = 50.0;
    let mut full_stops = 0;

    let mut prev_peak: f64 = 0.0;
    for i in 1..=segments {
        let angle = (i as f64 / segments as f64) * 2.0 * core::f64::consts::PI;
        let target = [radius * angle.cos(), radius * angle.sin(), 0.0, 0.0];
        assert_eq!(c.aline(target, 0.05), Status::Ok);

        let trace = drain_all(&mut c);
        let mut peak = 0.0f64;
        for e in &trace {
            if let Emitted::Line { delta_steps, microseconds } = e {
                if *microseconds > 0 {
                    let speed = (delta_steps[0] as f64 / 80.0).abs() / (*microseconds as f64);
                    peak = peak.max(speed);
                }
            }
        }
        if prev_peak > 0.0 && peak < prev_peak * 0.05 {
            full_stops += 1;
        }
        prev_peak = peak;
    }

    assert!(
        full_stops < segments / 4,
        "expected junction blending to avoid full stops at shallow corners, saw {full_stops}/{segments}"
    );
}

fn drain_some<const POOL: usize>(c: &mut MotionCore<AXES, RecordingMotorQueue<AXES, 4096>, POOL>) {
    // Run a bounded number of dispatcher ticks so the queue does not back up
    // indefinitely while more moves are still being queued, mirroring how a
    // host control loop interleaves queueing and dispatch.
    for _ in 0..64 {
        match c.dispatch(false) {
            Status::NoOp | Status::Retry => break,
            _ => {}
        }
    }
}

fn drain_all<const CAP: usize, const POOL: usize>(
    c: &mut MotionCore<AXES, RecordingMotorQueue<AXES, CAP>, POOL>,
) -> Vec<Emitted<AXES>> {
    let mut trace = Vec::new();
    loop {
        match c.dispatch(false) {
            Status::NoOp => break,
            Status::Retry => continue,
            _ => {}
        }
        while let Some(e) = c.motor_queue_mut().pop_front() {
            trace.push(e);
        }
    }
    trace
}
