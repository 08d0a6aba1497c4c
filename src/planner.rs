//! The region planner and the junction planner: the pure math behind
//! jerk-limited velocity blending across a chain of queued moves.
//!
//! Both are pure functions over scalars and small fixed-size vectors: no
//! buffer-pool access happens here. `MotionCore::aline` (in [`crate::core`])
//! is the orchestrator that calls into this module and then mutates the
//! buffer pool with the results — keeping the jerk-limited math testable in
//! isolation from the queue's write-reservation discipline.

use crate::config::PathControlMode;
use crate::errors::Status;
use crate::geom;
use crate::mathx::{abs, sqrt};

/// Scratch state threaded through a single `aline` planning pass. Held as a
/// plain field of `MotionCore` rather than a module-level static, so two
/// cores can run independently (e.g. in tests) without sharing state.
#[derive(Debug, Clone, Copy)]
pub struct PlannerScratch<const AXES: usize> {
    /// Planned end position of the most recently queued region. Advances as
    /// `aline` queues head/body/tail, independent of what the dispatcher has
    /// actually run.
    pub position: [f64; AXES],
    pub unit_vec: [f64; AXES],
}

impl<const AXES: usize> PlannerScratch<AXES> {
    pub const fn new() -> Self {
        Self {
            position: [0.0; AXES],
            unit_vec: [0.0; AXES],
        }
    }
}

impl<const AXES: usize> Default for PlannerScratch<AXES> {
    fn default() -> Self {
        Self::new()
    }
}

/// Closed-form length needed to move between two velocities under a
/// symmetric third-order (jerk-limited) motion profile:
/// `length(V_a, V_b) = |V_a - V_b| * sqrt(|V_a - V_b| / max_linear_jerk)`.
pub fn region_length(v_a: f64, v_b: f64, max_linear_jerk: f64) -> f64 {
    let dv = abs(v_a - v_b);
    if dv <= 0.0 {
        return 0.0;
    }
    dv * sqrt(dv / max_linear_jerk)
}

/// Outcome of the region planner: the three region lengths (some may be
/// zero), plus the target velocity the body/head/tail regions actually run
/// at (the region planner may have had to reduce it to fit `length`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionPlan {
    pub head_length: f64,
    pub body_length: f64,
    pub tail_length: f64,
    /// Starting velocity of the head region (== body/tail velocity in the
    /// 1-region outcome, where head collapses entirely).
    pub initial_velocity: f64,
    /// Cruise velocity of the body region (and the head/tail's far
    /// endpoint).
    pub target_velocity: f64,
    /// Ending velocity of the tail region. Always `0.0` here; the junction
    /// planner may later raise it by rewriting a Queued tail in place.
    pub final_velocity: f64,
}

impl RegionPlan {
    fn zero(initial_velocity: f64, target_velocity: f64) -> Self {
        Self {
            head_length: 0.0,
            body_length: 0.0,
            tail_length: 0.0,
            initial_velocity,
            target_velocity,
            final_velocity: 0.0,
        }
    }
}

/// Solves `(head, body, tail)` region lengths for a move of `length` between
/// `initial_velocity` and `target_velocity`: three regions when the move is
/// long enough to reach cruise, two when the body collapses, one when even
/// the head can't fit, via a damped fixed-point iteration on the target
/// velocity.
///
/// Returns `Status::FailedToConverge` only when `strict_convergence` is set
/// and the iteration bound is exhausted without meeting `rounding_error`;
/// otherwise the best iterate is accepted rather than looping indefinitely.
#[allow(clippy::too_many_arguments)]
pub fn solve_regions(
    length: f64,
    initial_velocity: f64,
    target_velocity: f64,
    max_linear_jerk: f64,
    min_line_length: f64,
    rounding_error: f64,
    strict_convergence: bool,
    max_iterations: u32,
) -> Result<RegionPlan, Status> {
    if length < min_line_length {
        return Ok(RegionPlan::zero(initial_velocity, target_velocity));
    }

    let v_i = initial_velocity;
    let mut v_t = target_velocity;
    let mut tail = region_length(v_t, 0.0, max_linear_jerk);
    let mut head = region_length(v_t, v_i, max_linear_jerk);
    if head < rounding_error {
        head = 0.0;
    }
    let body = length - head - tail;

    // Step 2: three-region outcome.
    if body >= 0.0 {
        return Ok(RegionPlan {
            head_length: head,
            body_length: body,
            tail_length: tail,
            initial_velocity: v_i,
            target_velocity: v_t,
            final_velocity: 0.0,
        });
    }

    if length > tail {
        // Step 3: two-region outcome (head + tail, no body).
        let mut converged = false;
        for _ in 0..max_iterations {
            let denom = head + tail;
            if denom <= 0.0 {
                break;
            }
            v_t = (v_t + v_t * length / denom) / 2.0;
            tail = region_length(v_t, 0.0, max_linear_jerk);
            head = region_length(v_t, v_i, max_linear_jerk);
            if abs(head + tail - length) <= rounding_error {
                converged = true;
                break;
            }
        }
        if !converged && strict_convergence {
            return Err(Status::FailedToConverge);
        }
        if head < min_line_length {
            // Too short to accelerate at all: fall through to the
            // one-region (tail-only) solve, restarting from the originally
            // requested target velocity rather than the partially-converged
            // two-region one.
            return solve_tail_only(
                length,
                target_velocity,
                max_linear_jerk,
                rounding_error,
                strict_convergence,
                max_iterations,
            );
        }
        return Ok(RegionPlan {
            head_length: head,
            body_length: 0.0,
            tail_length: tail,
            initial_velocity: v_i,
            target_velocity: v_t,
            final_velocity: 0.0,
        });
    }

    // Step 4: one-region (tail-only) outcome.
    solve_tail_only(
        length,
        target_velocity,
        max_linear_jerk,
        rounding_error,
        strict_convergence,
        max_iterations,
    )
}

/// The line is too short to decelerate from the desired target velocity to
/// zero, so `V_t` is reduced (iteratively) until the whole move is exactly
/// one tail of length `length`.
fn solve_tail_only(
    length: f64,
    target_velocity: f64,
    max_linear_jerk: f64,
    rounding_error: f64,
    strict_convergence: bool,
    max_iterations: u32,
) -> Result<RegionPlan, Status> {
    let mut v_t = target_velocity;
    let mut tail = region_length(v_t, 0.0, max_linear_jerk);
    let mut converged = tail <= 0.0;
    for _ in 0..max_iterations {
        if tail <= 0.0 {
            converged = true;
            break;
        }
        v_t = (v_t + v_t * length / tail) / 2.0;
        tail = region_length(v_t, 0.0, max_linear_jerk);
        if abs(tail - length) <= rounding_error {
            converged = true;
            break;
        }
    }
    if !converged && strict_convergence {
        return Err(Status::FailedToConverge);
    }
    Ok(RegionPlan {
        head_length: 0.0,
        body_length: 0.0,
        tail_length: length,
        initial_velocity: v_t,
        target_velocity: v_t,
        final_velocity: 0.0,
    })
}

/// Angular-jerk estimate at a junction between `unit_vec` (the new move) and
/// `prev_unit_vec` (the previous move), in `[0, 1]`:
/// `J = (||delta_xyz|| / 2) * min(1, previous_velocity / max_velocity)`.
///
/// Only the leading X/Y/Z components contribute: a rotary A axis never
/// affects this estimate, since a change in rotary orientation alone
/// shouldn't force a linear-axis velocity downgrade.
pub fn angular_jerk_estimate<const AXES: usize>(
    unit_vec: &[f64; AXES],
    prev_unit_vec: &[f64; AXES],
    previous_velocity: f64,
    max_velocity: f64,
) -> f64 {
    let delta = geom::sub(unit_vec, prev_unit_vec);
    let mag = geom::length_xyz(&delta);
    let velocity_factor = if max_velocity > 0.0 {
        (previous_velocity / max_velocity).min(1.0)
    } else {
        0.0
    };
    (mag / 2.0) * velocity_factor
}

/// Result of the path-control downgrade / initial-velocity selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JunctionDecision {
    /// The (possibly downgraded) path mode in effect for *this* junction
    /// only; it is never written back to the embedder's configuration.
    pub path_mode: PathControlMode,
    pub initial_velocity: f64,
}

/// Selects the initial velocity of a new move and the effective (possibly
/// downgraded) path-control mode for this junction. Downgrades cascade
/// within one call: `Continuous` falling through to `ExactPath` is
/// re-evaluated against the `ExactPath` rules in the same pass.
pub fn select_path_and_velocity(
    path_mode: PathControlMode,
    angular_jerk: f64,
    v_prev: f64,
    v_target: f64,
    angular_jerk_lower: f64,
    angular_jerk_upper: f64,
) -> JunctionDecision {
    match path_mode {
        PathControlMode::Continuous => {
            if angular_jerk > angular_jerk_lower {
                select_path_and_velocity(
                    PathControlMode::ExactPath,
                    angular_jerk,
                    v_prev,
                    v_target,
                    angular_jerk_lower,
                    angular_jerk_upper,
                )
            } else if v_target > v_prev {
                JunctionDecision {
                    path_mode: PathControlMode::Continuous,
                    initial_velocity: v_prev,
                }
            } else {
                JunctionDecision {
                    path_mode: PathControlMode::Continuous,
                    initial_velocity: v_prev.min(v_target),
                }
            }
        }
        PathControlMode::ExactPath => {
            if angular_jerk > angular_jerk_upper {
                JunctionDecision {
                    path_mode: PathControlMode::ExactStop,
                    initial_velocity: 0.0,
                }
            } else {
                JunctionDecision {
                    path_mode: PathControlMode::ExactPath,
                    initial_velocity: v_prev * (1.0 - angular_jerk),
                }
            }
        }
        PathControlMode::ExactStop => JunctionDecision {
            path_mode: PathControlMode::ExactStop,
            initial_velocity: 0.0,
        },
    }
}
