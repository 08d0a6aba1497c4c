//! Unit-to-step conversion, applied as the very last step before a segment
//! is converted to integer steps per axis and handed downstream.
//!
//! A canonical-machine layer upstream of this crate is responsible for any
//! coordinate-frame or tool-offset transform; by the time a position reaches
//! this crate it is already in machine linear units (millimetres) per axis,
//! one-to-one with the stepper axis table. This module only applies
//! `AxisConfig::steps_per_unit` and direction polarity.

use crate::config::AxisConfig;
use crate::mathx::round;

/// Converts a single axis position (in machine units) to an integer step
/// count, honoring `AxisConfig::reversed`.
#[inline]
pub fn to_steps(axis: &AxisConfig, position: f64) -> i64 {
    let raw = position * axis.steps_per_unit;
    let raw = if axis.reversed { -raw } else { raw };
    round(raw) as i64
}

/// Per-axis signed step delta between `from` and `to`, in machine units,
/// for every configured axis. This is the quantity the line/arc/ramp
/// runtimes hand to `MotorQueue::queue_line`.
pub fn step_delta<const AXES: usize>(
    axes: &[AxisConfig; AXES],
    from: &[f64; AXES],
    to: &[f64; AXES],
) -> [i32; AXES] {
    let mut out = [0i32; AXES];
    for i in 0..AXES {
        let from_steps = to_steps(&axes[i], from[i]);
        let to_steps_ = to_steps(&axes[i], to[i]);
        out[i] = (to_steps_ - from_steps) as i32;
    }
    out
}
