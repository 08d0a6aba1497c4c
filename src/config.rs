//! The read-only configuration surface consumed by the motion core.
//!
//! Everything here is populated once, by the embedder, before motion starts
//! and is never mutated by the planner or runtime.

#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

/// Strategy for blending velocity across a junction between two queued
/// `aline` moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum PathControlMode {
    /// Blend through junctions at the highest velocity the angular-jerk
    /// estimate allows.
    Continuous,
    /// Downgrade of `Continuous`: still blends, but at a velocity reduced by
    /// the estimated angular jerk.
    ExactPath,
    /// Come to a complete stop at the junction.
    ExactStop,
}

/// Per-axis static configuration.
///
/// `radius` is only meaningful for a rotary axis with a linear equivalent
/// (e.g. a rotary A axis expressed in degrees but consumed as an arc length);
/// it is `None` for purely linear axes.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct AxisConfig {
    pub steps_per_unit: f64,
    pub max_feed_rate: f64,
    pub max_seek_rate: f64,
    /// `true` if a positive unit delta should reverse the stepper direction.
    pub reversed: bool,
    pub radius: Option<f64>,
}

impl AxisConfig {
    pub const fn linear(steps_per_unit: f64, max_feed_rate: f64, max_seek_rate: f64) -> Self {
        Self {
            steps_per_unit,
            max_feed_rate,
            max_seek_rate,
            reversed: false,
            radius: None,
        }
    }
}

/// Global motion configuration: jerk limits, arc segmentation, timing floors
/// and the per-axis table. Generic over `AXES` so the same type serves a
/// 4-axis Cartesian controller (the default) or any other fixed axis count.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct MotionConfig<const AXES: usize> {
    pub axes: [AxisConfig; AXES],

    /// Jerk bound (third derivative of position) applied to every `aline`
    /// head/tail region, in units/min³.
    pub max_linear_jerk: f64,
    /// Target chord length for arc segmentation, in units.
    pub mm_per_arc_segment: f64,
    /// Segment time floor handed to the jerk-ramp runtime, in seconds.
    pub min_segment_time: f64,
    /// Below this angular-jerk estimate, `Continuous` is not downgraded.
    pub angular_jerk_lower: f64,
    /// Above this angular-jerk estimate, `ExactPath` downgrades to
    /// `ExactStop`.
    pub angular_jerk_upper: f64,
    /// Length epsilon below which a move is treated as zero-length.
    pub min_line_length: f64,
    /// Float comparison epsilon used for unit-vector and velocity checks.
    pub rounding_error: f64,
    /// Ceiling on any velocity used by the angular-jerk estimate's
    /// normalization, in units/min.
    pub max_velocity: f64,
    /// Path-control mode currently selected by the embedder (canonical
    /// machine layer); read by the junction planner on every `aline`.
    pub path_control_mode: PathControlMode,
    /// `true` selects the strict (`__UNFORGIVING`-equivalent) region-planner
    /// convergence policy: iteration-bound exhaustion returns
    /// `Status::FailedToConverge`. `false` accepts the best iterate.
    pub strict_convergence: bool,
}

impl<const AXES: usize> MotionConfig<AXES> {
    /// Maximum number of write-reservations a single `aline` call may need:
    /// the previous move's rewritten tail plus this move's head, body, tail.
    pub const MAX_BUFFERS_NEEDED: usize = 4;

    /// Bound on the region planner's damped fixed-point iteration.
    pub const MAX_CONVERGENCE_ITERATIONS: u32 = 20;
}

#[cfg(test)]
mod tests {
    use super::*;

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
            min_segment_time: 10.0 / 60_000.0, // 10ms expressed in minutes
            angular_jerk_lower: 0.15,
            angular_jerk_upper: 0.6,
            min_line_length: 1.0e-6,
            rounding_error: 1.0e-6,
            max_velocity: 36000.0,
            path_control_mode: PathControlMode::Continuous,
            strict_convergence: false,
        }
    }

    #[test]
    fn max_buffers_needed_covers_rewrite_plus_three_regions() {
        assert_eq!(MotionConfig::<4>::MAX_BUFFERS_NEEDED, 4);
    }

    #[test]
    fn config_is_constructible_for_four_axes() {
        let c = cfg();
        assert_eq!(c.axes.len(), 4);
    }
}
