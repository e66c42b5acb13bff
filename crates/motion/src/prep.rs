//! Segment prep (`mp_exec`/`st_prep`, §4.B): converts one segment-runtime
//! output (a scalar distance/time/velocity plus per-axis deltas) into the
//! integer substep increments the DDA consumes, applying encoder-based
//! following-error correction.
//!
//! The prep buffer hand-off to the loader is a single-word ownership enum;
//! this is the only synchronization between the exec (LO) side, which
//! writes it, and the loader (HI) side, which reads it — mirroring the
//! `stepper` crate's [`stepper::SegmentSlot`] publish/acquire discipline one
//! level up, in the floating-point-to-integer conversion stage rather than
//! the DDA itself.

use crate::kinematics::AXES;
use crate::runtime::SegmentOutput;
use stepper::{MotorSegment, PreparedSegment, MAX_MOTORS};

/// Fixed-point scaling applied to fractional step counts before they reach
/// the DDA, chosen so that `i32::MAX * 0.9 / (dda_hz * NOM_SEGMENT_TIME_MIN)`
/// does not overflow the accumulator over a worst-case segment, per §4.A.
pub const SUBSTEP_SCALE: f64 = 10_000.0;

/// Following-error correction never moves a motor by more than this many
/// whole steps in a single segment.
pub const STEP_CORRECTION_MAX: f64 = 2.0;
/// Corrections smaller than this (in steps) are not worth applying.
pub const STEP_CORRECTION_THRESHOLD: f64 = 0.2;
/// Minimum number of segments between two corrections on the same motor, to
/// avoid oscillating corrections chasing quantization noise.
pub const STEP_CORRECTION_HOLDOFF: u32 = 4;

/// Which side currently owns the prep buffer. The producer (exec, LO
/// priority) writes payload then sets `OwnedByLoader`; the consumer (DDA
/// load, HI priority) reads it then sets `OwnedByExec` to release the slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PrepOwner {
    OwnedByLoader,
    OwnedByExec,
}

/// One motor's inputs to segment prep: this segment's fractional step
/// target and the encoder-measured following error carried over from the
/// previous segment (`encoder_steps - commanded_steps`).
#[derive(Debug, Copy, Clone, Default)]
pub struct MotorPrepInput {
    pub travel_steps: f64,
    pub following_error: f64,
}

/// Per-motor correction holdoff counters, persisted across calls so
/// [`STEP_CORRECTION_HOLDOFF`] is enforced in segment units rather than
/// applied every call.
#[derive(Debug, Default)]
pub struct CorrectionState {
    holdoff: [u32; MAX_MOTORS],
}

impl CorrectionState {
    pub fn new() -> Self {
        Self::default()
    }

    fn correction_for(&mut self, motor: usize, following_error: f64) -> f64 {
        if self.holdoff[motor] > 0 {
            self.holdoff[motor] -= 1;
            return 0.0;
        }
        if following_error.abs() < STEP_CORRECTION_THRESHOLD {
            return 0.0;
        }
        let correction = (-following_error).clamp(-STEP_CORRECTION_MAX, STEP_CORRECTION_MAX);
        self.holdoff[motor] = STEP_CORRECTION_HOLDOFF;
        correction
    }
}

/// Converts one runtime-emitted segment plus per-motor following error into
/// a [`PreparedSegment`] the DDA can load, using `steps_per_unit` to map
/// each axis's mm/degree delta into motor steps.
///
/// `segment_time` is in minutes (matching [`crate::runtime::NOM_SEGMENT_TIME`]'s
/// units); `dda_hz` is the DDA's constant tick rate.
pub fn prepare_segment(
    seg: &SegmentOutput,
    steps_per_unit: &[f64; AXES],
    following_error: &[f64; MAX_MOTORS],
    corrections: &mut CorrectionState,
    dda_hz: f64,
) -> PreparedSegment {
    let mut prepared = PreparedSegment::default();
    let segment_seconds = (seg.segment_time as f64) * 60.0;
    let ticks = (segment_seconds * dda_hz).round().max(1.0) as u32;

    let mut active_mask = 0u8;
    let mut direction_mask = 0u8;

    for axis in 0..AXES.min(MAX_MOTORS) {
        let raw_steps = seg.axis_delta[axis] as f64 * steps_per_unit[axis];
        if raw_steps.abs() < 1e-9 {
            continue;
        }
        let correction = corrections.correction_for(axis, following_error[axis]);
        let corrected_steps = raw_steps + correction;

        active_mask |= 1 << axis;
        if corrected_steps >= 0.0 {
            direction_mask |= 1 << axis;
        }

        let substeps = (corrected_steps * SUBSTEP_SCALE / ticks as f64).round() as i64;
        let increment = substeps.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
        prepared.motors[axis] = MotorSegment {
            substep_increment: increment,
            ticks,
        };
    }

    prepared.active_mask = active_mask;
    prepared.direction_mask = direction_mask;
    prepared
}
