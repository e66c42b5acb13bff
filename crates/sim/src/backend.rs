//! A [`StepperBackend`] that records pulses and latched state into plain
//! counters instead of touching GPIO, standing in for a real MCU target so
//! the whole canon -> motion -> stepper pipeline can be exercised in one
//! process. Grounded on `canon`'s `ConsoleBackend` (the CLI's demo
//! backend), generalized to accumulate a signed step position per motor
//! (rather than only logging) so scenario tests can assert on final
//! machine position in the step domain.

use stepper::{PreparedSegment, StepperBackend, MAX_MOTORS};

/// Per-motor recorded state: cumulative signed step position, enabled
/// flag, and the last latched direction.
#[derive(Debug, Default, Clone, Copy)]
pub struct MotorTrace {
    pub steps: i64,
    pub enabled: bool,
    pub direction_forward: bool,
}

/// Virtual stepper backend used by [`crate::harness::SimMachine`]. Every
/// call the DDA engine would make to a real MCU target lands here instead.
#[derive(Debug, Default, Clone)]
pub struct RecordingBackend {
    pub motors: [MotorTrace; MAX_MOTORS],
    pub period_reloads: u64,
    pub segment_loads: u64,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Step position in native units, given `steps_per_unit` (the same
    /// table `motion::prep` used to derive substep increments).
    pub fn position(&self, steps_per_unit: &[f64]) -> Vec<f64> {
        self.motors
            .iter()
            .zip(steps_per_unit.iter())
            .map(|(m, spu)| if *spu != 0.0 { m.steps as f64 / spu } else { 0.0 })
            .collect()
    }
}

impl StepperBackend for RecordingBackend {
    fn set_period(&mut self, _ticks: u32) {
        self.period_reloads += 1;
    }

    fn load_segment(&mut self, _segment: &PreparedSegment) {
        self.segment_loads += 1;
    }

    fn motor_enable(&mut self, motor: usize, enabled: bool) {
        self.motors[motor].enabled = enabled;
    }

    fn motor_direction(&mut self, motor: usize, forward: bool) {
        self.motors[motor].direction_forward = forward;
    }

    fn step_pulse(&mut self, motor: usize) {
        if self.motors[motor].direction_forward {
            self.motors[motor].steps += 1;
        } else {
            self.motors[motor].steps -= 1;
        }
    }
}
