//! # End-to-End Motion Integration Test
//!
//! Verifies the complete motion pipeline end to end: a planned move passes
//! through the planner ring, the segment runtime's trapezoid slicing, prep's
//! substep conversion, and finally the DDA engine, and the accumulated step
//! counts land on the expected final motor position.

use motion::kinematics::{AxisConfig, AXES};
use motion::prep::{prepare_segment, CorrectionState};
use motion::runtime::SegmentRuntime;
use motion::{GCodeState, Planner};
use stepper::{DdaEngine, PreparedSegment, SegmentSlot, StepperBackend, MAX_MOTORS};

#[derive(Default)]
struct MockBackend {
    steps: [i64; MAX_MOTORS],
    directions: [bool; MAX_MOTORS],
}

impl StepperBackend for MockBackend {
    fn set_period(&mut self, _ticks: u32) {}
    fn load_segment(&mut self, _segment: &PreparedSegment) {}
    fn motor_enable(&mut self, _motor: usize, _enabled: bool) {}
    fn motor_direction(&mut self, motor: usize, forward: bool) {
        self.directions[motor] = forward;
    }
    fn step_pulse(&mut self, motor: usize) {
        if self.directions[motor] {
            self.steps[motor] += 1;
        } else {
            self.steps[motor] -= 1;
        }
    }
}

fn run_segment(
    engine: &mut DdaEngine<MAX_MOTORS>,
    slot: &SegmentSlot,
    backend: &mut MockBackend,
    prepared: PreparedSegment,
) {
    let max_ticks = prepared.motors.iter().map(|m| m.ticks).max().unwrap_or(1).max(1);
    assert!(slot.publish(prepared), "slot must be free between segments");
    // Forces the engine to observe the newly published segment immediately.
    engine.on_tick(slot, backend);
    for _ in 0..max_ticks {
        engine.on_tick(slot, backend);
    }
}

#[test]
fn test_full_move_pipeline() {
    let mut axes_cfg = AxisConfig::default();
    axes_cfg.max_velocity = 300.0;
    axes_cfg.max_jerk = 5_000_000.0;
    let axes = [axes_cfg; AXES];

    let mut planner = Planner::new();
    let mut target = [0.0f32; AXES];
    target[0] = 10.0; // 10mm forward on X
    target[1] = -5.0; // 5mm backward on Y
    planner
        .mp_aline(target, 300.0, &axes, GCodeState::default())
        .unwrap();

    let buf = *planner.run_next().expect("one buffer queued");
    let trapezoid = buf.trapezoid();

    let mut mr = SegmentRuntime::new();
    mr.load_block(&trapezoid, buf.unit_vector, [0.0; AXES], buf.jerk, buf.gcode_state);

    let steps_per_unit = [80.0f64; AXES];
    let following_error = [0.0f64; MAX_MOTORS];
    let mut corrections = CorrectionState::new();
    let dda_hz = 200_000.0;

    let slot = SegmentSlot::new();
    let mut engine: DdaEngine<MAX_MOTORS> = DdaEngine::new();
    let mut backend = MockBackend::default();

    while let Some(seg) = mr.next_segment() {
        let prepared = prepare_segment(&seg, &steps_per_unit, &following_error, &mut corrections, dda_hz);
        run_segment(&mut engine, &slot, &mut backend, prepared);
    }

    // X moved +10mm at 80 steps/mm = 800 steps forward.
    assert!(
        (backend.steps[0] - 800).abs() <= 4,
        "expected ~800 steps on X, got {}",
        backend.steps[0]
    );
    // Y moved -5mm at 80 steps/mm = 400 steps backward.
    assert!(
        (backend.steps[1] + 400).abs() <= 4,
        "expected ~-400 steps on Y, got {}",
        backend.steps[1]
    );
}
