#![cfg(test)]

use motion::kinematics::{AxisConfig, AXES};
use motion::planner::{PLANNER_BUFFER_HEADROOM, PLANNER_BUFFER_POOL_SIZE};
use motion::prep::{prepare_segment, CorrectionState};
use motion::runtime::SegmentRuntime;
use motion::{GCodeState, Planner, PlannerError};
use stepper::MAX_MOTORS;

fn fast_axes() -> [AxisConfig; AXES] {
    let mut cfg = AxisConfig::default();
    cfg.max_velocity = 2500.0;
    cfg.max_jerk = 50_000_000.0;
    [cfg; AXES]
}

/// Submitting more moves than the ring can hold (minus headroom) must return
/// `QueueFull`, never silently drop or corrupt a buffer.
#[test]
fn test_queue_full_error() {
    let mut planner = Planner::new();
    let axes = fast_axes();
    let mut target = [0.0; AXES];
    let capacity = PLANNER_BUFFER_POOL_SIZE - PLANNER_BUFFER_HEADROOM;

    for i in 1..=100usize {
        target[0] = i as f32 * 1.0;
        let result = planner.mp_aline(target, 300.0, &axes, GCodeState::default());
        if i > capacity {
            assert_eq!(result, Err(PlannerError::QueueFull));
        } else {
            assert!(result.is_ok(), "move {i} should have been accepted");
        }
    }
}

/// A single long move at high requested feed, run through the segment
/// runtime and prep pipeline, must never emit a zero-tick interval (an
/// infinite step rate) and must reach a high step rate during cruise.
#[test]
fn test_high_step_rate_simulation() {
    let mut planner = Planner::new();
    let axes = fast_axes();
    let mut target = [0.0; AXES];
    target[0] = 200.0; // 200mm move

    planner
        .mp_aline(target, 2500.0, &axes, GCodeState::default())
        .unwrap();

    let buf = *planner.run_next().expect("one buffer queued");
    let trapezoid = buf.trapezoid();

    let mut mr = SegmentRuntime::new();
    mr.load_block(
        &trapezoid,
        buf.unit_vector,
        [0.0; AXES],
        buf.jerk,
        buf.gcode_state,
    );

    let steps_per_unit = [80.0f64; AXES];
    let following_error = [0.0f64; MAX_MOTORS];
    let mut corrections = CorrectionState::new();
    let dda_hz = 1_000_000.0;

    let mut min_ticks = u32::MAX;
    let mut max_active_substep = 0i32;

    while let Some(seg) = mr.next_segment() {
        let prepared = prepare_segment(&seg, &steps_per_unit, &following_error, &mut corrections, dda_hz);
        for motor in prepared.motors.iter() {
            if motor.ticks > 0 {
                assert_ne!(motor.ticks, 0, "segment tick count must not be zero");
                if motor.ticks < min_ticks {
                    min_ticks = motor.ticks;
                }
                if motor.substep_increment.abs() > max_active_substep {
                    max_active_substep = motor.substep_increment.abs();
                }
            }
        }
    }

    assert!(min_ticks < u32::MAX, "expected at least one active segment");
    assert!(max_active_substep > 0, "expected nonzero motor motion");
}

/// Printing a circle with many short, continuously-curving segments should
/// rarely force the planner down to a near-zero entry velocity between
/// segments; junction-deviation lookahead should keep corner speeds up.
#[test]
fn test_many_small_segments_avoid_full_stops() {
    let mut planner = Planner::new();
    let mut axes_cfg = AxisConfig::default();
    axes_cfg.max_velocity = 2000.0;
    axes_cfg.max_jerk = 10_000_000.0;
    let axes = [axes_cfg; AXES];

    let segments = 200;
    let radius = 50.0f32;

    for i in 1..=segments {
        let angle = (i as f32 / segments as f32) * 2.0 * core::f32::consts::PI;
        let mut target = [0.0f32; AXES];
        target[0] = radius * libm::cosf(angle);
        target[1] = radius * libm::sinf(angle);
        planner
            .mp_aline(target, 100.0, &axes, GCodeState::default())
            .unwrap();
    }

    let mut stops = 0;
    for i in 1..planner.len() {
        let buf = planner.buffer_at(i);
        if buf.entry_velocity < 1.0 {
            stops += 1;
        }
    }

    assert!(
        stops < segments / 10,
        "planner came to a near-stop {stops} times out of {segments} segments"
    );
}
