//! End-to-end scenario tests (§8) driven through [`SimMachine`], exercising
//! the full canon -> motion -> stepper pipeline the way a foreground loop
//! would: submit commands through a [`Dispatcher`], advance the machine
//! segment by segment, and assert on the observable MODEL/combined-state and
//! recorded step trace.

use canon::machine::{CombinedState, MachineState, MotionState};
use canon::errors::{CanonError, InputError};
use motion::gcode_state::FeedRateMode;
use motion::kinematics::{AxisConfig, AxisMode, AXES};
use sim::SimMachine;

fn axes_with(max_velocity: f32, max_jerk: f32) -> [AxisConfig; AXES] {
    let mut cfg = AxisConfig::default();
    cfg.max_velocity = max_velocity;
    cfg.max_feedrate = max_velocity;
    cfg.max_jerk = max_jerk;
    [cfg; AXES]
}

fn steps_per_unit() -> [f64; AXES] {
    [80.0; AXES]
}

fn target(x: Option<f32>, y: Option<f32>) -> [Option<f32>; AXES] {
    let mut t = [None; AXES];
    t[0] = x;
    t[1] = y;
    t
}

/// Scenario 1: a 10x10mm square at F300 with no soft alarm, ending with the
/// machine back at the origin.
#[test]
fn square_10x10_at_f300_returns_to_origin() {
    let axes = axes_with(2500.0, 50_000_000.0);
    let mut m = SimMachine::new(axes, steps_per_unit());

    {
        let mut d = m.dispatcher();
        d.set_feed_rate(300.0, FeedRateMode::UnitsPerMinute);
        assert_eq!(d.cm.motion_state, MotionState::Stop);

        d.straight_feed(target(Some(10.0), None)).unwrap();
        d.straight_feed(target(None, Some(10.0))).unwrap();
        d.straight_feed(target(Some(0.0), None)).unwrap();
        d.straight_feed(target(None, Some(0.0))).unwrap();
        assert_eq!(d.cm.motion_state, MotionState::Run);
    }

    m.run_to_idle(200_000);

    assert_eq!(m.cm.machine_state, MachineState::Ready);
    assert!((m.cm.gmx.machine_position[0] - 0.0).abs() < 1e-2);
    assert!((m.cm.gmx.machine_position[1] - 0.0).abs() < 1e-2);

    m.dispatcher().program_end().unwrap();
    // `program_end` only queues; its modal reset lands once the runtime
    // drains that buffer (§5 "Ordering guarantees").
    assert_ne!(m.cm.combined_state(), CombinedState::ProgramEnd);
    m.run_to_idle(10);
    assert_eq!(m.cm.motion_state, MotionState::Stop);
    assert_eq!(m.cm.combined_state(), CombinedState::ProgramEnd);
}

/// Scenario 2: a feedhold mid-move stops the machine within the jerk-limited
/// deceleration distance, short of the commanded target, then cycle-start
/// resumes and completes the move at the original endpoint.
#[test]
fn feedhold_mid_move_then_cycle_start_completes_move() {
    let axes = axes_with(1500.0, 20_000_000.0);
    let mut m = SimMachine::new(axes, steps_per_unit());

    {
        let mut d = m.dispatcher();
        d.set_feed_rate(1000.0, FeedRateMode::UnitsPerMinute);
        d.straight_feed(target(Some(100.0), None)).unwrap();
    }

    // Run a handful of segments (~20ms at ~5ms/segment) before requesting a
    // hold, so the move is genuinely in flight.
    m.run_segments(4);
    assert!(m.cm.gmx.machine_position[0] > 0.0);
    assert!(m.cm.gmx.machine_position[0] < 100.0);

    let pre_hold_target = m.cm.model.target;

    m.request_feedhold();
    m.run_to_idle(200_000);

    assert_eq!(m.cm.combined_state(), CombinedState::Hold);
    assert_eq!(m.cm.model.target, pre_hold_target, "MODEL target untouched by a hold");
    let held_position = m.cm.gmx.machine_position[0];
    assert!(
        held_position < 100.0,
        "feedhold must stop short of the commanded target, got {held_position}"
    );
    assert!(held_position > 0.0);

    m.request_cycle_start();
    m.run_to_idle(200_000);

    assert_eq!(m.cm.combined_state(), CombinedState::Ready);
    assert!((m.cm.gmx.machine_position[0] - 100.0).abs() < 1e-1);
}

/// Scenario 3: a queue flush requested once HOLD has settled clears the
/// planner ring and snaps MODEL to wherever the runtime actually stopped; a
/// subsequent move runs from that position, not the original target.
#[test]
fn queue_flush_during_hold_clears_ring_and_snaps_position() {
    let axes = axes_with(1500.0, 20_000_000.0);
    let mut m = SimMachine::new(axes, steps_per_unit());

    {
        let mut d = m.dispatcher();
        d.set_feed_rate(1000.0, FeedRateMode::UnitsPerMinute);
        d.straight_feed(target(Some(100.0), None)).unwrap();
        d.straight_feed(target(Some(200.0), None)).unwrap();
    }
    assert_eq!(m.queued_len(), 2);

    m.run_segments(4);
    m.request_feedhold();
    m.run_to_idle(200_000);
    assert_eq!(m.cm.combined_state(), CombinedState::Hold);

    let held_position = m.cm.gmx.machine_position;

    m.request_queue_flush();
    m.run_segments(1);

    assert_eq!(m.queued_len(), 0, "queue flush must clear the planner ring");
    assert_eq!(m.cm.gmx.machine_position, held_position);

    // A subsequent move runs from the held position, not the flushed targets.
    {
        let mut d = m.dispatcher();
        d.set_feed_rate(300.0, FeedRateMode::UnitsPerMinute);
        d.straight_feed(target(Some(0.0), None)).unwrap();
    }
    m.request_cycle_start();
    m.run_to_idle(200_000);
    assert!((m.cm.gmx.machine_position[0] - 0.0).abs() < 1e-1);
}

/// Scenario 4: G92 sets an origin offset so the current position reads a
/// new value; a subsequent traverse moves by the machine-coordinate delta,
/// and G92.1 cancels the offset back to machine coordinates.
#[test]
fn g92_origin_offset_then_cancel() {
    let axes = axes_with(2500.0, 50_000_000.0);
    let mut m = SimMachine::new(axes, steps_per_unit());

    // "G92 X10" with the machine currently at X=0: the origin offset that
    // makes the current position read as X=10 is machine(0) - commanded(10).
    {
        let mut d = m.dispatcher();
        d.select_coord_system(0).unwrap();
        d.set_origin_offset([-10.0, 0.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
    }
    m.run_to_idle(200_000);
    assert_eq!(m.cm.gmx.origin_offset[0], -10.0);
    assert!(m.cm.gmx.origin_offset_enable);

    {
        let mut d = m.dispatcher();
        d.straight_traverse(target(Some(0.0), None)).unwrap();
    }
    m.run_to_idle(200_000);

    // Commanded X0 (work coordinates) resolves to machine X = 0 + (-10).
    assert!((m.cm.gmx.machine_position[0] - (-10.0)).abs() < 1e-1);

    m.dispatcher().cancel_origin_offset_and_reset().unwrap();
    m.run_to_idle(200_000);
    assert!(!m.cm.gmx.origin_offset_enable);
    assert_eq!(m.cm.gmx.origin_offset, [0.0; AXES]);
}

/// Scenario 5: a radius-mode rotary axis converts a commanded linear
/// distance into degrees via `degrees = mm * 360 / (2*pi*radius)`, driving
/// only that axis.
#[test]
fn radius_mode_rotary_converts_mm_to_degrees() {
    let mut axes = axes_with(2500.0, 50_000_000.0);
    axes[3].mode = AxisMode::Radius;
    axes[3].radius = 5.0;
    let mut m = SimMachine::new(axes, steps_per_unit());

    {
        let mut d = m.dispatcher();
        d.set_feed_rate(100.0, FeedRateMode::UnitsPerMinute);
        let mut commanded = [None; AXES];
        commanded[3] = Some(31.4159);
        d.straight_feed(commanded).unwrap();
    }
    m.run_to_idle(200_000);

    assert!((m.cm.gmx.machine_position[3] - 360.0).abs() < 1e-1);
    assert_eq!(m.cm.gmx.machine_position[0], 0.0);
    assert_eq!(m.cm.gmx.machine_position[1], 0.0);
}

/// Scenario 6: a homed axis with a soft travel limit rejects a traverse past
/// it, raising ALARM with no motion and MODEL position preserved.
#[test]
fn soft_limit_trip_raises_alarm_without_motion() {
    let mut axes = axes_with(2500.0, 50_000_000.0);
    axes[0].soft_limit_min = 0.0;
    axes[0].soft_limit_max = 50.0;
    let mut m = SimMachine::new(axes, steps_per_unit());
    m.cm.homed[0] = true;

    let before = m.cm.gmx.machine_position;
    let result = m.dispatcher().straight_traverse(target(Some(60.0), None));

    assert_eq!(result, Err(CanonError::Input(InputError::SoftLimitExceeded(0))));
    assert_eq!(m.cm.machine_state, MachineState::Alarm);
    assert_eq!(m.queued_len(), 0, "rejected move must never reach the planner");
    assert_eq!(m.cm.gmx.machine_position, before);
}
