//! Determinism and correctness tests for the planner ring and trapezoid fit.

use motion::kinematics::{AxisConfig, AXES};
use motion::planner::PLANNER_BUFFER_POOL_SIZE;
use motion::trapezoid::TRAPEZOID_LENGTH_FIT_TOLERANCE;
use motion::{GCodeState, Planner};

fn axes() -> [AxisConfig; AXES] {
    let mut cfg = AxisConfig::default();
    cfg.max_velocity = 300.0;
    cfg.max_jerk = 5_000_000.0;
    [cfg; AXES]
}

/// A square 10x10mm path at F300 (§8 scenario 1): four equal-length legs,
/// every block satisfies the trapezoid fit tolerance and velocity ordering,
/// and the planner ends back at its starting position.
#[test]
fn square_path_produces_valid_trapezoids() {
    let mut planner = Planner::new();
    let axes = axes();
    let corners = [[10.0, 0.0], [10.0, 10.0], [0.0, 10.0], [0.0, 0.0]];

    for corner in corners {
        let mut target = [0.0; AXES];
        target[0] = corner[0];
        target[1] = corner[1];
        planner
            .mp_aline(target, 300.0, &axes, GCodeState::default())
            .unwrap();
    }

    assert_eq!(planner.mm.position[0], 0.0);
    assert_eq!(planner.mm.position[1], 0.0);

    for i in 0..planner.len() {
        let buf = planner.buffer_at(i);
        let t = buf.trapezoid();
        let sum = t.head_length + t.body_length + t.tail_length;
        assert!(
            (sum - buf.length).abs() <= TRAPEZOID_LENGTH_FIT_TOLERANCE * 10.0,
            "block {i}: head+body+tail={sum} length={}",
            buf.length
        );
        assert!(t.entry_velocity <= t.cruise_velocity + 1e-3);
        assert!(t.cruise_velocity + 1e-3 >= t.exit_velocity);
        assert!(t.entry_velocity >= 0.0 && t.exit_velocity >= 0.0);
    }
}

/// Submitting more blocks than the ring can hold (minus headroom) never
/// corrupts the ring; it reports an error instead.
#[test]
fn overfilling_ring_is_rejected_not_corrupted() {
    let mut planner = Planner::new();
    let axes = axes();
    let mut target = [0.0; AXES];
    let mut accepted = 0;
    let mut rejected = 0;

    for i in 1..(PLANNER_BUFFER_POOL_SIZE * 2) {
        target[0] = i as f32 * 2.0;
        match planner.mp_aline(target, 300.0, &axes, GCodeState::default()) {
            Ok(()) => accepted += 1,
            Err(_) => rejected += 1,
        }
    }

    assert!(accepted <= PLANNER_BUFFER_POOL_SIZE);
    assert!(rejected > 0);
    assert!(planner.len() <= PLANNER_BUFFER_POOL_SIZE);
}
