#![cfg(test)]

use mcu_firmware::safety::{FollowingErrorMonitor, SafetyError};

#[test]
fn following_error_within_bound_passes() {
    let monitor = FollowingErrorMonitor::new(2.0);
    assert!(monitor.check(0, 0.5).is_ok());
}

#[test]
fn following_error_exceeding_bound_is_flagged() {
    let monitor = FollowingErrorMonitor::new(2.0);
    let result = monitor.check(3, 4.5);

    match result {
        Err(SafetyError::FollowingErrorExceeded { motor, error_steps }) => {
            assert_eq!(motor, 3);
            assert_eq!(error_steps, 4.5);
        }
        _ => panic!("expected FollowingErrorExceeded, got {:?}", result),
    }
}

#[test]
fn following_error_exactly_at_bound_passes() {
    let monitor = FollowingErrorMonitor::new(2.0);
    assert!(monitor.check(0, 2.0).is_ok());
}

#[test]
fn negative_following_error_uses_magnitude() {
    let monitor = FollowingErrorMonitor::new(2.0);
    let result = monitor.check(1, -4.0);
    assert!(matches!(
        result,
        Err(SafetyError::FollowingErrorExceeded { motor: 1, .. })
    ));
}
