#![deny(clippy::all)]
#![deny(warnings)]

//! # Safety monitoring
//!
//! §7 "Hardware" error class: following-error exceeds bound, motor stall
//! detection, power-supply fault. This module polls those conditions and
//! raises a global emergency-stop flag the same way a thermal-runaway
//! monitor raises one on an overheating heater: only the monitored
//! quantity changes (following error / stall, not temperature), the
//! watchdog-feed and emergency-stop mechanics stay the same.
//!
//! ## Safety
//!
//! This is a life-safety critical module.
//!
//! - **Watchdog**: uses the hardware's Independent Watchdog (IWDG) to reset
//!   the MCU if the main firmware loop hangs. Must be fed periodically.
//! - **Following-error bound**: if any motor's encoder-measured following
//!   error exceeds a configured bound, the move is no longer trustworthy
//!   and the firmware must stop rather than keep stepping blind.
//! - **Motor stall**: a driver (e.g. TMC2209 `StallGuard`) reporting a stall
//!   on a motor that the DDA still has active is the same class of fault —
//!   the commanded motion and the physical motion have diverged.
//! - **Emergency stop**: a globally accessible atomic flag
//!   (`emergency_stop_active`) gives a fast, interrupt-safe way to signal
//!   shutdown. The DDA ISR polls it and calls [`stepper::DdaEngine::emergency_stop`]
//!   immediately rather than waiting for the foreground loop.

use core::sync::atomic::{AtomicBool, Ordering};
use stm32f4xx_hal::watchdog::IndependentWatchdog;

/// A specific safety-related fault, per §7's Hardware error taxonomy.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum SafetyError {
    /// A motor's following error (`encoder_steps - commanded_steps`)
    /// exceeded the configured bound.
    FollowingErrorExceeded { motor: usize, error_steps: f32 },
    /// A motor driver reported a stall while the DDA still had it active.
    MotorStall { motor: usize },
    /// The monitored supply rail fell outside its plausible range.
    PowerSupplyFault { rail_millivolts: u32 },
}

/// Per-motor following-error monitor. A following error is the gap between
/// `encoder_steps` and `commanded_steps` (§3 invariants); this tracks it
/// against a bound beyond which the move can no longer be trusted.
#[derive(Clone, Copy)]
pub struct FollowingErrorMonitor {
    /// Following error, in steps, beyond which the motor has diverged from
    /// its commanded path.
    max_error_steps: f32,
}

impl FollowingErrorMonitor {
    pub const fn new(max_error_steps: f32) -> Self {
        Self { max_error_steps }
    }

    /// Checks one motor's following error against the bound.
    pub fn check(&self, motor: usize, error_steps: f32) -> Result<(), SafetyError> {
        if error_steps.abs() > self.max_error_steps {
            return Err(SafetyError::FollowingErrorExceeded { motor, error_steps });
        }
        Ok(())
    }
}

/// The main safety supervisor for the whole MCU: aggregates the per-motor
/// following-error monitors, the independent watchdog, and the emergency
/// stop flag.
pub struct SafetyMonitor<const N: usize> {
    following_error_monitors: [FollowingErrorMonitor; N],
    watchdog: IndependentWatchdog,
    /// Global flag indicating an emergency stop has been triggered. Polled
    /// by the DDA ISR and the foreground loop to shut down hardware.
    emergency_stop_active: AtomicBool,
}

impl<const N: usize> SafetyMonitor<N> {
    /// Creates a new `SafetyMonitor`. The watchdog is unleashed immediately.
    pub fn new(
        following_error_monitors: [FollowingErrorMonitor; N],
        mut watchdog: IndependentWatchdog,
    ) -> Self {
        watchdog.start(fugit::MillisDurationU32::millis(500));
        Self {
            following_error_monitors,
            watchdog,
            emergency_stop_active: AtomicBool::new(false),
        }
    }

    /// Checks one motor's following error, triggering an emergency stop on
    /// violation.
    pub fn check_following_error(&mut self, motor: usize, error_steps: f32) {
        if let Some(monitor) = self.following_error_monitors.get(motor) {
            if let Err(e) = monitor.check(motor, error_steps) {
                self.trigger_emergency_stop(e);
            }
        }
    }

    /// Records a stall report from a motor driver for a motor the DDA
    /// still considers active.
    pub fn report_stall(&mut self, motor: usize, dda_active: bool) {
        if dda_active {
            self.trigger_emergency_stop(SafetyError::MotorStall { motor });
        }
    }

    /// Triggers a global emergency stop. Idempotent: only the first call
    /// logs its reason.
    pub fn trigger_emergency_stop(&mut self, reason: SafetyError) {
        if !self.emergency_stop_active.swap(true, Ordering::SeqCst) {
            #[cfg(feature = "defmt-logging")]
            defmt::error!("EMERGENCY STOP TRIGGERED: {:?}", defmt::Debug2Format(&reason));
            #[cfg(not(feature = "defmt-logging"))]
            let _ = reason;
        }
    }

    /// Returns `true` if an emergency stop is currently active. Polled by
    /// every task that touches hardware outputs.
    #[inline]
    pub fn is_emergency_stop_active(&self) -> bool {
        self.emergency_stop_active.load(Ordering::SeqCst)
    }

    /// Feeds the independent watchdog. Must be called periodically from a
    /// high-priority task to prevent the MCU from resetting.
    #[inline]
    pub fn feed_watchdog(&mut self) {
        self.watchdog.feed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn following_error_within_bound_is_ok() {
        let monitor = FollowingErrorMonitor::new(2.0);
        assert!(monitor.check(0, 1.0).is_ok());
    }

    #[test]
    fn following_error_beyond_bound_is_flagged() {
        let monitor = FollowingErrorMonitor::new(2.0);
        let err = monitor.check(0, 5.0).unwrap_err();
        assert_eq!(
            err,
            SafetyError::FollowingErrorExceeded {
                motor: 0,
                error_steps: 5.0
            }
        );
    }

    #[test]
    fn negative_following_error_uses_absolute_value() {
        let monitor = FollowingErrorMonitor::new(2.0);
        assert!(monitor.check(0, -5.0).is_err());
    }
}
