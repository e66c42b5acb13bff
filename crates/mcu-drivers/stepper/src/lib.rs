#![deny(clippy::all)]
#![deny(warnings)]
#![no_std]

//! # Substep-accumulator DDA stepper engine
//!
//! A classic Bresenham-style Digital Differential Analyzer, overclocked so the
//! step clock runs at a constant tick rate. Per motor it maintains a 32-bit
//! signed `substep_accumulator` and a 32-bit `substep_increment`; each DDA
//! tick subtracts the increment from the accumulator, and when the
//! accumulator crosses zero it wraps (adds back a per-motor substep modulus)
//! and emits a step pulse in the motor's latched direction.
//!
//! ## Segment-boundary discipline
//!
//! Accumulator phase is preserved across consecutive segments of the same
//! move so pulse spacing stays continuous. If a newly loaded segment's
//! increment differs from the previous one by more than
//! [`ACCUMULATOR_RESET_FACTOR`], the accumulator is reset instead, to avoid
//! an audible or mechanically damaging pulse gap.
//!
//! ## Hardware abstraction
//!
//! A single [`StepperBackend`] trait covers `set_period`, `load_segment`,
//! `motor_enable`, `motor_direction`, and `step_pulse`, so a host simulator
//! and any number of real MCU targets satisfy it without the core DDA logic
//! ever touching a register directly.
//!
//! ## Safety
//!
//! - Lock-free: the segment hand-off from LO to HI priority is the
//!   [`SegmentSlot`] single-word ownership flag, not a queue.
//! - No heap allocation: fully `#[no_std]`, fixed per-motor arrays.

use core::sync::atomic::{AtomicU8, Ordering};

/// Maximum number of independently driven motors.
pub const MAX_MOTORS: usize = 6;

/// If the new segment's substep increment differs from the previous one by
/// more than this factor, the accumulator is reset rather than carried over,
/// to avoid a discontinuous pulse gap at the segment boundary.
pub const ACCUMULATOR_RESET_FACTOR: i64 = 4;

/// One motor's prepared segment: the DDA inputs needed to run it at a
/// constant rate for its duration, as produced by segment prep (`motion::prep`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotorSegment {
    /// Signed substep increment subtracted from the accumulator each DDA tick.
    /// Sign encodes direction; magnitude encodes rate.
    pub substep_increment: i32,
    /// Number of DDA ticks this segment runs for.
    pub ticks: u32,
}

/// A fully prepared segment covering up to [`MAX_MOTORS`] motors, ready to be
/// loaded into the DDA at the next segment boundary.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreparedSegment {
    pub motors: [MotorSegment; MAX_MOTORS],
    pub active_mask: u8,
    pub direction_mask: u8,
}

/// Ownership states for the single-word segment hand-off between LO-priority
/// prep and HI-priority load, mirroring the prep buffer's
/// `OWNED_BY_LOADER`/`OWNED_BY_EXEC` discipline described in the design notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum SlotOwner {
    Loader = 0,
    Exec = 1,
}

/// Lock-free single-producer/single-consumer hand-off of one [`PreparedSegment`]
/// from the LO-priority exec/prep side to the HI-priority DDA ISR.
///
/// The owner byte is the publication fence: the producer (LO) writes the
/// segment body, then publishes by storing `Loader`; the consumer (HI) takes
/// the segment when it observes `Loader`, then stores `Exec` to release the
/// slot back.
pub struct SegmentSlot {
    segment: core::cell::UnsafeCell<PreparedSegment>,
    owner: AtomicU8,
}

// Safety: access is disciplined by the owner flag's acquire/release protocol;
// exactly one side touches `segment` at a time.
unsafe impl Sync for SegmentSlot {}

impl SegmentSlot {
    pub const fn new() -> Self {
        Self {
            segment: core::cell::UnsafeCell::new(PreparedSegment {
                motors: [MotorSegment {
                    substep_increment: 0,
                    ticks: 0,
                }; MAX_MOTORS],
                active_mask: 0,
                direction_mask: 0,
            }),
            owner: AtomicU8::new(SlotOwner::Exec as u8),
        }
    }

    /// Called from LO priority: write a freshly prepared segment and publish
    /// it to the DDA. Returns `false` if the slot was not free (HI hasn't
    /// consumed the previous one yet).
    pub fn publish(&self, segment: PreparedSegment) -> bool {
        if self.owner.load(Ordering::Acquire) != SlotOwner::Exec as u8 {
            return false;
        }
        // Safety: owner == Exec means HI is not reading; we hold sole access.
        unsafe {
            *self.segment.get() = segment;
        }
        self.owner.store(SlotOwner::Loader as u8, Ordering::Release);
        true
    }

    /// Called from HI priority: take the published segment if one is ready.
    pub fn take(&self) -> Option<PreparedSegment> {
        if self.owner.load(Ordering::Acquire) != SlotOwner::Loader as u8 {
            return None;
        }
        // Safety: owner == Loader means LO is not writing; we hold sole access.
        let segment = unsafe { *self.segment.get() };
        self.owner.store(SlotOwner::Exec as u8, Ordering::Release);
        Some(segment)
    }
}

impl Default for SegmentSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Hardware-agnostic interface the DDA engine drives. Implemented once per
/// real MCU target and once by the host simulator; core DDA logic never
/// depends on a concrete peripheral type.
pub trait StepperBackend {
    /// Programs the period timer so the next tick fires after `ticks` DDA ticks.
    fn set_period(&mut self, ticks: u32);
    /// Loads a prepared segment's per-motor increments into the backend's
    /// latched state, ahead of the segment actually starting.
    fn load_segment(&mut self, segment: &PreparedSegment);
    /// Enables or disables motor driver power for the given motor index.
    fn motor_enable(&mut self, motor: usize, enabled: bool);
    /// Latches the direction pin for the given motor. Not changed mid-segment.
    fn motor_direction(&mut self, motor: usize, forward: bool);
    /// Emits a single step pulse on the given motor's step line.
    fn step_pulse(&mut self, motor: usize);
}

/// Per-motor DDA state: the accumulator and its current increment/modulus.
#[derive(Debug, Clone, Copy, Default)]
struct MotorDda {
    substep_accumulator: i32,
    substep_increment: i32,
    /// Value added back to the accumulator on wrap; i.e. the modulus the
    /// accumulator wraps around, derived from the segment's substep scaling.
    substep_modulus: i32,
    ticks_remaining: u32,
    direction_forward: bool,
    active: bool,
}

/// The DDA engine itself: one [`MotorDda`] per motor, driven one tick at a
/// time from HI priority, consuming [`PreparedSegment`]s from a [`SegmentSlot`].
pub struct DdaEngine<const N: usize> {
    motors: [MotorDda; N],
    dda_ticks_downcount: u32,
}

impl<const N: usize> DdaEngine<N> {
    pub fn new() -> Self {
        assert!(N <= MAX_MOTORS, "DdaEngine supports at most MAX_MOTORS motors");
        Self {
            motors: [MotorDda::default(); N],
            dda_ticks_downcount: 0,
        }
    }

    /// Loads a freshly arrived segment into the per-motor DDA state,
    /// applying the segment-boundary reset discipline: if the new increment
    /// differs from the previous one by more than `ACCUMULATOR_RESET_FACTOR`,
    /// the accumulator is reset to zero instead of carried forward.
    fn load(&mut self, segment: &PreparedSegment, backend: &mut impl StepperBackend) {
        backend.load_segment(segment);
        for i in 0..N {
            let active = (segment.active_mask >> i) & 1 != 0;
            let motor = &mut self.motors[i];
            if !active {
                motor.active = false;
                continue;
            }
            let new_increment = segment.motors[i].substep_increment;
            let forward = (segment.direction_mask >> i) & 1 != 0;

            let direction_changed = motor.active && motor.direction_forward != forward;
            let magnitude_ratio_exceeded = motor.active
                && motor.substep_increment != 0
                && {
                    let prev = motor.substep_increment.unsigned_abs() as i64;
                    let next = new_increment.unsigned_abs() as i64;
                    let (hi, lo) = if prev > next { (prev, next) } else { (next, prev) };
                    lo == 0 || hi / lo.max(1) > ACCUMULATOR_RESET_FACTOR
                };

            if !motor.active || direction_changed || magnitude_ratio_exceeded {
                motor.substep_accumulator = 0;
            }

            motor.substep_increment = new_increment;
            motor.substep_modulus = new_increment.unsigned_abs() as i32;
            motor.ticks_remaining = segment.motors[i].ticks;
            motor.direction_forward = forward;
            motor.active = true;

            backend.motor_direction(i, forward);
        }
    }

    /// Advances the DDA by one tick. Intended to be called from the HI
    /// priority DDA ISR on every timer tick. When the current segment's tick
    /// budget is exhausted, loads the next prepared segment from `slot` (if
    /// any is ready) and reprograms the period timer.
    pub fn on_tick(&mut self, slot: &SegmentSlot, backend: &mut impl StepperBackend) {
        for i in 0..N {
            let motor = &mut self.motors[i];
            if !motor.active || motor.ticks_remaining == 0 {
                continue;
            }
            motor.substep_accumulator -= motor.substep_increment.abs();
            if motor.substep_accumulator <= 0 {
                motor.substep_accumulator += motor.substep_modulus.max(1);
                backend.step_pulse(i);
            }
            motor.ticks_remaining -= 1;
        }

        if self.dda_ticks_downcount > 0 {
            self.dda_ticks_downcount -= 1;
        }

        if self.dda_ticks_downcount == 0 {
            if let Some(segment) = slot.take() {
                self.load(&segment, backend);
                let period = self
                    .motors
                    .iter()
                    .filter(|m| m.active)
                    .map(|m| m.ticks_remaining)
                    .max()
                    .unwrap_or(1)
                    .max(1);
                self.dda_ticks_downcount = period;
                backend.set_period(1);
            }
        }
    }

    /// Hard-alarm stop: deasserts step lines, zeros increments and
    /// downcounts, and transitions all motors to an idle (disabled) state.
    pub fn emergency_stop(&mut self, backend: &mut impl StepperBackend) {
        for i in 0..N {
            self.motors[i] = MotorDda::default();
            backend.motor_enable(i, false);
        }
        self.dda_ticks_downcount = 0;
    }
}

impl<const N: usize> Default for DdaEngine<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockBackend {
        steps: [u32; MAX_MOTORS],
        enabled: [bool; MAX_MOTORS],
        directions: [bool; MAX_MOTORS],
        periods: heapless::Vec<u32, 16>,
    }

    impl StepperBackend for MockBackend {
        fn set_period(&mut self, ticks: u32) {
            let _ = self.periods.push(ticks);
        }
        fn load_segment(&mut self, _segment: &PreparedSegment) {}
        fn motor_enable(&mut self, motor: usize, enabled: bool) {
            self.enabled[motor] = enabled;
        }
        fn motor_direction(&mut self, motor: usize, forward: bool) {
            self.directions[motor] = forward;
        }
        fn step_pulse(&mut self, motor: usize) {
            self.steps[motor] += 1;
        }
    }

    fn segment(increment: i32, ticks: u32, forward: bool) -> PreparedSegment {
        let mut s = PreparedSegment::default();
        s.motors[0] = MotorSegment {
            substep_increment: increment,
            ticks,
        };
        s.active_mask = 1;
        s.direction_mask = if forward { 1 } else { 0 };
        s
    }

    #[test]
    fn slot_publish_take_roundtrip() {
        let slot = SegmentSlot::new();
        assert!(slot.take().is_none());
        assert!(slot.publish(segment(100, 10, true)));
        // Not free until consumed.
        assert!(!slot.publish(segment(50, 5, true)));
        let got = slot.take().unwrap();
        assert_eq!(got.motors[0].substep_increment, 100);
        assert!(slot.take().is_none());
    }

    #[test]
    fn constant_rate_produces_expected_step_count() {
        let slot = SegmentSlot::new();
        let mut engine = DdaEngine::<1>::new();
        let mut backend = MockBackend::default();

        // Increment equal to the modulus means one step roughly every tick.
        slot.publish(segment(100, 20, true));
        for _ in 0..25 {
            engine.on_tick(&slot, &mut backend);
        }
        assert!(backend.steps[0] >= 15, "expected steady steps, got {}", backend.steps[0]);
        assert!(backend.directions[0]);
    }

    #[test]
    fn emergency_stop_clears_state() {
        let slot = SegmentSlot::new();
        let mut engine = DdaEngine::<2>::new();
        let mut backend = MockBackend::default();
        slot.publish(segment(100, 20, true));
        engine.on_tick(&slot, &mut backend);
        engine.emergency_stop(&mut backend);
        assert!(!backend.enabled[0]);
        assert!(!backend.enabled[1]);
    }

    #[test]
    fn direction_change_resets_accumulator() {
        let slot = SegmentSlot::new();
        let mut engine = DdaEngine::<1>::new();
        let mut backend = MockBackend::default();
        slot.publish(segment(100, 5, true));
        for _ in 0..6 {
            engine.on_tick(&slot, &mut backend);
        }
        slot.publish(segment(100, 5, false));
        for _ in 0..6 {
            engine.on_tick(&slot, &mut backend);
        }
        assert!(!backend.directions[0]);
    }
}
