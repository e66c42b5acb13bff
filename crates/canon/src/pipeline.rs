//! Wires `canon` + `motion` + `mcu-drivers::stepper` into one pipeline run,
//! shared by the `run` and `batch` CLI subcommands. Not part of the `canon`
//! library crate: this is CLI-only plumbing standing in for the real-time
//! foreground/LO/HI split of §5, run straight through in one thread since
//! the CLI has no ISR levels to schedule onto.

use motion::kinematics::AXES;
use motion::planner::MoveType;
use motion::prep::{self, CorrectionState};
use motion::{Planner, SegmentRuntime};
use stepper::{DdaEngine, PreparedSegment, SegmentSlot, StepperBackend, MAX_MOTORS};
use tracing::debug;

use canon::machine::CanonicalMachine;

/// Nominal DDA tick rate (Hz), matching §4.A's "nominally 50 kHz on 8-bit
/// class hardware, higher on 32-bit" — the host demo uses the higher-end
/// figure since it is not actually driving a timer.
const DDA_HZ: f64 = 200_000.0;

/// A [`StepperBackend`] that logs pulses instead of toggling GPIO, standing
/// in for a real MCU target on host-side tooling. "Real" in the sense that
/// it actually implements the trait end to end, unlike `sim`'s trace-only
/// harness.
#[derive(Default)]
pub struct ConsoleBackend {
    pub step_counts: [u64; MAX_MOTORS],
}

impl StepperBackend for ConsoleBackend {
    fn set_period(&mut self, ticks: u32) {
        debug!(ticks, "dda period reloaded");
    }

    fn load_segment(&mut self, segment: &PreparedSegment) {
        debug!(active_mask = segment.active_mask, "segment loaded");
    }

    fn motor_enable(&mut self, motor: usize, enabled: bool) {
        debug!(motor, enabled, "motor power");
    }

    fn motor_direction(&mut self, motor: usize, forward: bool) {
        debug!(motor, forward, "motor direction latched");
    }

    fn step_pulse(&mut self, motor: usize) {
        self.step_counts[motor] += 1;
    }
}

/// Drains every queued planner buffer through the segment runtime and
/// segment prep, driving a [`DdaEngine`] against `backend`. Queued
/// non-motion commands apply through [`CanonicalMachine::apply_queued_command`]
/// (the demo CLI has no tool-change/coolant hardware to drive, so there's
/// nothing further to actuate); `aline` buffers are fully run.
pub fn run_to_completion(
    cm: &mut CanonicalMachine,
    planner: &mut Planner,
    steps_per_unit: &[f64; AXES],
    backend: &mut ConsoleBackend,
) {
    let mut runtime = SegmentRuntime::new();
    let mut corrections = CorrectionState::new();
    let following_error = [0.0f64; MAX_MOTORS];
    let slot = SegmentSlot::new();
    let mut dda: DdaEngine<{ AXES }> = DdaEngine::new();

    while planner.len() > 0 {
        let Some(buf) = planner.run_next() else {
            break;
        };

        match buf.move_type {
            MoveType::Command => {
                if let Some(cmd) = buf.command {
                    let request_report = cm.apply_queued_command(cmd);
                    debug!(?cmd, request_report, "queued command applied");
                }
            }
            MoveType::Aline => {
                let trapezoid = buf.trapezoid();
                let unit_vector = buf.unit_vector;
                let jerk = buf.jerk;
                let gcode_state = buf.gcode_state;
                let start_position = cm.gmx.machine_position;

                runtime.load_block(&trapezoid, unit_vector, start_position, jerk, gcode_state);

                while let Some(seg) = runtime.next_segment() {
                    let prepared = prep::prepare_segment(
                        &seg,
                        steps_per_unit,
                        &following_error,
                        &mut corrections,
                        DDA_HZ,
                    );
                    if !slot.publish(prepared) {
                        // Demo pipeline runs single-threaded; the slot is
                        // always free by construction.
                        continue;
                    }
                    let ticks = prepared
                        .motors
                        .iter()
                        .map(|m| m.ticks)
                        .max()
                        .unwrap_or(0);
                    for _ in 0..ticks.max(1) {
                        dda.on_tick(&slot, backend);
                    }
                }

                cm.gmx.machine_position = runtime.position();
            }
            MoveType::Dwell | MoveType::Null => {}
        }

        planner.free_running();
    }
}
