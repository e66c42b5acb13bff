//! In-process simulation harness (§5, §8).
//!
//! Generalized from `canon::pipeline::run_to_completion` (the CLI's
//! straight-through demo pipeline) into a harness that steps one DDA-ready
//! segment at a time rather than draining a block in one call, so a test
//! can inject feedhold/queue-flush/cycle-start requests mid-move the way
//! the single-byte immediate controls (§6) interrupt a running cycle.
//! There is no separate MCU process to simulate over a socket here — canon,
//! motion and the stepper DDA all run in one address space.

use canon::machine::{CombinedState, HoldState as CmHoldState, MachineState};
use canon::{CanonicalMachine, Dispatcher};
use motion::kinematics::{AxisConfig, AXES};
use motion::planner::MoveType;
use motion::prep::{self, CorrectionState};
use motion::{Planner, SegmentRuntime};
use stepper::{DdaEngine, SegmentSlot, StepperBackend, MAX_MOTORS};
use tracing::debug;

use crate::backend::RecordingBackend;

/// Nominal DDA tick rate (Hz); matches §4.A's "nominally 50 kHz on 8-bit
/// class hardware, higher on 32-bit" at the higher end since the harness
/// doesn't drive a real timer.
pub const DDA_HZ: f64 = 200_000.0;

/// One segment's worth of observable harness state, recorded every call to
/// [`SimMachine::step`] that actually emits motion. Not a wire report (§4.H
/// reports are an excluded serializer's job); this is purely a test/trace
/// aid.
#[derive(Debug, Clone, Copy)]
pub struct TraceEntry {
    pub segment_index: u64,
    pub position: [f32; AXES],
    pub velocity: f32,
    pub combined_state: CombinedState,
}

/// Drives `canon` + `motion` + `mcu-drivers::stepper` against a
/// [`RecordingBackend`] one segment at a time. Owns every layer of the
/// pipeline a real foreground/LO/HI split would keep in separate priority
/// contexts (§5); here they're called back to back from one `step()`,
/// which is the harness's stand-in for one foreground-loop iteration plus
/// whatever LO/HI work that iteration's state implies.
pub struct SimMachine {
    pub cm: CanonicalMachine,
    pub planner: Planner,
    runtime: SegmentRuntime,
    corrections: CorrectionState,
    slot: SegmentSlot,
    dda: DdaEngine<{ AXES }>,
    pub backend: RecordingBackend,
    steps_per_unit: [f64; AXES],
    following_error: [f64; MAX_MOTORS],
    block_loaded: bool,
    segment_counter: u64,
    pub trace: Vec<TraceEntry>,
}

impl SimMachine {
    pub fn new(axes: [AxisConfig; AXES], steps_per_unit: [f64; AXES]) -> Self {
        let mut cm = CanonicalMachine::new();
        cm.axes = axes;
        cm.machine_state = MachineState::Ready;
        Self {
            cm,
            planner: Planner::new(),
            runtime: SegmentRuntime::new(),
            corrections: CorrectionState::new(),
            slot: SegmentSlot::new(),
            dda: DdaEngine::new(),
            backend: RecordingBackend::new(),
            steps_per_unit,
            following_error: [0.0; MAX_MOTORS],
            block_loaded: false,
            segment_counter: 0,
            trace: Vec::new(),
        }
    }

    /// Borrows a [`Dispatcher`] bound to this machine's `cm`/`planner`, the
    /// same entry points a parser or test driver would call to submit
    /// G-code-equivalent commands.
    pub fn dispatcher(&mut self) -> Dispatcher<'_> {
        Dispatcher::new(&mut self.cm, &mut self.planner)
    }

    /// `!`: request feedhold (§6 single-byte immediate control).
    pub fn request_feedhold(&mut self) {
        self.cm.requests.feedhold = true;
    }

    /// `~`: request cycle start.
    pub fn request_cycle_start(&mut self) {
        self.cm.requests.cycle_start = true;
    }

    /// `%`: request queue flush.
    pub fn request_queue_flush(&mut self) {
        self.cm.requests.queue_flush = true;
    }

    pub fn queued_len(&self) -> usize {
        self.planner.len()
    }

    /// One foreground-loop iteration's worth of state-machine servicing:
    /// evaluates the three async request flags against motion/hold state
    /// (§4.G's table) via [`Dispatcher::service_requests`], then advances
    /// the runtime's feedhold sub-state machine in lockstep whenever
    /// `cm.hold_state` has moved past where the runtime has caught up,
    /// mirroring the way a real controller loop drives both each pass
    /// (§4.C, §4.G, §9 "make the producer/consumer discipline explicit").
    fn poll_foreground(&mut self) {
        let prev_hold = self.cm.hold_state;
        let flush_pending_in_hold = self.cm.requests.queue_flush && prev_hold == CmHoldState::Hold;
        self.dispatcher().service_requests();

        // `Dispatcher::service_requests` only honors a queue flush once
        // `hold_state` has settled to `Hold`; when it does, it drains the
        // planner ring directly, out from under whatever block this
        // harness had paused mid-flight. Snap MODEL to the runtime's
        // absolute position (§8 scenario 3: "MODEL position snapped to
        // runtime's absolute position") and drop the now-invalid in-flight
        // block so a later resume never touches a freed buffer.
        if flush_pending_in_hold && !self.cm.requests.queue_flush {
            debug!(position = ?self.runtime.position(), "queue flush during hold");
            self.cm.gmx.machine_position = self.runtime.position();
            self.runtime.clear_hold();
            self.block_loaded = false;
        }

        // `Dispatcher::end_hold` takes `cm.hold_state` straight from
        // `Hold` to `Off` once cycle-start is honored; the in-flight block
        // the runtime was decelerating already finished before `Hold` was
        // reached (it is freed in `step`'s `None` arm), so only the
        // remaining queued buffers need re-planning from a standstill
        // (§4.C "cycle-start resumes by replanning remaining blocks from
        // zero").
        if prev_hold == CmHoldState::Hold && self.cm.hold_state == CmHoldState::Off {
            if self.block_loaded && self.runtime.held_remainder() > 0.0 {
                self.runtime.resume_held_block();
                self.planner.resume_from_hold(self.runtime.exit_velocity());
            } else {
                self.runtime.clear_hold();
                self.planner.resume_from_hold(0.0);
            }
        }

        if !self.block_loaded {
            return;
        }
        match self.cm.hold_state {
            CmHoldState::Sync => {
                debug!("feedhold: sync -> plan");
                self.runtime.request_hold();
                self.cm.hold_state = CmHoldState::Plan;
            }
            CmHoldState::Plan => {
                self.runtime.replan_for_hold();
                debug!(held_remainder = self.runtime.held_remainder(), "feedhold: plan -> decel");
                self.cm.hold_state = CmHoldState::Decel;
            }
            _ => {}
        }
    }

    /// Emits exactly one DDA-ready segment. Loads the next queued planner
    /// buffer (running its callback immediately and moving on, for a
    /// non-motion command) if nothing is currently in flight. Returns
    /// `false` once the queue is empty and no block is in flight — the
    /// harness's stand-in for the foreground dispatcher finding nothing
    /// left to do.
    pub fn step(&mut self) -> bool {
        self.poll_foreground();

        if self.block_loaded && self.cm.hold_state == CmHoldState::Hold {
            // Settled in HOLD with a block paused mid-flight: nothing to
            // emit until cycle-start (handled by `poll_foreground` above)
            // or a queue flush resumes or discards it.
            return true;
        }

        if !self.block_loaded {
            let Some(buf) = self.planner.run_next() else {
                return false;
            };
            match buf.move_type {
                MoveType::Command => {
                    let cmd = buf.command.expect("Command buffer without a payload");
                    self.cm.apply_queued_command(cmd);
                    self.planner.free_running();
                    return true;
                }
                MoveType::Null | MoveType::Dwell => {
                    // Physical actuation (tool/coolant/spindle GPIO) is an
                    // excluded collaborator (§1). `Dwell` buffers are never
                    // actually produced by the dispatcher (no `G4` entry
                    // point in this core's scope) but are drained the same
                    // way `canon::pipeline::run_to_completion` treats them,
                    // for parity.
                    self.planner.free_running();
                    return true;
                }
                MoveType::Aline => {
                    let trapezoid = buf.trapezoid();
                    let unit_vector = buf.unit_vector;
                    let jerk = buf.jerk;
                    let gcode_state = buf.gcode_state;
                    let start_position = self.cm.gmx.machine_position;
                    self.runtime
                        .load_block(&trapezoid, unit_vector, start_position, jerk, gcode_state);
                    self.block_loaded = true;
                }
            }
        }

        let Some(seg) = self.runtime.next_segment() else {
            self.cm.gmx.machine_position = self.runtime.position();

            if self.cm.hold_state == CmHoldState::Decel {
                // The short jerk-limited stop planned by `replan_for_hold`
                // just ran out of segments. If it stopped short of the
                // block's original endpoint, keep the buffer in flight (not
                // freed) so `resume_held_block` can pick the same block back
                // up on cycle-start; only a stop that landed exactly on the
                // endpoint (no remainder) frees it like a normal completion.
                self.runtime.enter_hold();
                self.cm.hold_state = CmHoldState::Hold;
                if self.runtime.held_remainder() <= f32::EPSILON {
                    self.planner.free_running();
                    self.block_loaded = false;
                }
            } else {
                self.planner.free_running();
                self.block_loaded = false;
            }
            return true;
        };

        let prepared = prep::prepare_segment(
            &seg,
            &self.steps_per_unit,
            &self.following_error,
            &mut self.corrections,
            DDA_HZ,
        );
        self.slot.publish(prepared);
        let ticks = prepared.motors.iter().map(|m| m.ticks).max().unwrap_or(0).max(1);
        for _ in 0..ticks {
            self.dda.on_tick(&self.slot, &mut self.backend);
        }

        self.cm.gmx.machine_position = self.runtime.position();
        self.segment_counter += 1;
        self.trace.push(TraceEntry {
            segment_index: self.segment_counter,
            position: self.cm.gmx.machine_position,
            velocity: seg.velocity,
            combined_state: self.cm.combined_state(),
        });

        true
    }

    /// Steps until the queue and in-flight block both drain, or
    /// `max_segments` is hit (a deadlock guard for a stuck hold in tests).
    pub fn run_to_idle(&mut self, max_segments: u64) {
        let mut n = 0u64;
        while self.step() {
            n += 1;
            if n > max_segments {
                break;
            }
        }
    }

    /// Steps exactly `n` times (or until idle, whichever comes first).
    pub fn run_segments(&mut self, n: u64) {
        for _ in 0..n {
            if !self.step() {
                break;
            }
        }
    }
}
