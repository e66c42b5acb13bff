//! Canonical-machine entry points (§4.G).
//!
//! One struct exposing a `dispatch`-style entry point per command, split
//! between immediate setters and queued operations. The G-code tokenizer
//! itself is an excluded collaborator (§1): every method here takes typed
//! arguments already parsed by the caller, never a text line.

use motion::kinematics::AXES;
use motion::planner::QueuedCommand;
use motion::{GCodeState, Planner};

use crate::errors::{CanonError, InputError, StateError};
use crate::machine::{CanonicalMachine, CycleState, HoldState, MachineState, MotionState};

/// Binds a [`CanonicalMachine`] to the [`Planner`] it commits moves into.
/// Immediate setters touch only `cm.model`; queued operations go through
/// `planner` and take effect only once the runtime reaches them (§5
/// "Ordering guarantees").
pub struct Dispatcher<'a> {
    pub cm: &'a mut CanonicalMachine,
    pub planner: &'a mut Planner,
}

impl<'a> Dispatcher<'a> {
    pub fn new(cm: &'a mut CanonicalMachine, planner: &'a mut Planner) -> Self {
        Self { cm, planner }
    }

    fn reject_if_shutdown(&self) -> Result<(), CanonError> {
        if self.cm.machine_state == MachineState::Shutdown {
            return Err(CanonError::State(StateError::CommandNotAccepted));
        }
        Ok(())
    }

    // ---- Immediate setters: MODEL only, never touch the planner. ----

    pub fn set_units(&mut self, units: motion::gcode_state::UnitsMode) {
        self.cm.model.modal.units = units;
    }

    pub fn set_distance_mode(&mut self, mode: motion::gcode_state::DistanceMode) {
        self.cm.model.modal.distance_mode = mode;
    }

    pub fn set_plane(&mut self, plane: motion::gcode_state::Plane) {
        self.cm.model.modal.plane = plane;
    }

    pub fn set_path_control(&mut self, pc: motion::gcode_state::PathControl) {
        self.cm.model.modal.path_control = pc;
    }

    pub fn set_feed_rate(&mut self, feed_rate: f32, mode: motion::gcode_state::FeedRateMode) {
        self.cm.model.feed_rate = feed_rate;
        self.cm.model.modal.feed_rate_mode = mode;
    }

    pub fn select_tool(&mut self, tool: u8) {
        self.cm.model.tool = tool;
    }

    pub fn set_feed_override(&mut self, enable: bool, factor: f32) {
        self.cm.gmx.feed_override_enable = enable;
        self.cm.gmx.feed_override_factor = factor;
    }

    pub fn set_traverse_override(&mut self, enable: bool, factor: f32) {
        self.cm.gmx.traverse_override_enable = enable;
        self.cm.gmx.traverse_override_factor = factor;
    }

    pub fn set_spindle_override(&mut self, enable: bool, factor: f32) {
        self.cm.gmx.spindle_override_enable = enable;
        self.cm.gmx.spindle_override_factor = factor;
    }

    /// `G10 L2 Pn`: sets a coordinate system's per-axis offset. Persistence
    /// to the config store is deferred (§4.G) — this only flips
    /// `config_dirty`, a separate poll of which drains it to the store.
    pub fn set_coord_system_offset(&mut self, coord_system: usize, offsets: [f32; AXES]) {
        self.cm.offset[coord_system + 1] = offsets;
        self.cm.config_dirty = true;
    }

    // ---- Target computation (§4.G "set_model_target"). ----

    /// Computes the target vector for a motion command from the commanded
    /// values, honoring units, distance mode, coordinate offsets, and
    /// per-axis mode. XYZ are resolved first; ABC afterward, since
    /// radius-mode conversion may read updated XYZ in future extensions.
    pub fn set_model_target(&mut self, commanded: [Option<f32>; AXES]) -> [f32; AXES] {
        let mut target = self.cm.model.target;
        let units_scale = match self.cm.model.modal.units {
            motion::gcode_state::UnitsMode::Inches => 25.4,
            motion::gcode_state::UnitsMode::Millimeters => 1.0,
        };

        // XYZ loop.
        for i in 0..3 {
            let Some(raw) = commanded[i] else { continue };
            let mm = raw * units_scale;
            target[i] = match self.cm.model.modal.distance_mode {
                motion::gcode_state::DistanceMode::Absolute => {
                    mm + self.cm.work_offset(i)
                }
                motion::gcode_state::DistanceMode::Incremental => target[i] + mm,
            };
        }

        // ABC loop, run after XYZ per §4.G.
        for i in 3..AXES {
            let Some(raw) = commanded[i] else { continue };
            use motion::kinematics::AxisMode;
            match self.cm.axes[i].mode {
                AxisMode::Disabled => {}
                AxisMode::Standard | AxisMode::Inhibited | AxisMode::Radius => {
                    let degrees = self.cm.axes[i].convert_target(raw);
                    target[i] = match self.cm.model.modal.distance_mode {
                        motion::gcode_state::DistanceMode::Absolute => {
                            degrees + self.cm.work_offset(i)
                        }
                        motion::gcode_state::DistanceMode::Incremental => target[i] + degrees,
                    };
                }
            }
        }

        target
    }

    // ---- Queued operations: committed to the planner, take effect when run. ----

    /// `G0`: rapid traverse to `commanded`, at each axis's configured max
    /// velocity rather than a requested feed rate.
    pub fn straight_traverse(&mut self, commanded: [Option<f32>; AXES]) -> Result<(), CanonError> {
        self.reject_if_shutdown()?;
        let target = self.set_model_target(commanded);
        self.cm.check_soft_limits(&target).map_err(|axis| {
            // §7: soft-limit exceeded raises a soft alarm and leaves
            // previously queued motion to complete; MODEL's target is not
            // updated to the rejected value.
            self.cm.machine_state = MachineState::Alarm;
            CanonError::Input(InputError::SoftLimitExceeded(axis))
        })?;
        let traverse_vmax = self
            .cm
            .axes
            .iter()
            .map(|a| a.max_velocity)
            .fold(f32::INFINITY, f32::min);
        self.planner
            .mp_aline(target, traverse_vmax, &self.cm.axes, self.cm.model)?;
        self.cm.model.target = target;
        self.cm.motion_state = MotionState::Run;
        Ok(())
    }

    /// `G1`: linear feed to `commanded` at the modal feed rate.
    pub fn straight_feed(&mut self, commanded: [Option<f32>; AXES]) -> Result<(), CanonError> {
        self.reject_if_shutdown()?;
        if self.cm.model.feed_rate <= 0.0 {
            return Err(CanonError::Input(InputError::MissingFeedRate));
        }
        let target = self.set_model_target(commanded);
        self.cm.check_soft_limits(&target).map_err(|axis| {
            self.cm.machine_state = MachineState::Alarm;
            CanonError::Input(InputError::SoftLimitExceeded(axis))
        })?;
        self.planner
            .mp_aline(target, self.cm.model.feed_rate, &self.cm.axes, self.cm.model)?;
        self.cm.model.target = target;
        self.cm.motion_state = MotionState::Run;
        Ok(())
    }

    /// Helper shared by the queued non-motion commands: commits `cmd` to
    /// the planner so it executes in the same FIFO as moves (§5 "Ordering
    /// guarantees").
    fn queue(&mut self, cmd: QueuedCommand) -> Result<(), CanonError> {
        self.reject_if_shutdown()?;
        self.planner.queue_command(cmd, self.cm.model)?;
        Ok(())
    }

    /// `G4 Pn`: dwell for `seconds`, queued so it holds its place in the
    /// same FIFO as motion (§4.G "dwell (G4)").
    pub fn dwell(&mut self, seconds: f32) -> Result<(), CanonError> {
        self.queue(QueuedCommand::Dwell(seconds))
    }

    /// `G54`-`G59`: activate a work coordinate system, queued so it takes
    /// effect after prior moves complete.
    pub fn select_coord_system(&mut self, index: u8) -> Result<(), CanonError> {
        self.queue(QueuedCommand::SetCoordSystem(index))
    }

    /// `G92`: sets the origin offset so the current position reads as
    /// `commanded`, queued per §4.G.
    pub fn set_origin_offset(&mut self, offset: [f32; AXES]) -> Result<(), CanonError> {
        self.queue(QueuedCommand::SetOriginOffset(offset))
    }

    /// `G92.1`: cancels the origin offset and zeroes it.
    pub fn cancel_origin_offset_and_reset(&mut self) -> Result<(), CanonError> {
        self.queue(QueuedCommand::CancelOriginOffset { reset: true })
    }

    /// `G92.2`: suspends the origin offset without clearing its values.
    pub fn cancel_origin_offset(&mut self) -> Result<(), CanonError> {
        self.queue(QueuedCommand::CancelOriginOffset { reset: false })
    }

    /// `G92.3`: restores a previously suspended origin offset. The value
    /// restored is whatever `cm.gmx.origin_offset` holds at dispatch time
    /// (G92.2 suspends without clearing it), not whatever it is by the time
    /// this command drains.
    pub fn restore_origin_offset(&mut self) -> Result<(), CanonError> {
        self.queue(QueuedCommand::SetOriginOffset(self.cm.gmx.origin_offset))
    }

    /// `M6`: tool change.
    pub fn change_tool(&mut self, tool: u8) -> Result<(), CanonError> {
        self.queue(QueuedCommand::ChangeTool(tool))
    }

    /// `M7`/`M8`/`M9`: mist/flood coolant.
    pub fn set_mist_coolant(&mut self, on: bool) -> Result<(), CanonError> {
        self.queue(QueuedCommand::MistCoolant(on))
    }

    pub fn set_flood_coolant(&mut self, on: bool) -> Result<(), CanonError> {
        self.queue(QueuedCommand::FloodCoolant(on))
    }

    /// `M3`/`M4`/`M5`: spindle mode and speed.
    pub fn set_spindle(
        &mut self,
        mode: motion::gcode_state::SpindleMode,
        speed: f32,
    ) -> Result<(), CanonError> {
        self.queue(QueuedCommand::SetSpindleMode(mode, speed))
    }

    /// `M0`: program (unconditional) stop.
    pub fn program_stop(&mut self) -> Result<(), CanonError> {
        self.queue(QueuedCommand::ProgramStop)
    }

    /// `M1`: optional stop. In this core, the decision whether to honor it
    /// lives with the caller (the external "optional stop enabled" switch
    /// is outside the core's scope); this entry point always queues it.
    pub fn optional_stop(&mut self) -> Result<(), CanonError> {
        self.queue(QueuedCommand::OptionalStop)
    }

    /// `M2`/`M30`: program end. Queues a reset of origin offsets with G92.1
    /// semantics (not G92.2 — values are cleared, not merely suspended),
    /// restoring the default coordinate system/plane/distance mode/feed-rate
    /// mode, canceling motion mode (G80), stopping the spindle, and turning
    /// coolant off — all of it applied by [`CanonicalMachine::apply_queued_command`]
    /// once the runtime actually drains this buffer, never here.
    pub fn program_end(&mut self) -> Result<(), CanonError> {
        self.queue(QueuedCommand::ProgramEnd)
    }

    /// Hard alarm entry point, reachable via the hard-reset immediate
    /// control (§6) even though no M-code names it directly.
    pub fn hard_alarm(&mut self) {
        self.cm.machine_state = MachineState::Shutdown;
        self.cm.motion_state = MotionState::Stop;
    }

    // ---- Feedhold sequencing (§4.G table). ----

    /// Evaluates the three async request flags against current
    /// motion/hold state, per §4.G's table. Called once per foreground
    /// loop iteration.
    pub fn service_requests(&mut self) {
        let requests = self.cm.requests;

        if requests.feedhold {
            self.cm.requests.feedhold = false;
            if self.cm.motion_state == MotionState::Run {
                self.cm.motion_state = MotionState::Hold;
                self.cm.hold_state = HoldState::Sync;
            }
            // In HOLD (decel or settled) or STOP: cleared, no-op.
        }

        match self.cm.motion_state {
            MotionState::Run => {
                // queue-flush retained (not acted on); cycle-start cleared.
                self.cm.requests.cycle_start = false;
            }
            MotionState::Hold => {
                if self.cm.hold_state == HoldState::Hold {
                    if requests.queue_flush {
                        self.cm.requests.queue_flush = false;
                        self.flush_queue();
                    }
                    if requests.cycle_start && !self.cm.requests.queue_flush {
                        self.cm.requests.cycle_start = false;
                        self.end_hold();
                    }
                    // else: cycle-start stays pending until flush clears.
                }
                // While still decelerating (Sync/Plan/Decel/EndHold):
                // both requests stay pending (deferred).
            }
            MotionState::Stop => {
                if requests.queue_flush {
                    self.cm.requests.queue_flush = false;
                    self.flush_queue();
                }
                if requests.cycle_start {
                    self.cm.requests.cycle_start = false;
                    self.cycle_start();
                }
            }
        }
    }

    fn flush_queue(&mut self) {
        while self.planner.len() > 0 {
            self.planner.free_running();
            if self.planner.run_next().is_none() {
                break;
            }
        }
    }

    fn end_hold(&mut self) {
        self.cm.hold_state = HoldState::Off;
        self.cm.motion_state = MotionState::Run;
    }

    fn cycle_start(&mut self) {
        if self.cm.cycle_state == CycleState::Off {
            self.cm.cycle_state = CycleState::Machining;
        }
        self.cm.motion_state = MotionState::Run;
    }
}

impl CanonicalMachine {
    /// Placeholder for the coordinate system selected at config load
    /// (G54 by default); `main`/`config` wires this from [`crate::config::MachineConfig`].
    fn config_default_coord_system(&self) -> u8 {
        0
    }

    /// Applies a queued command's effects. Called only by a buffer-drain
    /// site (`canon::pipeline::run_to_completion`, `sim::SimMachine::step`)
    /// once the runtime actually reaches that buffer — never at dispatch
    /// time (§5 "Ordering guarantees"). Returns `true` if the caller should
    /// request a final status report (`ProgramEnd` only).
    pub fn apply_queued_command(&mut self, cmd: QueuedCommand) -> bool {
        match cmd {
            QueuedCommand::Dwell(_) => {}
            QueuedCommand::SetCoordSystem(index) => {
                self.model.coord_system = index;
            }
            QueuedCommand::ChangeTool(tool) => {
                self.model.tool = tool;
            }
            QueuedCommand::SetSpindleMode(mode, speed) => {
                self.model.spindle_mode = mode;
                self.model.spindle_speed = speed;
            }
            QueuedCommand::MistCoolant(on) => {
                self.model.mist_coolant = on;
            }
            QueuedCommand::FloodCoolant(on) => {
                self.model.flood_coolant = on;
            }
            QueuedCommand::SetOriginOffset(offset) => {
                self.gmx.origin_offset = offset;
                self.gmx.origin_offset_enable = true;
            }
            QueuedCommand::CancelOriginOffset { reset } => {
                if reset {
                    self.gmx.origin_offset = [0.0; AXES];
                }
                self.gmx.origin_offset_enable = false;
            }
            QueuedCommand::ProgramStop => {
                self.machine_state = MachineState::ProgramStop;
            }
            QueuedCommand::OptionalStop => {
                self.machine_state = MachineState::ProgramStop;
            }
            QueuedCommand::ProgramEnd => {
                self.gmx.origin_offset = [0.0; AXES];
                self.gmx.origin_offset_enable = false;
                self.model.coord_system = self.config_default_coord_system();
                self.model.modal.plane = motion::gcode_state::Plane::Xy;
                self.model.modal.distance_mode = motion::gcode_state::DistanceMode::Absolute;
                self.model.modal.feed_rate_mode = motion::gcode_state::FeedRateMode::UnitsPerMinute;
                self.model.modal.motion_mode = motion::gcode_state::MotionMode::Cancel;
                self.model.spindle_mode = motion::gcode_state::SpindleMode::Off;
                self.model.spindle_speed = 0.0;
                self.model.mist_coolant = false;
                self.model.flood_coolant = false;
                self.machine_state = MachineState::ProgramEnd;
                self.motion_state = MotionState::Stop;
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motion::gcode_state::{DistanceMode, UnitsMode};

    fn new_pair() -> (CanonicalMachine, Planner) {
        (CanonicalMachine::new(), Planner::new())
    }

    #[test]
    fn set_model_target_converts_inches_absolute() {
        let (mut cm, mut planner) = new_pair();
        let mut d = Dispatcher::new(&mut cm, &mut planner);
        d.set_units(UnitsMode::Inches);
        let mut commanded = [None; AXES];
        commanded[0] = Some(1.0);
        let target = d.set_model_target(commanded);
        assert!((target[0] - 25.4).abs() < 1e-3);
    }

    #[test]
    fn incremental_accumulates_on_target() {
        let (mut cm, mut planner) = new_pair();
        let mut d = Dispatcher::new(&mut cm, &mut planner);
        d.set_distance_mode(DistanceMode::Incremental);
        let mut commanded = [None; AXES];
        commanded[0] = Some(5.0);
        let first = d.set_model_target(commanded);
        d.cm.model.target = first;
        let second = d.set_model_target(commanded);
        assert!((second[0] - 10.0).abs() < 1e-3);
    }

    #[test]
    fn straight_feed_without_feed_rate_is_rejected() {
        let (mut cm, mut planner) = new_pair();
        let mut d = Dispatcher::new(&mut cm, &mut planner);
        let mut commanded = [None; AXES];
        commanded[0] = Some(10.0);
        assert_eq!(
            d.straight_feed(commanded),
            Err(CanonError::Input(InputError::MissingFeedRate))
        );
    }

    #[test]
    fn program_end_does_not_mutate_until_drained() {
        let (mut cm, mut planner) = new_pair();
        cm.model.modal.distance_mode = DistanceMode::Incremental;
        cm.gmx.origin_offset = [1.0; AXES];
        cm.gmx.origin_offset_enable = true;
        let mut d = Dispatcher::new(&mut cm, &mut planner);
        d.program_end().unwrap();

        // Queuing alone must not touch MODEL/gmx/machine_state (§5 "Ordering
        // guarantees"): effects only land once the runtime drains the buffer.
        assert_eq!(d.cm.model.modal.distance_mode, DistanceMode::Incremental);
        assert_eq!(d.cm.gmx.origin_offset, [1.0; AXES]);
        assert!(d.cm.gmx.origin_offset_enable);
        assert_ne!(d.cm.machine_state, MachineState::ProgramEnd);

        let cmd = d.planner.run_next().unwrap().command.unwrap();
        let request_report = d.cm.apply_queued_command(cmd);
        d.planner.free_running();

        assert!(request_report, "ProgramEnd must request a final status report");
        assert_eq!(d.cm.model.modal.distance_mode, DistanceMode::Absolute);
        assert_eq!(d.cm.gmx.origin_offset, [0.0; AXES]);
        assert!(!d.cm.gmx.origin_offset_enable);
        assert_eq!(d.cm.machine_state, MachineState::ProgramEnd);
    }

    #[test]
    fn cancel_origin_offset_variants_disambiguate_reset() {
        let (mut cm, mut planner) = new_pair();
        cm.gmx.origin_offset = [5.0; AXES];
        cm.gmx.origin_offset_enable = true;
        let mut d = Dispatcher::new(&mut cm, &mut planner);

        // G92.2: suspend without clearing the stored offset.
        d.cancel_origin_offset().unwrap();
        let cmd = d.planner.run_next().unwrap().command.unwrap();
        d.cm.apply_queued_command(cmd);
        d.planner.free_running();
        assert!(!d.cm.gmx.origin_offset_enable);
        assert_eq!(d.cm.gmx.origin_offset, [5.0; AXES]);

        // G92.1: cancel and zero it.
        d.cm.gmx.origin_offset_enable = true;
        d.cancel_origin_offset_and_reset().unwrap();
        let cmd = d.planner.run_next().unwrap().command.unwrap();
        d.cm.apply_queued_command(cmd);
        d.planner.free_running();
        assert!(!d.cm.gmx.origin_offset_enable);
        assert_eq!(d.cm.gmx.origin_offset, [0.0; AXES]);
    }

    #[test]
    fn feedhold_during_run_transitions_to_hold_sync() {
        let (mut cm, mut planner) = new_pair();
        cm.motion_state = MotionState::Run;
        cm.requests.feedhold = true;
        let mut d = Dispatcher::new(&mut cm, &mut planner);
        d.service_requests();
        assert_eq!(d.cm.motion_state, MotionState::Hold);
        assert_eq!(d.cm.hold_state, HoldState::Sync);
    }

    #[test]
    fn cycle_start_during_stop_is_honored_immediately() {
        let (mut cm, mut planner) = new_pair();
        cm.motion_state = MotionState::Stop;
        cm.requests.cycle_start = true;
        let mut d = Dispatcher::new(&mut cm, &mut planner);
        d.service_requests();
        assert_eq!(d.cm.motion_state, MotionState::Run);
        assert!(!d.cm.requests.cycle_start);
    }
}
