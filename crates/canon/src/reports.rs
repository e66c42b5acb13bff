//! Assembles [`proto::reports`] envelopes from canonical-machine and
//! planner state (§4.H).
//!
//! Follows the common "emit on change" status pattern: a cached last-seen
//! value is compared against the current one before publishing an update,
//! generalized here to a configurable status-report token list rather than
//! one fixed status struct.

use motion::kinematics::AXES;
use motion::{ActiveModel, GCodeState, Planner, SegmentRuntime};
use proto::reports::{
    ExceptionReport, QueueReport, RxReport, StatusCode, StatusReport, StatusReportKind,
    StatusToken, StatusValue,
};

use crate::errors::CanonError;
use crate::machine::{CanonicalMachine, MotionState};

/// The context a status-report token reads from: MODEL/PLANNER state via
/// `cm`/`planner`, plus the in-flight block's RUNTIME state when one is
/// loaded. [`Self::active_model`] picks MODEL or RUNTIME per §3: "MODEL when
/// motion is stopped, RUNTIME when running."
pub struct ReportContext<'a> {
    pub cm: &'a CanonicalMachine,
    pub planner: &'a Planner,
    pub runtime: Option<&'a SegmentRuntime>,
}

impl<'a> ReportContext<'a> {
    pub fn new(cm: &'a CanonicalMachine, planner: &'a Planner, runtime: Option<&'a SegmentRuntime>) -> Self {
        Self { cm, planner, runtime }
    }

    pub fn active_model(&self) -> ActiveModel {
        match self.cm.motion_state {
            MotionState::Run => ActiveModel::Runtime,
            MotionState::Stop | MotionState::Hold => ActiveModel::Model,
        }
    }

    /// The `GCodeState` this context should sample, per `active_model`.
    /// Falls back to MODEL if RUNTIME was selected but no block is loaded.
    pub fn gcode_state(&self) -> &GCodeState {
        match (self.active_model(), self.runtime) {
            (ActiveModel::Runtime, Some(rt)) => &rt.gcode_state,
            _ => &self.cm.model,
        }
    }

    /// The machine position this context should report, per `active_model`.
    pub fn position(&self) -> [f32; AXES] {
        match (self.active_model(), self.runtime) {
            (ActiveModel::Runtime, Some(rt)) => rt.position(),
            _ => self.cm.gmx.machine_position,
        }
    }
}

/// A single configured status-report token: a stable id plus the accessor
/// that reads it off a [`ReportContext`]. `token_id` is the same small
/// integer carried on the wire in [`StatusToken`]; interpreting it into a
/// name (`"posx"`, `"vel"`, ...) is the excluded config/serializer
/// collaborator's job (§1).
#[derive(Clone, Copy)]
pub struct TokenSpec {
    pub token_id: u16,
    pub read: fn(&ReportContext) -> StatusValue,
}

/// Well-known token ids for the handful of fields §4.H calls out by name
/// (`stat`, position, velocity); a real deployment's config collaborator
/// would define many more.
pub mod token_ids {
    pub const STAT: u16 = 0;
    pub const POS_X: u16 = 1;
    pub const POS_Y: u16 = 2;
    pub const POS_Z: u16 = 3;
    pub const VELOCITY: u16 = 4;
    pub const LINE: u16 = 5;
}

fn read_stat(ctx: &ReportContext) -> StatusValue {
    use crate::machine::CombinedState::*;
    let code = match ctx.cm.combined_state() {
        Init => 0,
        Ready => 1,
        Alarm => 2,
        Shutdown => 3,
        ProgramStop => 4,
        ProgramEnd => 5,
        Homing => 6,
        Probing => 7,
        Cycle => 8,
        Hold => 9,
    };
    StatusValue::Int(code)
}

fn read_pos_x(ctx: &ReportContext) -> StatusValue {
    StatusValue::Float(ctx.position()[0])
}

fn read_pos_y(ctx: &ReportContext) -> StatusValue {
    StatusValue::Float(ctx.position()[1])
}

fn read_pos_z(ctx: &ReportContext) -> StatusValue {
    StatusValue::Float(ctx.position()[2])
}

fn read_velocity(ctx: &ReportContext) -> StatusValue {
    let v = ctx.planner.running().map(|b| b.cruise_velocity).unwrap_or(0.0);
    StatusValue::Float(v)
}

fn read_line(ctx: &ReportContext) -> StatusValue {
    StatusValue::Int(ctx.gcode_state().line_number as i32)
}

/// Resolves a token id to its reader, for the handful this core ships
/// built in. An unknown id is a config error the caller should reject at
/// configuration time, not a panic here.
pub fn resolve_token(token_id: u16) -> Option<TokenSpec> {
    let read = match token_id {
        token_ids::STAT => read_stat,
        token_ids::POS_X => read_pos_x,
        token_ids::POS_Y => read_pos_y,
        token_ids::POS_Z => read_pos_z,
        token_ids::VELOCITY => read_velocity,
        token_ids::LINE => read_line,
        _ => return None,
    };
    Some(TokenSpec { token_id, read })
}

/// Assembles and throttles status/queue/rx reports. Holds the last-emitted
/// value of every configured token so a filtered report can detect change,
/// and a tick counter standing in for the interval timer an embedded
/// deployment would drive from a hardware tick (§4.H "interval-throttled").
pub struct ReportAssembler {
    tokens: heapless::Vec<TokenSpec, { proto::reports::SR_MAX_TOKENS }>,
    last_values: heapless::Vec<StatusValue, { proto::reports::SR_MAX_TOKENS }>,
    interval_ticks: u32,
    ticks_since_last: u32,
    asap: bool,
    last_queue_depth: u8,
}

impl ReportAssembler {
    pub fn new(interval_ticks: u32) -> Self {
        Self {
            tokens: heapless::Vec::new(),
            last_values: heapless::Vec::new(),
            interval_ticks,
            ticks_since_last: 0,
            asap: false,
            last_queue_depth: 0,
        }
    }

    /// Configures the list of tokens a status report carries, up to
    /// [`proto::reports::SR_MAX_TOKENS`]. Extra tokens past capacity are
    /// dropped, per the same bound the wire struct enforces.
    pub fn configure_tokens(&mut self, ids: &[u16]) {
        self.tokens.clear();
        self.last_values.clear();
        for &id in ids {
            if let Some(spec) = resolve_token(id) {
                if self.tokens.push(spec).is_err() {
                    break;
                }
                let _ = self.last_values.push(StatusValue::Int(0));
            }
        }
    }

    /// An "ASAP" request (e.g. after a mode change) resets the interval
    /// clock so the next poll emits regardless of elapsed ticks.
    pub fn request_asap(&mut self) {
        self.asap = true;
    }

    /// Advances the interval clock by one tick. Call once per foreground
    /// loop iteration.
    pub fn tick(&mut self) {
        self.ticks_since_last = self.ticks_since_last.saturating_add(1);
    }

    fn due(&self) -> bool {
        self.asap || self.ticks_since_last >= self.interval_ticks
    }

    /// Builds a status report if one is due, per §4.H: `Filtered` reports
    /// only tokens whose value changed, except `stat`, which always emits
    /// on `PROGRAM_STOP`/`PROGRAM_END`. Returns `None` if nothing is due.
    pub fn poll_status(&mut self, ctx: &ReportContext) -> Option<StatusReport> {
        if !self.due() {
            return None;
        }
        self.ticks_since_last = 0;
        self.asap = false;

        let force_stat = matches!(
            ctx.cm.machine_state,
            crate::machine::MachineState::ProgramStop | crate::machine::MachineState::ProgramEnd
        );

        let mut report = StatusReport::new(StatusReportKind::Filtered);
        for (i, spec) in self.tokens.iter().enumerate() {
            let value = (spec.read)(ctx);
            let changed = self.last_values.get(i).map(|last| *last != value).unwrap_or(true);
            if changed || (force_stat && spec.token_id == token_ids::STAT) {
                report.push(StatusToken {
                    token_id: spec.token_id,
                    value,
                });
            }
            if let Some(slot) = self.last_values.get_mut(i) {
                *slot = value;
            }
        }
        Some(report)
    }

    /// A verbose report emits every configured token unconditionally.
    pub fn verbose_status(&self, ctx: &ReportContext) -> StatusReport {
        let mut report = StatusReport::new(StatusReportKind::Verbose);
        for spec in self.tokens.iter() {
            report.push(StatusToken {
                token_id: spec.token_id,
                value: (spec.read)(ctx),
            });
        }
        report
    }

    /// Queue report (`qr`), per §4.H: depth-only normally, throttled during
    /// arc generation by the caller skipping this call, not by logic here.
    pub fn queue_report(&mut self, planner: &Planner) -> Option<QueueReport> {
        let depth = planner.len() as u8;
        if depth == self.last_queue_depth {
            return None;
        }
        self.last_queue_depth = depth;
        Some(QueueReport::depth_only(depth))
    }

    /// One-shot free-space report triggered after a queue flush.
    pub fn rx_report(&self, capacity: u32) -> RxReport {
        RxReport {
            bytes_free: capacity,
        }
    }
}

/// Maps a [`CanonError`] to its wire [`ExceptionReport`] (§7 "user-visible
/// behavior": exception reports always go out in JSON shape regardless of
/// text/JSON mode, so external controllers can resynchronize).
pub fn exception_report(build: u32, err: CanonError) -> ExceptionReport {
    use crate::errors::{InputError, ResourceError, StateError};

    let status = match err {
        CanonError::Input(InputError::MalformedNumber) => StatusCode::MalformedNumber,
        CanonError::Input(InputError::UnrecognizedToken) => StatusCode::UnrecognizedToken,
        CanonError::Input(InputError::ValueOutOfRange) => StatusCode::ValueOutOfRange,
        CanonError::Input(InputError::MissingFeedRate) => StatusCode::MissingFeedRate,
        CanonError::Input(InputError::ModalGroupViolation) => StatusCode::ModalGroupViolation,
        CanonError::Input(InputError::ArcSpecificationError) => StatusCode::ArcSpecificationError,
        CanonError::Input(InputError::SoftLimitExceeded(_)) => StatusCode::SoftLimitExceeded,
        CanonError::State(StateError::CommandNotAccepted) => StatusCode::CommandNotAccepted,
        CanonError::State(StateError::BadStatusReportSetting) => StatusCode::BadStatusReportSetting,
        CanonError::Resource(ResourceError::BufferFull) => StatusCode::BufferFull,
        CanonError::Resource(ResourceError::BufferFullFatal) => StatusCode::BufferFullFatal,
        CanonError::Corruption => StatusCode::Corruption,
    };
    ExceptionReport { build, status }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::MotionState;
    use motion::runtime::SegmentRuntime;

    #[test]
    fn status_report_emits_only_changed_tokens_after_first_poll() {
        let cm = CanonicalMachine::new();
        let planner = Planner::new();
        let ctx = ReportContext::new(&cm, &planner, None);
        let mut assembler = ReportAssembler::new(1);
        assembler.configure_tokens(&[token_ids::STAT, token_ids::POS_X]);

        let first = assembler.poll_status(&ctx).unwrap();
        assert_eq!(first.tokens.len(), 2);

        assembler.tick();
        let second = assembler.poll_status(&ctx).unwrap();
        assert_eq!(second.tokens.len(), 0);
    }

    #[test]
    fn asap_request_forces_immediate_poll() {
        let cm = CanonicalMachine::new();
        let planner = Planner::new();
        let ctx = ReportContext::new(&cm, &planner, None);
        let mut assembler = ReportAssembler::new(1000);
        assembler.configure_tokens(&[token_ids::STAT]);
        assert!(assembler.poll_status(&ctx).is_some());
        assert!(assembler.poll_status(&ctx).is_none());
        assembler.request_asap();
        assert!(assembler.poll_status(&ctx).is_some());
    }

    #[test]
    fn queue_report_only_emits_on_depth_change() {
        let planner = Planner::new();
        let mut assembler = ReportAssembler::new(1);
        assert!(assembler.queue_report(&planner).is_some());
        assert!(assembler.queue_report(&planner).is_none());
    }

    #[test]
    fn active_model_selects_model_when_stopped() {
        let cm = CanonicalMachine::new();
        let planner = Planner::new();
        let rt = SegmentRuntime::default();
        let ctx = ReportContext::new(&cm, &planner, Some(&rt));
        assert_eq!(ctx.active_model(), ActiveModel::Model);
    }

    #[test]
    fn running_block_line_number_is_reported_over_model_line_number() {
        let mut cm = CanonicalMachine::new();
        cm.model.line_number = 10;
        cm.motion_state = MotionState::Run;
        let planner = Planner::new();

        let mut rt = SegmentRuntime::default();
        rt.gcode_state.line_number = 42;

        let ctx = ReportContext::new(&cm, &planner, Some(&rt));
        assert_eq!(ctx.active_model(), ActiveModel::Runtime);
        assert_eq!(read_line(&ctx), StatusValue::Int(42));

        let stopped_ctx = ReportContext::new(&cm, &planner, None);
        // No runtime loaded: falls back to MODEL even though motion_state says Run.
        assert_eq!(read_line(&stopped_ctx), StatusValue::Int(10));
    }
}
