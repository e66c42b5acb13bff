//! The canonical-machine singleton (§3 "Canonical-machine singleton", §4.G).
//!
//! One struct owning the interpreter's live state, read by the dispatcher
//! and by reporting, covering MODEL/PLANNER/RUNTIME's three-context G-code
//! state and the machine/cycle/motion/hold state machines §3 requires,
//! plus §9's magic-number corruption brackets.

use motion::kinematics::{AxisConfig, AXES};
use motion::{ExtendedModel, GCodeState};

/// Number of work coordinate systems (G54-G59), plus slot 0 for the
/// absolute/machine coordinate system (`offset[0]` is always zero).
pub const COORDS: usize = 6;

const MAGIC_FRONT: u32 = 0x4D5F4843; // "M_HC"
const MAGIC_BACK: u32 = 0x4348_5F4D; // "CH_M"

/// Top-level machine state (§4.G table rows/columns; §5 cancellation).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MachineState {
    Init,
    Ready,
    Alarm,
    ProgramStop,
    ProgramEnd,
    Cycle,
    Shutdown,
}

/// Cycle state: whether a run is in progress and, if so, what kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CycleState {
    Off,
    Machining,
    Homing,
    Probing,
}

/// Motion state, the axis the feedhold table (§4.G) is keyed on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MotionState {
    Stop,
    Run,
    Hold,
}

/// Feed-hold sub-state machine (§4.C "Feed hold").
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HoldState {
    Off,
    Sync,
    Plan,
    Decel,
    Hold,
    EndHold,
}

/// Homing-cycle sub-state: a plain flag pair sufficient for `G28`/`G28.1`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HomingState {
    NotHomed,
    Homing,
    Homed,
}

/// Derived combined-state, recomputed from machine/cycle/motion/hold state
/// on every read rather than stored redundantly (§3: "combined-state
/// (derived)").
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CombinedState {
    Init,
    Ready,
    Alarm,
    Shutdown,
    ProgramStop,
    ProgramEnd,
    Homing,
    Probing,
    Cycle,
    Hold,
}

/// The three async request flags (§3, §5): single-writer-per-flag, set by
/// whatever delivers immediate controls (a UART RX ISR on the MCU, the
/// framer on the host) and cleared by the foreground dispatcher.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct RequestFlags {
    pub feedhold: bool,
    pub queue_flush: bool,
    pub cycle_start: bool,
}

/// The canonical-machine singleton (`cm`). Owns MODEL state, the per-axis
/// and per-coordinate-system configuration, the state machines, and the
/// async request flags. Magic-number brackets detect stray writes past the
/// struct's bounds, since this struct is also reachable from ISR context on
/// the MCU target.
#[derive(Debug, Clone)]
pub struct CanonicalMachine {
    magic_front: u32,

    pub model: GCodeState,
    pub gmx: ExtendedModel,
    pub axes: [AxisConfig; AXES],
    pub offset: [[f32; AXES]; COORDS + 1],
    pub homed: [bool; AXES],

    pub machine_state: MachineState,
    pub cycle_state: CycleState,
    pub motion_state: MotionState,
    pub hold_state: HoldState,
    pub homing_state: HomingState,

    /// G10-style offset edits are persisted lazily, not synchronously with
    /// every command (§4.G: "coord-offsets (G10, with deferred persistence)").
    pub config_dirty: bool,

    pub requests: RequestFlags,

    magic_back: u32,
}

impl Default for CanonicalMachine {
    fn default() -> Self {
        Self {
            magic_front: MAGIC_FRONT,
            model: GCodeState::default(),
            gmx: ExtendedModel::default(),
            axes: [AxisConfig::default(); AXES],
            offset: [[0.0; AXES]; COORDS + 1],
            homed: [false; AXES],
            machine_state: MachineState::Init,
            cycle_state: CycleState::Off,
            motion_state: MotionState::Stop,
            hold_state: HoldState::Off,
            homing_state: HomingState::NotHomed,
            config_dirty: false,
            requests: RequestFlags::default(),
            magic_back: MAGIC_BACK,
        }
    }
}

impl CanonicalMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks the magic-number brackets, per §4.G "Assertions": "a callback
    /// runs on each controller iteration and triggers a hard alarm on
    /// corruption." Callers run this once per foreground loop iteration.
    pub fn check_magic(&self) -> bool {
        self.magic_front == MAGIC_FRONT && self.magic_back == MAGIC_BACK
    }

    /// Work-coordinate-system index currently selected by MODEL (0-5, G54-G59).
    pub fn active_coord_system(&self) -> usize {
        self.model.coord_system as usize
    }

    /// Active per-axis work offset for `axis`, combining the selected
    /// coordinate system's offset with the G92 origin offset when enabled.
    pub fn work_offset(&self, axis: usize) -> f32 {
        let base = self.offset[self.active_coord_system() + 1][axis];
        if self.gmx.origin_offset_enable {
            base + self.gmx.origin_offset[axis]
        } else {
            base
        }
    }

    /// Derives [`CombinedState`] from the four component state machines
    /// (§3: "combined-state (derived)").
    pub fn combined_state(&self) -> CombinedState {
        match self.machine_state {
            MachineState::Init => CombinedState::Init,
            MachineState::Shutdown => CombinedState::Shutdown,
            MachineState::Alarm => CombinedState::Alarm,
            MachineState::ProgramStop => CombinedState::ProgramStop,
            MachineState::ProgramEnd => CombinedState::ProgramEnd,
            MachineState::Ready => {
                if self.motion_state == MotionState::Hold {
                    CombinedState::Hold
                } else {
                    match self.cycle_state {
                        CycleState::Off => CombinedState::Ready,
                        CycleState::Homing => CombinedState::Homing,
                        CycleState::Probing => CombinedState::Probing,
                        CycleState::Machining => CombinedState::Cycle,
                    }
                }
            }
            MachineState::Cycle => {
                if self.motion_state == MotionState::Hold {
                    CombinedState::Hold
                } else {
                    CombinedState::Cycle
                }
            }
        }
    }

    /// Soft-limit test (§4.G): a homed axis with distinct travel min/max
    /// rejects a target outside `[min, max]`. [`motion::kinematics::DISABLE_SOFT_LIMIT`]
    /// disables either end.
    pub fn check_soft_limits(&self, target: &[f32; AXES]) -> Result<(), usize> {
        use motion::kinematics::DISABLE_SOFT_LIMIT;
        for i in 0..AXES {
            if !self.homed[i] {
                continue;
            }
            let cfg = &self.axes[i];
            if cfg.soft_limit_min == cfg.soft_limit_max {
                continue;
            }
            if cfg.soft_limit_min != DISABLE_SOFT_LIMIT && target[i] < cfg.soft_limit_min {
                return Err(i);
            }
            if cfg.soft_limit_max != DISABLE_SOFT_LIMIT && target[i] > cfg.soft_limit_max {
                return Err(i);
            }
        }
        Ok(())
    }
}
