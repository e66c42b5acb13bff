//! G-code interpreter state, held in three temporal contexts: MODEL (latest
//! parsed/interpreted state), PLANNER (one copy per queued block), and
//! RUNTIME (state of the segment currently being pulsed).

use crate::kinematics::AXES;

/// Motion mode, modal group 1.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub enum MotionMode {
    StraightTraverse, // G0
    StraightFeed,     // G1
    ArcCw,            // G2
    ArcCcw,           // G3
    Cancel,           // G80
}

/// Feed-rate mode, modal group 5.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub enum FeedRateMode {
    UnitsPerMinute, // G94
    InverseTime,    // G93
}

/// Units mode, modal group 6.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub enum UnitsMode {
    Inches, // G20
    Millimeters, // G21
}

/// Distance mode, modal group 3.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub enum DistanceMode {
    Absolute,    // G90
    Incremental, // G91
}

/// Plane select, modal group 2.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub enum Plane {
    Xy, // G17
    Xz, // G18
    Yz, // G19
}

/// Path control mode, modal group 13.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub enum PathControl {
    ExactPath,   // G61
    ExactStop,   // G61.1
    Continuous,  // G64
}

/// Spindle mode, modal group 7.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub enum SpindleMode {
    Off,
    Clockwise,
    CounterClockwise,
}

/// All modal groups, grouped into one sub-struct so `GCodeState` stays a
/// composition of small pieces rather than one flat struct.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct ModalState {
    pub motion_mode: MotionMode,
    pub plane: Plane,
    pub units: UnitsMode,
    pub distance_mode: DistanceMode,
    pub path_control: PathControl,
    pub feed_rate_mode: FeedRateMode,
}

impl Default for ModalState {
    fn default() -> Self {
        Self {
            motion_mode: MotionMode::Cancel,
            plane: Plane::Xy,
            units: UnitsMode::Millimeters,
            distance_mode: DistanceMode::Absolute,
            path_control: PathControl::ExactPath,
            feed_rate_mode: FeedRateMode::UnitsPerMinute,
        }
    }
}

/// One of the three temporal contexts a `GCodeState` snapshot can represent.
/// Reporting code uses this to pick which context to sample from: MODEL when
/// motion is stopped, RUNTIME when running.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ActiveModel {
    Model,
    Runtime,
}

/// G-code interpreter state. One copy lives in the canonical machine as
/// MODEL; one copy is captured into each planner buffer as PLANNER; one
/// copy is owned by the segment runtime as RUNTIME.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct GCodeState {
    pub line_number: u32,
    pub modal: ModalState,
    pub feed_rate: f32,
    pub coord_system: u8, // 0 = G54 ... 5 = G59
    pub tool: u8,
    pub spindle_mode: SpindleMode,
    pub spindle_speed: f32,
    pub mist_coolant: bool,
    pub flood_coolant: bool,
    /// Per-move absolute-position override (G53-style), cleared after use.
    pub absolute_override: bool,
    /// Target position for the move currently being interpreted, mm.
    pub target: [f32; AXES],
    /// Per-axis work-offset snapshot in effect when this state was captured.
    pub work_offset: [f32; AXES],
}

impl Default for GCodeState {
    fn default() -> Self {
        Self {
            line_number: 0,
            modal: ModalState::default(),
            feed_rate: 0.0,
            coord_system: 0,
            tool: 0,
            spindle_mode: SpindleMode::Off,
            spindle_speed: 0.0,
            mist_coolant: false,
            flood_coolant: false,
            absolute_override: false,
            target: [0.0; AXES],
            work_offset: [0.0; AXES],
        }
    }
}

/// Extended model state (`gmx`): parts of MODEL that are not copied
/// per-block.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct ExtendedModel {
    /// Absolute machine position, always in mm regardless of units mode.
    pub machine_position: [f32; AXES],
    /// Origin offset vector (G92).
    pub origin_offset: [f32; AXES],
    pub origin_offset_enable: bool,
    /// Stored G28 position.
    pub g28_position: [f32; AXES],
    /// Stored G30 position.
    pub g30_position: [f32; AXES],
    pub block_delete_enabled: bool,
    pub feed_override_enable: bool,
    pub feed_override_factor: f32,
    pub traverse_override_enable: bool,
    pub traverse_override_factor: f32,
    pub spindle_override_enable: bool,
    pub spindle_override_factor: f32,
}

impl Default for ExtendedModel {
    fn default() -> Self {
        Self {
            machine_position: [0.0; AXES],
            origin_offset: [0.0; AXES],
            origin_offset_enable: false,
            g28_position: [0.0; AXES],
            g30_position: [0.0; AXES],
            block_delete_enabled: false,
            feed_override_enable: false,
            feed_override_factor: 1.0,
            traverse_override_enable: false,
            traverse_override_factor: 1.0,
            spindle_override_enable: false,
            spindle_override_factor: 1.0,
        }
    }
}
