//! Kinematics and per-axis configuration.

#[inline]
fn sqrt(x: f64) -> f64 {
    #[cfg(not(feature = "std"))]
    {
        libm::sqrt(x)
    }
    #[cfg(feature = "std")]
    {
        x.sqrt()
    }
}

/// Fixed axis count: X, Y, Z, A, B, C.
pub const AXES: usize = 6;

/// Identifiers for the six canonical axes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
    A = 3,
    B = 4,
    C = 5,
}

impl Axis {
    pub const ALL: [Axis; AXES] = [Axis::X, Axis::Y, Axis::Z, Axis::A, Axis::B, Axis::C];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_rotary(self) -> bool {
        matches!(self, Axis::A | Axis::B | Axis::C)
    }
}

/// Per-axis operating mode, used by target computation (`set_model_target`)
/// to decide how a rotary axis's commanded value is interpreted. Linear
/// axes (X/Y/Z) are always `Standard`.
///
/// Slave-axis (XY/XZ/YZ) modes from the source's commented-out `_calc_ABC`
/// are intentionally omitted here (Open Question #1: omitted pending
/// stakeholder confirmation).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub enum AxisMode {
    /// Axis ignored entirely; commanded values have no effect.
    Disabled,
    /// Standard direct mapping (mm for linear axes, degrees for rotary).
    Standard,
    /// Same conversion as `Standard` but the axis is not driven (present in
    /// reports, absent from step generation).
    Inhibited,
    /// Rotary axis driven in linear units converted to degrees via a
    /// configured radius: `degrees = mm * 360 / (2*pi*radius)`.
    Radius,
}

/// Per-axis configuration owned by the canonical machine, referenced here
/// because kinematics' target computation needs the mode and radius.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct AxisConfig {
    pub mode: AxisMode,
    /// Radius in mm, used only when `mode == AxisMode::Radius`.
    pub radius: f32,
    pub soft_limit_min: f32,
    pub soft_limit_max: f32,
    pub max_velocity: f32,
    pub max_feedrate: f32,
    pub max_jerk: f32,
}

/// Sentinel disabling a soft-limit end for an axis.
pub const DISABLE_SOFT_LIMIT: f32 = -2.0e6;

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            mode: AxisMode::Standard,
            radius: 1.0,
            soft_limit_min: DISABLE_SOFT_LIMIT,
            soft_limit_max: DISABLE_SOFT_LIMIT,
            max_velocity: 0.0,
            max_feedrate: 0.0,
            max_jerk: 0.0,
        }
    }
}

impl AxisConfig {
    /// Converts a commanded linear distance (mm) into the axis's native
    /// target units, applying radius-mode conversion per the rotary-axis
    /// target computation rule: `degrees = mm * 360 / (2*pi*radius)`.
    pub fn convert_target(&self, mm: f32) -> f32 {
        match self.mode {
            AxisMode::Radius => mm * 360.0 / (2.0 * core::f32::consts::PI * self.radius),
            _ => mm,
        }
    }

    pub fn cached_jerk_terms(&self) -> (f32, f32) {
        let j = self.max_jerk.max(f32::MIN_POSITIVE);
        let inv_j = 1.0 / j;
        #[cfg(feature = "std")]
        let cbrt_j = j.cbrt();
        #[cfg(not(feature = "std"))]
        let cbrt_j = libm::cbrtf(j);
        (inv_j, cbrt_j)
    }
}

/// A trait for kinematic models that translate a Cartesian/rotary target
/// into per-motor step positions.
pub trait Kinematics {
    /// The number of motors in this kinematic model.
    const MOTORS: usize;

    /// Calculate motor positions (in steps) for a given target, expressed
    /// in the AXES-element canonical target vector (mm for X/Y/Z, degrees
    /// or radius-converted degrees for A/B/C).
    fn target_to_motor_positions(&self, target: [f32; AXES]) -> [f64; 8];

    /// Euclidean distance between two targets in motor space, used by the
    /// planner to compute move length.
    fn motor_move_distance(&self, from: [f32; AXES], to: [f32; AXES]) -> f64 {
        let start = self.target_to_motor_positions(from);
        let end = self.target_to_motor_positions(to);
        let mut dist_sq = 0.0;
        for i in 0..Self::MOTORS {
            let delta = end[i] - start[i];
            dist_sq += delta * delta;
        }
        sqrt(dist_sq)
    }
}

/// Direct Cartesian kinematics: every axis maps 1:1 to its own motor. This
/// is the kinematic model a CNC mill, plotter, or gantry-frame 3D printer
/// uses; this motion core has no CoreXY-style motor coupling.
#[derive(Debug, Clone, Copy)]
pub struct CartesianKinematics {
    pub steps_per_unit: [f64; AXES],
}

impl Default for CartesianKinematics {
    fn default() -> Self {
        Self {
            steps_per_unit: [1.0; AXES],
        }
    }
}

impl Kinematics for CartesianKinematics {
    const MOTORS: usize = AXES;

    fn target_to_motor_positions(&self, target: [f32; AXES]) -> [f64; 8] {
        let mut out = [0.0; 8];
        for i in 0..AXES {
            out[i] = target[i] as f64 * self.steps_per_unit[i];
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radius_mode_converts_mm_to_degrees() {
        let mut cfg = AxisConfig::default();
        cfg.mode = AxisMode::Radius;
        cfg.radius = 5.0;
        let degrees = cfg.convert_target(31.4159);
        assert!((degrees - 360.0).abs() < 0.01);
    }

    #[test]
    fn standard_mode_is_passthrough() {
        let cfg = AxisConfig::default();
        assert_eq!(cfg.convert_target(12.5), 12.5);
    }

    #[test]
    fn cartesian_kinematics_is_identity_scaled() {
        let mut k = CartesianKinematics::default();
        k.steps_per_unit[0] = 80.0;
        let from = [0.0; AXES];
        let mut to = [0.0; AXES];
        to[0] = 10.0;
        let dist = k.motor_move_distance(from, to);
        assert!((dist - 800.0).abs() < 1e-6);
    }
}
