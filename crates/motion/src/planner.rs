//! Planner ring and lookahead (§4.E) plus the planner buffer API (§4.F).
//!
//! A fixed ring of [`PlannerBuffer`] slots, indexed rather than
//! pointer-linked (no allocation after init). `mp_aline()` commits one move:
//! it computes the unit vector, length, rate-limiting axis jerk, and the
//! velocity maxima permitted by per-axis velocity limits and by junction
//! deviation at the seam with the previous move, then back-plans from the
//! new tail toward the oldest still-replannable buffer.
//!
//! Discipline: `alloc` -> `commit` -> `run` -> `free`, strictly in that
//! order per buffer; `r`/`w` track the run and write ends of the ring.
//! [`PLANNER_BUFFER_HEADROOM`] buffers are always kept free so an in-flight
//! replan always has somewhere to go.

#[cfg(not(feature = "std"))]
use libm::sqrtf;
#[cfg(feature = "std")]
fn sqrtf(x: f32) -> f32 {
    x.sqrt()
}

use crate::error::PlannerError;
use crate::gcode_state::{GCodeState, SpindleMode};
use crate::kinematics::{AxisConfig, AXES};
use crate::trapezoid::{self, Trapezoid};

/// Number of slots in the planner ring. The source requires at least 28;
/// this implementation uses exactly that minimum.
pub const PLANNER_BUFFER_POOL_SIZE: usize = 28;

/// Buffers always held free so incoming lines never fully fill the ring,
/// preserving room for an in-flight replan.
pub const PLANNER_BUFFER_HEADROOM: usize = 4;

/// A planner buffer's lifecycle state. Progresses monotonically; a buffer
/// may not skip states.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BufferState {
    Empty,
    Loading,
    Queued,
    Pending,
    Running,
}

/// What kind of thing a buffer represents.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MoveType {
    Null,
    Aline,
    Dwell,
    Command,
}

/// A queued command's payload, dispatched by the runtime when it reaches
/// this buffer instead of emitting motion. A tagged sum stored inline,
/// per the design note on avoiding raw callback pointers in the hot path.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum QueuedCommand {
    Dwell(f32),
    SetCoordSystem(u8),
    ChangeTool(u8),
    SetSpindleMode(SpindleMode, f32),
    MistCoolant(bool),
    FloodCoolant(bool),
    SetOriginOffset([f32; AXES]),
    /// G92.1 (`reset: true`, zeroes the offset) vs G92.2 (`reset: false`,
    /// suspends it without clearing the stored value).
    CancelOriginOffset { reset: bool },
    ProgramStop,
    OptionalStop,
    ProgramEnd,
}

/// One slot in the planner ring.
#[derive(Debug, Copy, Clone)]
pub struct PlannerBuffer {
    pub state: BufferState,
    pub move_type: MoveType,
    pub replannable: bool,

    pub unit_vector: [f32; AXES],
    pub length: f32,

    pub head_length: f32,
    pub body_length: f32,
    pub tail_length: f32,

    pub entry_velocity: f32,
    pub cruise_velocity: f32,
    pub exit_velocity: f32,
    pub entry_vmax: f32,
    pub cruise_vmax: f32,
    pub exit_vmax: f32,
    /// Maximum velocity step this move's length and jerk can support.
    pub delta_vmax: f32,
    /// The entry velocity reachable given the successor's exit velocity,
    /// this move's length, and its jerk; the back-plan termination test.
    pub braking_velocity: f32,

    pub jerk_axis: usize,
    pub jerk: f32,
    pub jerk_inv: f32,
    pub jerk_cbrt: f32,

    pub gcode_state: GCodeState,
    pub command: Option<QueuedCommand>,
}

impl Default for PlannerBuffer {
    fn default() -> Self {
        Self {
            state: BufferState::Empty,
            move_type: MoveType::Null,
            replannable: false,
            unit_vector: [0.0; AXES],
            length: 0.0,
            head_length: 0.0,
            body_length: 0.0,
            tail_length: 0.0,
            entry_velocity: 0.0,
            cruise_velocity: 0.0,
            exit_velocity: 0.0,
            entry_vmax: 0.0,
            cruise_vmax: 0.0,
            exit_vmax: 0.0,
            delta_vmax: 0.0,
            braking_velocity: 0.0,
            jerk_axis: 0,
            jerk: 0.0,
            jerk_inv: 0.0,
            jerk_cbrt: 0.0,
            gcode_state: GCodeState::default(),
            command: None,
        }
    }
}

impl PlannerBuffer {
    /// Computes this buffer's head/body/tail decomposition from its current
    /// entry/cruise/exit velocities. Called once the buffer is no longer
    /// replannable (the runtime is about to consume it).
    pub fn trapezoid(&self) -> Trapezoid {
        trapezoid::compute_trapezoid(
            self.length,
            self.entry_velocity,
            self.cruise_velocity,
            self.exit_velocity,
            self.jerk,
        )
    }
}

/// Planner master (`mm`): the planner's end-of-queue position and the
/// previous block's cached jerk terms, used to seed the next `mp_aline`.
#[derive(Debug, Copy, Clone)]
pub struct PlannerMaster {
    pub position: [f32; AXES],
    pub previous_unit_vector: [f32; AXES],
    pub previous_jerk: f32,
}

impl Default for PlannerMaster {
    fn default() -> Self {
        Self {
            position: [0.0; AXES],
            previous_unit_vector: [0.0; AXES],
            previous_jerk: 0.0,
        }
    }
}

/// Configured junction-deviation tolerance (mm), bounding cornering velocity
/// between two consecutive moves.
pub const JUNCTION_DEVIATION: f32 = 0.05;

/// The planner ring: `PLANNER_BUFFER_POOL_SIZE` buffers addressed by index,
/// with `r` (run/read), `w` (write) indices tracking the FIFO's ends.
pub struct Planner {
    buffers: [PlannerBuffer; PLANNER_BUFFER_POOL_SIZE],
    r: usize,
    w: usize,
    count: usize,
    pub mm: PlannerMaster,
}

impl Planner {
    pub fn new() -> Self {
        Self {
            buffers: [PlannerBuffer::default(); PLANNER_BUFFER_POOL_SIZE],
            r: 0,
            w: 0,
            count: 0,
            mm: PlannerMaster::default(),
        }
    }

    fn next_index(i: usize) -> usize {
        (i + 1) % PLANNER_BUFFER_POOL_SIZE
    }

    fn prev_index(i: usize) -> usize {
        (i + PLANNER_BUFFER_POOL_SIZE - 1) % PLANNER_BUFFER_POOL_SIZE
    }

    /// Number of buffers currently occupied (not `Empty`).
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Allocates the next `Empty` slot, honoring [`PLANNER_BUFFER_HEADROOM`].
    /// Returns `QueueFullFatal` if the running buffer itself cannot free
    /// space (the ring has no `Empty` slot anywhere, not even the one being
    /// consumed), `QueueFull` if headroom alone blocks the allocation.
    fn alloc(&mut self) -> Result<usize, PlannerError> {
        if self.count >= PLANNER_BUFFER_POOL_SIZE {
            return Err(PlannerError::QueueFullFatal);
        }
        if self.count >= PLANNER_BUFFER_POOL_SIZE - PLANNER_BUFFER_HEADROOM {
            return Err(PlannerError::QueueFull);
        }
        let idx = self.w;
        self.buffers[idx] = PlannerBuffer::default();
        self.buffers[idx].state = BufferState::Loading;
        Ok(idx)
    }

    /// Commits a loading buffer: transitions it to `Queued` and advances the
    /// write pointer. The buffer `state` write is the publication fence the
    /// LO-priority consumer relies on (§5 shared-resource policy).
    fn commit(&mut self, idx: usize) {
        debug_assert_eq!(self.buffers[idx].state, BufferState::Loading);
        self.buffers[idx].state = BufferState::Queued;
        self.buffers[idx].replannable = true;
        self.w = Self::next_index(idx);
        self.count += 1;
    }

    /// Called by the runtime when it begins consuming the oldest queued
    /// buffer: marks it non-replannable and `Running`. At most one buffer
    /// may be `Running` at a time.
    pub fn run_next(&mut self) -> Option<&PlannerBuffer> {
        if self.count == 0 {
            return None;
        }
        let idx = self.r;
        if self.buffers[idx].state != BufferState::Queued {
            return None;
        }
        self.buffers[idx].replannable = false;
        self.buffers[idx].state = BufferState::Running;
        Some(&self.buffers[idx])
    }

    /// Called by the runtime when the currently running buffer has emitted
    /// its last segment: frees it and advances the read pointer.
    pub fn free_running(&mut self) {
        let idx = self.r;
        if self.buffers[idx].state == BufferState::Running {
            self.buffers[idx] = PlannerBuffer::default();
            self.r = Self::next_index(idx);
            self.count -= 1;
        }
    }

    /// Returns the `i`-th buffer in FIFO order (0 = oldest/next to run),
    /// for reporting and testing. Panics if `i >= self.len()`.
    pub fn buffer_at(&self, i: usize) -> &PlannerBuffer {
        assert!(i < self.count, "buffer index {i} out of range ({} queued)", self.count);
        &self.buffers[(self.r + i) % PLANNER_BUFFER_POOL_SIZE]
    }

    pub fn running(&self) -> Option<&PlannerBuffer> {
        let idx = self.r;
        if self.buffers[idx].state == BufferState::Running {
            Some(&self.buffers[idx])
        } else {
            None
        }
    }

    /// Commits one line move, per §4.E: computes the unit vector and length
    /// from `mm.position` to `target`, picks the rate-limiting axis's jerk,
    /// derives the velocity maxima from per-axis velocity limits and
    /// junction deviation at the seam with the previous move, then
    /// back-plans.
    pub fn mp_aline(
        &mut self,
        target: [f32; AXES],
        requested_feed: f32,
        axes: &[AxisConfig; AXES],
        gcode_state: GCodeState,
    ) -> Result<(), PlannerError> {
        let start = self.mm.position;
        let mut delta = [0.0f32; AXES];
        let mut length_sq = 0.0f32;
        for i in 0..AXES {
            delta[i] = target[i] - start[i];
            length_sq += delta[i] * delta[i];
        }
        let length = sqrtf(length_sq);
        if length < 1e-9 {
            return Err(PlannerError::InvalidMove);
        }
        let mut unit = [0.0f32; AXES];
        for i in 0..AXES {
            unit[i] = delta[i] / length;
        }

        // Rate-limiting axis: the axis whose velocity/jerk bound, scaled by
        // its direction component, is tightest.
        let mut cruise_vmax = requested_feed.max(0.0);
        let mut jerk_axis = 0usize;
        let mut jerk = f32::MAX;
        for i in 0..AXES {
            let comp = unit[i].abs();
            if comp < 1e-6 {
                continue;
            }
            let axis_vmax = axes[i].max_velocity / comp;
            if axis_vmax < cruise_vmax {
                cruise_vmax = axis_vmax;
            }
            let axis_jerk = axes[i].max_jerk / comp;
            if axis_jerk < jerk {
                jerk = axis_jerk;
                jerk_axis = i;
            }
        }
        if jerk == f32::MAX || jerk <= 0.0 {
            return Err(PlannerError::InvalidMove);
        }

        let idx = self.alloc()?;
        let (jerk_inv, jerk_cbrt) = axes[jerk_axis].cached_jerk_terms();
        let delta_vmax = trapezoid::accel_length(0.0, cruise_vmax, jerk).max(1e-6);

        let entry_vmax = junction_velocity(
            self.mm.previous_unit_vector,
            unit,
            JUNCTION_DEVIATION,
            jerk.min(self.mm.previous_jerk),
        )
        .min(cruise_vmax);

        {
            let buf = &mut self.buffers[idx];
            buf.move_type = MoveType::Aline;
            buf.unit_vector = unit;
            buf.length = length;
            buf.cruise_vmax = cruise_vmax;
            buf.entry_vmax = entry_vmax;
            buf.exit_vmax = cruise_vmax;
            buf.delta_vmax = delta_vmax;
            buf.jerk_axis = jerk_axis;
            buf.jerk = jerk;
            buf.jerk_inv = jerk_inv;
            buf.jerk_cbrt = jerk_cbrt;
            buf.gcode_state = gcode_state;
            buf.entry_velocity = 0.0;
            buf.cruise_velocity = cruise_vmax;
            buf.exit_velocity = 0.0;
            buf.braking_velocity = entry_vmax;
        }

        self.commit(idx);
        self.mm.position = target;
        self.mm.previous_unit_vector = unit;
        self.mm.previous_jerk = jerk;

        self.back_plan();
        Ok(())
    }

    /// Queues a non-motion command buffer (dwell, tool change, coolant,
    /// program stop/end, offset). Executes in the same FIFO as moves.
    pub fn queue_command(
        &mut self,
        command: QueuedCommand,
        gcode_state: GCodeState,
    ) -> Result<(), PlannerError> {
        let idx = self.alloc()?;
        {
            let buf = &mut self.buffers[idx];
            buf.move_type = match command {
                QueuedCommand::Dwell(_) => MoveType::Dwell,
                _ => MoveType::Command,
            };
            buf.command = Some(command);
            buf.gcode_state = gcode_state;
            // Commands carry no motion; velocities are irrelevant but kept
            // internally consistent (entry == cruise == exit == 0).
        }
        self.commit(idx);
        Ok(())
    }

    /// Back-plans from the newest committed buffer toward the oldest
    /// still-replannable one: each buffer's exit velocity is reduced to its
    /// successor's entry velocity, and its entry velocity to what its
    /// braking distance under jerk can reach from there. Terminates when a
    /// buffer's braking velocity equals its `entry_vmax` (nothing more to
    /// gain by continuing) or a non-replannable buffer is hit. Idempotent:
    /// running it twice over an unchanged ring yields identical velocities.
    pub fn back_plan(&mut self) {
        if self.count == 0 {
            return;
        }
        let newest = Self::prev_index(self.w);
        let mut idx = newest;
        let mut successor_entry: Option<f32> = None;

        loop {
            if self.buffers[idx].state != BufferState::Queued || !self.buffers[idx].replannable {
                break;
            }
            if self.buffers[idx].move_type != MoveType::Aline {
                // Commands don't carry velocity; they don't propagate a
                // back-plan constraint past themselves.
                break;
            }

            let exit_v = match successor_entry {
                Some(se) => self.buffers[idx].exit_vmax.min(se),
                None => self.buffers[idx].exit_vmax,
            };
            self.buffers[idx].exit_velocity = exit_v;

            let braking = trapezoid::target_velocity(
                exit_v,
                self.buffers[idx].length,
                self.buffers[idx].jerk,
            )
            .min(self.buffers[idx].entry_vmax);
            self.buffers[idx].braking_velocity = braking;
            self.buffers[idx].entry_velocity = braking;
            // entry_vmax and exit_vmax are both capped at cruise_vmax when
            // the buffer is created, so braking/exit never exceed it here.
            self.buffers[idx].cruise_velocity = self.buffers[idx].cruise_vmax;

            if (braking - self.buffers[idx].entry_vmax).abs() < 1e-6 {
                break;
            }

            successor_entry = Some(braking);

            if idx == self.r {
                break;
            }
            idx = Self::prev_index(idx);
        }
    }

    /// After a feedhold completes and cycle-start resumes (§4.C: "cycle-
    /// start resumes by replanning remaining blocks from zero"), the
    /// now-oldest queued buffer starts from whatever velocity the block
    /// that was actually in flight handed off — a standstill if that block
    /// had fully decelerated, or its resumed exit velocity if
    /// `SegmentRuntime::resume_held_block` picked it back up short of
    /// completion. Forward-propagates that seed through the remaining
    /// queued `aline` buffers so no buffer's exit exceeds what its
    /// successor can actually enter at, avoiding a velocity discontinuity
    /// at resume.
    pub fn resume_from_hold(&mut self, seed_velocity: f32) {
        let mut predecessor_exit = seed_velocity;
        for i in 0..self.count {
            let idx = (self.r + i) % PLANNER_BUFFER_POOL_SIZE;
            if self.buffers[idx].state != BufferState::Queued
                || self.buffers[idx].move_type != MoveType::Aline
            {
                continue;
            }
            self.buffers[idx].entry_velocity = predecessor_exit;
            let reachable =
                trapezoid::target_velocity(predecessor_exit, self.buffers[idx].length, self.buffers[idx].jerk);
            self.buffers[idx].cruise_velocity = self.buffers[idx].cruise_vmax;
            self.buffers[idx].exit_velocity = self.buffers[idx].exit_velocity.min(reachable);
            predecessor_exit = self.buffers[idx].exit_velocity;
        }
    }
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

/// Cornering velocity permitted at the junction between two consecutive
/// unit vectors under a configured junction-deviation tolerance, per §4.E.
/// `cos_theta = 1` for a continuing straight line (no limit), `-1` for a
/// full reversal (zero cornering velocity).
fn junction_velocity(
    prev_unit: [f32; AXES],
    unit: [f32; AXES],
    junction_deviation: f32,
    jerk: f32,
) -> f32 {
    let prev_mag_sq: f32 = prev_unit.iter().map(|x| x * x).sum();
    if prev_mag_sq < 1e-9 {
        // No previous move to corner against.
        return f32::MAX;
    }
    let cos_theta: f32 = prev_unit
        .iter()
        .zip(unit.iter())
        .map(|(a, b)| a * b)
        .sum::<f32>()
        .clamp(-1.0, 1.0);
    let sin_half_theta = ((1.0 - cos_theta) / 2.0).max(0.0);
    let sin_half_theta = sqrtf(sin_half_theta);
    if sin_half_theta < 1e-6 {
        return f32::MAX;
    }
    let radius = junction_deviation * sin_half_theta / (1.0 - sin_half_theta).max(1e-6);
    // Equivalent centripetal acceleration bound derived from the jerk scale
    // (a characteristic acceleration of jerk^(2/3) over a unit time), kept
    // as an approximation of the source's junction-acceleration term.
    let accel_equiv = jerk.abs().cbrt_approx().powi(2);
    sqrtf(radius * accel_equiv)
}

trait CbrtApprox {
    fn cbrt_approx(self) -> f32;
}

impl CbrtApprox for f32 {
    fn cbrt_approx(self) -> f32 {
        #[cfg(feature = "std")]
        {
            self.cbrt()
        }
        #[cfg(not(feature = "std"))]
        {
            libm::cbrtf(self)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematics::AxisConfig;

    fn axes() -> [AxisConfig; AXES] {
        let mut cfg = AxisConfig::default();
        cfg.max_velocity = 500.0;
        cfg.max_jerk = 50_000_000.0;
        [cfg; AXES]
    }

    #[test]
    fn alloc_respects_headroom() {
        let mut p = Planner::new();
        let mut target = [0.0; AXES];
        let mut ok = 0;
        for i in 0..PLANNER_BUFFER_POOL_SIZE {
            target[0] = (i + 1) as f32 * 10.0;
            match p.mp_aline(target, 100.0, &axes(), GCodeState::default()) {
                Ok(()) => ok += 1,
                Err(PlannerError::QueueFull) | Err(PlannerError::QueueFullFatal) => break,
                Err(e) => panic!("unexpected error {:?}", e),
            }
        }
        assert!(ok <= PLANNER_BUFFER_POOL_SIZE - PLANNER_BUFFER_HEADROOM);
        assert_eq!(p.len(), ok);
    }

    #[test]
    fn back_plan_is_idempotent() {
        let mut p = Planner::new();
        let mut target = [0.0; AXES];
        target[0] = 10.0;
        p.mp_aline(target, 300.0, &axes(), GCodeState::default()).unwrap();
        target[1] = 10.0;
        p.mp_aline(target, 300.0, &axes(), GCodeState::default()).unwrap();
        target[0] = 0.0;
        target[1] = 0.0;
        p.mp_aline(target, 300.0, &axes(), GCodeState::default()).unwrap();

        let before: heapless::Vec<f32, 8> = (0..p.len()).map(|i| p.buffer_at(i).entry_velocity).collect();
        p.back_plan();
        let after: heapless::Vec<f32, 8> = (0..p.len()).map(|i| p.buffer_at(i).entry_velocity).collect();
        for (a, b) in before.iter().zip(after.iter()) {
            assert!((a - b).abs() < 1e-3, "before={a} after={b}");
        }
    }

    #[test]
    fn every_block_meets_velocity_ordering() {
        let mut p = Planner::new();
        let mut target = [0.0; AXES];
        for i in 1..6 {
            target[0] = i as f32 * 5.0;
            target[1] = (i % 2) as f32 * 5.0;
            p.mp_aline(target, 400.0, &axes(), GCodeState::default()).unwrap();
        }
        for i in 0..p.len() {
            let buf = p.buffer_at(i);
            assert!(buf.entry_velocity <= buf.cruise_velocity + 1e-3);
            assert!(buf.cruise_velocity + 1e-3 >= buf.exit_velocity);
            assert!(buf.entry_velocity >= 0.0 && buf.exit_velocity >= 0.0);
        }
    }

    #[test]
    fn queue_full_fatal_when_ring_entirely_occupied() {
        let mut p = Planner::new();
        for i in 0..PLANNER_BUFFER_POOL_SIZE {
            p.buffers[i].state = BufferState::Running;
        }
        p.count = PLANNER_BUFFER_POOL_SIZE;
        let err = p
            .mp_aline([1.0; AXES], 100.0, &axes(), GCodeState::default())
            .unwrap_err();
        assert_eq!(err, PlannerError::QueueFullFatal);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::kinematics::AxisConfig;
    use proptest::prelude::*;

    fn axes() -> [AxisConfig; AXES] {
        let mut cfg = AxisConfig::default();
        cfg.max_velocity = 500.0;
        cfg.max_jerk = 50_000_000.0;
        [cfg; AXES]
    }

    proptest! {
        /// §8 "back_plan is idempotent": running it twice over an unchanged
        /// ring must never move a buffer's velocities, for any sequence of
        /// committed moves.
        #[test]
        fn back_plan_is_idempotent_over_random_moves(
            deltas in proptest::collection::vec((-20.0f32..20.0, -20.0f32..20.0), 1..6),
        ) {
            let mut p = Planner::new();
            let axes = axes();
            for (dx, dy) in &deltas {
                let mut target = p.mm.position;
                target[0] += dx;
                target[1] += dy;
                let _ = p.mp_aline(target, 300.0, &axes, GCodeState::default());
            }
            if p.len() == 0 {
                return Ok(());
            }

            let before: heapless::Vec<f32, 8> = (0..p.len()).map(|i| p.buffer_at(i).entry_velocity).collect();
            p.back_plan();
            let after: heapless::Vec<f32, 8> = (0..p.len()).map(|i| p.buffer_at(i).entry_velocity).collect();
            for (a, b) in before.iter().zip(after.iter()) {
                prop_assert!((a - b).abs() < 1e-2, "before={a} after={b}");
            }
        }
    }
}
