//! Segment runtime (`mr`, §4.C): slices one planner block's head/body/tail
//! into fixed-duration segments, running a jerk-limited S-curve via
//! Kahan-compensated forward differencing.
//!
//! Only ISR-priority code touches this module's state once a block is
//! loaded; the foreground side only calls [`SegmentRuntime::load_block`] to
//! hand over a freshly trapezoid-computed block.

use crate::gcode_state::GCodeState;
use crate::kinematics::AXES;
use crate::trapezoid::Trapezoid;

/// Nominal segment duration, in minutes (matches `feed_rate`'s units so
/// `distance = velocity * time` stays dimensionally consistent). ~5 ms.
pub const NOM_SEGMENT_TIME: f32 = 5.0 / 60.0 / 1000.0;

/// Which third of the trapezoid the runtime is currently emitting segments for.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Section {
    Head,
    Body,
    Tail,
}

/// Whether the runtime is about to start a fresh section (and must
/// initialize its forward-difference coefficients) or is mid-section.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SectionState {
    NewSection,
    RunningSection,
}

/// Overall per-block move state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MoveState {
    Off,
    NewMove,
    Running,
}

/// Feed-hold state machine, §4.C: `OFF -> SYNC -> PLAN -> DECEL -> HOLD ->
/// END_HOLD -> OFF`. Queue-flush is only honored once `Hold` is reached;
/// cycle-start resumes from `EndHold`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HoldState {
    Off,
    Sync,
    Plan,
    Decel,
    Hold,
    EndHold,
}

/// A single Kahan-compensated running sum, used per forward-difference
/// level to bound accumulated rounding error across hundreds of segments.
/// Load-bearing for long machining runs; do not replace with a plain `f32`
/// accumulator (§9 design note).
#[derive(Debug, Default, Copy, Clone)]
struct Kahan {
    value: f32,
    compensation: f32,
}

impl Kahan {
    fn reset(value: f32) -> Self {
        Self { value, compensation: 0.0 }
    }

    fn add(&mut self, x: f32) {
        let y = x - self.compensation;
        let t = self.value + y;
        self.compensation = (t - self.value) - y;
        self.value = t;
    }
}

/// Forward-difference engine for one jerk-limited (head/tail) section.
///
/// A section with constant jerk has a position polynomial that is cubic in
/// time, so its third forward difference is constant. Seeding the first
/// three differences from four sampled points and then repeatedly summing
/// reproduces the exact polynomial's per-segment deltas without
/// re-evaluating cubes every segment.
#[derive(Debug, Default, Copy, Clone)]
struct ForwardDiff {
    d1: Kahan,
    d2: Kahan,
    d3: f32,
}

impl ForwardDiff {
    /// `entry_v` is the velocity at the start of the section; `jerk` is
    /// signed (positive while accelerating, negative while decelerating).
    fn init(entry_v: f32, jerk: f32, h: f32) -> Self {
        let pos = |n: f32| {
            let t = n * h;
            entry_v * t + (jerk / 6.0) * t * t * t
        };
        let p0 = pos(0.0);
        let p1 = pos(1.0);
        let p2 = pos(2.0);
        let p3 = pos(3.0);
        let fd1_0 = p1 - p0;
        let fd1_1 = p2 - p1;
        let fd1_2 = p3 - p2;
        let fd2_0 = fd1_1 - fd1_0;
        let fd2_1 = fd1_2 - fd1_1;
        let fd3 = fd2_1 - fd2_0;
        Self {
            d1: Kahan::reset(fd1_0),
            d2: Kahan::reset(fd2_0),
            d3: fd3,
        }
    }

    /// Returns this segment's position delta and advances to the next.
    fn next(&mut self) -> f32 {
        let delta = self.d1.value;
        self.d1.add(self.d2.value);
        self.d2.add(self.d3);
        delta
    }
}

/// One emitted segment: the scalar distance travelled along the block's
/// unit vector and the duration (minutes) it was emitted over.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SegmentOutput {
    pub distance: f32,
    pub segment_time: f32,
    pub velocity: f32,
    /// Per-axis position delta for this segment (`unit_vector * distance`),
    /// handed to segment prep for conversion into the motor domain.
    pub axis_delta: [f32; AXES],
}

/// Slices one planner block into ~`NOM_SEGMENT_TIME` segments.
pub struct SegmentRuntime {
    pub move_state: MoveState,
    pub section: Section,
    pub section_state: SectionState,
    pub hold_state: HoldState,

    unit_vector: [f32; AXES],
    block_start_position: [f32; AXES],
    position: [f32; AXES],
    position_kahan_c: [f32; AXES],

    /// Exact planned position at the head/body and body/tail boundaries
    /// (and the block's end), used to snap drift away when a section ends.
    waypoint: [[f32; AXES]; 3],

    head_length: f32,
    body_length: f32,
    tail_length: f32,
    entry_velocity: f32,
    cruise_velocity: f32,
    exit_velocity: f32,
    jerk: f32,

    segments_remaining: u32,
    segment_time: f32,
    distance_remaining_in_section: f32,
    fwd_diff: ForwardDiff,

    /// Distance left uncovered when a feedhold truncates the current block
    /// to a short jerk-limited stop well short of its original endpoint
    /// (§4.C). Zero once the block has either run to completion normally
    /// or been fully resumed after a hold.
    held_remainder: f32,
    /// The block's pre-hold cruise/exit velocities, preserved so
    /// [`Self::resume_held_block`] can re-trapezoid the remaining distance
    /// back up to the original targets instead of the decel profile's.
    saved_cruise_velocity: f32,
    saved_exit_velocity: f32,

    pub gcode_state: GCodeState,
}

impl Default for SegmentRuntime {
    fn default() -> Self {
        Self {
            move_state: MoveState::Off,
            section: Section::Head,
            section_state: SectionState::NewSection,
            hold_state: HoldState::Off,
            unit_vector: [0.0; AXES],
            block_start_position: [0.0; AXES],
            position: [0.0; AXES],
            position_kahan_c: [0.0; AXES],
            waypoint: [[0.0; AXES]; 3],
            head_length: 0.0,
            body_length: 0.0,
            tail_length: 0.0,
            entry_velocity: 0.0,
            cruise_velocity: 0.0,
            exit_velocity: 0.0,
            jerk: 0.0,
            segments_remaining: 0,
            segment_time: NOM_SEGMENT_TIME,
            distance_remaining_in_section: 0.0,
            fwd_diff: ForwardDiff::default(),
            held_remainder: 0.0,
            saved_cruise_velocity: 0.0,
            saved_exit_velocity: 0.0,
            gcode_state: GCodeState::default(),
        }
    }
}

impl SegmentRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> [f32; AXES] {
        self.position
    }

    /// Loads a freshly computed trapezoid, unit vector and starting position
    /// into the runtime and arms the first non-empty section.
    #[allow(clippy::too_many_arguments)]
    pub fn load_block(
        &mut self,
        trapezoid: &Trapezoid,
        unit_vector: [f32; AXES],
        start_position: [f32; AXES],
        jerk: f32,
        gcode_state: GCodeState,
    ) {
        self.unit_vector = unit_vector;
        self.block_start_position = start_position;
        self.position = start_position;
        self.position_kahan_c = [0.0; AXES];

        self.head_length = trapezoid.head_length;
        self.body_length = trapezoid.body_length;
        self.tail_length = trapezoid.tail_length;
        self.entry_velocity = trapezoid.entry_velocity;
        self.cruise_velocity = trapezoid.cruise_velocity;
        self.exit_velocity = trapezoid.exit_velocity;
        self.jerk = jerk;
        self.gcode_state = gcode_state;

        let mut cum = 0.0;
        cum += self.head_length;
        self.waypoint[0] = offset(start_position, unit_vector, cum);
        cum += self.body_length;
        self.waypoint[1] = offset(start_position, unit_vector, cum);
        cum += self.tail_length;
        self.waypoint[2] = offset(start_position, unit_vector, cum);

        self.move_state = MoveState::NewMove;
        self.section = if self.head_length > 0.0 {
            Section::Head
        } else if self.body_length > 0.0 {
            Section::Body
        } else {
            Section::Tail
        };
        self.section_state = SectionState::NewSection;
    }

    fn section_length(&self, section: Section) -> f32 {
        match section {
            Section::Head => self.head_length,
            Section::Body => self.body_length,
            Section::Tail => self.tail_length,
        }
    }

    fn waypoint_for(&self, section: Section) -> [f32; AXES] {
        match section {
            Section::Head => self.waypoint[0],
            Section::Body => self.waypoint[1],
            Section::Tail => self.waypoint[2],
        }
    }

    fn arm_section(&mut self) {
        let length = self.section_length(self.section);
        let avg_v = match self.section {
            Section::Head => (self.entry_velocity + self.cruise_velocity).max(1e-6) / 2.0,
            Section::Body => self.cruise_velocity.max(1e-6),
            Section::Tail => (self.cruise_velocity + self.exit_velocity).max(1e-6) / 2.0,
        };
        let section_time = if avg_v > 1e-9 { length / avg_v } else { 0.0 };
        let segments = (section_time / NOM_SEGMENT_TIME).round().max(1.0) as u32;
        self.segments_remaining = segments;
        self.segment_time = if segments > 0 {
            section_time / segments as f32
        } else {
            NOM_SEGMENT_TIME
        };
        self.distance_remaining_in_section = length;

        match self.section {
            Section::Head => {
                self.fwd_diff = ForwardDiff::init(self.entry_velocity, self.jerk, self.segment_time);
            }
            Section::Tail => {
                self.fwd_diff =
                    ForwardDiff::init(self.cruise_velocity, -self.jerk, self.segment_time);
            }
            Section::Body => {
                // Constant velocity; no forward-difference machinery needed.
            }
        }
        self.section_state = SectionState::RunningSection;
    }

    fn advance_section(&mut self) -> bool {
        let waypoint = self.waypoint_for(self.section);
        self.position = waypoint;
        self.position_kahan_c = [0.0; AXES];

        self.section = match self.section {
            Section::Head => {
                if self.body_length > 0.0 {
                    Section::Body
                } else if self.tail_length > 0.0 {
                    Section::Tail
                } else {
                    return false;
                }
            }
            Section::Body => {
                if self.tail_length > 0.0 {
                    Section::Tail
                } else {
                    return false;
                }
            }
            Section::Tail => return false,
        };
        self.section_state = SectionState::NewSection;
        true
    }

    /// Produces the next segment's scalar distance/time/velocity, advancing
    /// through head -> body -> tail and snapping to the stored waypoint at
    /// each boundary. Returns `None` once the block is fully emitted.
    pub fn next_segment(&mut self) -> Option<SegmentOutput> {
        if self.move_state == MoveState::Off {
            return None;
        }
        self.move_state = MoveState::Running;

        loop {
            if self.segments_remaining == 0 && self.section_state == SectionState::RunningSection {
                if !self.advance_section() {
                    self.move_state = MoveState::Off;
                    return None;
                }
            }
            if self.section_state == SectionState::NewSection {
                if self.section_length(self.section) <= 0.0 {
                    if !self.advance_section() {
                        self.move_state = MoveState::Off;
                        return None;
                    }
                    continue;
                }
                self.arm_section();
            }
            break;
        }

        let (distance, velocity) = match self.section {
            Section::Body => {
                let d = (self.cruise_velocity * self.segment_time)
                    .min(self.distance_remaining_in_section);
                (d, self.cruise_velocity)
            }
            _ => {
                let d = self
                    .fwd_diff
                    .next()
                    .min(self.distance_remaining_in_section)
                    .max(0.0);
                let v = if self.segment_time > 1e-12 {
                    d / self.segment_time
                } else {
                    0.0
                };
                (d, v)
            }
        };

        self.distance_remaining_in_section = (self.distance_remaining_in_section - distance).max(0.0);
        self.segments_remaining = self.segments_remaining.saturating_sub(1);

        let mut axis_delta = [0.0; AXES];
        for i in 0..AXES {
            let step = self.unit_vector[i] * distance;
            axis_delta[i] = step;
            let y = step - self.position_kahan_c[i];
            let t = self.position[i] + y;
            self.position_kahan_c[i] = (t - self.position[i]) - y;
            self.position[i] = t;
        }

        Some(SegmentOutput {
            distance,
            segment_time: self.segment_time,
            velocity,
            axis_delta,
        })
    }

    /// Requests a feedhold: the runtime is told to decelerate to zero
    /// within whatever length remains in the current block. The caller
    /// (canonical machine) drives the state machine forward via
    /// [`Self::hold_state`]; this just flips the entry state.
    pub fn request_hold(&mut self) {
        if self.hold_state == HoldState::Off {
            self.hold_state = HoldState::Sync;
        }
    }

    /// Replans the remainder of the current block to decelerate to zero
    /// using the active jerk, over the shortest distance the jerk limit
    /// allows rather than stretching the stop across the block's full
    /// remaining length — a feedhold must stop quickly, within "the
    /// jerk-limited deceleration distance from the point of request"
    /// (§8 scenario 2), not coast gently all the way to the original
    /// target. Whatever distance is left over after that short stop is
    /// recorded in [`Self::held_remainder`] for [`Self::resume_held_block`]
    /// to pick back up on cycle-start. Called once `hold_state` reaches
    /// `Plan`.
    pub fn replan_for_hold(&mut self) {
        let remaining = self.distance_remaining_in_section
            + match self.section {
                Section::Head => self.body_length + self.tail_length,
                Section::Body => self.tail_length,
                Section::Tail => 0.0,
            };
        let current_v = match self.section {
            Section::Head | Section::Tail => {
                if self.segment_time > 1e-12 {
                    self.fwd_diff.d1.value / self.segment_time
                } else {
                    self.cruise_velocity
                }
            }
            Section::Body => self.cruise_velocity,
        };

        self.saved_cruise_velocity = self.cruise_velocity;
        self.saved_exit_velocity = self.exit_velocity;

        let stop_distance = crate::trapezoid::accel_length(current_v, 0.0, self.jerk).min(remaining);
        self.held_remainder = remaining - stop_distance;

        let t = crate::trapezoid::compute_trapezoid(stop_distance, current_v, current_v, 0.0, self.jerk);
        self.head_length = 0.0;
        self.body_length = t.head_length + t.body_length;
        self.tail_length = t.tail_length;
        self.entry_velocity = t.entry_velocity;
        self.cruise_velocity = t.entry_velocity;
        self.exit_velocity = 0.0;
        self.section = Section::Body;
        self.section_state = SectionState::NewSection;
        self.waypoint[1] = offset(self.position, self.unit_vector, self.body_length);
        self.waypoint[2] = offset(self.position, self.unit_vector, self.body_length + t.tail_length);
        self.hold_state = HoldState::Decel;
    }

    pub fn enter_hold(&mut self) {
        self.hold_state = HoldState::Hold;
    }

    /// Distance left uncovered by the short jerk-limited stop
    /// [`Self::replan_for_hold`] performed; zero once the held block has
    /// been fully resumed or the hold caught the block exactly at its
    /// original endpoint.
    pub fn held_remainder(&self) -> f32 {
        self.held_remainder
    }

    /// The in-flight block's current planned exit velocity; used to seed
    /// [`crate::planner::Planner::resume_from_hold`] so the next queued
    /// buffer's entry matches whatever this block hands off, whether that's
    /// a full stop or a resumed exit short of completion.
    pub fn exit_velocity(&self) -> f32 {
        self.exit_velocity
    }

    /// Resumes a block paused mid-flight by a feedhold (§4.C: "cycle-start
    /// resumes by replanning... from zero"): re-trapezoids the distance
    /// left uncovered from a standstill back up to the block's original
    /// cruise/exit velocities and re-arms the runtime to keep emitting
    /// segments for it, continuing toward the same endpoint the original
    /// move targeted.
    pub fn resume_held_block(&mut self) {
        let remaining = self.held_remainder;
        self.held_remainder = 0.0;

        let t = crate::trapezoid::compute_trapezoid(
            remaining,
            0.0,
            self.saved_cruise_velocity,
            self.saved_exit_velocity,
            self.jerk,
        );
        self.head_length = t.head_length;
        self.body_length = t.body_length;
        self.tail_length = t.tail_length;
        self.entry_velocity = t.entry_velocity;
        self.cruise_velocity = t.cruise_velocity;
        self.exit_velocity = t.exit_velocity;

        let mut cum = 0.0;
        cum += self.head_length;
        self.waypoint[0] = offset(self.position, self.unit_vector, cum);
        cum += self.body_length;
        self.waypoint[1] = offset(self.position, self.unit_vector, cum);
        cum += self.tail_length;
        self.waypoint[2] = offset(self.position, self.unit_vector, cum);

        self.section = if self.head_length > 0.0 {
            Section::Head
        } else if self.body_length > 0.0 {
            Section::Body
        } else {
            Section::Tail
        };
        self.section_state = SectionState::NewSection;
        self.move_state = MoveState::Running;
        self.hold_state = HoldState::Off;
    }

    /// Cycle-start after a hold: resumes by telling the caller the
    /// remaining blocks must replan from zero (the runtime itself only
    /// tracks its own in-flight block).
    pub fn end_hold(&mut self) {
        self.hold_state = HoldState::EndHold;
    }

    pub fn clear_hold(&mut self) {
        self.hold_state = HoldState::Off;
    }
}

fn offset(start: [f32; AXES], unit: [f32; AXES], distance: f32) -> [f32; AXES] {
    let mut out = start;
    for i in 0..AXES {
        out[i] += unit[i] * distance;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trapezoid::compute_trapezoid;

    fn unit_x() -> [f32; AXES] {
        let mut u = [0.0; AXES];
        u[0] = 1.0;
        u
    }

    #[test]
    fn body_only_block_sums_to_length() {
        let mut mr = SegmentRuntime::new();
        let t = compute_trapezoid(10.0, 50.0, 50.0, 50.0, 1000.0);
        mr.load_block(&t, unit_x(), [0.0; AXES], 1000.0, GCodeState::default());
        let mut total = 0.0;
        while let Some(seg) = mr.next_segment() {
            total += seg.distance;
        }
        assert!((total - 10.0).abs() < 1e-2, "total={total}");
    }

    #[test]
    fn head_body_tail_block_reaches_end_position() {
        let mut mr = SegmentRuntime::new();
        let t = compute_trapezoid(50.0, 0.0, 100.0, 0.0, 5000.0);
        mr.load_block(&t, unit_x(), [0.0; AXES], 5000.0, GCodeState::default());
        while mr.next_segment().is_some() {}
        let pos = mr.position();
        assert!((pos[0] - 50.0).abs() < 0.5, "pos={:?}", pos);
    }

    #[test]
    fn waypoint_snap_prevents_drift() {
        let mut mr = SegmentRuntime::new();
        let t = compute_trapezoid(50.0, 0.0, 100.0, 0.0, 5000.0);
        mr.load_block(&t, unit_x(), [0.0; AXES], 5000.0, GCodeState::default());
        let mut last_section = mr.section;
        while mr.next_segment().is_some() {
            if mr.section != last_section {
                last_section = mr.section;
            }
        }
        assert_eq!(mr.move_state, MoveState::Off);
    }
}
