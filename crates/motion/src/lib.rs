//! # Motion core
//!
//! The canonical-machine-facing motion pipeline: per-axis kinematics and
//! configuration, jerk-limited trapezoid generation, the planner ring with
//! junction-deviation lookahead, the segment runtime that slices a planned
//! block into fixed-duration segments via Kahan-stable forward differencing,
//! and segment prep that converts a runtime segment into DDA-ready integer
//! substep increments.
//!
//! `no_std` by default so it runs unmodified on the MCU; the `std` feature
//! enables host-side tooling (the `sim` crate, batch G-code processing).

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod error;
pub mod gcode_state;
pub mod kinematics;
pub mod planner;
pub mod prep;
pub mod runtime;
pub mod trapezoid;

pub use error::PlannerError;
pub use gcode_state::{ActiveModel, ExtendedModel, GCodeState, ModalState};
pub use kinematics::{Axis, AxisConfig, AxisMode, CartesianKinematics, Kinematics, AXES};
pub use planner::{Planner, PlannerBuffer, QueuedCommand};
pub use runtime::SegmentRuntime;
pub use trapezoid::Trapezoid;
