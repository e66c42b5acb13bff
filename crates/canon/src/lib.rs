//! # Canonical machine
//!
//! The canonical-machine layer (§3 "Canonical-machine singleton", §4.G):
//! the singleton owning MODEL G-code state, per-axis and per-coordinate-
//! system configuration, the machine/cycle/motion/hold state machines, and
//! the entry points a caller (a demo CLI, `sim`, or firmware foreground
//! loop) drives to turn commands into planner commits.
//!
//! The G-code tokenizer and the text/JSON report serializer are excluded
//! collaborators (§1) — this crate exposes typed Rust entry points, not a
//! text parser, and produces [`proto::reports`] data structs, not rendered
//! output.

pub mod config;
pub mod dispatch;
pub mod errors;
pub mod machine;
pub mod reports;

pub use dispatch::Dispatcher;
pub use errors::CanonError;
pub use machine::CanonicalMachine;
