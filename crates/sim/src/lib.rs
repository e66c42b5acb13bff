//! # In-process simulation harness
//!
//! Drives `canon` + `motion` + `mcu-drivers::stepper` against a virtual
//! [`StepperBackend`](stepper::StepperBackend) entirely in one process, for
//! offline scenario testing and CI without physical hardware or a separate
//! MCU process to talk to.
//!
//! A fake-backend component plus a trace-recording harness pair,
//! generalized from a Unix-socket fake serial MCU to an in-process virtual
//! backend: there is no separate MCU process to simulate over a socket, the
//! whole pipeline runs in one address space.

pub mod backend;
pub mod harness;

pub use backend::RecordingBackend;
pub use harness::{SimMachine, TraceEntry};
