#![no_std]

//! Library half of the firmware crate: exposes [`safety`] and
//! [`fixed_point`] so integration tests (`tests/`) can exercise them
//! without pulling in the RTIC app, which needs a real device.

pub mod fixed_point;
pub mod safety;
