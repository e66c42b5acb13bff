#![deny(clippy::all)]
#![cfg_attr(not(feature = "std"), no_std)]

//! # Line protocol
//!
//! The external interface of §6: a line-oriented protocol over a byte
//! transport. Input is G-code blocks and control commands, one per line,
//! terminated by LF; a handful of single-byte immediate controls (`!`,
//! `~`, `%`, 0x18, XON/XOFF) are intercepted before a line ever reaches a
//! parser. Output is status/exception/queue/rx reports.
//!
//! The G-code tokenizer and the text/JSON serializer are excluded
//! collaborators (§1); this crate frames bytes into lines and immediate
//! controls, and defines the wire *shape* of reports. It does not parse
//! G-code and does not render JSON or text itself.
//!
//! ## Key components
//!
//! - [`framing`]: a streaming [`framing::LineFramer`] that finds LF-terminated
//!   lines in a byte stream and intercepts immediate controls inline.
//! - [`reports`]: wire-shape structs for status, exception, queue and rx
//!   reports (§4.H/§6).
//! - [`crc`]: a `const fn` CRC16-CCITT, usable as an optional integrity
//!   check by a transport layer outside this crate's scope.

pub mod crc;
pub mod framing;
pub mod reports;

pub use framing::{ImmediateControl, LineFramer, MAX_LINE_LENGTH};

/// Common error type for the protocol crate.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum Error {
    /// A line exceeded [`MAX_LINE_LENGTH`] before a terminator was seen.
    #[cfg_attr(feature = "std", error("line too long"))]
    LineTooLong,
    /// A buffer was too small for the requested operation.
    #[cfg_attr(feature = "std", error("buffer too small"))]
    BufferTooSmall,
}
