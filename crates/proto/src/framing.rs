//! Byte-stream framing: LF-terminated lines plus single-byte immediate
//! controls, per §6.
//!
//! Immediate controls are intercepted *before* they reach a line buffer —
//! they never appear inside a [`Frame::Line`], even if sent mid-line. This
//! mirrors the source's read loop, which special-cases these bytes ahead
//! of the G-code parser rather than routing them through it.

use crate::Error;

/// Maximum length of a single line, including neither the LF terminator
/// nor any trailing CR. A line longer than this is a framing error, not a
/// silently truncated one.
pub const MAX_LINE_LENGTH: usize = 255;

/// A single-byte immediate control, intercepted ahead of the line parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmediateControl {
    /// `!` — request feedhold.
    FeedHold,
    /// `~` — request cycle start.
    CycleStart,
    /// `%` — request queue flush.
    QueueFlush,
    /// `^X` (0x18) — hard reset.
    HardReset,
    /// XOFF (0x13) — pause transmission.
    XOff,
    /// XON (0x11) — resume transmission.
    XOn,
}

impl ImmediateControl {
    /// Classifies a byte as an immediate control, if it is one.
    pub const fn classify(byte: u8) -> Option<Self> {
        match byte {
            b'!' => Some(Self::FeedHold),
            b'~' => Some(Self::CycleStart),
            b'%' => Some(Self::QueueFlush),
            0x18 => Some(Self::HardReset),
            0x13 => Some(Self::XOff),
            0x11 => Some(Self::XOn),
            _ => None,
        }
    }
}

/// A unit of framed input: either a complete line (sans terminator) or an
/// intercepted immediate control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    /// A complete, LF-terminated line of input with any trailing CR and
    /// the LF itself stripped. May be empty (a bare blank line).
    Line(&'a [u8]),
    /// An intercepted single-byte immediate control.
    Immediate(ImmediateControl),
}

/// Incremental line/immediate-control framer over a fixed-capacity buffer.
///
/// `N` bounds the longest line this framer can accumulate; exceeding it
/// without seeing a terminator is a [`Error::LineTooLong`] framing error,
/// after which the framer discards everything up to the next LF so it can
/// resynchronize.
pub struct LineFramer<const N: usize = MAX_LINE_LENGTH> {
    buf: heapless::Vec<u8, N>,
    resyncing: bool,
}

impl<const N: usize> Default for LineFramer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> LineFramer<N> {
    pub fn new() -> Self {
        Self {
            buf: heapless::Vec::new(),
            resyncing: false,
        }
    }

    /// Feeds one byte. Returns `Ok(Some(frame))` when a line or immediate
    /// control completes, `Ok(None)` while still accumulating a line, and
    /// `Err` when the in-progress line overflowed `N` (the framer then
    /// discards input up to the next LF before resuming).
    pub fn push(&mut self, byte: u8) -> Result<Option<Frame<'_>>, Error> {
        if let Some(ctl) = ImmediateControl::classify(byte) {
            return Ok(Some(Frame::Immediate(ctl)));
        }

        if byte == b'\n' {
            if self.resyncing {
                // The overflow was already reported when it happened;
                // this terminator just ends the resync, discarding the
                // truncated line without reporting it again.
                self.resyncing = false;
                self.buf.clear();
                return Ok(None);
            }
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
            // SAFETY-free: returning a borrow from self requires NLL; use
            // an index-based slice of the retained buffer instead.
            return Ok(Some(Frame::Line(self.buf.as_slice())));
        }

        if self.resyncing {
            return Ok(None);
        }

        if self.buf.push(byte).is_err() {
            self.resyncing = true;
            return Err(Error::LineTooLong);
        }

        Ok(None)
    }

    /// Clears the line accumulated so far without emitting it (used after
    /// consuming a [`Frame::Line`], since the borrow returned by [`Self::push`]
    /// ties up `self` until the caller is done with it).
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Feeds a whole byte slice, invoking `on_frame` for each completed
    /// frame. The callback must copy out any [`Frame::Line`] payload it
    /// needs to keep, since the backing buffer is cleared before the next
    /// byte is processed.
    pub fn feed(&mut self, bytes: &[u8], mut on_frame: impl FnMut(Result<Frame<'_>, Error>)) {
        for &byte in bytes {
            match self.push(byte) {
                Ok(Some(Frame::Line(_))) => {
                    // Re-borrow under a fresh call so `on_frame` sees a
                    // lifetime scoped to this iteration, not `push`'s.
                    on_frame(Ok(Frame::Line(self.buf.as_slice())));
                    self.clear();
                }
                Ok(Some(frame @ Frame::Immediate(_))) => on_frame(Ok(frame)),
                Ok(None) => {}
                Err(e) => on_frame(Err(e)),
            }
        }
    }
}
