//! Wire *shapes* of the reports emitted per §4.H/§6.
//!
//! These are plain data structs describing what goes out over the wire;
//! rendering them as text-mode multi-line output or JSON-mode objects is
//! the excluded serializer collaborator's job (§1). A caller with a
//! serializer reaches into these fields (or, with the `serde` feature,
//! derives `Serialize` directly).

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximum number of status-report token slots, matching the ring's
/// `PLANNER_BUFFER_POOL_SIZE`-scale bound on configurability (§4.H: "a
/// configurable list of up to N token indices").
pub const SR_MAX_TOKENS: usize = 24;

/// One value carried in a status report. The tag identifies which MODEL
/// field it reflects; interpretation of the tag namespace belongs to the
/// excluded config/serializer collaborator, so this crate just carries an
/// opaque small integer token id alongside the value.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StatusToken {
    pub token_id: u16,
    pub value: StatusValue,
}

/// A status value's wire representation. Kept as a small closed set
/// rather than a trait object so the report stays allocation-free.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StatusValue {
    Float(f32),
    Int(i32),
    Bool(bool),
}

/// Whether a status report carries every configured token or only the
/// ones whose value changed since the last report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StatusReportKind {
    /// Every configured token, regardless of change.
    Verbose,
    /// Only tokens whose value changed since the last emitted report
    /// (except `stat`, which always emits on PROGRAM_STOP/PROGRAM_END).
    Filtered,
}

/// A status report (`{"sr": {...}}`): a bounded list of token/value pairs.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StatusReport {
    pub kind: StatusReportKind,
    pub tokens: heapless::Vec<StatusToken, SR_MAX_TOKENS>,
}

impl StatusReport {
    pub fn new(kind: StatusReportKind) -> Self {
        Self {
            kind,
            tokens: heapless::Vec::new(),
        }
    }

    /// Appends a token, silently dropping it if the report is already at
    /// [`SR_MAX_TOKENS`] capacity (a misconfiguration, not a runtime
    /// error: the configured token list is bounded at config time by the
    /// excluded config collaborator).
    pub fn push(&mut self, token: StatusToken) {
        let _ = self.tokens.push(token);
    }
}

/// An exception report (`{"er": {...}}`), always emitted in JSON shape
/// regardless of text/JSON mode so external controllers can synchronize
/// state (§7 "user-visible behavior").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExceptionReport {
    /// Firmware build identifier.
    pub build: u32,
    /// Status code from the §7 error taxonomy.
    pub status: StatusCode,
}

/// A closed taxonomy of status codes carried in an [`ExceptionReport`],
/// mirroring §7's input/state/resource/corruption/hardware split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u16)]
pub enum StatusCode {
    Ok = 0,
    MalformedNumber = 1,
    UnrecognizedToken = 2,
    ValueOutOfRange = 3,
    MissingFeedRate = 4,
    ModalGroupViolation = 5,
    ArcSpecificationError = 6,
    SoftLimitExceeded = 7,
    CommandNotAccepted = 8,
    BadStatusReportSetting = 9,
    BufferFullFatal = 10,
    BufferFull = 11,
    Corruption = 12,
    FollowingErrorExceeded = 13,
    MotorStall = 14,
    PowerSupplyFault = 15,
}

/// A queue report (`{"qr": n}` or `{"qr": n, "qi": added, "qo": removed}`),
/// per §4.H. The triple form is used for the detailed variant; the single
/// form omits `added`/`removed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct QueueReport {
    pub depth: u8,
    pub added_removed: Option<(u8, u8)>,
}

impl QueueReport {
    pub const fn depth_only(depth: u8) -> Self {
        Self {
            depth,
            added_removed: None,
        }
    }

    pub const fn triple(depth: u8, added: u8, removed: u8) -> Self {
        Self {
            depth,
            added_removed: Some((added, removed)),
        }
    }
}

/// A one-shot free-space report (`{"rx": bytes_free}`), triggered after a
/// queue flush (§4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RxReport {
    pub bytes_free: u32,
}
