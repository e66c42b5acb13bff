//! The §7 error taxonomy, as seen by a caller of the canonical machine's
//! entry points. Text/JSON rendering of these into an exception report
//! belongs to the excluded serializer collaborator (§1); this crate only
//! distinguishes cases that change control flow.

use thiserror::Error;

/// Parse/semantic errors raised while applying a single block to MODEL.
/// The block is rejected, MODEL is left unchanged, motion continues (§7).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InputError {
    #[error("malformed number")]
    MalformedNumber,
    #[error("unrecognized token")]
    UnrecognizedToken,
    #[error("value out of range")]
    ValueOutOfRange,
    #[error("missing feed rate")]
    MissingFeedRate,
    #[error("modal group violation")]
    ModalGroupViolation,
    #[error("arc specification error")]
    ArcSpecificationError,
    #[error("soft limit exceeded on axis {0}")]
    SoftLimitExceeded(usize),
}

/// A command was rejected because the machine is in a state that does not
/// allow it (§7).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    #[error("command not accepted in current machine state")]
    CommandNotAccepted,
    #[error("bad status report setting")]
    BadStatusReportSetting,
}

/// Resource exhaustion, distinguished from [`StateError`] because the
/// caller's retry policy differs: transient errors should retry with flow
/// control, fatal ones should not (§7).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ResourceError {
    #[error("planner ring full, transient")]
    BufferFull,
    #[error("planner ring full, no forward progress possible")]
    BufferFullFatal,
}

/// Top-level error returned by canonical-machine entry points, aggregating
/// the §7 taxonomy. [`CanonError::Corruption`] is always fatal: the caller
/// should treat it as a hard alarm.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CanonError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error("magic-number corruption detected")]
    Corruption,
}

impl From<motion::PlannerError> for CanonError {
    fn from(e: motion::PlannerError) -> Self {
        match e {
            motion::PlannerError::QueueFull => CanonError::Resource(ResourceError::BufferFull),
            motion::PlannerError::QueueFullFatal => {
                CanonError::Resource(ResourceError::BufferFullFatal)
            }
            motion::PlannerError::InvalidMove => {
                CanonError::Input(InputError::ArcSpecificationError)
            }
            motion::PlannerError::SoftLimitExceeded(axis) => {
                CanonError::Input(InputError::SoftLimitExceeded(axis))
            }
            motion::PlannerError::CommandNotAccepted => {
                CanonError::State(StateError::CommandNotAccepted)
            }
            motion::PlannerError::Corruption => CanonError::Corruption,
        }
    }
}
