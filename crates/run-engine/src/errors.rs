//! Engine error taxonomy.
//!
//! Transient locator/navigation failures are retried within a phase;
//! everything else propagates to the runner, which finalizes the run state
//! and emits a terminal event with full phase/dispenser/grade context.

use calibra_core_types::RunId;
use form_locator::LocatorError;
use portal_session::SessionError;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum EngineError {
    /// Control resolution failed; see [`LocatorError`] for retryability.
    #[error(transparent)]
    Locator(#[from] LocatorError),

    /// Session-level failure (navigation timeout, crash, auth).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The work order carries no visit URL to open.
    #[error("work order {0} has no visit URL")]
    MissingVisit(String),

    /// No such run in the registry.
    #[error("unknown run: {0}")]
    UnknownRun(RunId),

    /// Control request does not apply to the run's current status.
    #[error("run {run} is {status}, cannot {request}")]
    InvalidControl {
        run: RunId,
        status: String,
        request: String,
    },

    /// Batch checkpoint could not be read or written.
    #[error("batch checkpoint error: {0}")]
    Checkpoint(String),
}

impl EngineError {
    /// Whether the failing phase may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Locator(err) => err.is_retryable(),
            EngineError::Session(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Whether the session is beyond recovery.
    pub fn is_fatal_session(&self) -> bool {
        match self {
            EngineError::Session(err) => err.is_fatal(),
            EngineError::Locator(LocatorError::Session(err)) => err.is_fatal(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_exhaustion_is_not_retryable_again() {
        let err = EngineError::Locator(LocatorError::Exhausted {
            reference: "equipment-select".to_string(),
        });
        assert!(!err.is_retryable());
        assert!(!err.is_fatal_session());
    }

    #[test]
    fn navigation_timeout_is_retryable() {
        let err = EngineError::Session(SessionError::NavigationTimeout {
            target: "visit".to_string(),
        });
        assert!(err.is_retryable());
    }

    #[test]
    fn crash_is_fatal() {
        let err = EngineError::Session(SessionError::Crashed("gone".to_string()));
        assert!(err.is_fatal_session());
        assert!(!err.is_retryable());
    }
}
