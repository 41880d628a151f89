//! Error types for the form locator.

use portal_session::SessionError;
use thiserror::Error;

/// Locator error enumeration.
#[derive(Debug, Error, Clone)]
pub enum LocatorError {
    /// Every strategy and every retry attempt was exhausted. Always tagged
    /// with the logical reference name and always reported upstream.
    #[error("control not found after all strategies and retries: {reference}")]
    Exhausted { reference: String },

    /// A single strategy pass found nothing this attempt.
    #[error("strategy '{strategy}' failed for {reference}: {reason}")]
    StrategyFailed {
        strategy: String,
        reference: String,
        reason: String,
    },

    /// The control was found but no dropdown option matched the target.
    #[error("no option matching '{target}' in {reference}")]
    NoMatchingOption { reference: String, target: String },

    /// Session-level failure while driving the control.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl LocatorError {
    /// Transient failures are retried within the current phase.
    pub fn is_retryable(&self) -> bool {
        match self {
            LocatorError::Session(err) => err.is_retryable(),
            LocatorError::StrategyFailed { .. } => true,
            LocatorError::Exhausted { .. } | LocatorError::NoMatchingOption { .. } => false,
        }
    }

    /// The logical reference this failure is tagged with, when known.
    pub fn reference(&self) -> Option<&str> {
        match self {
            LocatorError::Exhausted { reference }
            | LocatorError::StrategyFailed { reference, .. }
            | LocatorError::NoMatchingOption { reference, .. } => Some(reference),
            LocatorError::Session(_) => None,
        }
    }
}
