//! Session error taxonomy.

use thiserror::Error;

/// Errors surfaced by a portal session.
#[derive(Debug, Error, Clone)]
pub enum SessionError {
    /// Page or section failed to load in time. Retried, then fatal.
    #[error("navigation timed out: {target}")]
    NavigationTimeout { target: String },

    /// The session itself is unusable. Fatal, never retried.
    #[error("session crashed: {0}")]
    Crashed(String),

    /// Portal rejected the credentials.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// A previously described control is no longer present.
    #[error("control gone: {0}")]
    ControlGone(String),

    /// Transport-level failure talking to the portal.
    #[error("session io error: {0}")]
    Io(String),
}

impl SessionError {
    /// Transient errors are retried within a phase; a crash never is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::NavigationTimeout { .. }
                | SessionError::ControlGone(_)
                | SessionError::Io(_)
        )
    }

    /// Fatal errors end the run immediately as `Error`.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Crashed(_) | SessionError::AuthFailed(_))
    }
}
