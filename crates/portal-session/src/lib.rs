//! Port abstraction over the external scheduling portal.
//!
//! The portal is an uncontrolled, single-threaded visual surface; this crate
//! models it as an async trait over a weakly-typed control-description
//! snapshot, so everything above it stays testable without a live browser.

pub mod control;
pub mod errors;
pub mod ports;
pub mod retry;

#[cfg(any(test, feature = "fake"))]
pub mod fake;

pub use control::{ControlDescription, ControlKind};
pub use errors::SessionError;
pub use ports::{Credentials, PortalSession, SessionFactory, SessionOptions};
pub use retry::RetryPolicy;
