//! Element locator for the portal's calibration forms.
//!
//! Resolves a logical control reference ("the equipment selector, not the
//! fuel-grade selector") to a live control through an ordered list of pure
//! strategies over control descriptions, with bounded retry and a
//! keyboard-navigation fallback for dropdown selection.

pub mod errors;
pub mod resolver;
pub mod strategies;
pub mod types;

pub use errors::LocatorError;
pub use resolver::ControlLocator;
pub use strategies::{locate_candidates, options_look_like_fuel_grades};
pub use types::{Candidate, ControlRef, LocatorStrategy};
