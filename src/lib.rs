//! CLI shell around the calibration form automation engine.

pub mod config;
pub mod input;
pub mod portal;

pub use config::AppConfig;
pub use input::{load_batch_input, load_run_input, RunInput};
pub use portal::{script_for, ScriptQueueFactory};
