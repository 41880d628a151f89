//! Domain rule engine: fuel-grade taxonomy, equipment-assignment priority
//! rules, and job-type routing by service code.
//!
//! Everything in this crate is pure and total: same inputs always yield the
//! same output, and no function here can fail a run. Unknown input degrades
//! to a documented safe default instead.

pub mod classifier;
pub mod equipment;
pub mod router;
pub mod tables;

pub use classifier::{classify, FuelGradeClassification, GradeType};
pub use equipment::{is_ethanol_free, resolve_equipment};
pub use router::{route, FormType, RoutePlan};
pub use tables::{EquipmentPreference, EquipmentPreferenceTable, GradeTables};
