//! Fuel grade classifier.
//!
//! Classification of a grade depends on the full grade set of its dispenser
//! ("Premium" shares the Regular prover when a Super/Ultra blend source is
//! present), so results are derived per dispenser and never cached per
//! grade in isolation.

use calibra_core_types::normalize_grade;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::tables::GradeTables;

/// Whether a grade requires iterative flow-rate calibration or a simpler
/// check.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GradeType {
    Metered,
    NonMetered,
}

/// Number of calibration iterations driven for a metered grade.
pub const METERED_ITERATIONS: u32 = 5;
/// Number of check iterations driven for a non-metered grade.
pub const NON_METERED_ITERATIONS: u32 = 3;

/// Derived classification for one fuel grade on one dispenser.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FuelGradeClassification {
    pub grade_type: GradeType,
    pub iterations: u32,
    /// Premium sharing its assignment with Regular instead of getting a
    /// dedicated prover.
    pub use_alternate_equipment: bool,
}

impl FuelGradeClassification {
    fn metered() -> Self {
        Self {
            grade_type: GradeType::Metered,
            iterations: METERED_ITERATIONS,
            use_alternate_equipment: false,
        }
    }

    fn non_metered(use_alternate_equipment: bool) -> Self {
        Self {
            grade_type: GradeType::NonMetered,
            iterations: NON_METERED_ITERATIONS,
            use_alternate_equipment,
        }
    }
}

/// Classify one grade label given every grade label present on the same
/// dispenser. Pure and idempotent; unknown labels fall back to metered.
pub fn classify(grade: &str, siblings: &[String], tables: &GradeTables) -> FuelGradeClassification {
    let normalized = normalize_grade(grade);

    let metered = tables.matches_metered(&normalized);
    let non_metered = tables.matches_non_metered(&normalized);
    if metered && non_metered {
        // Both lists claim the label; metered wins by priority order.
        warn!(grade = %grade, "grade label matches both classification lists");
    }

    if metered {
        return FuelGradeClassification::metered();
    }
    if non_metered {
        return FuelGradeClassification::non_metered(false);
    }

    if normalized.contains("premium") {
        if has_super_sibling(siblings) {
            return FuelGradeClassification::non_metered(true);
        }
        return FuelGradeClassification::metered();
    }

    FuelGradeClassification::metered()
}

/// Does the dispenser carry a Super/Ultra blend source?
pub fn has_super_sibling(siblings: &[String]) -> bool {
    siblings.iter().any(|label| {
        let normalized = normalize_grade(label);
        normalized.contains("super") || normalized.contains("ultra")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grades(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn metered_list_classifies_regardless_of_siblings() {
        let tables = GradeTables::default();
        let siblings = grades(&["Regular", "Plus", "Premium", "Super", "Diesel"]);
        for label in ["Regular", "Diesel", "Super", "Ultra 93", "Ethanol Free 90", "Race Fuel"] {
            let c = classify(label, &siblings, &tables);
            assert_eq!(c.grade_type, GradeType::Metered, "{label}");
            assert_eq!(c.iterations, 5, "{label}");
            assert!(!c.use_alternate_equipment, "{label}");
        }
    }

    #[test]
    fn non_metered_list_gets_three_iterations() {
        let tables = GradeTables::default();
        let siblings = grades(&["Regular", "Plus"]);
        for label in ["Plus", "Special 89", "Midgrade"] {
            let c = classify(label, &siblings, &tables);
            assert_eq!(c.grade_type, GradeType::NonMetered, "{label}");
            assert_eq!(c.iterations, 3, "{label}");
            assert!(!c.use_alternate_equipment, "{label}");
        }
    }

    #[test]
    fn premium_with_super_sibling_is_blended() {
        let tables = GradeTables::default();
        let siblings = grades(&["Regular", "Premium", "Super"]);
        let c = classify("Premium", &siblings, &tables);
        assert_eq!(c.grade_type, GradeType::NonMetered);
        assert_eq!(c.iterations, 3);
        assert!(c.use_alternate_equipment);
    }

    #[test]
    fn premium_with_ultra_sibling_is_blended() {
        let tables = GradeTables::default();
        let siblings = grades(&["Regular", "Premium", "Ultra 94"]);
        let c = classify("Premium", &siblings, &tables);
        assert_eq!(c.grade_type, GradeType::NonMetered);
        assert!(c.use_alternate_equipment);
    }

    #[test]
    fn premium_without_super_sibling_is_metered() {
        let tables = GradeTables::default();
        let siblings = grades(&["Regular", "Premium", "Diesel"]);
        let c = classify("Premium", &siblings, &tables);
        assert_eq!(c.grade_type, GradeType::Metered);
        assert_eq!(c.iterations, 5);
        assert!(!c.use_alternate_equipment);
    }

    #[test]
    fn unknown_label_falls_back_to_metered() {
        let tables = GradeTables::default();
        let c = classify("Mystery Blend", &[], &tables);
        assert_eq!(c.grade_type, GradeType::Metered);
        assert_eq!(c.iterations, 5);
    }

    #[test]
    fn classification_is_idempotent() {
        let tables = GradeTables::default();
        let siblings = grades(&["Premium", "Super"]);
        let first = classify("Premium", &siblings, &tables);
        let second = classify("Premium", &siblings, &tables);
        assert_eq!(first, second);
    }

    #[test]
    fn five_grade_dispenser_totals_twenty_one_iterations() {
        let tables = GradeTables::default();
        let siblings = grades(&["Regular", "Plus", "Premium", "Super", "Diesel"]);
        let total: u32 = siblings
            .iter()
            .map(|g| classify(g, &siblings, &tables).iterations)
            .sum();
        assert_eq!(total, 21);
    }
}
