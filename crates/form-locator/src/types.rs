//! Core types for the form locator.

use portal_session::{ControlDescription, ControlKind};
use serde::{Deserialize, Serialize};

/// Logical reference to a form control on the calibration form.
///
/// References name what the control *is for*, never how it is rendered; the
/// strategies translate a reference into concrete matches per session.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControlRef {
    /// The prover/equipment dropdown (not the fuel-grade dropdown).
    EquipmentSelect,
    /// The fuel-grade dropdown.
    FuelGradeSelect,
    /// Meter reading text field.
    MeterReadingField,
    /// Test iteration count text field.
    IterationsField,
    /// Per-grade save button.
    SaveButton,
    /// Advance to the next form section.
    NextButton,
}

impl ControlRef {
    /// Stable name used in error tags and progress messages.
    pub fn name(&self) -> &'static str {
        match self {
            ControlRef::EquipmentSelect => "equipment-select",
            ControlRef::FuelGradeSelect => "fuel-grade-select",
            ControlRef::MeterReadingField => "meter-reading-field",
            ControlRef::IterationsField => "iterations-field",
            ControlRef::SaveButton => "save-button",
            ControlRef::NextButton => "next-button",
        }
    }

    /// Expected control shape.
    pub fn kind(&self) -> ControlKind {
        match self {
            ControlRef::EquipmentSelect | ControlRef::FuelGradeSelect => ControlKind::Select,
            ControlRef::MeterReadingField | ControlRef::IterationsField => ControlKind::TextInput,
            ControlRef::SaveButton | ControlRef::NextButton => ControlKind::Button,
        }
    }

    /// Needles matched (case-insensitively) against name and label.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            ControlRef::EquipmentSelect => &["equipment", "prover"],
            ControlRef::FuelGradeSelect => &["fuel", "grade"],
            ControlRef::MeterReadingField => &["meter", "reading"],
            ControlRef::IterationsField => &["iteration"],
            ControlRef::SaveButton => &["save"],
            ControlRef::NextButton => &["next", "continue"],
        }
    }

    /// Whether a dropdown whose options read as fuel-grade names must be
    /// rejected for this reference. The portal renders the equipment and
    /// fuel-grade selectors with near-identical markup.
    pub fn rejects_fuel_grade_options(&self) -> bool {
        matches!(self, ControlRef::EquipmentSelect)
    }
}

impl std::fmt::Display for ControlRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Locator strategy enumeration, in fallback order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum LocatorStrategy {
    /// Match on the markup name/id attribute.
    Named,
    /// Match on the visible label text.
    Labeled,
    /// Match on control shape alone, discriminated by option text.
    Shape,
}

impl LocatorStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            LocatorStrategy::Named => "named",
            LocatorStrategy::Labeled => "labeled",
            LocatorStrategy::Shape => "shape",
        }
    }

    /// All strategies in fallback order.
    pub fn fallback_chain() -> [LocatorStrategy; 3] {
        [
            LocatorStrategy::Named,
            LocatorStrategy::Labeled,
            LocatorStrategy::Shape,
        ]
    }

    /// Base confidence assigned to matches from this strategy.
    pub fn base_confidence(&self) -> f64 {
        match self {
            LocatorStrategy::Named => 0.9,
            LocatorStrategy::Labeled => 0.75,
            LocatorStrategy::Shape => 0.55,
        }
    }
}

/// A potential control match with scoring information.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Candidate {
    pub control: ControlDescription,
    pub strategy: LocatorStrategy,
    /// Confidence score (0.0-1.0).
    pub confidence: f64,
}

impl Candidate {
    pub fn new(control: ControlDescription, strategy: LocatorStrategy, confidence: f64) -> Self {
        Self {
            control,
            strategy,
            confidence,
        }
    }

    /// Acceptable matches clear a 0.5 floor.
    pub fn is_acceptable(&self) -> bool {
        self.confidence >= 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_chain_order() {
        let chain = LocatorStrategy::fallback_chain();
        assert_eq!(chain[0], LocatorStrategy::Named);
        assert_eq!(chain[1], LocatorStrategy::Labeled);
        assert_eq!(chain[2], LocatorStrategy::Shape);
    }

    #[test]
    fn only_equipment_select_rejects_fuel_grade_options() {
        assert!(ControlRef::EquipmentSelect.rejects_fuel_grade_options());
        assert!(!ControlRef::FuelGradeSelect.rejects_fuel_grade_options());
        assert!(!ControlRef::SaveButton.rejects_fuel_grade_options());
    }

    #[test]
    fn reference_names_are_stable() {
        assert_eq!(ControlRef::EquipmentSelect.name(), "equipment-select");
        assert_eq!(ControlRef::NextButton.to_string(), "next-button");
    }
}
