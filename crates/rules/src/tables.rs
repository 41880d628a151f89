//! Classification lists and the equipment preference table.
//!
//! These are data, not code: both can be overridden from user configuration
//! without touching any rule logic. All labels are matched after
//! `normalize_grade`, so entries are stored lowercase.

use serde::{Deserialize, Serialize};

/// Fixed fuel-grade classification lists.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GradeTables {
    /// Grades requiring iterative flow-rate calibration.
    pub metered: Vec<String>,
    /// Blended grades verified with a simpler check.
    pub non_metered: Vec<String>,
}

impl Default for GradeTables {
    fn default() -> Self {
        Self {
            metered: vec![
                "regular".to_string(),
                "diesel".to_string(),
                "super".to_string(),
                "ultra".to_string(),
                "ethanol free".to_string(),
                "ethanol-free".to_string(),
                "non-ethanol".to_string(),
                "rec 90".to_string(),
                "rec-90".to_string(),
                "race fuel".to_string(),
                "racing".to_string(),
                "kerosene".to_string(),
            ],
            non_metered: vec![
                "plus".to_string(),
                "special".to_string(),
                "extra".to_string(),
                "midgrade".to_string(),
                "mid-grade".to_string(),
                "silver".to_string(),
            ],
        }
    }
}

impl GradeTables {
    /// Does the normalized label match an entry (exact or substring)?
    pub fn matches_metered(&self, normalized: &str) -> bool {
        list_matches(&self.metered, normalized)
    }

    /// Does the normalized label match a non-metered entry?
    pub fn matches_non_metered(&self, normalized: &str) -> bool {
        list_matches(&self.non_metered, normalized)
    }
}

fn list_matches(list: &[String], normalized: &str) -> bool {
    if normalized.is_empty() {
        return false;
    }
    list.iter()
        .any(|entry| normalized == entry.as_str() || normalized.contains(entry.as_str()))
}

/// One entry of the ranked equipment preference table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EquipmentPreference {
    /// Identifier of the prover used on the portal form.
    pub equipment_id: String,
    /// Lower number wins when entries compete.
    #[serde(default)]
    pub priority: u32,
    /// Fuel types this prover is preferred for.
    #[serde(default)]
    pub preferred_fuel_types: Vec<String>,
}

/// Ranked equipment preference table, supplied by user configuration and
/// read-only within a run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EquipmentPreferenceTable {
    entries: Vec<EquipmentPreference>,
}

impl<'de> Deserialize<'de> for EquipmentPreferenceTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let entries = Vec::<EquipmentPreference>::deserialize(deserializer)?;
        Ok(Self::new(entries))
    }
}

impl EquipmentPreferenceTable {
    /// Build a table; entries keep their configured order within equal
    /// priority and are otherwise sorted by ascending priority.
    pub fn new(mut entries: Vec<EquipmentPreference>) -> Self {
        entries.sort_by_key(|e| e.priority);
        Self { entries }
    }

    pub fn entries(&self) -> &[EquipmentPreference] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stable default assignment: the first configured entry.
    pub fn first(&self) -> Option<&EquipmentPreference> {
        self.entries.first()
    }
}
