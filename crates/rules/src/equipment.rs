//! Equipment assignment resolver.
//!
//! First match wins across the priority ladder; absence of a dedicated
//! assignment is never a failure, the first configured prover is the stable
//! default.

use calibra_core_types::normalize_grade;
use tracing::debug;

use crate::classifier::has_super_sibling;
use crate::tables::{EquipmentPreference, EquipmentPreferenceTable};

/// Ethanol-free / reclaimed fuel variants carry residue constraints and get
/// a dedicated prover when one is configured.
pub fn is_ethanol_free(fuel_type: &str) -> bool {
    let normalized = normalize_grade(fuel_type);
    normalized.contains("ethanol")
        || normalized.contains("rec 90")
        || normalized.contains("rec-90")
        || normalized.contains("reclaimed")
}

/// Resolve the prover for one fuel type on one dispenser.
///
/// Returns `None` only when the table is empty; every other input resolves
/// deterministically.
pub fn resolve_equipment<'a>(
    fuel_type: &str,
    siblings: &[String],
    table: &'a EquipmentPreferenceTable,
) -> Option<&'a EquipmentPreference> {
    if table.is_empty() {
        return None;
    }
    let normalized = normalize_grade(fuel_type);

    // 1. Ethanol-free variants go to an ethanol-free prover when one exists.
    if is_ethanol_free(&normalized) {
        if let Some(entry) = table.entries().iter().find(|e| has_ethanol_free_pref(e)) {
            debug!(fuel = %fuel_type, equipment = %entry.equipment_id, "ethanol-free assignment");
            return Some(entry);
        }
    }

    // 2. Premium next to a Super/Ultra blend source reuses the Regular
    //    prover (never an ethanol-free one).
    if normalized.contains("premium") && has_super_sibling(siblings) {
        if let Some(entry) = match_fuel(table, "regular", true) {
            debug!(fuel = %fuel_type, equipment = %entry.equipment_id, "premium shares regular prover");
            return Some(entry);
        }
    }

    // 3. Exact match, 4. partial match, 5. stable default.
    if let Some(entry) = exact_match(table, &normalized) {
        return Some(entry);
    }
    if let Some(entry) = partial_match(table, &normalized, false) {
        return Some(entry);
    }
    table.first()
}

fn has_ethanol_free_pref(entry: &EquipmentPreference) -> bool {
    entry.preferred_fuel_types.iter().any(|p| is_ethanol_free(p))
}

fn exact_match<'a>(
    table: &'a EquipmentPreferenceTable,
    normalized: &str,
) -> Option<&'a EquipmentPreference> {
    table.entries().iter().find(|entry| {
        entry
            .preferred_fuel_types
            .iter()
            .any(|p| normalize_grade(p) == normalized)
    })
}

fn partial_match<'a>(
    table: &'a EquipmentPreferenceTable,
    normalized: &str,
    skip_ethanol_entries: bool,
) -> Option<&'a EquipmentPreference> {
    table.entries().iter().find(|entry| {
        if skip_ethanol_entries && has_ethanol_free_pref(entry) {
            return false;
        }
        entry.preferred_fuel_types.iter().any(|p| {
            let pref = normalize_grade(p);
            !pref.is_empty() && (normalized.contains(&pref) || pref.contains(normalized))
        })
    })
}

/// Exact-then-partial lookup for a specific fuel name, optionally ignoring
/// ethanol-free-specific entries.
fn match_fuel<'a>(
    table: &'a EquipmentPreferenceTable,
    normalized: &str,
    skip_ethanol_entries: bool,
) -> Option<&'a EquipmentPreference> {
    table
        .entries()
        .iter()
        .find(|entry| {
            if skip_ethanol_entries && has_ethanol_free_pref(entry) {
                return false;
            }
            entry
                .preferred_fuel_types
                .iter()
                .any(|p| normalize_grade(p) == normalized)
        })
        .or_else(|| partial_match(table, normalized, skip_ethanol_entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(specs: &[(&str, &[&str])]) -> EquipmentPreferenceTable {
        EquipmentPreferenceTable::new(
            specs
                .iter()
                .enumerate()
                .map(|(i, (id, prefs))| EquipmentPreference {
                    equipment_id: id.to_string(),
                    priority: i as u32,
                    preferred_fuel_types: prefs.iter().map(|p| p.to_string()).collect(),
                })
                .collect(),
        )
    }

    fn grades(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn ethanol_free_prefers_dedicated_prover() {
        let table = table(&[
            ("prover-main", &["Regular", "Diesel"]),
            ("prover-eth", &["Ethanol Free"]),
        ]);
        let entry = resolve_equipment("Rec 90", &[], &table).unwrap();
        assert_eq!(entry.equipment_id, "prover-eth");
    }

    #[test]
    fn ethanol_free_without_dedicated_prover_falls_through() {
        let table = table(&[("prover-main", &["Regular", "Diesel"])]);
        let entry = resolve_equipment("Ethanol Free 90", &[], &table).unwrap();
        assert_eq!(entry.equipment_id, "prover-main");
    }

    #[test]
    fn premium_with_super_reuses_regular_prover() {
        let table = table(&[
            ("prover-eth", &["Ethanol Free", "Regular"]),
            ("prover-reg", &["Regular"]),
            ("prover-hi", &["Premium", "Super"]),
        ]);
        let siblings = grades(&["Regular", "Premium", "Super"]);
        let entry = resolve_equipment("Premium", &siblings, &table).unwrap();
        // The ethanol-free-specific entry is excluded even though it also
        // lists Regular.
        assert_eq!(entry.equipment_id, "prover-reg");
    }

    #[test]
    fn premium_without_super_uses_direct_match() {
        let table = table(&[("prover-reg", &["Regular"]), ("prover-hi", &["Premium"])]);
        let siblings = grades(&["Regular", "Premium", "Diesel"]);
        let entry = resolve_equipment("Premium", &siblings, &table).unwrap();
        assert_eq!(entry.equipment_id, "prover-hi");
    }

    #[test]
    fn exact_match_beats_partial() {
        let table = table(&[
            ("prover-partial", &["Super Unleaded"]),
            ("prover-exact", &["Super"]),
        ]);
        let entry = resolve_equipment("Super", &[], &table).unwrap();
        assert_eq!(entry.equipment_id, "prover-exact");
    }

    #[test]
    fn partial_match_either_direction() {
        let table_d = table(&[("prover-d", &["Diesel"])]);
        let entry = resolve_equipment("Diesel #2", &[], &table_d).unwrap();
        assert_eq!(entry.equipment_id, "prover-d");

        let table_u = table(&[("prover-u", &["Ultra 94"])]);
        let entry = resolve_equipment("Ultra", &[], &table_u).unwrap();
        assert_eq!(entry.equipment_id, "prover-u");
    }

    #[test]
    fn unmatched_fuel_gets_stable_default() {
        let table = table(&[("prover-first", &["Regular"]), ("prover-second", &["Diesel"])]);
        let entry = resolve_equipment("Hydrogen", &[], &table).unwrap();
        assert_eq!(entry.equipment_id, "prover-first");
    }

    #[test]
    fn empty_table_resolves_to_none() {
        let table = EquipmentPreferenceTable::default();
        assert!(resolve_equipment("Regular", &[], &table).is_none());
    }

    #[test]
    fn resolution_is_deterministic() {
        let table = table(&[("prover-a", &["Regular"]), ("prover-b", &["Regular"])]);
        let siblings = grades(&["Regular", "Plus"]);
        let first = resolve_equipment("Regular", &siblings, &table).unwrap();
        let second = resolve_equipment("Regular", &siblings, &table).unwrap();
        assert_eq!(first.equipment_id, second.equipment_id);
        assert_eq!(first.equipment_id, "prover-a");
    }
}
