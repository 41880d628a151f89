//! Shared primitives for the calibration automation engine.
//!
//! Holds the ids and the structured work-order / dispenser model handed over
//! by the scraping collaborator. The engine never parses portal markup to
//! build these; they arrive fully formed and immutable.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for one automation run (single visit, or one work order
/// within a batch).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a batch of queued work orders.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BatchId(pub String);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One line item on a work order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub code: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub description: String,
}

fn default_quantity() -> u32 {
    1
}

/// One scheduled technician appointment at a site.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    #[serde(default)]
    pub label: String,
    pub url: String,
}

/// Structured work order, owned by the scraping collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: String,
    #[serde(default)]
    pub customer: String,
    #[serde(default)]
    pub site_address: String,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub visits: Vec<Visit>,
}

impl WorkOrder {
    /// All free text that may carry dispenser numbers.
    pub fn free_text(&self) -> String {
        let mut text = String::new();
        if let Some(instructions) = &self.instructions {
            text.push_str(instructions);
            text.push(' ');
        }
        if let Some(description) = &self.description {
            text.push_str(description);
        }
        text
    }
}

/// One nozzle position on a dispenser.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Nozzle {
    pub position: u32,
    pub fuel_type: String,
}

/// One fuel dispenser observed at the site.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DispenserRecord {
    pub title: String,
    #[serde(default)]
    pub number: Option<u32>,
    #[serde(default)]
    pub nozzles: Vec<Nozzle>,
}

impl DispenserRecord {
    /// Flat list of fuel-grade labels on this unit, in nozzle order.
    pub fn grades(&self) -> Vec<String> {
        self.nozzles.iter().map(|n| n.fuel_type.clone()).collect()
    }
}

/// Normalize a free-text fuel-grade label before classification:
/// trimmed, inner whitespace collapsed, case-folded.
pub fn normalize_grade(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_folds() {
        assert_eq!(normalize_grade("  Ethanol  Free 90 "), "ethanol free 90");
        assert_eq!(normalize_grade("PREMIUM"), "premium");
        assert_eq!(normalize_grade(""), "");
    }

    #[test]
    fn dispenser_grades_follow_nozzle_order() {
        let dispenser = DispenserRecord {
            title: "Dispenser 3/4".to_string(),
            number: Some(3),
            nozzles: vec![
                Nozzle {
                    position: 1,
                    fuel_type: "Regular".to_string(),
                },
                Nozzle {
                    position: 2,
                    fuel_type: "Diesel".to_string(),
                },
            ],
        };
        assert_eq!(dispenser.grades(), vec!["Regular", "Diesel"]);
    }

    #[test]
    fn work_order_free_text_joins_both_fields() {
        let order = WorkOrder {
            id: "WO-1001".to_string(),
            customer: String::new(),
            site_address: String::new(),
            services: Vec::new(),
            instructions: Some("Calibrate dispensers 2 and 5".to_string()),
            description: Some("pump 7 flaky".to_string()),
            visits: Vec::new(),
        };
        let text = order.free_text();
        assert!(text.contains("2 and 5"));
        assert!(text.contains("pump 7"));
    }

    #[test]
    fn work_order_deserializes_with_missing_optionals() {
        let order: WorkOrder =
            serde_json::from_str(r#"{"id":"WO-1","services":[{"code":"3146"}]}"#).unwrap();
        assert_eq!(order.services[0].quantity, 1);
        assert!(order.instructions.is_none());
        assert!(order.visits.is_empty());
    }
}
