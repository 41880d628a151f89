//! Job router: service code to form type and processing scope.
//!
//! Total function over any work order. Unknown or absent codes degrade to
//! the standard calibration form over a single dispenser rather than
//! failing the run.

use calibra_core_types::WorkOrder;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Scheduled calibration visit, all dispensers on the order.
pub const CODE_CALIBRATION: &str = "3146";
/// Install & calibrate, all dispensers on the order.
pub const CODE_INSTALL_CALIBRATION: &str = "3147";
/// Repair & calibrate only the dispensers named in the free-text
/// instructions.
pub const CODE_LISTED_DISPENSERS: &str = "3148";
/// Tank gauge report; a different form with no dispenser iteration.
pub const CODE_TANK_GAUGE: &str = "3050";

/// Which portal form a work order routes to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormType {
    /// Standard dispenser calibration form, iterated per dispenser.
    Calibration,
    /// Tank gauge report form; no dispenser iteration.
    TankGauge,
}

/// Routing decision for one work order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutePlan {
    pub form_type: FormType,
    /// The service code that decided the route, when one was recognized.
    pub service_code: Option<String>,
    /// Only the dispensers named in the instructions apply.
    pub specific_dispensers: bool,
    /// How many dispenser forms to expect, minimum 1.
    pub dispenser_count: u32,
    /// Dispenser numbers parsed out of the free text, when specific.
    pub dispenser_numbers: Vec<u32>,
}

impl RoutePlan {
    fn standard(service_code: Option<String>, dispenser_count: u32) -> Self {
        Self {
            form_type: FormType::Calibration,
            service_code,
            specific_dispensers: false,
            dispenser_count: dispenser_count.max(1),
            dispenser_numbers: Vec::new(),
        }
    }
}

/// Route a work order by its first recognized service code.
pub fn route(order: &WorkOrder) -> RoutePlan {
    for service in &order.services {
        match service.code.trim() {
            CODE_CALIBRATION | CODE_INSTALL_CALIBRATION => {
                let plan = RoutePlan::standard(Some(service.code.clone()), service.quantity);
                debug!(code = %service.code, count = plan.dispenser_count, "routed standard calibration");
                return plan;
            }
            CODE_LISTED_DISPENSERS => {
                let numbers = parse_dispenser_numbers(&order.free_text());
                let count = numbers.len().max(1) as u32;
                debug!(code = %service.code, ?numbers, "routed listed-dispenser calibration");
                return RoutePlan {
                    form_type: FormType::Calibration,
                    service_code: Some(service.code.clone()),
                    specific_dispensers: true,
                    dispenser_count: count,
                    dispenser_numbers: numbers,
                };
            }
            CODE_TANK_GAUGE => {
                debug!(code = %service.code, "routed tank gauge report");
                return RoutePlan {
                    form_type: FormType::TankGauge,
                    service_code: Some(service.code.clone()),
                    specific_dispensers: false,
                    dispenser_count: 0,
                    dispenser_numbers: Vec::new(),
                };
            }
            _ => {}
        }
    }
    // No recognized code: safest default, never a guessed demo count.
    RoutePlan::standard(None, 1)
}

/// Pull every integer out of free text, in reading order, de-duplicated.
pub fn parse_dispenser_numbers(text: &str) -> Vec<u32> {
    let mut numbers = Vec::new();
    let mut current = String::new();
    for ch in text.chars().chain(std::iter::once(' ')) {
        if ch.is_ascii_digit() {
            current.push(ch);
        } else if !current.is_empty() {
            if let Ok(n) = current.parse::<u32>() {
                if !numbers.contains(&n) {
                    numbers.push(n);
                }
            }
            current.clear();
        }
    }
    numbers
}

#[cfg(test)]
mod tests {
    use super::*;
    use calibra_core_types::Service;

    fn order(services: Vec<Service>, instructions: Option<&str>) -> WorkOrder {
        WorkOrder {
            id: "WO-1".to_string(),
            customer: String::new(),
            site_address: String::new(),
            services,
            instructions: instructions.map(|s| s.to_string()),
            description: None,
            visits: Vec::new(),
        }
    }

    fn service(code: &str, quantity: u32) -> Service {
        Service {
            code: code.to_string(),
            quantity,
            description: String::new(),
        }
    }

    #[test]
    fn calibration_codes_route_all_dispensers() {
        for code in [CODE_CALIBRATION, CODE_INSTALL_CALIBRATION] {
            let plan = route(&order(vec![service(code, 6)], None));
            assert_eq!(plan.form_type, FormType::Calibration);
            assert!(!plan.specific_dispensers);
            assert_eq!(plan.dispenser_count, 6);
        }
    }

    #[test]
    fn listed_dispensers_parse_numbers_from_instructions() {
        let plan = route(&order(
            vec![service(CODE_LISTED_DISPENSERS, 1)],
            Some("Recalibrate dispensers 3, 5 and 12 only"),
        ));
        assert!(plan.specific_dispensers);
        assert_eq!(plan.dispenser_numbers, vec![3, 5, 12]);
        assert_eq!(plan.dispenser_count, 3);
    }

    #[test]
    fn listed_dispensers_without_numbers_keep_minimum_count() {
        let plan = route(&order(
            vec![service(CODE_LISTED_DISPENSERS, 1)],
            Some("see site contact"),
        ));
        assert!(plan.specific_dispensers);
        assert!(plan.dispenser_numbers.is_empty());
        assert_eq!(plan.dispenser_count, 1);
    }

    #[test]
    fn tank_gauge_skips_dispenser_iteration() {
        let plan = route(&order(vec![service(CODE_TANK_GAUGE, 2)], None));
        assert_eq!(plan.form_type, FormType::TankGauge);
        assert_eq!(plan.dispenser_count, 0);
    }

    #[test]
    fn unknown_codes_default_to_single_standard_form() {
        let plan = route(&order(vec![service("9999", 4)], None));
        assert_eq!(plan.form_type, FormType::Calibration);
        assert_eq!(plan.dispenser_count, 1);
        assert!(plan.service_code.is_none());
    }

    #[test]
    fn no_services_defaults_to_single_standard_form() {
        let plan = route(&order(Vec::new(), None));
        assert_eq!(plan.form_type, FormType::Calibration);
        assert_eq!(plan.dispenser_count, 1);
    }

    #[test]
    fn zero_quantity_clamps_to_one() {
        let plan = route(&order(vec![service(CODE_CALIBRATION, 0)], None));
        assert_eq!(plan.dispenser_count, 1);
    }

    #[test]
    fn number_parser_dedupes_and_keeps_order() {
        assert_eq!(parse_dispenser_numbers("pumps 4, 2, 4 and 10"), vec![4, 2, 10]);
        assert_eq!(parse_dispenser_numbers("no digits here"), Vec::<u32>::new());
    }
}
