//! Control resolver: fallback chain, bounded retry, keyboard fallback.

use calibra_core_types::normalize_grade;
use portal_session::{ControlDescription, PortalSession, RetryPolicy};
use tracing::{debug, info, warn};

use crate::errors::LocatorError;
use crate::strategies::{locate_candidates, select_best};
use crate::types::ControlRef;

/// Resolves logical control references against a live session.
///
/// Every attempt is independent: the control snapshot is taken fresh, no
/// partial state carries over.
#[derive(Clone, Copy, Debug)]
pub struct ControlLocator {
    retry: RetryPolicy,
}

impl Default for ControlLocator {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
        }
    }
}

impl ControlLocator {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Resolve a logical reference to a live control.
    ///
    /// Exhausting all strategies and retries yields
    /// [`LocatorError::Exhausted`] tagged with the reference name; a fatal
    /// session error propagates unchanged.
    pub async fn locate(
        &self,
        session: &dyn PortalSession,
        reference: ControlRef,
    ) -> Result<ControlDescription, LocatorError> {
        let result = self
            .retry
            .run_if(
                reference.name(),
                LocatorError::is_retryable,
                |attempt| async move {
                    debug!(reference = %reference, attempt, "locating control");
                    let controls = session.controls().await?;
                    let candidates = locate_candidates(reference, &controls);
                    match select_best(&candidates) {
                        Some(best) => {
                            info!(
                                reference = %reference,
                                control = %best.control.control_id,
                                strategy = best.strategy.name(),
                                confidence = best.confidence,
                                "control resolved"
                            );
                            Ok(best.control.clone())
                        }
                        None => Err(LocatorError::StrategyFailed {
                            strategy: "all".to_string(),
                            reference: reference.name().to_string(),
                            reason: format!("no acceptable candidate among {} controls", controls.len()),
                        }),
                    }
                },
            )
            .await;

        match result {
            Ok(control) => Ok(control),
            Err(LocatorError::Session(err)) if err.is_fatal() => Err(LocatorError::Session(err)),
            Err(err) => {
                warn!(reference = %reference, error = %err, "locator exhausted");
                Err(LocatorError::Exhausted {
                    reference: reference.name().to_string(),
                })
            }
        }
    }

    /// Locate a dropdown and choose the option best matching `target`.
    ///
    /// Tries a direct selection first; when the direct path fails (or no
    /// option text matches statically), falls back to opening the control
    /// and keyboard-navigating to the matching option. Returns the option
    /// text actually chosen.
    pub async fn select_option(
        &self,
        session: &dyn PortalSession,
        reference: ControlRef,
        target: &str,
    ) -> Result<String, LocatorError> {
        let control = self.locate(session, reference).await?;

        if let Some(option) = best_option_match(&control.options, target) {
            match session.select_option(&control.control_id, &option).await {
                Ok(()) => return Ok(option),
                Err(err) if err.is_fatal() => return Err(err.into()),
                Err(err) => {
                    warn!(
                        reference = %reference,
                        error = %err,
                        "direct selection failed, falling back to keyboard navigation"
                    );
                }
            }
        }

        self.select_by_keyboard(session, reference, &control, target)
            .await
    }

    /// Locate a text control and fill it.
    pub async fn fill(
        &self,
        session: &dyn PortalSession,
        reference: ControlRef,
        value: &str,
    ) -> Result<(), LocatorError> {
        let control = self.locate(session, reference).await?;
        session.fill_text(&control.control_id, value).await?;
        Ok(())
    }

    /// Locate a button and click it.
    pub async fn click(
        &self,
        session: &dyn PortalSession,
        reference: ControlRef,
    ) -> Result<(), LocatorError> {
        let control = self.locate(session, reference).await?;
        session.click(&control.control_id).await?;
        Ok(())
    }

    async fn select_by_keyboard(
        &self,
        session: &dyn PortalSession,
        reference: ControlRef,
        control: &ControlDescription,
        target: &str,
    ) -> Result<String, LocatorError> {
        let wanted = normalize_grade(target);
        session.open_dropdown(&control.control_id).await?;
        while let Some(highlighted) = session.press_arrow_down(&control.control_id).await? {
            if option_matches(&normalize_grade(&highlighted), &wanted) {
                session.commit_highlighted(&control.control_id).await?;
                info!(reference = %reference, option = %highlighted, "selected via keyboard navigation");
                return Ok(highlighted);
            }
        }
        Err(LocatorError::NoMatchingOption {
            reference: reference.name().to_string(),
            target: target.to_string(),
        })
    }
}

fn option_matches(option: &str, wanted: &str) -> bool {
    !wanted.is_empty() && (option == wanted || option.contains(wanted) || wanted.contains(option))
}

/// Best static match among option texts: exact (case-insensitive) first,
/// then substring in either direction.
fn best_option_match(options: &[String], target: &str) -> Option<String> {
    let wanted = normalize_grade(target);
    if wanted.is_empty() {
        return None;
    }
    if let Some(exact) = options.iter().find(|o| normalize_grade(o) == wanted) {
        return Some(exact.clone());
    }
    options
        .iter()
        .find(|o| option_matches(&normalize_grade(o), &wanted))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_session::fake::FakePortal;
    use portal_session::Credentials;
    use std::time::Duration;

    fn locator() -> ControlLocator {
        ControlLocator::new(RetryPolicy::new(3, Duration::from_millis(1)))
    }

    async fn portal(build: FakePortal) -> FakePortal {
        build
            .authenticate(&Credentials {
                username: "tech".to_string(),
                password: "pw".to_string(),
            })
            .await
            .unwrap();
        build.open_url("https://portal/visit").await.unwrap();
        build
    }

    #[tokio::test]
    async fn locates_equipment_select_not_fuel_grade_select() {
        let portal = portal(
            FakePortal::builder()
                .dispenser("D1", &["Regular", "Plus", "Premium"])
                .equipment_options(&["Prover 5G", "Prover 100G"])
                .build(),
        )
        .await;

        let control = locator()
            .locate(&portal, ControlRef::EquipmentSelect)
            .await
            .unwrap();
        assert_eq!(control.options, vec!["Prover 5G", "Prover 100G"]);
    }

    #[tokio::test]
    async fn missing_control_exhausts_with_reference_tag() {
        let portal = portal(
            FakePortal::builder()
                .dispenser("D1", &["Regular"])
                .equipment_options(&["Prover 5G"])
                .omit_control("equipment")
                .build(),
        )
        .await;

        let err = locator()
            .locate(&portal, ControlRef::EquipmentSelect)
            .await
            .unwrap_err();
        match err {
            LocatorError::Exhausted { reference } => {
                assert_eq!(reference, "equipment-select");
            }
            other => panic!("expected Exhausted, got {other}"),
        }
    }

    #[tokio::test]
    async fn selects_option_by_substring_match() {
        let portal = portal(
            FakePortal::builder()
                .dispenser("D1", &["Regular"])
                .equipment_options(&["Seraphin 5 Gal Prover", "Seraphin 100 Gal Prover"])
                .build(),
        )
        .await;

        let chosen = locator()
            .select_option(&portal, ControlRef::EquipmentSelect, "100 gal")
            .await
            .unwrap();
        assert_eq!(chosen, "Seraphin 100 Gal Prover");
        assert_eq!(portal.selections()[0].value, "Seraphin 100 Gal Prover");
    }

    #[tokio::test]
    async fn unmatched_option_reports_no_matching_option() {
        let portal = portal(
            FakePortal::builder()
                .dispenser("D1", &["Regular"])
                .equipment_options(&["Prover 5G"])
                .build(),
        )
        .await;

        let err = locator()
            .select_option(&portal, ControlRef::EquipmentSelect, "nonexistent rig")
            .await
            .unwrap_err();
        assert!(matches!(err, LocatorError::NoMatchingOption { .. }));
    }

    #[tokio::test]
    async fn fill_and_click_reach_the_right_controls() {
        let portal = portal(
            FakePortal::builder()
                .dispenser("D1", &["Regular"])
                .equipment_options(&["Prover 5G"])
                .build(),
        )
        .await;

        let loc = locator();
        loc.fill(&portal, ControlRef::MeterReadingField, "10.003")
            .await
            .unwrap();
        loc.click(&portal, ControlRef::SaveButton).await.unwrap();

        assert_eq!(portal.filled()[0].control, "meterReading");
        assert_eq!(portal.filled()[0].value, "10.003");
        assert_eq!(portal.clicks()[0].control, "saveGrade");
    }

    #[test]
    fn best_option_match_prefers_exact() {
        let options = vec!["Super Prover".to_string(), "Prover".to_string()];
        assert_eq!(best_option_match(&options, "prover").unwrap(), "Prover");
        assert_eq!(
            best_option_match(&options, "super").unwrap(),
            "Super Prover"
        );
        assert!(best_option_match(&options, "").is_none());
    }
}
