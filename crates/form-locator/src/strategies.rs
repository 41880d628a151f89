//! Control resolution strategies.
//!
//! Three strategies in fallback order:
//! 1. Named - markup name/id attribute matching
//! 2. Labeled - visible label text matching
//! 3. Shape - control shape with option-text discrimination
//!
//! All strategies are pure predicates over control-description snapshots,
//! so they run identically against a live portal or a scripted fake.

use calibra_core_types::normalize_grade;
use portal_session::ControlDescription;
use tracing::debug;

use crate::types::{Candidate, ControlRef, LocatorStrategy};

/// Option texts that read as fuel-grade names rather than equipment names.
/// Used to reject the similarly-shaped fuel-grade dropdown when the
/// equipment dropdown is wanted.
const FUEL_GRADE_WORDS: &[&str] = &[
    "regular", "plus", "premium", "super", "ultra", "diesel", "midgrade", "ethanol", "unleaded",
];

/// Do these dropdown options look like fuel-grade names?
pub fn options_look_like_fuel_grades(options: &[String]) -> bool {
    if options.is_empty() {
        return false;
    }
    let grade_like = options
        .iter()
        .filter(|o| {
            let normalized = normalize_grade(o);
            FUEL_GRADE_WORDS.iter().any(|w| normalized.contains(w))
        })
        .count();
    // A majority of grade-like options marks the wrong dropdown.
    grade_like * 2 > options.len()
}

fn passes_discriminator(reference: ControlRef, control: &ControlDescription) -> bool {
    if reference.rejects_fuel_grade_options() && options_look_like_fuel_grades(&control.options) {
        debug!(
            reference = %reference,
            control = %control.control_id,
            "rejecting dropdown with fuel-grade-like options"
        );
        return false;
    }
    true
}

fn named_candidates(reference: ControlRef, controls: &[ControlDescription]) -> Vec<Candidate> {
    controls
        .iter()
        .filter(|c| c.kind == reference.kind() && c.is_interactable())
        .filter(|c| {
            let name = match c.name.as_deref() {
                Some(name) => name.to_lowercase(),
                None => return false,
            };
            reference.keywords().iter().any(|k| name.contains(k))
        })
        .filter(|c| passes_discriminator(reference, c))
        .map(|c| Candidate::new(c.clone(), LocatorStrategy::Named, LocatorStrategy::Named.base_confidence()))
        .collect()
}

fn labeled_candidates(reference: ControlRef, controls: &[ControlDescription]) -> Vec<Candidate> {
    controls
        .iter()
        .filter(|c| c.kind == reference.kind() && c.is_interactable())
        .filter(|c| {
            let label = match c.label.as_deref() {
                Some(label) => label.to_lowercase(),
                None => return false,
            };
            reference.keywords().iter().any(|k| label.contains(k))
        })
        .filter(|c| passes_discriminator(reference, c))
        .map(|c| {
            Candidate::new(
                c.clone(),
                LocatorStrategy::Labeled,
                LocatorStrategy::Labeled.base_confidence(),
            )
        })
        .collect()
}

fn shape_candidates(reference: ControlRef, controls: &[ControlDescription]) -> Vec<Candidate> {
    let matching: Vec<&ControlDescription> = controls
        .iter()
        .filter(|c| c.kind == reference.kind() && c.is_interactable())
        .filter(|c| passes_discriminator(reference, c))
        .collect();

    // Shape alone is only trustworthy when it is unambiguous; extra
    // same-shaped controls drag confidence below the acceptance floor.
    let penalty = 0.15 * matching.len().saturating_sub(1) as f64;
    matching
        .into_iter()
        .map(|c| {
            Candidate::new(
                c.clone(),
                LocatorStrategy::Shape,
                (LocatorStrategy::Shape.base_confidence() - penalty).max(0.0),
            )
        })
        .collect()
}

/// Run one strategy against a snapshot.
pub fn run_strategy(
    strategy: LocatorStrategy,
    reference: ControlRef,
    controls: &[ControlDescription],
) -> Vec<Candidate> {
    match strategy {
        LocatorStrategy::Named => named_candidates(reference, controls),
        LocatorStrategy::Labeled => labeled_candidates(reference, controls),
        LocatorStrategy::Shape => shape_candidates(reference, controls),
    }
}

/// Run the full fallback chain and return the first strategy's candidates
/// that produce an acceptable match.
pub fn locate_candidates(
    reference: ControlRef,
    controls: &[ControlDescription],
) -> Vec<Candidate> {
    for strategy in LocatorStrategy::fallback_chain() {
        let candidates = run_strategy(strategy, reference, controls);
        if candidates.iter().any(Candidate::is_acceptable) {
            debug!(
                reference = %reference,
                strategy = strategy.name(),
                count = candidates.len(),
                "strategy produced candidates"
            );
            return candidates;
        }
    }
    Vec::new()
}

/// Best acceptable candidate, highest confidence first.
pub fn select_best(candidates: &[Candidate]) -> Option<&Candidate> {
    candidates
        .iter()
        .filter(|c| c.is_acceptable())
        .max_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}
