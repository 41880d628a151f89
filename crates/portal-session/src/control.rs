//! Control-description abstraction over the portal's dynamic markup.
//!
//! The portal may render different markup across sessions, so nothing above
//! this layer ever sees a literal selector: a control is described by what
//! it is and what it shows, and locator strategies are predicates over that.

use serde::{Deserialize, Serialize};

/// Shape of a form control.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControlKind {
    Select,
    TextInput,
    Button,
    Checkbox,
    Other,
}

/// Snapshot of one live control in the current form section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlDescription {
    /// Opaque handle valid for the current section only.
    pub control_id: String,
    pub kind: ControlKind,
    /// Markup name/id attribute, when the portal rendered one.
    pub name: Option<String>,
    /// Visible label text adjacent to the control.
    pub label: Option<String>,
    /// Option texts for dropdown-like controls.
    pub options: Vec<String>,
    pub visible: bool,
    pub enabled: bool,
}

impl ControlDescription {
    pub fn new(control_id: impl Into<String>, kind: ControlKind) -> Self {
        Self {
            control_id: control_id.into(),
            kind,
            name: None,
            label: None,
            options: Vec::new(),
            visible: true,
            enabled: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }

    /// Is the control usable right now?
    pub fn is_interactable(&self) -> bool {
        self.visible && self.enabled
    }

    /// Case-insensitive check against name and label.
    pub fn names_contain(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.name
            .as_deref()
            .map(|n| n.to_lowercase().contains(&needle))
            .unwrap_or(false)
            || self
                .label
                .as_deref()
                .map(|l| l.to_lowercase().contains(&needle))
                .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_contain_checks_both_fields() {
        let control = ControlDescription::new("c1", ControlKind::Select)
            .with_name("equipmentUsed")
            .with_label("Prover / Equipment");
        assert!(control.names_contain("equipment"));
        assert!(control.names_contain("prover"));
        assert!(!control.names_contain("fuel"));
    }

    #[test]
    fn interactable_requires_visible_and_enabled() {
        let mut control = ControlDescription::new("c1", ControlKind::Button);
        assert!(control.is_interactable());
        control.enabled = false;
        assert!(!control.is_interactable());
    }
}
