//! Scripted in-memory portal for tests and offline demos.
//!
//! Deterministic: sections render the same controls every time, and failure
//! injection (missing controls, nth-navigation timeout, mid-run crash) is
//! scripted up front.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::control::{ControlDescription, ControlKind};
use crate::errors::SessionError;
use crate::ports::{Credentials, PortalSession, SessionFactory, SessionOptions};

/// One recorded interaction against the fake portal.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedAction {
    pub section: usize,
    pub control: String,
    pub value: String,
}

#[derive(Debug, Default)]
struct FakeState {
    authenticated: bool,
    current_url: Option<String>,
    section_index: usize,
    submitted: bool,
    crashed: bool,
    open_calls: u32,
    action_count: u32,
    dropdown: Option<(String, Option<usize>)>,
    selections: Vec<RecordedAction>,
    filled: Vec<RecordedAction>,
    clicks: Vec<RecordedAction>,
}

#[derive(Clone, Debug, Default)]
struct FailureScript {
    timeout_on_open: Vec<u32>,
    omitted_controls: HashSet<String>,
    crash_after_actions: Option<u32>,
    fail_advance_times: u32,
}

/// Builder for a scripted portal.
#[derive(Clone, Default)]
pub struct FakePortalBuilder {
    dispensers: Vec<(String, Vec<String>)>,
    equipment_options: Vec<String>,
    failures: FailureScript,
}

impl FakePortalBuilder {
    /// Add one dispenser form section with these fuel-grade labels.
    pub fn dispenser(mut self, title: &str, grades: &[&str]) -> Self {
        self.dispensers
            .push((title.to_string(), grades.iter().map(|g| g.to_string()).collect()));
        self
    }

    /// Options rendered in every equipment dropdown.
    pub fn equipment_options(mut self, options: &[&str]) -> Self {
        self.equipment_options = options.iter().map(|o| o.to_string()).collect();
        self
    }

    /// Fail the nth `open_url` call (1-based) with a navigation timeout.
    pub fn timeout_on_open(mut self, nth: u32) -> Self {
        self.failures.timeout_on_open.push(nth);
        self
    }

    /// Render no control whose name contains this needle.
    pub fn omit_control(mut self, name_needle: &str) -> Self {
        self.failures.omitted_controls.insert(name_needle.to_lowercase());
        self
    }

    /// Crash the session after this many interactions.
    pub fn crash_after_actions(mut self, count: u32) -> Self {
        self.failures.crash_after_actions = Some(count);
        self
    }

    /// Fail the next `advance_section` calls with a navigation timeout.
    pub fn fail_advance_times(mut self, times: u32) -> Self {
        self.failures.fail_advance_times = times;
        self
    }

    pub fn new() -> Self {
        Self::default()
    }

    /// Factory that builds one fresh portal from this script per run.
    pub fn into_factory(self) -> Arc<FakeSessionFactory> {
        Arc::new(FakeSessionFactory::new(move || self.clone().build()))
    }

    pub fn build(self) -> FakePortal {
        let sections = self
            .dispensers
            .iter()
            .enumerate()
            .map(|(idx, (title, grades))| {
                build_section(idx, title, grades, &self.equipment_options)
            })
            .collect();
        FakePortal {
            sections,
            failures: Mutex::new(self.failures),
            state: Mutex::new(FakeState::default()),
        }
    }
}

fn build_section(
    idx: usize,
    title: &str,
    grades: &[String],
    equipment: &[String],
) -> Vec<ControlDescription> {
    let id = |name: &str| format!("s{idx}-{name}");
    vec![
        ControlDescription::new(id("equipmentUsed"), ControlKind::Select)
            .with_name("equipmentUsed")
            .with_label("Equipment / Prover")
            .with_options(equipment.to_vec()),
        ControlDescription::new(id("fuelGrade"), ControlKind::Select)
            .with_name("fuelGrade")
            .with_label(format!("{title} Fuel Grade"))
            .with_options(grades.to_vec()),
        ControlDescription::new(id("meterReading"), ControlKind::TextInput)
            .with_name("meterReading")
            .with_label("Meter Reading"),
        ControlDescription::new(id("testIterations"), ControlKind::TextInput)
            .with_name("testIterations")
            .with_label("Test Iterations"),
        ControlDescription::new(id("saveGrade"), ControlKind::Button)
            .with_name("saveGrade")
            .with_label("Save"),
        ControlDescription::new(id("nextSection"), ControlKind::Button)
            .with_name("nextSection")
            .with_label("Next"),
    ]
}

/// Scripted portal session; see [`FakePortalBuilder`].
pub struct FakePortal {
    sections: Vec<Vec<ControlDescription>>,
    failures: Mutex<FailureScript>,
    state: Mutex<FakeState>,
}

impl FakePortal {
    pub fn builder() -> FakePortalBuilder {
        FakePortalBuilder::default()
    }

    pub fn selections(&self) -> Vec<RecordedAction> {
        self.state.lock().selections.clone()
    }

    pub fn filled(&self) -> Vec<RecordedAction> {
        self.state.lock().filled.clone()
    }

    pub fn clicks(&self) -> Vec<RecordedAction> {
        self.state.lock().clicks.clone()
    }

    pub fn authenticated(&self) -> bool {
        self.state.lock().authenticated
    }

    pub fn submitted(&self) -> bool {
        self.state.lock().submitted
    }

    pub fn current_section(&self) -> usize {
        self.state.lock().section_index
    }

    fn record_action(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        if state.crashed {
            return Err(SessionError::Crashed("session already crashed".to_string()));
        }
        state.action_count += 1;
        if let Some(limit) = self.failures.lock().crash_after_actions {
            if state.action_count > limit {
                state.crashed = true;
                return Err(SessionError::Crashed("scripted crash".to_string()));
            }
        }
        Ok(())
    }

    fn control_name(&self, control_id: &str) -> String {
        control_id
            .split_once('-')
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| control_id.to_string())
    }

    fn require_control(&self, control_id: &str) -> Result<(), SessionError> {
        let state = self.state.lock();
        let section = self
            .sections
            .get(state.section_index)
            .ok_or_else(|| SessionError::ControlGone(control_id.to_string()))?;
        if section.iter().any(|c| c.control_id == control_id) {
            Ok(())
        } else {
            Err(SessionError::ControlGone(control_id.to_string()))
        }
    }
}

#[async_trait]
impl PortalSession for FakePortal {
    async fn authenticate(&self, credentials: &Credentials) -> Result<(), SessionError> {
        self.record_action()?;
        if credentials.username.is_empty() {
            return Err(SessionError::AuthFailed("empty username".to_string()));
        }
        self.state.lock().authenticated = true;
        Ok(())
    }

    async fn open_url(&self, url: &str) -> Result<(), SessionError> {
        self.record_action()?;
        let mut state = self.state.lock();
        if !state.authenticated {
            return Err(SessionError::Io("not authenticated".to_string()));
        }
        state.open_calls += 1;
        if self.failures.lock().timeout_on_open.contains(&state.open_calls) {
            return Err(SessionError::NavigationTimeout {
                target: url.to_string(),
            });
        }
        state.current_url = Some(url.to_string());
        state.section_index = 0;
        debug!(url, "fake portal opened");
        Ok(())
    }

    async fn controls(&self) -> Result<Vec<ControlDescription>, SessionError> {
        self.record_action()?;
        let state = self.state.lock();
        let section = self
            .sections
            .get(state.section_index)
            .cloned()
            .unwrap_or_default();
        let omitted = self.failures.lock().omitted_controls.clone();
        Ok(section
            .into_iter()
            .filter(|c| {
                !c.name
                    .as_deref()
                    .map(|n| omitted.iter().any(|o| n.to_lowercase().contains(o)))
                    .unwrap_or(false)
            })
            .collect())
    }

    async fn select_option(&self, control_id: &str, option: &str) -> Result<(), SessionError> {
        self.record_action()?;
        self.require_control(control_id)?;
        let mut state = self.state.lock();
        let section = state.section_index;
        let control = self.control_name(control_id);
        state.selections.push(RecordedAction {
            section,
            control,
            value: option.to_string(),
        });
        Ok(())
    }

    async fn fill_text(&self, control_id: &str, value: &str) -> Result<(), SessionError> {
        self.record_action()?;
        self.require_control(control_id)?;
        let mut state = self.state.lock();
        let section = state.section_index;
        let control = self.control_name(control_id);
        state.filled.push(RecordedAction {
            section,
            control,
            value: value.to_string(),
        });
        Ok(())
    }

    async fn click(&self, control_id: &str) -> Result<(), SessionError> {
        self.record_action()?;
        self.require_control(control_id)?;
        let mut state = self.state.lock();
        let section = state.section_index;
        let control = self.control_name(control_id);
        state.clicks.push(RecordedAction {
            section,
            control,
            value: String::new(),
        });
        Ok(())
    }

    async fn open_dropdown(&self, control_id: &str) -> Result<(), SessionError> {
        self.record_action()?;
        self.require_control(control_id)?;
        self.state.lock().dropdown = Some((control_id.to_string(), None));
        Ok(())
    }

    async fn press_arrow_down(&self, control_id: &str) -> Result<Option<String>, SessionError> {
        self.record_action()?;
        let mut state = self.state.lock();
        let options = {
            let section = self
                .sections
                .get(state.section_index)
                .ok_or_else(|| SessionError::ControlGone(control_id.to_string()))?;
            section
                .iter()
                .find(|c| c.control_id == control_id)
                .map(|c| c.options.clone())
                .ok_or_else(|| SessionError::ControlGone(control_id.to_string()))?
        };
        let cursor = match &mut state.dropdown {
            Some((open_id, cursor)) if open_id == control_id => cursor,
            _ => return Err(SessionError::Io("dropdown not open".to_string())),
        };
        let next = cursor.map(|c| c + 1).unwrap_or(0);
        if next >= options.len() {
            return Ok(None);
        }
        *cursor = Some(next);
        Ok(Some(options[next].clone()))
    }

    async fn commit_highlighted(&self, control_id: &str) -> Result<(), SessionError> {
        self.record_action()?;
        let (section_index, highlighted) = {
            let state = self.state.lock();
            let cursor = match &state.dropdown {
                Some((open_id, Some(cursor))) if open_id == control_id => *cursor,
                _ => return Err(SessionError::Io("nothing highlighted".to_string())),
            };
            let section = self
                .sections
                .get(state.section_index)
                .ok_or_else(|| SessionError::ControlGone(control_id.to_string()))?;
            let options = section
                .iter()
                .find(|c| c.control_id == control_id)
                .map(|c| c.options.clone())
                .ok_or_else(|| SessionError::ControlGone(control_id.to_string()))?;
            (state.section_index, options[cursor].clone())
        };
        let mut state = self.state.lock();
        let control = self.control_name(control_id);
        state.selections.push(RecordedAction {
            section: section_index,
            control,
            value: highlighted,
        });
        state.dropdown = None;
        Ok(())
    }

    async fn advance_section(&self) -> Result<bool, SessionError> {
        self.record_action()?;
        {
            let mut failures = self.failures.lock();
            if failures.fail_advance_times > 0 {
                failures.fail_advance_times -= 1;
                return Err(SessionError::NavigationTimeout {
                    target: "next section".to_string(),
                });
            }
        }
        let mut state = self.state.lock();
        state.section_index += 1;
        state.dropdown = None;
        Ok(state.section_index < self.sections.len())
    }

    async fn submit(&self) -> Result<(), SessionError> {
        self.record_action()?;
        self.state.lock().submitted = true;
        Ok(())
    }

    async fn close(&self) -> Result<(), SessionError> {
        Ok(())
    }
}

/// Factory that builds one scripted portal per run and keeps handles so
/// tests can inspect recorded interactions afterwards.
pub struct FakeSessionFactory {
    build: Box<dyn Fn() -> FakePortal + Send + Sync>,
    created: Mutex<Vec<Arc<FakePortal>>>,
}

impl FakeSessionFactory {
    pub fn new(build: impl Fn() -> FakePortal + Send + Sync + 'static) -> Self {
        Self {
            build: Box::new(build),
            created: Mutex::new(Vec::new()),
        }
    }

    /// The most recently created portal, if any.
    pub fn last(&self) -> Option<Arc<FakePortal>> {
        self.created.lock().last().cloned()
    }

    /// Every portal created so far, in creation order.
    pub fn created(&self) -> Vec<Arc<FakePortal>> {
        self.created.lock().clone()
    }
}

#[async_trait]
impl SessionFactory for FakeSessionFactory {
    async fn create(
        &self,
        _options: &SessionOptions,
    ) -> Result<Arc<dyn PortalSession>, SessionError> {
        let portal = Arc::new((self.build)());
        self.created.lock().push(Arc::clone(&portal));
        Ok(portal)
    }
}
