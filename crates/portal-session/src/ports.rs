//! The portal session port and its factory.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::control::ControlDescription;
use crate::errors::SessionError;

/// Portal credentials, read from configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Options for creating one session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionOptions {
    pub headless: bool,
    pub base_url: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            headless: true,
            base_url: String::new(),
        }
    }
}

/// One external-UI context, exclusively owned by one run for its lifetime.
///
/// The surface is a single-threaded visual UI; callers must drive it
/// strictly sequentially.
#[async_trait]
pub trait PortalSession: Send + Sync {
    /// Sign in to the portal.
    async fn authenticate(&self, credentials: &Credentials) -> Result<(), SessionError>;

    /// Navigate to a visit URL and wait for the form to render.
    async fn open_url(&self, url: &str) -> Result<(), SessionError>;

    /// Snapshot every control in the currently visible form section.
    async fn controls(&self) -> Result<Vec<ControlDescription>, SessionError>;

    /// Choose a dropdown option by its visible text.
    async fn select_option(&self, control_id: &str, option: &str) -> Result<(), SessionError>;

    /// Type a value into a text control, replacing its content.
    async fn fill_text(&self, control_id: &str, value: &str) -> Result<(), SessionError>;

    /// Click a control.
    async fn click(&self, control_id: &str) -> Result<(), SessionError>;

    /// Open a dropdown without selecting, for keyboard navigation.
    async fn open_dropdown(&self, control_id: &str) -> Result<(), SessionError>;

    /// Move the dropdown highlight down one option; returns the newly
    /// highlighted option text, or `None` past the last option.
    async fn press_arrow_down(&self, control_id: &str) -> Result<Option<String>, SessionError>;

    /// Commit the currently highlighted dropdown option.
    async fn commit_highlighted(&self, control_id: &str) -> Result<(), SessionError>;

    /// Advance to the next form section; `false` when none remains.
    async fn advance_section(&self) -> Result<bool, SessionError>;

    /// Submit the completed form.
    async fn submit(&self) -> Result<(), SessionError>;

    /// Tear the session down. Idempotent.
    async fn close(&self) -> Result<(), SessionError>;
}

/// Creates sessions; each run owns exactly one.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(&self, options: &SessionOptions) -> Result<Arc<dyn PortalSession>, SessionError>;
}
