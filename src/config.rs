//! Configuration loading: YAML file, `CALIBRA_*` environment overrides,
//! defaults in code.

use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use calibra_rules::{EquipmentPreferenceTable, GradeTables};
use portal_session::{Credentials, RetryPolicy, SessionOptions};
use run_engine::EngineConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_CONFIG_PATH: &str = "calibra.yaml";
pub const DEFAULT_CHECKPOINT_PATH: &str = "calibra-batch.json";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub headless: bool,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: "https://portal.example".to_string(),
            username: String::new(),
            password: String::new(),
            headless: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Max concurrent portal sessions.
    pub pool_size: usize,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            pool_size: 2,
            retry_attempts: 3,
            retry_delay_ms: 400,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSection {
    pub checkpoint_path: String,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            checkpoint_path: DEFAULT_CHECKPOINT_PATH.to_string(),
        }
    }
}

/// Root application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub portal: PortalConfig,
    pub engine: EngineSection,
    pub grades: GradeTables,
    pub equipment: EquipmentPreferenceTable,
    pub batch: BatchSection,
}

impl AppConfig {
    /// Load configuration from `path` (or defaults when the default path is
    /// absent), then apply `CALIBRA_*` environment overrides.
    ///
    /// An explicitly given path must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    debug!("no config file, using defaults");
                    Self::default()
                }
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        debug!(path = %path.display(), "config file loaded");
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var("CALIBRA_PORTAL_URL") {
            self.portal.base_url = url;
        }
        if let Ok(username) = env::var("CALIBRA_USERNAME") {
            self.portal.username = username;
        }
        if let Ok(password) = env::var("CALIBRA_PASSWORD") {
            self.portal.password = password;
        }
        if let Ok(headless) = env::var("CALIBRA_HEADLESS") {
            self.portal.headless = matches!(headless.as_str(), "1" | "true" | "yes");
        }
        if let Some(size) = env::var("CALIBRA_POOL_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.engine.pool_size = size;
        }
        if let Ok(path) = env::var("CALIBRA_CHECKPOINT") {
            self.batch.checkpoint_path = path;
        }
    }

    /// Bind into the engine's runtime configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            credentials: Credentials {
                username: self.portal.username.clone(),
                password: self.portal.password.clone(),
            },
            session: SessionOptions {
                headless: self.portal.headless,
                base_url: self.portal.base_url.clone(),
            },
            pool_size: self.engine.pool_size,
            retry: RetryPolicy::new(
                self.engine.retry_attempts,
                Duration::from_millis(self.engine.retry_delay_ms),
            ),
            grade_tables: self.grades.clone(),
            equipment: self.equipment.clone(),
        }
    }

    /// Sanity findings a `check-config` caller should surface. Empty means
    /// the configuration is usable.
    pub fn findings(&self) -> Vec<String> {
        let mut findings = Vec::new();
        if self.portal.username.is_empty() {
            findings.push("portal.username is empty".to_string());
        }
        if self.portal.password.is_empty() {
            findings.push("portal.password is empty".to_string());
        }
        if self.equipment.is_empty() {
            findings.push(
                "equipment table is empty: grades will save without an assigned prover"
                    .to_string(),
            );
        }
        if self.grades.metered.is_empty() {
            findings.push("grades.metered is empty: every label will fall back to metered"
                .to_string());
        }
        if self.engine.pool_size == 0 {
            findings.push("engine.pool_size 0 is clamped to 1".to_string());
        }
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_usable() {
        let config = AppConfig::default();
        assert_eq!(config.engine.pool_size, 2);
        assert!(config.portal.headless);
        let engine = config.engine_config();
        assert_eq!(engine.retry.max_attempts, 3);
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "portal:\n  username: tech\n  password: secret\nengine:\n  pool_size: 4\nequipment:\n  - equipment_id: \"Prover 7\"\n    priority: 1\n    preferred_fuel_types: [\"Ethanol Free\"]\n"
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.portal.username, "tech");
        assert_eq!(config.engine.pool_size, 4);
        assert_eq!(config.equipment.entries().len(), 1);
        assert!(config.findings().is_empty());
    }

    #[test]
    fn findings_flag_missing_credentials() {
        let config = AppConfig::default();
        let findings = config.findings();
        assert!(findings.iter().any(|f| f.contains("username")));
        assert!(findings.iter().any(|f| f.contains("equipment")));
    }
}
