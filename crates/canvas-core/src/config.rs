use crate::error::{CanvasError, Result};
use crate::paths;
use crate::redact::{self, Redactor};
use crate::workspace::CollisionPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl ConfigWarning {
    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Warning,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Error,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkspaceSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceSettings {
    #[serde(default = "default_grid_unit")]
    pub grid_unit: u32,
    #[serde(default)]
    pub collision_policy: CollisionPolicy,
}

pub const DEFAULT_GRID_UNIT: u32 = 32;

fn default_grid_unit() -> u32 {
    DEFAULT_GRID_UNIT
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            grid_unit: default_grid_unit(),
            collision_policy: CollisionPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// ConfirmationSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationSettings {
    /// How long a visible confirmation waits for a decision before the
    /// action times out.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    300
}

impl Default for ConfirmationSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl ConfirmationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

// ---------------------------------------------------------------------------
// RedactionSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionSettings {
    #[serde(default = "redact::default_patterns")]
    pub patterns: Vec<String>,
    #[serde(default = "default_marker")]
    pub marker: String,
}

fn default_marker() -> String {
    redact::DEFAULT_MARKER.to_string()
}

impl Default for RedactionSettings {
    fn default() -> Self {
        Self {
            patterns: redact::default_patterns(),
            marker: default_marker(),
        }
    }
}

impl RedactionSettings {
    pub fn redactor(&self) -> Result<Redactor> {
        Redactor::new(&self.patterns, self.marker.clone())
    }
}

// ---------------------------------------------------------------------------
// EventSettings / ExecutionSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSettings {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    64
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionSettings {
    /// HTTP endpoint that approved actions are POSTed to. Unset means the
    /// front end accepts actions locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub workspace: WorkspaceSettings,
    #[serde(default)]
    pub confirmation: ConfirmationSettings,
    #[serde(default)]
    pub redaction: RedactionSettings,
    #[serde(default)]
    pub events: EventSettings,
    #[serde(default)]
    pub execution: ExecutionSettings,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace: WorkspaceSettings::default(),
            confirmation: ConfirmationSettings::default(),
            redaction: RedactionSettings::default(),
            events: EventSettings::default(),
            execution: ExecutionSettings::default(),
        }
    }
}

impl Config {
    /// Load `.canvas/config.yaml`. A missing file means the root was never
    /// initialized.
    pub fn load(root: &Path) -> Result<Self> {
        crate::io::read_yaml(&paths::config_path(root))?.ok_or(CanvasError::NotInitialized)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        crate::io::write_yaml(&paths::config_path(root), self)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.workspace.grid_unit == 0 {
            warnings.push(ConfigWarning::error("workspace.grid_unit must be greater than zero"));
        }

        if self.confirmation.timeout_seconds == 0 {
            warnings.push(ConfigWarning::warning(
                "confirmation.timeout_seconds is 0; confirmations time out immediately",
            ));
        }

        for (i, pattern) in self.redaction.patterns.iter().enumerate() {
            if pattern.trim().is_empty() {
                warnings.push(ConfigWarning::error(format!("redaction.patterns[{i}] is empty")));
            }
        }

        if self.redaction.marker.is_empty() {
            warnings.push(ConfigWarning::warning(
                "redaction.marker is empty; redacted values will be blank",
            ));
        }

        if self.events.capacity < 16 {
            warnings.push(ConfigWarning::warning(format!(
                "events.capacity={} is small; slow subscribers will miss events",
                self.events.capacity
            )));
        }

        if let Some(endpoint) = &self.execution.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                warnings.push(ConfigWarning::error(format!(
                    "execution.endpoint '{endpoint}' is not an http(s) URL"
                )));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
