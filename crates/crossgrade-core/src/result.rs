use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::error::{CoreError, CoreResult};

/// Severity of an action result or message.
///
/// Ordering follows severity, so `Level::Error > Level::Warning`. The numeric
/// codes are consumed by external tooling and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Level {
    Success,
    Warning,
    Skip,
    Overridable,
    Error,
}

impl Level {
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Warning => 51,
            Self::Skip => 101,
            Self::Overridable => 152,
            Self::Error => 202,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            51 => Some(Self::Warning),
            101 => Some(Self::Skip),
            152 => Some(Self::Overridable),
            202 => Some(Self::Error),
            _ => None,
        }
    }

    /// Whether this level stops the conversion. OVERRIDABLE is demoted when the
    /// operator allowed it for this run.
    pub fn is_blocking(self, allow_overridable: bool) -> bool {
        match self {
            Self::Error => true,
            Self::Overridable => !allow_overridable,
            Self::Success | Self::Warning | Self::Skip => false,
        }
    }

    /// Whether dependents of an action finishing at this level must be skipped.
    pub fn blocks_dependents(self, allow_overridable: bool) -> bool {
        self == Self::Skip || self.is_blocking(allow_overridable)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Warning => "WARNING",
            Self::Skip => "SKIP",
            Self::Overridable => "OVERRIDABLE",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The terminal outcome of an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub level: Level,
    pub id: String,
    pub title: String,
    pub description: String,
    pub diagnosis: String,
    pub remediations: String,
    pub variables: BTreeMap<String, String>,
}

impl ActionResult {
    pub fn new(level: Level, id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            level,
            id: id.into(),
            title: title.into(),
            description: String::new(),
            diagnosis: String::new(),
            remediations: String::new(),
            variables: BTreeMap::new(),
        }
    }

    pub fn success() -> Self {
        Self::new(Level::Success, "", "")
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn diagnosis(mut self, diagnosis: impl Into<String>) -> Self {
        self.diagnosis = diagnosis.into();
        self
    }

    pub fn remediations(mut self, remediations: impl Into<String>) -> Self {
        self.remediations = remediations.into();
        self
    }

    pub fn variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }
}

/// A non-terminal, advisory message. Same shape as [`ActionResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionMessage {
    pub level: Level,
    pub id: String,
    pub title: String,
    pub description: String,
    pub diagnosis: String,
    pub remediations: String,
    pub variables: BTreeMap<String, String>,
}

impl From<ActionResult> for ActionMessage {
    fn from(r: ActionResult) -> Self {
        Self {
            level: r.level,
            id: r.id,
            title: r.title,
            description: r.description,
            diagnosis: r.diagnosis,
            remediations: r.remediations,
            variables: r.variables,
        }
    }
}

/// A structured domain failure. Domain operations return this instead of
/// aborting, and the action turns it into its result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{title}: {description}")]
pub struct Finding {
    pub id: String,
    pub title: String,
    pub description: String,
    pub diagnosis: String,
    pub remediations: String,
    pub variables: BTreeMap<String, String>,
}

impl Finding {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            diagnosis: String::new(),
            remediations: String::new(),
            variables: BTreeMap::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn diagnosis(mut self, diagnosis: impl Into<String>) -> Self {
        self.diagnosis = diagnosis.into();
        self
    }

    pub fn remediations(mut self, remediations: impl Into<String>) -> Self {
        self.remediations = remediations.into();
        self
    }

    pub fn variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    pub fn into_result(self, level: Level) -> ActionResult {
        ActionResult {
            level,
            id: self.id,
            title: self.title,
            description: self.description,
            diagnosis: self.diagnosis,
            remediations: self.remediations,
            variables: self.variables,
        }
    }
}

/// Result bookkeeping embedded in every action.
#[derive(Debug, Default)]
pub struct ResultTracker {
    result: Option<ActionResult>,
    messages: Vec<ActionMessage>,
}

impl ResultTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the terminal result. Allowed once per run; SKIP is reserved for
    /// the runner.
    pub fn set_result(&mut self, action_id: &str, result: ActionResult) -> CoreResult<()> {
        if result.level == Level::Skip {
            return Err(CoreError::InvalidLevel {
                action: action_id.to_string(),
                level: result.level,
            });
        }
        if self.result.is_some() {
            return Err(CoreError::ResultAlreadySet(action_id.to_string()));
        }
        self.result = Some(result);
        Ok(())
    }

    /// Replace whatever result is present. Used by the runner for synthesized
    /// outcomes (SKIP, fault conversion, defaulting).
    pub(crate) fn force_result(&mut self, result: ActionResult) {
        self.result = Some(result);
    }

    pub fn add_message(&mut self, message: impl Into<ActionMessage>) {
        self.messages.push(message.into());
    }

    pub fn result(&self) -> Option<&ActionResult> {
        self.result.as_ref()
    }

    pub fn messages(&self) -> &[ActionMessage] {
        &self.messages
    }
}
