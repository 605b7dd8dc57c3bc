use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::backup::BackupController;
use crate::error::CoreResult;
use crate::interrupt::Interrupt;
use crate::result::{ActionResult, ResultTracker};

/// Per-run switches shared by every action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSettings {
    /// Demote OVERRIDABLE results to non-blocking for this run.
    #[serde(default)]
    pub allow_overridable: bool,
    /// Run actions of the same dependency level concurrently.
    #[serde(default)]
    pub parallel: bool,
}

/// Context passed into every action run.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub backup: Arc<BackupController>,
    pub interrupt: Interrupt,
    pub settings: RunSettings,
}

impl ActionContext {
    pub fn new(backup: Arc<BackupController>, settings: RunSettings) -> Self {
        Self {
            backup,
            interrupt: Interrupt::new(),
            settings,
        }
    }
}

/// A single check or host mutation.
///
/// Actions report their outcome through [`set_result`](Action::set_result) and
/// [`add_message`](Action::add_message). Returning `Err` from `run` is reserved
/// for unexpected faults; the runner converts it into an ERROR result.
pub trait Action: Send {
    fn id(&self) -> &str;

    /// Ids of actions that must finish successfully before this one runs.
    fn dependencies(&self) -> &[&str] {
        &[]
    }

    /// Host resources this action mutates. Actions sharing a resource never
    /// run concurrently.
    fn resources(&self) -> &[&str] {
        &[]
    }

    fn tracker(&self) -> &ResultTracker;

    fn tracker_mut(&mut self) -> &mut ResultTracker;

    fn run(&mut self, ctx: &ActionContext) -> anyhow::Result<()>;

    fn set_result(&mut self, result: ActionResult) -> CoreResult<()> {
        let id = self.id().to_string();
        self.tracker_mut().set_result(&id, result)
    }

    fn add_message(&mut self, message: ActionResult) {
        self.tracker_mut().add_message(message);
    }
}

/// An ordered group of actions. Actions may depend on actions of the same or
/// an earlier stage.
pub struct Stage {
    pub name: String,
    pub actions: Vec<Box<dyn Action>>,
}

impl Stage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: impl Action + 'static) -> Self {
        self.actions.push(Box::new(action));
        self
    }

    pub fn push(&mut self, action: Box<dyn Action>) {
        self.actions.push(action);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
