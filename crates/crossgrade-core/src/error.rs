use thiserror::Error;

use crate::result::Level;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Duplicate action id: {0}")]
    DuplicateAction(String),

    #[error("Action {action} depends on unknown action {dependency}")]
    UnknownDependency { action: String, dependency: String },

    #[error("Dependency cycle detected involving: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    #[error("Action {action} in stage {stage} depends on {dependency} from a later stage")]
    StageOrder {
        action: String,
        stage: String,
        dependency: String,
    },

    #[error("Result for action {0} was already set")]
    ResultAlreadySet(String),

    #[error("Actions may not report level {level} (action {action})")]
    InvalidLevel { action: String, level: Level },

    #[error("No backups to restore")]
    NothingToRestore,

    #[error("Failed to enable {change} -- {source}")]
    EnableFailed {
        change: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
