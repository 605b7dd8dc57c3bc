use std::path::PathBuf;
use thiserror::Error;

pub mod files;
pub mod packages;

pub use files::{MissingFile, RestorableFile};
pub use packages::RestorablePackageSet;

#[derive(Error, Debug)]
pub enum RestorableError {
    #[error("Filepath needs to be an absolute path: {0}")]
    NotAbsolute(PathBuf),

    #[error("Path must be a file not a directory: {0}")]
    IsDirectory(PathBuf),

    #[error("{0} was already restored and cannot be enabled again")]
    AlreadyRestored(String),
}

/// Lifecycle shared by every change: pending, enabled, restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeState {
    #[default]
    Pending,
    Enabled,
    Restored,
}
