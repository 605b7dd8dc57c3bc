pub mod actions;
pub mod applock;
pub mod command;
pub mod config;
pub mod context;
pub mod conversion;
pub mod pkgmanager;
pub mod restorable;

pub use config::CrossgradeConfig;
pub use context::HostContext;
pub use conversion::{ConversionOutcome, Driver, ExitStatus, Mode};
