pub mod action;
pub mod backup;
pub mod error;
pub mod event;
mod fault;
pub mod interrupt;
pub mod report;
pub mod resolver;
pub mod result;
pub mod runner;

pub use action::{Action, ActionContext, RunSettings, Stage};
pub use backup::{BackupController, RestorableChange};
pub use error::{CoreError, CoreResult};
pub use interrupt::Interrupt;
pub use report::{ActionReport, RunReport};
pub use result::{ActionMessage, ActionResult, Finding, Level, ResultTracker};
pub use runner::Runner;
