use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crossgrade_core::event::{broadcast, EventSink, RunEvent};
use crossgrade_core::{
    ActionMessage, ActionReport, ActionResult, BackupController, CoreError, CoreResult, Interrupt, Level,
    RunReport, RunSettings, Runner, Stage,
};

use crate::actions;
use crate::context::HostContext;

/// Report entry that carries rollback failures.
pub const ROLLBACK_ENTRY: &str = "ROLLBACK";
pub const ROLLBACK_FAILED: &str = "ROLLBACK_FAILED";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Run checks and pre-PONR changes, then always roll back.
    Analyze,
    /// Run to completion past the point of no return.
    Convert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Successful,
    Failure,
    InhibitorsFound,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            Self::Successful => 0,
            Self::Failure => 1,
            Self::InhibitorsFound => 2,
        }
    }
}

#[derive(Debug)]
pub struct ConversionOutcome {
    pub status: ExitStatus,
    pub report: RunReport,
    pub rolled_back: bool,
    pub committed: bool,
    pub rollback_failures: Vec<String>,
    /// Report files that were written successfully.
    pub report_files: Vec<PathBuf>,
}

/// Phase model around the runner: pre-PONR stages, rollback or commit, then
/// post-PONR stages.
pub struct Driver {
    host: Arc<HostContext>,
    settings: RunSettings,
    backup: Arc<BackupController>,
    interrupt: Interrupt,
    event_sinks: Vec<Arc<dyn EventSink>>,
}

impl Driver {
    pub fn new(host: Arc<HostContext>, settings: RunSettings) -> Self {
        Self {
            host,
            settings,
            backup: Arc::new(BackupController::new()),
            interrupt: Interrupt::new(),
            event_sinks: Vec::new(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn add_event_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.event_sinks.push(sink);
    }

    pub fn backup(&self) -> &Arc<BackupController> {
        &self.backup
    }

    fn runner(&self) -> Runner {
        let mut runner = Runner::new(Arc::clone(&self.backup), self.settings)
            .with_interrupt(self.interrupt.clone());
        for sink in &self.event_sinks {
            runner.add_event_sink(Arc::clone(sink));
        }
        runner
    }

    /// Run the registered host actions. `confirm` is asked before the point
    /// of no return in convert mode.
    pub async fn run<F>(&self, mode: Mode, confirm: F) -> CoreResult<ConversionOutcome>
    where
        F: FnOnce() -> bool,
    {
        let pre = actions::pre_ponr_stages(&self.host);
        let post = actions::post_ponr_stages(&self.host);
        self.run_stages(mode, pre, post, confirm).await
    }

    pub async fn run_stages<F>(
        &self,
        mode: Mode,
        pre: Vec<Stage>,
        post: Vec<Stage>,
        confirm: F,
    ) -> CoreResult<ConversionOutcome>
    where
        F: FnOnce() -> bool,
    {
        tracing::info!(?mode, "Starting pre-PONR phase");
        let mut report = self.runner().run(pre).await?;
        let run_id = report.run_id;

        if self.interrupt.is_raised() {
            tracing::warn!("Interrupted before the point of no return, rolling back");
            self.rollback(run_id).await;
            return Ok(self.finish(report, ExitStatus::Failure, true, false, "pre-conversion"));
        }

        if report.is_blocking() {
            tracing::warn!(actions = ?report.blocking_actions(), "Inhibitors found, rolling back");
            let status = if self.rollback(run_id).await {
                ExitStatus::InhibitorsFound
            } else {
                ExitStatus::Failure
            };
            return Ok(self.finish(report, status, true, false, "pre-conversion"));
        }

        match mode {
            Mode::Analyze => {
                tracing::info!("Analysis complete, rolling back");
                let status = if self.rollback(run_id).await {
                    ExitStatus::Successful
                } else {
                    ExitStatus::Failure
                };
                Ok(self.finish(report, status, true, false, "pre-conversion"))
            }
            Mode::Convert => {
                if !confirm() {
                    tracing::warn!("Conversion cancelled by the operator, rolling back");
                    self.rollback(run_id).await;
                    return Ok(self.finish(report, ExitStatus::Failure, true, false, "pre-conversion"));
                }

                let committed = self.backup.commit();
                tracing::warn!(
                    changes = committed,
                    "Point of no return reached, further changes cannot be rolled back"
                );

                let post_report = self.runner().with_prior_results(&report).run(post).await?;
                let failed = post_report.is_blocking() || self.interrupt.is_raised();
                report.extend(post_report);

                let status = if failed {
                    tracing::error!("Conversion failed after the point of no return");
                    ExitStatus::Failure
                } else {
                    tracing::info!("Conversion successful");
                    ExitStatus::Successful
                };
                Ok(self.finish(report, status, false, true, "post-conversion"))
            }
        }
    }

    /// Restore every tracked change. Returns whether all restores succeeded.
    async fn rollback(&self, run_id: Uuid) -> bool {
        broadcast(&self.event_sinks, RunEvent::RollbackStarted { run_id }).await;

        let backup = Arc::clone(&self.backup);
        let restored = match tokio::task::spawn_blocking(move || backup.pop_all()).await {
            Ok(Ok(changes)) => changes.len(),
            Ok(Err(CoreError::NothingToRestore)) => {
                tracing::info!("No changes to roll back");
                0
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Rollback failed");
                0
            }
            Err(e) => {
                tracing::error!(error = %e, "Rollback task failed");
                return false;
            }
        };

        let failures = self.backup.rollback_failures();
        broadcast(
            &self.event_sinks,
            RunEvent::RollbackCompleted {
                run_id,
                restored,
                failures: failures.len(),
            },
        )
        .await;

        if failures.is_empty() {
            true
        } else {
            tracing::error!(failures = ?failures, "Rollback finished with failures, manual cleanup is required");
            false
        }
    }

    fn finish(
        &self,
        mut report: RunReport,
        status: ExitStatus,
        rolled_back: bool,
        committed: bool,
        report_name: &str,
    ) -> ConversionOutcome {
        let rollback_failures = self.backup.rollback_failures();
        if !rollback_failures.is_empty() {
            report.push(rollback_entry(&rollback_failures));
        }
        let report_files = self.write_reports(&report, report_name);

        tracing::info!(status = ?status, code = status.code(), "Conversion finished");
        ConversionOutcome {
            status,
            report,
            rolled_back,
            committed,
            rollback_failures,
            report_files,
        }
    }

    fn write_reports(&self, report: &RunReport, name: &str) -> Vec<PathBuf> {

        let dir = self.host.report_dir();
        let json = dir.join(format!("crossgrade-{name}.json"));
        let text = dir.join(format!("crossgrade-{name}.txt"));

        let mut written = Vec::new();
        match report.write_json(&json) {
            Ok(()) => written.push(json),
            Err(e) => tracing::warn!(error = %e, "Failed to write JSON report"),
        }
        match report.write_text(&text) {
            Ok(()) => written.push(text),
            Err(e) => tracing::warn!(error = %e, "Failed to write text report"),
        }
        written
    }
}

/// One WARNING message per change that could not be restored.
fn rollback_entry(failures: &[String]) -> ActionReport {
    let result = ActionResult::new(
        Level::Warning,
        ROLLBACK_FAILED,
        "Rollback finished with failures.",
    )
    .description(format!(
        "{} change(s) could not be restored. Manual cleanup is required.",
        failures.len()
    ));
    let messages = failures
        .iter()
        .map(|failure| {
            ActionMessage::from(
                ActionResult::new(Level::Warning, ROLLBACK_FAILED, "Change could not be restored.")
                    .description(failure.clone())
                    .diagnosis(failure.clone()),
            )
        })
        .collect();
    ActionReport {
        action_id: ROLLBACK_ENTRY.to_string(),
        stage: "rollback".to_string(),
        result,
        messages,
        duration: Duration::ZERO,
    }
}
