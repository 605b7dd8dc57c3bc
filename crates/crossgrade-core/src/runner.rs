use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::action::{Action, ActionContext, RunSettings, Stage};
use crate::backup::BackupController;
use crate::error::CoreResult;
use crate::event::{broadcast, EventSink, RunEvent};
use crate::fault::panic_message;
use crate::interrupt::Interrupt;
use crate::report::{ActionReport, RunReport};
use crate::resolver::{self, PlannedStage};
use crate::result::{ActionResult, Level};

pub const UNEXPECTED_ERROR: &str = "UNEXPECTED_ERROR";
pub const INTERRUPTED: &str = "INTERRUPTED";
pub const SKIPPED: &str = "SKIP";

type SharedAction = Arc<Mutex<Box<dyn Action>>>;

struct Slot {
    id: String,
    deps: Vec<String>,
    resources: Vec<String>,
    action: SharedAction,
}

/// Executes stages of actions in dependency order.
///
/// Every `run()` call happens on the blocking pool behind a fault boundary:
/// an `Err` or a panic becomes an ERROR result for that action only.
pub struct Runner {
    backup: Arc<BackupController>,
    settings: RunSettings,
    interrupt: Interrupt,
    event_sinks: Vec<Arc<dyn EventSink>>,
    prior: HashMap<String, Level>,
}

impl Runner {
    pub fn new(backup: Arc<BackupController>, settings: RunSettings) -> Self {
        Self {
            backup,
            settings,
            interrupt: Interrupt::new(),
            event_sinks: Vec::new(),
            prior: HashMap::new(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Let actions depend on outcomes of an earlier run.
    pub fn with_prior_results(mut self, report: &RunReport) -> Self {
        for entry in &report.entries {
            self.prior.insert(entry.action_id.clone(), entry.result.level);
        }
        self
    }

    pub fn add_event_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.event_sinks.push(sink);
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    async fn emit(&self, event: RunEvent) {
        broadcast(&self.event_sinks, event).await;
    }

    /// Resolve and run every stage. Resolution errors abort before any
    /// action runs; action failures never abort the run.
    pub async fn run(&self, stages: Vec<Stage>) -> CoreResult<RunReport> {
        let satisfied: HashSet<String> = self.prior.keys().cloned().collect();
        let run_id = Uuid::new_v4();
        let plan = match resolver::resolve(&stages, &satisfied) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!(error = %e, "Cannot resolve action order");
                self.emit(RunEvent::Failed {
                    run_id,
                    error: e.to_string(),
                })
                .await;
                return Err(e);
            }
        };

        let mut report = RunReport::new(run_id, self.settings.allow_overridable);
        let mut levels = self.prior.clone();
        let ctx = ActionContext {
            backup: Arc::clone(&self.backup),
            interrupt: self.interrupt.clone(),
            settings: self.settings,
        };

        self.emit(RunEvent::Started {
            run_id,
            at: chrono::Utc::now(),
        })
        .await;

        for (stage, planned) in stages.into_iter().zip(plan.stages) {
            tracing::info!(stage = %stage.name, actions = stage.len(), "Running stage");
            self.emit(RunEvent::StageStarted {
                run_id,
                stage: stage.name.clone(),
                actions: stage.len(),
            })
            .await;
            self.backup.push_partition();

            let slots: Vec<Slot> = stage
                .actions
                .into_iter()
                .map(|action| Slot {
                    id: action.id().to_string(),
                    deps: action.dependencies().iter().map(|d| d.to_string()).collect(),
                    resources: action.resources().iter().map(|r| r.to_string()).collect(),
                    action: Arc::new(Mutex::new(action)),
                })
                .collect();

            let batches = if self.settings.parallel {
                parallel_batches(&planned, &slots)
            } else {
                planned.order.iter().map(|&i| vec![i]).collect()
            };

            for batch in batches {
                self.run_batch(run_id, &stage.name, &batch, &slots, &ctx, &mut levels, &mut report)
                    .await;
            }
        }

        report.finish();
        let blocking = report.is_blocking();
        if blocking {
            tracing::warn!(actions = ?report.blocking_actions(), "Run finished with blocking results");
        } else {
            tracing::info!(actions = report.len(), "Run finished");
        }
        self.emit(RunEvent::Completed {
            run_id,
            at: chrono::Utc::now(),
            blocking,
        })
        .await;
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_batch(
        &self,
        run_id: Uuid,
        stage: &str,
        batch: &[usize],
        slots: &[Slot],
        ctx: &ActionContext,
        levels: &mut HashMap<String, Level>,
        report: &mut RunReport,
    ) {
        let allow = self.settings.allow_overridable;
        let mut in_flight = Vec::new();

        for &idx in batch {
            let slot = &slots[idx];

            if self.interrupt.is_raised() {
                let entry = settle(slot, stage, Outcome::Synthesized(interrupted()), Duration::ZERO);
                levels.insert(slot.id.clone(), entry.result.level);
                report.push(entry);
                continue;
            }

            let blocked_by: Vec<String> = slot
                .deps
                .iter()
                .filter(|dep| {
                    levels
                        .get(dep.as_str())
                        .is_some_and(|level| level.blocks_dependents(allow))
                })
                .cloned()
                .collect();
            if !blocked_by.is_empty() {
                tracing::info!(action = %slot.id, blocked_by = ?blocked_by, "Skipping action");
                self.emit(RunEvent::ActionSkipped {
                    run_id,
                    action: slot.id.clone(),
                    blocked_by: blocked_by.clone(),
                })
                .await;
                let entry = settle(slot, stage, Outcome::Synthesized(skipped(&blocked_by)), Duration::ZERO);
                levels.insert(slot.id.clone(), entry.result.level);
                report.push(entry);
                continue;
            }

            tracing::info!(action = %slot.id, "Running action");
            self.emit(RunEvent::ActionStarted {
                run_id,
                action: slot.id.clone(),
            })
            .await;

            let action = Arc::clone(&slot.action);
            let action_ctx = ctx.clone();
            let handle = tokio::task::spawn_blocking(move || {
                let mut guard = action.lock().unwrap_or_else(PoisonError::into_inner);
                guard.run(&action_ctx)
            });
            in_flight.push((idx, Instant::now(), handle));
        }

        for (idx, started, handle) in in_flight {
            let slot = &slots[idx];
            let outcome = match handle.await {
                Ok(Ok(())) => Outcome::Returned,
                Ok(Err(e)) => Outcome::Synthesized(unexpected_error(&format!("{e:#}"))),
                Err(join) if join.is_panic() => {
                    Outcome::Synthesized(unexpected_error(&panic_message(join.into_panic().as_ref())))
                }
                Err(join) => Outcome::Synthesized(unexpected_error(&join.to_string())),
            };
            let entry = settle(slot, stage, outcome, started.elapsed());

            match entry.result.level {
                Level::Error | Level::Overridable => tracing::warn!(
                    action = %entry.action_id,
                    level = %entry.result.level,
                    id = %entry.result.id,
                    title = %entry.result.title,
                    "Action finished"
                ),
                level => tracing::info!(action = %entry.action_id, level = %level, "Action finished"),
            }
            self.emit(RunEvent::ActionFinished {
                run_id,
                action: entry.action_id.clone(),
                level: entry.result.level,
                duration: entry.duration,
            })
            .await;

            levels.insert(slot.id.clone(), entry.result.level);
            report.push(entry);
        }
    }
}

enum Outcome {
    /// `run()` returned normally; whatever the action set stands.
    Returned,
    /// The runner decides the result and overrides anything already set.
    Synthesized(ActionResult),
}

fn settle(slot: &Slot, stage: &str, outcome: Outcome, duration: Duration) -> ActionReport {
    let mut action = slot.action.lock().unwrap_or_else(PoisonError::into_inner);
    let tracker = action.tracker_mut();
    match outcome {
        Outcome::Returned => {
            if tracker.result().is_none() {
                tracker.force_result(ActionResult::success());
            }
        }
        Outcome::Synthesized(result) => tracker.force_result(result),
    }

    ActionReport {
        action_id: slot.id.clone(),
        stage: stage.to_string(),
        result: tracker.result().cloned().unwrap_or_else(ActionResult::success),
        messages: tracker.messages().to_vec(),
        duration,
    }
}

fn unexpected_error(message: &str) -> ActionResult {
    ActionResult::new(Level::Error, UNEXPECTED_ERROR, "Unhandled exception was caught")
        .description(format!("Unhandled exception was caught: {message}"))
        .diagnosis(message)
}

fn interrupted() -> ActionResult {
    ActionResult::new(Level::Error, INTERRUPTED, "Run interrupted")
        .description("The run was interrupted before this action started.")
}

fn skipped(blocked_by: &[String]) -> ActionResult {
    let verb = if blocked_by.len() == 1 { "was" } else { "were" };
    ActionResult::new(Level::Skip, SKIPPED, "Skipped action")
        .description("This action was skipped due to another action failing.")
        .diagnosis(format!(
            "Skipped because {} {verb} not successful",
            join_names(blocked_by)
        ))
}

fn join_names(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [one] => one.clone(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}

/// Split each dependency level into batches that share no resource token.
fn parallel_batches(planned: &PlannedStage, slots: &[Slot]) -> Vec<Vec<usize>> {
    let mut batches = Vec::new();
    for level in planned.levels() {
        let mut level_batches: Vec<(Vec<usize>, HashSet<&str>)> = Vec::new();
        for idx in level {
            let wanted = &slots[idx].resources;
            let fit = level_batches
                .iter_mut()
                .find(|(_, held)| wanted.iter().all(|r| !held.contains(r.as_str())));
            match fit {
                Some((members, held)) => {
                    members.push(idx);
                    held.extend(wanted.iter().map(String::as_str));
                }
                None => {
                    let held = wanted.iter().map(String::as_str).collect();
                    level_batches.push((vec![idx], held));
                }
            }
        }
        batches.extend(level_batches.into_iter().map(|(members, _)| members));
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::tests::Recorded;
    use crate::error::CoreError;
    use crate::event::ChannelEventSink;
    use crate::result::ResultTracker;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Log = Arc<Mutex<Vec<String>>>;

    enum Behavior {
        Succeed,
        Report(ActionResult),
        Fail(&'static str),
        Panic(&'static str),
        /// Push a journaled change, then fault if the flag is set.
        Push(&'static str, bool),
        Busy(Arc<AtomicUsize>, Arc<AtomicUsize>),
        RaiseInterrupt,
        SetTwice,
    }

    struct Probe {
        id: &'static str,
        deps: Vec<&'static str>,
        resources: Vec<&'static str>,
        tracker: ResultTracker,
        behavior: Behavior,
        log: Log,
    }

    impl Probe {
        fn new(id: &'static str, behavior: Behavior, log: &Log) -> Self {
            Self {
                id,
                deps: Vec::new(),
                resources: Vec::new(),
                tracker: ResultTracker::new(),
                behavior,
                log: Arc::clone(log),
            }
        }

        fn after(mut self, deps: &[&'static str]) -> Self {
            self.deps = deps.to_vec();
            self
        }

        fn using(mut self, resources: &[&'static str]) -> Self {
            self.resources = resources.to_vec();
            self
        }
    }

    impl Action for Probe {
        fn id(&self) -> &str {
            self.id
        }

        fn dependencies(&self) -> &[&str] {
            &self.deps
        }

        fn resources(&self) -> &[&str] {
            &self.resources
        }

        fn tracker(&self) -> &ResultTracker {
            &self.tracker
        }

        fn tracker_mut(&mut self) -> &mut ResultTracker {
            &mut self.tracker
        }

        fn run(&mut self, ctx: &ActionContext) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(format!("run:{}", self.id));
            match &self.behavior {
                Behavior::Succeed => Ok(()),
                Behavior::Report(result) => {
                    let result = result.clone();
                    self.set_result(result)?;
                    Ok(())
                }
                Behavior::Fail(msg) => anyhow::bail!("{msg}"),
                Behavior::Panic(msg) => panic!("{msg}"),
                Behavior::Push(name, fault) => {
                    ctx.backup.push(Recorded::boxed(name, &self.log))?;
                    if *fault {
                        anyhow::bail!("conversion step failed");
                    }
                    Ok(())
                }
                Behavior::Busy(active, peak) => {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(150));
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
                Behavior::RaiseInterrupt => {
                    ctx.interrupt.raise();
                    Ok(())
                }
                Behavior::SetTwice => {
                    self.set_result(ActionResult::new(Level::Warning, "FIRST", "first"))?;
                    self.set_result(ActionResult::new(Level::Warning, "SECOND", "second"))?;
                    Ok(())
                }
            }
        }
    }

    fn log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn runs(log: &Log) -> Vec<String> {
        log.lock()
            .unwrap()
            .iter()
            .filter_map(|e| e.strip_prefix("run:").map(str::to_string))
            .collect()
    }

    fn runner() -> Runner {
        Runner::new(Arc::new(BackupController::new()), RunSettings::default())
    }

    fn level(report: &RunReport, id: &str) -> Level {
        report.level_of(id).unwrap()
    }

    #[tokio::test]
    async fn runs_in_dependency_order() {
        let log = log();
        let stage = Stage::new("system_checks")
            .with_action(Probe::new("D", Behavior::Succeed, &log).after(&["B", "C"]))
            .with_action(Probe::new("C", Behavior::Succeed, &log).after(&["A"]))
            .with_action(Probe::new("B", Behavior::Succeed, &log).after(&["A"]))
            .with_action(Probe::new("A", Behavior::Succeed, &log));

        let report = runner().run(vec![stage]).await.unwrap();
        assert_eq!(runs(&log), vec!["A", "C", "B", "D"]);
        assert_eq!(report.len(), 4);
        assert!(report.entries.iter().all(|e| e.result.level == Level::Success));
        assert!(!report.is_blocking());
    }

    #[tokio::test]
    async fn cycle_runs_nothing() {
        let log = log();
        let stage = Stage::new("system_checks")
            .with_action(Probe::new("A", Behavior::Succeed, &log).after(&["B"]))
            .with_action(Probe::new("B", Behavior::Succeed, &log).after(&["A"]))
            .with_action(Probe::new("FREE", Behavior::Succeed, &log));

        let err = runner().run(vec![stage]).await.unwrap_err();
        assert!(matches!(err, CoreError::DependencyCycle(_)));
        assert!(runs(&log).is_empty());
    }

    #[tokio::test]
    async fn faults_are_isolated() {
        let log = log();
        let stage = Stage::new("system_checks")
            .with_action(Probe::new("A", Behavior::Panic("boom"), &log))
            .with_action(Probe::new("B", Behavior::Fail("disk on fire"), &log))
            .with_action(Probe::new("C", Behavior::Succeed, &log));

        let report = runner().run(vec![stage]).await.unwrap();
        assert_eq!(runs(&log), vec!["A", "B", "C"]);

        let a = &report.get("A").unwrap().result;
        assert_eq!(a.level, Level::Error);
        assert_eq!(a.id, UNEXPECTED_ERROR);
        assert!(a.description.contains("boom"));

        let b = &report.get("B").unwrap().result;
        assert_eq!(b.id, UNEXPECTED_ERROR);
        assert!(b.diagnosis.contains("disk on fire"));

        assert_eq!(level(&report, "C"), Level::Success);
        assert_eq!(report.blocking_actions(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn failed_dependency_skips_dependents() {
        let log = log();
        let stage = Stage::new("system_checks")
            .with_action(Probe::new(
                "A",
                Behavior::Report(ActionResult::new(Level::Error, "BROKEN", "broken")),
                &log,
            ))
            .with_action(Probe::new("B", Behavior::Succeed, &log).after(&["A"]))
            .with_action(Probe::new("C", Behavior::Succeed, &log).after(&["B"]));

        let report = runner().run(vec![stage]).await.unwrap();
        assert_eq!(runs(&log), vec!["A"]);

        let b = &report.get("B").unwrap().result;
        assert_eq!(b.level, Level::Skip);
        assert_eq!(b.diagnosis, "Skipped because A was not successful");

        let c = &report.get("C").unwrap().result;
        assert_eq!(c.level, Level::Skip);
        assert_eq!(c.diagnosis, "Skipped because B was not successful");
    }

    #[tokio::test]
    async fn skip_names_every_failed_dependency() {
        let log = log();
        let stage = Stage::new("system_checks")
            .with_action(Probe::new("A", Behavior::Fail("a"), &log))
            .with_action(Probe::new("B", Behavior::Fail("b"), &log))
            .with_action(Probe::new("C", Behavior::Succeed, &log).after(&["A", "B"]));

        let report = runner().run(vec![stage]).await.unwrap();
        assert_eq!(
            report.get("C").unwrap().result.diagnosis,
            "Skipped because A and B were not successful"
        );
    }

    #[tokio::test]
    async fn overridable_blocks_unless_allowed() {
        let build = |log: &Log| {
            Stage::new("pre_ponr_changes")
                .with_action(Probe::new(
                    "LOCKS",
                    Behavior::Report(ActionResult::new(Level::Overridable, "VERSIONLOCK", "locks")),
                    log,
                ))
                .with_action(Probe::new("AFTER", Behavior::Succeed, log).after(&["LOCKS"]))
        };

        let strict_log = log();
        let report = runner().run(vec![build(&strict_log)]).await.unwrap();
        assert!(report.is_blocking());
        assert_eq!(level(&report, "AFTER"), Level::Skip);

        let relaxed_log = log();
        let settings = RunSettings {
            allow_overridable: true,
            parallel: false,
        };
        let relaxed = Runner::new(Arc::new(BackupController::new()), settings);
        let report = relaxed.run(vec![build(&relaxed_log)]).await.unwrap();
        assert!(!report.is_blocking());
        assert_eq!(level(&report, "AFTER"), Level::Success);
        assert_eq!(runs(&relaxed_log), vec!["LOCKS", "AFTER"]);
    }

    #[tokio::test]
    async fn warnings_do_not_block_dependents() {
        let log = log();
        let stage = Stage::new("system_checks")
            .with_action(Probe::new(
                "A",
                Behavior::Report(ActionResult::new(Level::Warning, "HEADS_UP", "heads up")),
                &log,
            ))
            .with_action(Probe::new("B", Behavior::Succeed, &log).after(&["A"]));

        let report = runner().run(vec![stage]).await.unwrap();
        assert_eq!(runs(&log), vec!["A", "B"]);
        assert!(!report.is_blocking());
    }

    #[tokio::test]
    async fn second_set_result_is_a_fault() {
        let log = log();
        let stage = Stage::new("system_checks").with_action(Probe::new("A", Behavior::SetTwice, &log));

        let report = runner().run(vec![stage]).await.unwrap();
        let result = &report.get("A").unwrap().result;
        assert_eq!(result.id, UNEXPECTED_ERROR);
        assert!(result.description.contains("was already set"));
    }

    #[tokio::test]
    async fn interrupt_marks_remaining_actions() {
        let log = log();
        let stage = Stage::new("system_checks")
            .with_action(Probe::new("A", Behavior::RaiseInterrupt, &log))
            .with_action(Probe::new("B", Behavior::Succeed, &log))
            .with_action(Probe::new("C", Behavior::Succeed, &log).after(&["B"]));

        let runner = runner();
        let report = runner.run(vec![stage]).await.unwrap();
        assert!(runner.interrupt().is_raised());
        assert_eq!(runs(&log), vec!["A"]);
        assert_eq!(level(&report, "A"), Level::Success);
        for id in ["B", "C"] {
            let result = &report.get(id).unwrap().result;
            assert_eq!(result.level, Level::Error);
            assert_eq!(result.id, INTERRUPTED);
        }
    }

    #[tokio::test]
    async fn stages_run_in_order_with_partitions() {
        let log = log();
        let backup = Arc::new(BackupController::new());
        let checks = Stage::new("system_checks").with_action(Probe::new("CHECK", Behavior::Succeed, &log));
        let changes = Stage::new("pre_ponr_changes")
            .with_action(Probe::new("CHANGE", Behavior::Push("P1", false), &log).after(&["CHECK"]));

        let report = Runner::new(Arc::clone(&backup), RunSettings::default())
            .run(vec![checks, changes])
            .await
            .unwrap();
        assert_eq!(runs(&log), vec!["CHECK", "CHANGE"]);
        assert_eq!(report.get("CHANGE").unwrap().stage, "pre_ponr_changes");
        assert_eq!(backup.partitions(), 2);

        let undone = backup.pop_to_partition();
        assert_eq!(undone.len(), 1);
        assert_eq!(backup.partitions(), 1);
    }

    #[tokio::test]
    async fn prior_results_satisfy_later_runs() {
        let log = log();
        let backup = Arc::new(BackupController::new());
        let pre = Stage::new("pre_ponr_changes").with_action(Probe::new("CHANGE", Behavior::Fail("nope"), &log));
        let report = Runner::new(Arc::clone(&backup), RunSettings::default())
            .run(vec![pre])
            .await
            .unwrap();

        let post = Stage::new("post_ponr_changes")
            .with_action(Probe::new("CLEANUP", Behavior::Succeed, &log).after(&["CHANGE"]));
        let later = Runner::new(backup, RunSettings::default())
            .with_prior_results(&report)
            .run(vec![post])
            .await
            .unwrap();
        assert_eq!(level(&later, "CLEANUP"), Level::Skip);
    }

    #[tokio::test]
    async fn parallel_mode_respects_resources() {
        let log = log();
        let shared_active = Arc::new(AtomicUsize::new(0));
        let shared_peak = Arc::new(AtomicUsize::new(0));
        let free_active = Arc::new(AtomicUsize::new(0));
        let free_peak = Arc::new(AtomicUsize::new(0));

        let busy = |active: &Arc<AtomicUsize>, peak: &Arc<AtomicUsize>| {
            Behavior::Busy(Arc::clone(active), Arc::clone(peak))
        };
        let stage = Stage::new("pre_ponr_changes")
            .with_action(Probe::new("RPM_1", busy(&shared_active, &shared_peak), &log).using(&["rpmdb"]))
            .with_action(Probe::new("RPM_2", busy(&shared_active, &shared_peak), &log).using(&["rpmdb"]))
            .with_action(Probe::new("FREE_1", busy(&free_active, &free_peak), &log))
            .with_action(Probe::new("FREE_2", busy(&free_active, &free_peak), &log))
            .with_action(Probe::new("LAST", Behavior::Succeed, &log).after(&["RPM_1", "FREE_2"]));

        let settings = RunSettings {
            allow_overridable: false,
            parallel: true,
        };
        let report = Runner::new(Arc::new(BackupController::new()), settings)
            .run(vec![stage])
            .await
            .unwrap();

        assert_eq!(shared_peak.load(Ordering::SeqCst), 1);
        assert_eq!(free_peak.load(Ordering::SeqCst), 2);
        assert_eq!(runs(&log).last().map(String::as_str), Some("LAST"));
        assert!(report.entries.iter().all(|e| e.result.level == Level::Success));
    }

    #[test]
    fn batches_split_on_shared_resources() {
        let slot = |id: &str, resources: &[&str]| {
            let action: Box<dyn Action> = Box::new(Probe::new("X", Behavior::Succeed, &log()));
            Slot {
                id: id.to_string(),
                deps: Vec::new(),
                resources: resources.iter().map(|r| r.to_string()).collect(),
                action: Arc::new(Mutex::new(action)),
            }
        };
        let slots = vec![
            slot("A", &["rpmdb"]),
            slot("B", &["rpmdb", "grub"]),
            slot("C", &["grub"]),
            slot("D", &[]),
        ];
        let planned = PlannedStage {
            name: "changes".to_string(),
            order: vec![0, 1, 2, 3],
            depth: vec![0, 0, 0, 0],
        };
        assert_eq!(parallel_batches(&planned, &slots), vec![vec![0, 2, 3], vec![1]]);
    }

    #[tokio::test]
    async fn failed_conversion_rolls_back_in_reverse() {
        let log = log();
        let backup = Arc::new(BackupController::new());
        let stage = Stage::new("pre_ponr_changes")
            .with_action(Probe::new("BACKUP", Behavior::Push("X", false), &log))
            .with_action(Probe::new("CONVERT", Behavior::Push("Y", true), &log).after(&["BACKUP"]));

        let report = Runner::new(Arc::clone(&backup), RunSettings::default())
            .run(vec![stage])
            .await
            .unwrap();
        assert!(report.is_blocking());
        assert_eq!(report.get("CONVERT").unwrap().result.id, UNEXPECTED_ERROR);

        let restored = backup.pop_all().unwrap();
        assert_eq!(restored.len(), 2);
        let restores: Vec<String> = log
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with("restore:"))
            .cloned()
            .collect();
        assert_eq!(restores, vec!["restore:Y", "restore:X"]);
    }

    #[tokio::test]
    async fn events_follow_the_run() {
        let log = log();
        let (sink, mut rx) = ChannelEventSink::new();
        let mut runner = runner();
        runner.add_event_sink(Arc::new(sink));

        let stage = Stage::new("system_checks")
            .with_action(Probe::new("A", Behavior::Fail("x"), &log))
            .with_action(Probe::new("B", Behavior::Succeed, &log).after(&["A"]));
        runner.run(vec![stage]).await.unwrap();
        drop(runner);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert!(matches!(events.first(), Some(RunEvent::Started { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, RunEvent::ActionSkipped { action, .. } if action == "B")));
        assert!(matches!(
            events.last(),
            Some(RunEvent::Completed { blocking: true, .. })
        ));
    }

    #[tokio::test]
    async fn resolution_error_is_published() {
        let log = log();
        let (sink, mut rx) = ChannelEventSink::new();
        let mut runner = runner();
        runner.add_event_sink(Arc::new(sink));

        let stage = Stage::new("system_checks")
            .with_action(Probe::new("A", Behavior::Succeed, &log).after(&["B"]))
            .with_action(Probe::new("B", Behavior::Succeed, &log).after(&["A"]));
        let err = runner.run(vec![stage]).await.unwrap_err();
        assert!(matches!(err, CoreError::DependencyCycle(_)));
        drop(runner);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], RunEvent::Failed { error, .. } if error.contains("A")));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn names_are_joined_naturally() {
        let names = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(join_names(&names(&["A"])), "A");
        assert_eq!(join_names(&names(&["A", "B", "C"])), "A, B and C");
    }
}
