use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Subcommand};

use crossgrade_core::event::TracingEventSink;
use crossgrade_core::{Interrupt, RunSettings};
use crossgrade_host::applock::AppLock;
use crossgrade_host::config::DEFAULT_CONFIG_PATH;
use crossgrade_host::pkgmanager::YumPackageManager;
use crossgrade_host::{CrossgradeConfig, Driver, HostContext, Mode};

pub mod analyze;
pub mod convert;
pub mod list_actions;
pub mod validate;

#[derive(Subcommand)]
pub enum Commands {
    /// Convert this host past the point of no return
    Convert(convert::ConvertArgs),
    /// Run all checks and pre-conversion changes, then roll everything back
    Analyze(analyze::AnalyzeArgs),
    /// List the registered actions with their stage and dependencies
    ListActions(list_actions::ListActionsArgs),
    /// Validate the config file and the action registry without running
    Validate(validate::ValidateArgs),
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Path to the crossgrade YAML config file
    #[arg(short, long, env = "CROSSGRADE_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

impl ConfigArgs {
    pub fn load(&self) -> anyhow::Result<CrossgradeConfig> {
        let config = CrossgradeConfig::from_file(&self.config)?;
        tracing::debug!(path = %self.config.display(), "Loaded configuration");
        Ok(config)
    }
}

/// Build the host context for a real run. Installs and queries share the
/// interrupt so child processes are killed on Ctrl-C; removal on rollback
/// ignores it.
pub fn host_context(config: CrossgradeConfig, interrupt: &Interrupt) -> Arc<HostContext> {
    let packages = Arc::new(
        YumPackageManager::new(config.package_manager.command.clone(), interrupt.clone())
            .with_rpm(config.package_manager.rpm.clone()),
    );
    Arc::new(HostContext::new(config, packages))
}

/// Shared body of `convert` and `analyze`.
pub async fn run_conversion<F>(
    mode: Mode,
    config: CrossgradeConfig,
    settings: RunSettings,
    confirm: F,
) -> anyhow::Result<ExitCode>
where
    F: FnOnce() -> bool,
{
    let _lock = AppLock::acquire(&config.lock_dir, "crossgrade")?;

    let interrupt = Interrupt::new();
    let signal = interrupt.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received interrupt signal");
            signal.raise();
        }
    });

    let host = host_context(config, &interrupt);
    let mut driver = Driver::new(host, settings).with_interrupt(interrupt);
    driver.add_event_sink(Arc::new(TracingEventSink));

    let outcome = driver.run(mode, confirm).await?;

    println!("{}", outcome.report);
    for path in &outcome.report_files {
        println!("Report written to {}", path.display());
    }
    if !outcome.rollback_failures.is_empty() {
        eprintln!("Rollback failed for:");
        for failure in &outcome.rollback_failures {
            eprintln!("  - {failure}");
        }
    }

    Ok(ExitCode::from(outcome.status.code()))
}
