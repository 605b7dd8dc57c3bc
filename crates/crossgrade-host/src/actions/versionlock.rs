use anyhow::Context;
use std::sync::Arc;

use crossgrade_core::{Action, ActionContext, ActionResult, Level, ResultTracker};

use super::back_up_file;
use crate::context::HostContext;

pub const VERSIONLOCK_LIST: &str = "/etc/yum/pluginconf.d/versionlock.list";

/// Version locks pin packages and make the vendor transaction fail. They are
/// cleared only when the operator allows overridable findings.
pub struct ClearVersionlock {
    host: Arc<HostContext>,
    tracker: ResultTracker,
}

impl ClearVersionlock {
    pub fn new(host: Arc<HostContext>) -> Self {
        Self {
            host,
            tracker: ResultTracker::new(),
        }
    }
}

fn lock_entries(content: &str) -> usize {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .count()
}

impl Action for ClearVersionlock {
    fn id(&self) -> &str {
        "CLEAR_VERSIONLOCK"
    }

    fn dependencies(&self) -> &[&str] {
        &["BACKUP_DIR_WRITABLE"]
    }

    fn resources(&self) -> &[&str] {
        &["yum-config"]
    }

    fn tracker(&self) -> &ResultTracker {
        &self.tracker
    }

    fn tracker_mut(&mut self) -> &mut ResultTracker {
        &mut self.tracker
    }

    fn run(&mut self, ctx: &ActionContext) -> anyhow::Result<()> {
        let path = self.host.path(VERSIONLOCK_LIST);
        if !path.is_file() {
            tracing::info!("Versionlock plugin not in use");
            return Ok(());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Cannot read {}", path.display()))?;
        let entries = lock_entries(&content);
        if entries == 0 {
            tracing::info!("No version locks present");
            return Ok(());
        }

        if !ctx.settings.allow_overridable {
            let result = ActionResult::new(
                Level::Overridable,
                "VERSIONLOCK_PRESENT",
                "Package version locks are present.",
            )
            .description("Locked package versions prevent the vendor packages from being installed.")
            .diagnosis(format!("{entries} entries found in {VERSIONLOCK_LIST}"))
            .remediations(
                "Clear the locks with 'yum versionlock clear', or allow overridable findings \
                 to have them cleared and restored on rollback.",
            )
            .variable("entries", entries.to_string());
            self.set_result(result)?;
            return Ok(());
        }

        if let Err(finding) = back_up_file(ctx, &self.host, &path) {
            self.set_result(finding.into_result(Level::Error))?;
            return Ok(());
        }
        std::fs::write(&path, "").with_context(|| format!("Cannot clear {}", path.display()))?;

        tracing::warn!(entries, "Version locks cleared");
        self.add_message(
            ActionResult::new(Level::Warning, "VERSIONLOCK_CLEARED", "Package version locks were cleared.")
                .description(format!(
                    "{entries} version locks were removed and will be restored on rollback."
                )),
        );
        Ok(())
    }
}
