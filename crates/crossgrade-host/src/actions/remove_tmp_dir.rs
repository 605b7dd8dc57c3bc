use std::io::ErrorKind;
use std::sync::Arc;

use crossgrade_core::{Action, ActionContext, ActionResult, Level, ResultTracker};

use crate::context::HostContext;

/// Removes the work directory once the conversion is done. Never blocks.
pub struct RemoveTmpDir {
    host: Arc<HostContext>,
    tracker: ResultTracker,
}

impl RemoveTmpDir {
    pub fn new(host: Arc<HostContext>) -> Self {
        Self {
            host,
            tracker: ResultTracker::new(),
        }
    }
}

impl Action for RemoveTmpDir {
    fn id(&self) -> &str {
        "REMOVE_TMP_DIR"
    }

    fn dependencies(&self) -> &[&str] {
        &["INSTALL_VENDOR_PACKAGES"]
    }

    fn tracker(&self) -> &ResultTracker {
        &self.tracker
    }

    fn tracker_mut(&mut self) -> &mut ResultTracker {
        &mut self.tracker
    }

    fn run(&mut self, _ctx: &ActionContext) -> anyhow::Result<()> {
        let dir = self.host.work_dir();
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {
                tracing::info!(path = %dir.display(), "Temporary folder removed");
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                let warning = format!(
                    "The folder {} is left untouched. You may remove the folder manually \
                     after you ensure there is no preserved data you would need.",
                    dir.display()
                );
                tracing::warn!(path = %dir.display(), error = %e, "Temporary folder not removed");
                self.add_message(
                    ActionResult::new(
                        Level::Warning,
                        "UNSUCCESSFUL_REMOVE_TMP_DIR",
                        format!("Temporary folder {} wasn't removed.", dir.display()),
                    )
                    .description(warning)
                    .diagnosis(e.to_string()),
                );
            }
        }
        Ok(())
    }
}
