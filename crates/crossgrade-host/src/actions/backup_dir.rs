use std::sync::Arc;

use crossgrade_core::{Action, ActionContext, ActionResult, Level, ResultTracker};

use crate::context::HostContext;

/// Checks that backups can be written before anything is changed.
pub struct BackupDirWritable {
    host: Arc<HostContext>,
    tracker: ResultTracker,
}

impl BackupDirWritable {
    pub fn new(host: Arc<HostContext>) -> Self {
        Self {
            host,
            tracker: ResultTracker::new(),
        }
    }
}

impl Action for BackupDirWritable {
    fn id(&self) -> &str {
        "BACKUP_DIR_WRITABLE"
    }

    fn tracker(&self) -> &ResultTracker {
        &self.tracker
    }

    fn tracker_mut(&mut self) -> &mut ResultTracker {
        &mut self.tracker
    }

    fn run(&mut self, _ctx: &ActionContext) -> anyhow::Result<()> {
        let dir = self.host.backup_dir();
        let writable = std::fs::create_dir_all(&dir).and_then(|()| tempfile::NamedTempFile::new_in(&dir));

        match writable {
            Ok(_file) => {
                tracing::info!(path = %dir.display(), "Backup directory is writable");
            }
            Err(e) => {
                let result = ActionResult::new(
                    Level::Error,
                    "BACKUP_DIR_NOT_WRITABLE",
                    "The backup directory is not writable.",
                )
                .description("Files changed by the conversion cannot be saved, so a rollback would be impossible.")
                .diagnosis(format!("Cannot write to {}: {e}", dir.display()))
                .remediations("Make sure the configured backup_dir is on a writable file system.")
                .variable("backup_dir", dir.display().to_string());
                self.set_result(result)?;
            }
        }
        Ok(())
    }
}
