use std::sync::Arc;

use crossgrade_core::{Action, ActionContext, Level, ResultTracker};

use super::back_up_file;
use crate::context::HostContext;
use crate::restorable::MissingFile;

const RELEASE_FILES: [&str; 2] = ["/etc/os-release", "/etc/system-release"];

/// Saves the distribution identity files the conversion replaces.
pub struct BackupReleaseFiles {
    host: Arc<HostContext>,
    tracker: ResultTracker,
}

impl BackupReleaseFiles {
    pub fn new(host: Arc<HostContext>) -> Self {
        Self {
            host,
            tracker: ResultTracker::new(),
        }
    }
}

impl Action for BackupReleaseFiles {
    fn id(&self) -> &str {
        "BACKUP_RELEASE_FILES"
    }

    fn dependencies(&self) -> &[&str] {
        &["BACKUP_DIR_WRITABLE"]
    }

    fn tracker(&self) -> &ResultTracker {
        &self.tracker
    }

    fn tracker_mut(&mut self) -> &mut ResultTracker {
        &mut self.tracker
    }

    fn run(&mut self, ctx: &ActionContext) -> anyhow::Result<()> {
        for file in RELEASE_FILES {
            let path = self.host.path(file);
            if let Err(finding) = back_up_file(ctx, &self.host, &path) {
                self.set_result(finding.into_result(Level::Error))?;
                return Ok(());
            }
        }
        Ok(())
    }
}

/// Saves operator-configured files and tracks files the conversion will
/// create.
pub struct BackupConfiguredFiles {
    host: Arc<HostContext>,
    tracker: ResultTracker,
}

impl BackupConfiguredFiles {
    pub fn new(host: Arc<HostContext>) -> Self {
        Self {
            host,
            tracker: ResultTracker::new(),
        }
    }
}

impl Action for BackupConfiguredFiles {
    fn id(&self) -> &str {
        "BACKUP_CONFIGURED_FILES"
    }

    fn dependencies(&self) -> &[&str] {
        &["BACKUP_DIR_WRITABLE"]
    }

    fn tracker(&self) -> &ResultTracker {
        &self.tracker
    }

    fn tracker_mut(&mut self) -> &mut ResultTracker {
        &mut self.tracker
    }

    fn run(&mut self, ctx: &ActionContext) -> anyhow::Result<()> {
        let host = Arc::clone(&self.host);

        for file in &host.config.backup_files {
            let path = host.path(file);
            if let Err(finding) = back_up_file(ctx, &host, &path) {
                self.set_result(finding.into_result(Level::Error))?;
                return Ok(());
            }
        }

        for file in &host.config.created_files {
            ctx.backup.push(Box::new(MissingFile::new(host.path(file))))?;
        }

        tracing::info!(
            saved = host.config.backup_files.len(),
            tracked_missing = host.config.created_files.len(),
            "Configured files tracked"
        );
        Ok(())
    }
}
