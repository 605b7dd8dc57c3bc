use std::path::Path;
use std::sync::Arc;

use crossgrade_core::{ActionContext, CoreError, Finding, Stage};

use crate::context::HostContext;
use crate::restorable::RestorableFile;

pub mod backup_dir;
pub mod backup_files;
pub mod readonly_mounts;
pub mod remove_tmp_dir;
pub mod vendor_packages;
pub mod versionlock;

pub use backup_dir::BackupDirWritable;
pub use backup_files::{BackupConfiguredFiles, BackupReleaseFiles};
pub use readonly_mounts::ReadonlyMount;
pub use remove_tmp_dir::RemoveTmpDir;
pub use vendor_packages::InstallVendorPackages;
pub use versionlock::ClearVersionlock;

pub const SYSTEM_CHECKS: &str = "system_checks";
pub const PRE_PONR_CHANGES: &str = "pre_ponr_changes";
pub const POST_PONR_CHANGES: &str = "post_ponr_changes";

/// Stages run before the point of no return.
pub fn pre_ponr_stages(host: &Arc<HostContext>) -> Vec<Stage> {
    vec![
        Stage::new(SYSTEM_CHECKS)
            .with_action(ReadonlyMount::mnt(Arc::clone(host)))
            .with_action(ReadonlyMount::sys(Arc::clone(host)))
            .with_action(BackupDirWritable::new(Arc::clone(host))),
        Stage::new(PRE_PONR_CHANGES)
            .with_action(BackupReleaseFiles::new(Arc::clone(host)))
            .with_action(BackupConfiguredFiles::new(Arc::clone(host)))
            .with_action(ClearVersionlock::new(Arc::clone(host)))
            .with_action(InstallVendorPackages::new(Arc::clone(host))),
    ]
}

/// Stages run after the point of no return.
pub fn post_ponr_stages(host: &Arc<HostContext>) -> Vec<Stage> {
    vec![Stage::new(POST_PONR_CHANGES).with_action(RemoveTmpDir::new(Arc::clone(host)))]
}

/// Static description of a registered action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionInfo {
    pub id: String,
    pub stage: String,
    pub dependencies: Vec<String>,
}

pub fn catalog(host: &Arc<HostContext>) -> Vec<ActionInfo> {
    pre_ponr_stages(host)
        .into_iter()
        .chain(post_ponr_stages(host))
        .flat_map(|stage| {
            let name = stage.name;
            stage.actions.into_iter().map(move |action| ActionInfo {
                id: action.id().to_string(),
                stage: name.clone(),
                dependencies: action.dependencies().iter().map(|d| d.to_string()).collect(),
            })
        })
        .collect()
}

/// Push a [`RestorableFile`] for `path`. Callers report the finding as an
/// ERROR result.
pub(crate) fn back_up_file(ctx: &ActionContext, host: &HostContext, path: &Path) -> Result<(), Finding> {
    let change = RestorableFile::new(path, host.backup_dir()).map_err(|e| {
        Finding::new("INVALID_BACKUP_PATH", "Cannot back up the requested path.").diagnosis(e.to_string())
    })?;
    ctx.backup
        .push(Box::new(change))
        .map_err(|e| backup_failure(path, &e))
}

fn backup_failure(path: &Path, err: &CoreError) -> Finding {
    Finding::new(
        "FAILED_TO_SAVE_FILE_TO_BACKUP_DIR",
        "Failed to copy file to the backup directory.",
    )
    .description(
        "Copying the current file has failed. The file could not be restored on rollback, \
         so it is unsafe to continue.",
    )
    .diagnosis(format!("Failed to back up {}: {err:#}", path.display()))
    .variable("path", path.display().to_string())
}
