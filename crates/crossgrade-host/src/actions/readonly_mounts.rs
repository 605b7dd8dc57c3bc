use anyhow::Context;
use std::sync::Arc;

use crossgrade_core::{Action, ActionContext, ActionResult, Level, ResultTracker};

use crate::context::HostContext;

const PROC_MOUNTS: &str = "/proc/mounts";

/// Fails when a mount point the conversion writes to is mounted read-only.
pub struct ReadonlyMount {
    host: Arc<HostContext>,
    id: &'static str,
    mount_point: &'static str,
    error_id: &'static str,
    remediation: &'static str,
    tracker: ResultTracker,
}

impl ReadonlyMount {
    pub fn mnt(host: Arc<HostContext>) -> Self {
        Self {
            host,
            id: "READ_ONLY_MOUNTS_MNT",
            mount_point: "/mnt",
            error_id: "MNT_DIR_READONLY_MOUNT",
            remediation: "Mount at a subdirectory of /mnt to have /mnt writeable.",
            tracker: ResultTracker::new(),
        }
    }

    pub fn sys(host: Arc<HostContext>) -> Self {
        Self {
            host,
            id: "READ_ONLY_MOUNTS_SYS",
            mount_point: "/sys",
            error_id: "SYS_DIR_READONLY_MOUNT",
            remediation: "Ensure mount point is writable before executing the conversion.",
            tracker: ResultTracker::new(),
        }
    }
}

/// Whether `mount_point` appears in `/proc/mounts` content with the `ro` flag.
pub fn is_readonly_mount(mounts: &str, mount_point: &str) -> bool {
    mounts.lines().any(|line| {
        let mut fields = line.split_whitespace();
        let (Some(_device), Some(target), Some(_fstype), Some(flags)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return false;
        };
        target == mount_point && flags.split(',').any(|f| f == "ro")
    })
}

impl Action for ReadonlyMount {
    fn id(&self) -> &str {
        self.id
    }

    fn tracker(&self) -> &ResultTracker {
        &self.tracker
    }

    fn tracker_mut(&mut self) -> &mut ResultTracker {
        &mut self.tracker
    }

    fn run(&mut self, _ctx: &ActionContext) -> anyhow::Result<()> {
        let path = self.host.path(PROC_MOUNTS);
        let mounts = std::fs::read_to_string(&path)
            .with_context(|| format!("Cannot read {}", path.display()))?;

        if is_readonly_mount(&mounts, self.mount_point) {
            let result = ActionResult::new(
                Level::Error,
                self.error_id,
                format!("Read-only {} mount detected", self.mount_point),
            )
            .description(format!(
                "Stopping conversion due to read-only mount to {} directory.",
                self.mount_point
            ))
            .remediations(self.remediation)
            .variable("mount_point", self.mount_point);
            self.set_result(result)?;
        } else {
            tracing::info!(mount_point = self.mount_point, "Read-only mount point not detected");
        }
        Ok(())
    }
}
