use std::sync::Arc;

use crossgrade_core::{Action, ActionContext, ActionResult, CoreError, Level, ResultTracker};

use crate::context::HostContext;
use crate::restorable::RestorablePackageSet;

pub struct InstallVendorPackages {
    host: Arc<HostContext>,
    tracker: ResultTracker,
}

impl InstallVendorPackages {
    pub fn new(host: Arc<HostContext>) -> Self {
        Self {
            host,
            tracker: ResultTracker::new(),
        }
    }
}

impl Action for InstallVendorPackages {
    fn id(&self) -> &str {
        "INSTALL_VENDOR_PACKAGES"
    }

    fn dependencies(&self) -> &[&str] {
        &[
            "READ_ONLY_MOUNTS_MNT",
            "READ_ONLY_MOUNTS_SYS",
            "BACKUP_RELEASE_FILES",
            "CLEAR_VERSIONLOCK",
        ]
    }

    fn resources(&self) -> &[&str] {
        &["rpmdb"]
    }

    fn tracker(&self) -> &ResultTracker {
        &self.tracker
    }

    fn tracker_mut(&mut self) -> &mut ResultTracker {
        &mut self.tracker
    }

    fn run(&mut self, ctx: &ActionContext) -> anyhow::Result<()> {
        let packages = self.host.config.vendor_packages.clone();
        if packages.is_empty() {
            tracing::info!("No vendor packages scheduled");
            return Ok(());
        }

        let set = RestorablePackageSet::new(packages.clone(), self.host.install_options(), self.host.packages());
        match ctx.backup.push(Box::new(set)) {
            Ok(()) => Ok(()),
            Err(CoreError::EnableFailed { source, .. }) => {
                let result = ActionResult::new(
                    Level::Error,
                    "FAILED_TO_INSTALL_SCHEDULED_PACKAGES",
                    "Failed to install scheduled packages.",
                )
                .description("The vendor packages required for the conversion could not be installed.")
                .diagnosis(format!(
                    "Failed to install packages {}: {source:#}",
                    packages.join(", ")
                ))
                .variable("packages", packages.join(" "));
                self.set_result(result)?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
