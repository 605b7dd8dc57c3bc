use std::sync::Arc;

use crossgrade_core::RestorableChange;

use super::{ChangeState, RestorableError};
use crate::pkgmanager::{InstallOptions, PackageManager};

/// Packages installed for the conversion; restore removes exactly the ones
/// this change installed.
#[derive(Debug)]
pub struct RestorablePackageSet {
    packages: Vec<String>,
    options: InstallOptions,
    manager: Arc<dyn PackageManager>,
    installed: Vec<String>,
    state: ChangeState,
}

impl RestorablePackageSet {
    pub fn new(packages: Vec<String>, options: InstallOptions, manager: Arc<dyn PackageManager>) -> Self {
        Self {
            packages,
            options,
            manager,
            installed: Vec::new(),
            state: ChangeState::Pending,
        }
    }

    pub fn installed(&self) -> &[String] {
        &self.installed
    }
}

impl RestorableChange for RestorablePackageSet {
    fn describe(&self) -> String {
        format!("package set [{}]", self.packages.join(", "))
    }

    fn is_enabled(&self) -> bool {
        self.state == ChangeState::Enabled
    }

    fn enable(&mut self) -> anyhow::Result<()> {
        match self.state {
            ChangeState::Enabled => return Ok(()),
            ChangeState::Restored => return Err(RestorableError::AlreadyRestored(self.describe()).into()),
            ChangeState::Pending => {}
        }

        let mut wanted = Vec::new();
        for package in &self.packages {
            if self.manager.is_installed(package)? {
                tracing::debug!(package = %package, "Already installed, leaving it out of the set");
            } else {
                wanted.push(package.clone());
            }
        }

        if wanted.is_empty() {
            tracing::info!("All packages were already installed");
        } else {
            tracing::info!(packages = ?wanted, "Installing package set");
            self.installed = self.manager.install(&wanted, &self.options)?;
        }
        self.state = ChangeState::Enabled;
        Ok(())
    }

    fn restore(&mut self) -> anyhow::Result<()> {
        if self.state != ChangeState::Enabled {
            return Ok(());
        }
        if !self.installed.is_empty() {
            tracing::info!(packages = ?self.installed, "Removing installed package set");
            self.manager.remove(&self.installed)?;
        }
        self.installed.clear();
        self.state = ChangeState::Restored;
        Ok(())
    }
}
