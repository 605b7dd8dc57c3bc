use anyhow::Context;
use std::fmt;

use crossgrade_core::Interrupt;

use crate::command::run_command;
use crate::config::PackageManagerConfig;

/// Repositories to toggle for a single install transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOptions {
    pub enable_repos: Vec<String>,
    pub disable_repos: Vec<String>,
}

impl From<&PackageManagerConfig> for InstallOptions {
    fn from(config: &PackageManagerConfig) -> Self {
        Self {
            enable_repos: config.enable_repos.clone(),
            disable_repos: config.disable_repos.clone(),
        }
    }
}

/// The host's package manager, kept behind a narrow interface.
pub trait PackageManager: Send + Sync + fmt::Debug {
    /// Install `packages` and return the names that were installed.
    fn install(&self, packages: &[String], options: &InstallOptions) -> anyhow::Result<Vec<String>>;

    /// Remove `packages` without touching their dependents.
    fn remove(&self, packages: &[String]) -> anyhow::Result<()>;

    fn is_installed(&self, package: &str) -> anyhow::Result<bool>;
}

/// yum/dnf for transactions, rpm for queries and removal.
#[derive(Debug, Clone)]
pub struct YumPackageManager {
    command: String,
    rpm: String,
    interrupt: Interrupt,
}

impl YumPackageManager {
    pub fn new(command: impl Into<String>, interrupt: Interrupt) -> Self {
        Self {
            command: command.into(),
            rpm: "rpm".to_string(),
            interrupt,
        }
    }

    pub fn with_rpm(mut self, rpm: impl Into<String>) -> Self {
        self.rpm = rpm.into();
        self
    }

    fn install_args(packages: &[String], options: &InstallOptions) -> Vec<String> {
        let mut args = vec!["install".to_string(), "-y".to_string()];
        for repo in &options.disable_repos {
            args.push(format!("--disablerepo={repo}"));
        }
        for repo in &options.enable_repos {
            args.push(format!("--enablerepo={repo}"));
        }
        args.extend(packages.iter().cloned());
        args
    }
}

impl PackageManager for YumPackageManager {
    fn install(&self, packages: &[String], options: &InstallOptions) -> anyhow::Result<Vec<String>> {
        let args = Self::install_args(packages, options);
        let output = run_command(&self.command, &args, &self.interrupt)
            .with_context(|| format!("{} install", self.command))?;
        if !output.success() {
            anyhow::bail!(
                "{} install {} exited with {}: {}",
                self.command,
                packages.join(" "),
                output.status,
                output.combined()
            );
        }
        tracing::info!(packages = ?packages, "Packages installed");
        Ok(packages.to_vec())
    }

    /// Runs during rollback, which must finish even after the run was
    /// interrupted, so the child is never killed.
    fn remove(&self, packages: &[String]) -> anyhow::Result<()> {
        let mut args = vec!["-e".to_string(), "--nodeps".to_string()];
        args.extend(packages.iter().cloned());
        let output = run_command(&self.rpm, &args, &Interrupt::new())
            .with_context(|| format!("{} -e", self.rpm))?;
        if !output.success() {
            anyhow::bail!(
                "{} -e {} exited with {}: {}",
                self.rpm,
                packages.join(" "),
                output.status,
                output.combined()
            );
        }
        tracing::info!(packages = ?packages, "Packages removed");
        Ok(())
    }

    fn is_installed(&self, package: &str) -> anyhow::Result<bool> {
        let args = vec!["-q".to_string(), package.to_string()];
        let output = run_command(&self.rpm, &args, &self.interrupt)
            .with_context(|| format!("{} -q", self.rpm))?;
        Ok(output.success())
    }
}
