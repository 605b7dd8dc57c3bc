use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::config::CrossgradeConfig;
use crate::pkgmanager::{InstallOptions, PackageManager};

/// Everything host actions need, built once by the driver.
///
/// All host paths go through [`HostContext::path`], which maps them below
/// `root` (normally `/`).
#[derive(Debug, Clone)]
pub struct HostContext {
    root: PathBuf,
    pub config: CrossgradeConfig,
    packages: Arc<dyn PackageManager>,
}

impl HostContext {
    pub fn new(config: CrossgradeConfig, packages: Arc<dyn PackageManager>) -> Self {
        Self {
            root: PathBuf::from("/"),
            config,
            packages,
        }
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Resolve an absolute host path below the root.
    pub fn path(&self, host_path: impl AsRef<Path>) -> PathBuf {
        let relative: PathBuf = host_path
            .as_ref()
            .components()
            .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
            .collect();
        self.root.join(relative)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.path(&self.config.backup_dir)
    }

    pub fn work_dir(&self) -> PathBuf {
        self.path(&self.config.work_dir)
    }

    pub fn report_dir(&self) -> PathBuf {
        self.path(&self.config.report_dir)
    }

    pub fn packages(&self) -> Arc<dyn PackageManager> {
        Arc::clone(&self.packages)
    }

    pub fn install_options(&self) -> InstallOptions {
        InstallOptions::from(&self.config.package_manager)
    }
}
