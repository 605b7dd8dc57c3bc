use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crossgrade_core::RunSettings;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/crossgrade/crossgrade.yaml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Cannot expand {value}: {reason}")]
    Expand { value: String, reason: String },

    #[error("{key} must be an absolute path, got {path}")]
    NotAbsolute { key: &'static str, path: PathBuf },
}

/// Top-level config file structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossgradeConfig {
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
    #[serde(default)]
    pub allow_overridable: bool,
    #[serde(default)]
    pub parallel: bool,
    /// Files saved before the conversion and put back on rollback.
    #[serde(default)]
    pub backup_files: Vec<PathBuf>,
    /// Files expected to be created by the conversion and removed on rollback.
    #[serde(default)]
    pub created_files: Vec<PathBuf>,
    #[serde(default)]
    pub vendor_packages: Vec<String>,
    #[serde(default)]
    pub package_manager: PackageManagerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManagerConfig {
    #[serde(default = "default_pm_command")]
    pub command: String,
    /// Used for queries and for removal on rollback.
    #[serde(default = "default_rpm_command")]
    pub rpm: String,
    #[serde(default)]
    pub enable_repos: Vec<String>,
    #[serde(default)]
    pub disable_repos: Vec<String>,
}

impl Default for PackageManagerConfig {
    fn default() -> Self {
        Self {
            command: default_pm_command(),
            rpm: default_rpm_command(),
            enable_repos: Vec::new(),
            disable_repos: Vec::new(),
        }
    }
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("/var/lib/crossgrade")
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("/var/lib/crossgrade/backup")
}

fn default_lock_dir() -> PathBuf {
    PathBuf::from("/var/run/lock")
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("/var/log/crossgrade")
}

fn default_pm_command() -> String {
    "yum".to_string()
}

fn default_rpm_command() -> String {
    "rpm".to_string()
}

impl Default for CrossgradeConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            backup_dir: default_backup_dir(),
            lock_dir: default_lock_dir(),
            report_dir: default_report_dir(),
            allow_overridable: false,
            parallel: false,
            backup_files: Vec::new(),
            created_files: Vec::new(),
            vendor_packages: Vec::new(),
            package_manager: PackageManagerConfig::default(),
        }
    }
}

impl CrossgradeConfig {
    /// Load the config file. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        // An empty document is a valid, all-defaults config.
        let mut config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.expand()?;
        config.validate()?;
        Ok(config)
    }

    /// Expand `~` and `$VARS` in every path.
    fn expand(&mut self) -> Result<(), ConfigError> {
        for path in [
            &mut self.work_dir,
            &mut self.backup_dir,
            &mut self.lock_dir,
            &mut self.report_dir,
        ] {
            *path = expand_path(path)?;
        }
        for path in self.backup_files.iter_mut().chain(self.created_files.iter_mut()) {
            *path = expand_path(path)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let dirs = [
            ("work_dir", &self.work_dir),
            ("backup_dir", &self.backup_dir),
            ("lock_dir", &self.lock_dir),
            ("report_dir", &self.report_dir),
        ];
        let files = self
            .backup_files
            .iter()
            .map(|p| ("backup_files", p))
            .chain(self.created_files.iter().map(|p| ("created_files", p)));

        for (key, path) in dirs.into_iter().chain(files) {
            if !path.is_absolute() {
                return Err(ConfigError::NotAbsolute {
                    key,
                    path: path.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn settings(&self) -> RunSettings {
        RunSettings {
            allow_overridable: self.allow_overridable,
            parallel: self.parallel,
        }
    }
}

fn expand_path(path: &Path) -> Result<PathBuf, ConfigError> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw).map_err(|e| ConfigError::Expand {
        value: raw.to_string(),
        reason: e.to_string(),
    })?;
    Ok(PathBuf::from(expanded.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = CrossgradeConfig::from_file(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, CrossgradeConfig::default());
        assert_eq!(config.package_manager.command, "yum");
        assert!(!config.settings().allow_overridable);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let yaml = r#"
allow_overridable: true
backup_files:
  - /etc/example.conf
vendor_packages: [vendor-release, vendor-logos]
package_manager:
  command: dnf
  enable_repos: [vendor-base]
"#;
        let config = CrossgradeConfig::from_yaml(yaml).unwrap();
        assert!(config.allow_overridable);
        assert!(!config.parallel);
        assert_eq!(config.backup_files, vec![PathBuf::from("/etc/example.conf")]);
        assert_eq!(config.vendor_packages.len(), 2);
        assert_eq!(config.package_manager.command, "dnf");
        assert_eq!(config.package_manager.rpm, "rpm");
        assert_eq!(config.package_manager.enable_repos, vec!["vendor-base"]);
        assert!(config.package_manager.disable_repos.is_empty());
        assert_eq!(config.backup_dir, PathBuf::from("/var/lib/crossgrade/backup"));
    }

    #[test]
    fn empty_file_is_valid() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("crossgrade.yaml");
        std::fs::write(&path, "\n").unwrap();
        assert_eq!(
            CrossgradeConfig::from_file(&path).unwrap(),
            CrossgradeConfig::default()
        );
    }

    #[test]
    fn relative_paths_are_rejected() {
        let err = CrossgradeConfig::from_yaml("backup_files: [etc/passwd]").unwrap_err();
        assert!(matches!(err, ConfigError::NotAbsolute { key: "backup_files", .. }));
    }

    #[test]
    fn environment_variables_are_expanded() {
        std::env::set_var("CROSSGRADE_TEST_ROOT", "/srv/convert");
        let config = CrossgradeConfig::from_yaml("work_dir: $CROSSGRADE_TEST_ROOT/work").unwrap();
        assert_eq!(config.work_dir, PathBuf::from("/srv/convert/work"));
    }

    #[test]
    fn malformed_yaml_is_reported() {
        assert!(matches!(
            CrossgradeConfig::from_yaml("allow_overridable: [1, 2"),
            Err(ConfigError::Parse(_))
        ));
    }
}
