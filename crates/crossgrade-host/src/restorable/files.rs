use anyhow::Context;
use sha2::{Digest, Sha256};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use crossgrade_core::RestorableChange;

use super::{ChangeState, RestorableError};

/// A file saved to the backup area and copied back on restore.
#[derive(Debug)]
pub struct RestorableFile {
    path: PathBuf,
    backup_dir: PathBuf,
    backup_path: Option<PathBuf>,
    state: ChangeState,
}

impl RestorableFile {
    pub fn new(path: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Result<Self, RestorableError> {
        let path = path.into();
        if !path.is_absolute() {
            return Err(RestorableError::NotAbsolute(path));
        }
        if path.is_dir() {
            return Err(RestorableError::IsDirectory(path));
        }
        Ok(Self {
            path,
            backup_dir: backup_dir.into(),
            backup_path: None,
            state: ChangeState::Pending,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> Option<&Path> {
        self.backup_path.as_deref()
    }

    /// `<backup_dir>/<sha256 of parent dir>/<file name>`. Hashing the parent
    /// keeps equally named files from different directories apart.
    fn hashed_backup_path(&self) -> anyhow::Result<PathBuf> {
        let parent = self.path.parent().unwrap_or(Path::new("/"));
        let file_name = self
            .path
            .file_name()
            .with_context(|| format!("{} has no file name", self.path.display()))?;

        let mut hasher = Sha256::new();
        hasher.update(parent.as_os_str().as_bytes());
        let dir = self.backup_dir.join(hex::encode(hasher.finalize()));
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create backup directory {}", dir.display()))?;
        Ok(dir.join(file_name))
    }
}

impl RestorableChange for RestorableFile {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
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

        if !self.path.is_file() {
            tracing::info!(path = %self.path.display(), "File not present, nothing to back up");
            return Ok(());
        }

        let backup = self.hashed_backup_path()?;
        std::fs::copy(&self.path, &backup).with_context(|| {
            format!(
                "Failed to back up {} to {}",
                self.path.display(),
                backup.display()
            )
        })?;
        tracing::info!(path = %self.path.display(), backup = %backup.display(), "File backed up");

        self.backup_path = Some(backup);
        self.state = ChangeState::Enabled;
        Ok(())
    }

    fn restore(&mut self) -> anyhow::Result<()> {
        if self.state != ChangeState::Enabled {
            tracing::info!(path = %self.path.display(), "File was not backed up, nothing to restore");
            return Ok(());
        }
        let Some(backup) = self.backup_path.clone().filter(|b| b.is_file()) else {
            tracing::warn!(path = %self.path.display(), "Backup copy is missing, cannot restore");
            return Ok(());
        };

        std::fs::copy(&backup, &self.path)
            .with_context(|| format!("Failed to restore {}", self.path.display()))?;
        std::fs::remove_file(&backup)
            .with_context(|| format!("Failed to remove backup {}", backup.display()))?;

        tracing::info!(path = %self.path.display(), "File restored");
        self.backup_path = None;
        self.state = ChangeState::Restored;
        Ok(())
    }
}

/// A file absent before the conversion; restore removes it if it appeared.
#[derive(Debug)]
pub struct MissingFile {
    path: PathBuf,
    state: ChangeState,
}

impl MissingFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: ChangeState::Pending,
        }
    }
}

impl RestorableChange for MissingFile {
    fn describe(&self) -> String {
        format!("missing file {}", self.path.display())
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
        if self.path.exists() {
            tracing::debug!(path = %self.path.display(), "File already present, not tracking it as missing");
            return Ok(());
        }
        tracing::info!(path = %self.path.display(), "Marking file as missing");
        self.state = ChangeState::Enabled;
        Ok(())
    }

    fn restore(&mut self) -> anyhow::Result<()> {
        if self.state != ChangeState::Enabled {
            return Ok(());
        }
        if self.path.is_file() {
            std::fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove {}", self.path.display()))?;
            tracing::info!(path = %self.path.display(), "Removed file created during conversion");
        } else {
            tracing::info!(path = %self.path.display(), "File was not created during conversion");
        }
        self.state = ChangeState::Restored;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossgrade_core::BackupController;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        etc: PathBuf,
        backup: PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let etc = tmp.path().join("etc");
        let backup = tmp.path().join("backup");
        std::fs::create_dir_all(&etc).unwrap();
        Fixture {
            etc,
            backup,
            _tmp: tmp,
        }
    }

    #[test]
    fn rejects_relative_and_directory_paths() {
        let fx = fixture();
        assert!(matches!(
            RestorableFile::new("etc/passwd", &fx.backup),
            Err(RestorableError::NotAbsolute(_))
        ));
        assert!(matches!(
            RestorableFile::new(&fx.etc, &fx.backup),
            Err(RestorableError::IsDirectory(_))
        ));
    }

    #[test]
    fn backup_lands_under_hashed_parent() {
        let fx = fixture();
        let path = fx.etc.join("example.conf");
        std::fs::write(&path, "original").unwrap();

        let mut change = RestorableFile::new(&path, &fx.backup).unwrap();
        change.enable().unwrap();

        let digest = hex::encode(Sha256::digest(fx.etc.as_os_str().as_bytes()));
        let expected = fx.backup.join(digest).join("example.conf");
        assert_eq!(change.backup_path(), Some(expected.as_path()));
        assert_eq!(std::fs::read_to_string(expected).unwrap(), "original");
    }

    #[test]
    fn enable_is_idempotent() {
        let fx = fixture();
        let path = fx.etc.join("example.conf");
        std::fs::write(&path, "original").unwrap();

        let mut change = RestorableFile::new(&path, &fx.backup).unwrap();
        change.enable().unwrap();
        std::fs::write(&path, "modified").unwrap();
        change.enable().unwrap();

        // The second enable must not overwrite the saved original.
        let backup = change.backup_path().unwrap().to_path_buf();
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "original");
    }

    #[test]
    fn restore_puts_original_back_and_drops_backup() {
        let fx = fixture();
        let path = fx.etc.join("example.conf");
        std::fs::write(&path, "original").unwrap();

        let mut change = RestorableFile::new(&path, &fx.backup).unwrap();
        change.enable().unwrap();
        let backup = change.backup_path().unwrap().to_path_buf();
        std::fs::write(&path, "converted").unwrap();

        change.restore().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "original");
        assert!(!backup.exists());
        assert!(!change.is_enabled());
        assert!(change.enable().is_err());
    }

    #[test]
    fn absent_file_stays_pending() {
        let fx = fixture();
        let mut change = RestorableFile::new(fx.etc.join("absent.conf"), &fx.backup).unwrap();
        change.enable().unwrap();
        assert!(!change.is_enabled());
        change.restore().unwrap();
        assert!(!fx.etc.join("absent.conf").exists());
    }

    #[test]
    fn restore_without_enable_is_a_noop() {
        let fx = fixture();
        let path = fx.etc.join("example.conf");
        std::fs::write(&path, "live").unwrap();

        let mut change = RestorableFile::new(&path, &fx.backup).unwrap();
        change.restore().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "live");
        assert!(!fx.backup.exists());
    }

    #[test]
    fn missing_file_removes_created_file() {
        let fx = fixture();
        let path = fx.etc.join("vendor.repo");

        let controller = BackupController::new();
        controller.push(Box::new(MissingFile::new(&path))).unwrap();
        std::fs::write(&path, "created by conversion").unwrap();

        controller.pop_all().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn missing_file_ignores_preexisting_file() {
        let fx = fixture();
        let path = fx.etc.join("vendor.repo");
        std::fs::write(&path, "already here").unwrap();

        let mut change = MissingFile::new(&path);
        change.enable().unwrap();
        assert!(!change.is_enabled());
        change.restore().unwrap();
        assert!(path.exists());
    }
}
