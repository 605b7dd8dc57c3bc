use std::io::{ErrorKind, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("{} locked by process {pid}", path.display())]
    Locked { path: PathBuf, pid: u32 },

    #[error("{} has invalid contents", path.display())]
    Corrupt { path: PathBuf },

    #[error("Lock file {} could not be handled: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Single-instance lock backed by a pid file.
///
/// The pid file is written to a temporary file and hard-linked into place,
/// so it never exists half-written. Garbage in an existing file is treated
/// as locked. Released on drop.
#[derive(Debug)]
pub struct AppLock {
    path: PathBuf,
    pid: u32,
}

impl AppLock {
    pub fn acquire(lock_dir: &Path, name: &str) -> Result<Self, LockError> {
        Self::acquire_as(lock_dir, name, std::process::id())
    }

    fn acquire_as(lock_dir: &Path, name: &str, pid: u32) -> Result<Self, LockError> {
        let path = lock_dir.join(format!("{name}.pid"));
        let io_err = |source| LockError::Io {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(lock_dir).map_err(io_err)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(name)
            .suffix(".pid")
            .tempfile_in(lock_dir)
            .map_err(io_err)?;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))
            .map_err(io_err)?;
        writeln!(tmp, "{pid}").map_err(io_err)?;
        tmp.flush().map_err(io_err)?;

        match std::fs::hard_link(tmp.path(), &path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), pid, "Application lock acquired");
                Ok(Self { path, pid })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => match read_pid(&path)? {
                Some(holder) if holder == pid => Ok(Self { path, pid }),
                Some(holder) => Err(LockError::Locked { path, pid: holder }),
                // Removed between link and read; report it as held to stay safe.
                None => Err(LockError::Locked { path, pid: 0 }),
            },
            Err(source) => Err(LockError::Io { path, source }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock if the pid file still holds our pid.
    pub fn release(&self) -> Result<(), LockError> {
        if read_pid(&self.path)? != Some(self.pid) {
            return Ok(());
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Application lock released");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(LockError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl Drop for AppLock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "Failed to release application lock");
        }
    }
}

fn read_pid(path: &Path) -> Result<Option<u32>, LockError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(LockError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    content
        .trim()
        .parse::<u32>()
        .map(Some)
        .map_err(|_| LockError::Corrupt {
            path: path.to_path_buf(),
        })
}
