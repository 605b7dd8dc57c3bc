use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{CoreError, CoreResult};
use crate::fault::panic_message;

/// A reversible host mutation.
///
/// Lifecycle is one-way: not enabled, enabled, restored. `enable` must be
/// idempotent and `restore` must be a no-op when the change was never enabled.
pub trait RestorableChange: Send + fmt::Debug {
    /// Short human-readable label used in logs and rollback reports.
    fn describe(&self) -> String;

    fn is_enabled(&self) -> bool;

    /// Perform the backup/setup side effect.
    fn enable(&mut self) -> anyhow::Result<()>;

    /// Undo the side effect. Errors are logged by the controller, never
    /// propagated.
    fn restore(&mut self) -> anyhow::Result<()>;
}

enum Entry {
    Change(Box<dyn RestorableChange>),
    Partition,
}

#[derive(Default)]
struct Journal {
    entries: Vec<Entry>,
    failures: Vec<String>,
}

impl Journal {
    fn has_changes(&self) -> bool {
        self.entries.iter().any(|e| matches!(e, Entry::Change(_)))
    }
}

/// LIFO transaction stack of restorable changes.
///
/// Pushing a change enables it, popping restores it. Changes are restored in
/// the reverse order they were pushed and never out of order. All operations
/// take `&self`; the stack is guarded by a mutex so pushes and pops are
/// serialized across concurrently running actions.
#[derive(Default)]
pub struct BackupController {
    journal: Mutex<Journal>,
}

impl fmt::Debug for BackupController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let journal = self.lock();
        f.debug_struct("BackupController")
            .field("entries", &journal.entries.len())
            .field("failures", &journal.failures.len())
            .finish()
    }
}

impl BackupController {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Journal> {
        // A panic inside enable/restore must not make the undo log unusable.
        self.journal.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enable a change and track it for rollback. The change is appended only
    /// if `enable` succeeded.
    pub fn push(&self, mut change: Box<dyn RestorableChange>) -> CoreResult<()> {
        let mut journal = self.lock();
        let name = change.describe();

        change
            .enable()
            .map_err(|source| CoreError::EnableFailed {
                change: name.clone(),
                source,
            })?;

        tracing::debug!(change = %name, enabled = change.is_enabled(), "Change tracked");
        journal.entries.push(Entry::Change(change));
        Ok(())
    }

    /// Mark a rollback phase boundary for [`pop_to_partition`](Self::pop_to_partition).
    pub fn push_partition(&self) {
        self.lock().entries.push(Entry::Partition);
    }

    /// Restore and return the most recently pushed change. Partition markers
    /// sitting above it are discarded.
    pub fn pop(&self) -> CoreResult<Box<dyn RestorableChange>> {
        let mut guard = self.lock();
        let journal = &mut *guard;

        let top = journal
            .entries
            .iter()
            .rposition(|e| matches!(e, Entry::Change(_)))
            .ok_or(CoreError::NothingToRestore)?;
        journal.entries.truncate(top + 1);

        match journal.entries.pop() {
            Some(Entry::Change(mut change)) => {
                restore_change(change.as_mut(), &mut journal.failures);
                Ok(change)
            }
            _ => Err(CoreError::NothingToRestore),
        }
    }

    /// Restore every tracked change, most recent first, and return them in
    /// pop order. Keeps going when individual restores fail.
    pub fn pop_all(&self) -> CoreResult<Vec<Box<dyn RestorableChange>>> {
        let mut guard = self.lock();
        let journal = &mut *guard;

        if !journal.has_changes() {
            journal.entries.clear();
            return Err(CoreError::NothingToRestore);
        }

        tracing::warn!("Rolling back all tracked changes");
        let mut restored = Vec::new();
        while let Some(entry) = journal.entries.pop() {
            if let Entry::Change(mut change) = entry {
                restore_change(change.as_mut(), &mut journal.failures);
                restored.push(change);
            }
        }

        tracing::info!(
            restored = restored.len(),
            failures = journal.failures.len(),
            "Rollback finished"
        );
        Ok(restored)
    }

    /// Restore the changes pushed since the most recent partition marker and
    /// remove that marker. Without a marker this does nothing.
    pub fn pop_to_partition(&self) -> Vec<Box<dyn RestorableChange>> {
        let mut guard = self.lock();
        let journal = &mut *guard;

        let Some(marker) = journal
            .entries
            .iter()
            .rposition(|e| matches!(e, Entry::Partition))
        else {
            tracing::debug!("No partition marker on the backup stack");
            return Vec::new();
        };

        let phase = journal.entries.split_off(marker);
        let mut restored = Vec::new();
        for entry in phase.into_iter().rev() {
            if let Entry::Change(mut change) = entry {
                restore_change(change.as_mut(), &mut journal.failures);
                restored.push(change);
            }
        }
        restored
    }

    /// Point of no return: forget every tracked change without restoring it.
    /// Returns how many changes were dropped.
    pub fn commit(&self) -> usize {
        let mut journal = self.lock();
        let dropped = journal
            .entries
            .drain(..)
            .filter(|e| matches!(e, Entry::Change(_)))
            .count();
        tracing::info!(changes = dropped, "Backups committed, rollback no longer possible");
        dropped
    }

    /// Number of real changes on the stack. Partition markers do not count.
    pub fn len(&self) -> usize {
        self.lock()
            .entries
            .iter()
            .filter(|e| matches!(e, Entry::Change(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        !self.lock().has_changes()
    }

    pub fn partitions(&self) -> usize {
        self.lock()
            .entries
            .iter()
            .filter(|e| matches!(e, Entry::Partition))
            .count()
    }

    /// Descriptions of the stacked changes, most recent first.
    pub fn tracked(&self) -> Vec<String> {
        self.lock()
            .entries
            .iter()
            .rev()
            .filter_map(|e| match e {
                Entry::Change(c) => Some(c.describe()),
                Entry::Partition => None,
            })
            .collect()
    }

    pub fn rollback_failed(&self) -> bool {
        !self.lock().failures.is_empty()
    }

    pub fn rollback_failures(&self) -> Vec<String> {
        self.lock().failures.clone()
    }
}

fn restore_change(change: &mut dyn RestorableChange, failures: &mut Vec<String>) {
    let name = change.describe();
    match panic::catch_unwind(AssertUnwindSafe(|| change.restore())) {
        Ok(Ok(())) => {
            tracing::info!(change = %name, "Rollback step succeeded");
        }
        Ok(Err(e)) => {
            tracing::warn!(change = %name, error = %format!("{e:#}"), "Rollback step failed");
            failures.push(format!("{name}: {e:#}"));
        }
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            tracing::warn!(change = %name, error = %msg, "Rollback step panicked");
            failures.push(format!("{name}: {msg}"));
        }
    }
}
