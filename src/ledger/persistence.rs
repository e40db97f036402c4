//! Ledger file I/O.
//!
//! Every state change is a fresh read-modify-write of the ledger file so
//! that lines a human appended since the engine's last read survive. Writes
//! go to a temporary sibling file which is then renamed over the ledger.
//! There is no locking; one daemon per ledger file is assumed.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{Ledger, TaskId, TaskState};
use crate::error::{KollabError, Result};

/// Handle on the ledger file.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    /// Create a store for the ledger at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the ledger file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the ledger file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read and parse the ledger.
    ///
    /// # Errors
    ///
    /// Returns [`KollabError::MissingFile`] when the file is absent and
    /// [`KollabError::Ledger`] when it cannot be read.
    pub fn load(&self) -> Result<Ledger> {
        if !self.path.exists() {
            return Err(KollabError::MissingFile {
                path: self.path.clone(),
            });
        }
        let content = fs::read_to_string(&self.path)
            .map_err(|e| KollabError::ledger(&self.path, format!("read failed: {e}")))?;
        Ok(Ledger::parse(&content))
    }

    /// Write the ledger atomically.
    ///
    /// # Errors
    ///
    /// Returns [`KollabError::Ledger`] if the temp file cannot be written or
    /// renamed into place.
    pub fn save(&self, ledger: &Ledger) -> Result<()> {
        let content = ledger.render();
        let temp_path = self.temp_path();
        {
            let mut file = File::create(&temp_path).map_err(|e| {
                KollabError::ledger(&self.path, format!("create {}: {e}", temp_path.display()))
            })?;
            file.write_all(content.as_bytes())
                .and_then(|()| file.sync_all())
                .map_err(|e| KollabError::ledger(&self.path, format!("write temp file: {e}")))?;
        }
        fs::rename(&temp_path, &self.path)
            .map_err(|e| KollabError::ledger(&self.path, format!("rename temp file: {e}")))?;
        Ok(())
    }

    /// Apply one state change to the file on disk.
    ///
    /// Re-reads the file, flips the line for `id` from `from` to `to`, and
    /// writes it back only if something changed. Returns whether the line
    /// was rewritten; `false` means the task was absent or no longer in
    /// `from` (for example a worker already marked it `DONE`).
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read or written.
    pub fn transition(&self, id: &TaskId, from: TaskState, to: TaskState) -> Result<bool> {
        let mut ledger = self.load()?;
        if !ledger.set_state(id, from, to) {
            debug!(task = %id, %from, %to, "Ledger transition not applicable");
            return Ok(false);
        }
        self.save(&ledger)?;
        Ok(true)
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "ledger".to_string());
        self.path.with_file_name(format!(".{name}.kollab.tmp"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_with(content: &str) -> (LedgerStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("TASKS.md");
        fs::write(&path, content).unwrap();
        (LedgerStore::new(path), temp)
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let store = LedgerStore::new(temp.path().join("nope.md"));
        assert!(!store.exists());
        assert!(matches!(store.load(), Err(KollabError::MissingFile { .. })));
    }

    #[test]
    fn test_transition_rewrites_only_target_line() {
        let (store, _temp) = store_with("# Board\nWORKING: R5 - fix bug\nWORKING: R50 - other\n");
        let r5 = TaskId::parse("R5").unwrap();

        assert!(store
            .transition(&r5, TaskState::Working, TaskState::New)
            .unwrap());

        let content = fs::read_to_string(store.path()).unwrap();
        assert_eq!(content, "# Board\nNEW: R5 - fix bug\nWORKING: R50 - other\n");
    }

    #[test]
    fn test_transition_not_applicable_leaves_file_untouched() {
        let (store, _temp) = store_with("DONE: R5 - fix bug\n");
        let r5 = TaskId::parse("R5").unwrap();

        assert!(!store
            .transition(&r5, TaskState::Working, TaskState::New)
            .unwrap());
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "DONE: R5 - fix bug\n");
    }

    #[test]
    fn test_transition_keeps_lines_appended_since_last_read() {
        let (store, _temp) = store_with("NEW: F1 - a\n");
        let snapshot = store.load().unwrap();
        assert_eq!(snapshot.pending_count(), 1);

        // A human appends a task between the engine's read and its write.
        let mut content = fs::read_to_string(store.path()).unwrap();
        content.push_str("NEW: F2 - added by hand\n");
        fs::write(store.path(), content).unwrap();

        let f1 = TaskId::parse("F1").unwrap();
        assert!(store
            .transition(&f1, TaskState::New, TaskState::Working)
            .unwrap());
        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "WORKING: F1 - a\nNEW: F2 - added by hand\n"
        );
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let (store, temp) = store_with("NEW: F1 - a\n");
        let ledger = store.load().unwrap();
        store.save(&ledger).unwrap();

        let leftovers: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
