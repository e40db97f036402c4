//! Test fixtures for creating reproducible project directories.
//!
//! A fixture is a temporary project with a ledger file and a spec
//! directory, laid out with the default settings paths.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::config::WatcherConfig;
use crate::ledger::TaskId;

/// A temporary project directory.
///
/// Automatically cleans up when dropped.
///
/// # Example
///
/// ```rust,ignore
/// let fixture = TestFixture::with_ledger("NEW: F3 - add login\n");
/// fixture.write_spec("F3", "add-login", 60);
/// assert!(fixture.ledger_path().exists());
/// ```
pub struct TestFixture {
    temp_dir: TempDir,
}

impl TestFixture {
    /// Create a project with the given ledger content and an empty spec dir.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory or files cannot be created.
    #[must_use]
    pub fn with_ledger(content: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        std::fs::write(temp_dir.path().join("TASKS.md"), content)
            .expect("Failed to write TASKS.md");
        std::fs::create_dir_all(temp_dir.path().join("specs"))
            .expect("Failed to create spec dir");
        Self { temp_dir }
    }

    /// Project root.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    #[must_use]
    pub fn ledger_path(&self) -> PathBuf {
        self.path().join("TASKS.md")
    }

    #[must_use]
    pub fn spec_dir(&self) -> PathBuf {
        self.path().join("specs")
    }

    /// Current ledger text.
    ///
    /// # Panics
    ///
    /// Panics if the ledger cannot be read.
    #[must_use]
    pub fn ledger(&self) -> String {
        std::fs::read_to_string(self.ledger_path()).expect("Failed to read ledger")
    }

    /// Overwrite the ledger, as a human editing it would.
    ///
    /// # Panics
    ///
    /// Panics if the ledger cannot be written.
    pub fn set_ledger(&self, content: &str) {
        std::fs::write(self.ledger_path(), content).expect("Failed to write ledger");
    }

    /// Write `<ID>-<slug>.md` with `lines` lines of content.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn write_spec(&self, id: &str, slug: &str, lines: usize) -> PathBuf {
        let path = self.spec_dir().join(format!("{id}-{slug}.md"));
        std::fs::write(&path, Self::spec_content(lines)).expect("Failed to write spec");
        path
    }

    /// Whether any spec file for `id` exists.
    #[must_use]
    pub fn has_spec_file(&self, id: &TaskId) -> bool {
        let prefix = id.to_string();
        std::fs::read_dir(self.spec_dir())
            .map(|entries| {
                entries.filter_map(|e| e.ok()).any(|e| {
                    let name = e.file_name().to_string_lossy().into_owned();
                    name.strip_prefix(&prefix)
                        .is_some_and(|rest| !rest.starts_with(|c: char| c.is_ascii_digit()))
                })
            })
            .unwrap_or(false)
    }

    /// Config rooted at this fixture, with all waits set to zero.
    #[must_use]
    pub fn config(&self) -> WatcherConfig {
        WatcherConfig {
            poll_wait_secs: 0,
            agent_startup_secs: 0,
            ..WatcherConfig::default()
        }
        .resolved(self.path())
    }

    /// `lines` lines of spec text.
    #[must_use]
    pub fn spec_content(lines: usize) -> String {
        (1..=lines).map(|n| format!("spec line {n}\n")).collect()
    }
}
