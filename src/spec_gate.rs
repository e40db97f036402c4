//! Specification gate.
//!
//! A worker may only start on a task once the spec directory holds a
//! complete spec for it. Spec files are named `<ID>-<slug>.md`; a file
//! belongs to a task when its name starts with the id followed by a
//! non-digit, so `R1-cleanup.md` never counts for `R12`. Line count is the
//! only completeness signal: at or below the threshold the file is a
//! placeholder.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{KollabError, Result};
use crate::ledger::TaskId;

/// Maximum slug length in generated spec file names
const MAX_SLUG_LEN: usize = 48;

/// Read-only view of the spec directory plus placeholder cleanup.
#[derive(Debug, Clone)]
pub struct SpecGate {
    dir: PathBuf,
    min_lines: usize,
}

impl SpecGate {
    /// Create a gate over `dir`. Files with `min_lines` lines or fewer are
    /// placeholders.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, min_lines: usize) -> Self {
        Self {
            dir: dir.into(),
            min_lines,
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the spec directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`KollabError::SpecDir`] if the directory cannot be created.
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| KollabError::SpecDir {
            path: self.dir.clone(),
            message: e.to_string(),
        })
    }

    /// Spec files belonging to `id`, sorted by name.
    #[must_use]
    pub fn spec_files(&self, id: &TaskId) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let prefix = id.to_string();
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter(|e| name_matches(&e.file_name().to_string_lossy(), &prefix))
            .map(|e| e.path())
            .collect();
        files.sort();
        files
    }

    /// Line count of a spec file, or `None` when it cannot be read.
    ///
    /// Counted on raw bytes, so encoding never matters.
    #[must_use]
    pub fn line_count(&self, path: &Path) -> Option<usize> {
        match fs::read(path) {
            Ok(bytes) => Some(count_lines(&bytes)),
            Err(e) => {
                warn!(phase = "spec", path = %path.display(), error = %e, "Unreadable spec file");
                None
            }
        }
    }

    /// Whether the file at `path` is a readable placeholder. An unreadable
    /// file is neither complete nor a placeholder.
    #[must_use]
    pub fn is_placeholder(&self, path: &Path) -> bool {
        self.line_count(path)
            .is_some_and(|lines| lines <= self.min_lines)
    }

    /// Whether `id` has a spec with more than the threshold of lines.
    #[must_use]
    pub fn has_complete_spec(&self, id: &TaskId) -> bool {
        self.spec_files(id)
            .iter()
            .any(|path| self.line_count(path).is_some_and(|lines| lines > self.min_lines))
    }

    /// The ids from `ids` that lack a complete spec, in input order.
    #[must_use]
    pub fn tasks_missing_specs<'a, I>(&self, ids: I) -> Vec<TaskId>
    where
        I: IntoIterator<Item = &'a TaskId>,
    {
        ids.into_iter()
            .filter(|id| !self.has_complete_spec(id))
            .copied()
            .collect()
    }

    /// Delete the placeholder spec files for `id` unless a spec agent for
    /// it is live. Returns whether anything was deleted.
    ///
    /// # Errors
    ///
    /// Returns an IO error if a placeholder cannot be removed.
    pub fn delete_if_placeholder_and_unattended(
        &self,
        id: &TaskId,
        spec_agent_live: bool,
    ) -> Result<bool> {
        if spec_agent_live {
            return Ok(false);
        }
        let mut deleted = false;
        for path in self.spec_files(id) {
            if self.is_placeholder(&path) {
                fs::remove_file(&path)?;
                info!(phase = "spec", task = %id, path = %path.display(), "Deleted unattended placeholder spec");
                deleted = true;
            }
        }
        Ok(deleted)
    }

    /// Where the spec for `id` lives: the first existing file, or the
    /// canonical `<ID>-<slug>.md` path derived from the description.
    #[must_use]
    pub fn spec_path_for(&self, id: &TaskId, description: &str) -> PathBuf {
        self.spec_files(id)
            .into_iter()
            .next()
            .unwrap_or_else(|| self.dir.join(format!("{}-{}.md", id, slugify(description))))
    }
}

/// Lines as `str::lines` counts them: a final line without a newline
/// still counts, a trailing newline does not start a new one.
fn count_lines(bytes: &[u8]) -> usize {
    let newlines = bytes.iter().filter(|&&b| b == b'\n').count();
    match bytes.last() {
        None => 0,
        Some(b'\n') => newlines,
        Some(_) => newlines + 1,
    }
}

fn name_matches(file_name: &str, prefix: &str) -> bool {
    file_name
        .strip_prefix(prefix)
        .is_some_and(|rest| !rest.starts_with(|c: char| c.is_ascii_digit()))
}

/// File-name slug for a task description.
///
/// Lower-cases, replaces runs of non-alphanumerics with `-`, drops a
/// trailing `(path)` hint, and caps the length.
///
/// # Example
///
/// ```
/// use kollaborate::spec_gate::slugify;
///
/// assert_eq!(slugify("Add login form (src/auth.rs)"), "add-login-form");
/// assert_eq!(slugify(""), "task");
/// ```
#[must_use]
pub fn slugify(description: &str) -> String {
    let text = match description.rfind('(') {
        Some(i) if description.trim_end().ends_with(')') => &description[..i],
        _ => description,
    };

    let mut slug = String::new();
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.truncate(MAX_SLUG_LEN);
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "task".to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestFixture;

    fn id(s: &str) -> TaskId {
        TaskId::parse(s).unwrap()
    }

    fn gate(fixture: &TestFixture) -> SpecGate {
        SpecGate::new(fixture.spec_dir(), 50)
    }

    #[test]
    fn test_missing_spec_is_incomplete() {
        let fixture = TestFixture::with_ledger("");
        assert!(!gate(&fixture).has_complete_spec(&id("F3")));
    }

    #[test]
    fn test_boundary_fifty_and_fifty_one_lines() {
        let fixture = TestFixture::with_ledger("");
        fixture.write_spec("F3", "fifty", 50);
        fixture.write_spec("F4", "fifty-one", 51);

        let gate = gate(&fixture);
        assert!(!gate.has_complete_spec(&id("F3")));
        assert!(gate.has_complete_spec(&id("F4")));
    }

    #[test]
    fn test_boundary_without_trailing_newline() {
        let fixture = TestFixture::with_ledger("");
        let body = TestFixture::spec_content(51);
        std::fs::write(
            fixture.spec_dir().join("F5-x.md"),
            body.trim_end_matches('\n'),
        )
        .unwrap();
        assert!(gate(&fixture).has_complete_spec(&id("F5")));
    }

    #[test]
    fn test_non_utf8_spec_counts_lines() {
        let fixture = TestFixture::with_ledger("");
        let path = fixture.spec_dir().join("F3-login.md");
        let body: Vec<u8> = (0..51).flat_map(|_| b"caf\xe9 line\n".to_vec()).collect();
        std::fs::write(&path, body).unwrap();

        let gate = gate(&fixture);
        assert!(gate.has_complete_spec(&id("F3")));
        assert!(!gate
            .delete_if_placeholder_and_unattended(&id("F3"), false)
            .unwrap());
        assert!(path.exists());
    }

    #[test]
    fn test_count_lines_matches_str_lines() {
        for text in ["", "a", "a\n", "a\nb", "a\n\nb\n", "\n"] {
            assert_eq!(count_lines(text.as_bytes()), text.lines().count(), "{text:?}");
        }
    }

    #[test]
    fn test_unreadable_spec_is_not_deleted() {
        let fixture = TestFixture::with_ledger("");
        // A directory named like a spec cannot be read as a file.
        let path = fixture.spec_dir().join("F3-dir.md");
        std::fs::create_dir(&path).unwrap();

        let gate = gate(&fixture);
        assert_eq!(gate.line_count(&path), None);
        assert!(!gate.is_placeholder(&path));
        assert!(!gate.has_complete_spec(&id("F3")));
    }

    #[test]
    fn test_prefix_precision() {
        let fixture = TestFixture::with_ledger("");
        fixture.write_spec("R12", "twelve", 80);
        fixture.write_spec("R100", "hundred", 80);

        let gate = gate(&fixture);
        assert!(!gate.has_complete_spec(&id("R1")));
        assert!(gate.has_complete_spec(&id("R12")));
        assert!(gate.spec_files(&id("R1")).is_empty());
    }

    #[test]
    fn test_tasks_missing_specs_keeps_order() {
        let fixture = TestFixture::with_ledger("");
        fixture.write_spec("F2", "done", 60);
        let ids = [id("F3"), id("F2"), id("F1")];
        assert_eq!(
            gate(&fixture).tasks_missing_specs(&ids),
            vec![id("F3"), id("F1")]
        );
    }

    #[test]
    fn test_delete_placeholder_only_when_unattended() {
        let fixture = TestFixture::with_ledger("");
        let path = fixture.write_spec("F3", "stub", 5);
        let gate = gate(&fixture);

        assert!(!gate
            .delete_if_placeholder_and_unattended(&id("F3"), true)
            .unwrap());
        assert!(path.exists());

        assert!(gate
            .delete_if_placeholder_and_unattended(&id("F3"), false)
            .unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_complete_spec_is_never_deleted() {
        let fixture = TestFixture::with_ledger("");
        let path = fixture.write_spec("F3", "full", 70);
        assert!(!gate(&fixture)
            .delete_if_placeholder_and_unattended(&id("F3"), false)
            .unwrap());
        assert!(path.exists());
    }

    #[test]
    fn test_spec_path_for() {
        let fixture = TestFixture::with_ledger("");
        let gate = gate(&fixture);
        assert_eq!(
            gate.spec_path_for(&id("F3"), "Add login (src/auth.rs)"),
            fixture.spec_dir().join("F3-add-login.md")
        );

        let existing = fixture.write_spec("F3", "older-name", 2);
        assert_eq!(gate.spec_path_for(&id("F3"), "Add login"), existing);
    }

    #[test]
    fn test_ensure_dir_creates_nested() {
        let fixture = TestFixture::with_ledger("");
        let gate = SpecGate::new(fixture.path().join("docs/specs"), 50);
        gate.ensure_dir().unwrap();
        assert!(gate.dir().is_dir());
    }

    #[test]
    fn test_ensure_dir_fails_on_file() {
        let fixture = TestFixture::with_ledger("");
        let gate = SpecGate::new(fixture.ledger_path().join("specs"), 50);
        assert!(matches!(gate.ensure_dir(), Err(KollabError::SpecDir { .. })));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Fix  crash -- on resume!"), "fix-crash-on-resume");
        assert_eq!(slugify("(src/x.rs)"), "task");
        assert_eq!(slugify("a".repeat(100).as_str()).len(), MAX_SLUG_LEN);
    }
}
