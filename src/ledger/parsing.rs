//! Ledger line parsing.
//!
//! Task lines are anchored on line start, the literal state keyword, the
//! task id, and a ` - ` delimiter (or end of line). The id must be followed
//! by whitespace or end of line, so `R1` never matches inside `R12`.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use super::{Ledger, LedgerLine, TaskId, TaskRecord, TaskState};

fn task_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(NEW|WORKING|DONE|QA|BLOCKED):[ \t]*([A-Z][0-9]+)(?:[ \t]+-(?:[ \t]+(.*?))?)?[ \t]*$",
        )
        .expect("task line regex is valid")
    })
}

fn keyword_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(NEW|WORKING|DONE|QA|BLOCKED):").expect("keyword regex is valid")
    })
}

fn file_hint_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(([^\s()]+)\)\s*$").expect("file hint regex is valid"))
}

/// Outcome of classifying a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LineKind {
    /// A well-formed task line
    Task {
        record: TaskRecord,
        keyword_len: usize,
    },
    /// Starts with a state keyword but is not a valid task line
    Malformed,
    /// Anything else
    Other,
}

/// Extract the trailing `(path)` hint from a description.
///
/// Only parenthesised text without whitespace that looks like a path
/// (contains `/` or `.`) counts, so `(urgent)` is not a file hint.
#[must_use]
pub(crate) fn extract_file_target(description: &str) -> Option<String> {
    let caps = file_hint_re().captures(description)?;
    let hint = caps.get(1)?.as_str();
    if hint.contains('/') || hint.contains('.') {
        Some(hint.to_string())
    } else {
        None
    }
}

pub(crate) fn classify_line(text: &str) -> LineKind {
    let Some(caps) = task_line_re().captures(text) else {
        return if keyword_prefix_re().is_match(text) {
            LineKind::Malformed
        } else {
            LineKind::Other
        };
    };

    let keyword = &caps[1];
    let Some(state) = TaskState::from_keyword(keyword) else {
        return LineKind::Malformed;
    };
    let Ok(id) = TaskId::parse(&caps[2]) else {
        return LineKind::Malformed;
    };

    let raw = caps.get(3).map_or("", |m| m.as_str());
    let (description, block_reason) = match (state, raw.split_once(" | ")) {
        (TaskState::Blocked, Some((desc, reason))) => {
            (desc.trim_end().to_string(), Some(reason.trim().to_string()))
        }
        _ => (raw.to_string(), None),
    };
    let file_target = extract_file_target(&description);

    LineKind::Task {
        record: TaskRecord {
            id,
            state,
            description,
            file_target,
            block_reason,
        },
        keyword_len: keyword.len(),
    }
}

/// Parse one line (without terminator) into a task record.
///
/// # Example
///
/// ```
/// use kollaborate::ledger::{parse_line, TaskState};
///
/// let record = parse_line("NEW: F3 - add login (src/auth.rs)").unwrap();
/// assert_eq!(record.state, TaskState::New);
/// assert_eq!(record.file_target.as_deref(), Some("src/auth.rs"));
/// assert!(parse_line("## Notes").is_none());
/// ```
#[must_use]
pub fn parse_line(text: &str) -> Option<TaskRecord> {
    match classify_line(text) {
        LineKind::Task { record, .. } => Some(record),
        _ => None,
    }
}

/// Split a raw piece from `split_inclusive('\n')` into text and terminator.
fn split_ending(piece: &str) -> (&str, &str) {
    if let Some(text) = piece.strip_suffix("\r\n") {
        (text, "\r\n")
    } else if let Some(text) = piece.strip_suffix('\n') {
        (text, "\n")
    } else {
        (piece, "")
    }
}

impl Ledger {
    /// Parse the full ledger text.
    ///
    /// Malformed task lines are skipped (kept verbatim, never corrected).
    /// When an id appears more than once, the first line is authoritative.
    ///
    /// # Example
    ///
    /// ```
    /// use kollaborate::ledger::Ledger;
    ///
    /// let ledger = Ledger::parse("# Tasks\nNEW: F1 - login\nWORKING: R2 - refactor\n");
    /// assert_eq!(ledger.pending_count(), 1);
    /// assert_eq!(ledger.working_ids().len(), 1);
    /// ```
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let mut lines = Vec::new();
        let mut index: HashMap<TaskId, usize> = HashMap::new();
        let mut duplicates = Vec::new();
        let mut malformed = Vec::new();

        for (i, piece) in content.split_inclusive('\n').enumerate() {
            let (text, ending) = split_ending(piece);
            let (record, keyword_len) = match classify_line(text) {
                LineKind::Task {
                    record,
                    keyword_len,
                } => (Some(record), keyword_len),
                LineKind::Malformed => {
                    debug!(line = i + 1, text, "Skipping malformed ledger line");
                    malformed.push(i);
                    (None, 0)
                }
                LineKind::Other => (None, 0),
            };

            if let Some(ref record) = record {
                if index.contains_key(&record.id) {
                    if !duplicates.contains(&record.id) {
                        warn!(task = %record.id, line = i + 1, "Duplicate ledger line for task; first occurrence wins");
                        duplicates.push(record.id);
                    }
                } else {
                    index.insert(record.id, i);
                }
            }

            lines.push(LedgerLine {
                text: text.to_string(),
                ending: ending.to_string(),
                keyword_len,
                record,
            });
        }

        Ledger {
            lines,
            index,
            duplicates,
            malformed,
        }
    }
}
