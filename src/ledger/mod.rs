//! Task ledger: typed view over the line-oriented task document.
//!
//! The ledger is a plain text file that humans edit and agents update.
//! Task lines look like:
//!
//! ```text
//! NEW: F3 - add login form (src/auth/login.rs)
//! WORKING: R12 - split the session module
//! BLOCKED: B2 - fix crash on resume | waiting on upstream patch
//! DONE: T1 - cover the parser
//! ```
//!
//! Everything else (headings, notes, blank lines) is opaque and kept
//! verbatim.
//!
//! # Architecture
//!
//! ```text
//! Ledger
//!   ├── lines: Vec<LedgerLine>      (every line, terminator included)
//!   └── index: HashMap<TaskId, usize>
//!
//! LedgerLine
//!   ├── text / ending               (byte-exact original)
//!   └── record: Option<TaskRecord>  (typed view of task lines)
//! ```
//!
//! The engine parses the ledger once per cycle, and each state change goes
//! through [`LedgerStore::transition`], which re-reads the file, rewrites
//! only the state keyword of one line, and writes it back. Everything after
//! the keyword is preserved byte for byte.

mod parsing;
mod persistence;
mod state;

pub use parsing::parse_line;
pub use persistence::LedgerStore;
pub use state::{TaskState, TaskTransition};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{KollabError, Result};

// ============================================================================
// Type Tag
// ============================================================================

/// Single-letter task type prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TypeTag {
    F,
    R,
    B,
    T,
    D,
    P,
    A,
    S,
    H,
    M,
    I,
    C,
    E,
    U,
    V,
    W,
    X,
}

impl TypeTag {
    /// All tags in canonical order.
    pub const ALL: [TypeTag; 17] = [
        TypeTag::F,
        TypeTag::R,
        TypeTag::B,
        TypeTag::T,
        TypeTag::D,
        TypeTag::P,
        TypeTag::A,
        TypeTag::S,
        TypeTag::H,
        TypeTag::M,
        TypeTag::I,
        TypeTag::C,
        TypeTag::E,
        TypeTag::U,
        TypeTag::V,
        TypeTag::W,
        TypeTag::X,
    ];

    /// Parse a tag letter. Only upper-case letters are recognised.
    #[must_use]
    pub fn from_char(c: char) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.as_char() == c)
    }

    /// The tag letter.
    #[must_use]
    pub fn as_char(&self) -> char {
        match self {
            TypeTag::F => 'F',
            TypeTag::R => 'R',
            TypeTag::B => 'B',
            TypeTag::T => 'T',
            TypeTag::D => 'D',
            TypeTag::P => 'P',
            TypeTag::A => 'A',
            TypeTag::S => 'S',
            TypeTag::H => 'H',
            TypeTag::M => 'M',
            TypeTag::I => 'I',
            TypeTag::C => 'C',
            TypeTag::E => 'E',
            TypeTag::U => 'U',
            TypeTag::V => 'V',
            TypeTag::W => 'W',
            TypeTag::X => 'X',
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

// ============================================================================
// Task Identifier
// ============================================================================

/// Unique identifier of a ledger task: type tag plus positive ordinal.
///
/// # Example
///
/// ```
/// use kollaborate::ledger::{TaskId, TypeTag};
///
/// let id = TaskId::parse("R12").unwrap();
/// assert_eq!(id.tag(), TypeTag::R);
/// assert_eq!(id.ordinal(), 12);
/// assert_eq!(id.to_string(), "R12");
/// assert!(TaskId::parse("R0").is_err());
/// assert!(TaskId::parse("Z4").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId {
    tag: TypeTag,
    ordinal: u32,
}

impl TaskId {
    /// Create an id from its parts.
    ///
    /// # Errors
    ///
    /// Returns an error if `ordinal` is zero.
    pub fn new(tag: TypeTag, ordinal: u32) -> Result<Self> {
        if ordinal == 0 {
            return Err(KollabError::InvalidTaskId {
                input: format!("{}0", tag),
                reason: "ordinal must be positive".to_string(),
            });
        }
        Ok(Self { tag, ordinal })
    }

    /// Parse an id such as `F3` or `R120`.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown tags, missing or zero ordinals, leading
    /// zeros, and trailing garbage.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: &str| KollabError::InvalidTaskId {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let mut chars = input.chars();
        let tag = chars
            .next()
            .and_then(TypeTag::from_char)
            .ok_or_else(|| invalid("unknown type tag"))?;
        let digits = chars.as_str();
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("expected a numeric ordinal after the tag"));
        }
        if digits.starts_with('0') {
            return Err(invalid("ordinal must not start with zero"));
        }
        let ordinal: u32 = digits.parse().map_err(|_| invalid("ordinal out of range"))?;
        Self::new(tag, ordinal).map_err(|_| invalid("ordinal must be positive"))
    }

    /// The type tag.
    #[must_use]
    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    /// The numeric ordinal.
    #[must_use]
    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.tag, self.ordinal)
    }
}

impl std::str::FromStr for TaskId {
    type Err = KollabError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// ============================================================================
// Task Record
// ============================================================================

/// Typed view of one task line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Task identifier
    pub id: TaskId,
    /// Lifecycle state
    pub state: TaskState,
    /// Free text after `ID - `, minus any block reason
    pub description: String,
    /// Trailing `(path)` hint, if present
    pub file_target: Option<String>,
    /// Text after ` | ` on `BLOCKED` lines
    pub block_reason: Option<String>,
}

// ============================================================================
// Ledger
// ============================================================================

/// One physical line of the ledger.
#[derive(Debug, Clone)]
pub(crate) struct LedgerLine {
    /// Line content without its terminator
    pub(crate) text: String,
    /// `"\n"`, `"\r\n"`, or empty for an unterminated last line
    pub(crate) ending: String,
    /// Byte length of the state keyword at the start of `text`
    pub(crate) keyword_len: usize,
    /// Typed record when the line is a task line
    pub(crate) record: Option<TaskRecord>,
}

/// Parsed ledger document.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    pub(crate) lines: Vec<LedgerLine>,
    /// First line index for each task id
    pub(crate) index: HashMap<TaskId, usize>,
    /// Task ids that appear on more than one line
    pub(crate) duplicates: Vec<TaskId>,
    /// Lines that started with a state keyword but did not parse
    pub(crate) malformed: Vec<usize>,
}

impl Ledger {
    /// All task records in document order (first occurrence per id).
    pub fn records(&self) -> impl Iterator<Item = &TaskRecord> {
        self.lines
            .iter()
            .enumerate()
            .filter_map(move |(i, line)| match &line.record {
                Some(record) if self.index.get(&record.id) == Some(&i) => Some(record),
                _ => None,
            })
    }

    /// Look up a task by id.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<&TaskRecord> {
        self.index
            .get(id)
            .and_then(|&i| self.lines[i].record.as_ref())
    }

    /// Current state of a task, if it has a ledger line.
    #[must_use]
    pub fn state_of(&self, id: &TaskId) -> Option<TaskState> {
        self.get(id).map(|r| r.state)
    }

    /// Ids of all tasks in the given state, in document order.
    #[must_use]
    pub fn ids_in_state(&self, state: TaskState) -> Vec<TaskId> {
        self.records()
            .filter(|r| r.state == state)
            .map(|r| r.id)
            .collect()
    }

    /// Pending tasks in document order.
    #[must_use]
    pub fn new_tasks(&self) -> Vec<&TaskRecord> {
        self.records().filter(|r| r.state == TaskState::New).collect()
    }

    /// Ids of tasks a worker currently owns.
    #[must_use]
    pub fn working_ids(&self) -> Vec<TaskId> {
        self.ids_in_state(TaskState::Working)
    }

    /// Ids of tasks waiting for review.
    #[must_use]
    pub fn qa_ids(&self) -> Vec<TaskId> {
        self.ids_in_state(TaskState::QA)
    }

    /// Ids of finished tasks.
    #[must_use]
    pub fn done_ids(&self) -> Vec<TaskId> {
        self.ids_in_state(TaskState::Done)
    }

    /// Number of `New` tasks.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.records().filter(|r| r.state == TaskState::New).count()
    }

    /// Next unused ordinal for a type tag (max + 1, or 1 when unused).
    #[must_use]
    pub fn next_ordinal(&self, tag: TypeTag) -> u32 {
        self.records()
            .filter(|r| r.id.tag() == tag)
            .map(|r| r.id.ordinal())
            .max()
            .map_or(1, |max| max.saturating_add(1))
    }

    /// Ids that appear on more than one line.
    #[must_use]
    pub fn duplicate_ids(&self) -> &[TaskId] {
        &self.duplicates
    }

    /// Number of lines that looked like task lines but did not parse.
    #[must_use]
    pub fn malformed_count(&self) -> usize {
        self.malformed.len()
    }

    /// Rewrite the state keyword of one task line.
    ///
    /// Only applies when the task is currently in `from` and the state
    /// machine allows `from -> to`. Returns whether the ledger changed.
    ///
    /// # Example
    ///
    /// ```
    /// use kollaborate::ledger::{Ledger, TaskId, TaskState};
    ///
    /// let mut ledger = Ledger::parse("WORKING: R1 - a\nWORKING: R12 - b\n");
    /// let r1 = TaskId::parse("R1").unwrap();
    /// assert!(ledger.set_state(&r1, TaskState::Working, TaskState::New));
    /// assert_eq!(ledger.render(), "NEW: R1 - a\nWORKING: R12 - b\n");
    /// ```
    pub fn set_state(&mut self, id: &TaskId, from: TaskState, to: TaskState) -> bool {
        if !from.can_transition_to(to) {
            return false;
        }
        let Some(&i) = self.index.get(id) else {
            return false;
        };
        let line = &mut self.lines[i];
        let Some(record) = line.record.as_mut() else {
            return false;
        };
        if record.state != from {
            return false;
        }

        let rest = line.text[line.keyword_len..].to_string();
        line.text = format!("{}{}", to.keyword(), rest);
        line.keyword_len = to.keyword().len();
        record.state = to;
        true
    }

    /// Serialize the ledger. Untouched lines are byte-identical to the input.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(
            self.lines
                .iter()
                .map(|l| l.text.len() + l.ending.len())
                .sum(),
        );
        for line in &self.lines {
            out.push_str(&line.text);
            out.push_str(&line.ending);
        }
        out
    }
}
