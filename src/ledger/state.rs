//! Task state types and transitions.
//!
//! This module contains the lifecycle state machine for ledger records:
//! - [`TaskState`] - Current state of a task, as written in the ledger
//! - [`TaskTransition`] - Record of a state change applied by the engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::TaskId;

// ============================================================================
// Task State
// ============================================================================

/// Current state of a task in the ledger.
///
/// # State Transitions
///
/// - `New` -> `Working`: engine spawned a worker for the task
/// - `Working` -> `Done` / `QA`: worker reports completion (external)
/// - `Working` -> `New`: agent vanished or exhausted its idle strikes
/// - `Working` -> `Blocked`: worker gave up on an external blocker
/// - `Blocked` -> `New`: a human cleared the blocker
/// - `QA` -> `Done` / `Working`: review outcome (external)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TaskState {
    /// Waiting for a worker
    #[default]
    New,
    /// A worker agent owns the task
    Working,
    /// Finished
    Done,
    /// Finished, waiting for review
    QA,
    /// Cannot proceed until something outside the pool changes
    Blocked,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

impl TaskState {
    /// The literal keyword used at the start of a ledger line.
    ///
    /// # Example
    ///
    /// ```
    /// use kollaborate::ledger::TaskState;
    ///
    /// assert_eq!(TaskState::Working.keyword(), "WORKING");
    /// ```
    #[must_use]
    pub fn keyword(&self) -> &'static str {
        match self {
            TaskState::New => "NEW",
            TaskState::Working => "WORKING",
            TaskState::Done => "DONE",
            TaskState::QA => "QA",
            TaskState::Blocked => "BLOCKED",
        }
    }

    /// Parse a ledger keyword. Matching is exact and case-sensitive.
    #[must_use]
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "NEW" => Some(TaskState::New),
            "WORKING" => Some(TaskState::Working),
            "DONE" => Some(TaskState::Done),
            "QA" => Some(TaskState::QA),
            "BLOCKED" => Some(TaskState::Blocked),
            _ => None,
        }
    }

    /// Check if this state can transition to the target state.
    ///
    /// # Example
    ///
    /// ```
    /// use kollaborate::ledger::TaskState;
    ///
    /// assert!(TaskState::New.can_transition_to(TaskState::Working));
    /// assert!(TaskState::Working.can_transition_to(TaskState::New));
    /// assert!(!TaskState::Done.can_transition_to(TaskState::Working));
    /// ```
    #[must_use]
    pub fn can_transition_to(&self, target: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, target),
            // From New
            (New, Working) | (New, Done) | (New, QA) | (New, Blocked) |
            // From Working
            (Working, New) | (Working, Done) | (Working, QA) | (Working, Blocked) |
            // From QA
            (QA, Done) | (QA, Working) |
            // From Blocked
            (Blocked, New)
        )
    }

    /// Check if the task is finished from the pool's point of view.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskState::Done | TaskState::QA)
    }

    /// Check if a live worker agent is expected for this state.
    #[must_use]
    pub fn expects_agent(&self) -> bool {
        matches!(self, TaskState::New | TaskState::Working)
    }
}

// ============================================================================
// Task Transition
// ============================================================================

/// Record of a state change the engine applied to the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTransition {
    /// Task that changed
    pub task: TaskId,
    /// State before the transition
    pub from: TaskState,
    /// State after the transition
    pub to: TaskState,
    /// When the transition was written
    pub timestamp: DateTime<Utc>,
    /// Why the engine made the change
    pub reason: String,
}

impl TaskTransition {
    /// Create a new transition record stamped with the current time.
    #[must_use]
    pub fn new(task: TaskId, from: TaskState, to: TaskState, reason: impl Into<String>) -> Self {
        Self {
            task,
            from,
            to,
            timestamp: Utc::now(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for TaskTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} -> {} ({})",
            self.task, self.from, self.to, self.reason
        )
    }
}
