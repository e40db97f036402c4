//! Custom assertions for domain-specific testing.
//!
//! Provides expressive assertions over ledger text and mock session state.

use super::mocks::MockSessionManager;
use crate::ledger::{Ledger, TaskId, TaskState};

/// Assert that the ledger text has `id` in `expected` state.
///
/// # Panics
///
/// Panics with the full ledger if the id is missing or in another state.
///
/// # Example
///
/// ```rust,ignore
/// assert_task_state(&fixture.ledger(), "R5", TaskState::New);
/// ```
pub fn assert_task_state(ledger_text: &str, id: &str, expected: TaskState) {
    let task_id = TaskId::parse(id).unwrap_or_else(|e| panic!("bad task id in assertion: {e}"));
    let actual = Ledger::parse(ledger_text).state_of(&task_id);
    assert_eq!(
        actual,
        Some(expected),
        "Expected {id} to be {expected}, found {actual:?}.\nLedger:\n{ledger_text}"
    );
}

/// Assert that a session is live.
///
/// # Panics
///
/// Panics listing the live sessions if `name` is not among them.
pub fn assert_session_live(sessions: &MockSessionManager, name: &str) {
    assert!(
        sessions.is_live(name),
        "Expected session '{name}' to be live. Live: {:?}",
        sessions.live_sessions()
    );
}

/// Assert that a session is not live.
///
/// # Panics
///
/// Panics if `name` is live.
pub fn assert_session_gone(sessions: &MockSessionManager, name: &str) {
    assert!(
        !sessions.is_live(name),
        "Expected session '{name}' to be gone. Live: {:?}",
        sessions.live_sessions()
    );
}

/// Assert that no worker was ever started for a task whose worker session
/// was still live, and that each task has at most one live worker now.
///
/// # Panics
///
/// Panics naming the task that got a second worker.
pub fn assert_at_most_one_worker_per_task(sessions: &MockSessionManager) {
    for name in sessions.collisions() {
        if let Ok(id) = TaskId::parse(&name) {
            panic!(
                "Task {id} got a second worker while one was live. Created: {:?}",
                sessions.created()
            );
        }
    }
    let mut seen = std::collections::HashSet::new();
    for name in sessions.live_sessions() {
        if let Ok(id) = TaskId::parse(&name) {
            assert!(seen.insert(id), "Task {id} has more than one worker session");
        }
    }
}
