//! Mock implementation of the session seam.
//!
//! [`MockSessionManager`] keeps sessions in memory and records every call,
//! so engine tests can script agent behaviour (idle, active, vanished,
//! failing) and assert on what the engine did.

use super::traits::SessionManager;
use crate::error::{KollabError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Mutex;

#[derive(Debug, Clone, Default)]
struct MockSession {
    /// Output returned once each, before falling back to `output`
    scripted: VecDeque<String>,
    output: String,
    /// When set, every capture returns fresh output
    changing: bool,
    captures: u64,
    inputs: Vec<String>,
    submits: u32,
}

#[derive(Debug, Default)]
struct MockState {
    sessions: BTreeMap<String, MockSession>,
    created: Vec<String>,
    killed: Vec<String>,
    fail_create: HashSet<String>,
    fail_kill: HashSet<String>,
    fail_capture: HashSet<String>,
    fail_list: bool,
    list_calls: u32,
    /// Names checked or created while already live
    collisions: Vec<String>,
}

/// In-memory session manager.
///
/// Thread-safe for use from the engine's concurrent polls.
///
/// # Example
///
/// ```rust,ignore
/// let sessions = MockSessionManager::new()
///     .with_idle_session("R5", "$ waiting")
///     .with_active_session("F2");
///
/// assert!(sessions.is_live("R5"));
/// ```
#[derive(Debug, Default)]
pub struct MockSessionManager {
    state: Mutex<MockState>,
}

impl MockSessionManager {
    /// Create an empty mock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state(self, f: impl FnOnce(&mut MockState)) -> Self {
        f(&mut self.lock());
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a session whose output never changes.
    #[must_use]
    pub fn with_idle_session(self, name: &str, output: &str) -> Self {
        self.with_state(|s| {
            s.sessions.insert(
                name.to_string(),
                MockSession {
                    output: output.to_string(),
                    ..MockSession::default()
                },
            );
        })
    }

    /// Add a session whose output changes on every capture.
    #[must_use]
    pub fn with_active_session(self, name: &str) -> Self {
        self.with_state(|s| {
            s.sessions.insert(
                name.to_string(),
                MockSession {
                    changing: true,
                    ..MockSession::default()
                },
            );
        })
    }

    /// Make `create_session` fail for this name.
    #[must_use]
    pub fn with_create_failure(self, name: &str) -> Self {
        self.with_state(|s| {
            s.fail_create.insert(name.to_string());
        })
    }

    /// Make `kill_session` fail for this name.
    #[must_use]
    pub fn with_kill_failure(self, name: &str) -> Self {
        self.with_state(|s| {
            s.fail_kill.insert(name.to_string());
        })
    }

    /// Make `capture_output` fail (without the session vanishing).
    #[must_use]
    pub fn with_capture_failure(self, name: &str) -> Self {
        self.with_state(|s| {
            s.fail_capture.insert(name.to_string());
        })
    }

    /// Make `list_sessions` fail.
    #[must_use]
    pub fn with_list_failure(self) -> Self {
        self.with_state(|s| s.fail_list = true)
    }

    /// Add an idle session at runtime (for example a human-started one).
    pub fn add_session(&self, name: &str) {
        self.lock()
            .sessions
            .entry(name.to_string())
            .or_default();
    }

    /// Remove a session without recording a kill (the agent crashed).
    pub fn remove_session(&self, name: &str) {
        self.lock().sessions.remove(name);
    }

    /// Queue outputs to be returned by the next captures of a session.
    pub fn script_output(&self, name: &str, outputs: &[&str]) {
        if let Some(session) = self.lock().sessions.get_mut(name) {
            session
                .scripted
                .extend(outputs.iter().map(|o| (*o).to_string()));
        }
    }

    /// Switch a session between changing and frozen output.
    pub fn set_changing(&self, name: &str, changing: bool) {
        if let Some(session) = self.lock().sessions.get_mut(name) {
            session.changing = changing;
        }
    }

    /// Clear a previously configured kill failure.
    pub fn clear_kill_failure(&self, name: &str) {
        self.lock().fail_kill.remove(name);
    }

    /// Names of live sessions, sorted.
    pub fn live_sessions(&self) -> Vec<String> {
        self.lock().sessions.keys().cloned().collect()
    }

    /// Whether a session is live.
    pub fn is_live(&self, name: &str) -> bool {
        self.lock().sessions.contains_key(name)
    }

    /// Names passed to successful `create_session` calls, in order.
    pub fn created(&self) -> Vec<String> {
        self.lock().created.clone()
    }

    /// Names passed to successful `kill_session` calls, in order.
    pub fn killed(&self) -> Vec<String> {
        self.lock().killed.clone()
    }

    /// Text sent to a session, in order.
    pub fn inputs(&self, name: &str) -> Vec<String> {
        self.lock()
            .sessions
            .get(name)
            .map(|s| s.inputs.clone())
            .unwrap_or_default()
    }

    /// Number of submit keystrokes sent to a session.
    pub fn submit_count(&self, name: &str) -> u32 {
        self.lock().sessions.get(name).map_or(0, |s| s.submits)
    }

    /// Number of `list_sessions` calls so far.
    pub fn list_calls(&self) -> u32 {
        self.lock().list_calls
    }

    /// Names a caller tried to start while a session of that name was
    /// live, in order. Covers both the existence check and `create_session`.
    pub fn collisions(&self) -> Vec<String> {
        self.lock().collisions.clone()
    }
}

#[async_trait]
impl SessionManager for MockSessionManager {
    async fn session_exists(&self, name: &str) -> bool {
        let mut state = self.lock();
        let live = state.sessions.contains_key(name);
        if live {
            state.collisions.push(name.to_string());
        }
        live
    }

    async fn create_session(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        if state.fail_create.contains(name) {
            return Err(KollabError::session("create", name, "mock create failure"));
        }
        if state.sessions.contains_key(name) {
            state.collisions.push(name.to_string());
            return Err(KollabError::SessionExists {
                name: name.to_string(),
            });
        }
        state
            .sessions
            .insert(name.to_string(), MockSession::default());
        state.created.push(name.to_string());
        Ok(())
    }

    async fn kill_session(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        if state.fail_kill.contains(name) {
            return Err(KollabError::session("kill", name, "mock kill failure"));
        }
        if state.sessions.remove(name).is_none() {
            return Err(KollabError::SessionNotFound {
                name: name.to_string(),
            });
        }
        state.killed.push(name.to_string());
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<String>> {
        let mut state = self.lock();
        state.list_calls += 1;
        if state.fail_list {
            return Err(KollabError::session("list", "-", "mock list failure"));
        }
        Ok(state.sessions.keys().cloned().collect())
    }

    async fn send_text(&self, name: &str, text: &str) -> Result<()> {
        let mut state = self.lock();
        let session = state
            .sessions
            .get_mut(name)
            .ok_or_else(|| KollabError::SessionNotFound {
                name: name.to_string(),
            })?;
        session.inputs.push(text.to_string());
        Ok(())
    }

    async fn send_submit(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        let session = state
            .sessions
            .get_mut(name)
            .ok_or_else(|| KollabError::SessionNotFound {
                name: name.to_string(),
            })?;
        session.submits += 1;
        Ok(())
    }

    async fn capture_output(&self, name: &str, _max_lines: usize) -> Result<String> {
        let mut state = self.lock();
        if state.fail_capture.contains(name) {
            return Err(KollabError::session("capture", name, "mock capture failure"));
        }
        let session = state
            .sessions
            .get_mut(name)
            .ok_or_else(|| KollabError::SessionNotFound {
                name: name.to_string(),
            })?;
        session.captures += 1;
        if let Some(scripted) = session.scripted.pop_front() {
            return Ok(scripted);
        }
        if session.changing {
            return Ok(format!("{}\nstep {}", session.output, session.captures));
        }
        Ok(session.output.clone())
    }
}
