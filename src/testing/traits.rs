//! Trait definitions for testable abstractions.
//!
//! The daemon talks to the terminal multiplexer only through
//! [`SessionManager`], so the reconciliation engine can be driven in tests
//! without tmux.

use async_trait::async_trait;

use crate::error::Result;

/// Abstraction over the terminal-multiplexer session primitives.
///
/// Implementations report outcomes as structured values and typed errors.
/// Callers never inspect command output text to decide success.
///
/// # Example
///
/// ```rust,ignore
/// use kollaborate::testing::SessionManager;
///
/// async fn nudge(sessions: &dyn SessionManager, name: &str) -> kollaborate::Result<()> {
///     sessions.send_text(name, "Still with us? Post a status update.").await?;
///     sessions.send_submit(name).await
/// }
/// ```
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Check whether a session with this exact name exists.
    async fn session_exists(&self, name: &str) -> bool;

    /// Create a detached session.
    ///
    /// # Errors
    ///
    /// Returns [`crate::KollabError::SessionExists`] if the name is taken,
    /// or a session error if the multiplexer call fails.
    async fn create_session(&self, name: &str) -> Result<()>;

    /// Kill a session.
    ///
    /// # Errors
    ///
    /// Returns [`crate::KollabError::SessionNotFound`] if it does not exist.
    async fn kill_session(&self, name: &str) -> Result<()>;

    /// List the names of all sessions, including ones this daemon did not
    /// create.
    ///
    /// # Errors
    ///
    /// Returns an error if the multiplexer cannot be queried.
    async fn list_sessions(&self) -> Result<Vec<String>>;

    /// Type text into the session without submitting it.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is gone or the call fails.
    async fn send_text(&self, name: &str, text: &str) -> Result<()>;

    /// Send the submit keystroke (Enter).
    ///
    /// # Errors
    ///
    /// Returns an error if the session is gone or the call fails.
    async fn send_submit(&self, name: &str) -> Result<()>;

    /// Capture up to `max_lines` of the most recent session output.
    ///
    /// # Errors
    ///
    /// Returns [`crate::KollabError::SessionNotFound`] if the session is
    /// gone, or a session error if the capture fails.
    async fn capture_output(&self, name: &str, max_lines: usize) -> Result<String>;
}
