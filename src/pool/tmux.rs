//! tmux-backed session manager.
//!
//! Every call runs the `tmux` binary through `tokio::process::Command` and
//! decides success from the exit status. Session targets use the `=name`
//! exact-match form so `R1` never resolves to `R12`. Text is delivered as
//! a paste and the submit keystroke as a separate `send-keys Enter`.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

use crate::error::{IntoKollabError, KollabError, Result};
use crate::testing::SessionManager;

/// Default multiplexer binary
pub const TMUX_BINARY: &str = "tmux";

/// Real session manager driving tmux.
#[derive(Debug, Clone)]
pub struct TmuxSessions {
    binary: String,
    project_dir: PathBuf,
}

impl TmuxSessions {
    /// Create a manager whose new sessions start in `project_dir`.
    #[must_use]
    pub fn new(project_dir: PathBuf) -> Self {
        Self {
            binary: TMUX_BINARY.to_string(),
            project_dir,
        }
    }

    /// Check that the tmux binary is on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`KollabError::MissingTool`] when it is not.
    pub fn check_available() -> Result<PathBuf> {
        which::which(TMUX_BINARY).map_err(|_| KollabError::MissingTool {
            tool: TMUX_BINARY.to_string(),
        })
    }

    async fn run(&self, operation: &str, name: &str, args: &[&str]) -> Result<Output> {
        debug!(operation, session = name, "Running tmux");
        Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .into_kollab_session(operation, name)
    }

    async fn run_checked(&self, operation: &str, name: &str, args: &[&str]) -> Result<()> {
        let output = self.run(operation, name, args).await?;
        if output.status.success() {
            return Ok(());
        }
        if !self.session_exists(name).await {
            return Err(KollabError::SessionNotFound {
                name: name.to_string(),
            });
        }
        Err(status_error(operation, name, &output))
    }
}

fn exact(name: &str) -> String {
    format!("={name}")
}

fn pane(name: &str) -> String {
    format!("={name}:")
}

fn status_error(operation: &str, name: &str, output: &Output) -> KollabError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    KollabError::session(
        operation,
        name,
        format!("tmux exited with {}: {}", output.status, stderr.trim()),
    )
}

#[async_trait]
impl SessionManager for TmuxSessions {
    async fn session_exists(&self, name: &str) -> bool {
        self.run("has-session", name, &["has-session", "-t", &exact(name)])
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn create_session(&self, name: &str) -> Result<()> {
        if self.session_exists(name).await {
            return Err(KollabError::SessionExists {
                name: name.to_string(),
            });
        }
        let dir = self.project_dir.to_string_lossy();
        let output = self
            .run(
                "create",
                name,
                &["new-session", "-d", "-s", name, "-c", dir.as_ref()],
            )
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(status_error("create", name, &output))
        }
    }

    async fn kill_session(&self, name: &str) -> Result<()> {
        self.run_checked("kill", name, &["kill-session", "-t", &exact(name)])
            .await
    }

    async fn list_sessions(&self) -> Result<Vec<String>> {
        let output = self
            .run("list", "-", &["list-sessions", "-F", "#{session_name}"])
            .await?;
        if !output.status.success() {
            // With no sessions at all the tmux server is not running; that
            // is an empty pool, not a failure.
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("no server running") || stderr.contains("error connecting") {
                return Ok(Vec::new());
            }
            return Err(status_error("list", "-", &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    async fn send_text(&self, name: &str, text: &str) -> Result<()> {
        // Multi-line prompts go through a bracketed paste so embedded
        // newlines are not taken as submits.
        let buffer = format!("kollab-{name}");
        self.run_checked("send", name, &["set-buffer", "-b", &buffer, "--", text])
            .await?;
        self.run_checked(
            "send",
            name,
            &["paste-buffer", "-p", "-d", "-b", &buffer, "-t", &pane(name)],
        )
        .await
    }

    async fn send_submit(&self, name: &str) -> Result<()> {
        self.run_checked("submit", name, &["send-keys", "-t", &pane(name), "Enter"])
            .await
    }

    async fn capture_output(&self, name: &str, max_lines: usize) -> Result<String> {
        let start = format!("-{max_lines}");
        let output = self
            .run(
                "capture",
                name,
                &["capture-pane", "-p", "-t", &pane(name), "-S", &start],
            )
            .await?;
        if output.status.success() {
            return Ok(last_lines(&String::from_utf8_lossy(&output.stdout), max_lines));
        }
        if !self.session_exists(name).await {
            return Err(KollabError::SessionNotFound {
                name: name.to_string(),
            });
        }
        Err(status_error("capture", name, &output))
    }
}

/// The last `max_lines` lines of a pane capture. `-S -N` returns N lines
/// of history plus the visible pane, and the pane is padded with blank
/// lines below the cursor.
fn last_lines(capture: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = capture.trim_end_matches('\n').lines().collect();
    let end = lines
        .iter()
        .rposition(|line| !line.trim().is_empty())
        .map_or(0, |i| i + 1);
    let start = end.saturating_sub(max_lines);
    lines[start..end].join("\n")
}
