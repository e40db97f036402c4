//! Configuration management for the task watcher.
//!
//! Settings are layered, later layers winning:
//!
//! 1. built-in defaults
//! 2. user settings: `<config dir>/kollaborate/settings.json`
//! 3. project settings: `<project>/.kollaborate/settings.json`
//! 4. `KOLLAB_*` environment variables
//!
//! # Example settings.json
//!
//! ```json
//! {
//!   "ledgerPath": "TASKS.md",
//!   "specDir": "specs",
//!   "cycleIntervalSecs": 45,
//!   "replenishThreshold": 8,
//!   "agentCommand": "claude --dangerously-skip-permissions",
//!   "blockingRules": [{ "from": 108, "waitFor": [92, 107] }]
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{KollabError, Result};

/// Default number of worker agents
pub const DEFAULT_MAX_WORKERS: usize = 3;

/// Default number of spec agents
pub const DEFAULT_MAX_SPEC_AGENTS: usize = 2;

/// Name of the settings file in both the user and project config dirs
pub const SETTINGS_FILE: &str = "settings.json";

/// Project-level config directory
pub const PROJECT_CONFIG_DIR: &str = ".kollaborate";

/// A task whose ordinal is at least `from` waits until every task with an
/// ordinal inside `wait_for` (inclusive) is finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockingRule {
    pub from: u32,
    pub wait_for: (u32, u32),
}

/// Watcher configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatcherConfig {
    /// Ledger file, relative to the project directory
    pub ledger_path: PathBuf,
    /// Spec directory, relative to the project directory
    pub spec_dir: PathBuf,
    /// Sleep between reconciliation cycles
    pub cycle_interval_secs: u64,
    /// Spawn the generator when fewer than this many tasks are pending
    pub replenish_threshold: usize,
    /// Consecutive idle polls before a worker is recycled
    pub idle_strike_limit: u32,
    /// Minimum gap between progress nudges to an active worker
    pub reminder_interval_secs: u64,
    /// Wait between the two output snapshots of one poll
    pub poll_wait_secs: u64,
    /// A spec with this many lines or fewer is a placeholder
    pub spec_min_lines: usize,
    /// Lines of pane output captured per snapshot
    pub capture_lines: usize,
    /// Consecutive protocol violations before an agent is killed
    pub violation_limit: u32,
    /// Spec agents running longer than this are killed
    pub spec_agent_timeout_secs: u64,
    /// The generator is killed after running this long
    pub generator_timeout_secs: u64,
    /// Command line that starts the LLM CLI inside a fresh session
    pub agent_command: String,
    /// Wait after launching the agent before sending instructions
    pub agent_startup_secs: u64,
    /// Id-range ordering rules for the spawn phase
    pub blocking_rules: Vec<BlockingRule>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from("TASKS.md"),
            spec_dir: PathBuf::from("specs"),
            cycle_interval_secs: 30,
            replenish_threshold: 5,
            idle_strike_limit: 3,
            reminder_interval_secs: 120,
            poll_wait_secs: 4,
            spec_min_lines: 50,
            capture_lines: 40,
            violation_limit: 2,
            spec_agent_timeout_secs: 1800,
            generator_timeout_secs: 1800,
            agent_command: "claude --dangerously-skip-permissions".to_string(),
            agent_startup_secs: 5,
            blocking_rules: Vec::new(),
        }
    }
}

impl WatcherConfig {
    /// Load the layered configuration for a project.
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file exists but cannot be parsed, or
    /// an environment override has an invalid value.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let mut merged = serde_json::to_value(Self::default())?;

        let mut files = Vec::new();
        if let Some(user) = Self::user_settings_path() {
            files.push(user);
        }
        files.push(Self::settings_path(project_dir));

        for path in files.into_iter().filter(|p| p.is_file()) {
            let content = std::fs::read_to_string(&path)?;
            let layer: Value = serde_json::from_str(&content).map_err(|e| {
                KollabError::config_with_path(format!("invalid JSON: {e}"), path.clone())
            })?;
            merge_json(&mut merged, layer);
        }

        let mut config: WatcherConfig = serde_json::from_value(merged)
            .map_err(|e| KollabError::config(format!("invalid settings: {e}")))?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Project settings path.
    #[must_use]
    pub fn settings_path(project_dir: &Path) -> PathBuf {
        project_dir.join(PROJECT_CONFIG_DIR).join(SETTINGS_FILE)
    }

    /// User settings path, if the platform has a config directory.
    #[must_use]
    pub fn user_settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("kollaborate").join(SETTINGS_FILE))
    }

    /// Apply `KOLLAB_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`KollabError::InvalidConfig`] for non-numeric numeric values.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("KOLLAB_LEDGER") {
            self.ledger_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("KOLLAB_SPEC_DIR") {
            self.spec_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("KOLLAB_CYCLE_INTERVAL") {
            self.cycle_interval_secs = parse_env("KOLLAB_CYCLE_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("KOLLAB_REPLENISH_THRESHOLD") {
            self.replenish_threshold = parse_env("KOLLAB_REPLENISH_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("KOLLAB_AGENT_COMMAND") {
            self.agent_command = v;
        }
        Ok(())
    }

    /// Resolve relative paths against the project directory.
    #[must_use]
    pub fn resolved(mut self, project_dir: &Path) -> Self {
        if self.ledger_path.is_relative() {
            self.ledger_path = project_dir.join(&self.ledger_path);
        }
        if self.spec_dir.is_relative() {
            self.spec_dir = project_dir.join(&self.spec_dir);
        }
        self
    }

    /// Validate values that would make the loop misbehave.
    ///
    /// # Errors
    ///
    /// Returns [`KollabError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("cycleIntervalSecs", self.cycle_interval_secs == 0),
            ("idleStrikeLimit", self.idle_strike_limit == 0),
            ("violationLimit", self.violation_limit == 0),
            ("captureLines", self.capture_lines == 0),
            ("reminderIntervalSecs", self.reminder_interval_secs == 0),
            ("pollWaitSecs", self.poll_wait_secs == 0),
            ("specAgentTimeoutSecs", self.spec_agent_timeout_secs == 0),
            ("generatorTimeoutSecs", self.generator_timeout_secs == 0),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, bad)| *bad) {
            return Err(KollabError::invalid_config(*field, "must be greater than zero"));
        }
        if self.agent_command.trim().is_empty() {
            return Err(KollabError::invalid_config("agentCommand", "must not be empty"));
        }
        for rule in &self.blocking_rules {
            let (lo, hi) = rule.wait_for;
            if lo > hi {
                return Err(KollabError::invalid_config(
                    "blockingRules",
                    format!("waitFor range {lo}..{hi} is reversed"),
                ));
            }
        }
        Ok(())
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn reminder_interval(&self) -> Duration {
        Duration::from_secs(self.reminder_interval_secs)
    }

    pub fn poll_wait(&self) -> Duration {
        Duration::from_secs(self.poll_wait_secs)
    }

    pub fn spec_agent_timeout(&self) -> Duration {
        Duration::from_secs(self.spec_agent_timeout_secs)
    }

    pub fn generator_timeout(&self) -> Duration {
        Duration::from_secs(self.generator_timeout_secs)
    }

    pub fn agent_startup(&self) -> Duration {
        Duration::from_secs(self.agent_startup_secs)
    }
}

/// Pool capacity, fixed for the lifetime of the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
    pub max_workers: usize,
    pub max_spec_agents: usize,
}

impl Default for Capacity {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            max_spec_agents: DEFAULT_MAX_SPEC_AGENTS,
        }
    }
}

impl Capacity {
    /// # Errors
    ///
    /// Returns [`KollabError::InvalidConfig`] when `max_workers` is zero.
    pub fn new(max_workers: usize, max_spec_agents: usize) -> Result<Self> {
        if max_workers == 0 {
            return Err(KollabError::invalid_config(
                "maxWorkers",
                "must be greater than zero",
            ));
        }
        Ok(Self {
            max_workers,
            max_spec_agents,
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| KollabError::invalid_config(key, format!("'{value}' is not a number")))
}

/// Recursively merge `layer` into `base`; objects merge, everything else replaces.
fn merge_json(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base_map), Value::Object(layer_map)) => {
            for (key, value) in layer_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = WatcherConfig::default();
        assert_eq!(config.idle_strike_limit, 3);
        assert_eq!(config.reminder_interval_secs, 120);
        assert_eq!(config.poll_wait_secs, 4);
        assert_eq!(config.spec_min_lines, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_capacity() {
        let cap = Capacity::default();
        assert_eq!(cap.max_workers, 3);
        assert_eq!(cap.max_spec_agents, 2);
        assert!(Capacity::new(0, 2).is_err());
        assert!(Capacity::new(1, 0).is_ok());
    }

    #[test]
    fn test_project_settings_override_defaults() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(".kollaborate")).unwrap();
        std::fs::write(
            WatcherConfig::settings_path(temp.path()),
            r#"{"replenishThreshold": 9, "blockingRules": [{"from": 108, "waitFor": [92, 107]}]}"#,
        )
        .unwrap();

        let mut merged = serde_json::to_value(WatcherConfig::default()).unwrap();
        let layer: Value = serde_json::from_str(
            &std::fs::read_to_string(WatcherConfig::settings_path(temp.path())).unwrap(),
        )
        .unwrap();
        merge_json(&mut merged, layer);
        let config: WatcherConfig = serde_json::from_value(merged).unwrap();

        assert_eq!(config.replenish_threshold, 9);
        assert_eq!(config.cycle_interval_secs, 30);
        assert_eq!(
            config.blocking_rules,
            vec![BlockingRule {
                from: 108,
                wait_for: (92, 107)
            }]
        );
    }

    #[test]
    fn test_partial_json_deserializes_with_defaults() {
        let config: WatcherConfig = serde_json::from_str(r#"{"specDir": "docs/specs"}"#).unwrap();
        assert_eq!(config.spec_dir, PathBuf::from("docs/specs"));
        assert_eq!(config.ledger_path, PathBuf::from("TASKS.md"));
    }

    #[test]
    fn test_load_rejects_broken_project_settings() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(".kollaborate")).unwrap();
        std::fs::write(WatcherConfig::settings_path(temp.path()), "{ not json").unwrap();

        let err = WatcherConfig::load(temp.path()).unwrap_err();
        assert!(matches!(err, KollabError::Config { path: Some(_), .. }));
    }

    #[test]
    fn test_apply_env() {
        let env: HashMap<&str, &str> = [
            ("KOLLAB_LEDGER", "board.md"),
            ("KOLLAB_CYCLE_INTERVAL", "10"),
            ("KOLLAB_AGENT_COMMAND", "codex"),
        ]
        .into_iter()
        .collect();

        let mut config = WatcherConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.ledger_path, PathBuf::from("board.md"));
        assert_eq!(config.cycle_interval_secs, 10);
        assert_eq!(config.agent_command, "codex");
        assert_eq!(config.replenish_threshold, 5);
    }

    #[test]
    fn test_apply_env_rejects_non_numeric() {
        let mut config = WatcherConfig::default();
        let err = config
            .apply_env(|k| (k == "KOLLAB_REPLENISH_THRESHOLD").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, KollabError::InvalidConfig { .. }));
    }

    #[test]
    fn test_resolved_paths() {
        let config = WatcherConfig::default().resolved(Path::new("/proj"));
        assert_eq!(config.ledger_path, PathBuf::from("/proj/TASKS.md"));
        assert_eq!(config.spec_dir, PathBuf::from("/proj/specs"));

        let abs = WatcherConfig {
            ledger_path: PathBuf::from("/elsewhere/T.md"),
            ..WatcherConfig::default()
        }
        .resolved(Path::new("/proj"));
        assert_eq!(abs.ledger_path, PathBuf::from("/elsewhere/T.md"));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = WatcherConfig {
            cycle_interval_secs: 0,
            ..WatcherConfig::default()
        };
        match config.validate() {
            Err(KollabError::InvalidConfig { field, .. }) => {
                assert_eq!(field, "cycleIntervalSecs")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    fn rejected_field(config: &WatcherConfig) -> String {
        match config.validate() {
            Err(KollabError::InvalidConfig { field, .. }) => field,
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_zero_poll_wait() {
        let config = WatcherConfig {
            poll_wait_secs: 0,
            ..WatcherConfig::default()
        };
        assert_eq!(rejected_field(&config), "pollWaitSecs");
    }

    #[test]
    fn test_validate_rejects_zero_spec_agent_timeout() {
        let config = WatcherConfig {
            spec_agent_timeout_secs: 0,
            ..WatcherConfig::default()
        };
        assert_eq!(rejected_field(&config), "specAgentTimeoutSecs");
    }

    #[test]
    fn test_validate_rejects_zero_generator_timeout() {
        let config = WatcherConfig {
            generator_timeout_secs: 0,
            ..WatcherConfig::default()
        };
        assert_eq!(rejected_field(&config), "generatorTimeoutSecs");
    }

    #[test]
    fn test_validate_rejects_reversed_range() {
        let config = WatcherConfig {
            blocking_rules: vec![BlockingRule {
                from: 10,
                wait_for: (9, 3),
            }],
            ..WatcherConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
