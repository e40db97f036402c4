//! Task-type classification.
//!
//! Every task id starts with a type tag, and each tag maps to one
//! [`TaskCategory`] carrying the working rules a worker must follow for
//! that kind of task.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ledger::TypeTag;

/// Kind of work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskCategory {
    Feature,
    Refactor,
    Bugfix,
    Test,
    Documentation,
    Performance,
    Architecture,
    Security,
    Hotfix,
    Migration,
    Integration,
    Configuration,
    Experiment,
    UiUx,
    Validation,
    Workflow,
    Exploration,
}

/// Map a type tag to its category.
///
/// # Example
///
/// ```
/// use kollaborate::ledger::TypeTag;
/// use kollaborate::prompt::{classify, TaskCategory};
///
/// assert_eq!(classify(TypeTag::H), TaskCategory::Hotfix);
/// assert_eq!(classify(TypeTag::X).name(), "Exploration/Research");
/// ```
#[must_use]
pub fn classify(tag: TypeTag) -> TaskCategory {
    match tag {
        TypeTag::F => TaskCategory::Feature,
        TypeTag::R => TaskCategory::Refactor,
        TypeTag::B => TaskCategory::Bugfix,
        TypeTag::T => TaskCategory::Test,
        TypeTag::D => TaskCategory::Documentation,
        TypeTag::P => TaskCategory::Performance,
        TypeTag::A => TaskCategory::Architecture,
        TypeTag::S => TaskCategory::Security,
        TypeTag::H => TaskCategory::Hotfix,
        TypeTag::M => TaskCategory::Migration,
        TypeTag::I => TaskCategory::Integration,
        TypeTag::C => TaskCategory::Configuration,
        TypeTag::E => TaskCategory::Experiment,
        TypeTag::U => TaskCategory::UiUx,
        TypeTag::V => TaskCategory::Validation,
        TypeTag::W => TaskCategory::Workflow,
        TypeTag::X => TaskCategory::Exploration,
    }
}

impl TaskCategory {
    /// Human-readable name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Feature => "Feature",
            Self::Refactor => "Refactor",
            Self::Bugfix => "Bugfix",
            Self::Test => "Test",
            Self::Documentation => "Documentation",
            Self::Performance => "Performance",
            Self::Architecture => "Architecture",
            Self::Security => "Security",
            Self::Hotfix => "Hotfix",
            Self::Migration => "Migration",
            Self::Integration => "Integration",
            Self::Configuration => "Configuration",
            Self::Experiment => "Experiment",
            Self::UiUx => "UI/UX",
            Self::Validation => "Validation",
            Self::Workflow => "Workflow/CI",
            Self::Exploration => "Exploration/Research",
        }
    }

    /// Working rules for this category, one per bullet.
    #[must_use]
    pub fn constraints(&self) -> &'static [&'static str] {
        match self {
            Self::Feature => &[
                "Implement the complete behaviour described in the spec, not a stub.",
                "Add tests for the new behaviour alongside the code.",
                "Follow the conventions of the surrounding code.",
            ],
            Self::Refactor => &[
                "Preserve observable behaviour exactly; no functional changes.",
                "The existing test suite must pass before and after.",
                "Keep each step small enough to review on its own.",
            ],
            Self::Bugfix => &[
                "Reproduce the bug with a failing test before fixing it.",
                "Fix the root cause, not the symptom.",
                "Keep the regression test in the suite.",
            ],
            Self::Test => &[
                "Reach more than 80% line coverage of the code under test.",
                "Cover edge cases and error paths, not only the happy path.",
                "Tests must be deterministic; no sleeps or network calls.",
            ],
            Self::Documentation => &[
                "Verify every code example compiles or runs as written.",
                "Document behaviour as it is, not as it was planned.",
                "Do not change code except to fix doc comments.",
            ],
            Self::Performance => &[
                "Measure before and after with a reproducible benchmark.",
                "Report the numbers in your completion note.",
                "Do not trade correctness for speed.",
            ],
            Self::Architecture => &[
                "Write down the design decision and the alternatives rejected.",
                "Keep module boundaries and public interfaces explicit.",
                "Migrate callers incrementally; the build must stay green.",
            ],
            Self::Security => &[
                "Treat all external input as untrusted and validate it.",
                "Never log or commit secrets, tokens, or credentials.",
                "Add a test that exercises the attack you are defending against.",
            ],
            Self::Hotfix => &[
                "Make the minimal diff that resolves the incident.",
                "Include a rollback plan in your completion note.",
                "No refactoring or unrelated cleanup in the same change.",
            ],
            Self::Migration => &[
                "Write idempotent up and down scripts.",
                "Running a script twice must leave the same result as running it once.",
                "Test the down script restores the previous state.",
            ],
            Self::Integration => &[
                "Isolate the external system behind an interface.",
                "Handle timeouts, retries, and malformed responses explicitly.",
                "Provide a test double so the suite runs offline.",
            ],
            Self::Configuration => &[
                "Every new option needs a documented default.",
                "Invalid values must fail fast with a clear message.",
                "Existing configurations must keep working.",
            ],
            Self::Experiment => &[
                "Keep the experiment isolated behind a flag or on its own branch.",
                "State the hypothesis and how you will measure it.",
                "Record the outcome even when the result is negative.",
            ],
            Self::UiUx => &[
                "Keep the interface accessible: labels, contrast, keyboard use.",
                "Match the existing visual language and wording.",
                "Describe how to see the change in your completion note.",
            ],
            Self::Validation => &[
                "Check the acceptance criteria in the spec one by one.",
                "Report each criterion as met or not met with evidence.",
                "Do not fix problems you find; file them as new tasks.",
            ],
            Self::Workflow => &[
                "Pipelines must stay reproducible from a clean checkout.",
                "Pin tool and action versions.",
                "Keep the pipeline fast; cache what can be cached.",
            ],
            Self::Exploration => &[
                "Produce findings, not production code.",
                "Cite the sources and experiments behind each conclusion.",
                "End with concrete recommendations and follow-up tasks.",
            ],
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
