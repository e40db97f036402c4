//! Prompt builders.
//!
//! Pure functions from task data to instruction text. Nothing here touches
//! the file system or sessions.

use std::path::{Path, PathBuf};

use super::task_type::TaskCategory;
use super::templates::{render, TemplateMarker, GENERATOR_TEMPLATE, SPEC_TEMPLATE, WORKER_TEMPLATE};
use crate::ledger::{Ledger, TaskId, TypeTag};

/// Paths a worker needs to know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    pub ledger_path: PathBuf,
    pub spec_path: PathBuf,
    pub file_target: Option<String>,
}

fn bullets(items: &[&str]) -> String {
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Instructions for a worker agent.
///
/// # Example
///
/// ```
/// use kollaborate::ledger::{TaskId, TypeTag};
/// use kollaborate::prompt::{build_worker_prompt, classify, PromptContext};
///
/// let id = TaskId::parse("T4").unwrap();
/// let ctx = PromptContext {
///     ledger_path: "TASKS.md".into(),
///     spec_path: "specs/T4-parser-tests.md".into(),
///     file_target: None,
/// };
/// let prompt = build_worker_prompt(&id, "parser tests", classify(id.tag()), &ctx);
/// assert!(prompt.contains("T4: parser tests"));
/// assert!(prompt.contains("80%"));
/// ```
#[must_use]
pub fn build_worker_prompt(
    id: &TaskId,
    description: &str,
    category: TaskCategory,
    ctx: &PromptContext,
) -> String {
    let file_target = ctx
        .file_target
        .as_ref()
        .map(|f| format!("Primary file: {f}\n"))
        .unwrap_or_default();

    render(
        WORKER_TEMPLATE,
        &[
            (TemplateMarker::TaskId, id.to_string()),
            (TemplateMarker::Description, description.to_string()),
            (TemplateMarker::Category, category.name().to_string()),
            (TemplateMarker::Constraints, bullets(category.constraints())),
            (TemplateMarker::SpecPath, ctx.spec_path.display().to_string()),
            (TemplateMarker::LedgerPath, ctx.ledger_path.display().to_string()),
            (TemplateMarker::FileTarget, file_target),
        ],
    )
}

/// Instructions for a spec agent.
#[must_use]
pub fn build_spec_prompt(
    id: &TaskId,
    description: &str,
    category: TaskCategory,
    spec_path: &Path,
    ledger_path: &Path,
    min_lines: usize,
) -> String {
    render(
        SPEC_TEMPLATE,
        &[
            (TemplateMarker::TaskId, id.to_string()),
            (TemplateMarker::Description, description.to_string()),
            (TemplateMarker::Category, category.name().to_string()),
            (TemplateMarker::Constraints, bullets(category.constraints())),
            (TemplateMarker::SpecPath, spec_path.display().to_string()),
            (TemplateMarker::LedgerPath, ledger_path.display().to_string()),
            (TemplateMarker::MinLines, min_lines.to_string()),
        ],
    )
}

/// Instructions for the backlog generator, listing the next free id per
/// type tag.
#[must_use]
pub fn build_generator_prompt(ledger: &Ledger, ledger_path: &Path, threshold: usize) -> String {
    let next_ids = TypeTag::ALL
        .into_iter()
        .map(|tag| {
            let category = super::classify(tag);
            format!("- {}: {}{}", category.name(), tag, ledger.next_ordinal(tag))
        })
        .collect::<Vec<_>>()
        .join("\n");

    render(
        GENERATOR_TEMPLATE,
        &[
            (TemplateMarker::LedgerPath, ledger_path.display().to_string()),
            (TemplateMarker::Pending, ledger.pending_count().to_string()),
            (TemplateMarker::Threshold, threshold.to_string()),
            (TemplateMarker::NextIds, next_ids),
        ],
    )
}

/// Message sent to an idle worker.
#[must_use]
pub fn idle_warning(remaining: u32) -> String {
    let plural = if remaining == 1 { "" } else { "s" };
    format!(
        "Your session has shown no output change since the last check. \
         {remaining} idle check{plural} remaining before this task is reassigned. \
         Continue the task, or mark your ledger line DONE or QA if it is finished."
    )
}

/// Message sent to a busy worker at most once per reminder interval.
#[must_use]
pub fn progress_nudge(id: &TaskId) -> String {
    format!(
        "Progress check for {id}: keep going. When the task is complete, change \
         your ledger line from WORKING to DONE (or QA if it needs review)."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::classify;

    fn ctx(file_target: Option<&str>) -> PromptContext {
        PromptContext {
            ledger_path: PathBuf::from("/proj/TASKS.md"),
            spec_path: PathBuf::from("/proj/specs/F3-add-login.md"),
            file_target: file_target.map(String::from),
        }
    }

    #[test]
    fn test_worker_prompt_interpolates_everything() {
        let id = TaskId::parse("F3").unwrap();
        let prompt = build_worker_prompt(&id, "add login", classify(id.tag()), &ctx(Some("src/auth.rs")));

        assert!(prompt.contains("worker agent for task F3 (Feature)"));
        assert!(prompt.contains("F3: add login"));
        assert!(prompt.contains("/proj/specs/F3-add-login.md"));
        assert!(prompt.contains("/proj/TASKS.md"));
        assert!(prompt.contains("Primary file: src/auth.rs"));
        assert!(prompt.contains("`DONE:`"));
        for rule in TaskCategory::Feature.constraints() {
            assert!(prompt.contains(rule));
        }
    }

    #[test]
    fn test_worker_prompt_without_file_target() {
        let id = TaskId::parse("F3").unwrap();
        let prompt = build_worker_prompt(&id, "add login", TaskCategory::Feature, &ctx(None));
        assert!(!prompt.contains("Primary file"));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn test_worker_prompt_per_category_differs() {
        let id = TaskId::parse("H1").unwrap();
        let hotfix = build_worker_prompt(&id, "x", TaskCategory::Hotfix, &ctx(None));
        let migration = build_worker_prompt(&id, "x", TaskCategory::Migration, &ctx(None));
        assert!(hotfix.contains("rollback plan"));
        assert!(migration.contains("idempotent"));
        assert_ne!(hotfix, migration);
    }

    #[test]
    fn test_spec_prompt() {
        let id = TaskId::parse("B2").unwrap();
        let prompt = build_spec_prompt(
            &id,
            "fix crash",
            TaskCategory::Bugfix,
            Path::new("specs/B2-fix-crash.md"),
            Path::new("TASKS.md"),
            50,
        );
        assert!(prompt.contains("specification agent for task B2 (Bugfix)"));
        assert!(prompt.contains("specs/B2-fix-crash.md"));
        assert!(prompt.contains("more than 50 lines"));
    }

    #[test]
    fn test_generator_prompt_lists_next_ids() {
        let ledger = Ledger::parse("NEW: F1 - a\nDONE: F4 - b\nWORKING: R2 - c\n");
        let prompt = build_generator_prompt(&ledger, Path::new("TASKS.md"), 5);
        assert!(prompt.contains("- Feature: F5"));
        assert!(prompt.contains("- Refactor: R3"));
        assert!(prompt.contains("- Hotfix: H1"));
        assert!(prompt.contains("has 1 pending tasks"));
    }

    #[test]
    fn test_messages() {
        assert!(idle_warning(2).contains("2 idle checks remaining"));
        assert!(idle_warning(1).contains("1 idle check remaining"));
        assert!(progress_nudge(&TaskId::parse("R5").unwrap()).contains("R5"));
    }
}
