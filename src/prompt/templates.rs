//! Instruction templates with marker substitution.
//!
//! Templates are plain text with `{{MARKER}}` injection points. Rendering
//! replaces every known marker; a marker without a value renders empty.
//!
//! # Example
//!
//! ```
//! use kollaborate::prompt::templates::{render, TemplateMarker};
//!
//! let text = render("Task {{TASK_ID}}: {{DESCRIPTION}}", &[
//!     (TemplateMarker::TaskId, "F3".to_string()),
//!     (TemplateMarker::Description, "add login".to_string()),
//! ]);
//! assert_eq!(text, "Task F3: add login");
//! ```

/// Injection points understood by [`render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateMarker {
    TaskId,
    Description,
    Category,
    Constraints,
    SpecPath,
    LedgerPath,
    FileTarget,
    MinLines,
    NextIds,
    Pending,
    Threshold,
}

impl TemplateMarker {
    pub const ALL: [TemplateMarker; 11] = [
        TemplateMarker::TaskId,
        TemplateMarker::Description,
        TemplateMarker::Category,
        TemplateMarker::Constraints,
        TemplateMarker::SpecPath,
        TemplateMarker::LedgerPath,
        TemplateMarker::FileTarget,
        TemplateMarker::MinLines,
        TemplateMarker::NextIds,
        TemplateMarker::Pending,
        TemplateMarker::Threshold,
    ];

    /// The `{{...}}` tag for this marker.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            TemplateMarker::TaskId => "{{TASK_ID}}",
            TemplateMarker::Description => "{{DESCRIPTION}}",
            TemplateMarker::Category => "{{CATEGORY}}",
            TemplateMarker::Constraints => "{{CONSTRAINTS}}",
            TemplateMarker::SpecPath => "{{SPEC_PATH}}",
            TemplateMarker::LedgerPath => "{{LEDGER_PATH}}",
            TemplateMarker::FileTarget => "{{FILE_TARGET}}",
            TemplateMarker::MinLines => "{{MIN_LINES}}",
            TemplateMarker::NextIds => "{{NEXT_IDS}}",
            TemplateMarker::Pending => "{{PENDING}}",
            TemplateMarker::Threshold => "{{THRESHOLD}}",
        }
    }
}

/// Substitute markers in `template`. Markers not in `values` are removed.
#[must_use]
pub fn render(template: &str, values: &[(TemplateMarker, String)]) -> String {
    let mut out = template.to_string();
    for marker in TemplateMarker::ALL {
        if !out.contains(marker.tag()) {
            continue;
        }
        let value = values
            .iter()
            .find(|(m, _)| *m == marker)
            .map_or("", |(_, v)| v.as_str());
        out = out.replace(marker.tag(), value);
    }
    out
}

pub const WORKER_TEMPLATE: &str = "\
You are the worker agent for task {{TASK_ID}} ({{CATEGORY}}).

## Task
{{TASK_ID}}: {{DESCRIPTION}}
{{FILE_TARGET}}
## Specification
Read the full specification before writing any code:
{{SPEC_PATH}}

## {{CATEGORY}} rules
{{CONSTRAINTS}}

## Completion protocol
The task ledger is {{LEDGER_PATH}}. Your task's line currently reads
`WORKING: {{TASK_ID}} - ...`.
- When the work is finished and verified, change `WORKING:` to `DONE:` on
  that line.
- If it needs human review first, change it to `QA:` instead.
- Edit only your own line. Do not add, remove, or reorder other lines.
- Keep working until the task is complete; your session is monitored and
  will be recycled if it stays idle.
";

pub const SPEC_TEMPLATE: &str = "\
You are the specification agent for task {{TASK_ID}} ({{CATEGORY}}).

## Task
{{TASK_ID}}: {{DESCRIPTION}}

## Deliverable
Write a detailed implementation specification to:
{{SPEC_PATH}}

The specification must be more than {{MIN_LINES}} lines and cover:
- goal and scope, including what is out of scope
- affected files and modules
- step-by-step implementation plan
- edge cases and error handling
- acceptance criteria a reviewer can check one by one

A worker following the {{CATEGORY}} rules will implement it:
{{CONSTRAINTS}}

Do not implement the task and do not edit the ledger ({{LEDGER_PATH}}).
Stop once the specification file is written.
";

pub const GENERATOR_TEMPLATE: &str = "\
You are the task generator for this project.

The task ledger {{LEDGER_PATH}} has {{PENDING}} pending tasks, below the
target of {{THRESHOLD}}. Study the codebase and the ledger, then append new
tasks to the end of the ledger, one per line, in this exact format:

NEW: <ID> - <one-line description> (optional/file/path.rs)

Use the next free id for each type tag:
{{NEXT_IDS}}

Rules:
- Never modify or remove existing lines.
- Never reuse an id that already appears in the ledger.
- Each task must be small enough for one agent to finish in one session.
- Add at least enough tasks to bring the pending count to {{THRESHOLD}}.
Stop once the tasks are appended.
";
