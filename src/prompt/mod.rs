//! Prompt synthesis.
//!
//! - [`task_type`] - the 17 task categories and their working rules
//! - [`templates`] - instruction templates with `{{MARKER}}` substitution
//! - [`builder`] - worker, spec, and generator prompts plus short messages
//!
//! Everything here is pure: strings in, strings out.

pub mod builder;
pub mod task_type;
pub mod templates;

pub use builder::{
    build_generator_prompt, build_spec_prompt, build_worker_prompt, idle_warning,
    progress_nudge, PromptContext,
};
pub use task_type::{classify, TaskCategory};
