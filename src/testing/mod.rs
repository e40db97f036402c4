//! Testing infrastructure for kollaborate.
//!
//! This module provides the session seam, a mock behind it, fixtures, and
//! assertions for testing the reconciliation loop without tmux.
//!
//! # Architecture
//!
//! The testing infrastructure is organized into:
//! - **Traits**: [`SessionManager`], the only way the daemon touches sessions
//! - **Mocks**: [`MockSessionManager`], scriptable in-memory sessions
//! - **Fixtures**: temporary projects with a ledger and spec dir (test-only)
//! - **Assertions**: ledger and session assertions
//!
//! # Example
//!
//! ```rust,ignore
//! use kollaborate::testing::{MockSessionManager, TestFixture};
//!
//! let sessions = MockSessionManager::new()
//!     .with_idle_session("R5", "$ ")
//!     .with_kill_failure("R5");
//!
//! let fixture = TestFixture::with_ledger("WORKING: R5 - fix bug\n");
//! ```

pub mod assertions;
#[cfg(test)]
pub mod fixtures;
pub mod mocks;
pub mod traits;

// Re-export commonly used types
pub use assertions::*;
#[cfg(test)]
pub use fixtures::*;
pub use mocks::*;
pub use traits::*;
