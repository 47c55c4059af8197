//! Git operations module
//!
//! Provides the change set the validator reasons about:
//! - Repository access through git2 behind small query traits
//! - Committed and uncommitted change streams, merged per file
//! - Diff rendering and line accounting
//! - Path relevance filtering

pub(crate) mod changes;
mod diff;
mod error;
mod relevance;
mod repo;
mod vcs;

#[cfg(test)]
pub(crate) mod testutil;

pub use changes::{Change, ChangeSetBuilder, ChangeType, collect_changes};
pub use error::GitError;
pub use repo::GitRepository;
pub use vcs::Vcs;
