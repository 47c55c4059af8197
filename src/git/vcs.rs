//! Version-control and filesystem seams used by the change set builder
//!
//! The builder only talks to these traits so it can be driven by the
//! git2-backed adapters in production and by in-memory fakes in tests.

use std::fs;
use std::io;
use std::path::PathBuf;

use super::GitError;

/// Comparison range for diff queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffRange {
    /// `HEAD~1..HEAD`: the most recent commit on the branch
    PreviousCommit,
    /// `base...head`: what `head` introduced since it diverged from `base`
    ThreeDot { base: String, head: String },
    /// HEAD against the working tree (index included)
    WorkingTree,
}

impl DiffRange {
    /// Choose the committed-changes range for a base and current branch.
    ///
    /// Comparing a branch with itself would be empty, so the latest commit
    /// is treated as the change set instead.
    pub fn for_branches(base: &str, current: &str) -> Self {
        if base == current {
            DiffRange::PreviousCommit
        } else {
            DiffRange::ThreeDot {
                base: base.to_string(),
                head: current.to_string(),
            }
        }
    }
}

impl std::fmt::Display for DiffRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffRange::PreviousCommit => write!(f, "HEAD~1..HEAD"),
            DiffRange::ThreeDot { base, head } => write!(f, "{base}...{head}"),
            DiffRange::WorkingTree => write!(f, "HEAD..(working tree)"),
        }
    }
}

/// Working-tree status partitioned the way `git status` reports it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSets {
    /// Modified in the index or the working tree
    pub modified: Vec<String>,
    /// Untracked files
    pub not_added: Vec<String>,
    /// Newly added to the index
    pub created: Vec<String>,
    /// Deleted in the index or the working tree
    pub deleted: Vec<String>,
    /// Any staged change
    pub staged: Vec<String>,
}

impl StatusSets {
    /// Union of all partitions, deduplicated, in first-seen order
    pub fn candidates(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for path in self
            .modified
            .iter()
            .chain(&self.not_added)
            .chain(&self.created)
            .chain(&self.deleted)
            .chain(&self.staged)
        {
            if !out.contains(path) {
                out.push(path.clone());
            }
        }
        out
    }

    /// Whether a path is new to the repository (untracked or staged as new)
    pub fn is_new(&self, path: &str) -> bool {
        self.not_added.iter().any(|p| p == path) || self.created.iter().any(|p| p == path)
    }
}

/// Read-only repository queries
pub trait Vcs {
    /// Name of the checked-out branch; fails on a detached HEAD
    fn current_branch_name(&self) -> Result<String, GitError>;

    /// Working-tree status
    fn status_sets(&self) -> Result<StatusSets, GitError>;

    /// Changed paths with their single-letter status codes
    fn name_status_diff(&self, range: &DiffRange) -> Result<Vec<(char, String)>, GitError>;

    /// Unified diff text for one path
    fn file_diff(&self, range: &DiffRange, path: &str) -> Result<String, GitError>;

    /// Content of a path at a revision (branch name, `HEAD`, hash, ...)
    fn file_content_at_revision(&self, revision: &str, path: &str) -> Result<String, GitError>;
}

/// Read-only access to working-tree files, by repository-relative path
pub trait FileSystem {
    fn exists(&self, path: &str) -> bool;
    fn read_text(&self, path: &str) -> io::Result<String>;
}

/// `FileSystem` rooted at a repository work directory
#[derive(Debug, Clone)]
pub struct WorkingDir {
    root: PathBuf,
}

impl WorkingDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FileSystem for WorkingDir {
    fn exists(&self, path: &str) -> bool {
        self.root.join(path).exists()
    }

    fn read_text(&self, path: &str) -> io::Result<String> {
        fs::read_to_string(self.root.join(path))
    }
}
