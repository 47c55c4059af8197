//! Change set extraction
//!
//! Gathers what differs between a base branch and the current state of a
//! repository. Two streams are computed independently and merged:
//!
//! - committed changes: the base branch against the current branch tip
//! - local changes: HEAD against the working tree (staged and untracked too)
//!
//! When a path appears in both, the local entry describes the file and the
//! line counts of both entries are added together.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::diff::{count_line_changes, synthesize_added, synthesize_deleted};
use super::relevance::is_relevant;
use super::repo::GitRepository;
use super::vcs::{DiffRange, FileSystem, Vcs};
use super::GitError;

/// Kind of change to a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl ChangeType {
    /// Map a name-status code; unknown codes count as modifications
    pub fn from_status_code(code: char) -> Self {
        match code {
            'A' => ChangeType::Added,
            'M' => ChangeType::Modified,
            'D' => ChangeType::Deleted,
            'R' => ChangeType::Renamed,
            _ => ChangeType::Modified,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Added => "added",
            ChangeType::Modified => "modified",
            ChangeType::Deleted => "deleted",
            ChangeType::Renamed => "renamed",
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which stream produced a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOrigin {
    Local,
    Committed,
}

/// One changed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    /// Repository-relative path, unique within a change set
    pub file_path: String,
    pub change_type: ChangeType,
    pub additions: usize,
    pub deletions: usize,
    /// Current content; empty for deleted files
    pub content: String,
    /// Unified diff against the comparison point
    pub diff: String,
    pub origin: ChangeOrigin,
}

impl Change {
    /// Build a change, deriving line counts from the diff
    pub fn new(
        file_path: String,
        change_type: ChangeType,
        content: String,
        diff: String,
        origin: ChangeOrigin,
    ) -> Self {
        let (additions, deletions) = count_line_changes(&diff);
        Self {
            file_path,
            change_type,
            additions,
            deletions,
            content,
            diff,
            origin,
        }
    }

    /// Replace this entry with `local`, keeping the combined line counts
    fn absorb_local(&mut self, local: Change) {
        let additions = self.additions + local.additions;
        let deletions = self.deletions + local.deletions;
        *self = Change {
            additions,
            deletions,
            ..local
        };
    }
}

/// Builds the merged change set for one repository
pub struct ChangeSetBuilder<'a, V: Vcs + ?Sized, F: FileSystem + ?Sized> {
    vcs: &'a V,
    fs: &'a F,
}

impl<'a, V: Vcs + ?Sized, F: FileSystem + ?Sized> ChangeSetBuilder<'a, V, F> {
    pub fn new(vcs: &'a V, fs: &'a F) -> Self {
        Self { vcs, fs }
    }

    /// Changes between `base_branch` and the current state, restricted to
    /// `relevant_paths` when that list is non-empty.
    ///
    /// Fails only for repository-level problems. Files whose content or diff
    /// cannot be read are logged and degraded or skipped.
    pub fn get_changes(
        &self,
        base_branch: &str,
        relevant_paths: &[String],
    ) -> Result<Vec<Change>, GitError> {
        if base_branch.is_empty() {
            return Err(GitError::EmptyBaseBranch);
        }

        let current = self.vcs.current_branch_name().map_err(|e| match e {
            GitError::RepositoryState(_) => e,
            other => GitError::RepositoryState(other.to_string()),
        })?;
        info!(base = base_branch, current = %current, "collecting git changes");

        let committed = self.committed_changes(base_branch, &current, relevant_paths)?;
        let local = self.local_changes(relevant_paths)?;
        debug!(
            committed = committed.len(),
            local = local.len(),
            "merging change streams"
        );

        let changes = merge_changes(committed, local);
        info!(count = changes.len(), "found changed files");
        Ok(changes)
    }

    fn committed_changes(
        &self,
        base_branch: &str,
        current: &str,
        relevant_paths: &[String],
    ) -> Result<Vec<Change>, GitError> {
        let range = DiffRange::for_branches(base_branch, current);
        let entries = self.vcs.name_status_diff(&range)?;
        if entries.is_empty() {
            debug!(%range, "no committed changes");
            return Ok(Vec::new());
        }

        let mut changes = Vec::new();
        for (code, path) in entries {
            if !is_relevant(&path, relevant_paths) {
                debug!(path = %path, "skipping irrelevant file");
                continue;
            }

            // Deleted files have no content at the tip
            let content = match self.vcs.file_content_at_revision(current, &path) {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %path, error = %e, "content unavailable at branch tip");
                    String::new()
                }
            };

            let diff = match self.vcs.file_diff(&range, &path) {
                Ok(diff) => diff,
                Err(e) => {
                    warn!(path = %path, error = %e, "skipping file without diff");
                    continue;
                }
            };

            debug!(path = %path, status = %code, "processed committed file");
            changes.push(Change::new(
                path,
                ChangeType::from_status_code(code),
                content,
                diff,
                ChangeOrigin::Committed,
            ));
        }

        Ok(changes)
    }

    fn local_changes(&self, relevant_paths: &[String]) -> Result<Vec<Change>, GitError> {
        let status = self.vcs.status_sets()?;

        let mut changes = Vec::new();
        for path in status.candidates() {
            if !is_relevant(&path, relevant_paths) {
                debug!(path = %path, "skipping irrelevant file");
                continue;
            }

            if !self.fs.exists(&path) {
                let diff = match self.vcs.file_content_at_revision("HEAD", &path) {
                    Ok(head_content) => synthesize_deleted(&head_content),
                    Err(e) => {
                        warn!(path = %path, error = %e, "HEAD version unavailable for deleted file");
                        String::new()
                    }
                };
                changes.push(Change::new(
                    path,
                    ChangeType::Deleted,
                    String::new(),
                    diff,
                    ChangeOrigin::Local,
                ));
                continue;
            }

            let content = match self.fs.read_text(&path) {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %path, error = %e, "skipping unreadable file");
                    continue;
                }
            };

            let change = if status.is_new(&path) {
                let diff = synthesize_added(&content);
                Change::new(path, ChangeType::Added, content, diff, ChangeOrigin::Local)
            } else {
                let diff = match self.vcs.file_diff(&DiffRange::WorkingTree, &path) {
                    Ok(diff) => diff,
                    Err(e) => {
                        warn!(path = %path, error = %e, "skipping file without diff");
                        continue;
                    }
                };
                Change::new(path, ChangeType::Modified, content, diff, ChangeOrigin::Local)
            };
            changes.push(change);
        }

        Ok(changes)
    }
}

/// Merge the two streams by path; local entries win, line counts add up.
///
/// The result is ordered by path.
pub fn merge_changes(committed: Vec<Change>, local: Vec<Change>) -> Vec<Change> {
    let mut by_path: BTreeMap<String, Change> = BTreeMap::new();

    for change in committed {
        by_path.insert(change.file_path.clone(), change);
    }

    for change in local {
        match by_path.entry(change.file_path.clone()) {
            Entry::Occupied(mut slot) => slot.get_mut().absorb_local(change),
            Entry::Vacant(slot) => {
                slot.insert(change);
            }
        }
    }

    by_path.into_values().collect()
}

/// Open the repository at `repo_path` and collect its change set
pub fn collect_changes(
    repo_path: &Path,
    base_branch: &str,
    relevant_paths: &[String],
) -> Result<Vec<Change>, GitError> {
    let repo = GitRepository::discover(repo_path)?;
    let workdir = repo.working_dir()?;
    ChangeSetBuilder::new(&repo, &workdir).get_changes(base_branch, relevant_paths)
}
