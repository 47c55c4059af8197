//! git2-backed repository adapter
//!
//! Opens a repository explicitly from a path and answers the `Vcs` queries
//! (branch, status, name-status diff, per-file patch, file at revision).

use std::path::Path;

use git2::{Commit, Delta, Diff, DiffFindOptions, DiffOptions, Repository, Status, StatusOptions, Tree};

use super::diff::render_patch;
use super::vcs::{DiffRange, StatusSets, Vcs, WorkingDir};
use super::GitError;

/// Handle to one repository, passed explicitly to every operation
pub struct GitRepository {
    repo: Repository,
}

impl GitRepository {
    /// Discover the repository containing `path`
    pub fn discover(path: &Path) -> Result<Self, GitError> {
        let repo = Repository::discover(path).map_err(|e| {
            GitError::RepositoryState(format!(
                "no git repository at {}: {}",
                path.display(),
                e.message()
            ))
        })?;
        Ok(Self { repo })
    }

    /// Filesystem adapter for the work directory
    pub fn working_dir(&self) -> Result<WorkingDir, GitError> {
        self.repo
            .workdir()
            .map(WorkingDir::new)
            .ok_or_else(|| GitError::RepositoryState("bare repository has no working tree".to_string()))
    }

    fn resolve_commit(&self, revision: &str) -> Result<Commit<'_>, GitError> {
        self.repo
            .revparse_single(revision)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(|source| GitError::Revision {
                revision: revision.to_string(),
                source,
            })
    }

    /// HEAD tree, or `None` when the branch has no commits yet
    fn head_tree(&self) -> Result<Option<Tree<'_>>, GitError> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head.peel_to_tree()?)),
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Old and new trees for a range. A `None` new tree means the working tree.
    fn range_trees(&self, range: &DiffRange) -> Result<(Option<Tree<'_>>, Option<Tree<'_>>), GitError> {
        match range {
            DiffRange::PreviousCommit => {
                let head = self.resolve_commit("HEAD")?;
                // The root commit is compared against the empty tree
                let old = if head.parent_count() > 0 {
                    Some(head.parent(0)?.tree()?)
                } else {
                    None
                };
                Ok((old, Some(head.tree()?)))
            }
            DiffRange::ThreeDot { base, head } => {
                let base_commit = self.resolve_commit(base)?;
                let head_commit = self.resolve_commit(head)?;
                let fork_point = self
                    .repo
                    .merge_base(base_commit.id(), head_commit.id())
                    .map_err(|source| GitError::Revision {
                        revision: range.to_string(),
                        source,
                    })?;
                let old = self.repo.find_commit(fork_point)?.tree()?;
                Ok((Some(old), Some(head_commit.tree()?)))
            }
            DiffRange::WorkingTree => Ok((self.head_tree()?, None)),
        }
    }

    fn diff_for(&self, range: &DiffRange, path: Option<&str>) -> Result<Diff<'_>, GitError> {
        let (old, new) = self.range_trees(range)?;

        let mut opts = DiffOptions::new();
        opts.context_lines(3);
        if let Some(path) = path {
            opts.pathspec(path);
            opts.disable_pathspec_match(true);
        }

        let mut diff = match new {
            Some(new) => self
                .repo
                .diff_tree_to_tree(old.as_ref(), Some(&new), Some(&mut opts))?,
            None => self
                .repo
                .diff_tree_to_workdir_with_index(old.as_ref(), Some(&mut opts))?,
        };

        if path.is_none() {
            let mut find = DiffFindOptions::new();
            find.renames(true);
            diff.find_similar(Some(&mut find))?;
        }

        Ok(diff)
    }
}

impl Vcs for GitRepository {
    /// Read from the symbolic HEAD, so a branch without commits still has a name
    fn current_branch_name(&self) -> Result<String, GitError> {
        let head = self.repo.find_reference("HEAD").map_err(|e| {
            GitError::RepositoryState(format!("cannot read HEAD: {}", e.message()))
        })?;

        let Some(target) = head.symbolic_target_bytes() else {
            return Err(GitError::RepositoryState(
                "HEAD is detached; check out a named branch".to_string(),
            ));
        };
        let target = std::str::from_utf8(target)
            .map_err(|_| GitError::RepositoryState("branch name is not valid UTF-8".to_string()))?;

        target
            .strip_prefix("refs/heads/")
            .map(str::to_string)
            .ok_or_else(|| GitError::RepositoryState(format!("HEAD points at {target}, not a branch")))
    }

    fn status_sets(&self) -> Result<StatusSets, GitError> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);

        let statuses = self.repo.statuses(Some(&mut opts))?;
        let mut sets = StatusSets::default();

        for entry in statuses.iter() {
            let Some(path) = entry.path() else {
                continue;
            };
            let status = entry.status();
            let path = path.to_string();

            if status.intersects(
                Status::WT_MODIFIED | Status::INDEX_MODIFIED | Status::WT_TYPECHANGE | Status::INDEX_TYPECHANGE,
            ) {
                sets.modified.push(path.clone());
            }
            if status.contains(Status::WT_NEW) {
                sets.not_added.push(path.clone());
            }
            if status.contains(Status::INDEX_NEW) {
                sets.created.push(path.clone());
            }
            if status.intersects(Status::WT_DELETED | Status::INDEX_DELETED) {
                sets.deleted.push(path.clone());
            }
            if status.intersects(
                Status::INDEX_NEW
                    | Status::INDEX_MODIFIED
                    | Status::INDEX_DELETED
                    | Status::INDEX_RENAMED
                    | Status::INDEX_TYPECHANGE,
            ) {
                sets.staged.push(path);
            }
        }

        Ok(sets)
    }

    fn name_status_diff(&self, range: &DiffRange) -> Result<Vec<(char, String)>, GitError> {
        let diff = self.diff_for(range, None)?;

        let entries = diff
            .deltas()
            .filter_map(|delta| {
                let code = match delta.status() {
                    Delta::Added => 'A',
                    Delta::Deleted => 'D',
                    Delta::Modified => 'M',
                    Delta::Renamed => 'R',
                    Delta::Copied => 'C',
                    Delta::Typechange => 'T',
                    _ => return None,
                };
                let path = delta.new_file().path().or_else(|| delta.old_file().path())?;
                Some((code, path.to_string_lossy().into_owned()))
            })
            .collect();

        Ok(entries)
    }

    fn file_diff(&self, range: &DiffRange, path: &str) -> Result<String, GitError> {
        let diff = self.diff_for(range, Some(path))?;
        Ok(render_patch(&diff)?)
    }

    fn file_content_at_revision(&self, revision: &str, path: &str) -> Result<String, GitError> {
        let missing = || GitError::MissingAtRevision {
            revision: revision.to_string(),
            path: path.to_string(),
        };

        let tree = self.resolve_commit(revision)?.tree()?;
        let entry = tree.get_path(Path::new(path)).map_err(|_| missing())?;
        let object = entry.to_object(&self.repo)?;
        let blob = object.as_blob().ok_or_else(missing)?;
        let content = std::str::from_utf8(blob.content()).map_err(|_| GitError::NotText(path.to_string()))?;
        Ok(content.to_string())
    }
}
