//! Errors raised while reading repository state

use thiserror::Error;

/// Failure while querying the repository.
///
/// `RepositoryState`, `EmptyBaseBranch` and `Revision` are fatal for a change
/// extraction run. The remaining variants are raised by per-file lookups and
/// are downgraded to warnings by the change set builder.
#[derive(Debug, Error)]
pub enum GitError {
    /// Repository missing, invalid, or HEAD is not on a named branch
    #[error("repository state error: {0}")]
    RepositoryState(String),

    /// The base branch argument was empty
    #[error("base branch name must not be empty")]
    EmptyBaseBranch,

    /// A revision could not be resolved
    #[error("cannot resolve revision '{revision}': {source}")]
    Revision {
        revision: String,
        #[source]
        source: git2::Error,
    },

    /// A path does not exist at the requested revision
    #[error("'{path}' does not exist at {revision}")]
    MissingAtRevision { revision: String, path: String },

    /// Blob content is not valid UTF-8
    #[error("'{0}' is not a text file")]
    NotText(String),

    #[error(transparent)]
    Git(#[from] git2::Error),
}
