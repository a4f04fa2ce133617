use std::path::PathBuf;

use git2::Oid;

use crate::lock::GfsState;

/// All errors produced by gfs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("object not found: {0}")]
    ObjectNotFound(Oid),

    #[error("corrupt tree {id}: {reason}")]
    CorruptTree { id: Oid, reason: String },

    #[error("corrupt commit {id}: {reason}")]
    CorruptCommit { id: Oid, reason: String },

    #[error("path conflict: {0}")]
    PathConflict(String),

    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid mode: {0}")]
    InvalidMode(String),

    #[error("invalid ref name: {0}")]
    InvalidRefName(String),

    #[error("not attached to a branch")]
    NoBranch,

    #[error("no head commit")]
    NoHeadCommit,

    #[error("working tree has uncommitted changes")]
    DirtyWorktree,

    #[error("filesystem busy: {0}")]
    Busy(GfsState),

    #[error("ref not found: {0}")]
    RefNotFound(String),

    #[error("ref {name} moved: expected {expected}, found {actual}")]
    RefUpdateConflict {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("merge conflict in {} path(s): {}", .0.len(), .0.join(", "))]
    MergeConflict(Vec<String>),

    #[error("git error: {0}")]
    Git(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Convenience constructors
// ---------------------------------------------------------------------------

impl Error {
    pub fn corrupt_tree(id: Oid, reason: impl Into<String>) -> Self {
        Self::CorruptTree {
            id,
            reason: reason.into(),
        }
    }

    pub fn corrupt_commit(id: Oid, reason: impl Into<String>) -> Self {
        Self::CorruptCommit {
            id,
            reason: reason.into(),
        }
    }

    pub fn path_conflict(msg: impl Into<String>) -> Self {
        Self::PathConflict(msg.into())
    }

    pub fn path_not_found(path: impl Into<String>) -> Self {
        Self::PathNotFound(path.into())
    }

    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    pub fn invalid_mode(msg: impl Into<String>) -> Self {
        Self::InvalidMode(msg.into())
    }

    pub fn invalid_ref_name(name: impl Into<String>) -> Self {
        Self::InvalidRefName(name.into())
    }

    pub fn ref_not_found(name: impl Into<String>) -> Self {
        Self::RefNotFound(name.into())
    }

    pub fn ref_update_conflict(name: impl Into<String>, expected: Option<Oid>, actual: Option<Oid>) -> Self {
        let show = |oid: Option<Oid>| oid.map(|o| o.to_string()).unwrap_or_else(|| "nothing".into());
        Self::RefUpdateConflict {
            name: name.into(),
            expected: show(expected),
            actual: show(actual),
        }
    }

    pub fn git(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Git(Box::new(err))
    }

    pub fn git_msg(msg: impl Into<String>) -> Self {
        Self::Git(msg.into().into())
    }

    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io(std::io::Error::new(
            err.kind(),
            format!("{}: {}", path.into().display(), err),
        ))
    }

    /// `true` for errors raised before a command did any work.
    ///
    /// Busy and precondition failures guarantee nothing was flushed or
    /// written. Every other error may have left unreferenced objects in the
    /// store, but never a changed `Status`.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Busy(_) | Self::NoBranch | Self::NoHeadCommit | Self::DirtyWorktree
        )
    }
}
