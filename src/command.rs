//! Commands that run with exclusive use of a [`GitFileSystem`].
//!
//! Every command follows the same shape: check preconditions against the
//! status it started with, build a tree, compare it with the relevant prior
//! tree, and either persist a new commit (staging the new status) or report
//! [`Outcome::NoChange`].
//!
//! [`GitFileSystem`]: crate::fs::GitFileSystem

use git2::Oid;

use crate::commit::{resolve_revision, Commit, CommitRecord, Ident};
use crate::error::{Error, Result};
use crate::fs::{CommandContext, Status};
use crate::lock::GfsState;
use crate::paths::{branch_ref, validate_ref_name};
use crate::snapshot::Snapshot;
use crate::store::ContentStore;
use crate::types::Signature;

/// A mutating operation run through [`GitFileSystem::execute`].
///
/// [`GitFileSystem::execute`]: crate::fs::GitFileSystem::execute
pub trait Command {
    type Output;

    /// The busy state held while the command runs.
    fn state(&self) -> GfsState;

    fn run<S: ContentStore>(self, ctx: &mut CommandContext<'_, S>) -> Result<Self::Output>;
}

/// Result of a commit-producing command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A new commit was written.
    Committed(Commit),
    /// The branch moved to an existing commit.
    FastForwarded(Commit),
    /// Nothing to do; no object was written and no ref moved.
    NoChange,
}

impl Outcome {
    pub fn commit(&self) -> Option<&Commit> {
        match self {
            Self::Committed(c) | Self::FastForwarded(c) => Some(c),
            Self::NoChange => None,
        }
    }

    pub fn is_no_change(&self) -> bool {
        matches!(self, Self::NoChange)
    }
}

/// Move `branch` from `expected` to `new` and log it.
pub(crate) fn move_branch<S: ContentStore + ?Sized>(
    store: &S,
    branch: &str,
    expected: Option<Oid>,
    new: Oid,
    log_message: &str,
) -> Result<()> {
    store.update_ref(branch, expected, new, log_message)?;
    log::info!("{}: {}", branch, log_message);
    Ok(())
}

// ---------------------------------------------------------------------------
// CommitCommand
// ---------------------------------------------------------------------------

/// Commit the working tree to the attached branch.
#[derive(Debug, Clone, Default)]
pub struct CommitCommand {
    pub message: String,
    /// Defaults to the committer (or, when amending, the original author).
    pub author: Option<Signature>,
    /// Defaults to the handle's signature.
    pub committer: Option<Signature>,
    /// Replace the head commit instead of adding a child.
    pub amend: bool,
    /// Commit even when the tree is unchanged.
    pub allow_empty: bool,
}

impl CommitCommand {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn author(mut self, author: Signature) -> Self {
        self.author = Some(author);
        self
    }

    pub fn committer(mut self, committer: Signature) -> Self {
        self.committer = Some(committer);
        self
    }

    pub fn amend(mut self, amend: bool) -> Self {
        self.amend = amend;
        self
    }

    pub fn allow_empty(mut self, allow_empty: bool) -> Self {
        self.allow_empty = allow_empty;
        self
    }
}

impl Command for CommitCommand {
    type Output = Outcome;

    fn state(&self) -> GfsState {
        GfsState::Committing
    }

    fn run<S: ContentStore>(self, ctx: &mut CommandContext<'_, S>) -> Result<Outcome> {
        let branch = ctx.require_branch()?;
        let head = ctx.status().head;
        let store = ctx.store();

        let (parents, prior_tree, prior_author) = if self.amend {
            let commit = ctx.require_head()?;
            (
                commit.parents().to_vec(),
                commit.tree(),
                Some(commit.record.author),
            )
        } else {
            match head {
                Some(id) => (vec![id], Commit::load(store, id)?.tree(), None),
                None => (Vec::new(), Snapshot::default().hash()?, None),
            }
        };

        let tree = ctx.flush_working()?;
        if tree == prior_tree && !self.amend && !self.allow_empty {
            log::debug!("commit on {}: nothing to commit", branch);
            return Ok(Outcome::NoChange);
        }

        let committer = Ident::now(self.committer.as_ref().unwrap_or(ctx.signature()));
        let author = match (self.author, prior_author) {
            (Some(sig), _) => Ident::now(&sig),
            (None, Some(original)) => original,
            (None, None) => committer.clone(),
        };
        let commit = CommitRecord {
            tree,
            parents,
            author,
            committer,
            message: self.message,
        }
        .write(store)?;

        ctx.reseed(tree)?;
        let verb = match (self.amend, head) {
            (true, _) => "commit (amend)",
            (false, None) => "commit (initial)",
            (false, Some(_)) => "commit",
        };
        move_branch(
            store,
            &branch,
            head,
            commit.id,
            &format!("{}: {}", verb, commit.short_message()),
        )?;
        ctx.stage_status(Status {
            branch: Some(branch),
            head: Some(commit.id),
            tree,
        });
        Ok(Outcome::Committed(commit))
    }
}

// ---------------------------------------------------------------------------
// ResetCommand
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetMode {
    /// Move the head only; working-tree edits are kept.
    Soft,
    /// Move the head and discard working-tree edits.
    #[default]
    Hard,
}

/// Point the head (and the attached branch, if any) at `target`.
#[derive(Debug, Clone)]
pub struct ResetCommand {
    /// A revision: hex id, `HEAD`, full ref name, branch or tag.
    pub target: String,
    pub mode: ResetMode,
}

impl ResetCommand {
    pub fn new(target: impl Into<String>, mode: ResetMode) -> Self {
        Self {
            target: target.into(),
            mode,
        }
    }

    pub fn hard(target: impl Into<String>) -> Self {
        Self::new(target, ResetMode::Hard)
    }

    pub fn soft(target: impl Into<String>) -> Self {
        Self::new(target, ResetMode::Soft)
    }
}

impl Command for ResetCommand {
    type Output = Commit;

    fn state(&self) -> GfsState {
        GfsState::Resetting
    }

    fn run<S: ContentStore>(self, ctx: &mut CommandContext<'_, S>) -> Result<Commit> {
        let store = ctx.store();
        let status = ctx.status().clone();
        let target = match (self.target.as_str(), status.head) {
            ("HEAD", Some(id)) => Commit::load(store, id)?,
            ("HEAD", None) => return Err(Error::NoHeadCommit),
            (rev, _) => resolve_revision(store, rev)?,
        };

        if self.mode == ResetMode::Hard {
            ctx.reseed(target.tree())?;
        }
        if let Some(branch) = &status.branch {
            if status.head != Some(target.id) {
                move_branch(
                    store,
                    branch,
                    status.head,
                    target.id,
                    &format!("reset: moving to {}", self.target),
                )?;
            }
        }
        ctx.stage_status(Status {
            branch: status.branch,
            head: Some(target.id),
            tree: target.tree(),
        });
        Ok(target)
    }
}

// ---------------------------------------------------------------------------
// CheckoutCommand
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutTarget {
    /// Attach to a branch (short or full name). A missing branch is unborn.
    Branch(String),
    /// Detach at a revision.
    Detached(String),
}

/// Switch the handle to another branch or revision.
///
/// Only this handle's status changes; no ref in the store moves.
#[derive(Debug, Clone)]
pub struct CheckoutCommand {
    pub target: CheckoutTarget,
    /// Discard working-tree edits instead of failing with
    /// [`Error::DirtyWorktree`].
    pub force: bool,
}

impl CheckoutCommand {
    pub fn branch(name: impl Into<String>) -> Self {
        Self {
            target: CheckoutTarget::Branch(name.into()),
            force: false,
        }
    }

    pub fn detached(rev: impl Into<String>) -> Self {
        Self {
            target: CheckoutTarget::Detached(rev.into()),
            force: false,
        }
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

impl Command for CheckoutCommand {
    type Output = Status;

    fn state(&self) -> GfsState {
        GfsState::CheckingOut
    }

    fn run<S: ContentStore>(self, ctx: &mut CommandContext<'_, S>) -> Result<Status> {
        if !self.force {
            ctx.require_clean()?;
        }
        let store = ctx.store();
        let status = match self.target {
            CheckoutTarget::Branch(name) => {
                let branch = branch_ref(&name);
                validate_ref_name(&branch)?;
                match store.resolve_ref(&branch) {
                    Ok(id) => {
                        let commit = crate::commit::peel_to_commit(store, id)?;
                        Status {
                            branch: Some(branch),
                            head: Some(commit.id),
                            tree: commit.tree(),
                        }
                    }
                    Err(Error::RefNotFound(_)) => Status {
                        branch: Some(branch),
                        head: None,
                        tree: Snapshot::default().hash()?,
                    },
                    Err(e) => return Err(e),
                }
            }
            CheckoutTarget::Detached(rev) => {
                let commit = resolve_revision(store, &rev)?;
                Status {
                    branch: None,
                    head: Some(commit.id),
                    tree: commit.tree(),
                }
            }
        };

        if status.is_initialized() {
            ctx.reseed(status.tree)?;
        } else {
            ctx.stage_worktree(crate::cache::StagingCache::new());
        }
        log::info!(
            "checked out {}",
            status.branch.as_deref().unwrap_or("detached HEAD")
        );
        ctx.stage_status(status.clone());
        Ok(status)
    }
}
