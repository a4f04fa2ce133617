use std::sync::{Mutex, MutexGuard, RwLock};

use git2::Oid;

use crate::cache::{EditOutcome, StagingCache};
use crate::command::Command;
use crate::commit::{resolve_revision, Commit};
use crate::edit::EditOp;
use crate::error::{Error, Result};
use crate::flush::{flush, tree_hash};
use crate::lock::{with_state, GfsState, StateLock};
use crate::paths::{branch_ref, join, normalize_path, shorten_ref_name, validate_ref_name};
use crate::snapshot::Snapshot;
use crate::store::ContentStore;
use crate::types::{DirEntry, Entry, EntryMode, Signature};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Where a filesystem handle currently points.
///
/// Replaced as a whole when a command completes; never partially updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// Full ref name of the attached branch, `None` when detached.
    pub branch: Option<String>,
    /// Head commit, `None` on an unborn branch.
    pub head: Option<Oid>,
    /// Root tree of the head commit (the empty tree when unborn).
    pub tree: Oid,
}

impl Status {
    pub fn is_attached(&self) -> bool {
        self.branch.is_some()
    }

    pub fn is_initialized(&self) -> bool {
        self.head.is_some()
    }

    /// Short branch name (`main` for `refs/heads/main`).
    pub fn branch_name(&self) -> Option<&str> {
        self.branch.as_deref().map(shorten_ref_name)
    }
}

// ---------------------------------------------------------------------------
// GitFileSystem
// ---------------------------------------------------------------------------

/// A mutable filesystem view over a [`ContentStore`].
///
/// Path writes go to an in-memory working cache; commands
/// ([`execute`](Self::execute)) turn that cache into commits and move
/// refs. One command runs at a time per handle; starting another, or
/// writing a path while one runs, fails with [`Error::Busy`].
///
/// `Send + Sync` whenever the store is.
pub struct GitFileSystem<S: ContentStore> {
    store: S,
    status: RwLock<Status>,
    state: StateLock,
    worktree: Mutex<StagingCache>,
    signature: Signature,
}

impl<S: ContentStore> GitFileSystem<S> {
    /// Open the handle on whatever `HEAD` points to in the store.
    pub fn open(store: S) -> Result<Self> {
        match store.head_target()? {
            Some(branch) => Self::open_branch(store, &branch),
            None => {
                let id = store.resolve_ref("HEAD")?;
                Self::open_detached(store, &id.to_string())
            }
        }
    }

    /// Open the handle attached to branch `name` (short or full ref name).
    ///
    /// A branch that does not exist yet opens as unborn: no head commit and
    /// an empty working tree. The first commit creates it.
    pub fn open_branch(store: S, name: &str) -> Result<Self> {
        let branch = branch_ref(name);
        validate_ref_name(&branch)?;
        let head = match store.resolve_ref(&branch) {
            Ok(id) => Some(crate::commit::peel_to_commit(&store, id)?),
            Err(Error::RefNotFound(_)) => None,
            Err(e) => return Err(e),
        };
        let status = match head {
            Some(commit) => Status {
                branch: Some(branch),
                head: Some(commit.id),
                tree: commit.tree(),
            },
            None => Status {
                branch: Some(branch),
                head: None,
                tree: Snapshot::default().hash()?,
            },
        };
        Self::with_status(store, status)
    }

    /// Open the handle detached at revision `rev`.
    pub fn open_detached(store: S, rev: &str) -> Result<Self> {
        let commit = resolve_revision(&store, rev)?;
        let status = Status {
            branch: None,
            head: Some(commit.id),
            tree: commit.tree(),
        };
        Self::with_status(store, status)
    }

    fn with_status(store: S, status: Status) -> Result<Self> {
        let worktree = if status.is_initialized() {
            StagingCache::seeded(&store, status.tree)?
        } else {
            StagingCache::new()
        };
        let signature = store.default_signature().unwrap_or_default();
        log::debug!(
            "opened filesystem on {} at {:?}",
            status.branch.as_deref().unwrap_or("detached HEAD"),
            status.head
        );
        Ok(Self {
            store,
            status: RwLock::new(status),
            state: StateLock::default(),
            worktree: Mutex::new(worktree),
            signature,
        })
    }

    /// Use `signature` as the default author and committer for commands.
    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = signature;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// A copy of the current status.
    pub fn status(&self) -> Status {
        self.status.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// The command currently running, or `Idle`.
    pub fn state(&self) -> GfsState {
        self.state.current()
    }

    /// The head commit, if the handle has one.
    pub fn head_commit(&self) -> Result<Option<Commit>> {
        self.status()
            .head
            .map(|id| Commit::load(&self.store, id))
            .transpose()
    }

    fn worktree(&self) -> Result<MutexGuard<'_, StagingCache>> {
        self.worktree
            .lock()
            .map_err(|_| Error::git_msg("working tree lock poisoned"))
    }

    /// Lock the working cache for writing, refusing while a command runs.
    fn worktree_for_write(&self) -> Result<MutexGuard<'_, StagingCache>> {
        let worktree = self.worktree()?;
        match self.state.current() {
            GfsState::Idle => Ok(worktree),
            busy => Err(Error::Busy(busy)),
        }
    }

    // -- Reads ---------------------------------------------------------------

    /// Read the contents of the file at `path`.
    pub fn read(&self, path: &str) -> Result<Vec<u8>> {
        let path = normalize_path(path)?;
        let entry = {
            let worktree = self.worktree()?;
            match worktree.get(&path) {
                Some(entry) => *entry,
                None if worktree.is_dir(&path) => {
                    return Err(Error::path_conflict(format!("{:?} is a directory", path)))
                }
                None => return Err(Error::path_not_found(path)),
            }
        };
        self.store.get_blob(entry.id)
    }

    /// Read the file at `path` as UTF-8 text.
    pub fn read_text(&self, path: &str) -> Result<String> {
        let data = self.read(path)?;
        String::from_utf8(data).map_err(|e| Error::git_msg(format!("{}: {}", path, e)))
    }

    /// The leaf entry at `path`; directories have none.
    pub fn entry(&self, path: &str) -> Result<Option<Entry>> {
        let path = normalize_path(path)?;
        Ok(self.worktree()?.get(&path).copied())
    }

    pub fn exists(&self, path: &str) -> Result<bool> {
        let path = normalize_path(path)?;
        Ok(self.worktree()?.exists(&path))
    }

    pub fn is_dir(&self, path: &str) -> Result<bool> {
        let path = normalize_path(path)?;
        Ok(self.worktree()?.is_dir(&path))
    }

    /// List the immediate children of directory `path`.
    pub fn ls(&self, path: &str) -> Result<Vec<DirEntry>> {
        self.worktree()?.list_dir(path)
    }

    /// Every file under directory `path`, with paths relative to it.
    pub fn walk(&self, path: &str) -> Result<Vec<(String, Entry)>> {
        let path = normalize_path(path)?;
        let worktree = self.worktree()?;
        if worktree.get(&path).is_some() {
            return Err(Error::path_conflict(format!("{} is not a directory", path)));
        }
        if !worktree.is_dir(&path) {
            return Err(Error::path_not_found(path));
        }
        let skip = if path.is_empty() { 0 } else { path.len() + 1 };
        Ok(worktree
            .entries()
            .filter(|(p, _)| path.is_empty() || p.starts_with(&format!("{}/", path)))
            .map(|(p, e)| (p[skip..].to_string(), *e))
            .collect())
    }

    // -- Writes --------------------------------------------------------------

    /// Write `data` as a regular file at `path`, creating parents as needed.
    pub fn write(&self, path: &str, data: &[u8]) -> Result<Oid> {
        self.write_with_mode(path, data, EntryMode::RegularFile)
    }

    /// Write `data` at `path` with an explicit blob mode.
    pub fn write_with_mode(&self, path: &str, data: &[u8], mode: EntryMode) -> Result<Oid> {
        if mode.is_tree() {
            return Err(Error::invalid_mode(format!("{} is not a blob mode", mode)));
        }
        let mut worktree = self.worktree_for_write()?;
        let blob = self.store.put_blob(data)?;
        worktree.apply(&self.store, &EditOp::add_blob(path, blob, mode))?;
        Ok(blob)
    }

    /// Create a symlink at `path` pointing to `target`.
    pub fn write_symlink(&self, path: &str, target: &str) -> Result<Oid> {
        self.write_with_mode(path, target.as_bytes(), EntryMode::Symlink)
    }

    /// Change the mode of an existing file.
    pub fn set_mode(&self, path: &str, mode: EntryMode) -> Result<()> {
        self.worktree_for_write()?
            .apply(&self.store, &EditOp::update_blob(path, None, Some(mode)))?;
        Ok(())
    }

    /// Remove the file or directory at `path`.
    ///
    /// Directories require `recursive`. Removing a missing path returns
    /// [`EditOutcome::Skipped`].
    pub fn remove(&self, path: &str, recursive: bool) -> Result<EditOutcome> {
        let path = normalize_path(path)?;
        if path.is_empty() {
            return Err(Error::invalid_path("cannot remove the root"));
        }
        let mut worktree = self.worktree_for_write()?;
        let op = if worktree.get(&path).is_none() && worktree.is_dir(&path) {
            if !recursive {
                return Err(Error::path_conflict(format!(
                    "{} is a directory (use recursive)",
                    path
                )));
            }
            EditOp::delete_tree(path)
        } else {
            EditOp::delete_blob(path)
        };
        worktree.apply(&self.store, &op)
    }

    /// Move a file or directory.
    pub fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from = normalize_path(from)?;
        let to = normalize_path(to)?;
        if from.is_empty() || to.is_empty() {
            return Err(Error::invalid_path("cannot rename the root"));
        }
        if from == to {
            return Ok(());
        }
        if to.starts_with(&format!("{}/", from)) {
            return Err(Error::invalid_path(format!("cannot move {} into itself", from)));
        }

        let mut worktree = self.worktree_for_write()?;
        let ops = if let Some(entry) = worktree.get(&from) {
            vec![
                EditOp::delete_blob(from.as_str()),
                EditOp::add_blob(to.as_str(), entry.id, entry.mode),
            ]
        } else if worktree.is_dir(&from) {
            let mut ops = vec![EditOp::delete_tree(from.as_str())];
            match worktree.base(&from) {
                Some(tree) => ops.push(EditOp::add_tree(to.as_str(), tree)),
                None => {
                    let prefix = format!("{}/", from);
                    for (path, entry) in worktree.entries() {
                        if let Some(rel) = path.strip_prefix(&prefix) {
                            ops.push(EditOp::add_blob(join(&to, rel), entry.id, entry.mode));
                        }
                    }
                }
            }
            ops
        } else {
            return Err(Error::path_not_found(from));
        };
        apply_all(&mut worktree, &self.store, &ops)?;
        Ok(())
    }

    /// Expand the stored tree `tree` under directory `path`.
    pub fn add_tree(&self, path: &str, tree: Oid) -> Result<()> {
        self.worktree_for_write()?
            .apply(&self.store, &EditOp::add_tree(path, tree))?;
        Ok(())
    }

    /// Apply `ops` in order, all or nothing.
    ///
    /// The ops run against a copy of the working cache that replaces it only
    /// if every op succeeds.
    pub fn apply(&self, ops: &[EditOp]) -> Result<Vec<EditOutcome>> {
        let mut worktree = self.worktree_for_write()?;
        apply_all(&mut worktree, &self.store, ops)
    }

    /// Write the working tree to the store and return its root tree id.
    ///
    /// The working cache is reseeded from the result, so a later flush or
    /// command without further edits does no tree I/O.
    pub fn flush(&self) -> Result<Oid> {
        let mut worktree = self.worktree_for_write()?;
        let tree = flush(worktree.clone(), &self.store)?;
        if worktree.base("") != Some(tree) {
            *worktree = StagingCache::seeded(&self.store, tree)?;
        }
        Ok(tree)
    }

    /// Whether the working tree differs from the head tree.
    pub fn has_changes(&self) -> Result<bool> {
        let tree = self.status().tree;
        let worktree = self.worktree()?.clone();
        Ok(tree_hash(worktree)? != tree)
    }

    // -- Commands ------------------------------------------------------------

    /// Run `command` with exclusive use of this handle.
    ///
    /// Fails immediately with [`Error::Busy`] if another command is active.
    /// Status and the working tree change only if the command succeeds; the
    /// handle returns to [`GfsState::Idle`] on every exit path.
    pub fn execute<C: Command>(&self, command: C) -> Result<C::Output> {
        let busy = command.state();
        with_state(&self.state, busy, || {
            let mut ctx = CommandContext {
                fs: self,
                status: self.status(),
                staged_status: None,
                staged_worktree: None,
            };
            let output = command.run(&mut ctx)?;

            let CommandContext {
                staged_status,
                staged_worktree,
                ..
            } = ctx;
            if let Some(worktree) = staged_worktree {
                *self.worktree()? = worktree;
            }
            if let Some(status) = staged_status {
                *self.status.write().unwrap_or_else(|e| e.into_inner()) = status;
            }
            Ok(output)
        })
    }
}

impl<S: ContentStore> std::fmt::Debug for GitFileSystem<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitFileSystem")
            .field("status", &self.status())
            .field("state", &self.state())
            .finish()
    }
}

fn apply_all<S: ContentStore + ?Sized>(
    worktree: &mut StagingCache,
    store: &S,
    ops: &[EditOp],
) -> Result<Vec<EditOutcome>> {
    let mut staged = worktree.clone();
    let outcomes = ops
        .iter()
        .map(|op| staged.apply(store, op))
        .collect::<Result<Vec<_>>>()?;
    *worktree = staged;
    Ok(outcomes)
}

// ---------------------------------------------------------------------------
// CommandContext
// ---------------------------------------------------------------------------

/// What a running [`Command`] sees of its filesystem handle.
///
/// Status and working-tree changes are staged here and applied by
/// [`GitFileSystem::execute`] only after the command returns `Ok`.
pub struct CommandContext<'a, S: ContentStore> {
    fs: &'a GitFileSystem<S>,
    status: Status,
    staged_status: Option<Status>,
    staged_worktree: Option<StagingCache>,
}

impl<'a, S: ContentStore> CommandContext<'a, S> {
    /// Status as of command start.
    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn store(&self) -> &'a S {
        &self.fs.store
    }

    /// Default identity for commits made by this command.
    pub fn signature(&self) -> &'a Signature {
        &self.fs.signature
    }

    /// A private copy of the handle's working cache.
    pub fn working_cache(&self) -> Result<StagingCache> {
        Ok(self.fs.worktree()?.clone())
    }

    /// Flush the working cache and return its root tree id.
    pub fn flush_working(&self) -> Result<Oid> {
        flush(self.working_cache()?, self.store())
    }

    /// The attached branch, or [`Error::NoBranch`].
    pub fn require_branch(&self) -> Result<String> {
        self.status.branch.clone().ok_or(Error::NoBranch)
    }

    /// The head commit, or [`Error::NoHeadCommit`].
    pub fn require_head(&self) -> Result<Commit> {
        let id = self.status.head.ok_or(Error::NoHeadCommit)?;
        Commit::load(self.store(), id)
    }

    /// Fail with [`Error::DirtyWorktree`] if the working tree has edits.
    /// Nothing is written to the store.
    pub fn require_clean(&self) -> Result<()> {
        if tree_hash(self.working_cache()?)? != self.status.tree {
            return Err(Error::DirtyWorktree);
        }
        Ok(())
    }

    /// Replace the handle's status once the command succeeds.
    pub fn stage_status(&mut self, status: Status) {
        self.staged_status = Some(status);
    }

    /// Replace the handle's working cache once the command succeeds.
    pub fn stage_worktree(&mut self, cache: StagingCache) {
        self.staged_worktree = Some(cache);
    }

    /// Stage a working cache holding exactly `tree`.
    pub fn reseed(&mut self, tree: Oid) -> Result<()> {
        let current = self.fs.worktree()?.base("");
        if current != Some(tree) {
            self.staged_worktree = Some(StagingCache::seeded(self.store(), tree)?);
        }
        Ok(())
    }
}
