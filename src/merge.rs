use std::collections::{BTreeMap, BTreeSet};

use crate::cache::StagingCache;
use crate::command::{move_branch, Command, Outcome};
use crate::commit::{is_ancestor, merge_base, resolve_revision, Commit, CommitRecord, Ident};
use crate::edit::EditOp;
use crate::error::{Error, Result};
use crate::flush::flush;
use crate::fs::{CommandContext, Status};
use crate::lock::GfsState;
use crate::paths::shorten_ref_name;
use crate::snapshot::Snapshot;
use crate::store::ContentStore;
use crate::types::{Entry, Signature};

/// Merge a revision into the attached branch.
///
/// Already-merged sources return [`Outcome::NoChange`]. When the branch
/// head is an ancestor of the source, the branch fast-forwards unless
/// `no_ff` is set. Otherwise paths are merged three-way against the
/// nearest common ancestor; a path changed differently on both sides is a
/// conflict, reported as [`Error::MergeConflict`] with nothing written.
///
/// The working tree must be clean.
#[derive(Debug, Clone)]
pub struct MergeCommand {
    /// A revision: hex id, `HEAD`, full ref name, branch or tag.
    pub source: String,
    /// Defaults to `Merge <source> into <branch>`.
    pub message: Option<String>,
    /// Defaults to the handle's signature.
    pub committer: Option<Signature>,
    /// Always write a merge commit, even when a fast-forward is possible.
    pub no_ff: bool,
}

impl MergeCommand {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: None,
            committer: None,
            no_ff: false,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn committer(mut self, committer: Signature) -> Self {
        self.committer = Some(committer);
        self
    }

    pub fn no_ff(mut self, no_ff: bool) -> Self {
        self.no_ff = no_ff;
        self
    }
}

impl Command for MergeCommand {
    type Output = Outcome;

    fn state(&self) -> GfsState {
        GfsState::Merging
    }

    fn run<S: ContentStore>(self, ctx: &mut CommandContext<'_, S>) -> Result<Outcome> {
        let branch = ctx.require_branch()?;
        ctx.require_clean()?;
        let store = ctx.store();
        let theirs = resolve_revision(store, &self.source)?;

        let ours = match ctx.status().head {
            Some(id) => Commit::load(store, id)?,
            None => return fast_forward(ctx, branch, None, theirs),
        };
        if is_ancestor(store, theirs.id, ours.id)? {
            log::debug!("merge {}: already up to date", self.source);
            return Ok(Outcome::NoChange);
        }
        if !self.no_ff && is_ancestor(store, ours.id, theirs.id)? {
            return fast_forward(ctx, branch, Some(ours.id), theirs);
        }

        let base_tree = match merge_base(store, ours.id, theirs.id)? {
            Some(id) => Commit::load(store, id)?.tree(),
            None => Snapshot::default().hash()?,
        };
        let mut cache = StagingCache::seeded(store, ours.tree())?;
        let ops = three_way(
            &StagingCache::seeded(store, base_tree)?,
            &cache,
            &StagingCache::seeded(store, theirs.tree())?,
        )?;

        let mut conflicts = Vec::new();
        for op in &ops {
            match cache.apply(store, op) {
                Ok(_) => {}
                Err(Error::PathConflict(_)) => conflicts.push(op.path().to_string()),
                Err(e) => return Err(e),
            }
        }
        if !conflicts.is_empty() {
            log::warn!("merge {}: {} conflicting path(s)", self.source, conflicts.len());
            return Err(Error::MergeConflict(conflicts));
        }

        let tree = flush(cache, store)?;
        let message = self.message.unwrap_or_else(|| {
            format!("Merge {} into {}", self.source, shorten_ref_name(&branch))
        });
        let committer = Ident::now(self.committer.as_ref().unwrap_or(ctx.signature()));
        let commit = CommitRecord {
            tree,
            parents: vec![ours.id, theirs.id],
            author: committer.clone(),
            committer,
            message,
        }
        .write(store)?;

        ctx.reseed(tree)?;
        move_branch(
            store,
            &branch,
            Some(ours.id),
            commit.id,
            &format!("merge {}: Merge made by the 'three-way' strategy.", self.source),
        )?;
        ctx.stage_status(Status {
            branch: Some(branch),
            head: Some(commit.id),
            tree,
        });
        Ok(Outcome::Committed(commit))
    }
}

fn fast_forward<S: ContentStore>(
    ctx: &mut CommandContext<'_, S>,
    branch: String,
    from: Option<git2::Oid>,
    to: Commit,
) -> Result<Outcome> {
    ctx.reseed(to.tree())?;
    move_branch(ctx.store(), &branch, from, to.id, "merge: Fast-forward")?;
    ctx.stage_status(Status {
        branch: Some(branch),
        head: Some(to.id),
        tree: to.tree(),
    });
    Ok(Outcome::FastForwarded(to))
}

/// Edits that turn `ours` into the merge of `ours` and `theirs`.
///
/// Deletes come first so a file replaced by a directory (or the reverse)
/// on one side does not collide with its own old path.
fn three_way(base: &StagingCache, ours: &StagingCache, theirs: &StagingCache) -> Result<Vec<EditOp>> {
    let leaves = |cache: &StagingCache| -> BTreeMap<String, Entry> {
        cache.entries().map(|(p, e)| (p.to_string(), *e)).collect()
    };
    let (base, ours, theirs) = (leaves(base), leaves(ours), leaves(theirs));
    let paths: BTreeSet<&String> = base.keys().chain(ours.keys()).chain(theirs.keys()).collect();

    let mut deletes = Vec::new();
    let mut writes = Vec::new();
    let mut conflicts = Vec::new();
    for path in paths {
        let (b, o, t) = (base.get(path), ours.get(path), theirs.get(path));
        let merged = if o == t || t == b {
            continue;
        } else if o == b {
            t
        } else {
            conflicts.push(path.clone());
            continue;
        };
        match merged {
            Some(entry) => writes.push(EditOp::add_blob(path.as_str(), entry.id, entry.mode)),
            None => deletes.push(EditOp::delete_blob(path.as_str())),
        }
    }

    if !conflicts.is_empty() {
        log::warn!("three-way merge: {} path(s) changed on both sides", conflicts.len());
        return Err(Error::MergeConflict(conflicts));
    }
    deletes.extend(writes);
    Ok(deletes)
}
