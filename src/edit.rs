use git2::Oid;

use crate::cache::StagingCache;
use crate::error::Result;
use crate::store::ContentStore;
use crate::types::EntryMode;

/// A single path-level edit, applied to a [`StagingCache`] in submission
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOp {
    /// Expand the tree `tree` under `path`.
    AddTree { path: String, tree: Oid },
    /// Insert (or replace) the leaf at `path`.
    AddBlob {
        path: String,
        blob: Oid,
        mode: EntryMode,
    },
    /// Change an existing leaf; `None` fields keep their prior value.
    UpdateBlob {
        path: String,
        blob: Option<Oid>,
        mode: Option<EntryMode>,
    },
    /// Remove a directory and everything below it.
    DeleteTree { path: String },
    /// Remove a single leaf.
    DeleteBlob { path: String },
}

impl EditOp {
    pub fn add_tree(path: impl Into<String>, tree: Oid) -> Self {
        Self::AddTree {
            path: path.into(),
            tree,
        }
    }

    pub fn add_blob(path: impl Into<String>, blob: Oid, mode: EntryMode) -> Self {
        Self::AddBlob {
            path: path.into(),
            blob,
            mode,
        }
    }

    pub fn add_file(path: impl Into<String>, blob: Oid) -> Self {
        Self::add_blob(path, blob, EntryMode::RegularFile)
    }

    pub fn update_blob(path: impl Into<String>, blob: Option<Oid>, mode: Option<EntryMode>) -> Self {
        Self::UpdateBlob {
            path: path.into(),
            blob,
            mode,
        }
    }

    pub fn delete_tree(path: impl Into<String>) -> Self {
        Self::DeleteTree { path: path.into() }
    }

    pub fn delete_blob(path: impl Into<String>) -> Self {
        Self::DeleteBlob { path: path.into() }
    }

    /// The path this op targets (as submitted, not normalized).
    pub fn path(&self) -> &str {
        match self {
            Self::AddTree { path, .. }
            | Self::AddBlob { path, .. }
            | Self::UpdateBlob { path, .. }
            | Self::DeleteTree { path }
            | Self::DeleteBlob { path } => path,
        }
    }

    /// Whether this op removes paths.
    pub fn is_delete(&self) -> bool {
        matches!(self, Self::DeleteTree { .. } | Self::DeleteBlob { .. })
    }
}

// ---------------------------------------------------------------------------
// CachePlan
// ---------------------------------------------------------------------------

/// What a [`CachePlan`] seeds its cache from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Base {
    /// A tree id.
    Tree(Oid),
    /// The root tree of a commit.
    Commit(Oid),
    /// A revision string: hex id, `HEAD`, full ref name, branch or tag.
    Revision(String),
}

/// An optional base plus an ordered list of edits, consumed once to build a
/// [`StagingCache`].
#[derive(Debug, Clone, Default)]
pub struct CachePlan {
    pub base: Option<Base>,
    pub edits: Vec<EditOp>,
}

impl CachePlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(base: Base) -> Self {
        Self {
            base: Some(base),
            edits: Vec::new(),
        }
    }

    pub fn push(&mut self, op: EditOp) -> &mut Self {
        self.edits.push(op);
        self
    }

    /// Resolve the base to a tree id, if there is one.
    pub fn base_tree<S: ContentStore + ?Sized>(&self, store: &S) -> Result<Option<Oid>> {
        Ok(match &self.base {
            None => None,
            Some(Base::Tree(id)) => Some(*id),
            Some(Base::Commit(id)) => Some(crate::commit::peel_to_commit(store, *id)?.tree()),
            Some(Base::Revision(rev)) => Some(crate::commit::resolve_revision(store, rev)?.tree()),
        })
    }

    /// Seed a cache from the base and apply every edit in order.
    ///
    /// Deletes of absent paths are skipped; any other failing edit aborts
    /// the build.
    pub fn build<S: ContentStore + ?Sized>(self, store: &S) -> Result<StagingCache> {
        let mut cache = StagingCache::new();
        if let Some(tree) = self.base_tree(store)? {
            cache.seed(store, "", tree)?;
        }
        for op in &self.edits {
            cache.apply(store, op)?;
        }
        Ok(cache)
    }

    /// Build the cache and flush it, returning the resulting root tree id.
    pub fn build_tree<S: ContentStore + ?Sized>(self, store: &S) -> Result<Oid> {
        let cache = self.build(store)?;
        crate::flush::flush(cache, store)
    }
}
