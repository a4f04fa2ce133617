//! Flattened, mutable working view of a tree hierarchy.
//!
//! A [`StagingCache`] maps every leaf path (`dir/sub/file.txt`) to its
//! [`Entry`]. Directories are implied by their leaves; a directory with no
//! leaves does not exist. The cache also remembers, for each directory that
//! has not been touched since it was seeded, the id of the stored tree it
//! came from, which lets [`flush`](crate::flush::flush) skip it entirely.

use std::collections::BTreeMap;

use git2::Oid;

use crate::edit::EditOp;
use crate::error::{Error, Result};
use crate::paths::{ancestors, join, normalize_path};
use crate::snapshot::Snapshot;
use crate::store::ContentStore;
use crate::types::{DirEntry, Entry, EntryMode};

/// Result of applying one [`EditOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// The op was applied (possibly without changing anything, e.g. writing
    /// identical content).
    Applied,
    /// The op was a delete of a path that does not exist.
    Skipped,
}

/// Mutable flattened `path -> Entry` map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagingCache {
    entries: BTreeMap<String, Entry>,
    bases: BTreeMap<String, Oid>,
}

impl StagingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache seeded at the root from `tree`.
    pub fn seeded<S: ContentStore + ?Sized>(store: &S, tree: Oid) -> Result<Self> {
        let mut cache = Self::new();
        cache.seed(store, "", tree)?;
        Ok(cache)
    }

    /// Expand `tree` under `base_path`.
    ///
    /// Seeds compose: where a new leaf collides with existing content, the
    /// new leaf wins and displaces any file at one of its ancestor paths and
    /// any directory at its own path.
    pub fn seed<S: ContentStore + ?Sized>(&mut self, store: &S, base_path: &str, tree: Oid) -> Result<()> {
        let base = normalize_path(base_path)?;
        let expanded = Expanded::load(store, tree, &base)?;
        log::debug!(
            "seeding {:?} from {}: {} leaves in {} trees",
            base,
            tree,
            expanded.leaves.len(),
            expanded.trees.len()
        );

        let region_empty = !self.has_descendants(&base)
            && !self.entries.contains_key(&base)
            && self.file_ancestor(&base).is_none();

        if !region_empty {
            for (path, _) in &expanded.leaves {
                for anc in ancestors(path).into_iter().skip(1) {
                    self.entries.remove(anc);
                }
                self.remove_subtree(path);
            }
            self.entries.remove(&base);
        }

        self.entries.extend(expanded.leaves);
        self.invalidate_ancestors(&base);
        if region_empty {
            self.bases.extend(expanded.trees);
        } else {
            self.invalidate_subtree(&base);
        }
        Ok(())
    }

    /// Apply one edit.
    ///
    /// Every op is validated in full before the cache is touched, so a
    /// failing op leaves the cache unchanged.
    ///
    /// # Errors
    /// [`Error::PathConflict`] when the edit targets an incompatible path,
    /// [`Error::PathNotFound`] when `UpdateBlob` targets a missing leaf,
    /// [`Error::InvalidMode`] for a blob op with [`EntryMode::Directory`].
    pub fn apply<S: ContentStore + ?Sized>(&mut self, store: &S, op: &EditOp) -> Result<EditOutcome> {
        match op {
            EditOp::AddTree { path, tree } => self.add_tree(store, path, *tree),
            EditOp::AddBlob { path, blob, mode } => self.add_blob(path, *blob, *mode),
            EditOp::UpdateBlob { path, blob, mode } => self.update_blob(path, *blob, *mode),
            EditOp::DeleteTree { path } => self.delete_tree(path),
            EditOp::DeleteBlob { path } => self.delete_blob(path),
        }
    }

    fn add_tree<S: ContentStore + ?Sized>(&mut self, store: &S, path: &str, tree: Oid) -> Result<EditOutcome> {
        let path = normalize_path(path)?;
        if self.entries.contains_key(&path) {
            return Err(Error::path_conflict(format!("cannot add tree at {}: it is a file", path)));
        }
        if let Some(file) = self.file_ancestor(&path) {
            return Err(Error::path_conflict(format!(
                "cannot add tree at {}: {} is a file",
                path, file
            )));
        }

        let expanded = Expanded::load(store, tree, &path)?;
        for (leaf, _) in &expanded.leaves {
            if self.has_descendants(leaf) {
                return Err(Error::path_conflict(format!("{} is a directory", leaf)));
            }
            for anc in ancestors(leaf) {
                if anc.len() > path.len() && self.entries.contains_key(anc) {
                    return Err(Error::path_conflict(format!("{} is a file", anc)));
                }
            }
        }

        let region_empty = !self.has_descendants(&path);
        self.entries.extend(expanded.leaves);
        self.invalidate_ancestors(&path);
        if region_empty {
            self.bases.extend(expanded.trees);
        } else {
            self.invalidate_subtree(&path);
        }
        Ok(EditOutcome::Applied)
    }

    fn add_blob(&mut self, path: &str, blob: Oid, mode: EntryMode) -> Result<EditOutcome> {
        let path = normalize_path(path)?;
        if path.is_empty() {
            return Err(Error::invalid_path("cannot add a blob at the root"));
        }
        if mode.is_tree() {
            return Err(Error::invalid_mode(format!("{} is not a blob mode", mode)));
        }
        if self.has_descendants(&path) {
            return Err(Error::path_conflict(format!("{} is a directory", path)));
        }
        if let Some(file) = self.file_ancestor(&path) {
            return Err(Error::path_conflict(format!("{} is a file", file)));
        }

        let entry = Entry::new(blob, mode);
        if self.entries.get(&path) != Some(&entry) {
            self.invalidate_ancestors(&path);
            self.entries.insert(path, entry);
        }
        Ok(EditOutcome::Applied)
    }

    fn update_blob(&mut self, path: &str, blob: Option<Oid>, mode: Option<EntryMode>) -> Result<EditOutcome> {
        let path = normalize_path(path)?;
        if let Some(mode) = mode {
            if mode.is_tree() {
                return Err(Error::invalid_mode(format!("{} is not a blob mode", mode)));
            }
        }
        let current = *self
            .entries
            .get(&path)
            .ok_or_else(|| Error::path_not_found(path.clone()))?;

        let entry = Entry::new(blob.unwrap_or(current.id), mode.unwrap_or(current.mode));
        if entry != current {
            self.invalidate_ancestors(&path);
            self.entries.insert(path, entry);
        }
        Ok(EditOutcome::Applied)
    }

    fn delete_tree(&mut self, path: &str) -> Result<EditOutcome> {
        let path = normalize_path(path)?;
        if self.entries.contains_key(&path) {
            return Err(Error::path_conflict(format!("{} is a file, not a directory", path)));
        }
        if !self.has_descendants(&path) {
            return Ok(EditOutcome::Skipped);
        }
        self.remove_subtree(&path);
        self.invalidate_subtree(&path);
        self.invalidate_ancestors(&path);
        Ok(EditOutcome::Applied)
    }

    fn delete_blob(&mut self, path: &str) -> Result<EditOutcome> {
        let path = normalize_path(path)?;
        if self.entries.remove(&path).is_some() {
            self.invalidate_ancestors(&path);
            return Ok(EditOutcome::Applied);
        }
        if path.is_empty() || self.has_descendants(&path) {
            return Err(Error::path_conflict(format!("{:?} is a directory", path)));
        }
        Ok(EditOutcome::Skipped)
    }

    // -- Reads ---------------------------------------------------------------

    /// The leaf at `path`, if any. Directories have no entry.
    pub fn get(&self, path: &str) -> Option<&Entry> {
        self.entries.get(path)
    }

    /// Whether `path` is a directory (the root always is).
    pub fn is_dir(&self, path: &str) -> bool {
        path.is_empty() || self.has_descendants(path)
    }

    /// Whether `path` names a leaf or a directory.
    pub fn exists(&self, path: &str) -> bool {
        self.entries.contains_key(path) || self.is_dir(path)
    }

    /// The immediate children of directory `path`, sorted by name.
    ///
    /// # Errors
    /// [`Error::PathConflict`] if `path` is a file, [`Error::PathNotFound`]
    /// if it does not exist.
    pub fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let path = normalize_path(path)?;
        if self.entries.contains_key(&path) {
            return Err(Error::path_conflict(format!("{} is not a directory", path)));
        }
        if !self.is_dir(&path) {
            return Err(Error::path_not_found(path));
        }

        let skip = if path.is_empty() { 0 } else { path.len() + 1 };
        let mut children: BTreeMap<&str, DirEntry> = BTreeMap::new();
        for (full, entry) in self.descendants(&path) {
            let rel = &full[skip..];
            match rel.split_once('/') {
                Some((dir, _)) => {
                    children.entry(dir).or_insert_with(|| DirEntry {
                        name: dir.to_string(),
                        mode: EntryMode::Directory,
                        id: self.bases.get(&join(&path, dir)).copied(),
                    });
                }
                None => {
                    children.insert(
                        rel,
                        DirEntry {
                            name: rel.to_string(),
                            mode: entry.mode,
                            id: Some(entry.id),
                        },
                    );
                }
            }
        }
        Ok(children.into_values().collect())
    }

    /// All leaves in path order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(p, e)| (p.as_str(), e))
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The stored tree id of directory `dir` if it is unchanged since seeding.
    pub fn base(&self, dir: &str) -> Option<Oid> {
        self.bases.get(dir).copied()
    }

    pub(crate) fn into_parts(self) -> (BTreeMap<String, Entry>, BTreeMap<String, Oid>) {
        (self.entries, self.bases)
    }

    // -- Internal ------------------------------------------------------------

    fn descendants<'a>(&'a self, dir: &str) -> Box<dyn Iterator<Item = (&'a String, &'a Entry)> + 'a> {
        if dir.is_empty() {
            return Box::new(self.entries.iter());
        }
        let prefix = format!("{}/", dir);
        Box::new(
            self.entries
                .range(prefix.clone()..)
                .take_while(move |(k, _)| k.starts_with(&prefix)),
        )
    }

    fn has_descendants(&self, dir: &str) -> bool {
        self.descendants(dir).next().is_some()
    }

    /// The nearest non-root strict ancestor of `path` that is a leaf.
    fn file_ancestor(&self, path: &str) -> Option<String> {
        ancestors(path)
            .into_iter()
            .skip(1)
            .rev()
            .find(|anc| self.entries.contains_key(*anc))
            .map(String::from)
    }

    fn remove_subtree(&mut self, dir: &str) {
        if dir.is_empty() {
            self.entries.clear();
            return;
        }
        let doomed: Vec<String> = self.descendants(dir).map(|(k, _)| k.clone()).collect();
        for key in doomed {
            self.entries.remove(&key);
        }
    }

    fn invalidate_ancestors(&mut self, path: &str) {
        for anc in ancestors(path) {
            self.bases.remove(anc);
        }
    }

    fn invalidate_subtree(&mut self, dir: &str) {
        if dir.is_empty() {
            self.bases.clear();
            return;
        }
        self.bases.remove(dir);
        let prefix = format!("{}/", dir);
        let doomed: Vec<String> = self
            .bases
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in doomed {
            self.bases.remove(&key);
        }
    }
}

/// A tree expanded to full leaf paths plus the id of every directory in it.
struct Expanded {
    leaves: Vec<(String, Entry)>,
    trees: Vec<(String, Oid)>,
}

impl Expanded {
    fn load<S: ContentStore + ?Sized>(store: &S, tree: Oid, prefix: &str) -> Result<Self> {
        let mut out = Self {
            leaves: Vec::new(),
            trees: Vec::new(),
        };
        out.walk(store, tree, prefix)?;
        Ok(out)
    }

    fn walk<S: ContentStore + ?Sized>(&mut self, store: &S, tree: Oid, prefix: &str) -> Result<()> {
        self.trees.push((prefix.to_string(), tree));
        for (name, entry) in Snapshot::load(store, tree)?.into_children() {
            let path = join(prefix, &name);
            if entry.mode.is_tree() {
                self.walk(store, entry.id, &path)?;
            } else {
                self.leaves.push((path, entry));
            }
        }
        Ok(())
    }
}
