use std::collections::BTreeMap;

use git2::Oid;

use crate::cache::StagingCache;
use crate::error::Result;
use crate::paths::join;
use crate::snapshot::Snapshot;
use crate::store::ContentStore;
use crate::types::Entry;

/// Leaves grouped by directory.
#[derive(Default)]
struct DirNode {
    files: BTreeMap<String, Entry>,
    dirs: BTreeMap<String, DirNode>,
}

impl DirNode {
    fn insert(&mut self, path: &str, entry: Entry) {
        match path.split_once('/') {
            Some((dir, rest)) => self.dirs.entry(dir.to_string()).or_default().insert(rest, entry),
            None => {
                self.files.insert(path.to_string(), entry);
            }
        }
    }
}

#[derive(Default)]
struct BuildStats {
    built: usize,
    reused: usize,
}

/// Rebuild the tree graph described by `cache` and return the root tree id.
///
/// Directories are written deepest first so every parent is built from its
/// children's final ids. Directories the cache still has a base id for are
/// returned as-is without recursing or writing; a cache seeded from `H`
/// with no effective edits therefore flushes to `H` without touching the
/// store. An empty cache flushes to the empty tree.
pub fn flush<S: ContentStore + ?Sized>(cache: StagingCache, store: &S) -> Result<Oid> {
    let (id, stats) = build(cache, &|snapshot: Snapshot| snapshot.save(store))?;
    log::debug!(
        "flush: root {} ({} trees written, {} reused)",
        id,
        stats.built,
        stats.reused
    );
    Ok(id)
}

/// The root tree id [`flush`] would return, computed without writing.
pub fn tree_hash(cache: StagingCache) -> Result<Oid> {
    let (id, _) = build(cache, &|snapshot: Snapshot| snapshot.hash())?;
    Ok(id)
}

fn build(cache: StagingCache, finish: &dyn Fn(Snapshot) -> Result<Oid>) -> Result<(Oid, BuildStats)> {
    let (entries, bases) = cache.into_parts();
    let mut stats = BuildStats::default();
    if let Some(&id) = bases.get("") {
        stats.reused += 1;
        return Ok((id, stats));
    }

    let mut root = DirNode::default();
    for (path, entry) in entries {
        root.insert(&path, entry);
    }

    let id = build_dir(root, "", &bases, finish, &mut stats)?;
    Ok((id, stats))
}

fn build_dir(
    node: DirNode,
    path: &str,
    bases: &BTreeMap<String, Oid>,
    finish: &dyn Fn(Snapshot) -> Result<Oid>,
    stats: &mut BuildStats,
) -> Result<Oid> {
    if let Some(&id) = bases.get(path) {
        stats.reused += 1;
        return Ok(id);
    }

    let mut children = node.files;
    for (name, sub) in node.dirs {
        let sub_path = join(path, &name);
        let id = build_dir(sub, &sub_path, bases, finish, stats)?;
        children.insert(name, Entry::tree(id));
    }

    stats.built += 1;
    finish(Snapshot::capture(children))
}
