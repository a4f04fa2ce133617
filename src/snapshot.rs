//! One directory level of the object graph.
//!
//! A [`Snapshot`] is an immutable `name -> Entry` map that serializes to a
//! git tree object. Entries are always emitted in git's canonical order,
//! so two snapshots with the same entries produce byte-identical payloads
//! and therefore the same id.

use std::collections::BTreeMap;

use git2::Oid;
use gix::objs::{tree, WriteTo};

use crate::error::{Error, Result};
use crate::store::ContentStore;
use crate::types::{from_object_id, to_object_id, Entry, EntryMode, ObjectKind};

/// Immutable contents of one tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    children: BTreeMap<String, Entry>,
}

impl Snapshot {
    /// Build a snapshot from entries computed in-process. No I/O.
    ///
    /// Names must be single path segments; [`save`](Self::save) and
    /// [`hash`](Self::hash) reject anything else.
    pub fn capture(children: BTreeMap<String, Entry>) -> Self {
        Self { children }
    }

    /// Read and parse the tree `id`.
    ///
    /// # Errors
    /// [`Error::ObjectNotFound`] if `id` is not stored, [`Error::CorruptTree`]
    /// if the object is not a well-formed tree.
    pub fn load<S: ContentStore + ?Sized>(store: &S, id: Oid) -> Result<Self> {
        let obj = store.get(id)?;
        if obj.kind != ObjectKind::Tree {
            return Err(Error::corrupt_tree(id, format!("object is a {}", obj.kind)));
        }
        Self::decode(id, &obj.data)
    }

    /// Serialize and store this snapshot, returning its id.
    pub fn save<S: ContentStore + ?Sized>(&self, store: &S) -> Result<Oid> {
        store.put(ObjectKind::Tree, &self.encode()?)
    }

    /// The id this snapshot has once saved, without touching a store.
    pub fn hash(&self) -> Result<Oid> {
        ObjectKind::Tree.hash(&self.encode()?)
    }

    pub fn children(&self) -> &BTreeMap<String, Entry> {
        &self.children
    }

    pub fn into_children(self) -> BTreeMap<String, Entry> {
        self.children
    }

    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.children.get(name)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Encode as a git tree payload in canonical order.
    ///
    /// # Errors
    /// [`Error::InvalidPath`] if a name is not a single path segment.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut entries = Vec::with_capacity(self.children.len());
        for (name, entry) in &self.children {
            if !is_valid_name(name) {
                return Err(Error::invalid_path(format!("invalid entry name {:?}", name)));
            }
            entries.push(tree::Entry {
                mode: entry.mode.to_gix(),
                filename: name.as_str().into(),
                oid: to_object_id(entry.id)?,
            });
        }
        entries.sort();

        let mut out = Vec::with_capacity(entries.len() * 48);
        gix::objs::Tree { entries }.write_to(&mut out)?;
        Ok(out)
    }

    /// Parse a git tree payload. `id` is only used for error reporting.
    pub fn decode(id: Oid, data: &[u8]) -> Result<Self> {
        let tree_ref = gix::objs::TreeRef::from_bytes(data)
            .map_err(|e| Error::corrupt_tree(id, e.to_string()))?;

        let mut children = BTreeMap::new();
        let mut prev: Option<tree::Entry> = None;
        for entry in &tree_ref.entries {
            let name = std::str::from_utf8(entry.filename)
                .map_err(|_| Error::corrupt_tree(id, "entry name is not UTF-8"))?;
            if !is_valid_name(name) {
                return Err(Error::corrupt_tree(id, format!("invalid entry name {:?}", name)));
            }
            let mode = EntryMode::from_gix(entry.mode).ok_or_else(|| {
                Error::corrupt_tree(id, format!("unsupported entry mode {:o}", entry.mode.value()))
            })?;
            if children.contains_key(name) {
                return Err(Error::corrupt_tree(id, format!("duplicate entry {:?}", name)));
            }

            let owned = tree::Entry {
                mode: entry.mode,
                filename: entry.filename.to_owned(),
                oid: entry.oid.to_owned(),
            };
            if let Some(prev) = &prev {
                if *prev >= owned {
                    return Err(Error::corrupt_tree(id, format!("entry {:?} out of order", name)));
                }
            }

            children.insert(name.to_string(), Entry::new(from_object_id(entry.oid)?, mode));
            prev = Some(owned);
        }

        Ok(Self { children })
    }
}

impl FromIterator<(String, Entry)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (String, Entry)>>(iter: I) -> Self {
        Self::capture(iter.into_iter().collect())
    }
}

/// A name that can appear in a tree: one non-empty path segment.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn blob(store: &MemoryStore, data: &[u8]) -> Oid {
        store.put_blob(data).unwrap()
    }

    #[test]
    fn empty_tree_id_matches_git() {
        let id = Snapshot::default().hash().unwrap();
        assert_eq!(id.to_string(), "4b825dc642cb6eb9a060e54bf8d69288fbee4904");
    }

    #[test]
    fn save_is_deterministic() {
        let store = MemoryStore::new();
        let a = blob(&store, b"a");
        let b = blob(&store, b"b");
        let s1: Snapshot = [
            ("b.txt".to_string(), Entry::file(b)),
            ("a.txt".to_string(), Entry::file(a)),
        ]
        .into_iter()
        .collect();
        let s2: Snapshot = [
            ("a.txt".to_string(), Entry::file(a)),
            ("b.txt".to_string(), Entry::file(b)),
        ]
        .into_iter()
        .collect();
        assert_eq!(s1.save(&store).unwrap(), s2.save(&store).unwrap());
        assert_eq!(s1.save(&store).unwrap(), s1.hash().unwrap());
    }

    #[test]
    fn load_round_trip() {
        let store = MemoryStore::new();
        let f = blob(&store, b"x");
        let sub = Snapshot::capture(BTreeMap::from([("inner".to_string(), Entry::file(f))]))
            .save(&store)
            .unwrap();
        let snap = Snapshot::capture(BTreeMap::from([
            ("run.sh".to_string(), Entry::new(f, EntryMode::ExecutableFile)),
            ("link".to_string(), Entry::new(f, EntryMode::Symlink)),
            ("dir".to_string(), Entry::tree(sub)),
        ]));
        let id = snap.save(&store).unwrap();
        assert_eq!(Snapshot::load(&store, id).unwrap(), snap);
    }

    #[test]
    fn directories_sort_with_trailing_slash() {
        let store = MemoryStore::new();
        let f = blob(&store, b"x");
        let snap = Snapshot::capture(BTreeMap::from([
            ("a.txt".to_string(), Entry::file(f)),
            ("a".to_string(), Entry::tree(Snapshot::default().hash().unwrap())),
        ]));
        let bytes = snap.encode().unwrap();
        // "a.txt" < "a/" because '.' (0x2e) sorts before '/' (0x2f).
        let first_name_end = bytes.iter().position(|&b| b == 0).unwrap();
        assert_eq!(&bytes[..first_name_end], b"100644 a.txt");
        assert!(Snapshot::decode(Oid::zero(), &bytes).is_ok());
    }

    #[test]
    fn load_missing_object() {
        let store = MemoryStore::new();
        let id = Snapshot::default().hash().unwrap();
        assert!(matches!(Snapshot::load(&store, id), Err(Error::ObjectNotFound(_))));
    }

    #[test]
    fn load_non_tree_is_corrupt() {
        let store = MemoryStore::new();
        let id = blob(&store, b"not a tree");
        assert!(matches!(Snapshot::load(&store, id), Err(Error::CorruptTree { .. })));
    }

    #[test]
    fn decode_rejects_unsorted_entries() {
        let f = ObjectKind::Blob.hash(b"x").unwrap();
        let mut data = Vec::new();
        for name in ["b", "a"] {
            data.extend_from_slice(b"100644 ");
            data.extend_from_slice(name.as_bytes());
            data.push(0);
            data.extend_from_slice(f.as_bytes());
        }
        assert!(matches!(
            Snapshot::decode(Oid::zero(), &data),
            Err(Error::CorruptTree { .. })
        ));
    }

    #[test]
    fn decode_rejects_truncated_and_bad_modes() {
        assert!(Snapshot::decode(Oid::zero(), b"100644 a\0short").is_err());
        assert!(Snapshot::decode(Oid::zero(), b"100644 a").is_err());
        let f = ObjectKind::Blob.hash(b"x").unwrap();
        let mut data = b"160000 sub\0".to_vec();
        data.extend_from_slice(f.as_bytes());
        assert!(Snapshot::decode(Oid::zero(), &data).is_err());
    }

    #[test]
    fn save_rejects_names_load_would_refuse() {
        let store = MemoryStore::new();
        let f = blob(&store, b"x");
        for name in ["a/b", "", ".", ".."] {
            let snap = Snapshot::capture(BTreeMap::from([(name.to_string(), Entry::file(f))]));
            assert!(matches!(snap.save(&store), Err(Error::InvalidPath(_))), "{:?}", name);
            assert!(matches!(snap.hash(), Err(Error::InvalidPath(_))), "{:?}", name);
        }
        assert_eq!(store.object_count(), 1);
    }
}
