use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use git2::Oid;

use crate::error::{Error, Result};
use crate::store::ContentStore;
use crate::types::{ObjectKind, RawObject, Signature};

#[derive(Default)]
struct MemoryInner {
    objects: HashMap<Oid, RawObject>,
    refs: BTreeMap<String, Oid>,
    head: Option<String>,
    puts: usize,
}

/// An in-process [`ContentStore`].
///
/// Ids are computed exactly as git computes them, so trees and commits
/// built here hash identically to their [`GitStore`](crate::GitStore)
/// counterparts.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
    signature: Option<Signature>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose `HEAD` symbolically points at `refname` (unborn until
    /// the first update).
    pub fn with_head(refname: impl Into<String>) -> Self {
        let store = Self::default();
        if let Ok(mut inner) = store.inner.lock() {
            inner.head = Some(refname.into());
        }
        store
    }

    /// Report `signature` as the configured identity.
    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = Some(signature);
        self
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>> {
        self.inner.lock().map_err(|e| Error::git_msg(e.to_string()))
    }

    /// Number of distinct objects stored.
    pub fn object_count(&self) -> usize {
        self.lock().map(|inner| inner.objects.len()).unwrap_or(0)
    }

    /// Number of `put` calls served, including ones for existing objects.
    pub fn put_count(&self) -> usize {
        self.lock().map(|inner| inner.puts).unwrap_or(0)
    }

    /// All refs and their targets.
    pub fn refs(&self) -> BTreeMap<String, Oid> {
        self.lock().map(|inner| inner.refs.clone()).unwrap_or_default()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("objects", &self.object_count())
            .finish()
    }
}

impl ContentStore for MemoryStore {
    fn get(&self, id: Oid) -> Result<RawObject> {
        self.lock()?
            .objects
            .get(&id)
            .cloned()
            .ok_or(Error::ObjectNotFound(id))
    }

    fn put(&self, kind: ObjectKind, data: &[u8]) -> Result<Oid> {
        let id = kind.hash(data)?;
        let mut inner = self.lock()?;
        inner.puts += 1;
        inner.objects.entry(id).or_insert_with(|| RawObject {
            kind,
            data: data.to_vec(),
        });
        Ok(id)
    }

    fn contains(&self, id: Oid) -> Result<bool> {
        Ok(self.lock()?.objects.contains_key(&id))
    }

    fn resolve_ref(&self, name: &str) -> Result<Oid> {
        let inner = self.lock()?;
        let name = match (name, &inner.head) {
            ("HEAD", Some(target)) => target.as_str(),
            _ => name,
        };
        inner
            .refs
            .get(name)
            .copied()
            .ok_or_else(|| Error::ref_not_found(name))
    }

    fn update_ref(&self, name: &str, expected: Option<Oid>, new: Oid, log_message: &str) -> Result<()> {
        crate::paths::validate_ref_name(name)?;
        let mut inner = self.lock()?;
        let actual = inner.refs.get(name).copied();
        if actual != expected {
            return Err(Error::ref_update_conflict(name, expected, actual));
        }
        log::trace!("{}: {}", name, log_message);
        inner.refs.insert(name.to_string(), new);
        Ok(())
    }

    fn head_target(&self) -> Result<Option<String>> {
        Ok(self.lock()?.head.clone())
    }

    fn default_signature(&self) -> Option<Signature> {
        self.signature.clone()
    }
}
