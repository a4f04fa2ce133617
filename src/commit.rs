use std::collections::{HashSet, VecDeque};

use git2::Oid;
use gix::objs::WriteTo;

use crate::error::{Error, Result};
use crate::store::ContentStore;
use crate::types::{from_object_id, to_object_id, ObjectKind, Signature};

// ---------------------------------------------------------------------------
// Ident
// ---------------------------------------------------------------------------

/// A signature stamped with a time, as recorded in a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    pub email: String,
    /// Seconds since the Unix epoch.
    pub time: i64,
    /// Timezone offset from UTC in minutes.
    pub offset_minutes: i32,
}

impl Ident {
    pub fn new(signature: &Signature, time: i64, offset_minutes: i32) -> Self {
        Self {
            name: signature.name.clone(),
            email: signature.email.clone(),
            time,
            offset_minutes,
        }
    }

    /// Stamp `signature` with the current time in UTC.
    pub fn now(signature: &Signature) -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Self::new(signature, now.as_secs() as i64, 0)
    }

    pub fn signature(&self) -> Signature {
        Signature::new(self.name.clone(), self.email.clone())
    }

    fn to_gix(&self) -> gix::actor::Signature {
        gix::actor::Signature {
            name: self.name.as_str().into(),
            email: self.email.as_str().into(),
            time: gix::date::Time::new(self.time, self.offset_minutes * 60),
        }
    }

    fn from_gix(sig: gix::actor::SignatureRef<'_>) -> Option<Self> {
        let time = sig.time().ok()?;
        Some(Self {
            name: sig.name.to_string(),
            email: sig.email.to_string(),
            time: time.seconds,
            offset_minutes: time.offset / 60,
        })
    }
}

// ---------------------------------------------------------------------------
// CommitRecord / Commit
// ---------------------------------------------------------------------------

/// The contents of a commit object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub tree: Oid,
    pub parents: Vec<Oid>,
    pub author: Ident,
    pub committer: Ident,
    pub message: String,
}

impl CommitRecord {
    /// Encode as a git commit payload.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let parents = self
            .parents
            .iter()
            .map(|&id| to_object_id(id))
            .collect::<Result<Vec<_>>>()?;
        let commit = gix::objs::Commit {
            tree: to_object_id(self.tree)?,
            parents: parents.into(),
            author: self.author.to_gix(),
            committer: self.committer.to_gix(),
            encoding: None,
            message: self.message.as_str().into(),
            extra_headers: vec![],
        };
        let mut out = Vec::new();
        commit.write_to(&mut out)?;
        Ok(out)
    }

    /// Parse a git commit payload. `id` is only used for error reporting.
    pub fn decode(id: Oid, data: &[u8]) -> Result<Self> {
        let commit = gix::objs::CommitRef::from_bytes(data)
            .map_err(|e| Error::corrupt_commit(id, e.to_string()))?;
        let parents = commit
            .parents()
            .map(|parent| from_object_id(&parent))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            tree: from_object_id(&commit.tree())?,
            parents,
            author: Ident::from_gix(commit.author)
                .ok_or_else(|| Error::corrupt_commit(id, "bad author"))?,
            committer: Ident::from_gix(commit.committer)
                .ok_or_else(|| Error::corrupt_commit(id, "bad committer"))?,
            message: commit.message.to_string(),
        })
    }

    /// The first paragraph of the message on a single line.
    pub fn short_message(&self) -> String {
        let message = self.message.trim_start();
        let end = message.find("\n\n").unwrap_or(message.len());
        message[..end].trim().replace('\n', " ")
    }

    /// Store this record and return the resulting commit.
    pub fn write<S: ContentStore + ?Sized>(self, store: &S) -> Result<Commit> {
        let id = store.put(ObjectKind::Commit, &self.encode()?)?;
        Ok(Commit { id, record: self })
    }
}

/// A stored commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub id: Oid,
    pub record: CommitRecord,
}

impl Commit {
    /// Read and parse the commit `id`.
    pub fn load<S: ContentStore + ?Sized>(store: &S, id: Oid) -> Result<Self> {
        let obj = store.get(id)?;
        if obj.kind != ObjectKind::Commit {
            return Err(Error::corrupt_commit(id, format!("object is a {}", obj.kind)));
        }
        Ok(Self {
            id,
            record: CommitRecord::decode(id, &obj.data)?,
        })
    }

    pub fn tree(&self) -> Oid {
        self.record.tree
    }

    pub fn parents(&self) -> &[Oid] {
        &self.record.parents
    }

    pub fn message(&self) -> &str {
        &self.record.message
    }

    pub fn short_message(&self) -> String {
        self.record.short_message()
    }
}

// ---------------------------------------------------------------------------
// Revisions and ancestry
// ---------------------------------------------------------------------------

/// Follow annotated tags until a commit is reached.
pub fn peel_to_commit<S: ContentStore + ?Sized>(store: &S, id: Oid) -> Result<Commit> {
    let mut current = id;
    // Tag chains are short; the bound only stops cycles in corrupt stores.
    for _ in 0..16 {
        let obj = store.get(current)?;
        match obj.kind {
            ObjectKind::Commit => {
                return Ok(Commit {
                    id: current,
                    record: CommitRecord::decode(current, &obj.data)?,
                })
            }
            ObjectKind::Tag => {
                let tag = gix::objs::TagRef::from_bytes(&obj.data)
                    .map_err(|e| Error::corrupt_commit(current, e.to_string()))?;
                current = from_object_id(&tag.target())?;
            }
            other => {
                return Err(Error::corrupt_commit(current, format!("object is a {}", other)));
            }
        }
    }
    Err(Error::corrupt_commit(id, "tag chain too deep"))
}

/// Resolve a revision to a commit.
///
/// Accepts a full hex id, `HEAD`, a full ref name, or a short branch or tag
/// name (branches win).
pub fn resolve_revision<S: ContentStore + ?Sized>(store: &S, rev: &str) -> Result<Commit> {
    if rev.len() == 40 {
        if let Ok(id) = Oid::from_str(rev) {
            return peel_to_commit(store, id);
        }
    }

    let candidates = if rev == "HEAD" || rev.starts_with("refs/") {
        vec![rev.to_string()]
    } else {
        vec![format!("refs/heads/{}", rev), format!("refs/tags/{}", rev)]
    };
    for candidate in candidates {
        match store.resolve_ref(&candidate) {
            Ok(id) => return peel_to_commit(store, id),
            Err(Error::RefNotFound(_)) => continue,
            Err(e) => return Err(e),
        }
    }
    Err(Error::ref_not_found(rev))
}

/// Whether `ancestor` is reachable from `descendant` (a commit is its own
/// ancestor).
pub fn is_ancestor<S: ContentStore + ?Sized>(store: &S, ancestor: Oid, descendant: Oid) -> Result<bool> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([descendant]);
    while let Some(id) = queue.pop_front() {
        if id == ancestor {
            return Ok(true);
        }
        if !seen.insert(id) {
            continue;
        }
        queue.extend(Commit::load(store, id)?.record.parents);
    }
    Ok(false)
}

/// The common ancestor of `a` and `b` closest to `b` in breadth-first order,
/// or `None` for unrelated histories.
pub fn merge_base<S: ContentStore + ?Sized>(store: &S, a: Oid, b: Oid) -> Result<Option<Oid>> {
    let mut reachable = HashSet::new();
    let mut queue = VecDeque::from([a]);
    while let Some(id) = queue.pop_front() {
        if reachable.insert(id) {
            queue.extend(Commit::load(store, id)?.record.parents);
        }
    }

    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([b]);
    while let Some(id) = queue.pop_front() {
        if reachable.contains(&id) {
            return Ok(Some(id));
        }
        if seen.insert(id) {
            queue.extend(Commit::load(store, id)?.record.parents);
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::snapshot::Snapshot;

    fn ident(time: i64) -> Ident {
        Ident::new(&Signature::new("Test", "test@example.com"), time, 120)
    }

    fn commit(store: &MemoryStore, parents: Vec<Oid>, message: &str) -> Oid {
        let tree = Snapshot::default().save(store).unwrap();
        CommitRecord {
            tree,
            parents,
            author: ident(1_700_000_000),
            committer: ident(1_700_000_000),
            message: message.into(),
        }
        .write(store)
        .unwrap()
        .id
    }

    #[test]
    fn encode_decode() {
        let store = MemoryStore::new();
        let parent = commit(&store, vec![], "root\n");
        let record = CommitRecord {
            tree: Snapshot::default().hash().unwrap(),
            parents: vec![parent],
            author: ident(1_700_000_000),
            committer: Ident::new(&Signature::new("Other", "o@example.com"), 5, -330),
            message: "Subject line\n\nBody text\n".into(),
        };
        let decoded = CommitRecord::decode(Oid::zero(), &record.encode().unwrap()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn encoding_matches_git_layout() {
        let record = CommitRecord {
            tree: Snapshot::default().hash().unwrap(),
            parents: vec![],
            author: ident(10),
            committer: ident(10),
            message: "m\n".into(),
        };
        let text = String::from_utf8(record.encode().unwrap()).unwrap();
        assert_eq!(
            text,
            "tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
             author Test <test@example.com> 10 +0200\n\
             committer Test <test@example.com> 10 +0200\n\
             \n\
             m\n"
        );
    }

    #[test]
    fn short_message_joins_first_paragraph() {
        let mut record = CommitRecord {
            tree: Oid::zero(),
            parents: vec![],
            author: ident(0),
            committer: ident(0),
            message: "first\nsecond\n\nbody".into(),
        };
        assert_eq!(record.short_message(), "first second");
        record.message = "only\n".into();
        assert_eq!(record.short_message(), "only");
    }

    #[test]
    fn decode_rejects_missing_tree() {
        let data = b"author A <a@b> 1 +0000\ncommitter A <a@b> 1 +0000\n\nmsg";
        assert!(matches!(
            CommitRecord::decode(Oid::zero(), data),
            Err(Error::CorruptCommit { .. })
        ));
    }

    #[test]
    fn ancestry() {
        let store = MemoryStore::new();
        let root = commit(&store, vec![], "root");
        let left = commit(&store, vec![root], "left");
        let right = commit(&store, vec![root], "right");
        let merge = commit(&store, vec![left, right], "merge");

        assert!(is_ancestor(&store, root, merge).unwrap());
        assert!(is_ancestor(&store, left, left).unwrap());
        assert!(!is_ancestor(&store, left, right).unwrap());
        assert_eq!(merge_base(&store, left, right).unwrap(), Some(root));
        assert_eq!(merge_base(&store, merge, right).unwrap(), Some(right));

        let unrelated = commit(&store, vec![], "other root");
        assert_eq!(merge_base(&store, unrelated, left).unwrap(), None);
    }

    #[test]
    fn resolve_by_name_and_hex() {
        let store = MemoryStore::with_head("refs/heads/main");
        let id = commit(&store, vec![], "root");
        store.update_ref("refs/heads/main", None, id, "init").unwrap();

        assert_eq!(resolve_revision(&store, "main").unwrap().id, id);
        assert_eq!(resolve_revision(&store, "HEAD").unwrap().id, id);
        assert_eq!(resolve_revision(&store, &id.to_string()).unwrap().id, id);
        assert!(matches!(
            resolve_revision(&store, "missing"),
            Err(Error::RefNotFound(_))
        ));
    }

    #[test]
    fn annotated_tags_peel_to_commit() {
        let store = MemoryStore::with_head("refs/heads/main");
        let id = commit(&store, vec![], "root");
        let tag = format!(
            "object {}\ntype commit\ntag v1\ntagger Test <test@example.com> 1 +0000\n\nrelease\n",
            id
        );
        let tag_id = store.put(ObjectKind::Tag, tag.as_bytes()).unwrap();
        store.update_ref("refs/tags/v1", None, tag_id, "tag").unwrap();

        assert_eq!(peel_to_commit(&store, tag_id).unwrap().id, id);
        assert_eq!(resolve_revision(&store, "v1").unwrap().id, id);
    }
}
