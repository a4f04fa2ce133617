use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use git2::{ErrorCode, Oid, Repository};

use crate::commit::{CommitRecord, Ident};
use crate::error::{Error, Result};
use crate::snapshot::Snapshot;
use crate::types::{ObjectKind, OpenOptions, RawObject, Signature};

// ---------------------------------------------------------------------------
// ContentStore
// ---------------------------------------------------------------------------

/// Content-addressed object storage plus named refs.
///
/// `put` is idempotent: identical bytes of the same kind always yield the
/// same id. `update_ref` is a compare-and-swap.
pub trait ContentStore: Send + Sync {
    /// Read an object. Fails with [`Error::ObjectNotFound`] when absent.
    fn get(&self, id: Oid) -> Result<RawObject>;

    /// Store an object and return its id.
    fn put(&self, kind: ObjectKind, data: &[u8]) -> Result<Oid>;

    /// Whether an object with this id is stored.
    fn contains(&self, id: Oid) -> Result<bool>;

    /// Resolve a full ref name (`refs/heads/main`, `HEAD`) to an object id.
    /// Fails with [`Error::RefNotFound`] when absent or unborn.
    fn resolve_ref(&self, name: &str) -> Result<Oid>;

    /// Point `name` at `new` if it currently points at `expected`.
    ///
    /// `expected = None` requires the ref not to exist yet. A mismatch fails
    /// with [`Error::RefUpdateConflict`] and leaves the ref untouched.
    fn update_ref(&self, name: &str, expected: Option<Oid>, new: Oid, log_message: &str) -> Result<()>;

    /// The full ref name `HEAD` points to, or `None` when detached.
    fn head_target(&self) -> Result<Option<String>> {
        Ok(None)
    }

    /// Identity configured for the underlying repository, if any.
    fn default_signature(&self) -> Option<Signature> {
        None
    }

    /// Store `data` as a blob.
    fn put_blob(&self, data: &[u8]) -> Result<Oid> {
        self.put(ObjectKind::Blob, data)
    }

    /// Read an object and require it to be a blob.
    fn get_blob(&self, id: Oid) -> Result<Vec<u8>> {
        let obj = self.get(id)?;
        if obj.kind != ObjectKind::Blob {
            return Err(Error::git_msg(format!("{} is a {}, not a blob", id, obj.kind)));
        }
        Ok(obj.data)
    }
}

impl<S: ContentStore + ?Sized> ContentStore for Arc<S> {
    fn get(&self, id: Oid) -> Result<RawObject> {
        (**self).get(id)
    }

    fn put(&self, kind: ObjectKind, data: &[u8]) -> Result<Oid> {
        (**self).put(kind, data)
    }

    fn contains(&self, id: Oid) -> Result<bool> {
        (**self).contains(id)
    }

    fn resolve_ref(&self, name: &str) -> Result<Oid> {
        (**self).resolve_ref(name)
    }

    fn update_ref(&self, name: &str, expected: Option<Oid>, new: Oid, log_message: &str) -> Result<()> {
        (**self).update_ref(name, expected, new, log_message)
    }

    fn head_target(&self) -> Result<Option<String>> {
        (**self).head_target()
    }

    fn default_signature(&self) -> Option<Signature> {
        (**self).default_signature()
    }
}

// ---------------------------------------------------------------------------
// GitStore
// ---------------------------------------------------------------------------

/// Internal state shared via `Arc`.
pub(crate) struct GitStoreInner {
    pub(crate) repo: Mutex<Repository>,
    pub(crate) path: PathBuf,
    pub(crate) signature: Signature,
}

/// A [`ContentStore`] backed by a bare git repository.
///
/// Cheap to clone (`Arc` internally).
#[derive(Clone)]
pub struct GitStore {
    pub(crate) inner: Arc<GitStoreInner>,
}

impl GitStore {
    /// Open (or create) a bare git repository at `path`.
    pub fn open(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let repo = if path.exists() {
            Repository::open_bare(&path).map_err(Error::git)?
        } else if options.create {
            std::fs::create_dir_all(&path).map_err(|e| Error::io(&path, e))?;
            Repository::init_bare(&path).map_err(Error::git)?
        } else {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("repository not found: {}", path.display()),
            )));
        };

        let configured = repo.signature().ok();
        let sig = Signature {
            name: options
                .author
                .or_else(|| configured.as_ref().and_then(|s| s.name().map(String::from)))
                .unwrap_or_else(|| Signature::default().name),
            email: options
                .email
                .or_else(|| configured.as_ref().and_then(|s| s.email().map(String::from)))
                .unwrap_or_else(|| Signature::default().email),
        };

        let store = GitStore {
            inner: Arc::new(GitStoreInner {
                repo: Mutex::new(repo),
                path,
                signature: sig,
            }),
        };

        if options.create {
            if let Some(ref branch) = options.branch {
                let refname = crate::paths::branch_ref(branch);
                if store.resolve_ref(&refname).is_err() {
                    store.init_branch(&refname)?;
                }
            }
        }

        Ok(store)
    }

    /// Create the initial commit on `refname` with an empty tree and point
    /// `HEAD` at it.
    fn init_branch(&self, refname: &str) -> Result<()> {
        crate::paths::validate_ref_name(refname)?;
        let tree = Snapshot::default().save(self)?;
        let ident = Ident::now(&self.inner.signature);
        let short = crate::paths::shorten_ref_name(refname);
        let record = CommitRecord {
            tree,
            parents: Vec::new(),
            author: ident.clone(),
            committer: ident,
            message: format!("Initialize {}", short),
        };
        let commit = record.write(self)?;
        self.update_ref(refname, None, commit.id, &format!("commit (initial): Initialize {}", short))?;

        self.with_repo(|repo| repo.set_head(refname).map_err(Error::git))?;
        log::info!("initialized {} at {}", refname, commit.id);
        Ok(())
    }

    /// Helper: lock the repo mutex and call `f` with the repository.
    pub(crate) fn with_repo<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Repository) -> Result<T>,
    {
        let repo = self
            .inner
            .repo
            .lock()
            .map_err(|e| Error::git_msg(e.to_string()))?;
        f(&repo)
    }

    /// Path to the bare repository on disk.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// The default signature used for commits.
    pub fn signature(&self) -> &Signature {
        &self.inner.signature
    }
}

impl std::fmt::Debug for GitStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitStore")
            .field("path", &self.inner.path)
            .finish()
    }
}

fn current_target(repo: &Repository, name: &str) -> Result<Option<Oid>> {
    match repo.refname_to_id(name) {
        Ok(id) => Ok(Some(id)),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(Error::git(e)),
    }
}

impl ContentStore for GitStore {
    fn get(&self, id: Oid) -> Result<RawObject> {
        self.with_repo(|repo| {
            let odb = repo.odb().map_err(Error::git)?;
            let obj = match odb.read(id) {
                Ok(obj) => obj,
                Err(e) if e.code() == ErrorCode::NotFound => return Err(Error::ObjectNotFound(id)),
                Err(e) => return Err(Error::git(e)),
            };
            let kind = ObjectKind::from_git(obj.kind())
                .ok_or_else(|| Error::git_msg(format!("{} has an unknown object type", id)))?;
            Ok(RawObject {
                kind,
                data: obj.data().to_vec(),
            })
        })
    }

    fn put(&self, kind: ObjectKind, data: &[u8]) -> Result<Oid> {
        self.with_repo(|repo| {
            let odb = repo.odb().map_err(Error::git)?;
            odb.write(kind.to_git(), data).map_err(Error::git)
        })
    }

    fn contains(&self, id: Oid) -> Result<bool> {
        self.with_repo(|repo| {
            let odb = repo.odb().map_err(Error::git)?;
            Ok(odb.exists(id))
        })
    }

    fn resolve_ref(&self, name: &str) -> Result<Oid> {
        self.with_repo(|repo| current_target(repo, name)?.ok_or_else(|| Error::ref_not_found(name)))
    }

    fn update_ref(&self, name: &str, expected: Option<Oid>, new: Oid, log_message: &str) -> Result<()> {
        crate::paths::validate_ref_name(name)?;
        self.with_repo(|repo| {
            // The mutex serializes threads; the matching update below guards
            // against other processes.
            let actual = current_target(repo, name)?;
            if actual != expected {
                return Err(Error::ref_update_conflict(name, expected, actual));
            }
            let result = match expected {
                Some(old) => repo.reference_matching(name, new, true, old, log_message),
                None => repo.reference(name, new, false, log_message),
            };
            match result {
                Ok(_) => Ok(()),
                Err(e) if matches!(e.code(), ErrorCode::Exists | ErrorCode::Modified) => {
                    let actual = current_target(repo, name)?;
                    Err(Error::ref_update_conflict(name, expected, actual))
                }
                Err(e) => Err(Error::git(e)),
            }
        })
    }

    fn head_target(&self) -> Result<Option<String>> {
        self.with_repo(|repo| {
            let head = match repo.find_reference("HEAD") {
                Ok(head) => head,
                Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
                Err(e) => return Err(Error::git(e)),
            };
            Ok(head.symbolic_target().map(String::from))
        })
    }

    fn default_signature(&self) -> Option<Signature> {
        Some(self.inner.signature.clone())
    }
}
