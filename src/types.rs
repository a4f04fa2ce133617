use git2::Oid;
use gix::objs::tree::{EntryKind, EntryMode as GixMode};

// ---------------------------------------------------------------------------
// Mode constants
// ---------------------------------------------------------------------------

pub const MODE_BLOB: u32 = 0o100644;
pub const MODE_BLOB_EXEC: u32 = 0o100755;
pub const MODE_LINK: u32 = 0o120000;
pub const MODE_TREE: u32 = 0o040000;

// ---------------------------------------------------------------------------
// EntryMode
// ---------------------------------------------------------------------------

/// The kind of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntryMode {
    RegularFile,
    ExecutableFile,
    Symlink,
    Directory,
}

impl EntryMode {
    /// Convert a raw git mode to an `EntryMode`.
    pub fn from_raw(mode: u32) -> Option<Self> {
        match mode {
            MODE_BLOB => Some(Self::RegularFile),
            MODE_BLOB_EXEC => Some(Self::ExecutableFile),
            MODE_LINK => Some(Self::Symlink),
            MODE_TREE => Some(Self::Directory),
            _ => None,
        }
    }

    /// Convert to a raw git mode.
    pub fn raw(self) -> u32 {
        match self {
            Self::RegularFile => MODE_BLOB,
            Self::ExecutableFile => MODE_BLOB_EXEC,
            Self::Symlink => MODE_LINK,
            Self::Directory => MODE_TREE,
        }
    }

    /// Whether the entry's hash names a tree.
    pub fn is_tree(self) -> bool {
        matches!(self, Self::Directory)
    }

    /// Whether the entry's hash names a blob (file or symlink target).
    pub fn is_blob(self) -> bool {
        !self.is_tree()
    }

    pub fn is_executable(self) -> bool {
        matches!(self, Self::ExecutableFile)
    }

    pub fn is_symlink(self) -> bool {
        matches!(self, Self::Symlink)
    }

    pub(crate) fn to_gix(self) -> GixMode {
        let kind = match self {
            Self::RegularFile => EntryKind::Blob,
            Self::ExecutableFile => EntryKind::BlobExecutable,
            Self::Symlink => EntryKind::Link,
            Self::Directory => EntryKind::Tree,
        };
        GixMode::from(kind)
    }

    /// `None` for gitlinks, which a tree here never contains.
    pub(crate) fn from_gix(mode: GixMode) -> Option<Self> {
        match mode.kind() {
            EntryKind::Blob => Some(Self::RegularFile),
            EntryKind::BlobExecutable => Some(Self::ExecutableFile),
            EntryKind::Link => Some(Self::Symlink),
            EntryKind::Tree => Some(Self::Directory),
            EntryKind::Commit => None,
        }
    }
}

impl std::fmt::Display for EntryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06o}", self.raw())
    }
}

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// What a directory maps a name to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entry {
    pub id: Oid,
    pub mode: EntryMode,
}

impl Entry {
    pub fn new(id: Oid, mode: EntryMode) -> Self {
        Self { id, mode }
    }

    pub fn file(id: Oid) -> Self {
        Self::new(id, EntryMode::RegularFile)
    }

    pub fn tree(id: Oid) -> Self {
        Self::new(id, EntryMode::Directory)
    }
}

/// One row of a directory listing.
///
/// `id` is `None` for a staged directory whose contents changed since it
/// was last flushed, since its hash is not known until the next flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub mode: EntryMode,
    pub id: Option<Oid>,
}

// ---------------------------------------------------------------------------
// Raw objects
// ---------------------------------------------------------------------------

/// The type of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectKind {
    pub(crate) fn to_git(self) -> git2::ObjectType {
        match self {
            Self::Blob => git2::ObjectType::Blob,
            Self::Tree => git2::ObjectType::Tree,
            Self::Commit => git2::ObjectType::Commit,
            Self::Tag => git2::ObjectType::Tag,
        }
    }

    pub(crate) fn from_git(kind: git2::ObjectType) -> Option<Self> {
        match kind {
            git2::ObjectType::Blob => Some(Self::Blob),
            git2::ObjectType::Tree => Some(Self::Tree),
            git2::ObjectType::Commit => Some(Self::Commit),
            git2::ObjectType::Tag => Some(Self::Tag),
            _ => None,
        }
    }

    /// Compute the id `data` would have once stored as this kind.
    pub fn hash(self, data: &[u8]) -> crate::error::Result<Oid> {
        Oid::hash_object(self.to_git(), data).map_err(crate::error::Error::git)
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
        })
    }
}

/// An object as read back from a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObject {
    pub kind: ObjectKind,
    pub data: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Object ids
// ---------------------------------------------------------------------------

pub(crate) fn to_object_id(id: Oid) -> crate::error::Result<gix::ObjectId> {
    gix::hash::oid::try_from_bytes(id.as_bytes())
        .map(ToOwned::to_owned)
        .map_err(crate::error::Error::git)
}

pub(crate) fn from_object_id(id: &gix::hash::oid) -> crate::error::Result<Oid> {
    Oid::from_bytes(id.as_bytes()).map_err(crate::error::Error::git)
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

/// Author/committer identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
}

impl Signature {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self {
            name: "gfs".into(),
            email: "gfs@localhost".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// OpenOptions
// ---------------------------------------------------------------------------

/// Options for opening or creating a `GitStore`.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Create the repository if it doesn't exist.
    pub create: bool,
    /// Branch to initialize with an empty commit when creating.
    pub branch: Option<String>,
    /// Default author name. Falls back to `user.name` from git config.
    pub author: Option<String>,
    /// Default author email. Falls back to `user.email` from git config.
    pub email: Option<String>,
}
