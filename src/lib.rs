//! A mutable filesystem view over a git object graph.
//!
//! `gfs` lets you read and write paths as if against an ordinary
//! filesystem while every edit is staged in memory. Staged edits become
//! content-addressed trees when flushed and commits when a command runs.
//!
//! # Key types
//!
//! - [`ContentStore`]: objects plus refs. [`GitStore`] uses a bare git
//!   repository, [`MemoryStore`] keeps everything in memory.
//! - [`Snapshot`]: one directory level of a stored tree.
//! - [`StagingCache`]: a flattened `path -> Entry` working view, edited
//!   with [`EditOp`]s and turned back into trees by [`flush`].
//! - [`GitFileSystem`]: a handle with a working tree and a [`Status`];
//!   runs [`Command`]s such as [`CommitCommand`] and
//!   [`CreateStashCommand`] one at a time.
//!
//! # Quick example
//!
//! ```rust,no_run
//! use gfs::{CommitCommand, GitFileSystem, GitStore, OpenOptions, Outcome};
//!
//! let store = GitStore::open("/tmp/my-repo", OpenOptions {
//!     create: true,
//!     branch: Some("main".into()),
//!     ..Default::default()
//! }).unwrap();
//! let fs = GitFileSystem::open(store).unwrap();
//!
//! fs.write("hello.txt", b"world").unwrap();
//! match fs.execute(CommitCommand::new("Add greeting")).unwrap() {
//!     Outcome::Committed(commit) => println!("committed {}", commit.id),
//!     _ => println!("nothing to commit"),
//! }
//! ```

pub mod cache;
pub mod command;
pub mod commit;
pub mod edit;
pub mod error;
pub mod flush;
pub mod fs;
mod lock;
pub mod memory;
pub mod merge;
pub mod paths;
pub mod snapshot;
pub mod stash;
pub mod store;
pub mod types;

// Re-export primary public types at crate root.
pub use cache::{EditOutcome, StagingCache};
pub use command::{
    CheckoutCommand, CheckoutTarget, Command, CommitCommand, Outcome, ResetCommand, ResetMode,
};
pub use commit::{Commit, CommitRecord, Ident};
pub use edit::{Base, CachePlan, EditOp};
pub use error::{Error, Result};
pub use flush::{flush, tree_hash};
pub use fs::{CommandContext, GitFileSystem, Status};
pub use git2::Oid;
pub use lock::GfsState;
pub use memory::MemoryStore;
pub use merge::MergeCommand;
pub use snapshot::Snapshot;
pub use stash::{stash_push, CreateStashCommand, STASH_REF};
pub use store::{ContentStore, GitStore};
pub use types::*;
