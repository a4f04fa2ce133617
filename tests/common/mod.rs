use std::path::Path;

use gfs::*;

pub fn create_store(dir: &Path, branch: &str) -> GitStore {
    GitStore::open(dir.join("test.git"), OpenOptions {
        create: true,
        branch: Some(branch.into()),
        author: Some("Test User".into()),
        email: Some("test@example.com".into()),
    })
    .unwrap()
}

/// A handle on `main` of a fresh repository (one empty initial commit).
#[allow(dead_code)]
pub fn open_fs(dir: &Path) -> GitFileSystem<GitStore> {
    GitFileSystem::open(create_store(dir, "main")).unwrap()
}

/// A handle with `hello.txt`, `dir/a.txt` and `dir/b.txt` committed.
#[allow(dead_code)]
pub fn fs_with_files(dir: &Path) -> GitFileSystem<GitStore> {
    let fs = open_fs(dir);
    fs.write("hello.txt", b"hello").unwrap();
    fs.write("dir/a.txt", b"aaa").unwrap();
    fs.write("dir/b.txt", b"bbb").unwrap();
    fs.execute(CommitCommand::new("Add files")).unwrap();
    fs
}

#[allow(dead_code)]
pub fn memory_fs() -> GitFileSystem<MemoryStore> {
    GitFileSystem::open_branch(MemoryStore::with_head("refs/heads/main"), "main").unwrap()
}

/// Open the repository behind `store` directly with git2.
#[allow(dead_code)]
pub fn raw_repo(store: &GitStore) -> git2::Repository {
    git2::Repository::open_bare(store.path()).unwrap()
}
