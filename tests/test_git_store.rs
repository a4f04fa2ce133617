mod common;

use gfs::*;

#[test]
fn create_with_branch_makes_initial_commit() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    assert_eq!(store.head_target().unwrap().as_deref(), Some("refs/heads/main"));

    let head = store.resolve_ref("refs/heads/main").unwrap();
    let commit = Commit::load(&store, head).unwrap();
    assert!(commit.parents().is_empty());
    assert_eq!(commit.tree(), Snapshot::default().hash().unwrap());
    assert_eq!(commit.message(), "Initialize main");
    assert_eq!(commit.record.author.name, "Test User");
}

#[test]
fn open_existing_and_missing() {
    let dir = tempfile::tempdir().unwrap();
    let _ = common::create_store(dir.path(), "main");

    let reopened = GitStore::open(dir.path().join("test.git"), OpenOptions::default()).unwrap();
    assert!(reopened.resolve_ref("refs/heads/main").is_ok());

    let missing = GitStore::open(dir.path().join("nope.git"), OpenOptions::default());
    assert!(matches!(missing, Err(Error::Io(_))));
}

#[test]
fn create_without_branch_is_unborn() {
    let dir = tempfile::tempdir().unwrap();
    let store = GitStore::open(dir.path().join("bare.git"), OpenOptions {
        create: true,
        ..Default::default()
    })
    .unwrap();
    let fs = GitFileSystem::open(store).unwrap();
    let status = fs.status();
    assert!(status.is_attached());
    assert!(!status.is_initialized());

    fs.write("first.txt", b"1").unwrap();
    let outcome = fs.execute(CommitCommand::new("first")).unwrap();
    assert!(outcome.commit().unwrap().parents().is_empty());
}

#[test]
fn objects_round_trip_and_hash_like_git() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let id = store.put_blob(b"hello\n").unwrap();
    assert_eq!(id.to_string(), "ce013625030ba8dba906f756967f9e9ca394464a");
    assert!(store.contains(id).unwrap());
    assert_eq!(store.get_blob(id).unwrap(), b"hello\n");
    assert_eq!(ObjectKind::Blob.hash(b"hello\n").unwrap(), id);
}

#[test]
fn update_ref_is_compare_and_swap() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let head = store.resolve_ref("refs/heads/main").unwrap();
    let other = CommitRecord {
        tree: Snapshot::default().hash().unwrap(),
        parents: vec![head],
        author: Ident::new(&Signature::default(), 1_700_000_000, 0),
        committer: Ident::new(&Signature::default(), 1_700_000_000, 0),
        message: "other".into(),
    }
    .write(&store)
    .unwrap();

    // Wrong expectation: refused, ref unchanged.
    let err = store
        .update_ref("refs/heads/main", Some(other.id), head, "bad")
        .unwrap_err();
    assert!(matches!(err, Error::RefUpdateConflict { .. }));
    assert_eq!(store.resolve_ref("refs/heads/main").unwrap(), head);

    // Creating an existing ref is refused too.
    assert!(matches!(
        store.update_ref("refs/heads/main", None, other.id, "create"),
        Err(Error::RefUpdateConflict { .. })
    ));

    store
        .update_ref("refs/heads/main", Some(head), other.id, "advance")
        .unwrap();
    assert_eq!(store.resolve_ref("refs/heads/main").unwrap(), other.id);

    assert!(matches!(
        store.update_ref("refs/heads/bad..name", None, head, "x"),
        Err(Error::InvalidRefName(_))
    ));
}

#[test]
fn signature_falls_back_to_default() {
    let dir = tempfile::tempdir().unwrap();
    let store = GitStore::open(dir.path().join("sig.git"), OpenOptions {
        create: true,
        author: Some("Only Name".into()),
        ..Default::default()
    })
    .unwrap();
    assert_eq!(store.signature().name, "Only Name");
    assert!(!store.signature().email.is_empty());

    let fs = GitFileSystem::open(store)
        .unwrap()
        .with_signature(Signature::new("Override", "o@example.com"));
    assert_eq!(fs.signature().name, "Override");
}

#[test]
fn handle_reads_committed_tree() {
    let dir = tempfile::tempdir().unwrap();
    let fs = common::fs_with_files(dir.path());
    let head = fs.status().head.unwrap();

    let reopened = GitFileSystem::open(fs.store().clone()).unwrap();
    assert_eq!(reopened.status().head, Some(head));
    assert_eq!(reopened.read("dir/b.txt").unwrap(), b"bbb");
    let names: Vec<_> = reopened.ls("dir").unwrap().into_iter().map(|e| e.name).collect();
    assert_eq!(names, ["a.txt", "b.txt"]);
    let walked: Vec<_> = reopened.walk("").unwrap().into_iter().map(|(p, _)| p).collect();
    assert_eq!(walked, ["dir/a.txt", "dir/b.txt", "hello.txt"]);

    let plan_tree = CachePlan::on(Base::Revision("main".into()))
        .build_tree(fs.store())
        .unwrap();
    assert_eq!(plan_tree, reopened.status().tree);
}
