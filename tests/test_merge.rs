mod common;

use gfs::*;

fn branch(store: &GitStore, name: &str) -> GitFileSystem<GitStore> {
    let head = store.resolve_ref("refs/heads/main").unwrap();
    store
        .update_ref(&format!("refs/heads/{}", name), None, head, "branch: Created")
        .unwrap();
    GitFileSystem::open_branch(store.clone(), name).unwrap()
}

#[test]
fn fast_forward_then_three_way() {
    let dir = tempfile::tempdir().unwrap();
    let main = common::fs_with_files(dir.path());
    let topic = branch(main.store(), "topic");

    topic.write("dir/c.txt", b"ccc").unwrap();
    let tip = topic.execute(CommitCommand::new("Add c")).unwrap();
    let tip = tip.commit().unwrap().id;

    let outcome = main.execute(MergeCommand::new("topic")).unwrap();
    assert!(matches!(outcome, Outcome::FastForwarded(ref c) if c.id == tip));
    assert_eq!(main.store().resolve_ref("refs/heads/main").unwrap(), tip);
    assert_eq!(main.read("dir/c.txt").unwrap(), b"ccc");

    // Diverge: each side touches different files.
    topic.remove("dir/a.txt", false).unwrap();
    topic.execute(CommitCommand::new("Drop a")).unwrap();
    main.write("hello.txt", b"hello again").unwrap();
    let ours = main.execute(CommitCommand::new("Greet")).unwrap();
    let ours = ours.commit().unwrap().id;

    let merged = main
        .execute(MergeCommand::new("topic").message("Merge topic"))
        .unwrap();
    let merged = merged.commit().unwrap();
    assert_eq!(merged.parents()[0], ours);
    assert_eq!(merged.message(), "Merge topic");
    assert!(!main.exists("dir/a.txt").unwrap());
    assert_eq!(main.read("hello.txt").unwrap(), b"hello again");
    assert_eq!(main.read("dir/b.txt").unwrap(), b"bbb");

    // Merging again is a no-op.
    assert_eq!(main.execute(MergeCommand::new("topic")).unwrap(), Outcome::NoChange);
}

#[test]
fn conflict_reports_paths_and_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let main = common::fs_with_files(dir.path());
    let topic = branch(main.store(), "topic");

    topic.write("dir/a.txt", b"theirs").unwrap();
    topic.write("dir/b.txt", b"theirs too").unwrap();
    topic.execute(CommitCommand::new("theirs")).unwrap();
    main.write("dir/a.txt", b"ours").unwrap();
    main.remove("dir/b.txt", false).unwrap();
    main.execute(CommitCommand::new("ours")).unwrap();
    let before = main.status();

    match main.execute(MergeCommand::new("topic")) {
        Err(Error::MergeConflict(paths)) => assert_eq!(paths, ["dir/a.txt", "dir/b.txt"]),
        other => panic!("expected a merge conflict, got {:?}", other),
    }
    assert_eq!(main.status(), before);
    assert!(!main.has_changes().unwrap());
}

#[test]
fn file_replaced_by_directory_merges() {
    let dir = tempfile::tempdir().unwrap();
    let main = common::fs_with_files(dir.path());
    let topic = branch(main.store(), "topic");

    topic.remove("hello.txt", false).unwrap();
    topic.write("hello.txt/inner.txt", b"now a dir").unwrap();
    topic.execute(CommitCommand::new("dir")).unwrap();
    main.write("other.txt", b"o").unwrap();
    main.execute(CommitCommand::new("other")).unwrap();

    main.execute(MergeCommand::new("topic")).unwrap();
    assert!(main.is_dir("hello.txt").unwrap());
    assert_eq!(main.read("hello.txt/inner.txt").unwrap(), b"now a dir");
    assert!(main.exists("other.txt").unwrap());
}
