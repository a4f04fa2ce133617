mod common;

use std::collections::BTreeMap;

use gfs::*;

fn tree_of(store: &GitStore, files: &[(&str, &str)]) -> Oid {
    let mut cache = StagingCache::new();
    for (path, content) in files {
        let blob = store.put_blob(content.as_bytes()).unwrap();
        cache.apply(store, &EditOp::add_file(*path, blob)).unwrap();
    }
    flush(cache, store).unwrap()
}

#[test]
fn add_blob_under_expanded_tree_file_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let other = tree_of(&store, &[("b/deep.txt", "deep")]);
    let blob = store.put_blob(b"h").unwrap();

    let mut cache = StagingCache::new();
    cache.apply(&store, &EditOp::add_tree("a", other)).unwrap();
    assert!(cache.is_dir("a/b"));
    let before = cache.clone();
    assert!(matches!(
        cache.apply(&store, &EditOp::add_file("a/b", blob)),
        Err(Error::PathConflict(_))
    ));
    assert_eq!(cache, before);
}

#[test]
fn update_blob_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let h1 = store.put_blob(b"one").unwrap();
    let h2 = store.put_blob(b"two").unwrap();
    let original = Snapshot::capture(BTreeMap::from([("x.txt".to_string(), Entry::file(h1))]))
        .save(&store)
        .unwrap();

    let mut cache = StagingCache::seeded(&store, original).unwrap();
    cache.apply(&store, &EditOp::update_blob("x.txt", Some(h2), None)).unwrap();
    let root = flush(cache, &store).unwrap();

    let expected = Snapshot::capture(BTreeMap::from([("x.txt".to_string(), Entry::file(h2))]))
        .hash()
        .unwrap();
    assert_eq!(root, expected);
    assert_ne!(root, original);
}

#[test]
fn seeds_compose_at_mount_points() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let lib = tree_of(&store, &[("lib.rs", "lib"), ("util/mod.rs", "util")]);
    let docs = tree_of(&store, &[("index.md", "docs")]);

    let mut cache = StagingCache::new();
    cache.seed(&store, "src", lib).unwrap();
    cache.seed(&store, "docs", docs).unwrap();
    assert_eq!(cache.len(), 3);
    assert_eq!(cache.base("src"), Some(lib));
    assert_eq!(cache.base("docs"), Some(docs));

    let root = flush(cache, &store).unwrap();
    let top = Snapshot::load(&store, root).unwrap();
    assert_eq!(top.get("src"), Some(&Entry::tree(lib)));
    assert_eq!(top.get("docs"), Some(&Entry::tree(docs)));
}

#[test]
fn overlapping_seed_favors_latest() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let old = tree_of(&store, &[("a.txt", "old"), ("keep.txt", "keep")]);
    let new = tree_of(&store, &[("a.txt", "new")]);

    let mut cache = StagingCache::seeded(&store, old).unwrap();
    cache.seed(&store, "", new).unwrap();
    let a = cache.get("a.txt").unwrap();
    assert_eq!(store.get_blob(a.id).unwrap(), b"new");
    assert!(cache.get("keep.txt").is_some());
}

#[test]
fn same_ops_same_result() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let base = tree_of(&store, &[("d/one", "1"), ("d/two", "2"), ("top", "t")]);
    let blob = store.put_blob(b"x").unwrap();
    let ops = vec![
        EditOp::delete_blob("d/one"),
        EditOp::add_file("d/three", blob),
        EditOp::update_blob("top", None, Some(EntryMode::ExecutableFile)),
        EditOp::delete_tree("missing"),
    ];

    let run = || {
        let mut plan = CachePlan::on(Base::Tree(base));
        for op in &ops {
            plan.push(op.clone());
        }
        plan.build(&store).unwrap()
    };
    let (first, second) = (run(), run());
    assert_eq!(first, second);
    assert_eq!(flush(first, &store).unwrap(), flush(second, &store).unwrap());
}

#[test]
fn deleting_absent_paths_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let mut cache = StagingCache::new();
    assert_eq!(
        cache.apply(&store, &EditOp::delete_blob("nope")).unwrap(),
        EditOutcome::Skipped
    );
    assert_eq!(
        cache.apply(&store, &EditOp::delete_tree("nope/deeper")).unwrap(),
        EditOutcome::Skipped
    );
    assert!(matches!(
        cache.apply(&store, &EditOp::update_blob("nope", None, None)),
        Err(Error::PathNotFound(_))
    ));
}
