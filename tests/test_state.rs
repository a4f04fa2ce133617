mod common;

use std::sync::mpsc;

use gfs::*;

/// Holds the handle busy until told to finish.
struct Blocking {
    started: mpsc::Sender<()>,
    release: mpsc::Receiver<()>,
}

impl Command for Blocking {
    type Output = ();

    fn state(&self) -> GfsState {
        GfsState::Committing
    }

    fn run<S: ContentStore>(self, _ctx: &mut CommandContext<'_, S>) -> Result<()> {
        self.started.send(()).unwrap();
        self.release.recv().unwrap();
        Ok(())
    }
}

/// Stages a new status, then fails.
struct Failing;

impl Command for Failing {
    type Output = ();

    fn state(&self) -> GfsState {
        GfsState::Merging
    }

    fn run<S: ContentStore>(self, ctx: &mut CommandContext<'_, S>) -> Result<()> {
        let mut status = ctx.status().clone();
        status.branch = None;
        ctx.stage_status(status);
        ctx.stage_worktree(StagingCache::new());
        Err(Error::path_conflict("boom"))
    }
}

struct Panicking;

impl Command for Panicking {
    type Output = ();

    fn state(&self) -> GfsState {
        GfsState::Resetting
    }

    fn run<S: ContentStore>(self, _ctx: &mut CommandContext<'_, S>) -> Result<()> {
        panic!("command panicked");
    }
}

#[test]
fn second_command_is_busy_while_first_runs() {
    let fs = common::memory_fs();
    fs.write("a.txt", b"a").unwrap();
    let fs = &fs;

    std::thread::scope(|s| {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let first = s.spawn(move || {
            fs.execute(Blocking {
                started: started_tx,
                release: release_rx,
            })
        });
        started_rx.recv().unwrap();

        assert_eq!(fs.state(), GfsState::Committing);
        assert!(matches!(
            fs.execute(CreateStashCommand::new()),
            Err(Error::Busy(GfsState::Committing))
        ));
        assert!(matches!(
            fs.execute(CommitCommand::new("x")),
            Err(Error::Busy(GfsState::Committing))
        ));
        let objects = fs.store().object_count();
        assert!(matches!(fs.write("b.txt", b"b"), Err(Error::Busy(_))));
        assert_eq!(fs.store().object_count(), objects);
        // Reads are not blocked.
        assert_eq!(fs.read("a.txt").unwrap(), b"a");
        assert!(fs.status().is_attached());

        release_tx.send(()).unwrap();
        first.join().unwrap().unwrap();
    });

    assert_eq!(fs.state(), GfsState::Idle);
    let outcome = fs.execute(CommitCommand::new("after")).unwrap();
    assert!(matches!(outcome, Outcome::Committed(_)));
}

#[test]
fn failure_leaves_status_and_worktree() {
    let fs = common::memory_fs();
    fs.write("kept.txt", b"kept").unwrap();
    let before = fs.status();

    let err = fs.execute(Failing).unwrap_err();
    assert!(matches!(err, Error::PathConflict(_)));
    assert!(!err.is_rejection());
    assert_eq!(fs.status(), before);
    assert_eq!(fs.state(), GfsState::Idle);
    assert!(fs.exists("kept.txt").unwrap());
}

#[test]
fn dirty_worktree_rejection_writes_nothing() {
    let fs = common::memory_fs();
    fs.write("dir/base.txt", b"base").unwrap();
    let head = fs.execute(CommitCommand::new("base")).unwrap().commit().unwrap().id;
    fs.store()
        .update_ref("refs/heads/topic", None, head, "branch: Created")
        .unwrap();
    fs.write("dir/pending", b"pending").unwrap();
    let objects = fs.store().object_count();

    let err = fs.execute(MergeCommand::new("topic")).unwrap_err();
    assert!(matches!(err, Error::DirtyWorktree));
    assert!(err.is_rejection());
    let err = fs.execute(CheckoutCommand::branch("topic")).unwrap_err();
    assert!(matches!(err, Error::DirtyWorktree));
    assert!(fs.has_changes().unwrap());
    assert_eq!(fs.store().object_count(), objects);
}

#[test]
fn rename_keeps_concurrent_writes() {
    let fs = common::memory_fs();
    fs.write("d/seed.txt", b"seed").unwrap();
    fs.flush().unwrap();
    let fs = &fs;

    std::thread::scope(|s| {
        let writer = s.spawn(move || {
            for i in 0..200 {
                fs.write(&format!("d/z{}", i), b"z").unwrap();
            }
        });
        fs.rename("d", "e").unwrap();
        writer.join().unwrap();
    });

    assert!(fs.exists("e/seed.txt").unwrap());
    for i in 0..200 {
        let moved = fs.exists(&format!("e/z{}", i)).unwrap();
        let stayed = fs.exists(&format!("d/z{}", i)).unwrap();
        assert!(moved || stayed, "z{} was lost", i);
    }
}

#[test]
fn panic_returns_to_idle() {
    let fs = common::memory_fs();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = fs.execute(Panicking);
    }));
    assert!(result.is_err());
    assert_eq!(fs.state(), GfsState::Idle);
    fs.write("after.txt", b"ok").unwrap();
}

#[test]
fn handles_are_independent() {
    let store = std::sync::Arc::new(MemoryStore::with_head("refs/heads/main"));
    let one = GitFileSystem::open_branch(store.clone(), "main").unwrap();
    let two = GitFileSystem::open_branch(store, "main").unwrap();
    let one = &one;

    std::thread::scope(|s| {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let busy = s.spawn(move || {
            one.execute(Blocking {
                started: started_tx,
                release: release_rx,
            })
        });
        started_rx.recv().unwrap();

        two.write("x", b"x").unwrap();
        assert!(two.execute(CommitCommand::new("from two")).is_ok());

        release_tx.send(()).unwrap();
        busy.join().unwrap().unwrap();
    });
}

#[test]
fn filesystem_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<GitFileSystem<GitStore>>();
    assert_send_sync::<GitFileSystem<MemoryStore>>();
}
