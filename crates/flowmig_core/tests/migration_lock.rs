use flowmig_core::{
    apply_migrations, FileProject, MigrationLock, MigrationRegistry, MigrationStep, Project,
    SchemaVersion, MIGRATION_LOCK_FILE_NAME,
};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn concurrent_runs_on_same_project_apply_step_once() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("signac.rc"),
        "project = \"demo\"\n[flow]\nschema_version = \"0\"\n",
    )
    .unwrap();

    let active = Arc::new(AtomicUsize::new(0));
    let max_active = Arc::new(AtomicUsize::new(0));
    let applied = Arc::new(AtomicUsize::new(0));
    let registry = {
        let active = Arc::clone(&active);
        let max_active = Arc::clone(&max_active);
        let applied = Arc::clone(&applied);
        MigrationRegistry::new()
            .with_step(MigrationStep::new(
                SchemaVersion::major(0),
                SchemaVersion::major(1),
                move |_| {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_active.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(150));
                    applied.fetch_add(1, Ordering::SeqCst);
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                },
            ))
            .unwrap()
    };

    let barrier = Barrier::new(2);
    let reported = thread::scope(|scope| {
        let workers = (0..2)
            .map(|_| {
                scope.spawn(|| {
                    let mut project = FileProject::open(dir.path()).unwrap();
                    barrier.wait();
                    let events = apply_migrations(&mut project, &registry, &SchemaVersion::major(1))
                        .unwrap()
                        .collect::<Result<Vec<_>, _>>()
                        .unwrap();
                    assert_eq!(
                        project.config().schema_version().unwrap(),
                        SchemaVersion::major(1)
                    );
                    events.len()
                })
            })
            .collect::<Vec<_>>();
        workers
            .into_iter()
            .map(|worker| worker.join().unwrap())
            .sum::<usize>()
    });

    assert_eq!(reported, 1);
    assert_eq!(applied.load(Ordering::SeqCst), 1);
    assert_eq!(max_active.load(Ordering::SeqCst), 1);
    assert!(!dir.path().join(MIGRATION_LOCK_FILE_NAME).exists());
}

#[test]
fn second_acquirer_blocks_until_first_releases() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let (acquired_tx, acquired_rx) = mpsc::channel();

    let first = MigrationLock::acquire(&root).unwrap();
    let waiter = {
        let root = root.clone();
        thread::spawn(move || {
            let started = Instant::now();
            let guard = MigrationLock::acquire(&root).unwrap();
            acquired_tx.send(started.elapsed()).unwrap();
            drop(guard);
        })
    };

    assert!(acquired_rx
        .recv_timeout(Duration::from_millis(200))
        .is_err());
    drop(first);

    let waited = acquired_rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert!(waited >= Duration::from_millis(100));
    waiter.join().unwrap();
    assert!(!root.join(MIGRATION_LOCK_FILE_NAME).exists());
}
