use crate::harness::TestWorkspace;
use depot_core::{RepoPath, Transaction};
use std::fs;
use std::sync::Barrier;
use std::thread;

#[test]
fn test_concurrent_identical_deploys_store_one_binary() {
    let workspace = TestWorkspace::from_fixture("default").unwrap();
    let depot = workspace.init_depot().unwrap();
    let barrier = Barrier::new(8);

    thread::scope(|s| {
        for i in 0..8 {
            let depot = &depot;
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                let path = format!("org/acme/copy{}/1.0/copy{}-1.0.jar", i, i);
                depot
                    .deploy("libs-release-local", &path, &b"identical payload"[..], None)
                    .unwrap();
            });
        }
    });

    let store = depot.binary_store();
    assert_eq!(store.list_all().unwrap().len(), 1);
    assert_eq!(fs::read_dir(store.staging_dir()).unwrap().count(), 0);
    assert_eq!(depot.item_store().list("libs-release-local").unwrap().len(), 8);
}

#[test]
fn test_transactions_are_isolated_until_commit() {
    let workspace = TestWorkspace::from_fixture("default").unwrap();
    let depot = workspace.init_depot().unwrap();
    let items = depot.item_store();
    let record = depot.binary_store().add_stream(&b"payload"[..]).unwrap();
    let path = RepoPath::new("libs-release-local", "a/b/c.jar");

    let mut writer = Transaction::begin();
    writer
        .write_item(items, &path)
        .unwrap()
        .set_binary(record, Some("writer"));

    // A second session sees nothing until the first commits
    let mut reader = Transaction::begin();
    assert!(reader.read_item(items, &path).unwrap().is_new());
    reader.rollback();

    assert_eq!(writer.commit().unwrap(), 1);

    let mut reader = Transaction::begin();
    let item = reader.read_item(items, &path).unwrap();
    assert!(!item.is_new());
    assert_eq!(item.metadata().modified_by.as_deref(), Some("writer"));
    assert_eq!(reader.commit().unwrap(), 0);
}
