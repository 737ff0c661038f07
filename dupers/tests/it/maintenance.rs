//! Index maintenance scenarios: clean, rename, compact, recovery.

use dupers::bucket;
use pathform::BucketName;
use store::{Mode, Store};

use crate::support::{open_store, write_file, Scripted};

#[test]
fn clean_removes_exactly_the_stale_entry() {
    let dir = tempfile::tempdir().expect("must create");
    let root = dir.path().join("x");
    let a = write_file(&root.join("a"), b"first");
    write_file(&root.join("b"), b"second");

    let store = open_store(dir.path());
    let ui = Scripted::new();
    let token = cancel::Token::new();
    let name = BucketName::new(&root).expect("must canonicalize");
    dupers::run::update(&store, &ui, &token, &name, false).expect("must update");
    assert_eq!(bucket::count(&store, &name).expect("must count"), 2);

    std::fs::remove_file(&a).expect("must delete");
    let report =
        bucket::clean(&store, &ui, std::slice::from_ref(&name), false).expect("must clean");
    assert_eq!(report.removed, 1);
    assert_eq!(bucket::count(&store, &name).expect("must count"), 1);

    // A second debug-mode pass reports that there is nothing left to do.
    assert!(matches!(
        bucket::clean(&store, &ui, std::slice::from_ref(&name), true),
        Err(dupers::Error::NothingToClean)
    ));
}

#[test]
fn rename_round_trip_restores_the_entry_set() {
    let dir = tempfile::tempdir().expect("must create");
    let store = open_store(dir.path());
    store.create_bucket("/p").expect("must create");
    for (key, value) in [("/p/a", [1u8; 32]), ("/p/b", [2u8; 32])] {
        store.put("/p", key, &value).expect("must put");
    }
    let snapshot_before = entries(&store, "/p");

    let p = BucketName::from_canonical("/p");
    let q = BucketName::from_canonical("/q");
    bucket::rename(&store, &p, &q).expect("must rename");
    assert!(!store.bucket_exists("/p").expect("must query"));
    assert_eq!(entries(&store, "/q").len(), 2);

    bucket::rename(&store, &q, &p).expect("must rename back");
    assert!(!store.bucket_exists("/q").expect("must query"));
    assert_eq!(entries(&store, "/p"), snapshot_before);
}

#[test]
fn rename_leaves_exactly_one_bucket() {
    // The store's single-transaction guarantee: after any rename outcome,
    // exactly one of the two names exists and holds the full entry set.
    let dir = tempfile::tempdir().expect("must create");
    let store = open_store(dir.path());
    store.create_bucket("/p").expect("must create");
    store.put("/p", "/p/only", &[9u8; 32]).expect("must put");

    let p = BucketName::from_canonical("/p");
    let q = BucketName::from_canonical("/q");
    bucket::rename(&store, &p, &q).expect("must rename");

    let p_exists = store.bucket_exists("/p").expect("must query");
    let q_exists = store.bucket_exists("/q").expect("must query");
    assert!(p_exists != q_exists, "exactly one name survives");
    assert_eq!(entries(&store, "/q").len(), 1);
}

#[test]
fn compact_preserves_entries_and_shrinks_garbage() {
    let dir = tempfile::tempdir().expect("must create");
    let db_path = dir.path().join("index.db");
    {
        let store = Store::open(&db_path, Mode::ReadWrite).expect("must open");
        store.create_bucket("/b").expect("must create");
        // Write and delete a lot to leave slack pages behind.
        for i in 0..500u32 {
            store
                .put("/b", &format!("/b/f{i:04}"), &[1u8; 32])
                .expect("must put");
        }
        for i in 100..500u32 {
            store.delete("/b", &format!("/b/f{i:04}")).expect("must delete");
        }

        let ui = Scripted::new();
        let copied = bucket::compact(store, &ui).expect("must compact");
        assert_eq!(copied, 100);
    }

    let reopened = Store::open(&db_path, Mode::ReadWrite).expect("must reopen");
    assert_eq!(reopened.count("/b").expect("must count"), 100);
    assert!(reopened
        .get("/b", "/b/f0042")
        .expect("must get")
        .is_some());
}

#[test]
fn zero_byte_database_recovers_to_an_empty_index() {
    let dir = tempfile::tempdir().expect("must create");
    let db_path = dir.path().join("index.db");
    {
        let store = Store::open(&db_path, Mode::ReadWrite).expect("must open");
        store.create_bucket("/b").expect("must create");
    }
    std::fs::write(&db_path, b"").expect("must truncate");

    let store = Store::open(&db_path, Mode::ReadWrite).expect("must recover");
    assert!(store.recovered());
    assert!(store.is_empty().expect("must query"));

    // And the recovered database is fully usable.
    let report = bucket::info(&store).expect("must report");
    assert!(report.contains("no buckets"));
}

#[test]
fn backup_copies_the_live_file() {
    let dir = tempfile::tempdir().expect("must create");
    let store = open_store(dir.path());
    store.create_bucket("/b").expect("must create");
    store.put("/b", "/b/f", &[5u8; 32]).expect("must put");

    // The backup lands in the real home directory; tidied up below.
    let config = dupers::config::Config::new(false, false, true, true)
        .expect("must configure");
    let (bytes, dest) = bucket::backup(&store, &config).expect("must back up");
    assert!(bytes > 0);
    assert!(dest.exists());
    let name = dest.file_name().expect("has name").to_string_lossy().into_owned();
    assert!(name.starts_with("dupers-backup-"));
    assert!(name.ends_with(".db"));
    std::fs::remove_file(&dest).expect("must tidy up");
}

fn entries(store: &Store, bucket: &str) -> Vec<(String, Vec<u8>)> {
    let mut out = Vec::new();
    store
        .for_each(bucket, |key, value| {
            out.push((key.to_owned(), value.to_vec()));
        })
        .expect("must iterate");
    out
}
