//! End-to-end duplicate detection and search scenarios.

use std::path::PathBuf;

use cancel::Token;
use dupers::{run, search};
use pathform::BucketName;

use crate::support::{open_store, write_file, Scripted};

#[test]
fn duplicate_across_two_buckets() {
    let dir = tempfile::tempdir().expect("must create");
    let b1 = dir.path().join("b1");
    let b2 = dir.path().join("b2");
    write_file(&b1.join("file"), b"identical content everywhere");
    write_file(&b2.join("file"), b"identical content everywhere");

    let store = open_store(dir.path());
    let ui = Scripted::new();
    let token = Token::new();

    let bucket1 = BucketName::new(&b1).expect("must canonicalize");
    let bucket2 = BucketName::new(&b2).expect("must canonicalize");
    run::update(&store, &ui, &token, &bucket1, false).expect("must update b1");
    run::update(&store, &ui, &token, &bucket2, false).expect("must update b2");

    let report = run::dupe(
        &store,
        &ui,
        &token,
        &b1.join("file"),
        std::slice::from_ref(&bucket2),
        run::DupeOptions::default(),
    )
    .expect("must dupe");

    assert_eq!(report.duplicates.len(), 1, "exactly one match");
    assert_eq!(report.duplicates[0].source, b1.join("file"));
    assert_eq!(
        report.duplicates[0].target,
        PathBuf::from(pathform::key(&b2.join("file")))
    );
}

#[test]
fn caseless_basename_search_finds_mixed_case() {
    let dir = tempfile::tempdir().expect("must create");
    let root = dir.path().join("Alpha");
    write_file(&root.join("Report.PDF"), b"quarterly numbers");

    let store = open_store(dir.path());
    let ui = Scripted::new();
    let token = Token::new();
    let bucket = BucketName::new(&root).expect("must canonicalize");
    run::update(&store, &ui, &token, &bucket, false).expect("must update");

    let named = vec![bucket.clone()];
    let caseless = search::Options::builder().basename(true).build();
    let matches = search::search(&store, "report.pdf", &named, caseless).expect("must search");
    assert_eq!(matches.len(), 1);
    assert!(matches
        .keys()
        .next()
        .expect("one match")
        .ends_with("Report.PDF"));

    let exact = search::Options::builder().basename(true).exact(true).build();
    let matches = search::search(&store, "report.pdf", &named, exact).expect("must search");
    assert!(matches.is_empty(), "exact search respects case");
}

#[test]
fn delete_removes_duplicates_from_disk() {
    let dir = tempfile::tempdir().expect("must create");
    let indexed = dir.path().join("indexed");
    let incoming = dir.path().join("incoming");
    write_file(&indexed.join("original.txt"), b"payload");
    let copy = write_file(&incoming.join("copy.txt"), b"payload");
    let unique = write_file(&incoming.join("unique.txt"), b"one of a kind");

    let store = open_store(dir.path());
    let ui = Scripted::new();
    let token = Token::new();
    let bucket = BucketName::new(&indexed).expect("must canonicalize");
    run::update(&store, &ui, &token, &bucket, false).expect("must update");

    let report = run::dupe(
        &store,
        &ui,
        &token,
        &incoming,
        std::slice::from_ref(&bucket),
        run::DupeOptions::builder().delete(true).build(),
    )
    .expect("must dupe");

    assert_eq!(report.duplicates.len(), 1);
    assert!(!copy.exists(), "the duplicate is gone");
    assert!(unique.exists(), "the unique file survives");
}

#[test]
#[cfg(unix)]
fn crawl_continues_past_an_unreadable_file() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().expect("must create");
    let root = dir.path().join("mixed");
    let readable = write_file(&root.join("readable.txt"), b"fine");
    let unreadable = write_file(&root.join("unreadable.txt"), b"hidden");
    std::fs::set_permissions(&unreadable, std::fs::Permissions::from_mode(0o000))
        .expect("must chmod");

    let store = open_store(dir.path());
    let ui = Scripted::new();
    let token = Token::new();
    let bucket = BucketName::new(&root).expect("must canonicalize");

    // The crawl must succeed regardless of the unreadable file.
    run::update(&store, &ui, &token, &bucket, false).expect("must update");
    let key = pathform::key(&readable);
    assert!(
        store
            .get(bucket.as_str(), &key)
            .expect("must get")
            .is_some(),
        "the readable file is indexed"
    );
}

#[test]
#[cfg(unix)]
fn crawl_does_not_follow_symlinks() {
    let dir = tempfile::tempdir().expect("must create");
    let outside = write_file(&dir.path().join("outside.txt"), b"outside content");
    let root = dir.path().join("linked");
    std::fs::create_dir(&root).expect("must create");
    std::os::unix::fs::symlink(&outside, root.join("link.txt")).expect("must link");
    write_file(&root.join("real.txt"), b"inside content");

    let store = open_store(dir.path());
    let ui = Scripted::new();
    let token = Token::new();
    let bucket = BucketName::new(&root).expect("must canonicalize");
    run::update(&store, &ui, &token, &bucket, false).expect("must update");

    assert_eq!(
        store.count(bucket.as_str()).expect("must count"),
        1,
        "only the regular file is indexed"
    );
}
