//! CSV export/import scenarios, including the interactive bucket choice.

use dupers::{bucket, export};
use pathform::BucketName;

use crate::support::{open_store, write_file, Scripted};

#[test]
fn export_delete_import_round_trip() {
    let dir = tempfile::tempdir().expect("must create");
    let docs = dir.path().join("docs");
    write_file(&docs.join("a.txt"), b"alpha");
    write_file(&docs.join("b.txt"), b"bravo");
    write_file(&docs.join("sub/c.txt"), b"charlie");

    let store = open_store(dir.path());
    let ui = Scripted::new();
    let token = cancel::Token::new();
    let name = BucketName::new(&docs).expect("must canonicalize");
    dupers::run::update(&store, &ui, &token, &name, false).expect("must update");
    assert_eq!(bucket::count(&store, &name).expect("must count"), 3);

    let before = bucket::ls(&store, &name).expect("must list");
    let config = dupers::config::Config::new(false, false, true, true)
        .expect("must configure");
    let dest = dir.path().join("docs.csv");
    let (_, rows) =
        export::export(&store, &config, &name, Some(dest.clone())).expect("must export");
    assert_eq!(rows, 3);

    store.delete_bucket(name.as_str()).expect("must drop");
    let (imported_into, imported) = export::import(&store, &ui, &dest).expect("must import");
    assert_eq!(imported_into.as_str(), name.as_str());
    assert_eq!(imported, 3);

    let after = bucket::ls(&store, &name).expect("must list");
    assert_eq!(before, after, "every (path, digest) pair survives");
}

#[test]
fn import_into_an_existing_bucket_can_choose_another_name() {
    let dir = tempfile::tempdir().expect("must create");
    let docs = dir.path().join("docs");
    write_file(&docs.join("a.txt"), b"alpha");

    let store = open_store(dir.path());
    let ui = Scripted::new();
    let token = cancel::Token::new();
    let name = BucketName::new(&docs).expect("must canonicalize");
    dupers::run::update(&store, &ui, &token, &name, false).expect("must update");

    let config = dupers::config::Config::new(false, false, true, true)
        .expect("must configure");
    let dest = dir.path().join("docs.csv");
    export::export(&store, &config, &name, Some(dest.clone())).expect("must export");

    // Decline appending to the existing bucket, then name a different one.
    let elsewhere = dir.path().join("elsewhere");
    ui.push_confirm(false);
    ui.push_prompt(&elsewhere.display().to_string());

    let (imported_into, imported) = export::import(&store, &ui, &dest).expect("must import");
    assert_eq!(
        imported_into.as_str(),
        BucketName::new(&elsewhere).expect("must canonicalize").as_str()
    );
    assert_eq!(imported, 1);
    assert_eq!(bucket::count(&store, &name).expect("must count"), 1);
    assert_eq!(
        bucket::count(&store, &imported_into).expect("must count"),
        1
    );
}

#[test]
fn import_appends_to_an_existing_bucket_by_default() {
    let dir = tempfile::tempdir().expect("must create");
    let docs = dir.path().join("docs");
    write_file(&docs.join("a.txt"), b"alpha");

    let store = open_store(dir.path());
    let ui = Scripted::new();
    let token = cancel::Token::new();
    let name = BucketName::new(&docs).expect("must canonicalize");
    dupers::run::update(&store, &ui, &token, &name, false).expect("must update");

    let config = dupers::config::Config::new(false, false, true, true)
        .expect("must configure");
    let dest = dir.path().join("docs.csv");
    export::export(&store, &config, &name, Some(dest.clone())).expect("must export");

    // No scripted answers: the default for "append?" is yes.
    let (imported_into, _) = export::import(&store, &ui, &dest).expect("must import");
    assert_eq!(imported_into.as_str(), name.as_str());
    assert_eq!(bucket::count(&store, &name).expect("must count"), 1);
}
