//! The comparison engine.
//!
//! Duplicate detection is a two-phase affair: the target buckets are loaded
//! into an in-memory compare table keyed by digest, then each source file is
//! hashed and looked up. A hit on a different path is a duplicate.
//!
//! When buckets overlap, the table keeps the most recently inserted path for
//! a digest: buckets are loaded in ascending name order and entries in
//! ascending key order, so the surviving representative is deterministic.

use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

use cancel::Token;
use checksum::Digest;
use log::debug;
use pathform::BucketName;
use store::Store;

use crate::{
    ui::{Answer, Feedback, Stage},
    worker, Error, Result,
};

/// The ephemeral digest → indexed-path table built from one or more buckets.
pub type CompareTable = HashMap<Digest, PathBuf>;

/// One reported duplicate: a source file whose content is already indexed
/// at a different path.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Duplicate {
    /// The file under the source path being checked.
    pub source: PathBuf,

    /// The indexed path holding the same content.
    pub target: PathBuf,
}

/// Load every entry of `buckets` into `table`, most recent insertion
/// winning on digest collisions. Returns the number of entries read.
pub fn load_table(
    store: &Store,
    ui: &dyn Feedback,
    buckets: &[BucketName],
    table: &mut CompareTable,
) -> Result<u64> {
    let snapshot = store.snapshot()?;
    let mut read = 0u64;
    for bucket in buckets {
        let mut malformed = 0u64;
        snapshot.for_each(bucket.as_str(), |key, value| {
            match Digest::from_bytes(value) {
                Ok(digest) => {
                    table.insert(digest, PathBuf::from(key));
                    read += 1;
                    if read % 1000 == 0 {
                        ui.status(Stage::Reading, read, None);
                    }
                }
                Err(_) => malformed += 1,
            }
        })?;
        if malformed > 0 {
            ui.warn(&format!(
                "{malformed} malformed digest(s) in {bucket} ignored"
            ));
        }
    }
    Ok(read)
}

/// Hash every source file and report the ones whose digest is indexed at a
/// different path. Sources are visited in the given order; the reported
/// target is whichever path the table holds at lookup time.
pub fn find(
    sources: &[PathBuf],
    table: &CompareTable,
    pool: &worker::Pool,
    ui: &dyn Feedback,
    token: &Token,
) -> Result<Vec<Duplicate>> {
    let total = sources.len() as u64;
    let mut dupes = Vec::new();
    for (looked, source) in sources.iter().enumerate() {
        if token.check_cancel().is_err() {
            break;
        }
        ui.status(Stage::Looking, looked as u64 + 1, Some(total));

        let digest = match pool.hash(source) {
            Ok(digest) => digest,
            Err(err) => {
                ui.warn(&format!("skipping {source:?}: {err}"));
                continue;
            }
        };
        if digest.is_zero() {
            continue;
        }
        push_hit(&mut dupes, table, source, digest);
    }
    Ok(dupes)
}

/// The fast variant: no hashing at all. Each source path is looked up in
/// the buckets that contain it and its stored digest is compared against
/// the table. Sources outside every bucket prefix are skipped.
pub fn find_fast(
    sources: &[PathBuf],
    table: &CompareTable,
    store: &Store,
    buckets: &[BucketName],
    ui: &dyn Feedback,
) -> Result<Vec<Duplicate>> {
    let snapshot = store.snapshot()?;
    let total = sources.len() as u64;
    let mut dupes = Vec::new();
    for (looked, source) in sources.iter().enumerate() {
        ui.status(Stage::Looking, looked as u64 + 1, Some(total));
        let key = pathform::key(source);
        for bucket in buckets.iter().filter(|bucket| bucket.contains(&key)) {
            let Some(value) = snapshot.get(bucket.as_str(), &key)? else {
                continue;
            };
            let Ok(digest) = Digest::from_bytes(&value) else {
                continue;
            };
            push_hit(&mut dupes, table, source, digest);
            break;
        }
    }
    Ok(dupes)
}

fn push_hit(dupes: &mut Vec<Duplicate>, table: &CompareTable, source: &Path, digest: Digest) {
    if let Some(target) = table.get(&digest) {
        let source_key = pathform::key(source);
        if target.as_path() != Path::new(&source_key) {
            dupes.push(Duplicate {
                source: source.to_owned(),
                target: target.clone(),
            });
        }
    }
}

/// Delete every reported duplicate source from disk. Per-file failures are
/// soft. Returns the number of files removed.
pub fn remove_files(dupes: &[Duplicate], ui: &dyn Feedback) -> u64 {
    let mut removed = 0;
    for dupe in dupes {
        match fs::remove_file(&dupe.source) {
            Ok(()) => {
                ui.println(&format!("removed {:?}", dupe.source));
                removed += 1;
            }
            Err(err) => ui.warn(&format!("cannot remove {:?}: {err}", dupe.source)),
        }
    }
    removed
}

/// Remove directories under `root` that are left empty, deepest first.
/// Returns the number of directories removed.
pub fn prune_empty_dirs(root: &Path) -> Result<u64> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    for entry in walkdir::WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_dir() && entry.depth() > 0 {
            dirs.push(entry.into_path());
        }
    }
    // Deepest first so emptied parents become removable in the same pass.
    dirs.sort_by_key(|dir| std::cmp::Reverse(dir.components().count()));

    let mut removed = 0;
    for dir in dirs {
        // Failure means not empty or already gone; both fine.
        if fs::remove_dir(&dir).is_ok() {
            debug!("removed empty directory {dir:?}");
            removed += 1;
        }
    }
    Ok(removed)
}

/// The opt-in purge: delete every duplicate under `root` except Windows
/// program files, then prune emptied directories. Asks for confirmation
/// first and returns [`Error::Aborted`] when declined.
///
/// Only on-disk file names gate the executable exemption; archive members
/// are not consulted.
pub fn sensen(root: &Path, dupes: &[Duplicate], ui: &dyn Feedback) -> Result<u64> {
    let question = format!(
        "Delete every duplicate under {root:?}, keeping only unique files and Windows programs?"
    );
    if !ui.confirm(&question, Answer::No) {
        return Err(Error::Aborted);
    }

    let doomed: HashSet<&Path> = dupes
        .iter()
        .filter(|dupe| !is_program(&dupe.source))
        .map(|dupe| dupe.source.as_path())
        .collect();

    let mut removed = 0;
    for path in &doomed {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(err) => ui.warn(&format!("cannot remove {path:?}: {err}")),
        }
    }
    prune_empty_dirs(root)?;
    Ok(removed)
}

fn is_program(path: &Path) -> bool {
    match path.extension() {
        Some(ext) => {
            let folded = ext.to_string_lossy().to_lowercase();
            folded == "com" || folded == "exe"
        }
        None => false,
    }
}
