//! Bucket maintenance: count, clean, compact, backup, rename, info, ls.
//!
//! These are the housekeeping operations around the index. They share a
//! propagation policy: a problem with one bucket or one entry is reported
//! through the feedback collaborator and the loop continues; only failures
//! of the store itself end the operation.

use std::{
    fs,
    path::{Path, PathBuf},
};

use checksum::Digest;
use log::debug;
use num_format::{Locale, ToFormattedString};
use pathform::BucketName;
use store::Store;
use time::{macros::format_description, OffsetDateTime};

use crate::{config::Config, ui::Feedback, Error, Result};

/// Stale-entry deletions are applied in write transactions of this many
/// entries, so a crawl-sized clean does not hold the write lock for the
/// whole pass.
const CLEAN_BATCH: usize = 512;

/// A database file larger than this is eligible for the compaction
/// recommendation in `info`.
const COMPACT_MIN_BYTES: u64 = 1024 * 1024;

/// The recommendation triggers when the file exceeds its leaf bytes by
/// this factor.
const COMPACT_SLACK: f64 = 1.5;

/// Map a store-level missing bucket onto the operation-level error.
fn map_bucket(err: store::Error) -> Error {
    match err {
        store::Error::BucketNotFound { name } => Error::BucketNotFound { name },
        other => Error::Store(other),
    }
}

/// The number of entries in the named bucket.
pub fn count(store: &Store, name: &BucketName) -> Result<u64> {
    store.count(name.as_str()).map_err(map_bucket)
}

/// Every entry of the named bucket in key order.
pub fn ls(store: &Store, name: &BucketName) -> Result<Vec<(String, Digest)>> {
    let mut entries = Vec::new();
    store
        .for_each(name.as_str(), |key, value| {
            if let Ok(digest) = Digest::from_bytes(value) {
                entries.push((key.to_owned(), digest));
            }
        })
        .map_err(map_bucket)?;
    Ok(entries)
}

/// What a clean pass did.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default)]
pub struct CleanReport {
    /// Buckets inspected.
    pub buckets: u64,

    /// Stale entries removed.
    pub removed: u64,
}

/// Remove entries whose files no longer exist on disk.
///
/// Inspects the named buckets, or every bucket when none are given. A
/// bucket whose root directory is missing or is no longer a directory is
/// reported and skipped, never deleted. With `debug` set, a pass that
/// removed nothing is reported as [`Error::NothingToClean`].
pub fn clean(
    store: &Store,
    ui: &dyn Feedback,
    names: &[BucketName],
    debug: bool,
) -> Result<CleanReport> {
    let targets: Vec<BucketName> = if names.is_empty() {
        store
            .buckets()?
            .into_iter()
            .map(BucketName::from_canonical)
            .collect()
    } else {
        names.to_vec()
    };

    let mut report = CleanReport::default();
    for bucket in &targets {
        match bucket.as_path().symlink_metadata() {
            Err(_) => {
                ui.warn(&format!("bucket directory is missing: {bucket}"));
                continue;
            }
            Ok(meta) if !meta.is_dir() => {
                ui.warn(&format!("bucket is not a directory: {bucket}"));
                continue;
            }
            Ok(_) => {}
        }
        report.buckets += 1;
        report.removed += clean_bucket(store, ui, bucket)?;
    }

    if report.removed == 0 && debug {
        return Err(Error::NothingToClean);
    }
    Ok(report)
}

fn clean_bucket(store: &Store, ui: &dyn Feedback, bucket: &BucketName) -> Result<u64> {
    let mut stale = Vec::new();
    store
        .for_each(bucket.as_str(), |key, _| {
            if is_stale(Path::new(key)) {
                stale.push(key.to_owned());
            }
        })
        .map_err(map_bucket)?;
    debug!("{} stale entr(ies) in {bucket}", stale.len());

    let mut removed = 0;
    for chunk in stale.chunks(CLEAN_BATCH) {
        let mut batch = store.batch()?;
        for key in chunk {
            if batch.delete(bucket.as_str(), key)? {
                removed += 1;
            }
        }
        batch.commit()?;
    }
    if removed > 0 {
        ui.println(&format!("removed {removed} stale entr(ies) from {bucket}"));
    }
    Ok(removed)
}

/// An entry is stale when its file is definitely gone: the stat reports
/// not-found and the parent has vanished, stopped being a directory, or is
/// a directory that genuinely lacks the file. A transient stat failure on
/// a still-valid parent keeps the entry.
fn is_stale(path: &Path) -> bool {
    match path.symlink_metadata() {
        Ok(_) => false,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => match path.parent() {
            None => true,
            Some(parent) => match parent.symlink_metadata() {
                Err(_) => true,
                Ok(meta) => !meta.is_dir() || !path.exists(),
            },
        },
        Err(_) => false,
    }
}

/// Rewrite the database densely: compact into a sibling temp file, close
/// the source, and copy the temp file over it. Consumes the store handle
/// because the file must be closed for the swap.
///
/// Returns the number of entries carried over.
pub fn compact(store: Store, ui: &dyn Feedback) -> Result<u64> {
    let path = store.path().to_owned();
    let temp = path.with_extension("compact");
    if temp.exists() {
        fs::remove_file(&temp)?;
    }

    let before = store.size_on_disk()?;
    let copied = store.compact_into(&temp)?;
    drop(store);

    fs::copy(&temp, &path)?;
    fs::remove_file(&temp)?;
    let after = fs::metadata(&path)?.len();
    ui.println(&format!(
        "compacted {} → {} bytes ({} entr(ies))",
        before.to_formatted_string(&Locale::en),
        after.to_formatted_string(&Locale::en),
        copied.to_formatted_string(&Locale::en),
    ));
    Ok(copied)
}

/// Copy the live database file into the user's home directory under a
/// timestamped name. Returns the bytes written and the destination.
pub fn backup(store: &Store, config: &Config) -> Result<(u64, PathBuf)> {
    let dest = config
        .home()
        .join(format!("dupers-backup-{}.db", timestamp()));
    let written = fs::copy(store.path(), &dest)?;
    Ok((written, dest))
}

/// Rename bucket `old` to `new` inside one write transaction.
///
/// Fails with [`Error::BucketNotFound`] when `old` is absent and with
/// [`Error::Conflict`] when `new` already exists.
pub fn rename(store: &Store, old: &BucketName, new: &BucketName) -> Result<u64> {
    if store.bucket_exists(new.as_str())? {
        return Err(Error::Conflict {
            name: new.as_str().to_owned(),
        });
    }
    store
        .rename_bucket(old.as_str(), new.as_str())
        .map_err(map_bucket)
}

/// A tabular report of the database file and its buckets.
pub fn info(store: &Store) -> Result<String> {
    use std::fmt::Write as _;

    let size = store.size_on_disk()?;
    let stats = store.stats()?;
    let mut out = String::new();

    let _ = writeln!(out, "Database: {}", store.path().display());
    let _ = writeln!(
        out,
        "Read-only: {}",
        match store.mode() {
            store::Mode::ReadOnly => "yes",
            store::Mode::ReadWrite => "no",
        }
    );
    let _ = writeln!(out, "Size: {} bytes", size.to_formatted_string(&Locale::en));

    if stats.is_empty() {
        let _ = writeln!(out, "The database contains no buckets.");
        return Ok(out);
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "{:>10}  {:>12}  Bucket", "Items", "Bytes");
    let mut leaf_total = 0u64;
    for bucket in &stats {
        leaf_total += bucket.stored_bytes;
        let _ = writeln!(
            out,
            "{:>10}  {:>12}  {}",
            bucket.keys.to_formatted_string(&Locale::en),
            bucket.stored_bytes.to_formatted_string(&Locale::en),
            bucket.name,
        );
    }

    if size > COMPACT_MIN_BYTES && size as f64 > leaf_total as f64 * COMPACT_SLACK {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "The file is much larger than its content; consider `dupers db compact`."
        );
    }
    Ok(out)
}

pub(crate) fn timestamp() -> String {
    let fmt = format_description!("[year][month][day]-[hour][minute][second]");
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&fmt)
        .unwrap_or_else(|_| String::from("00000000-000000"))
}
