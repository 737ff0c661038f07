//! CSV export and import of buckets.
//!
//! The on-disk format is RFC 4180 CSV with LF line endings. The first line
//! is a header carrying the bucket's canonical directory path:
//!
//! ```text
//! sha256_sum,path#/home/ben/docs
//! 1a1d…8f22,report.pdf
//! ```
//!
//! Every following row is a 64-hex digest and the entry's path relative to
//! the bucket. On import the header path is translated into the current
//! platform's form, so an export made on Windows loads on POSIX and vice
//! versa.

use std::path::{Path, PathBuf};

use checksum::Digest;
use log::debug;
use pathform::BucketName;
use store::Store;

use crate::{
    bucket::timestamp,
    config::Config,
    ui::{Answer, Feedback},
    Error, Result,
};

/// The first header field.
const HEADER_SUM: &str = "sha256_sum";

/// The prefix of the second header field; the bucket path follows it.
const HEADER_PATH: &str = "path#";

/// The full literal prefix the first line must begin with.
pub const HEADER_PREFIX: &str = "sha256_sum,path#";

/// Imported entries are written in transactions of this many rows.
const IMPORT_BATCH: usize = 50_000;

/// Write the bucket out as CSV. With no explicit destination the file lands
/// in the user's home directory under a timestamped name.
///
/// Returns the destination and the number of rows written.
pub fn export(
    store: &Store,
    config: &Config,
    bucket: &BucketName,
    dest: Option<PathBuf>,
) -> Result<(PathBuf, u64)> {
    let dest = dest.unwrap_or_else(|| {
        config
            .home()
            .join(format!("dupers-export-{}.csv", timestamp()))
    });
    let entries = crate::bucket::ls(store, bucket)?;

    let mut writer = csv::Writer::from_path(&dest)?;
    writer.write_record([HEADER_SUM.to_owned(), format!("{HEADER_PATH}{bucket}")])?;

    let mut rows = 0;
    for (key, digest) in entries {
        let Some(rel) = bucket.strip(Path::new(&key)) else {
            debug!("entry outside bucket prefix not exported: {key}");
            continue;
        };
        writer.write_record([digest.to_string(), rel.to_string_lossy().into_owned()])?;
        rows += 1;
    }
    writer.flush()?;
    Ok((dest, rows))
}

/// Read a CSV export back into the index.
///
/// The header's bucket path is translated to the platform form and proposed
/// as the target bucket; when that bucket already exists the collaborator
/// decides whether to append or name another. A malformed first data row
/// fails the import; later malformed rows are skipped.
///
/// Returns the bucket imported into and the number of entries written.
pub fn import(store: &Store, ui: &dyn Feedback, file: &Path) -> Result<(BucketName, u64)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(file)?;
    let mut records = reader.records();

    let header = match records.next() {
        Some(record) => record?,
        None => {
            return Err(Error::InvalidHeader {
                path: file.to_owned(),
                expected: HEADER_PREFIX,
            })
        }
    };
    let proposed = parse_header(&header).ok_or_else(|| Error::InvalidHeader {
        path: file.to_owned(),
        expected: HEADER_PREFIX,
    })?;

    let mut entries: Vec<(Digest, String)> = Vec::new();
    let mut skipped = 0u64;
    for (index, record) in records.enumerate() {
        let parsed = record
            .map_err(Error::Csv)
            .and_then(|record| parse_row(&record));
        match parsed {
            Ok(entry) => entries.push(entry),
            Err(err) if index == 0 => {
                return Err(Error::InvalidRow {
                    detail: err.to_string(),
                })
            }
            Err(err) => {
                debug!("skipping malformed row {}: {err}", index + 2);
                skipped += 1;
            }
        }
    }
    if skipped > 0 {
        ui.warn(&format!("{skipped} malformed row(s) skipped"));
    }

    let bucket = resolve_bucket(store, ui, proposed)?;
    store.create_bucket(bucket.as_str())?;

    let mut imported = 0u64;
    for chunk in entries.chunks(IMPORT_BATCH) {
        let mut batch = store.batch()?;
        for (digest, rel) in chunk {
            let joined = bucket.join(rel);
            if !joined.is_absolute() {
                return Err(Error::NotAbsolute { path: joined });
            }
            let key = pathform::key(&joined);
            if !bucket.contains(&key) {
                debug!("row escapes the bucket, skipped: {rel}");
                skipped += 1;
                continue;
            }
            batch.put(bucket.as_str(), &key, digest.as_bytes())?;
            imported += 1;
        }
        batch.commit()?;
    }
    Ok((bucket, imported))
}

/// Extract and canonicalize the bucket path from the header record.
fn parse_header(record: &csv::StringRecord) -> Option<BucketName> {
    if record.get(0)? != HEADER_SUM {
        return None;
    }
    let raw = record.get(1)?.strip_prefix(HEADER_PATH)?;
    if raw.is_empty() {
        return None;
    }
    let native = pathform::native_form(raw);
    BucketName::new(&native).ok()
}

/// Parse one data row into a digest and a relative path.
fn parse_row(record: &csv::StringRecord) -> Result<(Digest, String)> {
    let sum = record.get(0).unwrap_or_default();
    let rel = record.get(1).unwrap_or_default();
    let digest: Digest = sum.parse().map_err(|err| Error::InvalidRow {
        detail: format!("{err}"),
    })?;
    if digest.is_zero() {
        return Err(Error::InvalidRow {
            detail: String::from("zero digest"),
        });
    }
    if rel.is_empty() {
        return Err(Error::InvalidRow {
            detail: String::from("empty path"),
        });
    }
    let rel = native_separators(rel);
    if Path::new(&rel).is_absolute() {
        return Err(Error::InvalidRow {
            detail: format!("path is not relative: {rel}"),
        });
    }
    Ok((digest, rel))
}

/// Rewrite the separators of a relative path for the current platform.
fn native_separators(rel: &str) -> String {
    if cfg!(windows) {
        rel.replace('/', "\\")
    } else {
        rel.replace('\\', "/")
    }
}

/// Settle which bucket the rows land in. An existing bucket may be appended
/// to, or the collaborator names another; an empty reply aborts.
fn resolve_bucket(store: &Store, ui: &dyn Feedback, proposed: BucketName) -> Result<BucketName> {
    let mut bucket = proposed;
    loop {
        if !store.bucket_exists(bucket.as_str())? {
            return Ok(bucket);
        }
        let question = format!("Bucket {bucket} already exists; append to it?");
        if ui.confirm(&question, Answer::Yes) {
            return Ok(bucket);
        }
        let reply = ui.prompt("Import into which directory instead?");
        if reply.is_empty() {
            return Err(Error::Aborted);
        }
        bucket = BucketName::new(&reply)?;
    }
}
