//! The filesystem crawler.
//!
//! Walks a bucket's root directory depth-first in a deterministic order,
//! skipping system and metadata clutter, and feeds every surviving regular
//! file to the hash worker. Files already present in the bucket are not
//! re-hashed; their stored digests are recycled into the compare table.
//!
//! Permission-denied entries are skipped silently. Any other traversal error
//! is fatal to the crawl.

use std::{collections::HashMap, path::{Path, PathBuf}};

use cancel::Token;
use checksum::Digest;
use log::debug;
use pathform::BucketName;
use store::Store;
use walkdir::{DirEntry, WalkDir};

use crate::{
    archive,
    compare::CompareTable,
    ui::{Feedback, Stage},
    worker, Error, Result,
};

/// Directory names whose whole subtree is never indexed. Compared
/// case-insensitively.
const SKIP_DIRS: &[&str] = &[
    ".cache",
    ".config",
    ".git",
    ".local",
    "__macosx",
    "appdata",
    "node_modules",
];

/// File names that are never indexed. Compared case-insensitively.
const SKIP_FILES: &[&str] = &[
    ".ds_store",
    ".trashes",
    "desktop.ini",
    "hiberfil.sys",
    "ntuser.dat",
    "pagefile.sys",
    "swapfile.sys",
    "thumbs.db",
];

/// Reports whether a directory with this name is skipped entirely.
pub(crate) fn skip_dir(name: &str) -> bool {
    if name.starts_with('.') {
        return true;
    }
    if cfg!(windows) && name.starts_with('$') {
        return true;
    }
    let folded = name.to_lowercase();
    SKIP_DIRS.iter().any(|skip| *skip == folded)
}

/// Reports whether a file with this name is skipped.
pub(crate) fn skip_file(name: &str) -> bool {
    if name.starts_with("._") {
        return true;
    }
    let folded = name.to_lowercase();
    SKIP_FILES.iter().any(|skip| *skip == folded)
}

fn keep_entry(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    let name = entry.file_name().to_string_lossy();
    if entry.file_type().is_dir() {
        !skip_dir(&name)
    } else {
        !skip_file(&name)
    }
}

/// Build the deterministic walker shared by the crawler and the comparator.
fn walker(root: &Path) -> walkdir::IntoIter {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
}

/// Decide what to do with a traversal error: permission denied is skipped
/// silently, anything else propagates.
fn tolerate(err: walkdir::Error) -> Result<()> {
    if let Some(io) = err.io_error() {
        if io.kind() == std::io::ErrorKind::PermissionDenied {
            debug!("permission denied, skipping: {err}");
            return Ok(());
        }
    }
    Err(Error::Walk(err))
}

/// Collect the ordered list of regular files under `root` using the
/// crawler's skip rules, without hashing or persisting anything.
///
/// A `root` that is itself a regular file yields just that file.
pub fn collect_sources(root: &Path) -> Result<Vec<PathBuf>> {
    let meta = root
        .symlink_metadata()
        .map_err(|_| Error::NotFound {
            path: root.to_owned(),
        })?;
    if meta.is_file() {
        return Ok(vec![root.to_owned()]);
    }
    if !meta.is_dir() {
        return Err(Error::NotDirectory {
            path: root.to_owned(),
        });
    }

    let mut out = Vec::new();
    for result in walker(root).filter_entry(keep_entry) {
        match result {
            Ok(entry) if entry.file_type().is_file() => out.push(entry.into_path()),
            Ok(_) => {}
            Err(err) => tolerate(err)?,
        }
    }
    Ok(out)
}

/// Count the regular files under `root`, short-circuiting once the count
/// exceeds `stop_after` when given. Used by the path sanity gate.
pub fn count_files(root: &Path, stop_after: Option<u64>) -> Result<u64> {
    let mut count = 0;
    for result in walker(root).filter_entry(keep_entry) {
        match result {
            Ok(entry) if entry.file_type().is_file() => {
                count += 1;
                if let Some(limit) = stop_after {
                    if count > limit {
                        return Ok(count);
                    }
                }
            }
            Ok(_) => {}
            Err(err) => tolerate(err)?,
        }
    }
    Ok(count)
}

/// What a crawl did.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default)]
pub struct CrawlStats {
    /// Regular files visited.
    pub files: u64,

    /// Files newly hashed and written to the bucket.
    pub hashed: u64,

    /// Archive members newly hashed and written to the bucket.
    pub archived: u64,

    /// Whether the crawl stopped early on cancellation.
    pub cancelled: bool,
}

/// The crawler: populates one bucket from its root directory.
pub struct Crawler<'a> {
    store: &'a Store,
    ui: &'a dyn Feedback,
    pool: &'a worker::Pool,
    token: &'a Token,
    archives: bool,
}

impl<'a> Crawler<'a> {
    /// Create a crawler borrowing the open store and collaborators.
    pub fn new(
        store: &'a Store,
        ui: &'a dyn Feedback,
        pool: &'a worker::Pool,
        token: &'a Token,
        archives: bool,
    ) -> Self {
        Self {
            store,
            ui,
            pool,
            token,
            archives,
        }
    }

    /// Walk the bucket's root and upsert a digest for every regular file
    /// not already indexed. Digests for every file seen, new or old, are
    /// added to `table` for duplicate comparison.
    pub fn crawl(&self, bucket: &BucketName, table: &mut CompareTable) -> Result<CrawlStats> {
        let root = bucket.as_path();
        let meta = root.symlink_metadata().map_err(|_| Error::NotFound {
            path: root.to_owned(),
        })?;
        if !meta.is_dir() {
            return Err(Error::NotDirectory {
                path: root.to_owned(),
            });
        }

        self.store.create_bucket(bucket.as_str())?;
        let indexed = self.indexed(bucket)?;
        debug!(
            "crawling {bucket} with {} entries already indexed",
            indexed.len()
        );

        let mut stats = CrawlStats::default();
        for result in walker(root).filter_entry(keep_entry) {
            if self.token.check_cancel().is_err() {
                stats.cancelled = true;
                break;
            }
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    tolerate(err)?;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.into_path();
            stats.files += 1;
            self.ui.status(Stage::Scanning, stats.files, None);

            let key = pathform::key(&path);
            if let Some(digest) = indexed.get(&key) {
                table.insert(*digest, path.clone());
            } else if self.hash_and_store(bucket, &path, &key, table)? {
                stats.hashed += 1;
            }

            if self.archives && archive::is_supported(&path) {
                stats.archived +=
                    archive::crawl(self.store, self.ui, bucket, &path, &indexed, table)?;
            }
        }
        Ok(stats)
    }

    /// The already-indexed entries of the bucket, loaded once up front.
    /// Immutable for the rest of the crawl.
    fn indexed(&self, bucket: &BucketName) -> Result<HashMap<String, Digest>> {
        let mut indexed = HashMap::new();
        let mut malformed = 0u64;
        self.store.for_each(bucket.as_str(), |key, value| {
            match Digest::from_bytes(value) {
                Ok(digest) => {
                    indexed.insert(key.to_owned(), digest);
                }
                Err(_) => malformed += 1,
            }
        })?;
        if malformed > 0 {
            self.ui.warn(&format!(
                "{malformed} malformed digest(s) in {bucket} ignored"
            ));
        }
        Ok(indexed)
    }

    /// Hash one new file and persist its digest. Returns whether an entry
    /// was written; unreadable and empty files are skipped softly.
    fn hash_and_store(
        &self,
        bucket: &BucketName,
        path: &Path,
        key: &str,
        table: &mut CompareTable,
    ) -> Result<bool> {
        let digest = match self.pool.hash(path) {
            Ok(digest) => digest,
            Err(err) => {
                self.ui.warn(&format!("skipping {path:?}: {err}"));
                return Ok(false);
            }
        };
        if digest.is_zero() {
            debug!("empty file, not indexed: {path:?}");
            return Ok(false);
        }
        self.store.put(bucket.as_str(), key, digest.as_bytes())?;
        table.insert(digest, path.to_owned());
        Ok(true)
    }
}
