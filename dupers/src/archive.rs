//! The archive crawler.
//!
//! For files whose extension names a supported container format, the members
//! are enumerated and each member's decompressed stream is hashed and
//! indexed under a synthetic path: the archive's path joined with the
//! member's internal path, as though the archive were a directory.
//!
//! Archives are never recursed into (a zip inside a zip is indexed as a
//! single member, not expanded), and a malformed archive never aborts the
//! crawl: every archive is processed in a failure-isolated scope that turns
//! decoder errors and panics into soft warnings.

use std::{
    collections::HashMap,
    fs::File,
    io::{Seek, SeekFrom},
    panic::{self, AssertUnwindSafe},
    path::Path,
};

use checksum::Digest;
use compress_tools::{list_archive_files, uncompress_archive_file};
use log::debug;
use pathform::BucketName;
use store::Store;

use crate::{compare::CompareTable, ui::Feedback, Result};

/// Extensions of supported container formats, compared case-insensitively.
/// Compound `tar.*` names are matched by their final extension.
const EXTENSIONS: &[&str] = &[
    "7z", "br", "bz2", "gz", "lz4", "rar", "sz", "tar", "tbz2", "tgz", "txz", "tzst", "xz",
    "zip", "zst",
];

/// Reports whether `path` names a supported archive container.
pub fn is_supported(path: &Path) -> bool {
    match path.extension() {
        Some(ext) => {
            let folded = ext.to_string_lossy().to_lowercase();
            EXTENSIONS.iter().any(|know| *know == folded)
        }
        None => false,
    }
}

/// Enumerate and index the members of one archive.
///
/// Members already present in `indexed` are skipped. Returns the number of
/// member entries written. Never fails the caller for a bad archive; decoder
/// errors and panics are reported through `ui.warn` and yield zero.
pub fn crawl(
    store: &Store,
    ui: &dyn Feedback,
    bucket: &BucketName,
    archive: &Path,
    indexed: &HashMap<String, Digest>,
    table: &mut CompareTable,
) -> Result<u64> {
    // The decoder is foreign code; isolate each archive so a panic inside
    // it becomes a soft error instead of tearing down the whole crawl.
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        crawl_inner(store, ui, bucket, archive, indexed, table)
    }));
    match outcome {
        Ok(Ok(written)) => Ok(written),
        // Index failures are real; only decoder trouble is softened.
        Ok(Err(err @ crate::Error::Store(_))) => Err(err),
        Ok(Err(err)) => {
            ui.warn(&format!("skipping archive {archive:?}: {err}"));
            Ok(0)
        }
        Err(_) => {
            ui.warn(&format!("archive decoder panicked on {archive:?}, skipped"));
            Ok(0)
        }
    }
}

fn crawl_inner(
    store: &Store,
    ui: &dyn Feedback,
    bucket: &BucketName,
    archive: &Path,
    indexed: &HashMap<String, Digest>,
    table: &mut CompareTable,
) -> Result<u64> {
    let mut file = File::open(archive)?;
    let members = match list_archive_files(&mut file) {
        Ok(members) => members,
        Err(err) => {
            // Not fatal: the extension lied, or the format is unsupported
            // by the local libarchive build.
            debug!("cannot enumerate {archive:?}: {err}");
            return Ok(0);
        }
    };

    let mut written = 0;
    for member in members {
        if member.ends_with('/') {
            continue;
        }
        let synthetic = archive.join(&member);
        let key = pathform::key(&synthetic);
        if indexed.contains_key(&key) {
            continue;
        }

        file.seek(SeekFrom::Start(0))?;
        let mut sink = checksum::Writer::new();
        if let Err(err) = uncompress_archive_file(&mut file, &mut sink, &member) {
            ui.warn(&format!("skipping member {member} of {archive:?}: {err}"));
            continue;
        }
        let digest = sink.finish()?;
        if digest.is_zero() {
            debug!("empty member, not indexed: {member}");
            continue;
        }

        store.put(bucket.as_str(), &key, digest.as_bytes())?;
        table.insert(digest, synthetic);
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extensions_are_supported() {
        assert!(is_supported(Path::new("/a/b.zip")));
        assert!(is_supported(Path::new("/a/b.ZIP")));
        assert!(is_supported(Path::new("/a/b.tar")));
        assert!(is_supported(Path::new("/a/b.tar.gz")));
        assert!(is_supported(Path::new("/a/b.7z")));
        assert!(is_supported(Path::new("/a/b.zst")));
    }

    #[test]
    fn other_extensions_are_not() {
        assert!(!is_supported(Path::new("/a/b.txt")));
        assert!(!is_supported(Path::new("/a/b.pdf")));
        assert!(!is_supported(Path::new("/a/noext")));
    }

    #[test]
    fn member_paths_nest_under_the_archive() {
        let archive = Path::new("/data/bundle.zip");
        let synthetic = archive.join("docs/readme.txt");
        assert_eq!(synthetic, Path::new("/data/bundle.zip/docs/readme.txt"));
    }
}
