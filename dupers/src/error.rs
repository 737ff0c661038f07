use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors reported by the dupers core.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A path handed to an operation does not exist on disk.
    #[error("path does not exist: {path:?}")]
    NotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// A path that must be a directory is something else.
    #[error("not a directory: {path:?}")]
    NotDirectory {
        /// The offending path.
        path: PathBuf,
    },

    /// The named bucket does not exist in the index.
    #[error("bucket not found: {name}")]
    BucketNotFound {
        /// The bucket that was requested.
        name: String,
    },

    /// The index contains no buckets at all.
    #[error("the index is empty; run `dupers up <directory>` first")]
    Empty,

    /// A clean pass found nothing to remove.
    #[error("nothing to clean")]
    NothingToClean,

    /// A rename or import target bucket already exists.
    #[error("bucket already exists: {name}")]
    Conflict {
        /// The bucket that is already present.
        name: String,
    },

    /// A CSV file does not start with the expected dupers header.
    #[error("invalid export header in {path:?}: expected `{expected}…`")]
    InvalidHeader {
        /// The file being imported.
        path: PathBuf,

        /// The required header prefix.
        expected: &'static str,
    },

    /// The first data row of a CSV import is malformed.
    #[error("invalid first data row: {detail}")]
    InvalidRow {
        /// What was wrong with the row.
        detail: String,
    },

    /// A CSV row resolved to a path outside any absolute root.
    #[error("import path is not absolute: {path:?}")]
    NotAbsolute {
        /// The rejected path.
        path: PathBuf,
    },

    /// The user declined a confirmation, aborting the operation.
    #[error("aborted")]
    Aborted,

    /// The run was cancelled cooperatively.
    #[error("cancelled")]
    Cancelled,

    /// The store layer failed.
    #[error(transparent)]
    Store(#[from] store::Error),

    /// Hashing failed.
    #[error(transparent)]
    Checksum(#[from] checksum::Error),

    /// Path canonicalization failed.
    #[error(transparent)]
    Path(#[from] pathform::Error),

    /// The CSV codec failed.
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// Directory traversal failed.
    #[error(transparent)]
    Walk(#[from] walkdir::Error),

    /// Any other filesystem error.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Reports whether this error means "the database file lock timed out".
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Store(store::Error::Timeout { .. }))
    }

    /// Reports whether this error is fatal to the process rather than the
    /// current operation.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Error::Store(store::Error::Corrupt { .. }))
    }
}
