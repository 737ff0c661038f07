use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors reported by the store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The named bucket does not exist in the database.
    #[error("bucket not found: {name}")]
    BucketNotFound {
        /// The bucket that was requested.
        name: String,
    },

    /// The database file does not exist and the open mode does not create it.
    #[error("database not found: {path:?}")]
    NotFound {
        /// The missing database file.
        path: PathBuf,
    },

    /// The database file lock could not be acquired within the timeout.
    #[error("timed out waiting for the database lock on {path:?}")]
    Timeout {
        /// The contended database file.
        path: PathBuf,
    },

    /// A write operation was attempted through a read-only handle.
    #[error("database is open read-only")]
    ReadOnly,

    /// The database file exists but cannot be read as a database.
    #[error("database is corrupt: {path:?}")]
    Corrupt {
        /// The unreadable database file.
        path: PathBuf,
    },

    /// A filesystem error outside the database engine.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The database engine failed to open the file.
    #[error("open database: {0}")]
    Open(redb::DatabaseError),

    /// The database engine failed to begin a transaction.
    #[error(transparent)]
    Transaction(#[from] redb::TransactionError),

    /// The database engine failed a table operation.
    #[error(transparent)]
    Table(redb::TableError),

    /// The database engine failed a storage operation.
    #[error(transparent)]
    Storage(#[from] redb::StorageError),

    /// The database engine failed to commit a transaction.
    #[error(transparent)]
    Commit(#[from] redb::CommitError),

    /// The database engine failed to compact the file.
    #[error(transparent)]
    Compaction(#[from] redb::CompactionError),
}

impl From<redb::TableError> for Error {
    fn from(err: redb::TableError) -> Self {
        match err {
            redb::TableError::TableDoesNotExist(name) => Error::BucketNotFound { name },
            other => Error::Table(other),
        }
    }
}
