//! The persistent index: a single-file transactional key-value store
//! partitioned into named buckets.
//!
//! Each bucket maps indexed file paths (UTF-8, bytewise ordered) to 32-byte
//! content digests. Buckets are backed by [`redb`] tables, which provides the
//! transactional properties the index relies on: read transactions proceed in
//! parallel against a consistent snapshot, write transactions are serialized,
//! and a bucket rename is atomic because it happens inside one write
//! transaction.
//!
//! The store opens the file in one of two modes. [`Mode::ReadWrite`] is the
//! normal mode; [`Mode::ReadOnly`] is a capability restriction enforced by
//! this wrapper, under which every write operation fails with
//! [`Error::ReadOnly`] without touching the file.
//!
//! A zero-byte database file is treated as corrupt and silently recreated;
//! [`Store::recovered`] reports when that happened so the caller can mention
//! it to the user.

use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use log::{debug, warn};
use redb::{
    Database, ReadTransaction, ReadableTable, ReadableTableMetadata, TableDefinition, TableHandle,
    WriteTransaction,
};

mod error;

pub use error::Error;

/// How long an open waits for the database file lock before giving up.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(3);

/// How long to sleep between lock acquisition attempts.
const LOCK_RETRY: Duration = Duration::from_millis(50);

/// The open mode for the database file.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Mode {
    /// Reads only; write operations fail with [`Error::ReadOnly`].
    ReadOnly,

    /// Full access. The file is created if absent.
    ReadWrite,
}

/// Per-bucket statistics for info printouts.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct BucketStats {
    /// The bucket name.
    pub name: String,

    /// Number of entries in the bucket.
    pub keys: u64,

    /// Bytes allocated to the bucket's leaf data.
    pub stored_bytes: u64,
}

/// A handle on the open database file.
pub struct Store {
    db: Database,
    path: PathBuf,
    mode: Mode,
    recovered: bool,
}

fn bucket_def(name: &str) -> TableDefinition<'_, &'static str, &'static [u8]> {
    TableDefinition::new(name)
}

impl Store {
    /// Open the database file at `path`.
    ///
    /// In [`Mode::ReadWrite`] the file and its parent directory are created
    /// if absent (mode 0700 for the directory and 0600 for the file on Unix).
    /// In [`Mode::ReadOnly`] a missing file is [`Error::NotFound`].
    ///
    /// The file lock is retried for [`LOCK_TIMEOUT`]; persistent contention
    /// surfaces as [`Error::Timeout`].
    pub fn open(path: &Path, mode: Mode) -> Result<Self, Error> {
        if mode == Mode::ReadOnly && !path.exists() {
            return Err(Error::NotFound {
                path: path.to_owned(),
            });
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
            restrict_dir(parent)?;
        }

        // A zero-byte file is corrupt; throw it away and start over.
        let recovered = match fs::metadata(path) {
            Ok(meta) if meta.len() == 0 => {
                warn!("database file {path:?} is zero bytes, recreating");
                fs::remove_file(path)?;
                true
            }
            _ => false,
        };
        if recovered && mode == Mode::ReadOnly {
            // Only a writable open can recreate the file.
            return Err(Error::NotFound {
                path: path.to_owned(),
            });
        }

        let deadline = Instant::now() + LOCK_TIMEOUT;
        let db = loop {
            let attempt = match mode {
                Mode::ReadOnly => Database::open(path),
                Mode::ReadWrite => Database::create(path),
            };
            match attempt {
                Ok(db) => break db,
                Err(redb::DatabaseError::DatabaseAlreadyOpen) => {
                    if Instant::now() >= deadline {
                        return Err(Error::Timeout {
                            path: path.to_owned(),
                        });
                    }
                    thread::sleep(LOCK_RETRY);
                }
                Err(redb::DatabaseError::Storage(redb::StorageError::Corrupted(detail))) => {
                    warn!("database file {path:?} is corrupt: {detail}");
                    return Err(Error::Corrupt {
                        path: path.to_owned(),
                    });
                }
                Err(err) => return Err(Error::Open(err)),
            }
        };
        restrict_file(path)?;
        debug!("opened database {path:?} ({mode:?})");

        Ok(Self {
            db,
            path: path.to_owned(),
            mode,
            recovered,
        })
    }

    /// The path of the open database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The mode the database was opened in.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Reports whether a zero-byte file was recreated during open.
    pub fn recovered(&self) -> bool {
        self.recovered
    }

    /// The current size of the database file in bytes.
    pub fn size_on_disk(&self) -> Result<u64, Error> {
        Ok(fs::metadata(&self.path)?.len())
    }

    /// Begin a read snapshot.
    pub fn snapshot(&self) -> Result<Snapshot, Error> {
        Ok(Snapshot {
            txn: self.db.begin_read()?,
        })
    }

    /// Begin a write batch. All writes in the batch commit atomically.
    pub fn batch(&self) -> Result<Batch<'_>, Error> {
        self.ensure_writable()?;
        let txn = self.db.begin_write()?;
        Ok(Batch {
            txn,
            _marker: std::marker::PhantomData,
        })
    }

    /// The names of all buckets, ascending.
    pub fn buckets(&self) -> Result<Vec<String>, Error> {
        self.snapshot()?.buckets()
    }

    /// Reports whether the named bucket exists.
    pub fn bucket_exists(&self, name: &str) -> Result<bool, Error> {
        self.snapshot()?.bucket_exists(name)
    }

    /// Reports whether the database has no buckets at all.
    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.buckets()?.is_empty())
    }

    /// The number of entries in the named bucket.
    pub fn count(&self, name: &str) -> Result<u64, Error> {
        self.snapshot()?.count(name)
    }

    /// Fetch the value stored under `key` in `bucket`.
    pub fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, Error> {
        self.snapshot()?.get(bucket, key)
    }

    /// Visit every entry of `bucket` in ascending key order.
    pub fn for_each(
        &self,
        bucket: &str,
        f: impl FnMut(&str, &[u8]),
    ) -> Result<(), Error> {
        self.snapshot()?.for_each(bucket, f)
    }

    /// Create the named bucket if it does not already exist.
    pub fn create_bucket(&self, name: &str) -> Result<(), Error> {
        let mut batch = self.batch()?;
        batch.create_bucket(name)?;
        batch.commit()
    }

    /// Delete the named bucket and all its entries.
    pub fn delete_bucket(&self, name: &str) -> Result<(), Error> {
        let mut batch = self.batch()?;
        if !batch.delete_bucket(name)? {
            return Err(Error::BucketNotFound {
                name: name.to_owned(),
            });
        }
        batch.commit()
    }

    /// Store `value` under `key` in `bucket`, replacing any previous value.
    pub fn put(&self, bucket: &str, key: &str, value: &[u8]) -> Result<(), Error> {
        let mut batch = self.batch()?;
        batch.put(bucket, key, value)?;
        batch.commit()
    }

    /// Delete the entry under `key` in `bucket`, if present.
    pub fn delete(&self, bucket: &str, key: &str) -> Result<bool, Error> {
        let mut batch = self.batch()?;
        let removed = batch.delete(bucket, key)?;
        batch.commit()?;
        Ok(removed)
    }

    /// Rename bucket `old` to `new` inside a single write transaction:
    /// create `new`, copy every entry, delete `old`. Either the whole rename
    /// lands or none of it does.
    ///
    /// Fails with [`Error::BucketNotFound`] if `old` is absent and with an
    /// [`Error::Io`] of kind `AlreadyExists` if `new` is present.
    pub fn rename_bucket(&self, old: &str, new: &str) -> Result<u64, Error> {
        self.ensure_writable()?;
        let txn = self.db.begin_write()?;
        let existing = table_names(&txn)?;
        if !existing.iter().any(|name| name == old) {
            return Err(Error::BucketNotFound {
                name: old.to_owned(),
            });
        }
        if existing.iter().any(|name| name == new) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("bucket already exists: {new}"),
            )));
        }

        let mut moved = 0;
        {
            let source = txn.open_table(bucket_def(old))?;
            let mut target = txn.open_table(bucket_def(new))?;
            for entry in source.iter()? {
                let (key, value) = entry?;
                target.insert(key.value(), value.value())?;
                moved += 1;
            }
        }
        txn.delete_table(bucket_def(old))?;
        txn.commit()?;
        debug!("renamed bucket {old} to {new} ({moved} entries)");
        Ok(moved)
    }

    /// Rewrite every bucket densely into a fresh database file at `dst`.
    ///
    /// The source is unchanged; the caller swaps the files afterwards.
    pub fn compact_into(&self, dst: &Path) -> Result<u64, Error> {
        let source = self.snapshot()?;
        let target = Database::create(dst).map_err(Error::Open)?;
        let txn = target.begin_write()?;
        let mut copied = 0;
        for name in source.buckets()? {
            let mut failed = None;
            let mut out = txn.open_table(bucket_def(&name))?;
            source.for_each(&name, |key, value| {
                if failed.is_none() {
                    match out.insert(key, value) {
                        Ok(_) => copied += 1,
                        Err(err) => failed = Some(err),
                    }
                }
            })?;
            if let Some(err) = failed {
                return Err(err.into());
            }
        }
        txn.commit()?;
        Ok(copied)
    }

    /// Per-bucket statistics, ascending by bucket name.
    pub fn stats(&self) -> Result<Vec<BucketStats>, Error> {
        let snapshot = self.snapshot()?;
        let mut out = Vec::new();
        for name in snapshot.buckets()? {
            let table = snapshot.txn.open_table(bucket_def(&name))?;
            out.push(BucketStats {
                keys: table.len()?,
                stored_bytes: table.stats()?.stored_bytes(),
                name,
            });
        }
        Ok(out)
    }

    fn ensure_writable(&self) -> Result<(), Error> {
        match self.mode {
            Mode::ReadWrite => Ok(()),
            Mode::ReadOnly => Err(Error::ReadOnly),
        }
    }
}

/// A consistent read snapshot of the database.
///
/// Entries observed through one snapshot are unaffected by concurrent writes.
pub struct Snapshot {
    txn: ReadTransaction,
}

impl Snapshot {
    /// The names of all buckets, ascending.
    pub fn buckets(&self) -> Result<Vec<String>, Error> {
        let mut names: Vec<String> = self
            .txn
            .list_tables()?
            .map(|handle| handle.name().to_owned())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Reports whether the named bucket exists in this snapshot.
    pub fn bucket_exists(&self, name: &str) -> Result<bool, Error> {
        Ok(self.buckets()?.iter().any(|have| have == name))
    }

    /// The number of entries in the named bucket.
    pub fn count(&self, name: &str) -> Result<u64, Error> {
        let table = self.txn.open_table(bucket_def(name))?;
        Ok(table.len()?)
    }

    /// Fetch the value stored under `key` in `bucket`.
    pub fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let table = self.txn.open_table(bucket_def(bucket))?;
        Ok(table.get(key)?.map(|guard| guard.value().to_vec()))
    }

    /// Reports whether `key` is present in `bucket`.
    pub fn contains(&self, bucket: &str, key: &str) -> Result<bool, Error> {
        let table = self.txn.open_table(bucket_def(bucket))?;
        Ok(table.get(key)?.is_some())
    }

    /// Visit every entry of `bucket` in ascending key order.
    pub fn for_each(
        &self,
        bucket: &str,
        mut f: impl FnMut(&str, &[u8]),
    ) -> Result<(), Error> {
        let table = self.txn.open_table(bucket_def(bucket))?;
        for entry in table.iter()? {
            let (key, value) = entry?;
            f(key.value(), value.value());
        }
        Ok(())
    }
}

/// A write transaction. Nothing is visible to readers until [`Batch::commit`].
///
/// Dropping the batch without committing aborts every write in it.
pub struct Batch<'db> {
    txn: WriteTransaction,
    // The lifetime ties the batch to the store so the database cannot be
    // closed while a write transaction is live.
    _marker: std::marker::PhantomData<&'db Store>,
}

impl Batch<'_> {
    /// Create the named bucket if it does not already exist.
    pub fn create_bucket(&mut self, name: &str) -> Result<(), Error> {
        self.txn.open_table(bucket_def(name))?;
        Ok(())
    }

    /// Delete the named bucket. Returns false if it did not exist.
    pub fn delete_bucket(&mut self, name: &str) -> Result<bool, Error> {
        Ok(self.txn.delete_table(bucket_def(name))?)
    }

    /// Store `value` under `key` in `bucket`. The bucket must exist.
    pub fn put(&mut self, bucket: &str, key: &str, value: &[u8]) -> Result<(), Error> {
        if !has_table(&self.txn, bucket)? {
            return Err(Error::BucketNotFound {
                name: bucket.to_owned(),
            });
        }
        let mut table = self.txn.open_table(bucket_def(bucket))?;
        table.insert(key, value)?;
        Ok(())
    }

    /// Delete the entry under `key` in `bucket`. Returns whether it existed.
    pub fn delete(&mut self, bucket: &str, key: &str) -> Result<bool, Error> {
        if !has_table(&self.txn, bucket)? {
            return Err(Error::BucketNotFound {
                name: bucket.to_owned(),
            });
        }
        let mut table = self.txn.open_table(bucket_def(bucket))?;
        let existed = table.remove(key)?.is_some();
        Ok(existed)
    }

    /// Commit every write in the batch atomically.
    ///
    /// Dropping the batch without calling this aborts every staged write.
    pub fn commit(self) -> Result<(), Error> {
        Ok(self.txn.commit()?)
    }
}

fn table_names(txn: &WriteTransaction) -> Result<Vec<String>, Error> {
    Ok(txn
        .list_tables()?
        .map(|handle| handle.name().to_owned())
        .collect())
}

fn has_table(txn: &WriteTransaction, name: &str) -> Result<bool, Error> {
    Ok(table_names(txn)?.iter().any(|have| have == name))
}

#[cfg(unix)]
fn restrict_dir(path: &Path) -> Result<(), Error> {
    use std::os::unix::fs::PermissionsExt;
    let perms = fs::Permissions::from_mode(0o700);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_dir(_: &Path) -> Result<(), Error> {
    Ok(())
}

#[cfg(unix)]
fn restrict_file(path: &Path) -> Result<(), Error> {
    use std::os::unix::fs::PermissionsExt;
    let perms = fs::Permissions::from_mode(0o600);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_file(_: &Path) -> Result<(), Error> {
    Ok(())
}
