//! Application configuration.
//!
//! The database location is an explicit value constructed once and passed
//! through; nothing in the crate consults process-wide mutable state to find
//! the index.

use std::path::{Path, PathBuf};

use getset::{CopyGetters, Getters};

use crate::{Error, Result};

/// The directory component under the user's config directory.
const APP_DIR: &str = "dupers";

/// The database filename.
const DB_FILE: &str = "dupers.db";

/// The extra directory component used when test mode is active, so test
/// databases never collide with the real index.
const TEST_DIR: &str = "test";

/// Resolved application configuration.
#[derive(Clone, Debug, Getters, CopyGetters)]
pub struct Config {
    /// The database file location.
    #[getset(get = "pub")]
    db_path: PathBuf,

    /// The user's home directory, used for backup and export destinations.
    #[getset(get = "pub")]
    home: PathBuf,

    /// Whether to emit debug diagnostics.
    #[getset(get_copy = "pub")]
    debug: bool,

    /// Whether to suppress non-essential output.
    #[getset(get_copy = "pub")]
    quiet: bool,

    /// Whether confirmation prompts are answered yes without asking.
    #[getset(get_copy = "pub")]
    assume_yes: bool,
}

impl Config {
    /// Resolve the configuration for a run.
    ///
    /// The database lives at `<user-config>/dupers/dupers.db`, falling back
    /// to `<home>/dupers/dupers.db` when the platform reports no config
    /// directory. With `test_mode` an extra `test` directory is inserted.
    pub fn new(test_mode: bool, debug: bool, quiet: bool, assume_yes: bool) -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| Error::NotFound {
            path: PathBuf::from("$HOME"),
        })?;
        let base = dirs::config_dir().unwrap_or_else(|| home.clone());
        Ok(Self {
            db_path: Self::db_path_under(&base, test_mode),
            home,
            debug,
            quiet,
            assume_yes,
        })
    }

    /// The database path rooted at an explicit base directory.
    ///
    /// Split out for tests, which point the base at a temp directory.
    pub fn db_path_under(base: &Path, test_mode: bool) -> PathBuf {
        let mut path = base.join(APP_DIR);
        if test_mode {
            path.push(TEST_DIR);
        }
        path.push(DB_FILE);
        path
    }

    /// Replace the database path, keeping the rest of the configuration.
    pub fn with_db_path(self, db_path: PathBuf) -> Self {
        Self { db_path, ..self }
    }
}
