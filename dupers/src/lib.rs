//! The dupers core: find duplicate files by content and search indexed
//! filenames, backed by a persistent index of SHA-256 digests.
//!
//! The index is a single database file of named buckets, where each bucket
//! corresponds to one indexed root directory and maps canonical absolute
//! file paths to content digests. The overall flow for the two primary
//! operations:
//!
//! 1. `up` walks a directory, hashes every regular file that is not already
//!    indexed, and upserts the results into the directory's bucket. The `up+`
//!    variant additionally enumerates the members of known archive container
//!    formats and indexes them under synthetic paths.
//! 2. `dupe` walks a source path without persisting anything, loads the
//!    target buckets into an in-memory compare table keyed by digest, hashes
//!    each source file, and reports every source whose digest is already
//!    indexed somewhere else.
//!
//! Everything else — clean, compact, backup, rename, CSV export and import,
//! substring search — is maintenance around that index.
//!
//! The crate deliberately has one owner of the database handle: the caller
//! opens a [`store::Store`] and lends it to the operations in these modules
//! for the duration of a call. There is no global state; test-mode database
//! redirection is a [`config::Config`] value.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(clippy::unwrap_used)]

pub mod archive;
pub mod bucket;
pub mod compare;
pub mod config;
mod error;
pub mod export;
pub mod run;
pub mod search;
pub mod ui;
pub mod walk;
pub mod worker;

pub use error::Error;

/// The crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;
