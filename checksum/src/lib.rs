//! Content digests for the dupers index.
//!
//! A digest is the SHA-256 of a file's full byte stream, represented as a
//! fixed 32-byte blob. Two files are duplicates iff their digests are
//! byte-equal; nothing else about the file is recorded.
//!
//! The all-zero digest is a sentinel meaning "unhashable": it is produced
//! only for empty streams and read failures, and it must never be persisted
//! to the index. Callers are responsible for discarding it.

use std::{
    fmt::Display,
    fs::File,
    io::{self, BufReader, Read, Write},
    path::Path,
    str::FromStr,
};

use sha2::{Digest as _, Sha256};
use thiserror::Error;

/// The buffer size used when streaming a file through the hasher.
const STREAM_BUFFER: usize = 1 << 20;

/// Errors that may be encountered while hashing.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A generic IO error occurred while reading the content to be hashed.
    /// This error may be retried, but if it fails multiple times it's generally not recoverable.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// An invariant was not followed. These errors are not recoverable and indicate a program bug.
    #[error("invariant: {0}")]
    Invariant(InvariantError),
}

/// Kinds of invariants that may be reported in [`Error::Invariant`].
#[derive(Error, Debug, Eq, PartialEq)]
pub enum InvariantError {
    #[error("the resulting hash digest was not 32 bytes")]
    DigestSize,
}

/// Errors encountered when parsing a [`Digest`] from its hex form.
#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum ParseError {
    /// The input was not exactly 64 hexadecimal characters.
    #[error("digest must be 64 hex characters, got {len}")]
    Length {
        /// The length of the rejected input.
        len: usize,
    },

    /// The input contained non-hexadecimal characters.
    #[error("digest is not valid hex")]
    Encoding(#[from] hex::FromHexError),
}

/// A 32-byte SHA-256 content digest.
///
/// Digests are opaque bytes: equal iff byte-equal. The textual form is
/// lowercase hex, 64 characters.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Default)]
pub struct Digest([u8; 32]);

impl Digest {
    /// The all-zero sentinel for "unhashable / read failed".
    pub const ZERO: Digest = Digest([0; 32]);

    /// Reports whether this digest is the unhashable sentinel.
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Rebuild a digest from raw bytes, as read back out of the store.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let fixed = bytes
            .try_into()
            .map_err(|_| Error::Invariant(InvariantError::DigestSize))?;
        Ok(Digest(fixed))
    }

    fn from_finalized<D: sha2::Digest>(digest: D) -> Result<Self, Error> {
        Self::from_bytes(&digest.finalize()[..])
    }
}

impl Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Digest {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err(ParseError::Length { len: s.len() });
        }
        let mut out = [0u8; 32];
        hex::decode_to_slice(s, &mut out)?;
        Ok(Digest(out))
    }
}

/// Stream `reader` through SHA-256.
///
/// Returns [`Digest::ZERO`] iff the stream is empty. The caller must discard
/// a zero digest rather than persist it.
pub fn hash_stream<R: Read>(reader: R) -> Result<Digest, Error> {
    let mut reader = BufReader::with_capacity(STREAM_BUFFER, reader);
    let mut hasher = Sha256::new();
    let copied = io::copy(&mut reader, &mut hasher)?;
    if copied == 0 {
        return Ok(Digest::ZERO);
    }
    Digest::from_finalized(hasher)
}

/// Open and hash the file at `path`.
pub fn hash_file(path: &Path) -> Result<Digest, Error> {
    let file = File::open(path)?;
    hash_stream(file)
}

/// An incremental hashing sink implementing [`io::Write`].
///
/// Used where content arrives as a stream of decompressed chunks rather
/// than a readable handle, such as archive members.
#[derive(Default)]
pub struct Writer {
    hasher: Sha256,
    written: u64,
}

impl Writer {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Finish hashing. Returns [`Digest::ZERO`] iff nothing was written.
    pub fn finish(self) -> Result<Digest, Error> {
        if self.written == 0 {
            return Ok(Digest::ZERO);
        }
        Digest::from_finalized(self.hasher)
    }
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hasher.update(buf);
        self.written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
