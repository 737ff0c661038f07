//! Platform-aware path canonicalization for the dupers index.
//!
//! Every path that enters the index passes through this crate exactly once:
//! bucket names, indexed file paths, CSV header paths, and rename arguments.
//! Keeping canonicalization in one place means no two subsystems can disagree
//! about what the canonical form of a path is.
//!
//! The canonical form is an absolute path. On case-insensitive platforms
//! (Windows) the entire path is additionally lower-cased, so that two spellings
//! of the same directory always name the same bucket.
//!
//! Canonicalization is purely lexical: it resolves relative paths against the
//! current directory and removes `.` components, but it never touches the
//! filesystem and never follows symlinks. A bucket name may therefore refer to
//! a directory that does not (or no longer) exists on disk; callers that need
//! the directory decide separately what to do about that.

use std::{
    env, io,
    path::{Component, Path, PathBuf},
};

use thiserror::Error;

/// Errors reported by this library.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The path could not be resolved to an absolute form.
    ///
    /// The only way this happens is when the path is relative and the current
    /// working directory cannot be determined.
    #[error("resolve {path:?} to an absolute path")]
    Resolve {
        /// The path originally handed to the resolver.
        path: PathBuf,

        /// The error returned while reading the current directory.
        #[source]
        source: io::Error,
    },

    /// The path was empty.
    #[error("empty path")]
    Empty,
}

/// The canonical name of a bucket: an absolute directory path in canonical
/// form, used simultaneously as the indexed root on disk and as the identifier
/// of a store partition.
///
/// Two `BucketName` values are equal iff their canonical forms are byte-equal.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct BucketName(String);

impl BucketName {
    /// Canonicalize `path` into a bucket name.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        canonical(path.as_ref()).map(Self)
    }

    /// Wrap a string that is already in canonical form.
    ///
    /// Used when reading bucket names back out of the store, which only ever
    /// contains canonical names.
    pub fn from_canonical<S: Into<String>>(name: S) -> Self {
        Self(name.into())
    }

    /// The canonical name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The canonical name as a path.
    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }

    /// Reports whether `path` is inside this bucket.
    ///
    /// Every entry stored under a bucket must satisfy this; the crawler only
    /// ever feeds paths rooted at the bucket, and the CSV importer rejects
    /// rows that would escape it.
    pub fn contains<P: AsRef<Path>>(&self, path: P) -> bool {
        path.as_ref().starts_with(self.as_path())
    }

    /// Strip this bucket's prefix from `path`, yielding the relative part.
    pub fn strip<'a>(&self, path: &'a Path) -> Option<&'a Path> {
        path.strip_prefix(self.as_path()).ok()
    }

    /// Join a relative path onto this bucket, producing an entry key.
    pub fn join<P: AsRef<Path>>(&self, rel: P) -> PathBuf {
        self.as_path().join(rel)
    }
}

impl std::fmt::Display for BucketName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<BucketName> for String {
    fn from(name: BucketName) -> Self {
        name.0
    }
}

impl AsRef<Path> for BucketName {
    fn as_ref(&self) -> &Path {
        self.as_path()
    }
}

/// Resolve `path` to its canonical string form.
///
/// The path is made absolute lexically (joined onto the current directory if
/// relative, `.` components removed, `..` collapsed where possible) and, on
/// case-insensitive platforms, lower-cased.
pub fn canonical(path: &Path) -> Result<String, Error> {
    if path.as_os_str().is_empty() {
        return Err(Error::Empty);
    }
    let absolute = if path.is_absolute() {
        clean(path)
    } else {
        let cwd = env::current_dir().map_err(|source| Error::Resolve {
            path: path.to_owned(),
            source,
        })?;
        clean(&cwd.join(path))
    };
    Ok(fold_case(&absolute.to_string_lossy()))
}

/// Canonicalize a path that is already known to be rooted under a canonical
/// prefix, such as a file discovered while walking a canonical bucket root.
///
/// Infallible because no current-directory lookup is required.
pub fn key(path: &Path) -> String {
    fold_case(&clean(path).to_string_lossy())
}

/// Lexically remove `.` components and collapse `..` against named parents.
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component.as_os_str());
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(windows)]
fn fold_case(s: &str) -> String {
    s.to_lowercase()
}

#[cfg(not(windows))]
fn fold_case(s: &str) -> String {
    s.to_owned()
}

/// Reports whether `s` starts with a Windows drive-letter prefix, e.g. `C:`.
pub fn is_drive(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() < 2 || bytes[1] != b':' {
        return false;
    }
    if !bytes[0].is_ascii_alphabetic() {
        return false;
    }
    match bytes.get(2) {
        None => true,
        Some(b'\\') | Some(b'/') => true,
        Some(_) => false,
    }
}

/// Reports whether `s` is a UNC path, e.g. `\\server\share\docs`.
pub fn is_unc(s: &str) -> bool {
    s.starts_with(r"\\")
}

/// Translate a path recorded on any platform into Windows form.
///
/// `/` becomes `C:`, a pure POSIX path gains a `C:` prefix with backslash
/// separators, and paths already carrying a drive letter or UNC prefix keep
/// their root with separators normalized to backslashes.
pub fn windows_form(s: &str) -> String {
    if s == "/" {
        return "C:".to_owned();
    }
    if is_unc(s) || is_drive(s) {
        return s.replace('/', r"\");
    }
    if let Some(rest) = s.strip_prefix('/') {
        return format!(r"C:\{}", rest.replace('/', r"\"));
    }
    s.replace('/', r"\")
}

/// Translate a path recorded on any platform into POSIX form.
///
/// A bare drive letter becomes `/`, a drive-letter prefix is stripped,
/// backslashes become forward slashes, and a UNC root `\\server\share`
/// becomes `/server/share`.
pub fn posix_form(s: &str) -> String {
    if is_unc(s) {
        let trimmed = s.trim_start_matches('\\');
        return format!("/{}", trimmed.replace('\\', "/"));
    }
    if is_drive(s) {
        let rest = &s[2..];
        if rest.is_empty() {
            return "/".to_owned();
        }
        let rest = rest.replace('\\', "/");
        return if rest.starts_with('/') {
            rest
        } else {
            format!("/{rest}")
        };
    }
    s.replace('\\', "/")
}

/// Translate a path into the form used by the platform this binary runs on.
pub fn native_form(s: &str) -> String {
    if cfg!(windows) {
        windows_form(s)
    } else {
        posix_form(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(unix)]
    fn canonical_absolute_is_cleaned() {
        let got = canonical(Path::new("/tmp/./a/../b")).expect("must canonicalize");
        assert_eq!(got, "/tmp/b");
    }

    #[test]
    #[cfg(windows)]
    fn canonical_absolute_is_cleaned_and_folded() {
        let got = canonical(Path::new(r"C:\Tmp\.\A\..\B")).expect("must canonicalize");
        assert_eq!(got, r"c:\tmp\b");
    }

    #[test]
    fn canonical_relative_resolves_against_cwd() {
        let got = canonical(Path::new("some/dir")).expect("must canonicalize");
        assert!(Path::new(&got).is_absolute(), "{got} must be absolute");
        assert!(got.ends_with(&fold_case(&format!(
            "some{}dir",
            std::path::MAIN_SEPARATOR
        ))));
    }

    #[test]
    fn canonical_rejects_empty() {
        assert!(matches!(canonical(Path::new("")), Err(Error::Empty)));
    }

    #[test]
    fn bucket_contains_its_entries() {
        let bucket = BucketName::from_canonical("/data/docs");
        assert!(bucket.contains("/data/docs/report.pdf"));
        assert!(bucket.contains("/data/docs/sub/inner.txt"));
        assert!(!bucket.contains("/data/documents/report.pdf"));
        assert!(!bucket.contains("/etc/passwd"));
    }

    #[test]
    fn bucket_strip_yields_relative_part() {
        let bucket = BucketName::from_canonical("/data/docs");
        let rel = bucket
            .strip(Path::new("/data/docs/sub/inner.txt"))
            .expect("must strip");
        assert_eq!(rel, Path::new("sub/inner.txt"));
    }

    #[test]
    fn drive_detection() {
        assert!(is_drive("C:"));
        assert!(is_drive(r"c:\Users"));
        assert!(is_drive("D:/data"));
        assert!(!is_drive("/usr"));
        assert!(!is_drive("CD:"));
        assert!(!is_drive("1:"));
        assert!(!is_drive(r"\\server\share"));
    }

    #[test]
    fn unc_detection() {
        assert!(is_unc(r"\\server\share"));
        assert!(!is_unc(r"\single"));
        assert!(!is_unc("/usr"));
    }

    #[test]
    fn windows_form_of_posix_root() {
        assert_eq!(windows_form("/"), "C:");
    }

    #[test]
    fn windows_form_of_posix_path() {
        assert_eq!(windows_form("/home/ben/docs"), r"C:\home\ben\docs");
    }

    #[test]
    fn windows_form_preserves_drive_and_unc() {
        assert_eq!(windows_form(r"D:\data"), r"D:\data");
        assert_eq!(windows_form("D:/data"), r"D:\data");
        assert_eq!(windows_form(r"\\server\share\x"), r"\\server\share\x");
    }

    #[test]
    fn posix_form_of_bare_drive() {
        assert_eq!(posix_form("C:"), "/");
    }

    #[test]
    fn posix_form_strips_drive_prefix() {
        assert_eq!(posix_form(r"C:\Users\ben"), "/Users/ben");
        assert_eq!(posix_form("C:/Users/ben"), "/Users/ben");
    }

    #[test]
    fn posix_form_of_unc() {
        assert_eq!(posix_form(r"\\server\share\docs"), "/server/share/docs");
    }

    #[test]
    fn posix_form_passes_posix_through() {
        assert_eq!(posix_form("/home/ben"), "/home/ben");
    }

    #[test]
    fn round_trip_posix_to_windows_and_back() {
        let original = "/home/ben/docs";
        assert_eq!(posix_form(&windows_form(original)), original);
    }
}
