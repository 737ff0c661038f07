//! The filename search engine.
//!
//! Searches are substring matches over the indexed path keys, in four
//! variants: the needle is compared against either the full path or just the
//! basename, either exactly or after lower-casing both sides.
//!
//! Results map each matching path to the bucket it was found in, ordered by
//! path; because every key carries its bucket's prefix, that groups results
//! by bucket name ascending with in-bucket keys in index order.

use std::{collections::BTreeMap, path::PathBuf};

use pathform::BucketName;
use store::Store;
use typed_builder::TypedBuilder;

use crate::{Error, Result};

/// Paths that matched a search, with the bucket each was found in.
pub type Matches = BTreeMap<PathBuf, BucketName>;

/// How to match the needle against indexed paths.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default, TypedBuilder)]
pub struct Options {
    /// Match against the basename only instead of the full path.
    #[builder(default)]
    pub basename: bool,

    /// Match case-sensitively.
    #[builder(default)]
    pub exact: bool,
}

/// Find every indexed entry whose path (or basename) contains `term`.
///
/// Searches the named `buckets`, or every bucket when none are given.
/// Returns [`Error::Empty`] when the index has no buckets at all and
/// [`Error::BucketNotFound`] when a named bucket is absent.
pub fn search(
    store: &Store,
    term: &str,
    buckets: &[BucketName],
    opts: Options,
) -> Result<Matches> {
    let snapshot = store.snapshot()?;
    let all = snapshot.buckets()?;
    if all.is_empty() {
        return Err(Error::Empty);
    }

    let targets: Vec<BucketName> = if buckets.is_empty() {
        all.into_iter().map(BucketName::from_canonical).collect()
    } else {
        for bucket in buckets {
            if !all.iter().any(|have| have == bucket.as_str()) {
                return Err(Error::BucketNotFound {
                    name: bucket.as_str().to_owned(),
                });
            }
        }
        buckets.to_vec()
    };

    let needle = if opts.exact {
        term.to_owned()
    } else {
        term.to_lowercase()
    };

    let mut matches = Matches::new();
    for bucket in targets {
        snapshot.for_each(bucket.as_str(), |key, _| {
            if hit(key, &needle, opts) {
                matches.insert(PathBuf::from(key), bucket.clone());
            }
        })?;
    }
    Ok(matches)
}

fn hit(key: &str, needle: &str, opts: Options) -> bool {
    let haystack = if opts.basename {
        match key.rsplit(['/', '\\']).next() {
            Some(base) => base,
            None => key,
        }
    } else {
        key
    };
    if opts.exact {
        haystack.contains(needle)
    } else {
        haystack.to_lowercase().contains(needle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().expect("must create");
        let store = Store::open(&dir.path().join("index.db"), store::Mode::ReadWrite)
            .expect("must open");
        store.create_bucket("/data/alpha").expect("must create");
        store
            .put("/data/alpha", "/data/alpha/Report.PDF", &[1u8; 32])
            .expect("must put");
        store
            .put("/data/alpha", "/data/alpha/notes.txt", &[2u8; 32])
            .expect("must put");
        (dir, store)
    }

    #[test]
    fn caseless_basename_search_matches() {
        let (_dir, store) = seeded_store();
        let opts = Options::builder().basename(true).build();
        let matches = search(&store, "report.pdf", &[], opts).expect("must search");
        assert_eq!(matches.len(), 1);
        assert!(matches.contains_key(&PathBuf::from("/data/alpha/Report.PDF")));
    }

    #[test]
    fn exact_basename_search_respects_case() {
        let (_dir, store) = seeded_store();
        let opts = Options::builder().basename(true).exact(true).build();
        let matches = search(&store, "report.pdf", &[], opts).expect("must search");
        assert!(matches.is_empty());

        let matches = search(&store, "Report.PDF", &[], opts).expect("must search");
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn full_path_search_sees_directories() {
        let (_dir, store) = seeded_store();
        let matches =
            search(&store, "alpha", &[], Options::default()).expect("must search");
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn basename_search_does_not_see_directories() {
        let (_dir, store) = seeded_store();
        let opts = Options::builder().basename(true).build();
        let matches = search(&store, "alpha", &[], opts).expect("must search");
        assert!(matches.is_empty());
    }

    #[test]
    fn empty_index_is_reported() {
        let dir = tempfile::tempdir().expect("must create");
        let store = Store::open(&dir.path().join("index.db"), store::Mode::ReadWrite)
            .expect("must open");
        assert!(matches!(
            search(&store, "x", &[], Options::default()),
            Err(Error::Empty)
        ));
    }

    #[test]
    fn named_absent_bucket_is_reported() {
        let (_dir, store) = seeded_store();
        let named = vec![BucketName::from_canonical("/absent")];
        assert!(matches!(
            search(&store, "x", &named, Options::default()),
            Err(Error::BucketNotFound { .. })
        ));
    }

    #[test]
    fn results_map_paths_to_their_bucket() {
        let (_dir, store) = seeded_store();
        let matches =
            search(&store, "notes", &[], Options::default()).expect("must search");
        let bucket = matches
            .get(&PathBuf::from("/data/alpha/notes.txt"))
            .expect("must match");
        assert_eq!(bucket.as_str(), "/data/alpha");
    }
}
