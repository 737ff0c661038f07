//! The orchestrator: sequences the primary `dupe` and `up` operations.
//!
//! A `dupe` run moves through a fixed sequence of phases: the path sanity
//! gate, the source walk, a clean pass per bucket (unless fast), loading the
//! compare tables, crawling any bucket that has never been indexed, the
//! comparison itself, reporting, and the optional purge. A fatal error in
//! any phase ends the run; soft per-item errors are reported by the phase
//! and the run continues. Cancellation is cooperative: the token is checked
//! between items, so a cancel lands after the current file.
//!
//! The orchestrator owns the database handle for the duration of a call and
//! lends it to the crawler, comparator and maintenance passes.

use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use cancel::Token;
use defer_lite::defer;
use log::debug;
use num_format::{Locale, ToFormattedString};
use pathform::BucketName;
use store::Store;
use typed_builder::TypedBuilder;

use crate::{
    bucket,
    compare::{self, CompareTable, Duplicate},
    ui::{Answer, Feedback, Stage},
    walk::{self, Crawler},
    worker, Error, Result,
};

/// The phases of a dupe run, in order. Logged for debugging.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum Phase {
    Gate,
    WalkSource,
    Clean,
    LoadIndex,
    Crawl,
    Compare,
    Report,
    Purge,
    Done,
}

fn enter(phase: Phase) {
    debug!("phase: {phase:?}");
}

/// Options for a dupe run.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default, TypedBuilder)]
pub struct DupeOptions {
    /// Skip the clean pass and compare by index lookup instead of hashing.
    #[builder(default)]
    pub fast: bool,

    /// Delete every reported duplicate source from disk afterwards.
    #[builder(default)]
    pub delete: bool,

    /// As `delete`, and also remove directories left empty.
    #[builder(default)]
    pub delete_plus: bool,

    /// The opt-in purge of every non-unique file (confirmation required).
    #[builder(default)]
    pub sensen: bool,
}

/// The outcome of a dupe run.
#[derive(Clone, Debug)]
pub struct DupeReport {
    /// The duplicates found, in source walk order.
    pub duplicates: Vec<Duplicate>,

    /// How many source files were checked.
    pub checked: u64,

    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

/// The outcome of an update run.
#[derive(Clone, Copy, Debug)]
pub struct UpdateReport {
    /// What the crawl did.
    pub stats: walk::CrawlStats,

    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

/// Find duplicates of `source` against the named buckets, or against every
/// bucket when none are named.
pub fn dupe(
    store: &Store,
    ui: &dyn Feedback,
    token: &Token,
    source: &Path,
    named: &[BucketName],
    opts: DupeOptions,
) -> Result<DupeReport> {
    let started = Instant::now();
    defer! { debug!("exited dupe"); }

    let source = PathBuf::from(pathform::canonical(source)?);
    let buckets: Vec<BucketName> = if named.is_empty() {
        store
            .buckets()?
            .into_iter()
            .map(BucketName::from_canonical)
            .collect()
    } else {
        named.to_vec()
    };
    if buckets.is_empty() {
        return Err(Error::Empty);
    }

    enter(Phase::Gate);
    gate(ui, &source, &buckets)?;

    enter(Phase::WalkSource);
    let sources = walk::collect_sources(&source)?;
    debug!("{} source file(s) to check", sources.len());

    if !opts.fast {
        enter(Phase::Clean);
        for bucket in &buckets {
            if store.bucket_exists(bucket.as_str())? {
                bucket::clean(store, ui, std::slice::from_ref(bucket), false)?;
            }
        }
    }

    enter(Phase::LoadIndex);
    let pool = worker::Pool::spawn();
    let crawler = Crawler::new(store, ui, &pool, token, false);
    let mut table = CompareTable::new();
    for bucket in &buckets {
        if store.bucket_exists(bucket.as_str())? && store.count(bucket.as_str())? > 0 {
            compare::load_table(store, ui, std::slice::from_ref(bucket), &mut table)?;
        } else {
            enter(Phase::Crawl);
            crawler.crawl(bucket, &mut table)?;
        }
        if token.check_cancel().is_err() {
            return Err(Error::Cancelled);
        }
    }

    enter(Phase::Compare);
    let duplicates = if opts.fast {
        compare::find_fast(&sources, &table, store, &buckets, ui)?
    } else {
        compare::find(&sources, &table, &pool, ui, token)?
    };

    enter(Phase::Report);
    if duplicates.is_empty() {
        ui.println("No duplicates found.");
    }
    for dupe in &duplicates {
        ui.println(&format!(
            "{} is a duplicate of {}",
            dupe.source.display(),
            dupe.target.display()
        ));
    }

    if opts.sensen {
        enter(Phase::Purge);
        let removed = compare::sensen(&source, &duplicates, ui)?;
        ui.println(&format!("purged {removed} file(s)"));
    } else if opts.delete || opts.delete_plus {
        enter(Phase::Purge);
        compare::remove_files(&duplicates, ui);
        if opts.delete_plus {
            compare::prune_empty_dirs(&source)?;
        }
    }

    enter(Phase::Done);
    let report = DupeReport {
        checked: sources.len() as u64,
        duplicates,
        elapsed: started.elapsed(),
    };
    summary(ui, report.checked, report.elapsed);
    Ok(report)
}

/// Index or refresh one bucket, optionally descending into archives.
pub fn update(
    store: &Store,
    ui: &dyn Feedback,
    token: &Token,
    name: &BucketName,
    archives: bool,
) -> Result<UpdateReport> {
    let started = Instant::now();
    defer! { debug!("exited update"); }

    let pool = worker::Pool::spawn();
    let crawler = Crawler::new(store, ui, &pool, token, archives);
    let mut table = CompareTable::new();
    let stats = crawler.crawl(name, &mut table)?;

    let elapsed = started.elapsed();
    summary(ui, stats.files, elapsed);
    Ok(UpdateReport { stats, elapsed })
}

/// The path sanity gate: when the source holds more than twice as many
/// files as all the buckets combined, the arguments were probably given in
/// the wrong order; ask before doing a huge amount of hashing.
fn gate(ui: &dyn Feedback, source: &Path, buckets: &[BucketName]) -> Result<()> {
    let check_count = walk::count_files(source, None)?;
    ui.status(Stage::Checking, check_count, None);
    let threshold = check_count / 2;
    if threshold == 0 {
        return Ok(());
    }

    let mut bucket_count = 0;
    for bucket in buckets {
        if !bucket.as_path().is_dir() {
            continue;
        }
        let remaining = threshold.saturating_sub(bucket_count);
        bucket_count += walk::count_files(bucket.as_path(), Some(remaining))?;
        if bucket_count >= threshold {
            return Ok(());
        }
    }

    let question = format!(
        "The source {source:?} holds many more files than the bucket(s); \
         were the arguments swapped? Continue anyway?"
    );
    if ui.confirm(&question, Answer::No) {
        Ok(())
    } else {
        Err(Error::Aborted)
    }
}

fn summary(ui: &dyn Feedback, files: u64, elapsed: Duration) {
    ui.println(&format!(
        "Total: {} file(s) in {:.2}s",
        files.to_formatted_string(&Locale::en),
        elapsed.as_secs_f64()
    ));
}
