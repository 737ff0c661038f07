//! The dupers command-line interface.
//!
//! A thin shell over the library: it parses the subcommand surface, opens
//! the database in the right mode, and hands the store and the terminal
//! collaborator to the core operations.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use dupers::{
    bucket, config::Config, export, run, search,
    ui::{Answer, Feedback, Terminal},
};
use log::{debug, Level};
use pathform::BucketName;
use stable_eyre::{eyre::Context, Result};
use stderrlog::ColorChoice;
use store::{Mode, Store};

#[derive(Parser, Debug)]
#[clap(version, about)]
struct Cmd {
    /// Enable debug logging.
    #[clap(long, short, global = true)]
    debug: bool,

    /// Suppress non-essential output.
    #[clap(long, short, global = true)]
    quiet: bool,

    /// Answer yes to every confirmation prompt.
    #[clap(long, short = 'y', global = true)]
    yes: bool,

    /// Use a separate test database instead of the real index.
    #[clap(long, hide = true, global = true)]
    test_mode: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find duplicates of a source file or directory in indexed buckets.
    Dupe {
        /// The file or directory to check.
        source: PathBuf,

        /// The buckets to check against; all buckets when omitted.
        buckets: Vec<PathBuf>,

        /// Skip the clean pass and compare by index lookup, without hashing.
        #[clap(long)]
        fast: bool,

        /// Delete every reported duplicate from the source afterwards.
        #[clap(long)]
        delete: bool,

        /// As --delete, and also remove directories left empty.
        #[clap(long = "delete+")]
        delete_plus: bool,

        /// Purge every non-unique file under the source (asks first).
        #[clap(long)]
        sensen: bool,
    },

    /// Search indexed filenames for a substring.
    Search {
        /// The substring to look for.
        term: String,

        /// The buckets to search; all buckets when omitted.
        buckets: Vec<PathBuf>,

        /// Match against basenames only instead of whole paths.
        #[clap(long)]
        name: bool,

        /// Match case-sensitively.
        #[clap(long)]
        exact: bool,
    },

    /// Index or refresh a directory bucket.
    Up {
        /// The directory to index.
        bucket: PathBuf,
    },

    /// Index or refresh a directory bucket, including archive contents.
    #[clap(name = "up+")]
    UpPlus {
        /// The directory to index.
        bucket: PathBuf,
    },

    /// Database maintenance.
    #[clap(subcommand)]
    Db(DbCommand),
}

#[derive(Subcommand, Debug)]
enum DbCommand {
    /// Show the database location, size and buckets.
    Info,

    /// Copy the database file into your home directory.
    Backup,

    /// Remove entries for files that no longer exist.
    Clean {
        /// The buckets to clean; all buckets when omitted.
        buckets: Vec<PathBuf>,
    },

    /// Rewrite the database to reclaim space.
    Compact,

    /// List the entries of one bucket.
    Ls {
        /// The bucket to list.
        bucket: PathBuf,
    },

    /// Rename a bucket (the directory on disk is untouched).
    Mv {
        /// The bucket to rename.
        bucket: PathBuf,

        /// The new bucket name.
        new_name: PathBuf,
    },

    /// Remove a bucket and all its entries.
    Rm {
        /// The bucket to remove.
        bucket: PathBuf,
    },

    /// Export a bucket as CSV.
    Export {
        /// The bucket to export.
        bucket: PathBuf,

        /// Destination file; defaults to a timestamped file in your home.
        #[clap(long)]
        to: Option<PathBuf>,
    },

    /// Import a CSV export into the index.
    Import {
        /// The CSV file to read.
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    stable_eyre::install()?;
    let cmd = Cmd::parse();
    init_logging(&cmd)?;

    let config = Config::new(cmd.test_mode, cmd.debug, cmd.quiet, cmd.yes)
        .context("resolve configuration")?;
    let ui = Terminal::new(config.quiet(), config.assume_yes());
    debug!("database: {:?}", config.db_path());

    match dispatch(&cmd, &config, &ui) {
        Ok(()) => Ok(()),
        Err(dupers::Error::NothingToClean) => {
            ui.println("Nothing to clean.");
            Ok(())
        }
        Err(dupers::Error::Aborted) => {
            ui.println("Aborted.");
            Ok(())
        }
        Err(err) if err.is_corrupt() => {
            eprintln!("{err}");
            std::process::exit(1);
        }
        Err(err) => Err(err).context("dupers failed"),
    }
}

fn dispatch(cmd: &Cmd, config: &Config, ui: &Terminal) -> dupers::Result<()> {
    let token = cancel::Token::new();
    match &cmd.command {
        Command::Dupe {
            source,
            buckets,
            fast,
            delete,
            delete_plus,
            sensen,
        } => {
            let store = open_rw(config, ui)?;
            let named = canonical_all(buckets)?;
            let opts = run::DupeOptions::builder()
                .fast(*fast)
                .delete(*delete)
                .delete_plus(*delete_plus)
                .sensen(*sensen)
                .build();
            run::dupe(&store, ui, &token, source, &named, opts)?;
            Ok(())
        }
        Command::Search {
            term,
            buckets,
            name,
            exact,
        } => {
            let store = open_ro(config, ui)?;
            let named = canonical_all(buckets)?;
            let opts = search::Options::builder()
                .basename(*name)
                .exact(*exact)
                .build();
            let matches = search::search(&store, term, &named, opts)?;
            let mut current: Option<&BucketName> = None;
            for (path, bucket) in &matches {
                if current != Some(bucket) {
                    ui.println(&format!("\n{bucket}:"));
                    current = Some(bucket);
                }
                ui.println(&path.display().to_string());
            }
            ui.println(&format!("\n{} match(es) for '{term}'", matches.len()));
            Ok(())
        }
        Command::Up { bucket } => up(config, ui, &token, bucket, false),
        Command::UpPlus { bucket } => up(config, ui, &token, bucket, true),
        Command::Db(db) => dispatch_db(db, config, ui),
    }
}

fn up(
    config: &Config,
    ui: &Terminal,
    token: &cancel::Token,
    bucket: &Path,
    archives: bool,
) -> dupers::Result<()> {
    let store = open_rw(config, ui)?;
    let name = BucketName::new(bucket)?;
    run::update(&store, ui, token, &name, archives)?;
    Ok(())
}

fn dispatch_db(db: &DbCommand, config: &Config, ui: &Terminal) -> dupers::Result<()> {
    match db {
        DbCommand::Info => {
            let store = open_ro(config, ui)?;
            ui.println(&bucket::info(&store)?);
            Ok(())
        }
        DbCommand::Backup => {
            let store = open_ro(config, ui)?;
            let (bytes, dest) = bucket::backup(&store, config)?;
            ui.println(&format!("wrote {bytes} bytes to {}", dest.display()));
            Ok(())
        }
        DbCommand::Clean { buckets } => {
            let store = open_rw(config, ui)?;
            let named = canonical_all(buckets)?;
            let report = bucket::clean(&store, ui, &named, config.debug())?;
            ui.println(&format!(
                "cleaned {} bucket(s), removed {} entr(ies)",
                report.buckets, report.removed
            ));
            Ok(())
        }
        DbCommand::Compact => {
            let store = open_rw(config, ui)?;
            bucket::compact(store, ui)?;
            Ok(())
        }
        DbCommand::Ls { bucket } => {
            let store = open_ro(config, ui)?;
            let name = BucketName::new(bucket)?;
            let entries = bucket::ls(&store, &name)?;
            for (key, digest) in &entries {
                ui.println(&format!("{digest} {key}"));
            }
            ui.println(&format!("{} entr(ies) in {name}", entries.len()));
            Ok(())
        }
        DbCommand::Mv { bucket, new_name } => {
            let store = open_rw(config, ui)?;
            let old = BucketName::new(bucket)?;
            let new = BucketName::new(new_name)?;
            let question = format!("Rename bucket {old} to {new}?");
            if !ui.confirm(&question, Answer::No) {
                return Err(dupers::Error::Aborted);
            }
            let moved = bucket::rename(&store, &old, &new)?;
            ui.println(&format!("renamed {old} to {new} ({moved} entr(ies))"));
            Ok(())
        }
        DbCommand::Rm { bucket } => {
            let store = open_rw(config, ui)?;
            let name = BucketName::new(bucket)?;
            let entries = bucket::count(&store, &name)?;
            let question = format!("Remove bucket {name} and its {entries} entr(ies)?");
            if !ui.confirm(&question, Answer::No) {
                return Err(dupers::Error::Aborted);
            }
            store.delete_bucket(name.as_str())?;
            ui.println(&format!("removed {name}"));
            Ok(())
        }
        DbCommand::Export { bucket, to } => {
            let store = open_ro(config, ui)?;
            let name = BucketName::new(bucket)?;
            let (dest, rows) = export::export(&store, config, &name, to.clone())?;
            ui.println(&format!("exported {rows} row(s) to {}", dest.display()));
            Ok(())
        }
        DbCommand::Import { file } => {
            let store = open_rw(config, ui)?;
            let (name, imported) = export::import(&store, ui, file)?;
            ui.println(&format!("imported {imported} entr(ies) into {name}"));
            Ok(())
        }
    }
}

/// Open the database read/write, creating it on first use.
fn open_rw(config: &Config, ui: &Terminal) -> dupers::Result<Store> {
    let store = Store::open(config.db_path(), Mode::ReadWrite)?;
    report_recovery(&store, ui);
    Ok(store)
}

/// Open the database read-only, falling back to read/write creation on a
/// fresh install so first-run maintenance commands still succeed.
fn open_ro(config: &Config, ui: &Terminal) -> dupers::Result<Store> {
    match Store::open(config.db_path(), Mode::ReadOnly) {
        Ok(store) => {
            report_recovery(&store, ui);
            Ok(store)
        }
        Err(store::Error::NotFound { path }) => {
            ui.println(&format!("Creating a new database at {:?}.", path));
            open_rw(config, ui)
        }
        Err(err) => Err(err.into()),
    }
}

fn report_recovery(store: &Store, ui: &Terminal) {
    if store.recovered() {
        ui.warn("the database file was empty and has been recreated");
    }
}

fn canonical_all(paths: &[PathBuf]) -> dupers::Result<Vec<BucketName>> {
    paths.iter().map(BucketName::new).collect::<Result<_, _>>().map_err(Into::into)
}

/// Configures the global logger for the application.
fn init_logging(cmd: &Cmd) -> Result<()> {
    stderrlog::new()
        .modules(["dupers", "store", "checksum", "pathform"])
        .color(ColorChoice::Never)
        .quiet(cmd.quiet)
        .verbosity(if cmd.debug { Level::Debug } else { Level::Info })
        .init()?;
    Ok(())
}
