//! The hashing worker.
//!
//! Hashing is offloaded to a dedicated thread; the crawler dispatches one
//! file at a time and blocks until the digest comes back, which keeps the
//! visit order and progress output deterministic while letting directory
//! enumeration overlap with the tail of the previous hash.

use std::{
    io,
    path::{Path, PathBuf},
    thread,
};

use checksum::Digest;
use crossbeam::channel::{bounded, Receiver, Sender};
use log::debug;

/// A handle on the hashing thread.
pub struct Pool {
    jobs: Option<Sender<PathBuf>>,
    results: Receiver<Result<Digest, checksum::Error>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Pool {
    /// Spawn the hashing thread.
    pub fn spawn() -> Self {
        let (jobs, incoming) = bounded::<PathBuf>(1);
        let (outgoing, results) = bounded(1);
        let worker = thread::spawn(move || {
            for path in incoming {
                if outgoing.send(checksum::hash_file(&path)).is_err() {
                    break;
                }
            }
            debug!("hash worker exiting");
        });
        Self {
            jobs: Some(jobs),
            results,
            worker: Some(worker),
        }
    }

    /// Hash one file on the worker thread, blocking until it completes.
    ///
    /// A single hash is not interruptible; the worker finishes the file or
    /// returns the read error.
    pub fn hash(&self, path: &Path) -> Result<Digest, checksum::Error> {
        let sent = match &self.jobs {
            Some(jobs) => jobs.send(path.to_owned()).is_ok(),
            None => false,
        };
        if !sent {
            return Err(checksum::Error::Io(worker_gone()));
        }
        match self.results.recv() {
            Ok(result) => result,
            Err(_) => Err(checksum::Error::Io(worker_gone())),
        }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        // Closing the job channel ends the worker loop.
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "hash worker exited")
}
