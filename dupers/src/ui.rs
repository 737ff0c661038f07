//! Interfaces to the interactive collaborators.
//!
//! The core never talks to the terminal directly; it calls through
//! [`Feedback`], which the CLI implements with [`Terminal`] and tests
//! implement with mocks or scripted fakes.

use std::io::{self, BufRead, Write};

use strum::Display;

/// What a long-running operation is currently doing, for progress output.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Display)]
pub enum Stage {
    /// Counting files for the path sanity gate.
    Checking,

    /// Looking up paths already present in a bucket.
    Looking,

    /// Scanning and hashing new files.
    Scanning,

    /// Reading entries out of the index.
    Reading,
}

/// The default answer for a confirmation prompt.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Answer {
    /// Enter means yes.
    Yes,

    /// Enter means no.
    No,

    /// No default; an empty reply repeats the question.
    Nil,
}

/// The collaborator surface the core calls for progress and interaction.
#[cfg_attr(test, mockall::automock)]
pub trait Feedback {
    /// Report progress: `count` items done of an optional known `total`.
    fn status(&self, stage: Stage, count: u64, total: Option<u64>);

    /// Ask a yes/no question. Returns the user's answer.
    fn confirm(&self, question: &str, default: Answer) -> bool;

    /// Ask for a free-form line of input.
    fn prompt(&self, question: &str) -> String;

    /// Print a normal line of output.
    fn println(&self, msg: &str);

    /// Report a non-fatal problem and continue.
    fn warn(&self, msg: &str);
}

/// The terminal implementation used by the CLI.
#[derive(Clone, Debug, Default)]
pub struct Terminal {
    quiet: bool,
    assume_yes: bool,
}

impl Terminal {
    /// Create a terminal collaborator.
    pub fn new(quiet: bool, assume_yes: bool) -> Self {
        Self { quiet, assume_yes }
    }

    fn read_line(&self) -> String {
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_err() {
            return String::new();
        }
        line.trim().to_owned()
    }
}

impl Feedback for Terminal {
    fn status(&self, stage: Stage, count: u64, total: Option<u64>) {
        if self.quiet {
            return;
        }
        let mut err = io::stderr().lock();
        let _ = match total {
            Some(total) => write!(err, "\r{stage} {count} of {total}…"),
            None => write!(err, "\r{stage} {count}…"),
        };
        let _ = err.flush();
    }

    fn confirm(&self, question: &str, default: Answer) -> bool {
        if self.assume_yes {
            return true;
        }
        let hint = match default {
            Answer::Yes => "[Y/n]",
            Answer::No => "[y/N]",
            Answer::Nil => "[y/n]",
        };
        loop {
            print!("{question} {hint} ");
            let _ = io::stdout().flush();
            let reply = self.read_line();
            match reply.to_lowercase().as_str() {
                "y" | "yes" => return true,
                "n" | "no" => return false,
                "" => match default {
                    Answer::Yes => return true,
                    Answer::No => return false,
                    Answer::Nil => continue,
                },
                _ => continue,
            }
        }
    }

    fn prompt(&self, question: &str) -> String {
        print!("{question} ");
        let _ = io::stdout().flush();
        self.read_line()
    }

    fn println(&self, msg: &str) {
        println!("{msg}");
    }

    fn warn(&self, msg: &str) {
        log::warn!("{msg}");
        if !self.quiet {
            eprintln!("\r{msg}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assume_yes_skips_the_prompt() {
        let terminal = Terminal::new(true, true);
        assert!(terminal.confirm("proceed?", Answer::No));
    }

    #[test]
    fn stages_render_as_words() {
        assert_eq!(Stage::Scanning.to_string(), "Scanning");
        assert_eq!(Stage::Checking.to_string(), "Checking");
    }
}
