//! Shared fixtures for the integration tests.

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::Mutex,
};

use dupers::ui::{Answer, Feedback, Stage};
use store::{Mode, Store};

/// A feedback collaborator with scripted answers and recorded output.
#[derive(Default)]
pub struct Scripted {
    confirms: Mutex<VecDeque<bool>>,
    prompts: Mutex<VecDeque<String>>,
    lines: Mutex<Vec<String>>,
}

impl Scripted {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the answer for the next confirmation prompt.
    pub fn push_confirm(&self, answer: bool) {
        self.confirms.lock().expect("lock").push_back(answer);
    }

    /// Queue the reply for the next free-form prompt.
    pub fn push_prompt(&self, reply: &str) {
        self.prompts
            .lock()
            .expect("lock")
            .push_back(reply.to_owned());
    }

    /// Everything printed or warned so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("lock").clone()
    }
}

impl Feedback for Scripted {
    fn status(&self, _: Stage, _: u64, _: Option<u64>) {}

    fn confirm(&self, _: &str, default: Answer) -> bool {
        match self.confirms.lock().expect("lock").pop_front() {
            Some(answer) => answer,
            None => matches!(default, Answer::Yes),
        }
    }

    fn prompt(&self, _: &str) -> String {
        self.prompts
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_default()
    }

    fn println(&self, msg: &str) {
        self.lines.lock().expect("lock").push(msg.to_owned());
    }

    fn warn(&self, msg: &str) {
        self.lines.lock().expect("lock").push(format!("warn: {msg}"));
    }
}

/// Open a fresh read/write database under `dir`.
pub fn open_store(dir: &Path) -> Store {
    Store::open(&dir.join("index.db"), Mode::ReadWrite).expect("must open store")
}

/// Create a file with the given content, creating parents as needed.
pub fn write_file(path: &Path, content: &[u8]) -> PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("must create parents");
    }
    std::fs::write(path, content).expect("must write file");
    path.to_owned()
}
