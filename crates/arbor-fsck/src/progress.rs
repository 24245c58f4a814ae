//! User-facing progress output.
//!
//! The sweep reports through a [`ProgressSink`] so front-ends decide where
//! text goes and tests can capture it. Structured logs go through `tracing`
//! independently of this.

use std::io::{self, Write};

/// Receiver for the sweep's human-readable output.
pub trait ProgressSink {
    /// Informational text. Phase and progress lines are withheld from it
    /// when the sweep is quiet; summaries are not.
    fn status(&mut self, line: &str);

    /// Missing or corrupt objects and other findings. Always called.
    fn problem(&mut self, line: &str);

    /// Called after each reachable object has been checked.
    fn object_checked(&mut self, _done: usize, _total: usize) {}
}

/// Status to stdout, problems to stderr.
#[derive(Debug, Default)]
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn status(&mut self, line: &str) {
        let _ = writeln!(io::stdout(), "{line}");
    }

    fn problem(&mut self, line: &str) {
        let _ = writeln!(io::stderr(), "{line}");
    }
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn status(&mut self, _line: &str) {}
    fn problem(&mut self, _line: &str) {}
}

/// Keeps every line, for embedding and tests.
#[derive(Clone, Debug, Default)]
pub struct RecordingProgress {
    pub status: Vec<String>,
    pub problems: Vec<String>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any recorded line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.status.iter().chain(&self.problems).any(|l| l.contains(needle))
    }
}

impl ProgressSink for RecordingProgress {
    fn status(&mut self, line: &str) {
        self.status.push(line.to_string());
    }

    fn problem(&mut self, line: &str) {
        self.problems.push(line.to_string());
    }
}

/// Indices at which an "i/N objects" line is due: roughly every tenth.
pub(crate) fn progress_due(index: usize, total: usize) -> bool {
    let step = total / 10;
    step == 0 || index % step == 0
}
