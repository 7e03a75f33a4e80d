//! Log cursor

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Position of a tailer within a job's output file
///
/// `lines_emitted` counts every line handed to the consumer and never goes
/// down. `line_offset` is the number of complete lines of the *current* file
/// contents already consumed; it only moves backwards through [`reset`],
/// when the file has been truncated and rewritten.
///
/// [`reset`]: LogCursor::reset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogCursor {
    source_path: PathBuf,
    lines_emitted: u64,
    line_offset: usize,
    resets: u32,
}

impl LogCursor {
    pub fn new(source_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            lines_emitted: 0,
            line_offset: 0,
            resets: 0,
        }
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn lines_emitted(&self) -> u64 {
        self.lines_emitted
    }

    pub fn line_offset(&self) -> usize {
        self.line_offset
    }

    /// How many times the source was seen shrinking
    pub fn resets(&self) -> u32 {
        self.resets
    }

    /// Records that `count` further lines were emitted
    pub fn advance(&mut self, count: usize) {
        self.line_offset += count;
        self.lines_emitted += count as u64;
    }

    /// Restarts at the top of a file that was truncated
    pub fn reset(&mut self) {
        self.line_offset = 0;
        self.resets += 1;
    }
}
