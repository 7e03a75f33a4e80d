//! Log tailer
//!
//! Follows a job's output file by re-reading it on a fixed interval and
//! handing over only the lines not seen before. The file may not exist
//! when tailing starts; that is expected while the job spins up and is
//! simply retried.

use pgspawn_core::domain::log::LogCursor;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::context::LogContext;

pub struct LogTailer {
    cursor: LogCursor,
}

impl LogTailer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            cursor: LogCursor::new(path),
        }
    }

    pub fn cursor(&self) -> &LogCursor {
        &self.cursor
    }

    /// Reads the file once and emits every complete line past the cursor
    ///
    /// A trailing line without its newline is left for a later poll. If the
    /// file now holds fewer complete lines than already consumed it is taken
    /// to have been truncated and rewritten, and is read again from the top.
    ///
    /// Returns the number of lines emitted.
    pub async fn poll_once<F>(&mut self, emit: &mut F) -> std::io::Result<usize>
    where
        F: FnMut(&str),
    {
        let bytes = tokio::fs::read(self.cursor.source_path()).await?;
        let content = String::from_utf8_lossy(&bytes);

        let complete = match content.rfind('\n') {
            Some(last) => &content[..=last],
            None => "",
        };
        let total = complete.lines().count();

        if total < self.cursor.line_offset() {
            warn!(
                "{} shrank from {} to {} line(s), reading it again from the start",
                self.cursor.source_path().display(),
                self.cursor.line_offset(),
                total
            );
            self.cursor.reset();
        }

        let mut emitted = 0;
        for line in complete.lines().skip(self.cursor.line_offset()) {
            emit(line);
            emitted += 1;
        }
        self.cursor.advance(emitted);

        Ok(emitted)
    }

    /// Tails the file until `stop` is cancelled
    ///
    /// Stopping is the normal way out of this loop and is not an error.
    /// Read failures are logged and retried on the next poll.
    #[instrument(name = "tail", parent = ctx.span(), skip_all)]
    pub async fn tail<F>(
        &mut self,
        poll_interval: Duration,
        mut emit: F,
        stop: &CancellationToken,
        ctx: &LogContext,
    ) -> u64
    where
        F: FnMut(&str),
    {
        info!(
            "Tailing {} every {:?}",
            self.cursor.source_path().display(),
            poll_interval
        );

        while !stop.is_cancelled() {
            match self.poll_once(&mut emit).await {
                Ok(0) => {}
                Ok(count) => debug!("Read {} new line(s)", count),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!("{} does not exist yet", self.cursor.source_path().display());
                }
                Err(e) => warn!(
                    "Failed to read {}: {}",
                    self.cursor.source_path().display(),
                    e
                ),
            }

            tokio::select! {
                _ = stop.cancelled() => break,
                _ = time::sleep(poll_interval) => {}
            }
        }

        info!(
            "Stopped tailing {} after {} line(s)",
            self.cursor.source_path().display(),
            self.cursor.lines_emitted()
        );

        self.cursor.lines_emitted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn append(path: &Path, text: &str) {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn test_successive_appends_emit_each_line_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slurm-1.out");
        let mut tailer = LogTailer::new(&path);
        let mut seen = Vec::new();
        let mut emit = |line: &str| seen.push(line.to_string());

        append(&path, "one\ntwo\n");
        assert_eq!(tailer.poll_once(&mut emit).await.unwrap(), 2);

        append(&path, "");
        assert_eq!(tailer.poll_once(&mut emit).await.unwrap(), 0);

        append(&path, "three\nfour\nfive\n");
        assert_eq!(tailer.poll_once(&mut emit).await.unwrap(), 3);

        assert_eq!(seen, vec!["one", "two", "three", "four", "five"]);
        assert_eq!(tailer.cursor().lines_emitted(), 5);
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("later.out");
        let mut tailer = LogTailer::new(&path);
        let mut seen: Vec<String> = Vec::new();
        let mut emit = |line: &str| seen.push(line.to_string());

        for _ in 0..2 {
            let err = tailer.poll_once(&mut emit).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotFound);
        }

        append(&path, "ready\n");
        assert_eq!(tailer.poll_once(&mut emit).await.unwrap(), 1);
        assert_eq!(seen, vec!["ready"]);
    }

    #[tokio::test]
    async fn test_partial_line_is_held_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.out");
        let mut tailer = LogTailer::new(&path);
        let mut seen = Vec::new();
        let mut emit = |line: &str| seen.push(line.to_string());

        append(&path, "LOG:  starting\nLOG:  database sys");
        assert_eq!(tailer.poll_once(&mut emit).await.unwrap(), 1);

        append(&path, "tem is ready\r\n");
        assert_eq!(tailer.poll_once(&mut emit).await.unwrap(), 1);

        assert_eq!(
            seen,
            vec!["LOG:  starting", "LOG:  database system is ready"]
        );
    }

    #[tokio::test]
    async fn test_truncated_file_is_read_from_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rotated.out");
        let mut tailer = LogTailer::new(&path);
        let mut seen = Vec::new();
        let mut emit = |line: &str| seen.push(line.to_string());

        append(&path, "a\nb\nc\n");
        assert_eq!(tailer.poll_once(&mut emit).await.unwrap(), 3);

        std::fs::write(&path, "fresh\n").unwrap();
        assert_eq!(tailer.poll_once(&mut emit).await.unwrap(), 1);

        // Unchanged file: nothing new
        assert_eq!(tailer.poll_once(&mut emit).await.unwrap(), 0);

        assert_eq!(seen, vec!["a", "b", "c", "fresh"]);
        assert_eq!(tailer.cursor().lines_emitted(), 4);
        assert_eq!(tailer.cursor().line_offset(), 1);
        assert_eq!(tailer.cursor().resets(), 1);
    }

    #[tokio::test]
    async fn test_tail_waits_for_file_to_appear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slurm-2.out");
        let stop = CancellationToken::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut tailer = LogTailer::new(&path);
        let ctx = LogContext::disabled();

        let sink = Arc::clone(&seen);
        let tail = tailer.tail(
            Duration::from_millis(10),
            move |line: &str| sink.lock().unwrap().push(line.to_string()),
            &stop,
            &ctx,
        );

        let driver = async {
            time::sleep(Duration::from_millis(35)).await;
            append(&path, "10.0.0.7\nLOG:  listening on port 41234\n");

            while seen.lock().unwrap().len() < 2 {
                time::sleep(Duration::from_millis(5)).await;
            }
            stop.cancel();
        };

        let (emitted, ()) = tokio::join!(tail, driver);

        assert_eq!(emitted, 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["10.0.0.7", "LOG:  listening on port 41234"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_sleep_returns_promptly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slurm-3.out");
        append(&path, "x\ny\nz\n");

        let interval = Duration::from_secs(10);
        let stop = CancellationToken::new();
        let mut seen = Vec::new();
        let mut tailer = LogTailer::new(&path);
        let ctx = LogContext::disabled();
        let start = Instant::now();

        let tail = tailer.tail(
            interval,
            |line: &str| seen.push(line.to_string()),
            &stop,
            &ctx,
        );
        let driver = async {
            time::sleep(Duration::from_secs(1)).await;
            stop.cancel();
        };

        let (emitted, ()) = tokio::join!(tail, driver);

        assert!(start.elapsed() < interval);
        assert_eq!(emitted, 3);
        assert_eq!(seen, vec!["x", "y", "z"]);
    }

    #[tokio::test]
    async fn test_already_stopped_reads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slurm-4.out");
        append(&path, "never\n");

        let stop = CancellationToken::new();
        stop.cancel();
        let mut tailer = LogTailer::new(&path);

        let emitted = tailer
            .tail(
                Duration::from_secs(10),
                |_: &str| panic!("nothing should be emitted"),
                &stop,
                &LogContext::disabled(),
            )
            .await;

        assert_eq!(emitted, 0);
    }
}
