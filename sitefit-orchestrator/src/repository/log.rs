//! Job log store
//!
//! Append-only log of one job. Every line is written to the workspace's
//! `engine.log` and kept in a bounded in-memory window for API reads.
//! Line N of the file holds entry N, so reads older than the window are
//! served from the file.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sitefit_core::domain::log::{LogEntry, LogStream};

/// Append-only job log
///
/// Appends happen under one lock, so readers always see a prefix of what
/// was written, in order.
#[derive(Debug)]
pub struct JobLog {
    state: Mutex<LogState>,
    retain: usize,
}

#[derive(Debug)]
struct LogState {
    next_seq: u64,
    window: VecDeque<LogEntry>,
    file: Option<File>,
    path: Option<PathBuf>,
}

impl JobLog {
    /// Opens (or creates) the log file at `path` for appending
    pub fn create(path: &Path, retain: usize) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::with_file(Some((file, path.to_path_buf())), retain))
    }

    /// Log without a backing file
    pub fn in_memory(retain: usize) -> Self {
        Self::with_file(None, retain)
    }

    fn with_file(file: Option<(File, PathBuf)>, retain: usize) -> Self {
        let (file, path) = file.unzip();
        Self {
            state: Mutex::new(LogState {
                next_seq: 1,
                window: VecDeque::new(),
                file,
                path,
            }),
            retain: retain.max(1),
        }
    }

    /// Reloads the last `retain` lines of an existing log file
    ///
    /// Used when jobs are restored after a restart. The file stays open for
    /// appending and sequence numbers continue after the restored lines.
    /// Bytes that are not valid UTF-8 are replaced, not rejected.
    pub fn restore(path: &Path, retain: usize) -> io::Result<Self> {
        let log = match File::open(path) {
            Ok(file) => {
                let log = Self::create(path, retain)?;
                {
                    let mut state = log.state.lock();
                    let mut lines = LossyLines::new(file);
                    while let Some(line) = lines.next_line()? {
                        let entry = parse_line(state.next_seq, &line);
                        state.next_seq += 1;
                        push_bounded(&mut state.window, entry, log.retain);
                    }
                }
                log
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Self::in_memory(retain),
            Err(e) => return Err(e),
        };
        Ok(log)
    }

    /// Appends one entry per line of `message` and returns the last sequence number
    pub fn append(&self, stream: LogStream, message: impl AsRef<str>) -> u64 {
        let mut state = self.state.lock();
        for line in message.as_ref().lines() {
            let entry = LogEntry {
                seq: state.next_seq,
                timestamp: Utc::now(),
                stream,
                message: line.to_string(),
            };
            state.next_seq += 1;

            if let Some(file) = state.file.as_mut()
                && let Err(e) = writeln!(file, "{}", format_line(&entry))
            {
                tracing::warn!("Failed to write job log file, keeping log in memory only: {}", e);
                state.file = None;
                state.path = None;
            }
            push_bounded(&mut state.window, entry, self.retain);
        }
        state.next_seq - 1
    }

    /// Sequence number of the most recent entry, 0 when empty
    pub fn last_seq(&self) -> u64 {
        self.state.lock().next_seq - 1
    }

    /// The last `n` entries
    pub fn tail(&self, n: usize) -> Vec<LogEntry> {
        let state = self.state.lock();
        let skip = state.window.len().saturating_sub(n);
        state.window.iter().skip(skip).cloned().collect()
    }

    /// Messages of the last `n` entries
    pub fn tail_lines(&self, n: usize) -> Vec<String> {
        self.tail(n).into_iter().map(|e| e.message).collect()
    }

    /// Whether entries are also written to a log file
    pub fn is_persisted(&self) -> bool {
        self.state.lock().path.is_some()
    }

    /// Sequence number of the oldest entry still readable, 0 when empty
    pub fn first_available_seq(&self) -> u64 {
        let state = self.state.lock();
        match (&state.path, state.window.front()) {
            (Some(_), Some(_)) => 1,
            (None, Some(front)) => front.seq,
            (_, None) => 0,
        }
    }

    /// Up to `limit` entries with `seq > after`
    ///
    /// Entries that fell out of the window are read back from the log file.
    /// Without a file only the window is available.
    pub fn since(&self, after: u64, limit: usize) -> Vec<LogEntry> {
        let (path, first_retained) = {
            let state = self.state.lock();
            match (&state.path, state.window.front()) {
                (Some(path), Some(front)) if after.saturating_add(1) < front.seq => {
                    (path.clone(), front.seq)
                }
                _ => return window_since(&state.window, after, limit),
            }
        };

        // Lines below the window are never rewritten, so the file is read
        // without holding the lock.
        let mut entries = match read_range(&path, after, first_retained, limit) {
            Ok(entries) if !entries.is_empty() => entries,
            Ok(_) => return window_since(&self.state.lock().window, after, limit),
            Err(e) => {
                tracing::warn!("Failed to read job log file {}: {}", path.display(), e);
                return window_since(&self.state.lock().window, after, limit);
            }
        };
        if entries.len() < limit
            && let Some(last) = entries.last().map(|e| e.seq)
        {
            let remaining = limit - entries.len();
            entries.extend(self.since(last, remaining));
        }
        entries
    }
}

fn window_since(window: &VecDeque<LogEntry>, after: u64, limit: usize) -> Vec<LogEntry> {
    window
        .iter()
        .filter(|e| e.seq > after)
        .take(limit)
        .cloned()
        .collect()
}

/// Entries `after < seq < before` from the log file, at most `limit`
fn read_range(path: &Path, after: u64, before: u64, limit: usize) -> io::Result<Vec<LogEntry>> {
    let mut lines = LossyLines::new(File::open(path)?);
    let mut entries = Vec::new();
    let mut seq = 0;
    while entries.len() < limit
        && let Some(line) = lines.next_line()?
    {
        seq += 1;
        if seq >= before {
            break;
        }
        if seq > after {
            entries.push(parse_line(seq, &line));
        }
    }
    Ok(entries)
}

/// Line reader that decodes lossily instead of failing on invalid UTF-8
struct LossyLines {
    reader: BufReader<File>,
    buf: Vec<u8>,
}

impl LossyLines {
    fn new(file: File) -> Self {
        Self {
            reader: BufReader::new(file),
            buf: Vec::new(),
        }
    }

    fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&self.buf);
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }
}

fn push_bounded(window: &mut VecDeque<LogEntry>, entry: LogEntry, retain: usize) {
    if window.len() == retain {
        window.pop_front();
    }
    window.push_back(entry);
}

/// `<rfc3339 timestamp> <stream> <message>`
fn format_line(entry: &LogEntry) -> String {
    format!("{} {} {}", entry.timestamp.to_rfc3339(), entry.stream, entry.message)
}

fn parse_line(seq: u64, line: &str) -> LogEntry {
    let mut parts = line.splitn(3, ' ');
    let timestamp = parts
        .next()
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&Utc));
    let stream = match parts.next() {
        Some("stdout") => Some(LogStream::Stdout),
        Some("stderr") => Some(LogStream::Stderr),
        Some("orchestrator") => Some(LogStream::Orchestrator),
        _ => None,
    };

    match (timestamp, stream) {
        (Some(timestamp), Some(stream)) => LogEntry {
            seq,
            timestamp,
            stream,
            message: parts.next().unwrap_or_default().to_string(),
        },
        _ => LogEntry {
            seq,
            timestamp: Utc::now(),
            stream: LogStream::Stdout,
            message: line.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_append_assigns_sequence_and_writes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("engine.log");
        let log = JobLog::create(&path, 100).unwrap();

        assert_eq!(log.append(LogStream::Stdout, "cycle 1"), 1);
        assert_eq!(log.append(LogStream::Stderr, "warn a\nwarn b"), 3);
        assert_eq!(log.last_seq(), 3);

        let tail = log.tail(2);
        assert_eq!(tail[0].message, "warn a");
        assert_eq!(tail[1].seq, 3);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 3);
        assert!(contents.lines().next().unwrap().ends_with(" stdout cycle 1"));
    }

    #[test]
    fn test_window_is_bounded() {
        let log = JobLog::in_memory(3);
        for i in 0..10 {
            log.append(LogStream::Stdout, format!("line {i}"));
        }
        assert_eq!(log.tail(100).len(), 3);
        assert_eq!(log.tail_lines(1), vec!["line 9"]);
        assert_eq!(log.since(0, 100)[0].seq, 8);
        assert_eq!(log.first_available_seq(), 8);
        assert_eq!(log.last_seq(), 10);
    }

    #[test]
    fn test_since_reads_evicted_entries_from_file() {
        let dir = TempDir::new().unwrap();
        let log = JobLog::create(&dir.path().join("engine.log"), 3).unwrap();
        for i in 1..=10 {
            log.append(LogStream::Stdout, format!("line {i}"));
        }
        assert_eq!(log.first_available_seq(), 1);

        let first = log.since(0, 4);
        assert_eq!(first.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert_eq!(first[0].message, "line 1");
        assert_eq!(first[0].stream, LogStream::Stdout);

        // A page spanning the file and the window.
        let rest = log.since(4, 100);
        assert_eq!(
            rest.iter().map(|e| e.seq).collect::<Vec<_>>(),
            (5..=10).collect::<Vec<_>>()
        );
        assert_eq!(rest.last().unwrap().message, "line 10");
    }

    #[test]
    fn test_since_pages_forward() {
        let log = JobLog::in_memory(100);
        for i in 0..5 {
            log.append(LogStream::Stdout, format!("{i}"));
        }
        let first = log.since(0, 2);
        assert_eq!(first.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 2]);
        let rest = log.since(2, 10);
        assert_eq!(rest.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![3, 4, 5]);
        assert!(log.since(5, 10).is_empty());
    }

    #[test]
    fn test_restore_continues_sequence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("engine.log");
        {
            let log = JobLog::create(&path, 100).unwrap();
            log.append(LogStream::Orchestrator, "job queued");
            log.append(LogStream::Stdout, "with  two  spaces");
        }

        let log = JobLog::restore(&path, 100).unwrap();
        let tail = log.tail(10);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].stream, LogStream::Orchestrator);
        assert_eq!(tail[1].message, "with  two  spaces");
        assert_eq!(log.append(LogStream::Orchestrator, "restored"), 3);

        let missing = JobLog::restore(&dir.path().join("none.log"), 10).unwrap();
        assert_eq!(missing.last_seq(), 0);
    }

    #[test]
    fn test_restore_tolerates_invalid_utf8() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("engine.log");
        std::fs::write(&path, b"caf\xe9 au lait\r\nsecond line\n").unwrap();

        let log = JobLog::restore(&path, 10).unwrap();
        let tail = log.tail(10);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].message, "caf\u{FFFD} au lait");
        assert_eq!(tail[1].message, "second line");
        assert_eq!(log.append(LogStream::Orchestrator, "restored"), 3);
    }

    #[test]
    fn test_concurrent_readers_see_prefix() {
        let log = Arc::new(JobLog::in_memory(10_000));
        let writer = {
            let log = Arc::clone(&log);
            std::thread::spawn(move || {
                for i in 0..2000 {
                    log.append(LogStream::Stdout, format!("{i}"));
                }
            })
        };

        for _ in 0..50 {
            let seen = log.since(0, usize::MAX);
            for (idx, entry) in seen.iter().enumerate() {
                assert_eq!(entry.seq, idx as u64 + 1);
                assert_eq!(entry.message, idx.to_string());
            }
        }
        writer.join().unwrap();
        assert_eq!(log.last_seq(), 2000);
    }
}
