//! Append-only response log
//!
//! Records are written inside the retire critical section, so
//! implementations must not block for long and must not call back into the
//! order ledger.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::{OmsError, OmsResult};
use crate::order::ResponseRecord;

/// Durable sink for correlated responses
pub trait ResponseLog: Send + Sync {
    /// Append one record; an error leaves the order un-retired
    fn append(&self, record: &ResponseRecord) -> OmsResult<()>;

    /// All records in append order
    fn records(&self) -> OmsResult<Vec<ResponseRecord>>;

    /// Number of records appended
    fn len(&self) -> OmsResult<usize>;

    fn is_empty(&self) -> OmsResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// In-memory response log
#[derive(Debug, Default)]
pub struct MemoryResponseLog {
    records: Mutex<Vec<ResponseRecord>>,
}

impl MemoryResponseLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResponseLog for MemoryResponseLog {
    fn append(&self, record: &ResponseRecord) -> OmsResult<()> {
        self.records.lock()?.push(record.clone());
        Ok(())
    }

    fn records(&self) -> OmsResult<Vec<ResponseRecord>> {
        Ok(self.records.lock()?.clone())
    }

    fn len(&self) -> OmsResult<usize> {
        Ok(self.records.lock()?.len())
    }
}

/// Newline-delimited JSON response log, flushed after every record
#[derive(Debug)]
pub struct JsonlResponseLog {
    path: PathBuf,
    writer: Mutex<JsonlWriter>,
}

#[derive(Debug)]
struct JsonlWriter {
    file: File,
    appended: usize,
}

impl JsonlResponseLog {
    /// Open (or create) a log file, appending after any existing records
    ///
    /// A torn final line left by an interrupted write is cut off first, so
    /// the next record starts on its own line.
    pub fn open(path: impl AsRef<Path>) -> OmsResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let existing = repair_tail(&path, &file)?;

        debug!("Opened response log {} with {} records", path.display(), existing);

        Ok(Self {
            path,
            writer: Mutex::new(JsonlWriter {
                file,
                appended: existing,
            }),
        })
    }

    /// Log file location
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Truncate bytes after the last newline; returns the complete record count
fn repair_tail(path: &Path, file: &File) -> OmsResult<usize> {
    let contents = std::fs::read(path)?;
    let complete = contents
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |pos| pos + 1);

    if complete < contents.len() {
        warn!(
            "Dropping {} bytes of torn record at end of {}",
            contents.len() - complete,
            path.display()
        );
        file.set_len(complete as u64)?;
    }

    let count = contents[..complete]
        .split(|&b| b == b'\n')
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .count();
    Ok(count)
}

impl ResponseLog for JsonlResponseLog {
    fn append(&self, record: &ResponseRecord) -> OmsResult<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut writer = self.writer.lock()?;
        let start = writer.file.metadata()?.len();
        let written = writer
            .file
            .write_all(line.as_bytes())
            .and_then(|_| writer.file.flush());

        if let Err(e) = written {
            // roll back a partial line so later records stay parseable
            if let Err(truncate) = writer.file.set_len(start) {
                warn!(
                    "Failed to roll back partial record in {}: {}",
                    self.path.display(),
                    truncate
                );
            }
            return Err(OmsError::ResponseLogError(format!(
                "Failed to append to {}: {}",
                self.path.display(),
                e
            )));
        }
        writer.appended += 1;
        Ok(())
    }

    fn records(&self) -> OmsResult<Vec<ResponseRecord>> {
        // hold the writer lock so a concurrent append is never read half-written
        let _writer = self.writer.lock()?;
        let reader = BufReader::new(File::open(&self.path)?);

        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }

    fn len(&self) -> OmsResult<usize> {
        Ok(self.writer.lock()?.appended)
    }
}
