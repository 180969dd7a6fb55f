//! File-backed audit sink writing one JSON object per line
//!
//! The file is opened in append mode and never rewritten. Each `record` writes
//! a full line in one call and syncs it before returning, so an entry the
//! engine reported as recorded is on disk. Queries stream the file back and
//! filter it, skipping lines that do not parse (a write torn by a crash).

use crate::core::traits::AuditSink;
use crate::types::{AuditEntry, AuditQuery, StoreError};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Append-only JSON-lines audit trail
#[derive(Debug)]
pub struct JsonlAuditSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlAuditSink {
    /// Open (or create) the audit file at `path` for appending
    ///
    /// A trailing partial line left by an interrupted write is terminated so
    /// the next entry starts on a line of its own.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        if ends_mid_line(&path)? {
            warn!(path = %path.display(), "audit log ends with a partial line");
            file.write_all(b"\n")?;
        }

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = self
            .file
            .lock()
            .map_err(|_| StoreError::unavailable("audit file lock poisoned"))?;
        file.write_all(line.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, StoreError> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut found = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEntry>(&line) {
                Ok(entry) if query.matches(&entry) => found.push(entry),
                Ok(_) => {}
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = index + 1,
                    error = %e,
                    "skipping unreadable audit line"
                ),
            }
        }

        Ok(found)
    }
}

fn ends_mid_line(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}
