//! Append-only binary attendance log.
//!
//! # Recovery
//!
//! A crash mid-append can leave a partial record at the end of the file.
//! Because records are fixed-width, [`BinaryLog::load`] detects this from
//! the file length, reports the stray bytes and ignores them. Records whose
//! subject field is empty or unreadable are skipped and counted.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use rollcall_core::{LogRecord, RECORD_SIZE};
use tracing::{debug, info, warn};

use super::PersistenceError;

/// Outcome of reading the log back.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    /// Decoded records, in file order
    pub records: Vec<LogRecord>,
    /// Complete records that failed to decode
    pub skipped: usize,
    /// Length of a trailing partial record, 0 if none
    pub truncated_tail_bytes: usize,
}

/// Handle to the binary log file.
///
/// The file is opened per operation; the handle itself holds only the path.
/// Callers serialise appends (the pipeline holds a writer lock).
#[derive(Debug, Clone)]
pub struct BinaryLog {
    path: PathBuf,
}

impl BinaryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every complete record. A missing file is an empty log.
    pub fn load(&self) -> Result<LoadReport, PersistenceError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No binary log yet");
                return Ok(LoadReport::default());
            }
            Err(e) => return Err(PersistenceError::io(&self.path, e)),
        };

        let mut report = LoadReport::default();
        let chunks = bytes.chunks_exact(RECORD_SIZE);
        report.truncated_tail_bytes = chunks.remainder().len();

        for (index, chunk) in chunks.enumerate() {
            let Ok(buf) = <&[u8; RECORD_SIZE]>::try_from(chunk) else {
                continue;
            };
            match LogRecord::decode(buf) {
                Ok(record) => report.records.push(record),
                Err(e) => {
                    warn!(index, error = %e, "Skipping unreadable log record");
                    report.skipped += 1;
                }
            }
        }

        if report.truncated_tail_bytes > 0 {
            warn!(
                path = %self.path.display(),
                bytes = report.truncated_tail_bytes,
                "Ignoring partial record at end of log"
            );
        }
        info!(
            path = %self.path.display(),
            records = report.records.len(),
            skipped = report.skipped,
            "Binary log loaded"
        );
        Ok(report)
    }

    /// Appends one record and flushes it.
    pub fn append(&self, record: &LogRecord) -> Result<(), PersistenceError> {
        self.append_bytes(&record.encode())
    }

    fn append_bytes(&self, bytes: &[u8]) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| PersistenceError::io(&self.path, e))?;
        file.write_all(bytes)
            .and_then(|()| file.flush())
            .map_err(|e| PersistenceError::io(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::SubjectId;
    use tempfile::tempdir;

    fn record(id: &str, ts: i64) -> LogRecord {
        LogRecord::new(SubjectId::new(id).unwrap(), ts)
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let log = BinaryLog::new(dir.path().join("attendance.dat"));
        let report = log.load().unwrap();
        assert!(report.records.is_empty());
        assert_eq!(report.truncated_tail_bytes, 0);
    }

    #[test]
    fn test_append_then_load_preserves_order() {
        let dir = tempdir().unwrap();
        let log = BinaryLog::new(dir.path().join("nested/attendance.dat"));

        let written = vec![
            record("MHS001", 1_700_000_000),
            record("STF007", 1_700_000_005),
            record("MHS001", 1_700_000_010),
        ];
        for r in &written {
            log.append(r).unwrap();
        }

        let len = fs::metadata(log.path()).unwrap().len();
        assert_eq!(len as usize, 3 * RECORD_SIZE);

        let report = log.load().unwrap();
        assert_eq!(report.records, written);
        assert_eq!(report.skipped, 0);
    }

    #[test]
    fn test_partial_tail_is_ignored() {
        let dir = tempdir().unwrap();
        let log = BinaryLog::new(dir.path().join("attendance.dat"));
        log.append(&record("MHS001", 42)).unwrap();
        log.append_bytes(&[b'X'; 11]).unwrap();

        let report = log.load().unwrap();
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.truncated_tail_bytes, 11);
    }

    #[test]
    fn test_empty_subject_record_skipped() {
        let dir = tempdir().unwrap();
        let log = BinaryLog::new(dir.path().join("attendance.dat"));
        log.append(&record("A1", 1)).unwrap();
        log.append_bytes(&[0u8; RECORD_SIZE]).unwrap();
        log.append(&record("B1", 2)).unwrap();

        let report = log.load().unwrap();
        assert_eq!(report.skipped, 1);
        let ids: Vec<&str> = report.records.iter().map(|r| r.subject.as_str()).collect();
        assert_eq!(ids, vec!["A1", "B1"]);
    }

    #[test]
    fn test_unreadable_path_is_error() {
        let dir = tempdir().unwrap();
        // A directory where the file should be
        let log = BinaryLog::new(dir.path());
        assert!(log.load().is_err());
        assert!(log.append(&record("A1", 1)).is_err());
    }
}
