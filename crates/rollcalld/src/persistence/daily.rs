//! Human-readable daily audit log.
//!
//! One line per applied scan, appended to `attendance_YYYYMMDD.log` in the
//! export directory (local date of the event):
//!
//! ```text
//! 2023-11-14 22:13:20,MHS001,Jane Smith,entry
//! 2023-11-14 23:13:20,MHS001,Jane Smith,exit
//! ```
//!
//! The audit log is informational; the binary log stays the source of truth
//! and is never rebuilt from it.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::{Local, TimeZone};
use rollcall_core::AttendanceEvent;

use super::PersistenceError;

/// Name written for subjects missing from the directory.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Audit file name used when the local date cannot be determined.
pub const UNDATED_AUDIT_NAME: &str = "attendance_undated.log";

/// Returns the audit file name for the local date at `unix_secs`.
pub fn audit_file_name(unix_secs: i64) -> String {
    match Local.timestamp_opt(unix_secs, 0).single() {
        Some(dt) => format!("attendance_{}.log", dt.format("%Y%m%d")),
        None => UNDATED_AUDIT_NAME.to_string(),
    }
}

/// Formats one audit line, newline included.
///
/// Commas and control characters in fields are replaced with spaces so the
/// line always has exactly four fields.
pub fn format_audit_line(event: &AttendanceEvent, name: Option<&str>) -> String {
    format!(
        "{},{},{},{}\n",
        event.local_time(),
        clean_field(event.subject().as_str()),
        clean_field(name.unwrap_or(UNKNOWN_NAME)),
        event.direction_label()
    )
}

fn clean_field(raw: &str) -> String {
    raw.chars()
        .map(|c| if c == ',' || c.is_control() { ' ' } else { c })
        .collect()
}

/// Appends audit lines into per-day files.
#[derive(Debug, Clone)]
pub struct DailyLog {
    dir: PathBuf,
}

impl DailyLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the file `event` is written to.
    pub fn path_for(&self, event: &AttendanceEvent) -> PathBuf {
        self.dir.join(audit_file_name(event.timestamp()))
    }

    /// Appends one line for `event`.
    pub fn append(
        &self,
        event: &AttendanceEvent,
        name: Option<&str>,
    ) -> Result<PathBuf, PersistenceError> {
        fs::create_dir_all(&self.dir).map_err(|e| PersistenceError::io(&self.dir, e))?;

        let path = self.path_for(event);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| PersistenceError::io(&path, e))?;
        file.write_all(format_audit_line(event, name).as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| PersistenceError::io(&path, e))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::{RecordId, Scan, ScanSource, SubjectId};
    use tempfile::tempdir;

    fn event(id: &str, ts: i64, is_entry: bool) -> AttendanceEvent {
        let scan = Scan::new(SubjectId::new(id).unwrap(), ts, ScanSource::Network);
        AttendanceEvent::new(RecordId::new(1), scan, None, is_entry)
    }

    #[test]
    fn test_line_format() {
        let e = event("MHS001", 1_700_000_000, true);
        let line = format_audit_line(&e, Some("Jane Smith"));
        assert_eq!(
            line,
            format!("{},MHS001,Jane Smith,entry\n", e.local_time())
        );
    }

    #[test]
    fn test_unknown_name_and_commas() {
        let e = event("A,1", 1_700_000_000, false);
        let line = format_audit_line(&e, None);
        assert!(line.ends_with(",A 1,Unknown,exit\n"));
        assert_eq!(line.trim_end().split(',').count(), 4);

        let line = format_audit_line(&e, Some("Doe, Jane"));
        assert!(line.ends_with(",A 1,Doe  Jane,exit\n"));
    }

    #[test]
    fn test_append_accumulates_per_day() {
        let dir = tempdir().unwrap();
        let log = DailyLog::new(dir.path().join("audit"));

        let first = log
            .append(&event("MHS001", 1_700_000_000, true), Some("Jane"))
            .unwrap();
        let second = log
            .append(&event("MHS001", 1_700_000_060, false), Some("Jane"))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first.file_name().unwrap().to_str().unwrap(),
            audit_file_name(1_700_000_000)
        );

        let text = fs::read_to_string(first).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(",entry"));
        assert!(lines[1].ends_with(",exit"));
    }

    #[test]
    fn test_audit_file_name_fallback() {
        assert_eq!(audit_file_name(i64::MAX), UNDATED_AUDIT_NAME);
    }
}
