//! JSON snapshot export.
//!
//! Writes the whole store as a JSON array to `attendance_YYYYMMDD.json`:
//!
//! ```json
//! [
//!   { "studentID": "MHS001", "timestamp": 1700000000, "isEntry": true, "readerId": "GATE-1", "locationId": "LAB-CS" },
//!   { "studentID": "MHS001", "timestamp": 1700003600, "isEntry": false }
//! ]
//! ```
//!
//! The file is written beside its final name and renamed into place, so a
//! reader never observes a half-written export. Exports through one
//! [`SnapshotExporter`] are serialised: the snapshot is taken and renamed
//! under the same guard, so a newer document is never replaced by an older
//! one.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::{Local, TimeZone, Utc};
use parking_lot::Mutex;
use rollcall_core::{AttendanceEvent, LocationId, ReaderId};
use serde::Serialize;
use tracing::debug;

use super::PersistenceError;

/// Export file name used when the local date cannot be determined.
pub const UNDATED_EXPORT_NAME: &str = "attendance_undated.json";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportRow<'a> {
    #[serde(rename = "studentID")]
    student_id: &'a str,
    timestamp: i64,
    is_entry: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reader_id: Option<&'a ReaderId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location_id: Option<&'a LocationId>,
}

impl<'a> From<&'a AttendanceEvent> for ExportRow<'a> {
    fn from(event: &'a AttendanceEvent) -> Self {
        Self {
            student_id: event.subject().as_str(),
            timestamp: event.timestamp(),
            is_entry: event.is_entry(),
            reader_id: event.reader(),
            location_id: event.location(),
        }
    }
}

/// Returns the export file name for the local date at `unix_secs`.
pub fn export_file_name(unix_secs: i64) -> String {
    match Local.timestamp_opt(unix_secs, 0).single() {
        Some(dt) => format!("attendance_{}.json", dt.format("%Y%m%d")),
        None => UNDATED_EXPORT_NAME.to_string(),
    }
}

/// Writes full-store exports into a directory.
#[derive(Debug)]
pub struct SnapshotExporter {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl SnapshotExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Exports `events` under today's local date.
    pub fn export(&self, events: &[AttendanceEvent]) -> Result<PathBuf, PersistenceError> {
        self.export_at(events, Utc::now().timestamp())
    }

    /// Exports `events` under the local date of `unix_secs`.
    pub fn export_at(
        &self,
        events: &[AttendanceEvent],
        unix_secs: i64,
    ) -> Result<PathBuf, PersistenceError> {
        let _guard = self.write_lock.lock();
        self.write_document(events, unix_secs)
    }

    /// Takes the snapshot only once the previous export has been renamed
    /// into place.
    pub fn export_with<F>(&self, snapshot: F) -> Result<PathBuf, PersistenceError>
    where
        F: FnOnce() -> Vec<AttendanceEvent>,
    {
        let _guard = self.write_lock.lock();
        let events = snapshot();
        self.write_document(&events, Utc::now().timestamp())
    }

    fn write_document(
        &self,
        events: &[AttendanceEvent],
        unix_secs: i64,
    ) -> Result<PathBuf, PersistenceError> {
        let rows: Vec<ExportRow<'_>> = events.iter().map(ExportRow::from).collect();
        let bytes = serde_json::to_vec_pretty(&rows)?;

        fs::create_dir_all(&self.dir).map_err(|e| PersistenceError::io(&self.dir, e))?;

        let path = self.dir.join(export_file_name(unix_secs));
        let tmp_path = path.with_extension("json.tmp");
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)
                .map_err(|e| PersistenceError::io(&tmp_path, e))?;
            file.write_all(&bytes)
                .and_then(|()| file.flush())
                .map_err(|e| PersistenceError::io(&tmp_path, e))?;
        }
        fs::rename(&tmp_path, &path).map_err(|e| PersistenceError::io(&path, e))?;

        debug!(path = %path.display(), events = events.len(), "Snapshot exported");
        Ok(path)
    }
}
