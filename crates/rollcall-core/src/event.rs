//! Attendance events and the raw scans they are derived from.

use chrono::{Local, TimeZone, Utc};
use serde::Serialize;
use std::fmt;

use crate::ids::{LocationId, ReaderId, RecordId, SubjectId};

/// Where a scan entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanSource {
    /// Accepted over the TCP scan protocol
    Network,
    /// Drained from the mailbox file
    Mailbox,
    /// Entered directly by an administrator
    Admin,
    /// Rebuilt from the binary log at startup
    Replay,
}

impl fmt::Display for ScanSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Mailbox => write!(f, "mailbox"),
            Self::Admin => write!(f, "admin"),
            Self::Replay => write!(f, "replay"),
        }
    }
}

/// A raw scan as received from an ingestion path, before sequencing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scan {
    pub subject: SubjectId,
    /// Seconds since the Unix epoch
    pub timestamp: i64,
    pub reader: Option<ReaderId>,
    pub source: ScanSource,
}

impl Scan {
    pub fn new(subject: SubjectId, timestamp: i64, source: ScanSource) -> Self {
        Self {
            subject,
            timestamp,
            reader: None,
            source,
        }
    }

    /// Creates a scan stamped with the current wall-clock time.
    pub fn now(subject: SubjectId, source: ScanSource) -> Self {
        Self::new(subject, Utc::now().timestamp(), source)
    }

    #[must_use]
    pub fn with_reader(mut self, reader: Option<ReaderId>) -> Self {
        self.reader = reader;
        self
    }
}

/// A recorded attendance event.
///
/// Created only by the store once the entry/exit direction has been derived;
/// immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceEvent {
    record_id: RecordId,
    subject: SubjectId,
    timestamp: i64,
    reader: Option<ReaderId>,
    location: Option<LocationId>,
    is_entry: bool,
}

impl AttendanceEvent {
    pub fn new(
        record_id: RecordId,
        scan: Scan,
        location: Option<LocationId>,
        is_entry: bool,
    ) -> Self {
        Self {
            record_id,
            subject: scan.subject,
            timestamp: scan.timestamp,
            reader: scan.reader,
            location,
            is_entry,
        }
    }

    pub fn record_id(&self) -> RecordId {
        self.record_id
    }

    pub fn subject(&self) -> &SubjectId {
        &self.subject
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn reader(&self) -> Option<&ReaderId> {
        self.reader.as_ref()
    }

    pub fn location(&self) -> Option<&LocationId> {
        self.location.as_ref()
    }

    pub fn is_entry(&self) -> bool {
        self.is_entry
    }

    /// Returns "entry" or "exit".
    #[must_use]
    pub fn direction_label(&self) -> &'static str {
        if self.is_entry {
            "entry"
        } else {
            "exit"
        }
    }

    /// Formats the timestamp in local time, `YYYY-MM-DD HH:MM:SS`.
    ///
    /// Falls back to the raw epoch seconds when the value is out of range
    /// or ambiguous in the local zone.
    #[must_use]
    pub fn local_time(&self) -> String {
        match Local.timestamp_opt(self.timestamp, 0).single() {
            Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => format!("@{}", self.timestamp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(id: &str, ts: i64) -> Scan {
        Scan::new(SubjectId::new(id).unwrap(), ts, ScanSource::Admin)
    }

    #[test]
    fn test_event_carries_scan_fields() {
        let scan = scan("MHS001", 1_700_000_000).with_reader(Some(ReaderId::from("R1")));
        let event = AttendanceEvent::new(
            RecordId::new(3),
            scan,
            Some(LocationId::from("LAB-A")),
            true,
        );

        assert_eq!(event.record_id(), RecordId::new(3));
        assert_eq!(event.subject().as_str(), "MHS001");
        assert_eq!(event.timestamp(), 1_700_000_000);
        assert_eq!(event.reader().map(ReaderId::as_str), Some("R1"));
        assert_eq!(event.location().map(LocationId::as_str), Some("LAB-A"));
        assert!(event.is_entry());
        assert_eq!(event.direction_label(), "entry");
    }

    #[test]
    fn test_local_time_out_of_range_falls_back() {
        let event = AttendanceEvent::new(RecordId::new(0), scan("X", i64::MAX), None, false);
        assert_eq!(event.local_time(), format!("@{}", i64::MAX));
    }

    #[test]
    fn test_scan_now_is_recent() {
        let before = Utc::now().timestamp();
        let s = Scan::now(SubjectId::new("A1").unwrap(), ScanSource::Network);
        assert!(s.timestamp >= before);
        assert_eq!(s.source, ScanSource::Network);
        assert!(s.reader.is_none());
    }

    #[test]
    fn test_scan_source_display() {
        assert_eq!(ScanSource::Mailbox.to_string(), "mailbox");
        assert_eq!(ScanSource::Replay.to_string(), "replay");
    }
}
