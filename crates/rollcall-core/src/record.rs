//! Fixed-width binary record format for the attendance log.
//!
//! Each record is exactly [`RECORD_SIZE`] bytes:
//!
//! ```text
//! ┌──────────────────────────────┬──────────────────────┐
//! │ subject id (20 bytes)        │ timestamp (8 bytes)  │
//! │ UTF-8, NUL padded,           │ i64, little-endian,  │
//! │ byte 19 always NUL           │ seconds since epoch  │
//! └──────────────────────────────┴──────────────────────┘
//! ```
//!
//! Fixed-size records make a torn trailing write detectable: a file whose
//! length is not a multiple of `RECORD_SIZE` ends in a partial record.

use thiserror::Error;

use crate::event::AttendanceEvent;
use crate::ids::{SubjectId, STUDENT_ID_MAX_LEN};

/// Size of the timestamp field.
const TIMESTAMP_LEN: usize = 8;

/// Size of one encoded record.
pub const RECORD_SIZE: usize = STUDENT_ID_MAX_LEN + TIMESTAMP_LEN;

/// Errors decoding a record read back from disk.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// Subject field is empty once NUL termination is enforced
    #[error("record has an empty subject id")]
    EmptySubject,

    /// Subject field is not valid UTF-8
    #[error("record subject id is not valid UTF-8")]
    InvalidUtf8,

    /// Subject field decoded but failed identifier validation
    #[error("record subject id rejected: {0}")]
    InvalidSubject(String),
}

/// A persisted scan: who, and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub subject: SubjectId,
    pub timestamp: i64,
}

impl LogRecord {
    pub fn new(subject: SubjectId, timestamp: i64) -> Self {
        Self { subject, timestamp }
    }

    /// Encodes into the fixed-width on-disk form.
    ///
    /// `SubjectId` guarantees at most `STUDENT_ID_MAX_LEN - 1` bytes, so the
    /// last byte of the subject field is always the terminator.
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        let id = self.subject.as_bytes();
        let len = id.len().min(STUDENT_ID_MAX_LEN - 1);
        buf[..len].copy_from_slice(&id[..len]);
        buf[STUDENT_ID_MAX_LEN..].copy_from_slice(&self.timestamp.to_le_bytes());
        buf
    }

    /// Decodes one record.
    ///
    /// The subject is read up to the first NUL, with byte 19 treated as a
    /// terminator regardless of its stored value.
    pub fn decode(buf: &[u8; RECORD_SIZE]) -> Result<Self, RecordError> {
        let field = &buf[..STUDENT_ID_MAX_LEN - 1];
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        let raw = &field[..end];

        if raw.is_empty() {
            return Err(RecordError::EmptySubject);
        }

        let text = std::str::from_utf8(raw).map_err(|_| RecordError::InvalidUtf8)?;
        let subject =
            SubjectId::new(text).map_err(|e| RecordError::InvalidSubject(e.to_string()))?;

        let mut ts = [0u8; TIMESTAMP_LEN];
        ts.copy_from_slice(&buf[STUDENT_ID_MAX_LEN..]);

        Ok(Self {
            subject,
            timestamp: i64::from_le_bytes(ts),
        })
    }
}

impl From<&AttendanceEvent> for LogRecord {
    fn from(event: &AttendanceEvent) -> Self {
        Self::new(event.subject().clone(), event.timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, ts: i64) -> LogRecord {
        LogRecord::new(SubjectId::new(id).unwrap(), ts)
    }

    #[test]
    fn test_record_size() {
        assert_eq!(RECORD_SIZE, 28);
    }

    #[test]
    fn test_encode_layout() {
        let buf = record("MHS001", 1_700_000_000).encode();

        assert_eq!(&buf[..6], b"MHS001");
        assert!(buf[6..20].iter().all(|&b| b == 0));
        assert_eq!(&buf[20..], &1_700_000_000i64.to_le_bytes());
    }

    #[test]
    fn test_decode_encoded_record() {
        let original = record("STF007", -5);
        let decoded = LogRecord::decode(&original.encode()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_decode_full_width_id() {
        let id = "X".repeat(STUDENT_ID_MAX_LEN - 1);
        let original = record(&id, 42);
        let decoded = LogRecord::decode(&original.encode()).unwrap();
        assert_eq!(decoded.subject.as_str(), id);
    }

    #[test]
    fn test_decode_enforces_terminator() {
        // Subject field fully populated with no NUL: byte 19 is ignored
        let mut buf = [b'A'; RECORD_SIZE];
        buf[STUDENT_ID_MAX_LEN..].copy_from_slice(&7i64.to_le_bytes());

        let decoded = LogRecord::decode(&buf).unwrap();
        assert_eq!(decoded.subject.as_str().len(), STUDENT_ID_MAX_LEN - 1);
        assert_eq!(decoded.timestamp, 7);
    }

    #[test]
    fn test_decode_empty_subject() {
        let buf = [0u8; RECORD_SIZE];
        assert_eq!(LogRecord::decode(&buf), Err(RecordError::EmptySubject));
    }

    #[test]
    fn test_decode_invalid_utf8() {
        let mut buf = [0u8; RECORD_SIZE];
        buf[0] = 0xFF;
        buf[1] = 0xFE;
        assert_eq!(LogRecord::decode(&buf), Err(RecordError::InvalidUtf8));
    }

    #[test]
    fn test_decode_control_characters_rejected() {
        let mut buf = [0u8; RECORD_SIZE];
        buf[..3].copy_from_slice(b"A\x07B");
        assert!(matches!(
            LogRecord::decode(&buf),
            Err(RecordError::InvalidSubject(_))
        ));
    }
}
