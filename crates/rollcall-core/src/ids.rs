//! Type-safe identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DomainError, DomainResult};

/// Size of the on-disk subject field, including the NUL terminator.
pub const STUDENT_ID_MAX_LEN: usize = 20;

/// Identifier of the person behind a scan (student or staff badge).
///
/// Always 1..`STUDENT_ID_MAX_LEN` bytes of printable text, so it fits the
/// fixed-width record field with room for the terminator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    /// Validates and wraps a subject identifier.
    ///
    /// Surrounding whitespace is trimmed first. Rejects empty ids, ids of
    /// `STUDENT_ID_MAX_LEN` bytes or more, and ids containing NUL or other
    /// control characters.
    pub fn new(id: impl AsRef<str>) -> DomainResult<Self> {
        let id = id.as_ref().trim();

        if id.is_empty() {
            return Err(DomainError::EmptySubjectId);
        }
        if id.len() >= STUDENT_ID_MAX_LEN {
            return Err(DomainError::SubjectIdTooLong {
                len: id.len(),
                max: STUDENT_ID_MAX_LEN - 1,
            });
        }
        if let Some((position, _)) = id.char_indices().find(|(_, c)| c.is_control()) {
            return Err(DomainError::NonPrintableSubjectId { position });
        }

        Ok(Self(id.to_string()))
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for SubjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for SubjectId {
    type Error = DomainError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for SubjectId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Identifier of a physical badge reader.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReaderId(String);

impl ReaderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ReaderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a location (lab, room) whose occupancy is tracked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationId(String);

impl LocationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LocationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Position assigned to an event when it enters the store.
///
/// Strictly increasing in append order; survives `sort_by_time`, so it still
/// identifies the original arrival order after a reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(u64);

impl RecordId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_id_trims_whitespace() {
        let id = SubjectId::new("  MHS001 \n").unwrap();
        assert_eq!(id.as_str(), "MHS001");
    }

    #[test]
    fn test_subject_id_rejects_empty() {
        assert_eq!(SubjectId::new(""), Err(DomainError::EmptySubjectId));
        assert_eq!(SubjectId::new("   "), Err(DomainError::EmptySubjectId));
    }

    #[test]
    fn test_subject_id_length_bound() {
        let max = "A".repeat(STUDENT_ID_MAX_LEN - 1);
        assert!(SubjectId::new(&max).is_ok());

        let too_long = "A".repeat(STUDENT_ID_MAX_LEN);
        assert_eq!(
            SubjectId::new(&too_long),
            Err(DomainError::SubjectIdTooLong { len: 20, max: 19 })
        );
    }

    #[test]
    fn test_subject_id_rejects_control_characters() {
        assert_eq!(
            SubjectId::new("MHS\0001"),
            Err(DomainError::NonPrintableSubjectId { position: 3 })
        );
        assert!(SubjectId::new("AB\tCD").is_err());
    }

    #[test]
    fn test_subject_id_allows_inner_space() {
        assert_eq!(SubjectId::new("STAFF 07").unwrap().as_str(), "STAFF 07");
    }

    #[test]
    fn test_subject_id_deserialize_validates() {
        let ok: SubjectId = serde_json::from_str("\"MHS002\"").unwrap();
        assert_eq!(ok.as_str(), "MHS002");

        let err = serde_json::from_str::<SubjectId>("\"\"");
        assert!(err.is_err());
    }

    #[test]
    fn test_record_id_next() {
        let id = RecordId::new(41);
        assert_eq!(id.next().as_u64(), 42);
        assert_eq!(id.to_string(), "#41");
    }
}
