//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Subject identifier was empty after trimming
    #[error("subject id is empty")]
    EmptySubjectId,

    /// Subject identifier does not fit the fixed-width record field
    #[error("subject id too long: {len} bytes (max {max})")]
    SubjectIdTooLong { len: usize, max: usize },

    /// Subject identifier contains a NUL or control character
    #[error("subject id contains a non-printable character at byte {position}")]
    NonPrintableSubjectId { position: usize },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
