//! Mailbox file line format.
//!
//! Co-located producers append one scan per line:
//!
//! ```text
//! <subject id>,<unix seconds>
//! ```
//!
//! The split happens at the first comma, so a subject id can never contain
//! one. Whitespace around either field is ignored.

use rollcall_core::{DomainError, SubjectId};
use thiserror::Error;

/// Errors parsing a single mailbox line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MailboxLineError {
    #[error("missing ',' separator")]
    MissingSeparator,

    #[error("invalid subject id: {0}")]
    InvalidSubject(#[from] DomainError),

    #[error("invalid timestamp: {0:?}")]
    InvalidTimestamp(String),
}

/// One parsed mailbox line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxEntry {
    pub subject: SubjectId,
    pub timestamp: i64,
}

/// Parses one mailbox line.
pub fn parse_mailbox_line(line: &str) -> Result<MailboxEntry, MailboxLineError> {
    let (subject, timestamp) = line
        .split_once(',')
        .ok_or(MailboxLineError::MissingSeparator)?;

    let subject = SubjectId::new(subject)?;
    let ts_text = timestamp.trim();
    let timestamp = ts_text
        .parse::<i64>()
        .map_err(|_| MailboxLineError::InvalidTimestamp(ts_text.to_string()))?;

    Ok(MailboxEntry { subject, timestamp })
}

/// Formats one mailbox line, including the trailing newline.
pub fn format_mailbox_line(subject: &SubjectId, timestamp: i64) -> String {
    format!("{subject},{timestamp}\n")
}
