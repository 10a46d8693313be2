//! Scan protocol messages.
//!
//! Requests and responses are short text messages:
//!
//! ```text
//! client → daemon   SCAN:<subject id>
//! daemon → client   FOUND:<name>:<affiliation>   subject is in the roster
//!                   OK                           recorded, not in the roster
//!                   ERROR:<reason>               request rejected, nothing recorded
//! ```

use std::fmt;

use rollcall_core::{DomainError, SubjectId};
use thiserror::Error;

/// Prefix of a scan request.
pub const SCAN_PREFIX: &str = "SCAN:";

const FOUND_PREFIX: &str = "FOUND:";
const ERROR_PREFIX: &str = "ERROR:";
const OK_REPLY: &str = "OK";

/// Errors parsing a protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty request")]
    Empty,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("invalid subject id: {0}")]
    InvalidSubject(#[from] DomainError),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// A request sent by a scanning client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Scan { subject: SubjectId },
}

impl Request {
    /// Parses one request.
    ///
    /// Trailing line terminators are ignored. Commands longer than a short
    /// preview are truncated in the error so a garbage payload does not end
    /// up verbatim in logs.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let text = text.trim_end_matches(['\r', '\n']);
        if text.trim().is_empty() {
            return Err(ProtocolError::Empty);
        }

        match text.strip_prefix(SCAN_PREFIX) {
            Some(rest) => Ok(Self::Scan {
                subject: SubjectId::new(rest)?,
            }),
            None => Err(ProtocolError::UnknownCommand(preview(text))),
        }
    }

    pub fn scan(subject: SubjectId) -> Self {
        Self::Scan { subject }
    }

    /// Encodes as a newline-terminated line.
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scan { subject } => write!(f, "{SCAN_PREFIX}{subject}"),
        }
    }
}

/// The daemon's reply to a request.
///
/// `Found` and `Ok` both mean the scan was recorded; only `Found` carries
/// roster details. There is no separate "not found" reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Found { name: String, affiliation: String },
    Ok,
    Error(String),
}

impl Response {
    pub fn found(name: impl Into<String>, affiliation: impl Into<String>) -> Self {
        Self::Found {
            name: name.into(),
            affiliation: affiliation.into(),
        }
    }

    pub fn error(reason: impl fmt::Display) -> Self {
        Self::Error(reason.to_string())
    }

    /// Returns true for replies that mean the scan was recorded.
    pub fn is_recorded(&self) -> bool {
        !matches!(self, Self::Error(_))
    }

    /// Parses a reply line received by a client.
    ///
    /// `FOUND:` replies split at the first `:` after the prefix, so the
    /// name cannot contain a colon but the affiliation can.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let text = text.trim_end_matches(['\r', '\n']);

        if text == OK_REPLY {
            return Ok(Self::Ok);
        }
        if let Some(reason) = text.strip_prefix(ERROR_PREFIX) {
            return Ok(Self::Error(reason.to_string()));
        }
        if let Some(rest) = text.strip_prefix(FOUND_PREFIX) {
            return match rest.split_once(':') {
                Some((name, affiliation)) => Ok(Self::found(name, affiliation)),
                None => Err(ProtocolError::MalformedResponse(preview(text))),
            };
        }

        Err(ProtocolError::MalformedResponse(preview(text)))
    }

    /// Encodes as a newline-terminated line.
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Found { name, affiliation } => write!(
                f,
                "{FOUND_PREFIX}{}:{}",
                single_line(name).replace(':', " "),
                single_line(affiliation)
            ),
            Self::Ok => write!(f, "{OK_REPLY}"),
            Self::Error(reason) => write!(f, "{ERROR_PREFIX}{}", single_line(reason)),
        }
    }
}

/// Keeps roster text from breaking line framing.
fn single_line(s: &str) -> String {
    s.replace(['\r', '\n'], " ")
}

fn preview(text: &str) -> String {
    const MAX_PREVIEW: usize = 32;
    match text.char_indices().nth(MAX_PREVIEW) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scan() {
        let req = Request::parse("SCAN:MHS001").unwrap();
        assert_eq!(
            req,
            Request::Scan {
                subject: SubjectId::new("MHS001").unwrap()
            }
        );
    }

    #[test]
    fn test_parse_scan_with_line_terminator() {
        let req = Request::parse("SCAN:MHS001\r\n").unwrap();
        assert_eq!(req.to_string(), "SCAN:MHS001");
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(Request::parse(""), Err(ProtocolError::Empty));
        assert_eq!(Request::parse("\r\n"), Err(ProtocolError::Empty));
    }

    #[test]
    fn test_parse_unknown_command() {
        assert!(matches!(
            Request::parse("PING"),
            Err(ProtocolError::UnknownCommand(cmd)) if cmd == "PING"
        ));
        // Prefix is case-sensitive
        assert!(matches!(
            Request::parse("scan:MHS001"),
            Err(ProtocolError::UnknownCommand(_))
        ));
    }

    #[test]
    fn test_parse_unknown_command_preview_is_truncated() {
        let long = "X".repeat(200);
        match Request::parse(&long) {
            Err(ProtocolError::UnknownCommand(cmd)) => assert_eq!(cmd.len(), 35),
            other => panic!("expected UnknownCommand, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_scan_invalid_subject() {
        assert!(matches!(
            Request::parse("SCAN:"),
            Err(ProtocolError::InvalidSubject(DomainError::EmptySubjectId))
        ));
        assert!(matches!(
            Request::parse("SCAN:ABCDEFGHIJKLMNOPQRSTUVWXYZ"),
            Err(ProtocolError::InvalidSubject(DomainError::SubjectIdTooLong { .. }))
        ));
    }

    #[test]
    fn test_request_to_line() {
        let req = Request::scan(SubjectId::new("STF007").unwrap());
        assert_eq!(req.to_line(), "SCAN:STF007\n");
    }

    #[test]
    fn test_response_encoding() {
        assert_eq!(
            Response::found("Jane Smith", "Informatics").to_line(),
            "FOUND:Jane Smith:Informatics\n"
        );
        assert_eq!(Response::Ok.to_line(), "OK\n");
        assert_eq!(Response::error("bad id").to_line(), "ERROR:bad id\n");
    }

    #[test]
    fn test_response_encoding_keeps_single_line() {
        let resp = Response::found("Dr. A:B", "Lab\nStaff");
        assert_eq!(resp.to_string(), "FOUND:Dr. A B:Lab Staff");
    }

    #[test]
    fn test_response_parse() {
        assert_eq!(Response::parse("OK\n").unwrap(), Response::Ok);
        assert_eq!(
            Response::parse("FOUND:John Doe:Computer Science").unwrap(),
            Response::found("John Doe", "Computer Science")
        );
        assert_eq!(
            Response::parse("FOUND:John Doe:Dept: CS").unwrap(),
            Response::found("John Doe", "Dept: CS")
        );
        assert_eq!(
            Response::parse("ERROR:unknown command").unwrap(),
            Response::Error("unknown command".to_string())
        );
        assert!(Response::parse("FOUND:nocolon").is_err());
        assert!(Response::parse("HELLO").is_err());
    }

    #[test]
    fn test_response_is_recorded() {
        assert!(Response::Ok.is_recorded());
        assert!(Response::found("a", "b").is_recorded());
        assert!(!Response::error("x").is_recorded());
    }
}
