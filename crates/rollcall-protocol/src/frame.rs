//! Splitting a byte stream into protocol requests.
//!
//! Legacy scanner clients send `SCAN:<id>` with no terminator and
//! rely on one `recv` returning exactly one request. That breaks as soon as
//! the transport coalesces or splits writes, so two framing modes exist:
//!
//! - [`Framing::Line`]: requests end with `\n` (an optional `\r` before it
//!   is stripped). Reads may split or merge requests freely.
//! - [`Framing::Read`]: every transport read is one request. Only safe for
//!   legacy clients that send one request and wait for the reply.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum size of a single request in bytes.
pub const MAX_REQUEST_SIZE: usize = 1024;

/// How requests are delimited on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    #[default]
    Line,
    Read,
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Line => write!(f, "line"),
            Self::Read => write!(f, "read"),
        }
    }
}

impl FromStr for Framing {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "line" => Ok(Self::Line),
            "read" => Ok(Self::Read),
            other => Err(FrameError::UnknownMode(other.to_string())),
        }
    }
}

/// Framing failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("request too large: more than {max} bytes")]
    TooLarge { max: usize },

    #[error("unknown framing mode: {0} (expected \"line\" or \"read\")")]
    UnknownMode(String),
}

/// Incremental request splitter for one connection.
///
/// Feed every chunk read from the socket to [`RequestFramer::push`]; it
/// returns the complete requests found so far. Non-UTF-8 bytes are replaced
/// rather than rejected, so the parser reports a readable error.
#[derive(Debug)]
pub struct RequestFramer {
    mode: Framing,
    max_size: usize,
    buf: Vec<u8>,
    /// Set after an oversized line until its terminator is seen
    discarding: bool,
}

impl RequestFramer {
    pub fn new(mode: Framing) -> Self {
        Self::with_max_size(mode, MAX_REQUEST_SIZE)
    }

    pub fn with_max_size(mode: Framing, max_size: usize) -> Self {
        Self {
            mode,
            max_size,
            buf: Vec::new(),
            discarding: false,
        }
    }

    /// Number of buffered bytes that do not yet form a complete request.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Consumes one chunk read from the transport.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<String, FrameError>> {
        match self.mode {
            Framing::Read => self.push_read(chunk),
            Framing::Line => self.push_line(chunk),
        }
    }

    /// Flushes whatever is buffered when the peer closes the connection.
    ///
    /// In line mode an unterminated final request is still delivered.
    pub fn finish(&mut self) -> Option<Result<String, FrameError>> {
        let rest = std::mem::take(&mut self.buf);
        if self.discarding {
            self.discarding = false;
            return None;
        }
        let text = trim_terminator(&rest);
        if text.is_empty() {
            None
        } else {
            Some(Ok(text))
        }
    }

    fn push_read(&mut self, chunk: &[u8]) -> Vec<Result<String, FrameError>> {
        if chunk.len() > self.max_size {
            return vec![Err(FrameError::TooLarge { max: self.max_size })];
        }
        let text = trim_terminator(chunk);
        if text.is_empty() {
            Vec::new()
        } else {
            vec![Ok(text)]
        }
    }

    fn push_line(&mut self, chunk: &[u8]) -> Vec<Result<String, FrameError>> {
        let mut out = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let (head, tail) = rest.split_at(pos);
            rest = tail.get(1..).unwrap_or_default();

            if self.discarding {
                self.discarding = false;
                self.buf.clear();
                continue;
            }

            self.buf.extend_from_slice(head);
            let line = std::mem::take(&mut self.buf);
            if line.len() > self.max_size {
                out.push(Err(FrameError::TooLarge { max: self.max_size }));
                continue;
            }

            let text = trim_terminator(&line);
            if !text.is_empty() {
                out.push(Ok(text));
            }
        }

        if !self.discarding {
            self.buf.extend_from_slice(rest);
            if self.buf.len() > self.max_size {
                self.buf.clear();
                self.discarding = true;
                out.push(Err(FrameError::TooLarge { max: self.max_size }));
            }
        }

        out
    }
}

fn trim_terminator(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}
