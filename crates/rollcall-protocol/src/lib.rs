//! rollcall Protocol - Wire formats for scan ingestion
//!
//! This crate defines the text protocol spoken between scanning clients
//! and the daemon, the framing used to split a TCP byte stream into
//! requests, and the line format of the mailbox file.

pub mod frame;
pub mod mailbox;
pub mod message;

pub use frame::{FrameError, Framing, RequestFramer, MAX_REQUEST_SIZE};
pub use mailbox::{format_mailbox_line, parse_mailbox_line, MailboxEntry, MailboxLineError};
pub use message::{ProtocolError, Request, Response, SCAN_PREFIX};
