//! rollcall Core - Shared types for attendance logging
//!
//! This crate provides the core domain types shared between
//! the daemon (rollcalld), the wire protocol, and the scan client.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()` outside of tests.

pub mod error;
pub mod event;
pub mod ids;
pub mod location;
pub mod record;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use event::{AttendanceEvent, Scan, ScanSource};
pub use ids::{LocationId, ReaderId, RecordId, SubjectId, STUDENT_ID_MAX_LEN};
pub use location::{Location, OccupancyChange};
pub use record::{LogRecord, RecordError, RECORD_SIZE};
