//! Durable storage for attendance events.
//!
//! Three artefacts live on disk:
//!
//! - [`BinaryLog`]: append-only file of fixed-width records, the source of
//!   truth reloaded at startup.
//! - [`SnapshotExporter`]: full JSON export of the store, rewritten after
//!   every batch and named by the local date.
//! - [`DailyLog`]: per-day text audit trail with resolved names.

mod binlog;
mod daily;
mod export;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use binlog::{BinaryLog, LoadReport};
pub use daily::{audit_file_name, format_audit_line, DailyLog, UNKNOWN_NAME};
pub use export::{export_file_name, SnapshotExporter, UNDATED_EXPORT_NAME};

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize export: {0}")]
    Json(#[from] serde_json::Error),
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
