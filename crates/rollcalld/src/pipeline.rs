//! The single entry point for applying scans.
//!
//! A [`Pipeline`] owns the store, the binary log and the exporter. Both the
//! background logger and the administrative path go through it, so every
//! event is sequenced, recorded and persisted by the same rules.
//!
//! ```text
//!  Scan ──▶ writer lock ──▶ AttendanceStore::append ──▶ BinaryLog::append
//!                 (held across both, so file order == store order)
//! ```
//!
//! The writer lock is separate from the store lock: queries only contend on
//! the store, never on disk I/O. When an audit log is attached, its line is
//! written under the same lock, after the binary append.
//!
//! # Panic-Free Guarantees
//!
//! Persistence failures are logged and counted; the in-memory event is kept.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use rollcall_core::{AttendanceEvent, LogRecord, ReaderId, Scan, ScanSource, SubjectId};
use tracing::{debug, error, info, warn};

use crate::config::RollcallConfig;
use crate::directory::Directory;
use crate::persistence::{BinaryLog, DailyLog, LoadReport, PersistenceError, SnapshotExporter};
use crate::store::{AttendanceStore, StoreError};

/// Result of applying one scan.
#[derive(Debug, Clone)]
pub struct Applied {
    pub event: AttendanceEvent,
    /// False when the binary append failed
    pub persisted: bool,
}

/// Counters for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub applied: usize,
    pub rejected: usize,
    pub persist_failures: usize,
    pub exported: bool,
}

pub struct Pipeline {
    store: Arc<AttendanceStore>,
    log: BinaryLog,
    exporter: SnapshotExporter,
    audit: Option<Audit>,
    writer: Mutex<()>,
}

struct Audit {
    log: DailyLog,
    directory: Arc<dyn Directory>,
}

impl Pipeline {
    pub fn new(store: Arc<AttendanceStore>, log: BinaryLog, exporter: SnapshotExporter) -> Self {
        Self {
            store,
            log,
            exporter,
            audit: None,
            writer: Mutex::new(()),
        }
    }

    /// Attaches a daily audit log; names are resolved through `directory`.
    pub fn with_audit_log(mut self, log: DailyLog, directory: Arc<dyn Directory>) -> Self {
        self.audit = Some(Audit { log, directory });
        self
    }

    /// Builds an empty pipeline from configuration, with the audit log in
    /// the export directory. Call [`Pipeline::restore`] before serving.
    pub fn from_config(config: &RollcallConfig, directory: Arc<dyn Directory>) -> Self {
        let store = AttendanceStore::new(config.build_locations(), config.reader_map());
        Self::new(
            Arc::new(store),
            BinaryLog::new(config.log_path()),
            SnapshotExporter::new(config.export_path()),
        )
        .with_audit_log(DailyLog::new(config.export_path()), directory)
    }

    pub fn store(&self) -> &Arc<AttendanceStore> {
        &self.store
    }

    pub fn log(&self) -> &BinaryLog {
        &self.log
    }

    /// Reloads the binary log into the store.
    pub fn restore(&self) -> Result<LoadReport, PersistenceError> {
        let _guard = self.writer.lock();
        let report = self.log.load()?;
        let restored = self.store.restore(&report.records);
        info!(
            restored,
            skipped = report.skipped,
            truncated_tail_bytes = report.truncated_tail_bytes,
            "Attendance store restored"
        );
        Ok(report)
    }

    /// Sequences, records and persists one scan.
    ///
    /// Rejected scans leave both the store and the file untouched.
    pub fn apply(&self, scan: Scan) -> Result<Applied, StoreError> {
        let _guard = self.writer.lock();
        let source = scan.source;
        let event = self.store.append(scan)?;

        let persisted = match self.log.append(&LogRecord::from(&event)) {
            Ok(()) => true,
            Err(e) => {
                error!(
                    record = %event.record_id(),
                    subject = %event.subject(),
                    error = %e,
                    "Failed to persist event, keeping it in memory"
                );
                false
            }
        };

        if let Some(audit) = &self.audit {
            let profile = audit.directory.lookup(event.subject());
            let name = profile.as_ref().map(|p| p.name.as_str());
            if let Err(e) = audit.log.append(&event, name) {
                warn!(record = %event.record_id(), error = %e, "Failed to write audit line");
            }
        }

        debug!(
            record = %event.record_id(),
            subject = %event.subject(),
            direction = event.direction_label(),
            source = %source,
            "Scan applied"
        );
        Ok(Applied { event, persisted })
    }

    /// Applies scans in order, then exports once if anything was recorded.
    pub fn apply_batch(&self, scans: Vec<Scan>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for scan in scans {
            let subject = scan.subject.clone();
            match self.apply(scan) {
                Ok(applied) => {
                    outcome.applied += 1;
                    if !applied.persisted {
                        outcome.persist_failures += 1;
                    }
                }
                Err(e) => {
                    warn!(subject = %subject, error = %e, "Scan rejected");
                    outcome.rejected += 1;
                }
            }
        }

        if outcome.applied > 0 {
            outcome.exported = self.export_logged().is_some();
        }
        outcome
    }

    /// Administrative direct path: stamps the scan with the current time and
    /// applies it synchronously, then refreshes the export.
    pub fn record_direct(
        &self,
        subject: SubjectId,
        reader: Option<ReaderId>,
    ) -> Result<Applied, StoreError> {
        let scan = Scan::now(subject, ScanSource::Admin).with_reader(reader);
        let applied = self.apply(scan)?;
        self.export_logged();
        Ok(applied)
    }

    /// Writes a full export of the current store.
    pub fn export(&self) -> Result<PathBuf, PersistenceError> {
        self.exporter.export_with(|| self.store.snapshot())
    }

    fn export_logged(&self) -> Option<PathBuf> {
        match self.export() {
            Ok(path) => Some(path),
            Err(e) => {
                error!(error = %e, "Snapshot export failed");
                None
            }
        }
    }
}
