//! Mailbox file ingestion.
//!
//! Local producers append `<subject id>,<unix seconds>` lines to a shared
//! file. A periodic task drains it: the file is read in full and emptied,
//! then each line is parsed and submitted to the background logger.
//!
//! Delivery is at-most-once. The file is emptied before any line is
//! submitted, so a scan is never applied twice, but a line appended by a
//! producer between the read and the truncate is lost.
//!
//! # Panic-Free Guarantees
//!
//! Malformed lines are counted and logged; a failed drain is logged and the
//! next tick tries again.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rollcall_core::{Scan, ScanSource};
use rollcall_protocol::parse_mailbox_line;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::logger::LoggerHandle;

#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("failed to read mailbox {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to truncate mailbox {path}: {source}")]
    Truncate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Counts from one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub submitted: usize,
    pub failed: usize,
}

/// Drains the mailbox file into the background logger.
pub struct MailboxDrainer {
    path: PathBuf,
    logger: LoggerHandle,
    drain_lock: Mutex<()>,
}

impl MailboxDrainer {
    pub fn new(path: impl Into<PathBuf>, logger: LoggerHandle) -> Self {
        Self {
            path: path.into(),
            logger,
            drain_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs one drain pass. Concurrent callers are serialised.
    ///
    /// A missing file is an empty mailbox. If the file cannot be emptied,
    /// nothing is submitted and the lines stay for the next pass.
    pub async fn drain_once(&self) -> Result<DrainReport, MailboxError> {
        let _guard = self.drain_lock.lock().await;

        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(DrainReport::default()),
            Err(source) => {
                return Err(MailboxError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if bytes.is_empty() {
            return Ok(DrainReport::default());
        }

        tokio::fs::write(&self.path, b"")
            .await
            .map_err(|source| MailboxError::Truncate {
                path: self.path.clone(),
                source,
            })?;

        let text = String::from_utf8_lossy(&bytes);
        let mut report = DrainReport::default();

        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }

            let entry = match parse_mailbox_line(line) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(line = index + 1, error = %e, "Malformed mailbox line");
                    report.failed += 1;
                    continue;
                }
            };

            let scan = Scan::new(entry.subject, entry.timestamp, ScanSource::Mailbox);
            match self.logger.submit(scan) {
                Ok(()) => report.submitted += 1,
                Err(e) => {
                    warn!(line = index + 1, error = %e, "Mailbox scan not accepted");
                    report.failed += 1;
                }
            }
        }

        if report.submitted > 0 || report.failed > 0 {
            info!(
                submitted = report.submitted,
                failed = report.failed,
                "Mailbox drained"
            );
        }
        Ok(report)
    }
}

/// Spawns a task draining the mailbox every `period` until cancelled.
///
/// Ticks never overlap: a slow pass delays the next one.
pub fn spawn_mailbox_task(
    drainer: Arc<MailboxDrainer>,
    period: Duration,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(
            path = %drainer.path().display(),
            period_ms = period.as_millis() as u64,
            "Mailbox task started"
        );

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!("Mailbox task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = drainer.drain_once().await {
                        error!(error = %e, "Mailbox drain failed");
                    }
                }
            }
        }
    })
}
