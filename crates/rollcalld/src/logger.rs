//! Background logger: the queue between ingestion and the pipeline.
//!
//! Network and mailbox scans are submitted to a [`LoggerHandle`] and return
//! immediately. One worker task owns the receiving end and applies scans in
//! arrival order.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ ScanServer   │──┐
//! └──────────────┘  │ submit()       ┌────────────────┐   spawn_blocking   ┌──────────┐
//!                   ├──(unbounded)──▶│  worker task   │──────────────────▶│ Pipeline │
//! ┌──────────────┐  │   mpsc         │ recv + drain   │   apply_batch      └──────────┘
//! │ MailboxDrain │──┘                └────────────────┘
//! └──────────────┘
//! ```
//!
//! The worker waits for one scan, takes everything else already queued as
//! the same batch, and hands the batch to the blocking pool (store append
//! and file I/O), exporting once per batch.
//!
//! # Shutdown
//!
//! [`BackgroundLogger::shutdown`] cancels the worker, which then closes the
//! queue (further submits fail with [`LoggerError::Closed`]) and applies every
//! scan still queued before returning its counters.
//!
//! # Panic-Free Guarantees
//!
//! A panicking batch is caught at the join boundary and logged; the worker
//! keeps running.

use std::sync::Arc;

use rollcall_core::Scan;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::pipeline::{BatchOutcome, Pipeline};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoggerError {
    #[error("background logger is closed")]
    Closed,
}

/// Counters accumulated by the worker over its lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggerStats {
    pub applied: u64,
    pub rejected: u64,
    pub persist_failures: u64,
    pub batches: u64,
    pub exports: u64,
}

impl LoggerStats {
    fn record(&mut self, outcome: &BatchOutcome) {
        self.applied += outcome.applied as u64;
        self.rejected += outcome.rejected as u64;
        self.persist_failures += outcome.persist_failures as u64;
        self.batches += 1;
        if outcome.exported {
            self.exports += 1;
        }
    }
}

/// Cheap-to-clone submission handle.
#[derive(Clone, Debug)]
pub struct LoggerHandle {
    sender: mpsc::UnboundedSender<Scan>,
}

impl LoggerHandle {
    /// Enqueues a scan without waiting for it to be applied.
    pub fn submit(&self, scan: Scan) -> Result<(), LoggerError> {
        self.sender.send(scan).map_err(|_| LoggerError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// The running logger: a handle plus the worker it feeds.
pub struct BackgroundLogger {
    handle: LoggerHandle,
    cancel_token: CancellationToken,
    worker: JoinHandle<LoggerStats>,
}

impl BackgroundLogger {
    /// Spawns the worker task on the current runtime.
    pub fn spawn(pipeline: Arc<Pipeline>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let worker = tokio::spawn(run_worker(pipeline, receiver, cancel_token.clone()));

        Self {
            handle: LoggerHandle { sender },
            cancel_token,
            worker,
        }
    }

    pub fn handle(&self) -> LoggerHandle {
        self.handle.clone()
    }

    /// Stops the worker after it has applied everything already queued.
    pub async fn shutdown(self) -> LoggerStats {
        self.cancel_token.cancel();
        match self.worker.await {
            Ok(stats) => stats,
            Err(e) => {
                error!(error = %e, "Background logger task failed");
                LoggerStats::default()
            }
        }
    }
}

async fn run_worker(
    pipeline: Arc<Pipeline>,
    mut receiver: mpsc::UnboundedReceiver<Scan>,
    cancel_token: CancellationToken,
) -> LoggerStats {
    let mut stats = LoggerStats::default();
    debug!("Background logger started");

    loop {
        let first = tokio::select! {
            biased;

            _ = cancel_token.cancelled() => break,

            scan = receiver.recv() => match scan {
                Some(scan) => scan,
                None => break,
            },
        };

        let mut batch = vec![first];
        while let Ok(scan) = receiver.try_recv() {
            batch.push(scan);
        }
        apply_batch(&pipeline, batch, &mut stats).await;
    }

    // No new scans after this point; drain what is already queued
    receiver.close();
    let mut remaining = Vec::new();
    while let Some(scan) = receiver.recv().await {
        remaining.push(scan);
    }
    if !remaining.is_empty() {
        info!(count = remaining.len(), "Draining queued scans before shutdown");
        apply_batch(&pipeline, remaining, &mut stats).await;
    }

    info!(
        applied = stats.applied,
        rejected = stats.rejected,
        persist_failures = stats.persist_failures,
        batches = stats.batches,
        "Background logger stopped"
    );
    stats
}

async fn apply_batch(pipeline: &Arc<Pipeline>, batch: Vec<Scan>, stats: &mut LoggerStats) {
    let size = batch.len();
    let pipeline = Arc::clone(pipeline);
    match tokio::task::spawn_blocking(move || pipeline.apply_batch(batch)).await {
        Ok(outcome) => {
            debug!(
                size,
                applied = outcome.applied,
                rejected = outcome.rejected,
                "Batch applied"
            );
            stats.record(&outcome);
        }
        Err(e) => {
            error!(size, error = %e, "Batch task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{BinaryLog, SnapshotExporter};
    use crate::store::AttendanceStore;
    use rollcall_core::{ScanSource, SubjectId};
    use tempfile::tempdir;

    fn scan(id: &str, ts: i64) -> Scan {
        Scan::new(SubjectId::new(id).unwrap(), ts, ScanSource::Network)
    }

    fn pipeline(dir: &std::path::Path) -> Arc<Pipeline> {
        Arc::new(Pipeline::new(
            Arc::new(AttendanceStore::unmapped()),
            BinaryLog::new(dir.join("attendance.dat")),
            SnapshotExporter::new(dir),
        ))
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        let logger = BackgroundLogger::spawn(Arc::clone(&pipeline));
        let handle = logger.handle();

        for ts in 0..100 {
            handle.submit(scan("MHS001", ts)).unwrap();
        }
        let stats = logger.shutdown().await;

        assert_eq!(stats.applied, 100);
        assert!(stats.batches >= 1);
        assert_eq!(pipeline.store().len(), 100);
        assert_eq!(pipeline.log().load().unwrap().records.len(), 100);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let dir = tempdir().unwrap();
        let logger = BackgroundLogger::spawn(pipeline(dir.path()));
        let handle = logger.handle();
        logger.shutdown().await;

        assert!(handle.is_closed());
        assert_eq!(handle.submit(scan("A1", 1)), Err(LoggerError::Closed));
    }

    #[tokio::test]
    async fn test_order_is_preserved() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        let logger = BackgroundLogger::spawn(Arc::clone(&pipeline));
        let handle = logger.handle();

        for ts in 0..20 {
            handle.submit(scan("A1", ts)).unwrap();
            tokio::task::yield_now().await;
        }
        logger.shutdown().await;

        let stamps: Vec<i64> = pipeline
            .store()
            .snapshot()
            .iter()
            .map(|e| e.timestamp())
            .collect();
        assert_eq!(stamps, (0..20).collect::<Vec<_>>());
    }
}
