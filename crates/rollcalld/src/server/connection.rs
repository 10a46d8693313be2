//! Handler for a single scanner connection.
//!
//! Each connection runs a small state machine:
//!
//! ```text
//! AWAIT_REQUEST ──▶ PARSE ──▶ LOOKUP ──▶ ENQUEUE ──▶ RESPOND ──┐
//!       ▲                                                      │
//!       └──────────────────────────────────────────────────────┘
//! ```
//!
//! It ends on EOF, a receive error, a read timeout, or server shutdown. A
//! request that fails to parse gets an `ERROR:` reply and the loop carries
//! on.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Connection errors are logged and result in graceful disconnect

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rollcall_core::{ReaderId, Scan, ScanSource};
use rollcall_protocol::{Framing, Request, RequestFramer, Response};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::directory::Directory;
use crate::logger::LoggerHandle;

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Size of one socket read
const READ_CHUNK: usize = 4096;

/// State shared by every connection.
pub struct ScanContext {
    pub directory: Arc<dyn Directory>,
    pub logger: LoggerHandle,
    /// Reader attributed to scans arriving over the network
    pub reader: Option<ReaderId>,
}

/// Connection handler for a single client.
pub struct ConnectionHandler<S> {
    stream: S,
    peer: SocketAddr,
    context: Arc<ScanContext>,
    framer: RequestFramer,
    read_timeout: Duration,
    cancel_token: CancellationToken,
    connection_number: u64,
    handled: u64,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        peer: SocketAddr,
        context: Arc<ScanContext>,
        framing: Framing,
        read_timeout: Duration,
        cancel_token: CancellationToken,
        connection_number: u64,
    ) -> Self {
        Self {
            stream,
            peer,
            context,
            framer: RequestFramer::new(framing),
            read_timeout,
            cancel_token,
            connection_number,
            handled: 0,
        }
    }

    /// Runs the handler until the connection ends.
    ///
    /// Returns the number of requests answered.
    pub async fn run(mut self) -> u64 {
        debug!(
            connection = self.connection_number,
            peer = %self.peer,
            "Scanner connected"
        );

        match self.process_requests().await {
            Ok(()) | Err(ConnectionError::Eof) => {}
            Err(ConnectionError::Cancelled) => {
                debug!(connection = self.connection_number, "Closed for shutdown");
            }
            Err(e) => {
                debug!(
                    connection = self.connection_number,
                    peer = %self.peer,
                    error = %e,
                    "Connection closed"
                );
            }
        }

        debug!(
            connection = self.connection_number,
            requests = self.handled,
            "Scanner disconnected"
        );
        self.handled
    }

    async fn process_requests(&mut self) -> Result<(), ConnectionError> {
        let mut buf = vec![0u8; READ_CHUNK];

        loop {
            // AWAIT_REQUEST
            let n = tokio::select! {
                _ = self.cancel_token.cancelled() => return Err(ConnectionError::Cancelled),

                read = timeout(self.read_timeout, self.stream.read(&mut buf)) => match read {
                    Ok(Ok(n)) => n,
                    Ok(Err(e)) => return Err(ConnectionError::Io(e.to_string())),
                    Err(_) => return Err(ConnectionError::Timeout),
                },
            };

            if n == 0 {
                if let Some(last) = self.framer.finish() {
                    self.respond_to(last).await?;
                }
                return Err(ConnectionError::Eof);
            }

            let chunk = buf.get(..n).unwrap_or_default();
            for framed in self.framer.push(chunk) {
                self.respond_to(framed).await?;
            }
        }
    }

    async fn respond_to(
        &mut self,
        framed: Result<String, rollcall_protocol::FrameError>,
    ) -> Result<(), ConnectionError> {
        let response = match framed {
            Ok(text) => self.handle_request(&text),
            Err(e) => {
                warn!(connection = self.connection_number, error = %e, "Oversized request");
                Response::error(e)
            }
        };
        self.handled += 1;
        self.send_response(&response).await
    }

    /// PARSE → LOOKUP → ENQUEUE, producing the reply to send.
    fn handle_request(&self, text: &str) -> Response {
        let subject = match Request::parse(text) {
            Ok(Request::Scan { subject }) => subject,
            Err(e) => {
                debug!(connection = self.connection_number, error = %e, "Bad request");
                return Response::error(e);
            }
        };

        let profile = self.context.directory.lookup(&subject);

        let scan = Scan::now(subject.clone(), ScanSource::Network)
            .with_reader(self.context.reader.clone());
        if let Err(e) = self.context.logger.submit(scan) {
            warn!(subject = %subject, error = %e, "Scan not accepted");
            return Response::error(e);
        }

        info!(
            subject = %subject,
            known = profile.is_some(),
            peer = %self.peer,
            "Scan received"
        );

        match profile {
            Some(p) => Response::found(p.name, p.affiliation),
            None => Response::Ok,
        }
    }

    async fn send_response(&mut self, response: &Response) -> Result<(), ConnectionError> {
        let line = response.to_line();
        let stream = &mut self.stream;

        match timeout(WRITE_TIMEOUT, async {
            stream.write_all(line.as_bytes()).await?;
            stream.flush().await?;
            Ok::<(), std::io::Error>(())
        })
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
            Err(_) => Err(ConnectionError::WriteTimeout),
        }
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Read timeout")]
    Timeout,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Server shutting down")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::RosterDirectory;
    use crate::logger::BackgroundLogger;
    use crate::persistence::{BinaryLog, SnapshotExporter};
    use crate::pipeline::Pipeline;
    use crate::store::AttendanceStore;
    use tokio::io::{duplex, AsyncBufReadExt, BufReader};

    fn roster() -> Arc<dyn Directory> {
        Arc::new(
            RosterDirectory::from_json(
                r#"[{"id": "MHS001", "name": "Jane Smith", "affiliation": "Informatics"}]"#,
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_handler_replies_per_request() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Arc::new(Pipeline::new(
            Arc::new(AttendanceStore::unmapped()),
            BinaryLog::new(dir.path().join("attendance.dat")),
            SnapshotExporter::new(dir.path()),
        ));
        let logger = BackgroundLogger::spawn(Arc::clone(&pipeline));
        let context = Arc::new(ScanContext {
            directory: roster(),
            logger: logger.handle(),
            reader: None,
        });

        let (client, server) = duplex(1024);
        let handler = ConnectionHandler::new(
            server,
            "127.0.0.1:9".parse().unwrap(),
            context,
            Framing::Line,
            Duration::from_secs(5),
            CancellationToken::new(),
            0,
        );
        let task = tokio::spawn(handler.run());

        let (read_half, mut write_half) = tokio::io::split(client);
        let mut lines = BufReader::new(read_half).lines();

        write_half
            .write_all(b"SCAN:MHS001\nSCAN:MHS999\nHELLO\n")
            .await
            .unwrap();
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "FOUND:Jane Smith:Informatics"
        );
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "OK");
        assert!(lines
            .next_line()
            .await
            .unwrap()
            .unwrap()
            .starts_with("ERROR:"));

        drop(write_half);
        drop(lines);
        assert_eq!(task.await.unwrap(), 3);

        let stats = logger.shutdown().await;
        assert_eq!(stats.applied, 2);
        assert_eq!(pipeline.store().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_connection_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Arc::new(Pipeline::new(
            Arc::new(AttendanceStore::unmapped()),
            BinaryLog::new(dir.path().join("attendance.dat")),
            SnapshotExporter::new(dir.path()),
        ));
        let logger = BackgroundLogger::spawn(pipeline);
        let context = Arc::new(ScanContext {
            directory: roster(),
            logger: logger.handle(),
            reader: None,
        });

        let (_client, server) = duplex(64);
        let handler = ConnectionHandler::new(
            server,
            "127.0.0.1:9".parse().unwrap(),
            context,
            Framing::Line,
            Duration::from_secs(3),
            CancellationToken::new(),
            1,
        );

        // Paused clock auto-advances past the read timeout
        assert_eq!(handler.run().await, 0);
        logger.shutdown().await;
    }

    #[test]
    fn test_connection_error_display() {
        assert_eq!(ConnectionError::Timeout.to_string(), "Read timeout");
        assert!(ConnectionError::Io("reset".into()).to_string().contains("reset"));
    }
}
