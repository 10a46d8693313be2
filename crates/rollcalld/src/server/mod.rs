//! TCP listener for scanning clients.
//!
//! The server:
//! - Listens on a TCP address (default `0.0.0.0:8080`)
//! - Spawns a ConnectionHandler task for each client
//! - Bounds concurrent connections with a semaphore
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   ScanServer    │
//! │                 │
//! │  TcpListener    │
//! └───────┬─────────┘
//!         │ accept() + semaphore permit
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│  LoggerHandle   │
//! │   (per client)  │     │  (submit scan)  │
//! └───────┬─────────┘     └─────────────────┘
//!         │ lookup
//!         ▼
//! ┌─────────────────┐
//! │    Directory    │
//! └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Accept errors are logged and the loop continues

mod connection;

pub use connection::{ConnectionError, ConnectionHandler, ScanContext};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rollcall_protocol::{Framing, Response};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::RollcallConfig;

/// Listener settings.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub addr: SocketAddr,
    pub framing: Framing,
    pub max_connections: usize,
    pub read_timeout: Duration,
}

impl ServerOptions {
    pub fn from_config(config: &RollcallConfig) -> Result<Self, ServerError> {
        let addr = config
            .socket_addr()
            .map_err(|e| ServerError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            addr,
            framing: config.framing,
            max_connections: config.max_connections,
            read_timeout: config.read_timeout(),
        })
    }
}

/// TCP server for scanning clients.
pub struct ScanServer {
    options: ServerOptions,
    context: Arc<ScanContext>,
    cancel_token: CancellationToken,
    connection_limit: Arc<Semaphore>,
    connection_counter: AtomicU64,
}

impl ScanServer {
    pub fn new(
        options: ServerOptions,
        context: Arc<ScanContext>,
        cancel_token: CancellationToken,
    ) -> Self {
        let connection_limit = Arc::new(Semaphore::new(options.max_connections));
        Self {
            options,
            context,
            cancel_token,
            connection_limit,
            connection_counter: AtomicU64::new(0),
        }
    }

    /// Binds the configured address.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        TcpListener::bind(self.options.addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: self.options.addr,
                error: e.to_string(),
            })
    }

    /// Binds and serves until the cancellation token is triggered.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Serves an already bound listener until cancelled.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local = listener
            .local_addr()
            .map_err(|e| ServerError::Bind {
                addr: self.options.addr,
                error: e.to_string(),
            })?;

        info!(
            addr = %local,
            framing = %self.options.framing,
            max_connections = self.options.max_connections,
            "Scan server listening"
        );

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, peer, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        info!(
            connections = self.connection_counter.load(Ordering::Relaxed),
            "Scan server stopped"
        );
        Ok(())
    }

    fn handle_connection(&self, mut stream: TcpStream, peer: SocketAddr, connection_number: u64) {
        let permit = match Arc::clone(&self.connection_limit).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(
                    peer = %peer,
                    max = self.options.max_connections,
                    "Connection limit reached, refusing client"
                );
                tokio::spawn(async move {
                    let busy = Response::error("server busy").to_line();
                    let _ = stream.write_all(busy.as_bytes()).await;
                });
                return;
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
        }

        let handler = ConnectionHandler::new(
            stream,
            peer,
            Arc::clone(&self.context),
            self.options.framing,
            self.options.read_timeout,
            self.cancel_token.child_token(),
            connection_number,
        );

        tokio::spawn(async move {
            handler.run().await;
            drop(permit);
        });
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },

    #[error("Invalid server configuration: {0}")]
    InvalidConfig(String),
}
