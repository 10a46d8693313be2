//! rollcall Daemon - Attendance scan ingestion and durable logging
//!
//! This crate provides the infrastructure for the rollcall daemon:
//! - `server` - TCP listener for scanning clients
//! - `mailbox` - Periodic drain of the mailbox file
//! - `admin` - Line-oriented administrative console
//! - `logger` - Background queue feeding the pipeline
//! - `pipeline` - Store append + binary log append + export
//! - `store` - In-memory event log and derived state
//! - `persistence` - Binary log and JSON export
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        rollcalld daemon                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌───────────────┐        ┌───────────────┐   │
//! │  │  ScanServer  │  │ MailboxDrainer│        │ AdminConsole  │   │
//! │  │    (TCP)     │  │  (interval)   │        │   (stdin)     │   │
//! │  └──────┬───────┘  └───────┬───────┘        └───────┬───────┘   │
//! │         │ submit           │ submit                 │ direct    │
//! │         ▼                  ▼                        │           │
//! │  ┌──────────────────────────────┐                   │           │
//! │  │      BackgroundLogger        │                   │           │
//! │  │  (mpsc queue, one worker)    │                   │           │
//! │  └──────────────┬───────────────┘                   │           │
//! │                 ▼                                   ▼           │
//! │  ┌──────────────────────────────────────────────────────────┐   │
//! │  │ Pipeline: AttendanceStore ─▶ BinaryLog ─▶ SnapshotExport │   │
//! │  └──────────────────────────────────────────────────────────┘   │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod admin;
pub mod config;
pub mod directory;
pub mod logger;
pub mod mailbox;
pub mod persistence;
pub mod pipeline;
pub mod sequencer;
pub mod server;
pub mod store;

pub use config::{ConfigError, RollcallConfig};
pub use directory::{Directory, Profile, RosterDirectory};
pub use logger::{BackgroundLogger, LoggerError, LoggerHandle, LoggerStats};
pub use mailbox::{spawn_mailbox_task, DrainReport, MailboxDrainer};
pub use pipeline::Pipeline;
pub use store::{AttendanceStore, StoreError};
