//! Line-oriented administrative console.
//!
//! The daemon binds this to stdin. Commands:
//!
//! ```text
//! scan <id> [reader]   record a scan now (synchronous, bypasses the queue)
//! search <id>          list a subject's events
//! list                 list every event
//! sort                 sort the log by timestamp
//! export               write the JSON export now
//! status               event, subject and occupancy counters
//! drain                drain the mailbox now
//! help                 this text
//! quit                 stop the daemon
//! ```
//!
//! Commands that touch the disk run on the blocking pool.

use std::fmt::Write as _;
use std::io;
use std::sync::Arc;

use rollcall_core::{AttendanceEvent, ReaderId, SubjectId};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::directory::Directory;
use crate::mailbox::MailboxDrainer;
use crate::pipeline::Pipeline;

const HELP: &str = "\
commands:
  scan <id> [reader]   record a scan now
  search <id>          list a subject's events
  list                 list every event
  sort                 sort the log by timestamp
  export               write the JSON export now
  status               show counters
  drain                drain the mailbox now
  help                 show this text
  quit                 stop the daemon";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdminError {
    #[error("unknown command: {0} (try 'help')")]
    UnknownCommand(String),

    #[error("usage: {0}")]
    Usage(&'static str),
}

/// A parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Scan {
        subject: String,
        reader: Option<ReaderId>,
    },
    Search(String),
    List,
    Sort,
    Export,
    Status,
    Drain,
    Help,
    Quit,
}

impl AdminCommand {
    /// Parses one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, AdminError> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let cmd = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("scan", [id]) => Self::Scan {
                subject: (*id).to_string(),
                reader: None,
            },
            ("scan", [id, reader]) => Self::Scan {
                subject: (*id).to_string(),
                reader: Some(ReaderId::from(*reader)),
            },
            ("scan", _) => return Err(AdminError::Usage("scan <id> [reader]")),
            ("search", [id]) => Self::Search((*id).to_string()),
            ("search", _) => return Err(AdminError::Usage("search <id>")),
            ("list", []) => Self::List,
            ("sort", []) => Self::Sort,
            ("export", []) => Self::Export,
            ("status", []) => Self::Status,
            ("drain", []) => Self::Drain,
            ("help" | "?", _) => Self::Help,
            ("quit" | "exit", _) => Self::Quit,
            (other, _) => return Err(AdminError::UnknownCommand(other.to_string())),
        };
        Ok(Some(cmd))
    }
}

/// Why the console loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    /// Operator asked to stop the daemon
    Quit,
    /// Input closed
    Eof,
    /// Cancellation token fired
    Cancelled,
}

pub struct AdminConsole {
    pipeline: Arc<Pipeline>,
    directory: Arc<dyn Directory>,
    drainer: Option<Arc<MailboxDrainer>>,
}

impl AdminConsole {
    pub fn new(
        pipeline: Arc<Pipeline>,
        directory: Arc<dyn Directory>,
        drainer: Option<Arc<MailboxDrainer>>,
    ) -> Self {
        Self {
            pipeline,
            directory,
            drainer,
        }
    }

    /// Reads commands until `quit`, end of input, or cancellation.
    pub async fn run<R, W>(
        &self,
        input: R,
        mut output: W,
        cancel_token: CancellationToken,
    ) -> io::Result<ConsoleExit>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        output.write_all(b"rollcall admin console, type 'help'\n").await?;
        output.flush().await?;

        loop {
            let line = tokio::select! {
                _ = cancel_token.cancelled() => return Ok(ConsoleExit::Cancelled),
                line = lines.next_line() => match line? {
                    Some(line) => line,
                    None => return Ok(ConsoleExit::Eof),
                },
            };

            let reply = match AdminCommand::parse(&line) {
                Ok(None) => continue,
                Ok(Some(AdminCommand::Quit)) => {
                    info!("Quit requested from admin console");
                    output.write_all(b"bye\n").await?;
                    output.flush().await?;
                    return Ok(ConsoleExit::Quit);
                }
                Ok(Some(cmd)) => {
                    debug!(command = ?cmd, "Admin command");
                    self.execute(cmd).await
                }
                Err(e) => format!("error: {e}"),
            };

            output.write_all(reply.as_bytes()).await?;
            if !reply.ends_with('\n') {
                output.write_all(b"\n").await?;
            }
            output.flush().await?;
        }
    }

    /// Executes one command and returns the reply text.
    pub async fn execute(&self, cmd: AdminCommand) -> String {
        match cmd {
            AdminCommand::Scan { subject, reader } => self.scan(&subject, reader).await,
            AdminCommand::Search(subject) => self.search(&subject),
            AdminCommand::List => {
                let events = self.pipeline.store().snapshot();
                if events.is_empty() {
                    return "no events".to_string();
                }
                self.format_events(&events)
            }
            AdminCommand::Sort => {
                let store = Arc::clone(self.pipeline.store());
                store.sort_by_time();
                format!("sorted {} events by time", store.len())
            }
            AdminCommand::Export => {
                let pipeline = Arc::clone(&self.pipeline);
                match tokio::task::spawn_blocking(move || pipeline.export()).await {
                    Ok(Ok(path)) => format!(
                        "exported {} events to {}",
                        self.pipeline.store().len(),
                        path.display()
                    ),
                    Ok(Err(e)) => format!("error: {e}"),
                    Err(e) => format!("error: export task failed: {e}"),
                }
            }
            AdminCommand::Status => self.status(),
            AdminCommand::Drain => match &self.drainer {
                Some(drainer) => match drainer.drain_once().await {
                    Ok(report) => format!(
                        "mailbox: {} submitted, {} failed",
                        report.submitted, report.failed
                    ),
                    Err(e) => format!("error: {e}"),
                },
                None => "mailbox is disabled".to_string(),
            },
            AdminCommand::Help => HELP.to_string(),
            AdminCommand::Quit => "bye".to_string(),
        }
    }

    async fn scan(&self, subject: &str, reader: Option<ReaderId>) -> String {
        let subject = match SubjectId::new(subject) {
            Ok(s) => s,
            Err(e) => return format!("error: {e}"),
        };

        let pipeline = Arc::clone(&self.pipeline);
        let result =
            tokio::task::spawn_blocking(move || pipeline.record_direct(subject, reader)).await;

        match result {
            Ok(Ok(applied)) => {
                let event = &applied.event;
                let mut reply = format!(
                    "recorded {} {} {} at {}",
                    event.record_id(),
                    event.subject(),
                    event.direction_label(),
                    event.local_time()
                );
                if let Some(p) = self.directory.lookup(event.subject()) {
                    let _ = write!(reply, " ({}, {})", p.name, p.affiliation);
                }
                if !applied.persisted {
                    reply.push_str(" [not persisted]");
                }
                reply
            }
            Ok(Err(e)) => format!("error: {e}"),
            Err(e) => format!("error: scan task failed: {e}"),
        }
    }

    fn search(&self, subject: &str) -> String {
        let subject = match SubjectId::new(subject) {
            Ok(s) => s,
            Err(e) => return format!("error: {e}"),
        };
        let events = self.pipeline.store().find_by_subject(&subject);
        if events.is_empty() {
            return format!("no events for {subject}");
        }

        let mut out = String::new();
        if let Some(p) = self.directory.lookup(&subject) {
            let _ = writeln!(out, "{subject}: {} ({})", p.name, p.affiliation);
        }
        out.push_str(&self.format_events(&events));
        out
    }

    fn status(&self) -> String {
        let store = self.pipeline.store();
        let stats = store.stats();

        let mut out = format!(
            "events: {}\nsubjects: {} ({} present)\nroster: {} entries\n",
            stats.events,
            stats.subjects,
            stats.present,
            self.directory.len()
        );
        if stats.clamped_exits > 0 || stats.over_capacity_entries > 0 {
            let _ = writeln!(
                out,
                "anomalies: {} exits at empty locations, {} entries over capacity",
                stats.clamped_exits, stats.over_capacity_entries
            );
        }
        for loc in store.locations() {
            let _ = writeln!(out, "  {loc}");
        }
        out
    }

    fn format_events(&self, events: &[AttendanceEvent]) -> String {
        let mut out = String::new();
        for event in events {
            let _ = write!(
                out,
                "{:>6}  {}  {:<19}  {:<5}",
                event.record_id().to_string(),
                event.local_time(),
                event.subject().as_str(),
                event.direction_label()
            );
            if let Some(reader) = event.reader() {
                let _ = write!(out, "  reader={reader}");
            }
            if let Some(loc) = event.location() {
                let _ = write!(out, "  location={loc}");
            }
            out.push('\n');
        }
        out
    }
}
