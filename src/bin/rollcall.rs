//! rollcall - scan client
//!
//! Sends a badge scan to a running daemon over TCP, or posts scans into the
//! mailbox file for the daemon to pick up on its next drain.
//!
//! # Usage
//!
//! ```text
//! rollcall scan MHS001                         # scan against 127.0.0.1:8080
//! rollcall scan MHS001 --addr 10.0.0.5:8080
//! rollcall post MHS001                         # append one mailbox line
//! rollcall post MHS001 --count 5 --delay-ms 200
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use rollcall_core::SubjectId;
use rollcall_protocol::{format_mailbox_line, Request, Response};
use rollcalld::RollcallConfig;

/// rollcall - attendance scan client
#[derive(Parser, Debug)]
#[command(name = "rollcall", version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one scan to the daemon and print the reply
    Scan {
        /// Student / badge ID
        id: String,

        /// Daemon address
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: String,

        /// Seconds to wait for connect and reply
        #[arg(long, default_value_t = 5)]
        timeout_secs: u64,
    },
    /// Append scans to the mailbox file
    Post {
        /// Student / badge ID
        id: String,

        /// Number of lines to append
        #[arg(long, default_value_t = 1)]
        count: u32,

        /// Pause between lines
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,

        /// Mailbox file; defaults to the daemon's configured mailbox
        #[arg(long)]
        mailbox: Option<PathBuf>,

        /// Daemon configuration used to locate the mailbox
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Scan {
            id,
            addr,
            timeout_secs,
        } => {
            let subject = SubjectId::new(&id).with_context(|| format!("Invalid ID '{id}'"))?;
            let response = scan(&addr, subject, Duration::from_secs(timeout_secs)).await?;
            match response {
                Response::Found { name, affiliation } => println!("{name} ({affiliation})"),
                Response::Ok => println!("recorded {id}"),
                Response::Error(reason) => bail!("Daemon rejected scan: {reason}"),
            }
            Ok(())
        }
        Command::Post {
            id,
            count,
            delay_ms,
            mailbox,
            config,
        } => {
            let subject = SubjectId::new(&id).with_context(|| format!("Invalid ID '{id}'"))?;
            let path = match mailbox {
                Some(path) => path,
                None => RollcallConfig::load(config.as_deref())
                    .context("Failed to load configuration")?
                    .mailbox_file(),
            };
            post(&path, &subject, count, Duration::from_millis(delay_ms)).await?;
            println!("posted {count} scan(s) for {id} to {}", path.display());
            Ok(())
        }
    }
}

/// Sends one request and waits for the single-line reply.
async fn scan(addr: &str, subject: SubjectId, limit: Duration) -> Result<Response> {
    let stream = timeout(limit, TcpStream::connect(addr))
        .await
        .with_context(|| format!("Timed out connecting to {addr}"))?
        .with_context(|| format!("Failed to connect to {addr}"))?;
    let (reader, mut writer) = stream.into_split();

    writer
        .write_all(Request::scan(subject).to_line().as_bytes())
        .await
        .context("Failed to send scan")?;
    writer.flush().await?;

    let mut line = String::new();
    let read = timeout(limit, BufReader::new(reader).read_line(&mut line))
        .await
        .context("Timed out waiting for reply")?
        .context("Failed to read reply")?;
    if read == 0 {
        bail!("Daemon closed the connection without replying");
    }

    Response::parse(&line).context("Malformed reply")
}

/// Appends `count` lines stamped with the current time.
async fn post(path: &Path, subject: &SubjectId, count: u32, delay: Duration) -> Result<()> {
    for i in 0..count {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let line = format_mailbox_line(subject, chrono::Utc::now().timestamp());
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("Failed to open mailbox {}", path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
    }
    Ok(())
}
