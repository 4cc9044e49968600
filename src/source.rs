//! Log stream sources.

use anyhow::{bail, Context, Result};
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::dispatch::Dispatcher;
use tokio_util::sync::CancellationToken;

/// Where log lines come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSource {
    /// systemd journal, starting five seconds back
    Journal,
    /// A log file followed across rotation
    File(PathBuf),
    Stdin,
}

impl FromStr for LogSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "journal" => Ok(LogSource::Journal),
            "stdin" | "-" => Ok(LogSource::Stdin),
            _ => match s.strip_prefix("file:") {
                Some(path) if !path.is_empty() => Ok(LogSource::File(PathBuf::from(path))),
                _ => Err(format!(
                    "Invalid log source '{}'. Use: journal, stdin, or file:<path>",
                    s
                )),
            },
        }
    }
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogSource::Journal => write!(f, "journal"),
            LogSource::File(path) => write!(f, "file:{}", path.display()),
            LogSource::Stdin => write!(f, "stdin"),
        }
    }
}

impl LogSource {
    /// Program and arguments of the follower process, if one is needed.
    fn follower(&self) -> Option<(&'static str, Vec<String>)> {
        match self {
            LogSource::Journal => Some((
                "journalctl",
                vec![
                    "--follow".to_string(),
                    "--output=short-iso".to_string(),
                    "--since=-5s".to_string(),
                ],
            )),
            LogSource::File(path) => Some((
                "tail",
                vec![
                    "-F".to_string(),
                    "-n".to_string(),
                    "0".to_string(),
                    path.display().to_string(),
                ],
            )),
            LogSource::Stdin => None,
        }
    }

    /// Feed lines to `sink` until the stream ends or shutdown is requested.
    /// Returns the number of lines read.
    pub async fn follow(&self, sink: &Dispatcher, shutdown: &CancellationToken) -> Result<u64> {
        info!("Reading log lines from {}", self);
        match self.follower() {
            None => pump(tokio::io::stdin(), sink, shutdown).await,
            Some((program, args)) => {
                let mut child = spawn_follower(program, &args)?;
                let stdout = child
                    .stdout
                    .take()
                    .with_context(|| format!("{} has no stdout", program))?;
                let lines = pump(stdout, sink, shutdown).await;
                if let Err(e) = child.kill().await {
                    debug!("{} already exited: {}", program, e);
                }
                lines
            }
        }
    }
}

fn spawn_follower(program: &str, args: &[String]) -> Result<Child> {
    debug!("Executing: {} {}", program, args.join(" "));
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to start {}", program))?;
    Ok(child)
}

/// Split `reader` on newlines and hand every line to `sink`.
pub async fn pump<R>(reader: R, sink: &Dispatcher, shutdown: &CancellationToken) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).split(b'\n');
    let mut count = 0u64;

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = lines.next_segment() => next.context("Failed to read log stream")?,
        };
        let Some(mut line) = next else {
            break;
        };
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        sink.consume(&line).await;
        count += 1;
    }
    Ok(count)
}

/// Reject sources that cannot work before the firewall is touched.
pub fn preflight(source: &LogSource) -> Result<()> {
    if let LogSource::File(path) = source {
        if !path.is_absolute() {
            bail!("log file path must be absolute: {}", path.display());
        }
    }
    Ok(())
}
