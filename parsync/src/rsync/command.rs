//! A single rsync invocation driven as a child process.

use super::decoder::{DecodedLine, LineDecoder, ProgressSample};
use super::lines::ProgressLineCodec;
use bytes::Bytes;
use crate::executor::manifest::ManifestEntry;
use crate::{Result, SyncError};
use futures_util::StreamExt;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::future::Future;
use std::io;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Flags appended for the dry-run listing pass.
pub const LISTING_FLAGS: [&str; 5] = [
    "--dry-run",
    "--itemize-changes",
    "--no-verbose",
    "--no-human-readable",
    "--info=progress2",
];

/// Flags appended for a transfer job reading its file list from stdin.
pub const TRANSFER_FLAGS: [&str; 5] = [
    "--files-from=-",
    "--info=progress2",
    "--no-verbose",
    "--no-human-readable",
    "--verbose",
];

/// How long a child gets to exit after SIGTERM before it is killed.
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// The user's rsync command line, split into options, sources and destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsyncCommand {
    program: String,
    program_args: Vec<String>,
    options: Vec<String>,
    sources: Vec<String>,
    destination: String,
}

impl RsyncCommand {
    /// Build from forwarded rsync arguments.
    ///
    /// Anything starting with `-` is an option; the other arguments are the
    /// sources followed by the destination.
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (options, mut positional): (Vec<String>, Vec<String>) = args
            .into_iter()
            .map(Into::into)
            .partition(|arg| arg.starts_with('-'));

        if positional.len() < 2 {
            return Err(SyncError::InvalidArguments(
                "Not enough rsync arguments provided: need at least one source and a destination"
                    .to_string(),
            ));
        }

        let destination = positional.pop().unwrap_or_default();

        Ok(Self {
            program: "rsync".to_string(),
            program_args: Vec::new(),
            options,
            sources: positional,
            destination,
        })
    }

    /// Run `program` (with leading `program_args`) instead of plain `rsync`.
    pub fn with_program(mut self, program: impl Into<String>, program_args: Vec<String>) -> Self {
        self.program = program.into();
        self.program_args = program_args;
        self
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Directory all sources live under, used as the `--files-from` root.
    ///
    /// Paths from the listing are relative to the parent of each source, so
    /// this is the longest common run of `/`-separated segments, or the first
    /// source's parent when they all agree.
    pub fn common_source(&self) -> String {
        let split: Vec<Vec<&str>> = self.sources.iter().map(|s| s.split('/').collect()).collect();
        let Some(first) = split.first() else {
            return ".".to_string();
        };

        let diverge = (0..first.len()).find(|&i| {
            split[1..]
                .iter()
                .any(|other| other.get(i) != Some(&first[i]))
        });

        let common = match diverge {
            Some(i) => &first[..i],
            None => &first[..first.len() - 1],
        };

        match common {
            [] => ".".to_string(),
            [""] => "/".to_string(),
            segments => segments.join("/"),
        }
    }

    fn base_args(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.program_args.len() + 12);
        argv.push(self.program.clone());
        argv.extend(self.program_args.iter().cloned());
        argv
    }

    /// Full argument vector of the dry-run listing pass.
    pub fn listing_args(&self) -> Vec<String> {
        let mut argv = self.base_args();
        argv.extend(self.sources.iter().cloned());
        argv.push(self.destination.clone());
        argv.extend(self.options.iter().cloned());
        argv.extend(LISTING_FLAGS.iter().map(|f| f.to_string()));
        argv
    }

    /// Full argument vector of one transfer job.
    pub fn transfer_args(&self) -> Vec<String> {
        let mut argv = self.base_args();
        argv.extend(self.options.iter().cloned());
        argv.extend(TRANSFER_FLAGS.iter().map(|f| f.to_string()));
        argv.push(self.common_source());
        argv.push(self.destination.clone());
        argv
    }

    pub fn listing_command_line(&self) -> String {
        self.listing_args().join(" ")
    }

    pub fn transfer_command_line(&self) -> String {
        self.transfer_args().join(" ")
    }

    /// Run the dry-run listing and collect the manifest.
    ///
    /// Progress lines go to `on_progress`, stderr lines to `on_error`.
    pub async fn run_listing<P, E>(
        &self,
        mut on_progress: P,
        mut on_error: E,
        cancel: &CancellationToken,
    ) -> Result<Vec<ManifestEntry>>
    where
        P: FnMut(ProgressSample),
        E: FnMut(String),
    {
        let mut child = spawn(&self.listing_args(), false)?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        let decoder = LineDecoder::listing();
        let mut entries = Vec::new();

        let io = async {
            let (out, err) = tokio::join!(
                read_lines(stdout, |line| match decoder.decode(&line) {
                    DecodedLine::Progress(sample) => on_progress(sample),
                    DecodedLine::Filename(name) => {
                        if let Some(entry) = ManifestEntry::from_listing_line(&name) {
                            entries.push(entry);
                        }
                    }
                    DecodedLine::Ignored => {}
                }),
                read_lines(stderr, |line| on_error(lossy(&line))),
            );
            out.and(err)
        };

        let exit_code = wait_for_exit(&mut child, io, cancel).await?;
        if exit_code != 0 {
            return Err(SyncError::ListingFailed { exit_code });
        }

        debug!("Listing finished with {} entries", entries.len());
        Ok(entries)
    }

    /// Transfer `batch`, feeding its paths over stdin.
    ///
    /// Every decoded stdout line goes to `on_line`, stderr lines to `on_error`.
    pub async fn run_transfer<L, E>(
        &self,
        batch: &[ManifestEntry],
        mut on_line: L,
        mut on_error: E,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        L: FnMut(DecodedLine),
        E: FnMut(String),
    {
        let mut child = spawn(&self.transfer_args(), true)?;
        let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        let decoder = LineDecoder::transfer();

        let io = async {
            let (fed, out, err) = tokio::join!(
                feed_paths(stdin, batch),
                read_lines(stdout, |line| on_line(decoder.decode(&line))),
                read_lines(stderr, |line| on_error(lossy(&line))),
            );
            fed.and(out).and(err)
        };

        let exit_code = wait_for_exit(&mut child, io, cancel).await?;
        if exit_code != 0 {
            return Err(SyncError::TransferFailed { exit_code });
        }

        Ok(())
    }
}

fn lossy(line: &[u8]) -> String {
    String::from_utf8_lossy(line).into_owned()
}

fn missing_pipe(name: &str) -> SyncError {
    SyncError::Io(io::Error::other(format!("child {name} was not captured")))
}

fn spawn(argv: &[String], with_stdin: bool) -> Result<Child> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| SyncError::InvalidArguments("empty command line".to_string()))?;

    debug!("Spawning: {}", argv.join(" "));

    Command::new(program)
        .args(args)
        .stdin(if with_stdin { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| SyncError::Spawn {
            program: program.clone(),
            source,
        })
}

/// Write one path per line, then close stdin so rsync sees the end of the list.
async fn feed_paths(mut stdin: ChildStdin, batch: &[ManifestEntry]) -> io::Result<()> {
    for entry in batch {
        let mut line = Vec::with_capacity(entry.path.len() + 1);
        line.extend_from_slice(&entry.path);
        line.push(b'\n');

        match stdin.write_all(&line).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                debug!("rsync closed its input early");
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    }

    match stdin.shutdown().await {
        Err(e) if e.kind() != io::ErrorKind::BrokenPipe => Err(e),
        _ => Ok(()),
    }
}

async fn read_lines<R, F>(reader: R, mut on_line: F) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(Bytes),
{
    let mut lines = FramedRead::new(reader, ProgressLineCodec::new());
    while let Some(line) = lines.next().await {
        on_line(line?);
    }
    Ok(())
}

/// Drain the child's pipes, then reap it. Cancellation terminates the child.
async fn wait_for_exit<F>(child: &mut Child, io: F, cancel: &CancellationToken) -> Result<i32>
where
    F: Future<Output = io::Result<()>>,
{
    tokio::select! {
        result = io => result?,
        _ = cancel.cancelled() => {
            terminate(child).await;
            return Err(SyncError::Interrupted);
        }
    }

    let status = child.wait().await?;
    debug!("rsync exited with {}", status);
    Ok(status.code().unwrap_or(-1))
}

async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            debug!("Failed to send SIGTERM to {}: {}", pid, e);
        }
    }

    if tokio::time::timeout(TERMINATE_GRACE, child.wait()).await.is_err() {
        warn!("rsync ignored SIGTERM, killing it");
        if let Err(e) = child.kill().await {
            warn!("Failed to kill rsync: {}", e);
        }
    }
}
