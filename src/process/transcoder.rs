//! Transcoder subprocess supervision.
//!
//! Spawns the built ffmpeg invocation with the output directory in place
//! and the log sink attached to both stdio streams, and exposes control
//! methods for the running process.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

use crate::command::TranscodeCommand;
use crate::logging::LogSink;

/// Error type for process spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The transcoder binary was not found.
    #[error("Transcoder binary not found")]
    NotFound,
    /// Permission denied when spawning.
    #[error("Permission denied spawning transcoder")]
    PermissionDenied,
    /// The output directory could not be created.
    #[error("Failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    fn from_io(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound,
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => Self::Io(err),
        }
    }
}

/// Snapshot of how a subprocess ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    /// Exit code, when the process exited on its own.
    pub code: Option<i32>,
    /// Terminating signal, when the process was killed (unix only).
    pub signal: Option<i32>,
}

impl ExitInfo {
    /// Whether the process exited with status zero.
    #[must_use]
    pub fn success(self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ExitInfo {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "terminated by signal {signal}"),
            (None, None) => write!(f, "unknown exit status"),
        }
    }
}

/// A running transcoder subprocess.
#[derive(Debug)]
pub struct TranscoderProcess {
    child: Child,
}

impl TranscoderProcess {
    /// Spawn the transcoder for one stream.
    ///
    /// Creates `output_dir` (and parents) if absent, then launches the
    /// command. When the sink is enabled, both stdout and stderr are
    /// piped into it through background forwarding tasks; otherwise all
    /// stdio is detached.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the directory cannot be created or the
    /// process fails to launch. No subprocess exists on error.
    pub fn spawn(
        command: &TranscodeCommand,
        output_dir: &Path,
        sink: Option<&LogSink>,
    ) -> Result<Self, SpawnError> {
        std::fs::create_dir_all(output_dir).map_err(|source| SpawnError::OutputDir {
            path: output_dir.to_path_buf(),
            source,
        })?;

        let capture = sink.is_some_and(LogSink::is_enabled);

        let mut cmd = Command::new(command.program());
        cmd.args(command.args()).stdin(Stdio::null());
        if capture {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let mut child = cmd.spawn().map_err(SpawnError::from_io)?;

        if let Some(sink) = sink.filter(|s| s.is_enabled()) {
            if let Some(stdout) = child.stdout.take() {
                forward_output(stdout, sink.clone());
            }
            if let Some(stderr) = child.stderr.take() {
                forward_output(stderr, sink.clone());
            }
        }

        Ok(Self { child })
    }

    /// Get the process ID, if still running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Check if the process has exited without blocking.
    ///
    /// # Errors
    ///
    /// Returns an error if the process state cannot be queried.
    pub fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Wait for the process to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Forcefully kill the process.
    ///
    /// # Errors
    ///
    /// Returns an error if the kill signal cannot be sent.
    pub async fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }

    /// Attempt graceful termination with a timeout.
    ///
    /// On Unix, sends SIGTERM first, then SIGKILL after the timeout.
    /// On other platforms, falls back to immediate kill. The process has
    /// fully exited when this returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns an error if termination fails.
    pub async fn graceful_terminate(&mut self, timeout: Duration) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            self.graceful_terminate_unix(timeout).await
        }

        #[cfg(not(unix))]
        {
            let _ = timeout;
            self.kill().await
        }
    }

    #[cfg(unix)]
    async fn graceful_terminate_unix(&mut self, timeout: Duration) -> std::io::Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.id() else {
            // Already exited.
            return Ok(());
        };

        let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
        let _ = kill(nix_pid, Signal::SIGTERM);

        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                tracing::debug!(pid, "Transcoder ignored SIGTERM, killing");
                self.child.kill().await
            }
        }
    }
}

/// Copy one stdio stream into the shared sink until it closes.
fn forward_output<R>(reader: R, sink: LogSink)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = reader;
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if let Err(e) = sink.write(&buf[..n]).await {
                        tracing::warn!(error = %e, "Failed to write transcoder log");
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Transcoder output stream closed");
                    break;
                }
            }
        }
    });
}
