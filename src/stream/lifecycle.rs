//! Stream startup and supervision.
//!
//! [`start`] spawns the transcoder and runs the startup phase: the
//! readiness probe (a non-empty playlist in the output directory) races
//! the startup deadline and the process's own exit, and the first signal
//! decides whether the caller gets a handle or an error. After that a
//! background task owns the process, forwards its exit to the handle,
//! and applies the retention policy once the exit has been observed.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::command::{CommandError, TranscodeCommand, TranscodeCommandBuilder};
use crate::logging::LogSink;
use crate::process::{ExitInfo, SpawnError, TranscoderProcess};

use super::state::StateMachine;
use super::{StreamSpec, StreamState};

/// Name of the HLS index artifact whose appearance signals readiness.
pub const PLAYLIST_NAME: &str = "index.m3u8";

/// Interval between readiness probes of the output directory.
const PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// Grace period between SIGTERM and SIGKILL when terminating.
const TERMINATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Error type for stream start failures.
///
/// Every variant is terminal for the attempted stream. The caller never
/// receives a handle unless the stream reached its serving state.
#[derive(thiserror::Error, Debug)]
pub enum StartError {
    /// The source could not be classified; no process was attempted.
    #[error(transparent)]
    Source(#[from] CommandError),
    /// OS-level launch failure.
    #[error("Failed to spawn transcoder: {0}")]
    Spawn(#[from] SpawnError),
    /// No playlist appeared within the startup window.
    #[error("Transcoder produced no playlist within {timeout:?}")]
    StartupTimeout { timeout: Duration },
    /// The transcoder exited before producing a playlist.
    #[error("Transcoder exited during startup: {exit}")]
    StartupCrash { exit: ExitInfo },
}

/// How a running stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Clean exit, or termination explicitly requested through the handle.
    Stopped,
    /// The transcoder died without a stop request.
    Crashed(ExitInfo),
}

/// Final report delivered through [`StreamHandle::wait`].
#[derive(Debug, Clone)]
pub struct TerminationResult {
    /// How the stream ended.
    pub outcome: StreamOutcome,
    /// Retention cleanup failure, if any. Secondary; never masks the
    /// outcome.
    pub cleanup_warning: Option<String>,
}

/// Shareable handle to a supervised stream.
///
/// Clones refer to the same stream; all of them observe the same
/// termination result. The handle stays valid until the process has
/// exited and cleanup has run.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    id: Uuid,
    output_dir: PathBuf,
    cancel: CancellationToken,
    state: watch::Receiver<StreamState>,
    done: watch::Receiver<Option<TerminationResult>>,
}

impl StreamHandle {
    /// Unique identifier of this stream. Fresh for every start.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The HLS output directory.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Snapshot of the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Wait until the stream reaches a terminal state.
    pub async fn wait(&self) -> TerminationResult {
        let mut done = self.done.clone();
        loop {
            if let Some(result) = done.borrow_and_update().clone() {
                return result;
            }
            if done.changed().await.is_err() {
                // Supervision task gone without publishing a result.
                tracing::warn!(stream = %self.id, "Supervision task dropped its result channel");
                return TerminationResult {
                    outcome: StreamOutcome::Stopped,
                    cleanup_warning: None,
                };
            }
        }
    }

    /// Request termination and wait for the final result.
    ///
    /// An explicit stop always resolves to [`StreamOutcome::Stopped`],
    /// even though the transcoder is usually brought down by a signal.
    pub async fn stop(&self) -> TerminationResult {
        self.cancel.cancel();
        self.wait().await
    }
}

/// Start supervising the stream described by `spec`.
///
/// Builds the ffmpeg invocation from the spec and runs the startup
/// phase. On success the stream is serving and the returned handle can
/// be waited on or stopped.
///
/// # Errors
///
/// Returns [`StartError`] when the source cannot be resolved, the
/// process cannot be spawned, the startup window elapses, or the
/// transcoder dies before producing a playlist. In the latter two cases
/// the process has been terminated and the retention policy applied.
pub async fn start(spec: StreamSpec) -> Result<StreamHandle, StartError> {
    let command = TranscodeCommandBuilder::new(spec.source(), spec.output_dir())
        .audio(spec.audio)
        .keep_files(spec.keep_files)
        .build()?;
    start_with_command(spec, command).await
}

/// Start supervising a custom invocation.
///
/// Same lifecycle as [`start`] but with a caller-supplied command
/// instead of the built ffmpeg one (useful for tests and for wrapping
/// the transcoder in another binary).
///
/// # Errors
///
/// See [`start`]; source classification is skipped.
pub async fn start_with_command(
    spec: StreamSpec,
    command: TranscodeCommand,
) -> Result<StreamHandle, StartError> {
    let id = Uuid::new_v4();
    let (machine, state_rx) = StateMachine::new();

    let sink = LogSink::open(&id.to_string(), &spec.logging).map_err(SpawnError::from)?;

    let mut process = match TranscoderProcess::spawn(&command, spec.output_dir(), Some(&sink)) {
        Ok(process) => process,
        Err(err) => {
            machine.transition(StreamState::StartupFailed);
            apply_retention(&spec).await;
            return Err(err.into());
        }
    };

    tracing::info!(
        stream = %id,
        source = %spec.source(),
        pid = ?process.id(),
        "Spawned transcoder"
    );

    let playlist = spec.output_dir().join(PLAYLIST_NAME);
    let deadline = tokio::time::sleep(spec.startup_timeout);
    tokio::pin!(deadline);

    enum StartupEvent {
        Ready,
        Exited(std::io::Result<ExitStatus>),
        DeadlineElapsed,
    }

    let event = tokio::select! {
        biased;

        status = process.wait() => StartupEvent::Exited(status),
        () = wait_for_playlist(&playlist) => StartupEvent::Ready,
        () = &mut deadline => StartupEvent::DeadlineElapsed,
    };

    match event {
        StartupEvent::Ready => {}
        StartupEvent::Exited(status) => {
            let exit = exit_info(status);
            tracing::warn!(stream = %id, %exit, "Transcoder died before serving");
            machine.transition(StreamState::StartupFailed);
            apply_retention(&spec).await;
            return Err(StartError::StartupCrash { exit });
        }
        StartupEvent::DeadlineElapsed => {
            tracing::warn!(
                stream = %id,
                timeout = ?spec.startup_timeout,
                "Stream produced no playlist within the startup window"
            );
            if let Err(err) = process.graceful_terminate(TERMINATE_TIMEOUT).await {
                tracing::warn!(stream = %id, error = %err, "Failed to terminate stalled transcoder");
            }
            machine.transition(StreamState::StartupFailed);
            apply_retention(&spec).await;
            return Err(StartError::StartupTimeout {
                timeout: spec.startup_timeout,
            });
        }
    }

    tracing::info!(stream = %id, playlist = %playlist.display(), "Stream is serving");
    machine.transition(StreamState::Ready);
    machine.transition(StreamState::Running);

    let cancel = CancellationToken::new();
    let (done_tx, done_rx) = watch::channel(None);
    let output_dir = spec.output_dir().to_path_buf();
    tokio::spawn(run(id, spec, process, machine, cancel.clone(), done_tx));

    Ok(StreamHandle {
        id,
        output_dir,
        cancel,
        state: state_rx,
        done: done_rx,
    })
}

/// Supervise a serving stream until it terminates, then clean up and
/// publish the result.
async fn run(
    id: Uuid,
    spec: StreamSpec,
    mut process: TranscoderProcess,
    machine: StateMachine,
    cancel: CancellationToken,
    done: watch::Sender<Option<TerminationResult>>,
) {
    enum RunEvent {
        Exited(std::io::Result<ExitStatus>),
        StopRequested,
    }

    let event = tokio::select! {
        biased;

        status = process.wait() => RunEvent::Exited(status),
        () = cancel.cancelled() => RunEvent::StopRequested,
    };

    let outcome = match event {
        RunEvent::Exited(status) => {
            let exit = exit_info(status);
            if exit.success() {
                tracing::info!(stream = %id, "Transcoder exited cleanly");
                StreamOutcome::Stopped
            } else {
                tracing::warn!(stream = %id, %exit, "Transcoder died unexpectedly");
                StreamOutcome::Crashed(exit)
            }
        }
        RunEvent::StopRequested => {
            if let Err(err) = process.graceful_terminate(TERMINATE_TIMEOUT).await {
                tracing::warn!(stream = %id, error = %err, "Failed to terminate transcoder on stop");
            }
            tracing::info!(stream = %id, "Stream stopped on request");
            StreamOutcome::Stopped
        }
    };

    // The exit has been observed above; only now touch the output
    // directory.
    let cleanup_warning = apply_retention(&spec).await;

    machine.transition(match outcome {
        StreamOutcome::Stopped => StreamState::Stopped,
        StreamOutcome::Crashed(_) => StreamState::Crashed,
    });
    done.send_replace(Some(TerminationResult {
        outcome,
        cleanup_warning,
    }));
}

/// Poll until the playlist exists and is non-empty.
async fn wait_for_playlist(path: &Path) {
    let mut interval = tokio::time::interval(PROBE_INTERVAL);
    loop {
        interval.tick().await;
        if let Ok(meta) = tokio::fs::metadata(path).await {
            if meta.len() > 0 {
                return;
            }
        }
    }
}

/// Apply the retention policy after the process has exited.
///
/// Removal failures are logged, never escalated; the returned message is
/// attached to the termination result as a warning.
async fn apply_retention(spec: &StreamSpec) -> Option<String> {
    if spec.keep_files {
        return None;
    }
    match tokio::fs::remove_dir_all(spec.output_dir()).await {
        Ok(()) => None,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => {
            tracing::warn!(
                dir = %spec.output_dir().display(),
                error = %err,
                "Failed to remove stream output directory"
            );
            Some(format!(
                "failed to remove {}: {err}",
                spec.output_dir().display()
            ))
        }
    }
}

/// Collapse a wait result into exit information.
fn exit_info(status: std::io::Result<ExitStatus>) -> ExitInfo {
    match status {
        Ok(status) => status.into(),
        Err(err) => {
            tracing::warn!(error = %err, "Failed to collect transcoder exit status");
            ExitInfo {
                code: None,
                signal: None,
            }
        }
    }
}
