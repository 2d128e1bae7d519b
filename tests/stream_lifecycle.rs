//! Tests for stream startup, supervision, and retention.
//!
//! These drive the full lifecycle against real subprocesses: `sh`
//! scripts stand in for ffmpeg, writing (or withholding) the playlist
//! the readiness probe watches for.

use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;

use streamer::command::TranscodeCommand;
use streamer::stream::{
    self, StartError, StreamManager, StreamOutcome, StreamSpec, StreamState,
};

fn sh(script: &str) -> TranscodeCommand {
    TranscodeCommand::new("sh", vec!["-c".to_string(), script.to_string()])
}

/// A transcoder stand-in that starts serving immediately and then idles.
fn serving(dir: &Path) -> TranscodeCommand {
    sh(&format!(
        "echo '#EXTM3U' > {}/index.m3u8; sleep 30",
        dir.display()
    ))
}

fn spec_for(dir: &Path) -> StreamSpec {
    StreamSpec::new("rtsp://camera.local/stream", dir).startup_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn ready_stream_returns_running_handle() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("hls");

    let handle = stream::start_with_command(spec_for(&out), serving(&out))
        .await
        .unwrap();

    assert_eq!(handle.state(), StreamState::Running);
    assert_eq!(handle.output_dir(), out);
    assert!(out.join("index.m3u8").exists());

    let result = handle.stop().await;
    assert_eq!(result.outcome, StreamOutcome::Stopped);
}

#[tokio::test]
async fn startup_timeout_when_no_playlist_appears() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("hls");

    let spec = spec_for(&out).startup_timeout(Duration::from_millis(300));
    let err = stream::start_with_command(spec, sh("sleep 30")).await.unwrap_err();

    assert!(matches!(err, StartError::StartupTimeout { .. }));
    // Retention ran after the terminated process exited.
    assert!(!out.exists());
}

#[tokio::test]
async fn startup_crash_carries_exit_info() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("hls");

    let err = stream::start_with_command(spec_for(&out), sh("exit 3"))
        .await
        .unwrap_err();

    match err {
        StartError::StartupCrash { exit } => assert_eq!(exit.code, Some(3)),
        other => panic!("Expected StartupCrash, got {other:?}"),
    }
}

#[tokio::test]
async fn startup_crash_beats_remaining_deadline() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("hls");

    let spec = spec_for(&out).startup_timeout(Duration::from_secs(30));
    let started = std::time::Instant::now();
    let err = stream::start_with_command(spec, sh("exit 1")).await.unwrap_err();

    assert!(matches!(err, StartError::StartupCrash { .. }));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn stop_yields_stopped_not_crashed() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("hls");

    let handle = stream::start_with_command(spec_for(&out), serving(&out))
        .await
        .unwrap();

    // Stopping kills the stand-in via SIGTERM, but an explicit stop is
    // still a clean shutdown.
    let result = handle.stop().await;
    assert_eq!(result.outcome, StreamOutcome::Stopped);
    assert_eq!(handle.state(), StreamState::Stopped);
}

#[tokio::test]
async fn clean_exit_yields_stopped() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("hls");

    let command = sh(&format!("echo '#EXTM3U' > {}/index.m3u8; exit 0", out.display()));
    let handle = stream::start_with_command(spec_for(&out), command)
        .await
        .unwrap();

    let result = handle.wait().await;
    assert_eq!(result.outcome, StreamOutcome::Stopped);
}

#[tokio::test]
async fn runtime_crash_reported_through_wait() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("hls");

    let command = sh(&format!(
        "echo '#EXTM3U' > {}/index.m3u8; sleep 0.2; exit 2",
        out.display()
    ));
    let handle = stream::start_with_command(spec_for(&out), command)
        .await
        .unwrap();

    let result = handle.wait().await;
    match result.outcome {
        StreamOutcome::Crashed(exit) => assert_eq!(exit.code, Some(2)),
        StreamOutcome::Stopped => panic!("Expected a crash"),
    }
    assert_eq!(handle.state(), StreamState::Crashed);
}

#[tokio::test]
async fn retention_removes_output_directory() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("hls");

    let command = sh(&format!(
        "echo '#EXTM3U' > {dir}/index.m3u8; echo seg > {dir}/0.ts; sleep 30",
        dir = out.display()
    ));
    let handle = stream::start_with_command(spec_for(&out), command)
        .await
        .unwrap();

    let result = handle.stop().await;
    assert_eq!(result.outcome, StreamOutcome::Stopped);
    assert!(result.cleanup_warning.is_none());
    assert!(!out.exists());
}

#[tokio::test]
async fn keep_files_preserves_output() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("hls");

    let command = sh(&format!(
        "echo '#EXTM3U' > {dir}/index.m3u8; echo seg > {dir}/0.ts; sleep 30",
        dir = out.display()
    ));
    let handle = stream::start_with_command(spec_for(&out).keep_files(true), command)
        .await
        .unwrap();

    handle.stop().await;
    assert!(out.join("index.m3u8").exists());
    assert!(out.join("0.ts").exists());
}

#[tokio::test]
async fn handle_clones_observe_same_result() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("hls");

    let handle = stream::start_with_command(spec_for(&out), serving(&out))
        .await
        .unwrap();
    let observer = handle.clone();
    assert_eq!(observer.id(), handle.id());

    handle.stop().await;
    let seen = observer.wait().await;
    assert_eq!(seen.outcome, StreamOutcome::Stopped);
}

#[tokio::test]
async fn every_start_mints_a_fresh_id() {
    let temp = TempDir::new().unwrap();
    let out_a = temp.path().join("a");
    let out_b = temp.path().join("b");

    let a = stream::start_with_command(spec_for(&out_a), serving(&out_a))
        .await
        .unwrap();
    let b = stream::start_with_command(spec_for(&out_b), serving(&out_b))
        .await
        .unwrap();

    assert_ne!(a.id(), b.id());
    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn concurrent_streams_are_independent() {
    let temp = TempDir::new().unwrap();
    let out_a = temp.path().join("a");
    let out_b = temp.path().join("b");

    let (a, b) = tokio::join!(
        stream::start_with_command(spec_for(&out_a), serving(&out_a)),
        stream::start_with_command(spec_for(&out_b), serving(&out_b)),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    let result = a.stop().await;
    assert_eq!(result.outcome, StreamOutcome::Stopped);
    assert!(!out_a.exists());

    // The second stream neither terminated nor lost its artifacts.
    assert_eq!(b.state(), StreamState::Running);
    assert!(out_b.join("index.m3u8").exists());

    b.stop().await;
}

#[tokio::test]
async fn manager_tracks_and_stops_streams() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("hls");
    let manager = StreamManager::new();

    let handle = manager
        .start_with_command(spec_for(&out), serving(&out))
        .await
        .unwrap();

    let snapshot = manager.snapshot().await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].id, handle.id());
    assert_eq!(snapshot[0].state, StreamState::Running);

    let result = manager.stop(handle.id()).await.unwrap();
    assert_eq!(result.outcome, StreamOutcome::Stopped);
    assert!(manager.is_empty().await);
}

#[tokio::test]
async fn manager_stop_all_drains_registry() {
    let temp = TempDir::new().unwrap();
    let out_a = temp.path().join("a");
    let out_b = temp.path().join("b");
    let manager = StreamManager::new();

    manager
        .start_with_command(spec_for(&out_a), serving(&out_a))
        .await
        .unwrap();
    manager
        .start_with_command(spec_for(&out_b), serving(&out_b))
        .await
        .unwrap();

    assert_eq!(manager.stop_all().await, 2);
    assert!(manager.is_empty().await);
}
