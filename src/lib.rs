//! Streamer - supervised RTSP to HLS transcoding.
//!
//! Spawns one ffmpeg process per stream, watches it reach its serving
//! state within a bounded startup window, and cleans up after it.

pub mod command;
pub mod config;
pub mod display;
pub mod logging;
pub mod process;
pub mod stream;
