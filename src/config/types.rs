//! Configuration types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Options for capturing transcoder process output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessLoggingConfig {
    /// Whether transcoder output is captured at all.
    pub enabled: bool,
    /// Directory where log files are written.
    pub directory: PathBuf,
    /// Rotate the current log once it reaches this many megabytes.
    pub max_size_mb: u64,
    /// Rotated files beyond this count are purged, oldest first.
    pub max_backups: usize,
    /// Rotated files older than this many days are purged (0 = keep forever).
    pub max_age_days: u64,
    /// Gzip rotated-out files.
    pub compress: bool,
}

impl Default for ProcessLoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: PathBuf::from("logs"),
            max_size_mb: 500,
            max_backups: 3,
            max_age_days: 0,
            compress: true,
        }
    }
}

/// Defaults applied to newly started streams.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamDefaults {
    /// Seconds to wait for a stream to start serving before declaring failure.
    pub startup_timeout_secs: u64,
    /// Keep segment files after a stream stops.
    pub keep_files: bool,
    /// Carry the audio track.
    pub audio: bool,
}

impl Default for StreamDefaults {
    fn default() -> Self {
        Self {
            startup_timeout_secs: 25,
            keep_files: false,
            audio: true,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamerConfig {
    /// Per-stream defaults.
    pub stream: StreamDefaults,
    /// Transcoder output capture.
    pub logging: ProcessLoggingConfig,
}
