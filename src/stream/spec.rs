//! Stream description.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::ProcessLoggingConfig;

/// Immutable description of one stream to supervise.
///
/// Built once per start request and owned by the lifecycle for the
/// stream's lifetime.
#[derive(Debug, Clone)]
pub struct StreamSpec {
    pub(crate) source: String,
    pub(crate) output_dir: PathBuf,
    pub(crate) keep_files: bool,
    pub(crate) audio: bool,
    pub(crate) startup_timeout: Duration,
    pub(crate) logging: ProcessLoggingConfig,
}

impl StreamSpec {
    /// Default startup window before a stream start is declared failed.
    pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(25);

    /// Create a spec for the given source and output directory.
    ///
    /// Audio is enabled, retention disabled, logging disabled, and the
    /// startup window set to [`Self::DEFAULT_STARTUP_TIMEOUT`].
    #[must_use]
    pub fn new(source: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            output_dir: output_dir.into(),
            keep_files: false,
            audio: true,
            startup_timeout: Self::DEFAULT_STARTUP_TIMEOUT,
            logging: ProcessLoggingConfig::default(),
        }
    }

    /// Keep output files after the stream stops.
    #[must_use]
    pub fn keep_files(mut self, keep: bool) -> Self {
        self.keep_files = keep;
        self
    }

    /// Enable or disable the audio track.
    #[must_use]
    pub fn audio(mut self, audio: bool) -> Self {
        self.audio = audio;
        self
    }

    /// Set the startup window.
    #[must_use]
    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Set the transcoder output logging options.
    #[must_use]
    pub fn logging(mut self, logging: ProcessLoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// The source URI or file path.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The HLS output directory.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}
