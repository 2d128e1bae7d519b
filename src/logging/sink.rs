//! Rotating log sink for transcoder output.
//!
//! Each supervised stream gets one log file under the configured
//! directory. When the file exceeds the size limit it is renamed with a
//! timestamp suffix (e.g. `stream.log.20250101-120000.123`), optionally
//! gzipped, and old rotated files are purged by count and age.
//!
//! A disabled sink discards writes without touching the filesystem.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::sync::Mutex;

use crate::config::ProcessLoggingConfig;

/// Size-rotated append-only log file.
#[derive(Debug)]
pub struct RotatingFileSink {
    /// `None` when logging is disabled; writes are then discarded.
    path: Option<PathBuf>,
    file: Option<File>,
    written: u64,
    max_bytes: u64,
    max_backups: usize,
    max_age: Option<Duration>,
    compress: bool,
}

impl RotatingFileSink {
    /// Open the sink for a stream named `name` under the configured
    /// directory.
    ///
    /// With `enabled = false` in the config this returns a discarding
    /// sink and creates nothing on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the log directory or file cannot be created.
    pub fn open(name: &str, config: &ProcessLoggingConfig) -> io::Result<Self> {
        if !config.enabled {
            return Ok(Self {
                path: None,
                file: None,
                written: 0,
                max_bytes: 0,
                max_backups: 0,
                max_age: None,
                compress: false,
            });
        }

        fs::create_dir_all(&config.directory)?;
        let path = config.directory.join(format!("{name}.log"));

        let mut sink = Self {
            path: Some(path),
            file: None,
            written: 0,
            max_bytes: config.max_size_mb.saturating_mul(1024 * 1024),
            max_backups: config.max_backups,
            max_age: (config.max_age_days > 0)
                .then(|| Duration::from_secs(config.max_age_days * 24 * 60 * 60)),
            compress: config.compress,
        };
        sink.open_current()?;
        Ok(sink)
    }

    /// Whether this sink actually writes anywhere.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    /// Path of the current log file, when enabled.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Open the current log file in append mode, carrying over its size.
    fn open_current(&mut self) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        self.written = file.metadata()?.len();
        self.file = Some(file);
        Ok(())
    }

    /// Rename the current file aside, compress and purge backups, then
    /// start a fresh file.
    fn rotate(&mut self) -> io::Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };

        // Close before renaming.
        self.file = None;

        let timestamp = Utc::now().format("%Y%m%d-%H%M%S%.3f");
        let rotated_name = format!(
            "{}.{timestamp}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );
        let rotated = path.with_file_name(rotated_name);
        fs::rename(&path, &rotated)?;

        tracing::info!(
            log = %path.display(),
            rotated_to = %rotated.display(),
            "Rotated transcoder log"
        );

        if self.compress {
            if let Err(e) = compress_rotated(&rotated) {
                tracing::warn!(
                    path = %rotated.display(),
                    error = %e,
                    "Failed to compress rotated log"
                );
            }
        }

        self.purge_backups(&path);
        self.open_current()
    }

    /// Delete rotated files beyond the backup count or older than the
    /// age limit.
    fn purge_backups(&self, path: &Path) {
        let log_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let prefix = format!(
            "{}.",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        let mut rotated: Vec<(PathBuf, SystemTime)> = Vec::new();
        if let Ok(entries) = fs::read_dir(log_dir) {
            for entry in entries.flatten() {
                let candidate = entry.path();
                let name = candidate
                    .file_name()
                    .unwrap_or_default()
                    .to_string_lossy()
                    .into_owned();
                if name.starts_with(&prefix) && candidate != path {
                    if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
                        rotated.push((candidate, modified));
                    }
                }
            }
        }

        // Newest first.
        rotated.sort_by(|a, b| b.1.cmp(&a.1));

        let now = SystemTime::now();
        for (index, (candidate, modified)) in rotated.iter().enumerate() {
            let too_many = index >= self.max_backups;
            let too_old = self.max_age.is_some_and(|max_age| {
                now.duration_since(*modified)
                    .map_or(false, |age| age > max_age)
            });
            if !too_many && !too_old {
                continue;
            }
            if let Err(e) = fs::remove_file(candidate) {
                tracing::warn!(
                    path = %candidate.display(),
                    error = %e,
                    "Failed to delete old rotated log"
                );
            } else {
                tracing::debug!(path = %candidate.display(), "Deleted old rotated log");
            }
        }
    }
}

impl Write for RotatingFileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.path.is_none() {
            // Disabled: discard without error.
            return Ok(buf.len());
        }
        if self.written + buf.len() as u64 > self.max_bytes && self.written > 0 {
            self.rotate()?;
        }
        let Some(file) = self.file.as_mut() else {
            return Ok(buf.len());
        };
        let n = file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// Gzip a rotated log in place, removing the uncompressed original.
fn compress_rotated(path: &Path) -> io::Result<()> {
    let mut gz_name = path.as_os_str().to_os_string();
    gz_name.push(".gz");
    let gz_path = PathBuf::from(gz_name);

    let mut input = File::open(path)?;
    let mut encoder = GzEncoder::new(File::create(&gz_path)?, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.flush()?;
    fs::remove_file(path)
}

/// Shared handle to a [`RotatingFileSink`].
///
/// Clones share one mutex-guarded writer, so the same sink can safely
/// take a subprocess's stdout and stderr at the same time.
#[derive(Debug, Clone)]
pub struct LogSink {
    inner: Arc<Mutex<RotatingFileSink>>,
    enabled: bool,
}

impl LogSink {
    /// Open a shareable sink for a stream named `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying file cannot be opened.
    pub fn open(name: &str, config: &ProcessLoggingConfig) -> io::Result<Self> {
        let sink = RotatingFileSink::open(name, config)?;
        Ok(Self {
            enabled: sink.is_enabled(),
            inner: Arc::new(Mutex::new(sink)),
        })
    }

    /// Whether writes reach a file at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Append raw subprocess output.
    ///
    /// # Errors
    ///
    /// Returns an error if the write or a triggered rotation fails.
    pub async fn write(&self, buf: &[u8]) -> io::Result<()> {
        self.inner.lock().await.write_all(buf)
    }
}
