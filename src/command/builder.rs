//! ffmpeg command construction.
//!
//! This module provides a builder for turning stream parameters into the
//! exact argument vector handed to ffmpeg. The source is classified as
//! either an RTSP network stream or an existing local file; anything else
//! is rejected before a process is ever spawned.

use std::path::{Path, PathBuf};

use url::Url;

/// Default transcoding binary.
pub const FFMPEG_BIN: &str = "ffmpeg";

/// Error type for command construction.
#[derive(thiserror::Error, Debug)]
pub enum CommandError {
    /// The source is neither an RTSP URI nor an existing local file.
    #[error("Source is neither an rtsp:// URI nor an existing file: {0}")]
    SourceUnresolved(String),
}

/// Kind of input source feeding the transcoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A network stream with an `rtsp` scheme.
    Rtsp,
    /// A file present on the local filesystem.
    LocalFile,
}

/// Classify a source string as an RTSP URI or a local file.
///
/// The scheme comparison is case-insensitive; the file check requires the
/// path to exist at classification time.
///
/// # Errors
///
/// Returns [`CommandError::SourceUnresolved`] if neither applies.
pub fn classify_source(source: &str) -> Result<SourceKind, CommandError> {
    if let Ok(uri) = Url::parse(source) {
        if uri.scheme().eq_ignore_ascii_case("rtsp") {
            return Ok(SourceKind::Rtsp);
        }
    }
    if Path::new(source).exists() {
        return Ok(SourceKind::LocalFile);
    }
    Err(CommandError::SourceUnresolved(source.to_string()))
}

/// A fully built process invocation: program plus argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeCommand {
    program: String,
    args: Vec<String>,
}

impl TranscodeCommand {
    /// Create a command from an explicit program and argument list.
    ///
    /// Mostly useful for tests and for callers that want to supervise a
    /// custom invocation instead of the built ffmpeg one.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// The program to execute.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The argument vector.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Builder for the ffmpeg argument vector of one stream.
#[derive(Debug, Clone)]
pub struct TranscodeCommandBuilder {
    source: String,
    output_dir: PathBuf,
    audio: bool,
    keep_files: bool,
}

impl TranscodeCommandBuilder {
    /// Create a builder for the given source and output directory.
    ///
    /// Audio is enabled and file retention disabled by default.
    #[must_use]
    pub fn new(source: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            output_dir: output_dir.into(),
            audio: true,
            keep_files: false,
        }
    }

    /// Enable or disable the audio track.
    #[must_use]
    pub fn audio(mut self, audio: bool) -> Self {
        self.audio = audio;
        self
    }

    /// Keep already-served segments instead of deleting them.
    #[must_use]
    pub fn keep_files(mut self, keep: bool) -> Self {
        self.keep_files = keep;
        self
    }

    /// Segment-list handling: append only when retaining files, otherwise
    /// delete old segments as the window advances.
    fn hls_flags(&self) -> &'static str {
        if self.keep_files {
            "append_list"
        } else {
            "delete_segments+append_list"
        }
    }

    /// Build the ffmpeg invocation.
    ///
    /// Both source kinds share the same argument tail; classification only
    /// validates the input before anything is spawned.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::SourceUnresolved`] if the source cannot be
    /// classified.
    pub fn build(&self) -> Result<TranscodeCommand, CommandError> {
        classify_source(&self.source)?;

        let segment_pattern = self.output_dir.join("%d.ts").display().to_string();
        let playlist = self.output_dir.join("index.m3u8").display().to_string();

        let mut args: Vec<String> = [
            "-y",
            "-fflags",
            "nobuffer",
            "-rtsp_transport",
            "tcp",
            "-i",
            self.source.as_str(),
            "-vsync",
            "0",
            "-copyts",
            "-vcodec",
            "copy",
            "-movflags",
            "frag_keyframe+empty_moov",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        if !self.audio {
            args.push("-an".to_string());
        }

        args.extend(
            [
                "-hls_flags",
                self.hls_flags(),
                "-f",
                "hls",
                "-segment_list_flags",
                "live",
                "-hls_time",
                "1",
                "-hls_list_size",
                "3",
                "-hls_segment_filename",
                segment_pattern.as_str(),
                playlist.as_str(),
            ]
            .into_iter()
            .map(String::from),
        );

        Ok(TranscodeCommand {
            program: FFMPEG_BIN.to_string(),
            args,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rtsp_uri() {
        let kind = classify_source("rtsp://camera.local:554/stream").unwrap();
        assert_eq!(kind, SourceKind::Rtsp);
    }

    #[test]
    fn test_classify_rtsp_uppercase_scheme() {
        let kind = classify_source("RTSP://camera.local/stream").unwrap();
        assert_eq!(kind, SourceKind::Rtsp);
    }

    #[test]
    fn test_classify_existing_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let kind = classify_source(file.path().to_str().unwrap()).unwrap();
        assert_eq!(kind, SourceKind::LocalFile);
    }

    #[test]
    fn test_classify_unresolved() {
        let err = classify_source("/definitely/not/a/real/file.mp4").unwrap_err();
        assert!(matches!(err, CommandError::SourceUnresolved(_)));
        assert!(err.to_string().contains("/definitely/not/a/real/file.mp4"));
    }

    #[test]
    fn test_hls_flags_keep_files() {
        let builder = TranscodeCommandBuilder::new("rtsp://cam/1", "/tmp/out").keep_files(true);
        assert_eq!(builder.hls_flags(), "append_list");
    }

    #[test]
    fn test_hls_flags_delete_segments() {
        let builder = TranscodeCommandBuilder::new("rtsp://cam/1", "/tmp/out");
        assert_eq!(builder.hls_flags(), "delete_segments+append_list");
    }

    #[test]
    fn test_build_places_playlist_last() {
        let command = TranscodeCommandBuilder::new("rtsp://cam/1", "/tmp/out")
            .build()
            .unwrap();
        assert_eq!(command.program(), FFMPEG_BIN);
        assert_eq!(command.args().last().unwrap(), "/tmp/out/index.m3u8");
    }
}
