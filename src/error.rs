//! Error types for the `framestitch` crate.
//!
//! This module defines [`StitchError`], the unified error type returned by
//! every fallible operation in the crate. Fatal pipeline failures name the
//! stage that failed (assembly, concatenation, remux) so a caller can report
//! them without extra bookkeeping. Cleanup problems are deliberately absent
//! here: they are non-fatal and surface as
//! [`CleanupWarning`](crate::CleanupWarning) values instead.

use std::{io::Error as IoError, path::PathBuf, process::ExitStatus};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

/// The unified error type for all `framestitch` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StitchError {
    /// A segment could not be produced. The pipeline cannot continue past a
    /// missing segment.
    #[error("Failed to assemble segment {segment}: {reason}")]
    Assembly {
        /// Index of the segment that failed.
        segment: u64,
        /// Underlying reason, usually the external tool's failure.
        reason: String,
    },

    /// The produced segments could not be spliced into one stream.
    #[error("Failed to concatenate segments: {0}")]
    Concatenation(String),

    /// The original audio/subtitle tracks could not be attached to the new
    /// video stream.
    #[error("Failed to remux tracks: {0}")]
    Remux(String),

    /// An external program exited unsuccessfully.
    #[error("{stage}: `{program}` exited with {status}")]
    ExternalTool {
        /// Which pipeline stage launched the program.
        stage: &'static str,
        /// The program that was run.
        program: String,
        /// Its exit status.
        status: ExitStatus,
    },

    /// An external program could not be started at all.
    #[error("{stage}: failed to launch `{program}`: {source}")]
    Launch {
        /// Which pipeline stage launched the program.
        stage: &'static str,
        /// The program that was run.
        program: String,
        /// The spawn error.
        #[source]
        source: IoError,
    },

    /// A command template could not be parsed or rendered.
    #[error("Invalid command template: {0}")]
    Template(String),

    /// The configuration is inconsistent or incomplete.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The on-disk concat manifest disagrees with the segments being recorded.
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// A media file could not be opened.
    #[error("Failed to open media file at {path}: {reason}")]
    FileOpen {
        /// Path of the file.
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The source file does not contain a video stream.
    #[error("No video stream found in {0}")]
    NoVideoStream(PathBuf),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// A frame image could not be read.
    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    /// A configuration file could not be parsed, or a report could not be
    /// serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<FfmpegError> for StitchError {
    fn from(error: FfmpegError) -> Self {
        StitchError::Ffmpeg(error.to_string())
    }
}

impl StitchError {
    /// Returns `true` if this error means an external or in-process media
    /// operation failed, as opposed to a local configuration or I/O problem.
    pub fn is_stage_failure(&self) -> bool {
        matches!(
            self,
            StitchError::Assembly { .. }
                | StitchError::Concatenation(_)
                | StitchError::Remux(_)
                | StitchError::ExternalTool { .. }
        )
    }
}
