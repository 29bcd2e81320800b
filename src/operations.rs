//! The media operations the pipeline delegates to.
//!
//! The pipeline itself never touches video data. Producing a segment from
//! frames, splicing segments, and restoring the source's tracks are three
//! opaque operations behind [`MediaOperations`]. Two implementations ship
//! with the crate: [`CommandOperations`](crate::CommandOperations) runs an
//! external program from a command template, and
//! [`NativeOperations`](crate::NativeOperations) does the same work in
//! process through FFmpeg's libraries.

use std::path::PathBuf;

use crate::error::StitchError;

/// Everything needed to encode one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRequest {
    /// Segment index.
    pub index: u64,
    /// Frames per second of the output.
    pub frame_rate: f64,
    /// First frame number of the segment.
    pub first_frame: u64,
    /// Number of frames in the segment.
    pub frame_count: u64,
    /// printf-style image sequence pattern, e.g. `/work/merged/merged_%d.jpg`.
    pub frame_pattern: PathBuf,
    /// Path of every frame in the segment, in order.
    pub frame_paths: Vec<PathBuf>,
    /// File the segment must be written to.
    pub destination: PathBuf,
}

impl SegmentRequest {
    /// Last frame number of the segment.
    pub fn last_frame(&self) -> u64 {
        self.first_frame + self.frame_count.saturating_sub(1)
    }
}

/// Splice the listed segments, in order, into one video stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcatRequest {
    /// The concat manifest on disk.
    pub manifest: PathBuf,
    /// The same segments, in manifest order.
    pub segments: Vec<PathBuf>,
    /// Output file.
    pub destination: PathBuf,
}

/// Combine the new video stream with the source's audio and subtitle tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemuxRequest {
    /// The concatenated, video-only file.
    pub video: PathBuf,
    /// The original media file providing audio and subtitle tracks.
    pub source: PathBuf,
    /// Final output file.
    pub destination: PathBuf,
}

/// The three operations the pipeline needs from a media backend.
///
/// Each operation either produces its destination file or returns an error;
/// the pipeline treats every error as fatal.
pub trait MediaOperations {
    /// Encode the frames of one segment into `request.destination`.
    fn assemble_segment(&self, request: &SegmentRequest) -> Result<(), StitchError>;

    /// Splice segments into `request.destination` without re-encoding.
    fn concatenate(&self, request: &ConcatRequest) -> Result<(), StitchError>;

    /// Write `request.destination` with the video of `request.video` and the
    /// audio/subtitle tracks of `request.source`.
    fn remux_tracks(&self, request: &RemuxRequest) -> Result<(), StitchError>;
}

impl<T: MediaOperations + ?Sized> MediaOperations for Box<T> {
    fn assemble_segment(&self, request: &SegmentRequest) -> Result<(), StitchError> {
        (**self).assemble_segment(request)
    }

    fn concatenate(&self, request: &ConcatRequest) -> Result<(), StitchError> {
        (**self).concatenate(request)
    }

    fn remux_tracks(&self, request: &RemuxRequest) -> Result<(), StitchError> {
        (**self).remux_tracks(request)
    }
}
