//! Source media probing.
//!
//! The pipeline needs the output frame rate and the total number of frames
//! the producer will write. When those are not configured explicitly they
//! are read from the source file, which is also where the audio and subtitle
//! tracks come from.

use std::{path::Path, time::Duration};

use ffmpeg_next::media::Type;
use serde::Serialize;

use crate::error::StitchError;

/// What the pipeline needs to know about the source file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceInfo {
    /// Average frames per second of the best video stream.
    pub frame_rate: f64,
    /// Number of frames, from the stream header or estimated from duration.
    pub frame_count: u64,
    /// Number of audio streams.
    pub audio_tracks: usize,
    /// Number of subtitle streams.
    pub subtitle_tracks: usize,
}

impl SourceInfo {
    /// Open `path` and read its stream layout.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::FileOpen`] if the file cannot be opened, or
    /// [`StitchError::NoVideoStream`] if it has no video.
    pub fn probe<P: AsRef<Path>>(path: P) -> Result<Self, StitchError> {
        let path = path.as_ref();
        log::debug!("Probing {}", path.display());
        crate::ffmpeg::initialise(path)?;

        let input = ffmpeg_next::format::input(&path).map_err(|error| StitchError::FileOpen {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;

        let video = input
            .streams()
            .best(Type::Video)
            .ok_or_else(|| StitchError::NoVideoStream(path.to_path_buf()))?;

        let average = video.avg_frame_rate();
        let frame_rate = if average.denominator() != 0 && average.numerator() != 0 {
            f64::from(average)
        } else {
            let rate = video.rate();
            if rate.denominator() != 0 {
                f64::from(rate)
            } else {
                0.0
            }
        };

        let frame_count = if video.frames() > 0 {
            video.frames() as u64
        } else if input.duration() > 0 && frame_rate > 0.0 {
            // Container duration is in microseconds.
            let seconds = Duration::from_micros(input.duration() as u64).as_secs_f64();
            (seconds * frame_rate).round() as u64
        } else {
            0
        };

        let count_of = |medium: Type| {
            input
                .streams()
                .filter(|stream| stream.parameters().medium() == medium)
                .count()
        };

        Ok(Self {
            frame_rate,
            frame_count,
            audio_tracks: count_of(Type::Audio),
            subtitle_tracks: count_of(Type::Subtitle),
        })
    }
}

/// Count the packets of the best video stream in `path`.
///
/// For the intra/inter-coded formats the pipeline produces, one packet is
/// one frame, so this is the playable frame count of a segment or of the
/// concatenated output.
///
/// # Errors
///
/// Returns [`StitchError::FileOpen`] if the file cannot be opened, or
/// [`StitchError::NoVideoStream`] if it has no video.
pub fn count_video_packets<P: AsRef<Path>>(path: P) -> Result<u64, StitchError> {
    let path = path.as_ref();
    crate::ffmpeg::initialise(path)?;

    let mut input = ffmpeg_next::format::input(&path).map_err(|error| StitchError::FileOpen {
        path: path.to_path_buf(),
        reason: error.to_string(),
    })?;
    let video_index = input
        .streams()
        .best(Type::Video)
        .map(|stream| stream.index())
        .ok_or_else(|| StitchError::NoVideoStream(path.to_path_buf()))?;

    let count = input
        .packets()
        .filter(|(stream, _)| stream.index() == video_index)
        .count();
    Ok(count as u64)
}
