//! In-process media operations through FFmpeg's libraries.

use crate::encode::{SegmentEncoder, SegmentEncoderOptions};
use crate::error::StitchError;
use crate::operations::{ConcatRequest, MediaOperations, RemuxRequest, SegmentRequest};
use crate::remux::{Concatenator, TrackRemuxer};

/// [`MediaOperations`] implemented with [`SegmentEncoder`],
/// [`Concatenator`] and [`TrackRemuxer`]; no external program is run.
#[derive(Debug, Clone)]
pub struct NativeOperations {
    encoder: SegmentEncoderOptions,
    copy_subtitles: bool,
}

impl Default for NativeOperations {
    fn default() -> Self {
        Self::new(SegmentEncoderOptions::default())
    }
}

impl NativeOperations {
    /// Create the backend with the given encoder settings. Subtitles are
    /// copied from the source.
    pub fn new(encoder: SegmentEncoderOptions) -> Self {
        Self {
            encoder,
            copy_subtitles: true,
        }
    }

    /// Leave the source's subtitle tracks out of the final file.
    #[must_use]
    pub fn without_subtitles(mut self) -> Self {
        self.copy_subtitles = false;
        self
    }
}

impl MediaOperations for NativeOperations {
    fn assemble_segment(&self, request: &SegmentRequest) -> Result<(), StitchError> {
        SegmentEncoder::new(self.encoder.clone()).write(
            &request.destination,
            &request.frame_paths,
            request.frame_rate,
        )
    }

    fn concatenate(&self, request: &ConcatRequest) -> Result<(), StitchError> {
        Concatenator::new(&request.segments).run(&request.destination)
    }

    fn remux_tracks(&self, request: &RemuxRequest) -> Result<(), StitchError> {
        let mut remuxer = TrackRemuxer::new(&request.video, &request.source)?;
        if !self.copy_subtitles {
            remuxer = remuxer.exclude_subtitles();
        }
        remuxer.run(&request.destination)
    }
}
