//! Progress reporting.
//!
//! The pipeline reports every phase change through a [`ProgressCallback`].
//! Callbacks observe; they cannot stop the run.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use framestitch::{PipelineOptions, ProgressCallback, ProgressInfo, SegmentPipeline};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!(
//!             "[{:?}] {}/{} segments",
//!             info.stage, info.segments_done, info.segments_total
//!         );
//!     }
//! }
//!
//! let options = PipelineOptions::new("work", "input.mkv", "finished.mkv")
//!     .with_frames(3000, 30.0)
//!     .with_progress(Arc::new(PrintProgress));
//! SegmentPipeline::new(options)?.run()?;
//! # Ok::<(), framestitch::StitchError>(())
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

/// What the pipeline is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PipelineStage {
    /// Waiting for the producer to write a segment's frames.
    WaitingForFrames,
    /// Encoding a segment.
    Assembling,
    /// A segment was already on disk from an earlier run.
    Skipped,
    /// Splicing all segments.
    Concatenating,
    /// Restoring the source's audio and subtitle tracks.
    Remuxing,
    /// The final file is written.
    Done,
}

/// A snapshot of pipeline progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Current phase.
    pub stage: PipelineStage,
    /// The segment the phase concerns, if any.
    pub segment: Option<u64>,
    /// Segments finished so far, including ones skipped on restart.
    pub segments_done: u64,
    /// Segments in the whole run.
    pub segments_total: u64,
    /// Completion percentage (0.0 to 100.0) of the segment loop.
    pub percentage: f32,
    /// Wall-clock time since the run started.
    pub elapsed: Duration,
    /// Estimated time until the last segment is finished, from the segments
    /// encoded in this run.
    pub estimated_remaining: Option<Duration>,
}

/// Receives progress updates.
///
/// Implementations must be [`Send`] and [`Sync`] so a callback can be shared
/// with other threads of the host application.
pub trait ProgressCallback: Send + Sync {
    /// Called on every phase change.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards all notifications. The default callback.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Tracks segment counts and timing and emits callbacks.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    total: u64,
    done: u64,
    encoded: u64,
    start_time: Instant,
    encoding_time: Duration,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Arc<dyn ProgressCallback>, total: u64) -> Self {
        Self {
            callback,
            total,
            done: 0,
            encoded: 0,
            start_time: Instant::now(),
            encoding_time: Duration::ZERO,
        }
    }

    /// Report entering `stage`.
    pub(crate) fn enter(&self, stage: PipelineStage, segment: Option<u64>) {
        self.report(stage, segment);
    }

    /// Record a segment encoded in this run, taking `spent` from first wait
    /// to finished file.
    pub(crate) fn segment_encoded(&mut self, segment: u64, spent: Duration) {
        self.done += 1;
        self.encoded += 1;
        self.encoding_time += spent;
        log::debug!("Segment {segment} took {spent:.2?}");
    }

    /// Record a segment found on disk.
    pub(crate) fn segment_skipped(&mut self, segment: u64) {
        self.done += 1;
        self.report(PipelineStage::Skipped, Some(segment));
    }

    fn report(&self, stage: PipelineStage, segment: Option<u64>) {
        let percentage = if self.total > 0 {
            (self.done as f32 / self.total as f32) * 100.0
        } else {
            100.0
        };

        let estimated_remaining = (self.encoded > 0).then(|| {
            let remaining = self.total.saturating_sub(self.done);
            let per_segment = self.encoding_time / self.encoded as u32;
            per_segment * remaining as u32
        });

        let info = ProgressInfo {
            stage,
            segment,
            segments_done: self.done,
            segments_total: self.total,
            percentage,
            elapsed: self.start_time.elapsed(),
            estimated_remaining,
        };
        self.callback.on_progress(&info);
    }
}
