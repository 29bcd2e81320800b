//! The segment pipeline driver.
//!
//! [`SegmentPipeline`] walks the [`SegmentPlan`] in order. For every segment
//! it either finds the finished file from an earlier run or waits for the
//! producer to write the segment's first and last frames, encodes them, and
//! publishes the result by renaming it into place. Each finished segment is
//! recorded in the [`ConcatManifest`] and, when cleanup is enabled, handed to
//! the background [`CleanupScheduler`]. Once every segment exists the
//! segments are spliced and the source's audio and subtitle tracks are
//! remuxed onto the new video.
//!
//! A failure at any stage ends the run. Finished segments and the manifest
//! stay on disk, so running the same options again resumes at the first
//! missing segment.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use serde::Serialize;

use crate::cleanup::{CleanupOutcome, CleanupScheduler};
use crate::command::CommandOperations;
use crate::configuration::{Backend, PipelineOptions};
use crate::error::StitchError;
use crate::manifest::ConcatManifest;
use crate::native::NativeOperations;
use crate::operations::{ConcatRequest, MediaOperations, RemuxRequest, SegmentRequest};
use crate::progress::{PipelineStage, ProgressTracker};
use crate::segment::{SegmentPlan, SegmentRange};
use crate::wait::{PollingWaiter, ReadinessWaiter};

/// Where the driver is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "segment", rename_all = "snake_case")]
pub enum DriverPhase {
    /// Not started.
    Idle,
    /// Waiting for the frames of a segment.
    Waiting(u64),
    /// Encoding a segment.
    Assembling(u64),
    /// Handing a segment's frames to cleanup.
    Cleaning(u64),
    /// Splicing the segments.
    Concatenating,
    /// Attaching the source's tracks.
    Remuxing,
    /// The final output exists.
    Done,
}

impl Display for DriverPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            DriverPhase::Idle => write!(f, "idle"),
            DriverPhase::Waiting(segment) => write!(f, "waiting for segment {segment}"),
            DriverPhase::Assembling(segment) => write!(f, "assembling segment {segment}"),
            DriverPhase::Cleaning(segment) => write!(f, "cleaning segment {segment}"),
            DriverPhase::Concatenating => write!(f, "concatenating"),
            DriverPhase::Remuxing => write!(f, "remuxing"),
            DriverPhase::Done => write!(f, "done"),
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// Segments encoded by this run.
    pub segments_assembled: u64,
    /// Segments found on disk from an earlier run.
    pub segments_skipped: u64,
    /// Frame files deleted by cleanup.
    pub frames_removed: u64,
    /// Frame files cleanup expected but did not find.
    pub frames_missing: u64,
    /// Non-fatal cleanup problems, rendered for display.
    pub cleanup_warnings: Vec<String>,
    /// Path of the final file.
    pub output: PathBuf,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

/// Drives one workspace from frames to finished video.
pub struct SegmentPipeline {
    options: PipelineOptions,
    plan: SegmentPlan,
    operations: Box<dyn MediaOperations>,
    waiter: Box<dyn ReadinessWaiter>,
    phase: DriverPhase,
}

impl SegmentPipeline {
    /// Build a pipeline from `options`, using the configured backend and a
    /// [`PollingWaiter`] with the configured backoff.
    ///
    /// The workspace is made absolute so that manifest entries resolve no
    /// matter where the manifest is read from.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::Configuration`] or [`StitchError::Template`] if
    /// the options are invalid, or [`StitchError::Io`] if the working
    /// directory cannot be determined.
    pub fn new(mut options: PipelineOptions) -> Result<Self, StitchError> {
        options.validate()?;
        options.workspace = std::path::absolute(&options.workspace)?;
        let plan = options.plan()?;

        let operations: Box<dyn MediaOperations> = match options.backend {
            Backend::Command => Box::new(CommandOperations::new(options.commands.clone())?),
            Backend::Native => Box::new(NativeOperations::new(options.encoder.clone())),
        };
        let waiter = PollingWaiter::new(
            Duration::from_millis(options.poll_interval_ms),
            Duration::from_millis(options.max_poll_interval_ms),
        );

        log::debug!(
            "Planned {} segments of {} frames for {} frames",
            plan.segment_count(),
            plan.frames_per_segment(),
            plan.total_frames()
        );

        Ok(Self {
            options,
            plan,
            operations,
            waiter: Box::new(waiter),
            phase: DriverPhase::Idle,
        })
    }

    /// Replace the media backend.
    #[must_use]
    pub fn with_operations(mut self, operations: impl MediaOperations + 'static) -> Self {
        self.operations = Box::new(operations);
        self
    }

    /// Replace the readiness waiter.
    #[must_use]
    pub fn with_waiter(mut self, waiter: impl ReadinessWaiter + 'static) -> Self {
        self.waiter = Box::new(waiter);
        self
    }

    /// The options this pipeline runs with.
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// The segment layout.
    pub fn plan(&self) -> &SegmentPlan {
        &self.plan
    }

    /// The phase the driver reached. After a failed run this is the phase
    /// that failed.
    pub fn phase(&self) -> DriverPhase {
        self.phase
    }

    /// Run every phase to completion.
    ///
    /// # Errors
    ///
    /// - [`StitchError::Assembly`] if a segment cannot be produced.
    /// - [`StitchError::Concatenation`] if splicing fails.
    /// - [`StitchError::Remux`] if the final remux fails.
    /// - [`StitchError::Manifest`] if the manifest on disk disagrees with the
    ///   segments found.
    /// - [`StitchError::Io`] if the segment directory cannot be created.
    pub fn run(&mut self) -> Result<PipelineReport, StitchError> {
        let started = Instant::now();
        log::info!(
            "Stitching {} frames into {} segments in {}",
            self.plan.total_frames(),
            self.plan.segment_count(),
            self.options.workspace.display()
        );

        fs::create_dir_all(self.options.segments_dir())?;
        let mut manifest = ConcatManifest::open(self.options.manifest_path())?;
        let mut tracker =
            ProgressTracker::new(self.options.progress.clone(), self.plan.segment_count());

        let cleanup = if self.options.cleanup {
            Some(CleanupScheduler::spawn(
                self.options.workspace.clone(),
                self.options.naming.clone(),
                self.options.trim_final_upscaled,
            )?)
        } else {
            None
        };

        let mut assembled = 0u64;
        let mut skipped = 0u64;

        let plan = self.plan;
        for segment in plan.segments() {
            let destination = self.options.segment_path(segment.index);

            if destination.exists() {
                log::info!(
                    "Segment {} already exists, skipping frames {}..={}",
                    segment.index,
                    segment.first_frame,
                    segment.last_frame
                );
                tracker.segment_skipped(segment.index);
                skipped += 1;
            } else {
                let began = Instant::now();
                self.produce_segment(&segment, &destination, &tracker)?;
                tracker.segment_encoded(segment.index, began.elapsed());
                assembled += 1;
            }

            if manifest.record(segment.index as usize, &destination)? {
                log::debug!("Recorded {} in manifest", destination.display());
            }

            if let Some(cleanup) = &cleanup {
                self.enter(DriverPhase::Cleaning(segment.index));
                cleanup.schedule(segment);
            }
        }

        let cleanup_outcome = cleanup
            .map(CleanupScheduler::finish)
            .unwrap_or_default();
        log_cleanup(&cleanup_outcome);

        self.enter(DriverPhase::Concatenating);
        tracker.enter(PipelineStage::Concatenating, None);
        let concatenated = self.options.concatenated_path();
        let request = ConcatRequest {
            manifest: manifest.path().to_path_buf(),
            segments: manifest.entries().to_vec(),
            destination: concatenated.clone(),
        };
        self.operations
            .concatenate(&request)
            .map_err(|error| match error {
                StitchError::Concatenation(_) => error,
                other => StitchError::Concatenation(other.to_string()),
            })?;
        require_output(&concatenated).map_err(StitchError::Concatenation)?;

        self.enter(DriverPhase::Remuxing);
        tracker.enter(PipelineStage::Remuxing, None);
        let request = RemuxRequest {
            video: concatenated,
            source: self.options.source.clone(),
            destination: self.options.output.clone(),
        };
        self.operations
            .remux_tracks(&request)
            .map_err(|error| match error {
                StitchError::Remux(_) => error,
                other => StitchError::Remux(other.to_string()),
            })?;
        require_output(&self.options.output).map_err(StitchError::Remux)?;

        self.enter(DriverPhase::Done);
        tracker.enter(PipelineStage::Done, None);

        let elapsed = started.elapsed();
        log::info!(
            "Wrote {} in {elapsed:.2?} ({assembled} segments encoded, {skipped} reused)",
            self.options.output.display()
        );

        Ok(PipelineReport {
            segments_assembled: assembled,
            segments_skipped: skipped,
            frames_removed: cleanup_outcome.removed,
            frames_missing: cleanup_outcome.missing,
            cleanup_warnings: cleanup_outcome
                .warnings
                .iter()
                .map(ToString::to_string)
                .collect(),
            output: self.options.output.clone(),
            elapsed,
        })
    }

    /// Wait for, encode, and publish one segment.
    fn produce_segment(
        &mut self,
        segment: &SegmentRange,
        destination: &Path,
        tracker: &ProgressTracker,
    ) -> Result<(), StitchError> {
        let workspace = &self.options.workspace;
        let naming = &self.options.naming;
        let class = self.options.assembly_class;

        self.phase = DriverPhase::Waiting(segment.index);
        log::debug!("Driver is {}", self.phase);
        tracker.enter(PipelineStage::WaitingForFrames, Some(segment.index));
        // Frames are written in order, so the last frame implies the rest.
        self.waiter
            .wait(&naming.path(workspace, class, segment.first_frame));
        self.waiter
            .wait(&naming.path(workspace, class, segment.last_frame));

        self.phase = DriverPhase::Assembling(segment.index);
        log::info!(
            "Assembling segment {} from frames {}..={}",
            segment.index,
            segment.first_frame,
            segment.last_frame
        );
        tracker.enter(PipelineStage::Assembling, Some(segment.index));

        let partial = self.options.partial_segment_path(segment.index);
        let request = SegmentRequest {
            index: segment.index,
            frame_rate: self.options.frame_rate,
            first_frame: segment.first_frame,
            frame_count: segment.frame_count(),
            frame_pattern: naming.sequence_pattern(workspace, class),
            frame_paths: (segment.first_frame..segment.end_exclusive())
                .map(|index| naming.path(workspace, class, index))
                .collect(),
            destination: partial.clone(),
        };

        let failed = |reason: String| StitchError::Assembly {
            segment: segment.index,
            reason,
        };

        self.operations
            .assemble_segment(&request)
            .map_err(|error| match error {
                StitchError::Assembly { .. } => error,
                other => failed(other.to_string()),
            })?;
        require_output(&partial).map_err(failed)?;
        fs::rename(&partial, destination).map_err(|error| {
            failed(format!(
                "could not publish {} as {}: {error}",
                partial.display(),
                destination.display()
            ))
        })?;
        Ok(())
    }

    fn enter(&mut self, phase: DriverPhase) {
        self.phase = phase;
        log::debug!("Driver is {phase}");
    }
}

/// Confirm an operation left a non-empty file at `path`.
fn require_output(path: &Path) -> Result<(), String> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.len() > 0 => Ok(()),
        Ok(_) => Err(format!("{} is empty", path.display())),
        Err(error) => Err(format!("{} was not produced: {error}", path.display())),
    }
}

fn log_cleanup(outcome: &CleanupOutcome) {
    if outcome.removed == 0 && outcome.missing == 0 && outcome.warnings.is_empty() {
        return;
    }
    log::info!(
        "Cleanup removed {} frames ({} already gone, {} warnings)",
        outcome.removed,
        outcome.missing,
        outcome.warnings.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_display() {
        assert_eq!(DriverPhase::Waiting(3).to_string(), "waiting for segment 3");
        assert_eq!(DriverPhase::Done.to_string(), "done");
    }

    #[test]
    fn empty_output_is_rejected() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("segment.mkv");
        assert!(require_output(&path).is_err());
        fs::write(&path, b"").unwrap();
        assert!(require_output(&path).unwrap_err().contains("empty"));
        fs::write(&path, b"data").unwrap();
        assert!(require_output(&path).is_ok());
    }

    #[test]
    fn workspace_is_made_absolute() {
        let options = PipelineOptions::new("relative/work", "in.mkv", "out.mkv")
            .with_frames(10, 5.0);
        let pipeline = SegmentPipeline::new(options).unwrap();
        assert!(pipeline.options().workspace.is_absolute());
        assert_eq!(pipeline.plan().segment_count(), 2);
        assert_eq!(pipeline.phase(), DriverPhase::Idle);
    }
}
