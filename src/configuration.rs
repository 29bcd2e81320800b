//! Pipeline configuration.
//!
//! [`PipelineOptions`] is both a builder and a serde-deserializable record,
//! so the same settings can come from code or from a JSON file:
//!
//! ```json
//! {
//!   "workspace": "/work",
//!   "source": "/videos/input.mkv",
//!   "output": "/videos/finished.mkv",
//!   "frame_rate": 23.976,
//!   "total_frames": 34560,
//!   "cleanup": true,
//!   "naming": {
//!     "upscaled": { "directory": "upscaled", "prefix": "output_", "extension": "png", "width": 6 }
//!   }
//! }
//! ```
//!
//! Every field except the three paths has a default.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::CommandTemplates;
use crate::encode::SegmentEncoderOptions;
use crate::error::StitchError;
use crate::naming::{ArtifactClass, NamingTable};
use crate::progress::{NoOpProgress, ProgressCallback};
use crate::segment::SegmentPlan;

/// Which [`MediaOperations`](crate::MediaOperations) implementation runs the
/// three media steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// External programs from [`CommandTemplates`].
    #[default]
    Command,
    /// FFmpeg's libraries, in process.
    Native,
}

/// Settings for one pipeline run.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Directory shared with the frame producer.
    pub workspace: PathBuf,
    /// Original media file providing audio and subtitle tracks.
    pub source: PathBuf,
    /// Final output file.
    pub output: PathBuf,
    /// Output frames per second.
    pub frame_rate: f64,
    /// Number of frames the producer will write.
    pub total_frames: u64,
    /// Frames per segment. Defaults to one second of video.
    pub frames_per_segment: Option<u64>,
    /// How each artifact class names its files.
    pub naming: NamingTable,
    /// The class whose frames are encoded into segments.
    pub assembly_class: ArtifactClass,
    /// Delete consumed frames once their segment is on disk.
    pub cleanup: bool,
    /// Stop the final segment's upscaled cleanup one frame early, matching
    /// the upscaler's numbering.
    pub trim_final_upscaled: bool,
    /// First polling delay while waiting for frames, in milliseconds.
    pub poll_interval_ms: u64,
    /// Longest polling delay, in milliseconds.
    pub max_poll_interval_ms: u64,
    /// Segment directory relative to the workspace.
    pub segments_directory: PathBuf,
    /// Container extension of segment files.
    pub segment_extension: String,
    /// File name of the concat manifest inside the segment directory.
    pub manifest_name: String,
    /// File name of the spliced, video-only file inside the workspace.
    pub concatenated_name: String,
    /// Media backend.
    pub backend: Backend,
    /// Templates for [`Backend::Command`].
    pub commands: CommandTemplates,
    /// Encoder settings for [`Backend::Native`].
    pub encoder: SegmentEncoderOptions,
    #[serde(skip, default = "no_progress")]
    pub(crate) progress: Arc<dyn ProgressCallback>,
}

fn no_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NoOpProgress)
}

impl Debug for PipelineOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("PipelineOptions")
            .field("workspace", &self.workspace)
            .field("source", &self.source)
            .field("output", &self.output)
            .field("frame_rate", &self.frame_rate)
            .field("total_frames", &self.total_frames)
            .field("frames_per_segment", &self.frames_per_segment)
            .field("assembly_class", &self.assembly_class)
            .field("cleanup", &self.cleanup)
            .field("trim_final_upscaled", &self.trim_final_upscaled)
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            source: PathBuf::new(),
            output: PathBuf::new(),
            frame_rate: 0.0,
            total_frames: 0,
            frames_per_segment: None,
            naming: NamingTable::default(),
            assembly_class: ArtifactClass::Merged,
            cleanup: false,
            trim_final_upscaled: true,
            poll_interval_ms: 50,
            max_poll_interval_ms: 500,
            segments_directory: PathBuf::from("encoded"),
            segment_extension: "mkv".to_string(),
            manifest_name: "list.txt".to_string(),
            concatenated_name: "nosound.mkv".to_string(),
            backend: Backend::default(),
            commands: CommandTemplates::default(),
            encoder: SegmentEncoderOptions::default(),
            progress: no_progress(),
        }
    }
}

impl PipelineOptions {
    /// Options for `workspace`, `source` and `output` with everything else
    /// at its default. Frame rate and frame count still need to be set.
    pub fn new<W, S, O>(workspace: W, source: S, output: O) -> Self
    where
        W: Into<PathBuf>,
        S: Into<PathBuf>,
        O: Into<PathBuf>,
    {
        Self {
            workspace: workspace.into(),
            source: source.into(),
            output: output.into(),
            ..Self::default()
        }
    }

    /// Parse options from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::Json`] on malformed input.
    pub fn from_json_str(text: &str) -> Result<Self, StitchError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load options from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::Io`] if the file cannot be read or
    /// [`StitchError::Json`] if it is malformed.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, StitchError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Set the total frame count and frame rate.
    #[must_use]
    pub fn with_frames(mut self, total_frames: u64, frame_rate: f64) -> Self {
        self.total_frames = total_frames;
        self.frame_rate = frame_rate;
        self
    }

    /// Override the segment size.
    #[must_use]
    pub fn with_frames_per_segment(mut self, frames: u64) -> Self {
        self.frames_per_segment = Some(frames);
        self
    }

    /// Replace the naming table.
    #[must_use]
    pub fn with_naming(mut self, naming: NamingTable) -> Self {
        self.naming = naming;
        self
    }

    /// Choose which class of frames is encoded.
    #[must_use]
    pub fn with_assembly_class(mut self, class: ArtifactClass) -> Self {
        self.assembly_class = class;
        self
    }

    /// Enable or disable frame cleanup.
    #[must_use]
    pub fn with_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Enable or disable the final-segment upscaled trim.
    #[must_use]
    pub fn with_trim_final_upscaled(mut self, trim: bool) -> Self {
        self.trim_final_upscaled = trim;
        self
    }

    /// Set the polling backoff bounds.
    #[must_use]
    pub fn with_poll_interval(mut self, initial: Duration, max: Duration) -> Self {
        self.poll_interval_ms = initial.as_millis() as u64;
        self.max_poll_interval_ms = max.as_millis() as u64;
        self
    }

    /// Choose the media backend.
    #[must_use]
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Replace the command templates.
    #[must_use]
    pub fn with_commands(mut self, commands: CommandTemplates) -> Self {
        self.commands = commands;
        self
    }

    /// Replace the native encoder settings.
    #[must_use]
    pub fn with_encoder(mut self, encoder: SegmentEncoderOptions) -> Self {
        self.encoder = encoder;
        self
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// The effective segment size: the configured value, or the frame rate
    /// rounded to a whole number of frames (at least one).
    pub fn frames_per_segment(&self) -> u64 {
        self.frames_per_segment
            .unwrap_or_else(|| (self.frame_rate.round() as u64).max(1))
    }

    /// The segment plan these options describe.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::Configuration`] if the frame count or segment
    /// size is zero.
    pub fn plan(&self) -> Result<SegmentPlan, StitchError> {
        SegmentPlan::new(self.total_frames, self.frames_per_segment())
    }

    /// Check the options for values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::Configuration`] or [`StitchError::Template`]
    /// describing the first problem found.
    pub fn validate(&self) -> Result<(), StitchError> {
        if self.source.as_os_str().is_empty() {
            return Err(StitchError::Configuration("source path is not set".to_string()));
        }
        if self.output.as_os_str().is_empty() {
            return Err(StitchError::Configuration("output path is not set".to_string()));
        }
        if !(self.frame_rate.is_finite() && self.frame_rate > 0.0) {
            return Err(StitchError::Configuration(format!(
                "frame rate must be positive, got {}",
                self.frame_rate
            )));
        }
        self.plan()?;
        self.naming.validate()?;
        if self.segment_extension.trim_start_matches('.').is_empty() {
            return Err(StitchError::Configuration(
                "segment extension must not be empty".to_string(),
            ));
        }
        if self.backend == Backend::Command {
            self.commands.validate()?;
        }
        Ok(())
    }

    /// Directory holding segment files and the manifest.
    pub fn segments_dir(&self) -> PathBuf {
        self.workspace.join(&self.segments_directory)
    }

    /// Final path of segment `index`.
    pub fn segment_path(&self, index: u64) -> PathBuf {
        self.segments_dir().join(format!(
            "encoded_{index}.{}",
            self.segment_extension.trim_start_matches('.')
        ))
    }

    /// Path a segment is written to before it is published under
    /// [`segment_path`](Self::segment_path). Keeps the container extension so
    /// the format can still be inferred from it.
    pub fn partial_segment_path(&self, index: u64) -> PathBuf {
        self.segments_dir().join(format!(
            "encoded_{index}.partial.{}",
            self.segment_extension.trim_start_matches('.')
        ))
    }

    /// Location of the concat manifest.
    pub fn manifest_path(&self) -> PathBuf {
        self.segments_dir().join(&self.manifest_name)
    }

    /// Location of the spliced, video-only file.
    pub fn concatenated_path(&self) -> PathBuf {
        self.workspace.join(&self.concatenated_name)
    }
}
