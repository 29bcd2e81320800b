//! # framestitch
//!
//! Turn a growing directory of image frames into a finished video without
//! waiting for the last frame to exist.
//!
//! An external producer (an upscaler, a frame interpolator, any tool that
//! writes numbered images) fills a workspace directory at its own pace.
//! `framestitch` watches the workspace through the filesystem alone, encodes
//! each block of frames into a short segment as soon as the block is
//! complete, splices the segments in order, and finally puts the original
//! audio and subtitle tracks back onto the new video.
//!
//! ## Quick Start
//!
//! ```no_run
//! use framestitch::{PipelineOptions, SegmentPipeline};
//!
//! let options = PipelineOptions::new("/work", "input.mkv", "finished.mkv")
//!     .with_frames(34_560, 23.976)
//!     .with_cleanup(true);
//!
//! let report = SegmentPipeline::new(options)?.run()?;
//! println!("{} segments encoded", report.segments_assembled);
//! # Ok::<(), framestitch::StitchError>(())
//! ```
//!
//! ### Plan Only
//!
//! ```
//! use framestitch::SegmentPlan;
//!
//! let plan = SegmentPlan::new(100, 30)?;
//! let ranges: Vec<_> = plan
//!     .segments()
//!     .map(|segment| (segment.first_frame, segment.last_frame))
//!     .collect();
//! assert_eq!(ranges, [(1, 30), (31, 60), (61, 90), (91, 100)]);
//! # Ok::<(), framestitch::StitchError>(())
//! ```
//!
//! ## Features
//!
//! - **Filesystem synchronisation**: [`PollingWaiter`] blocks on frame files
//!   with bounded exponential backoff; the producer may live in another
//!   process or on another machine.
//! - **Per-class naming**: [`NamingTable`] maps each [`ArtifactClass`] to its
//!   directory, prefix, extension, and zero-padding width.
//! - **Resumable runs**: segments are published atomically and recorded in
//!   an append-only [`ConcatManifest`]; a restarted run skips finished work.
//! - **Background cleanup**: consumed frames are deleted on a worker thread
//!   while the next segment's frames are awaited.
//! - **Two backends**: [`CommandOperations`] runs command templates,
//!   [`NativeOperations`] uses FFmpeg's libraries in process.
//! - **Progress**: [`ProgressCallback`] receives every phase change.
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed for the native backend and
//! for probing; the command backend needs an `ffmpeg` executable.

pub mod cleanup;
pub mod command;
pub mod configuration;
pub mod encode;
pub mod error;
pub mod ffmpeg;
pub mod manifest;
pub mod naming;
pub mod native;
pub mod operations;
pub mod pipeline;
pub mod probe;
pub mod progress;
pub mod remux;
pub mod segment;
pub mod wait;

pub use cleanup::{CleanupOutcome, CleanupScheduler, CleanupWarning, purge, purge_segment};
pub use command::{CommandOperations, CommandTemplates};
pub use configuration::{Backend, PipelineOptions};
pub use encode::{SegmentEncoder, SegmentEncoderOptions, VideoCodec};
pub use error::StitchError;
pub use ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
pub use manifest::ConcatManifest;
pub use naming::{ArtifactClass, ArtifactNaming, NamingTable};
pub use native::NativeOperations;
pub use operations::{ConcatRequest, MediaOperations, RemuxRequest, SegmentRequest};
pub use pipeline::{DriverPhase, PipelineReport, SegmentPipeline};
pub use probe::{SourceInfo, count_video_packets};
pub use progress::{PipelineStage, ProgressCallback, ProgressInfo};
pub use remux::{Concatenator, TrackRemuxer};
pub use segment::{SegmentPlan, SegmentRange};
pub use wait::{PollingWaiter, ReadinessWaiter};
