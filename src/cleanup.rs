//! Deleting consumed frame files.
//!
//! Once a segment is on disk its frames are no longer needed in any of the
//! artifact directories. [`purge`] removes one class's files for a frame
//! range; [`CleanupScheduler`] runs purges for finished segments on a
//! background thread so the pipeline can start waiting for the next
//! segment's frames straight away.
//!
//! Cleanup is best-effort. A file that is already gone (a restarted run) is
//! counted and skipped; any other failure becomes a [`CleanupWarning`] and is
//! logged, never propagated.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    io::ErrorKind,
    ops::Range,
    path::{Path, PathBuf},
    sync::mpsc::{self, Sender},
    thread::{self, JoinHandle},
};

use crate::error::StitchError;
use crate::naming::{ArtifactClass, NamingTable};
use crate::segment::SegmentRange;

/// A file that could not be deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupWarning {
    /// File that was being deleted.
    pub path: PathBuf,
    /// Why the deletion failed.
    pub reason: String,
}

impl Display for CleanupWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "could not delete {}: {}", self.path.display(), self.reason)
    }
}

/// Tally of a purge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupOutcome {
    /// Files deleted.
    pub removed: u64,
    /// Files that were already absent.
    pub missing: u64,
    /// Files that could not be deleted.
    pub warnings: Vec<CleanupWarning>,
}

impl CleanupOutcome {
    /// Fold another outcome into this one.
    pub fn merge(&mut self, other: CleanupOutcome) {
        self.removed += other.removed;
        self.missing += other.missing;
        self.warnings.extend(other.warnings);
    }
}

/// Delete the files of `class` for every frame in `frames`.
///
/// Only indices inside the half-open range are touched.
pub fn purge(
    workspace: &Path,
    naming: &NamingTable,
    class: ArtifactClass,
    frames: Range<u64>,
) -> CleanupOutcome {
    let mut outcome = CleanupOutcome::default();

    for index in frames {
        let path = naming.path(workspace, class, index);
        match fs::remove_file(&path) {
            Ok(()) => outcome.removed += 1,
            Err(error) if error.kind() == ErrorKind::NotFound => outcome.missing += 1,
            Err(error) => {
                let warning = CleanupWarning {
                    path,
                    reason: error.to_string(),
                };
                log::warn!("{warning}");
                outcome.warnings.push(warning);
            }
        }
    }

    outcome
}

/// Purge every artifact class for one finished segment.
pub fn purge_segment(
    workspace: &Path,
    naming: &NamingTable,
    segment: &SegmentRange,
    trim_final_upscaled: bool,
) -> CleanupOutcome {
    let mut outcome = CleanupOutcome::default();
    for class in ArtifactClass::ALL {
        let frames = segment.purge_range(class, trim_final_upscaled);
        outcome.merge(purge(workspace, naming, class, frames));
    }
    log::debug!(
        "Cleaned segment {}: {} removed, {} already gone",
        segment.index,
        outcome.removed,
        outcome.missing
    );
    outcome
}

/// Background worker purging finished segments in the order they are
/// scheduled.
pub struct CleanupScheduler {
    sender: Option<Sender<SegmentRange>>,
    worker: Option<JoinHandle<CleanupOutcome>>,
}

impl CleanupScheduler {
    /// Start the worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::Io`] if the thread cannot be spawned.
    pub fn spawn(
        workspace: PathBuf,
        naming: NamingTable,
        trim_final_upscaled: bool,
    ) -> Result<Self, StitchError> {
        let (sender, receiver) = mpsc::channel::<SegmentRange>();

        let worker = thread::Builder::new()
            .name("framestitch-cleanup".to_string())
            .spawn(move || {
                let mut total = CleanupOutcome::default();
                for segment in receiver {
                    total.merge(purge_segment(
                        &workspace,
                        &naming,
                        &segment,
                        trim_final_upscaled,
                    ));
                }
                total
            })?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    /// Queue the frames of a segment that is already on disk.
    pub fn schedule(&self, segment: SegmentRange) {
        let Some(sender) = &self.sender else {
            return;
        };
        if sender.send(segment).is_err() {
            log::warn!(
                "Cleanup worker has stopped; frames of segment {} were not deleted",
                segment.index
            );
        }
    }

    /// Wait for every queued purge to finish and return the combined tally.
    pub fn finish(mut self) -> CleanupOutcome {
        self.shutdown()
    }

    fn shutdown(&mut self) -> CleanupOutcome {
        // Closing the channel ends the worker's receive loop.
        drop(self.sender.take());
        match self.worker.take().map(JoinHandle::join) {
            Some(Ok(outcome)) => outcome,
            Some(Err(_)) => {
                log::warn!("Cleanup worker panicked; some frames may remain on disk");
                CleanupOutcome::default()
            }
            None => CleanupOutcome::default(),
        }
    }
}

impl Drop for CleanupScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
