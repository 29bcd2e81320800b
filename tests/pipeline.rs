//! Segment pipeline integration tests.
//!
//! A scripted [`MediaOperations`] stands in for FFmpeg: segments are text
//! files listing their frame numbers, concatenation joins them, and remux
//! appends the source. Everything else (waiting, publication, manifest,
//! cleanup) is the real driver.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use framestitch::{
    ArtifactClass, ConcatRequest, DriverPhase, MediaOperations, PipelineOptions, PipelineStage,
    PollingWaiter, ProgressCallback, ProgressInfo, ReadinessWaiter, RemuxRequest,
    SegmentPipeline, SegmentRequest, StitchError,
};

const SOURCE: &str = "audio track\n";

#[derive(Default)]
struct Script {
    calls: Vec<String>,
    fail_segment: Option<u64>,
    empty_segment: Option<u64>,
    fail_concatenation: bool,
    fail_remux: bool,
}

#[derive(Clone, Default)]
struct ScriptedOperations {
    script: Arc<Mutex<Script>>,
}

impl ScriptedOperations {
    fn calls(&self) -> Vec<String> {
        self.script.lock().unwrap().calls.clone()
    }

    fn edit(&self, change: impl FnOnce(&mut Script)) {
        change(&mut self.script.lock().unwrap());
    }
}

impl MediaOperations for ScriptedOperations {
    fn assemble_segment(&self, request: &SegmentRequest) -> Result<(), StitchError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(format!("assemble {}", request.index));

        // Frames are only deleted once their segment is published.
        for frame in &request.frame_paths {
            assert!(frame.exists(), "{} deleted before assembly", frame.display());
        }
        let name = request.destination.file_name().unwrap().to_string_lossy();
        assert!(name.contains(".partial."), "assembled straight to {name}");

        if script.fail_segment == Some(request.index) {
            return Err(StitchError::Configuration("encoder crashed".to_string()));
        }
        let contents = if script.empty_segment == Some(request.index) {
            String::new()
        } else {
            (request.first_frame..=request.last_frame())
                .map(|frame| format!("frame {frame}\n"))
                .collect()
        };
        fs::write(&request.destination, contents)?;
        Ok(())
    }

    fn concatenate(&self, request: &ConcatRequest) -> Result<(), StitchError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(format!("concatenate {}", request.segments.len()));
        if script.fail_concatenation {
            return Err(StitchError::Configuration("demuxer refused list".to_string()));
        }

        let mut joined = String::new();
        for segment in &request.segments {
            joined.push_str(&fs::read_to_string(segment)?);
        }
        fs::write(&request.destination, joined)?;
        Ok(())
    }

    fn remux_tracks(&self, request: &RemuxRequest) -> Result<(), StitchError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push("remux".to_string());
        if script.fail_remux {
            return Err(StitchError::Remux("no audio stream".to_string()));
        }

        let mut output = fs::read_to_string(&request.video)?;
        output.push_str(&fs::read_to_string(&request.source)?);
        fs::write(&request.destination, output)?;
        Ok(())
    }
}

/// Collects every path waited on, then delegates to a fast poller.
#[derive(Clone, Default)]
struct RecordingWaiter {
    waited: Arc<Mutex<Vec<PathBuf>>>,
}

impl ReadinessWaiter for RecordingWaiter {
    fn wait(&self, path: &Path) {
        self.waited.lock().unwrap().push(path.to_path_buf());
        PollingWaiter::new(Duration::from_millis(1), Duration::from_millis(5)).wait(path);
    }
}

#[derive(Default)]
struct StageLog {
    updates: Mutex<Vec<ProgressInfo>>,
}

impl ProgressCallback for StageLog {
    fn on_progress(&self, info: &ProgressInfo) {
        self.updates.lock().unwrap().push(info.clone());
    }
}

fn options(workspace: &Path, total_frames: u64, frames_per_segment: u64) -> PipelineOptions {
    let source = workspace.join("source.mkv");
    fs::write(&source, SOURCE).unwrap();
    PipelineOptions::new(workspace, source, workspace.join("finished.mkv"))
        .with_frames(total_frames, 24.0)
        .with_frames_per_segment(frames_per_segment)
        .with_poll_interval(Duration::from_millis(1), Duration::from_millis(5))
}

fn write_frames(
    options: &PipelineOptions,
    class: ArtifactClass,
    frames: impl Iterator<Item = u64>,
) {
    let workspace = &options.workspace;
    fs::create_dir_all(options.naming.directory(workspace, class)).unwrap();
    for frame in frames {
        fs::write(options.naming.path(workspace, class, frame), b"pixels").unwrap();
    }
}

fn write_all_classes(options: &PipelineOptions) {
    for class in ArtifactClass::ALL {
        write_frames(options, class, 1..=options.total_frames);
    }
}

fn pipeline(options: PipelineOptions, operations: &ScriptedOperations) -> SegmentPipeline {
    SegmentPipeline::new(options)
        .unwrap()
        .with_operations(operations.clone())
}

fn manifest_lines(options: &PipelineOptions) -> Vec<String> {
    fs::read_to_string(options.manifest_path())
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

fn expected_manifest(options: &PipelineOptions, segments: u64) -> Vec<String> {
    (0..segments)
        .map(|index| format!("file '{}'", options.segment_path(index).display()))
        .collect()
}

fn expected_output(total_frames: u64) -> String {
    let mut output: String = (1..=total_frames)
        .map(|frame| format!("frame {frame}\n"))
        .collect();
    output.push_str(SOURCE);
    output
}

#[test]
fn hundred_frames_in_four_segments() {
    let directory = tempfile::tempdir().unwrap();
    let options = options(directory.path(), 100, 30);
    write_all_classes(&options);
    let operations = ScriptedOperations::default();

    let mut pipeline = pipeline(options, &operations);
    let report = pipeline.run().unwrap();
    let options = pipeline.options();

    assert_eq!(
        operations.calls(),
        [
            "assemble 0",
            "assemble 1",
            "assemble 2",
            "assemble 3",
            "concatenate 4",
            "remux"
        ]
    );
    assert_eq!(manifest_lines(options), expected_manifest(options, 4));
    assert_eq!(fs::read_to_string(&report.output).unwrap(), expected_output(100));
    assert_eq!(report.segments_assembled, 4);
    assert_eq!(report.segments_skipped, 0);
    assert_eq!(pipeline.phase(), DriverPhase::Done);

    let last = fs::read_to_string(options.segment_path(3)).unwrap();
    assert_eq!(last.lines().next(), Some("frame 91"));
    assert_eq!(last.lines().count(), 10);
    assert!(!options.partial_segment_path(3).exists());
}

#[test]
fn exact_multiple_has_no_short_segment() {
    let directory = tempfile::tempdir().unwrap();
    let options = options(directory.path(), 90, 30);
    write_frames(&options, ArtifactClass::Merged, 1..=90);
    let operations = ScriptedOperations::default();

    let mut pipeline = pipeline(options, &operations);
    pipeline.run().unwrap();

    assert_eq!(manifest_lines(pipeline.options()), expected_manifest(pipeline.options(), 3));
    assert_eq!(operations.calls().last().map(String::as_str), Some("remux"));
}

#[test]
fn restart_reuses_existing_segment_and_reconciles_manifest() {
    let directory = tempfile::tempdir().unwrap();
    let options = options(directory.path(), 100, 30);
    write_frames(&options, ArtifactClass::Merged, 1..=100);

    // Segment 1 was published but the run stopped before its manifest line.
    let segment: String = (31..=60).map(|frame| format!("frame {frame}\n")).collect();
    fs::create_dir_all(options.segments_dir()).unwrap();
    fs::write(options.segment_path(1), segment).unwrap();

    let operations = ScriptedOperations::default();
    let mut pipeline = pipeline(options, &operations);
    let report = pipeline.run().unwrap();
    let options = pipeline.options();

    assert_eq!(
        operations.calls(),
        ["assemble 0", "assemble 2", "assemble 3", "concatenate 4", "remux"]
    );
    assert_eq!((report.segments_assembled, report.segments_skipped), (3, 1));
    assert_eq!(manifest_lines(options), expected_manifest(options, 4));
    assert_eq!(fs::read_to_string(&report.output).unwrap(), expected_output(100));
}

#[test]
fn rerunning_a_finished_workspace_assembles_nothing() {
    let directory = tempfile::tempdir().unwrap();
    let options = options(directory.path(), 100, 30);
    write_frames(&options, ArtifactClass::Merged, 1..=100);

    pipeline(options.clone(), &ScriptedOperations::default())
        .run()
        .unwrap();
    let before = fs::read_to_string(options.manifest_path()).unwrap();

    let operations = ScriptedOperations::default();
    let report = pipeline(options.clone(), &operations).run().unwrap();

    assert_eq!(operations.calls(), ["concatenate 4", "remux"]);
    assert_eq!(report.segments_skipped, 4);
    assert_eq!(fs::read_to_string(options.manifest_path()).unwrap(), before);
}

#[test]
fn conflicting_manifest_entry_stops_the_run() {
    let directory = tempfile::tempdir().unwrap();
    let options = options(directory.path(), 60, 30);
    write_frames(&options, ArtifactClass::Merged, 1..=60);
    fs::create_dir_all(options.segments_dir()).unwrap();
    fs::write(options.manifest_path(), "file '/elsewhere/encoded_0.mkv'\n").unwrap();

    let operations = ScriptedOperations::default();
    let error = pipeline(options, &operations).run().unwrap_err();

    assert!(matches!(error, StitchError::Manifest(_)), "{error}");
    assert_eq!(operations.calls(), ["assemble 0"]);
}

#[test]
fn assembly_failure_keeps_finished_segments_for_resume() {
    let directory = tempfile::tempdir().unwrap();
    let options = options(directory.path(), 100, 30);
    write_frames(&options, ArtifactClass::Merged, 1..=100);

    let failing = ScriptedOperations::default();
    failing.edit(|script| script.fail_segment = Some(1));
    let mut first = pipeline(options.clone(), &failing);
    let error = first.run().unwrap_err();

    match error {
        StitchError::Assembly { segment, reason } => {
            assert_eq!(segment, 1);
            assert!(reason.contains("encoder crashed"), "{reason}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(first.phase(), DriverPhase::Assembling(1));
    let options = first.options().clone();
    assert!(options.segment_path(0).exists());
    assert!(!options.segment_path(1).exists());
    assert_eq!(manifest_lines(&options), expected_manifest(&options, 1));

    let operations = ScriptedOperations::default();
    let report = pipeline(options.clone(), &operations).run().unwrap();
    assert_eq!(
        operations.calls(),
        ["assemble 1", "assemble 2", "assemble 3", "concatenate 4", "remux"]
    );
    assert_eq!(manifest_lines(&options), expected_manifest(&options, 4));
    assert_eq!(fs::read_to_string(&report.output).unwrap(), expected_output(100));
}

#[test]
fn empty_segment_is_not_published() {
    let directory = tempfile::tempdir().unwrap();
    let options = options(directory.path(), 60, 30);
    write_frames(&options, ArtifactClass::Merged, 1..=60);
    let operations = ScriptedOperations::default();
    operations.edit(|script| script.empty_segment = Some(0));

    let mut pipeline = pipeline(options, &operations);
    let error = pipeline.run().unwrap_err();

    assert!(
        matches!(&error, StitchError::Assembly { segment: 0, reason } if reason.contains("empty")),
        "{error}"
    );
    assert!(!pipeline.options().segment_path(0).exists());
    assert!(manifest_lines(pipeline.options()).is_empty());
}

#[test]
fn concatenation_failure_is_reported_as_such() {
    let directory = tempfile::tempdir().unwrap();
    let options = options(directory.path(), 60, 30);
    write_frames(&options, ArtifactClass::Merged, 1..=60);
    let operations = ScriptedOperations::default();
    operations.edit(|script| script.fail_concatenation = true);

    let mut pipeline = pipeline(options, &operations);
    let error = pipeline.run().unwrap_err();

    assert!(
        matches!(&error, StitchError::Concatenation(reason) if reason.contains("demuxer refused list")),
        "{error}"
    );
    assert_eq!(pipeline.phase(), DriverPhase::Concatenating);
    assert!(!operations.calls().contains(&"remux".to_string()));
}

#[test]
fn remux_failure_is_reported_as_such() {
    let directory = tempfile::tempdir().unwrap();
    let options = options(directory.path(), 60, 30);
    write_frames(&options, ArtifactClass::Merged, 1..=60);
    let operations = ScriptedOperations::default();
    operations.edit(|script| script.fail_remux = true);

    let mut pipeline = pipeline(options, &operations);
    let error = pipeline.run().unwrap_err();

    assert!(matches!(error, StitchError::Remux(_)), "{error}");
    assert_eq!(pipeline.phase(), DriverPhase::Remuxing);
    assert!(pipeline.options().concatenated_path().exists());
    assert!(!pipeline.options().output.exists());
}

#[test]
fn waits_for_a_slow_producer() {
    let directory = tempfile::tempdir().unwrap();
    let options = options(directory.path(), 25, 10);
    let waiter = RecordingWaiter::default();
    let operations = ScriptedOperations::default();
    let mut pipeline = pipeline(options, &operations).with_waiter(waiter.clone());

    let producer_options = pipeline.options().clone();
    let producer = thread::spawn(move || {
        for frame in 1..=25 {
            thread::sleep(Duration::from_millis(2));
            write_frames(&producer_options, ArtifactClass::Merged, frame..=frame);
        }
    });

    let report = pipeline.run().unwrap();
    producer.join().unwrap();

    let options = pipeline.options();
    let merged = |frame| options.naming.path(&options.workspace, ArtifactClass::Merged, frame);
    assert_eq!(
        *waiter.waited.lock().unwrap(),
        [merged(1), merged(10), merged(11), merged(20), merged(21), merged(25)]
    );
    assert_eq!(report.segments_assembled, 3);
    assert_eq!(fs::read_to_string(&report.output).unwrap(), expected_output(25));
}

#[test]
fn cleanup_trims_final_upscaled_frame() {
    let directory = tempfile::tempdir().unwrap();
    let options = options(directory.path(), 100, 30).with_cleanup(true);
    write_all_classes(&options);

    let mut pipeline = pipeline(options, &ScriptedOperations::default());
    let report = pipeline.run().unwrap();
    let options = pipeline.options();

    assert_eq!(report.frames_removed, 399);
    assert_eq!(report.frames_missing, 0);
    assert!(report.cleanup_warnings.is_empty());
    for class in ArtifactClass::ALL {
        let left: Vec<u64> = (1..=100)
            .filter(|&frame| options.naming.path(&options.workspace, class, frame).exists())
            .collect();
        let expected: &[u64] = if class == ArtifactClass::Upscaled { &[100] } else { &[] };
        assert_eq!(left, expected, "{class}");
    }
}

#[test]
fn cleanup_without_final_trim_removes_everything() {
    let directory = tempfile::tempdir().unwrap();
    let options = options(directory.path(), 20, 10)
        .with_cleanup(true)
        .with_trim_final_upscaled(false);
    write_all_classes(&options);

    let report = pipeline(options, &ScriptedOperations::default())
        .run()
        .unwrap();

    assert_eq!(report.frames_removed, 80);
}

#[test]
fn cleanup_counts_frames_already_gone() {
    let directory = tempfile::tempdir().unwrap();
    let options = options(directory.path(), 60, 30).with_cleanup(true);
    write_frames(&options, ArtifactClass::Merged, 1..=60);
    write_frames(&options, ArtifactClass::Upscaled, 1..=60);

    let report = pipeline(options, &ScriptedOperations::default())
        .run()
        .unwrap();

    // Merged 60 and upscaled 59 deleted; raw and compressed never existed.
    assert_eq!(report.frames_removed, 119);
    assert_eq!(report.frames_missing, 120);
}

#[test]
fn progress_follows_the_phases() {
    let directory = tempfile::tempdir().unwrap();
    let log = Arc::new(StageLog::default());
    let options = options(directory.path(), 60, 30).with_progress(log.clone());
    write_frames(&options, ArtifactClass::Merged, 1..=60);

    // Segment 0 is left from an earlier run.
    let first = options.clone().with_frames(30, 24.0);
    pipeline(first, &ScriptedOperations::default()).run().unwrap();
    log.updates.lock().unwrap().clear();

    pipeline(options, &ScriptedOperations::default())
        .run()
        .unwrap();

    let updates = log.updates.lock().unwrap();
    let stages: Vec<(PipelineStage, Option<u64>)> =
        updates.iter().map(|info| (info.stage, info.segment)).collect();
    assert_eq!(
        stages,
        [
            (PipelineStage::Skipped, Some(0)),
            (PipelineStage::WaitingForFrames, Some(1)),
            (PipelineStage::Assembling, Some(1)),
            (PipelineStage::Concatenating, None),
            (PipelineStage::Remuxing, None),
            (PipelineStage::Done, None),
        ]
    );
    let last = updates.last().unwrap();
    assert_eq!((last.segments_done, last.segments_total), (2, 2));
    assert_eq!(last.percentage, 100.0);
}
