//! Pipeline option loading and validation tests.

use std::{fs, path::Path, time::Duration};

use framestitch::{
    ArtifactClass, ArtifactNaming, Backend, CommandTemplates, NamingTable, PipelineOptions,
    SegmentEncoderOptions, SegmentPipeline, StitchError, VideoCodec,
};

// ── JSON loading ───────────────────────────────────────────────────

#[test]
fn load_full_config_file() {
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let path = directory.path().join("job.json");
    fs::write(
        &path,
        r#"{
            "workspace": "/data/job",
            "source": "/videos/episode.mkv",
            "output": "/videos/episode.upscaled.mkv",
            "frame_rate": 23.976,
            "total_frames": 34560,
            "frames_per_segment": 48,
            "assembly_class": "upscaled",
            "cleanup": true,
            "trim_final_upscaled": false,
            "poll_interval_ms": 100,
            "max_poll_interval_ms": 2000,
            "segments_directory": "segments",
            "segment_extension": "mp4",
            "manifest_name": "segments.txt",
            "concatenated_name": "video_only.mp4",
            "backend": "native",
            "encoder": { "codec": "h265", "crf": 20 },
            "commands": { "ffmpeg": "/opt/ffmpeg/bin/ffmpeg" },
            "naming": {
                "upscaled": { "directory": "out", "prefix": "", "extension": "png", "width": 8 }
            }
        }"#,
    )
    .expect("Failed to write config");

    let options = PipelineOptions::from_json_file(&path).expect("Failed to load config");
    options.validate().expect("Config should be valid");

    assert_eq!(options.frames_per_segment(), 48);
    assert_eq!(options.plan().unwrap().segment_count(), 720);
    assert_eq!(options.assembly_class, ArtifactClass::Upscaled);
    assert!(options.cleanup);
    assert!(!options.trim_final_upscaled);
    assert_eq!(options.backend, Backend::Native);
    assert_eq!(options.encoder.codec, VideoCodec::H265);
    assert_eq!(options.encoder.crf, Some(20));
    assert_eq!(options.commands.ffmpeg, "/opt/ffmpeg/bin/ffmpeg");
    // Templates not given in the file keep their defaults.
    assert_eq!(options.commands.remux, CommandTemplates::default().remux);

    assert_eq!(
        options.segment_path(3),
        Path::new("/data/job/segments/encoded_3.mp4")
    );
    assert_eq!(
        options.manifest_path(),
        Path::new("/data/job/segments/segments.txt")
    );
    assert_eq!(
        options.concatenated_path(),
        Path::new("/data/job/video_only.mp4")
    );
    assert_eq!(
        options.naming.path(&options.workspace, ArtifactClass::Upscaled, 12),
        Path::new("/data/job/out/00000012.png")
    );
}

#[test]
fn minimal_config_uses_defaults() {
    let options = PipelineOptions::from_json_str(
        r#"{ "source": "in.mkv", "output": "out.mkv", "frame_rate": 25, "total_frames": 100 }"#,
    )
    .unwrap();

    assert_eq!(options.workspace, Path::new("."));
    assert_eq!(options.frames_per_segment(), 25);
    assert_eq!(options.assembly_class, ArtifactClass::Merged);
    assert_eq!(options.backend, Backend::Command);
    assert!(!options.cleanup);
    assert!(options.trim_final_upscaled);
    assert_eq!(options.naming, NamingTable::default());
    assert_eq!(options.encoder, SegmentEncoderOptions::default());
}

#[test]
fn malformed_config_is_a_json_error() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("broken.json");
    fs::write(&path, "{ \"frame_rate\": ").unwrap();

    let error = PipelineOptions::from_json_file(&path).unwrap_err();
    assert!(matches!(error, StitchError::Json(_)));
}

#[test]
fn missing_config_is_an_io_error() {
    let error = PipelineOptions::from_json_file("this_config_does_not_exist.json").unwrap_err();
    assert!(matches!(error, StitchError::Io(_)));
}

#[test]
fn unknown_backend_is_rejected() {
    let result = PipelineOptions::from_json_str(r#"{ "backend": "gstreamer" }"#);
    assert!(result.is_err());
}

// ── Builder ────────────────────────────────────────────────────────

#[test]
fn builder_sets_every_field() {
    let mut naming = NamingTable::default();
    naming.set_rule(
        ArtifactClass::Merged,
        ArtifactNaming::new("frames", "f_", "png", 5),
    );

    let options = PipelineOptions::new("/work", "in.mkv", "out.mkv")
        .with_frames(240, 24.0)
        .with_frames_per_segment(60)
        .with_naming(naming)
        .with_assembly_class(ArtifactClass::Merged)
        .with_cleanup(true)
        .with_trim_final_upscaled(false)
        .with_poll_interval(Duration::from_millis(20), Duration::from_secs(1))
        .with_backend(Backend::Native)
        .with_encoder(SegmentEncoderOptions::default().codec(VideoCodec::Mpeg4));

    options.validate().unwrap();
    assert_eq!(options.plan().unwrap().segment_count(), 4);
    assert_eq!(options.poll_interval_ms, 20);
    assert_eq!(options.max_poll_interval_ms, 1000);
    assert_eq!(
        options.naming.file_name(ArtifactClass::Merged, 7),
        "f_00007.png"
    );
    assert!(format!("{options:?}").contains("PipelineOptions"));
}

// ── Validation ─────────────────────────────────────────────────────

#[test]
fn pipeline_rejects_invalid_options() {
    let no_frames = PipelineOptions::new("/work", "in.mkv", "out.mkv").with_frames(0, 30.0);
    assert!(matches!(
        SegmentPipeline::new(no_frames),
        Err(StitchError::Configuration(_))
    ));

    let no_rate = PipelineOptions::new("/work", "in.mkv", "out.mkv").with_frames(100, 0.0);
    assert!(matches!(
        SegmentPipeline::new(no_rate),
        Err(StitchError::Configuration(_))
    ));

    let zero_segment = PipelineOptions::new("/work", "in.mkv", "out.mkv")
        .with_frames(100, 30.0)
        .with_frames_per_segment(0);
    assert!(SegmentPipeline::new(zero_segment).is_err());
}

#[test]
fn command_templates_need_an_output_token() {
    let commands = CommandTemplates {
        remux: "ffmpeg -i [no_audio] -i [file_dir] -c copy".to_string(),
        ..CommandTemplates::default()
    };
    let options = PipelineOptions::new("/work", "in.mkv", "out.mkv")
        .with_frames(100, 30.0)
        .with_commands(commands.clone());
    assert!(matches!(options.validate(), Err(StitchError::Template(_))));

    // The native backend never renders templates.
    let native = options.with_backend(Backend::Native);
    assert!(native.validate().is_ok());
}

#[test]
fn naming_needs_an_extension() {
    let mut naming = NamingTable::default();
    naming.set_rule(ArtifactClass::Raw, ArtifactNaming::new("inputs", "frame", "", 0));
    let options = PipelineOptions::new("/work", "in.mkv", "out.mkv")
        .with_frames(100, 30.0)
        .with_naming(naming);
    assert!(matches!(options.validate(), Err(StitchError::Configuration(_))));
}
