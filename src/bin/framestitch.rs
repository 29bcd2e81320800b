use std::{path::PathBuf, sync::Arc};

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use framestitch::{
    ArtifactClass, Backend, FfmpegLogLevel, PipelineOptions, PipelineStage, ProgressCallback,
    ProgressInfo, SegmentPipeline, SourceInfo,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  framestitch run --workspace work --source input.mkv --output finished.mkv --cleanup --progress\n  framestitch run --config job.json --verbose\n  framestitch plan --frames 100 --frame-rate 30 --json\n  framestitch purge --workspace work --class upscaled --start 1 --end 31\n  framestitch completions zsh > _framestitch";

#[derive(Debug, Parser)]
#[command(
    name = "framestitch",
    version,
    about = "Assemble a growing directory of frames into a finished video",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show debug logging output.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar while running.
    #[arg(long, global = true)]
    progress: bool,

    /// FFmpeg log level (quiet, fatal, error, warning, info, debug).
    #[arg(long, global = true)]
    ffmpeg_log_level: Option<String>,
}

/// Settings shared by `run` and `plan`. Flags override the config file.
#[derive(Debug, Args, Clone, Default)]
struct JobArgs {
    /// JSON file with pipeline options.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Workspace directory shared with the frame producer.
    #[arg(long)]
    workspace: Option<PathBuf>,
    /// Original media file; also used to probe frame rate and count.
    #[arg(long)]
    source: Option<PathBuf>,
    /// Final output file.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Output frame rate.
    #[arg(long)]
    frame_rate: Option<f64>,
    /// Total number of frames the producer writes.
    #[arg(long)]
    frames: Option<u64>,
    /// Frames per segment (default: one second of video).
    #[arg(long)]
    segment_frames: Option<u64>,
    /// Frame class to encode (raw, merged, compressed, upscaled).
    #[arg(long)]
    class: Option<String>,
    /// Delete frames once their segment is written.
    #[arg(long)]
    cleanup: bool,
    /// Purge the final segment's upscaled frames over the full range.
    #[arg(long)]
    no_final_trim: bool,
    /// Media backend (command, native).
    #[arg(long)]
    backend: Option<String>,
    /// FFmpeg executable used by the command backend.
    #[arg(long)]
    ffmpeg: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the pipeline until the final file is written.
    #[command(
        about = "Run the pipeline",
        after_help = "Examples:\n  framestitch run --workspace work --source input.mkv --output finished.mkv\n  framestitch run --config job.json --backend native --json"
    )]
    Run {
        #[command(flatten)]
        job: JobArgs,
        /// Print the run report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the segment layout without touching the workspace.
    #[command(
        about = "Show segment ranges",
        after_help = "Examples:\n  framestitch plan --frames 100 --frame-rate 30\n  framestitch plan --source input.mkv --json"
    )]
    Plan {
        #[command(flatten)]
        job: JobArgs,
        /// Output the plan as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Delete the frames of one class for a half-open index range.
    #[command(about = "Delete a range of frame files")]
    Purge {
        /// Workspace directory.
        #[arg(long)]
        workspace: PathBuf,
        /// JSON file with pipeline options, for custom naming.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Frame class (raw, merged, compressed, upscaled).
        #[arg(long)]
        class: String,
        /// First frame index to delete.
        #[arg(long)]
        start: u64,
        /// One past the last frame index to delete.
        #[arg(long)]
        end: u64,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completion scripts")]
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn parse_backend(value: &str) -> Option<Backend> {
    match value.to_ascii_lowercase().as_str() {
        "command" | "cmd" | "external" => Some(Backend::Command),
        "native" | "library" => Some(Backend::Native),
        _ => None,
    }
}

fn stage_label(stage: PipelineStage) -> &'static str {
    match stage {
        PipelineStage::WaitingForFrames => "waiting for frames",
        PipelineStage::Assembling => "assembling",
        PipelineStage::Skipped => "reusing segment",
        PipelineStage::Concatenating => "concatenating",
        PipelineStage::Remuxing => "remuxing",
        PipelineStage::Done => "done",
        _ => "working",
    }
}

/// Build pipeline options from an optional config file, command-line
/// overrides, and, for whatever is still missing, the source file.
fn build_options(job: &JobArgs) -> Result<PipelineOptions, Box<dyn std::error::Error>> {
    let mut options = match &job.config {
        Some(path) => PipelineOptions::from_json_file(path)?,
        None => PipelineOptions::default(),
    };

    if let Some(workspace) = &job.workspace {
        options.workspace = workspace.clone();
    }
    if let Some(source) = &job.source {
        options.source = source.clone();
    }
    if let Some(output) = &job.output {
        options.output = output.clone();
    }
    if let Some(frame_rate) = job.frame_rate {
        options.frame_rate = frame_rate;
    }
    if let Some(frames) = job.frames {
        options.total_frames = frames;
    }
    if let Some(segment_frames) = job.segment_frames {
        options.frames_per_segment = Some(segment_frames);
    }
    if let Some(class) = &job.class {
        options.assembly_class = class.parse::<ArtifactClass>()?;
    }
    if job.cleanup {
        options.cleanup = true;
    }
    if job.no_final_trim {
        options.trim_final_upscaled = false;
    }
    if let Some(backend) = &job.backend {
        options.backend =
            parse_backend(backend).ok_or(format!("unsupported --backend: {backend}"))?;
    }
    if let Some(ffmpeg) = &job.ffmpeg {
        options.commands.ffmpeg = ffmpeg.clone();
    }

    let needs_probe = options.frame_rate <= 0.0 || options.total_frames == 0;
    if needs_probe && !options.source.as_os_str().is_empty() {
        let info = SourceInfo::probe(&options.source)?;
        log::info!(
            "Probed {}: {:.3} fps, {} frames",
            options.source.display(),
            info.frame_rate,
            info.frame_count
        );
        if options.frame_rate <= 0.0 {
            options.frame_rate = info.frame_rate;
        }
        if options.total_frames == 0 {
            options.total_frames = info.frame_count;
        }
    }

    Ok(options)
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Stderr)
        .init();
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(global.verbose);

    if let Some(level) = &global.ffmpeg_log_level {
        let parsed = level.parse::<FfmpegLogLevel>()?;
        framestitch::set_ffmpeg_log_level(parsed);
    }

    Ok(())
}

struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self { bar }
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        self.bar.set_length(info.segments_total);
        self.bar.set_position(info.segments_done);
        let message = match (info.segment, info.estimated_remaining) {
            (Some(segment), Some(remaining)) => format!(
                "{} {segment} (~{}s left)",
                stage_label(info.stage),
                remaining.as_secs()
            ),
            (Some(segment), None) => format!("{} {segment}", stage_label(info.stage)),
            (None, _) => stage_label(info.stage).to_string(),
        };
        self.bar.set_message(message);
        if info.stage == PipelineStage::Done {
            self.bar.finish_with_message("done");
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Run { job, json } => {
            let mut options = build_options(&job)?;
            if cli.global.progress {
                options = options.with_progress(Arc::new(TerminalProgress::new()));
            }

            let report = SegmentPipeline::new(options)?.run()?;

            for warning in &report.cleanup_warnings {
                eprintln!("{} {}", "warning:".yellow().bold(), warning.yellow());
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "{} {}",
                    "success:".green().bold(),
                    format!(
                        "Wrote {} ({} segments encoded, {} reused, {} frames removed)",
                        report.output.display(),
                        report.segments_assembled,
                        report.segments_skipped,
                        report.frames_removed
                    )
                    .green()
                );
            }
        }
        Commands::Plan { job, json } => {
            let options = build_options(&job)?;
            let plan = options.plan()?;
            if json {
                let payload = json!({
                    "total_frames": plan.total_frames(),
                    "frames_per_segment": plan.frames_per_segment(),
                    "segment_count": plan.segment_count(),
                    "segments": plan.segments().collect::<Vec<_>>(),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!(
                    "{} frames in {} segments of {}",
                    plan.total_frames(),
                    plan.segment_count(),
                    plan.frames_per_segment()
                );
                for segment in plan.segments() {
                    println!(
                        "  {:>5}  frames {}..={}  -> {}",
                        segment.index,
                        segment.first_frame,
                        segment.last_frame,
                        options.segment_path(segment.index).display()
                    );
                }
            }
        }
        Commands::Purge {
            workspace,
            config,
            class,
            start,
            end,
        } => {
            if end < start {
                return Err("--end must not be smaller than --start".into());
            }
            let class = class.parse::<ArtifactClass>()?;
            let naming = match config {
                Some(path) => PipelineOptions::from_json_file(path)?.naming,
                None => PipelineOptions::default().naming,
            };

            let outcome = framestitch::purge(&workspace, &naming, class, start..end);
            for warning in &outcome.warnings {
                eprintln!("{} {}", "warning:".yellow().bold(), warning.to_string().yellow());
            }
            println!(
                "{} {}",
                "removed".green().bold(),
                format!(
                    "{} {class} frames ({} already gone)",
                    outcome.removed, outcome.missing
                )
            );
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "framestitch", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_backend_aliases() {
        assert_eq!(parse_backend("command"), Some(Backend::Command));
        assert_eq!(parse_backend("NATIVE"), Some(Backend::Native));
        assert_eq!(parse_backend("gstreamer"), None);
    }

    #[test]
    fn flags_override_defaults_without_probing() {
        let job = JobArgs {
            workspace: Some(PathBuf::from("work")),
            source: Some(PathBuf::from("input.mkv")),
            output: Some(PathBuf::from("finished.mkv")),
            frame_rate: Some(30.0),
            frames: Some(100),
            class: Some("upscaled".to_string()),
            cleanup: true,
            no_final_trim: true,
            backend: Some("native".to_string()),
            ..JobArgs::default()
        };

        let options = build_options(&job).unwrap();
        assert_eq!(options.frames_per_segment(), 30);
        assert_eq!(options.plan().unwrap().segment_count(), 4);
        assert_eq!(options.assembly_class, ArtifactClass::Upscaled);
        assert_eq!(options.backend, Backend::Native);
        assert!(options.cleanup);
        assert!(!options.trim_final_upscaled);
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
