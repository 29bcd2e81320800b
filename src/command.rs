//! Media operations backed by external command templates.
//!
//! Each operation is configured as a command line containing bracketed
//! placeholders:
//!
//! | Token | Operations | Value |
//! |-------|------------|-------|
//! | `[ffmpeg_dir]` | all | the configured FFmpeg executable |
//! | `[frame_rate]` | assemble | output frames per second |
//! | `[start_number]` | assemble | first frame number of the segment |
//! | `[input_frames]` | assemble | printf-style frame pattern |
//! | `[frame_count]` / `[end_number]` | assemble | frames in the segment |
//! | `[last_frame]` | assemble | last frame number of the segment |
//! | `[text_file]` | concatenate | the concat manifest |
//! | `[no_audio]` | remux | the concatenated video-only file |
//! | `[file_dir]` | remux | the original source file |
//! | `[output_file]` | all | the file to produce |
//!
//! Templates are split into arguments with shell quoting rules *before*
//! placeholders are substituted, so a substituted path containing spaces
//! stays a single argument.
//!
//! # Example
//!
//! ```no_run
//! use framestitch::{CommandOperations, CommandTemplates, MediaOperations, RemuxRequest};
//!
//! let operations = CommandOperations::new(CommandTemplates::default())?;
//! operations.remux_tracks(&RemuxRequest {
//!     video: "work/nosound.mkv".into(),
//!     source: "input.mkv".into(),
//!     destination: "finished.mkv".into(),
//! })?;
//! # Ok::<(), framestitch::StitchError>(())
//! ```

use std::{
    path::Path,
    process::{Command, Stdio},
};

use serde::{Deserialize, Serialize};

use crate::error::StitchError;
use crate::operations::{ConcatRequest, MediaOperations, RemuxRequest, SegmentRequest};

const OUTPUT_TOKEN: &str = "[output_file]";

/// Command line templates for the three external operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandTemplates {
    /// FFmpeg executable substituted for `[ffmpeg_dir]`.
    pub ffmpeg: String,
    /// Frames to one segment.
    pub assemble: String,
    /// Segments to one video stream.
    pub concatenate: String,
    /// Video stream plus source tracks to the final file.
    pub remux: String,
}

impl Default for CommandTemplates {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            assemble: "[ffmpeg_dir] -y -loglevel error -framerate [frame_rate] \
                       -start_number [start_number] -i [input_frames] -frames:v [frame_count] \
                       -c:v libx264 -crf 15 -pix_fmt yuv420p [output_file]"
                .to_string(),
            concatenate: "[ffmpeg_dir] -y -loglevel error -f concat -safe 0 -i [text_file] \
                          -c copy [output_file]"
                .to_string(),
            remux: "[ffmpeg_dir] -y -loglevel error -i [no_audio] -i [file_dir] \
                    -map 0:v:0 -map 1:a? -map 1:s? -c copy [output_file]"
                .to_string(),
        }
    }
}

impl CommandTemplates {
    /// Check that every template parses and names its output.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::Template`] describing the first bad template.
    pub fn validate(&self) -> Result<(), StitchError> {
        for (name, template) in [
            ("assemble", &self.assemble),
            ("concatenate", &self.concatenate),
            ("remux", &self.remux),
        ] {
            let arguments = split_template(name, template)?;
            if !arguments.iter().any(|argument| argument.contains(OUTPUT_TOKEN)) {
                return Err(StitchError::Template(format!(
                    "{name} template does not contain {OUTPUT_TOKEN}"
                )));
            }
        }
        Ok(())
    }

    /// Render the assemble command for `request`.
    pub fn assemble_command(&self, request: &SegmentRequest) -> Result<Vec<String>, StitchError> {
        let count = request.frame_count.to_string();
        render(
            "assemble",
            &self.assemble,
            &[
                ("[ffmpeg_dir]", self.ffmpeg.clone()),
                ("[frame_rate]", request.frame_rate.to_string()),
                ("[start_number]", request.first_frame.to_string()),
                ("[input_frames]", path_string(&request.frame_pattern)),
                ("[frame_count]", count.clone()),
                ("[end_number]", count),
                ("[last_frame]", request.last_frame().to_string()),
                (OUTPUT_TOKEN, path_string(&request.destination)),
            ],
        )
    }

    /// Render the concatenate command for `request`.
    pub fn concatenate_command(&self, request: &ConcatRequest) -> Result<Vec<String>, StitchError> {
        render(
            "concatenate",
            &self.concatenate,
            &[
                ("[ffmpeg_dir]", self.ffmpeg.clone()),
                ("[text_file]", path_string(&request.manifest)),
                (OUTPUT_TOKEN, path_string(&request.destination)),
            ],
        )
    }

    /// Render the remux command for `request`.
    pub fn remux_command(&self, request: &RemuxRequest) -> Result<Vec<String>, StitchError> {
        render(
            "remux",
            &self.remux,
            &[
                ("[ffmpeg_dir]", self.ffmpeg.clone()),
                ("[no_audio]", path_string(&request.video)),
                ("[file_dir]", path_string(&request.source)),
                (OUTPUT_TOKEN, path_string(&request.destination)),
            ],
        )
    }
}

/// [`MediaOperations`] that run external programs.
#[derive(Debug, Clone)]
pub struct CommandOperations {
    templates: CommandTemplates,
}

impl CommandOperations {
    /// Create the adapter, validating the templates up front.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::Template`] if a template is malformed.
    pub fn new(templates: CommandTemplates) -> Result<Self, StitchError> {
        templates.validate()?;
        Ok(Self { templates })
    }

    /// The templates in use.
    pub fn templates(&self) -> &CommandTemplates {
        &self.templates
    }
}

impl MediaOperations for CommandOperations {
    fn assemble_segment(&self, request: &SegmentRequest) -> Result<(), StitchError> {
        let arguments = self.templates.assemble_command(request)?;
        run("assemble", &arguments)
    }

    fn concatenate(&self, request: &ConcatRequest) -> Result<(), StitchError> {
        let arguments = self.templates.concatenate_command(request)?;
        run("concatenate", &arguments)
    }

    fn remux_tracks(&self, request: &RemuxRequest) -> Result<(), StitchError> {
        let arguments = self.templates.remux_command(request)?;
        run("remux", &arguments)
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn split_template(name: &str, template: &str) -> Result<Vec<String>, StitchError> {
    let arguments = shlex::split(template)
        .ok_or_else(|| StitchError::Template(format!("{name} template has unbalanced quoting")))?;
    if arguments.is_empty() {
        return Err(StitchError::Template(format!("{name} template is empty")));
    }
    Ok(arguments)
}

fn render(
    name: &str,
    template: &str,
    tokens: &[(&str, String)],
) -> Result<Vec<String>, StitchError> {
    let arguments = split_template(name, template)?
        .into_iter()
        .map(|argument| {
            tokens
                .iter()
                .fold(argument, |argument, (token, value)| argument.replace(token, value))
        })
        .collect();
    Ok(arguments)
}

fn run(stage: &'static str, arguments: &[String]) -> Result<(), StitchError> {
    let (program, rest) = arguments
        .split_first()
        .ok_or_else(|| StitchError::Template(format!("{stage} command is empty")))?;

    log::debug!("Running {stage} command: {}", arguments.join(" "));

    let output = Command::new(program)
        .args(rest)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| StitchError::Launch {
            stage,
            program: program.clone(),
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines().rev().take(10).collect::<Vec<_>>().into_iter().rev() {
            log::error!("{program}: {line}");
        }
        return Err(StitchError::ExternalTool {
            stage,
            program: program.clone(),
            status: output.status,
        });
    }

    Ok(())
}
