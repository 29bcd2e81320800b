//! Per-frame file naming.
//!
//! Every stage of the upstream producer writes one file per frame into its
//! own directory, and the stages do not agree on how frame numbers are
//! written: most use plain decimal (`merged_7.jpg`), the upscaler pads to six
//! digits (`output_000007.png`). [`NamingTable`] makes that asymmetry an
//! explicit table keyed by [`ArtifactClass`] instead of string literals
//! scattered through the pipeline.
//!
//! # Example
//!
//! ```
//! use framestitch::{ArtifactClass, NamingTable};
//!
//! let naming = NamingTable::default();
//! assert_eq!(naming.file_name(ArtifactClass::Merged, 7), "merged_7.jpg");
//! assert_eq!(naming.file_name(ArtifactClass::Upscaled, 7), "output_000007.png");
//! ```

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::error::StitchError;

/// A category of per-frame file produced at one stage of the upstream
/// frame pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactClass {
    /// Frames extracted from the source video.
    Raw,
    /// Fully reconstructed output frames, ready to be encoded.
    Merged,
    /// Compressed intermediate frames.
    Compressed,
    /// Frames written by the upscaler.
    Upscaled,
}

impl ArtifactClass {
    /// All classes, in the order cleanup visits them.
    pub const ALL: [ArtifactClass; 4] = [
        ArtifactClass::Merged,
        ArtifactClass::Compressed,
        ArtifactClass::Raw,
        ArtifactClass::Upscaled,
    ];
}

impl Display for ArtifactClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            ArtifactClass::Raw => "raw",
            ArtifactClass::Merged => "merged",
            ArtifactClass::Compressed => "compressed",
            ArtifactClass::Upscaled => "upscaled",
        };
        f.write_str(name)
    }
}

impl FromStr for ArtifactClass {
    type Err = StitchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "raw" | "input" | "frame" => Ok(ArtifactClass::Raw),
            "merged" => Ok(ArtifactClass::Merged),
            "compressed" => Ok(ArtifactClass::Compressed),
            "upscaled" | "output" => Ok(ArtifactClass::Upscaled),
            other => Err(StitchError::Configuration(format!(
                "unknown artifact class: {other}"
            ))),
        }
    }
}

/// How one artifact class names its files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactNaming {
    /// Directory relative to the workspace.
    pub directory: PathBuf,
    /// File name prefix placed before the frame number.
    pub prefix: String,
    /// File extension, with or without a leading dot.
    pub extension: String,
    /// Minimum digit count of the frame number. `0` means plain decimal.
    #[serde(default)]
    pub width: usize,
}

impl ArtifactNaming {
    /// Create a naming rule.
    pub fn new<P: Into<PathBuf>>(directory: P, prefix: &str, extension: &str, width: usize) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.to_string(),
            extension: extension.trim_start_matches('.').to_string(),
            width,
        }
    }

    fn extension(&self) -> &str {
        self.extension.trim_start_matches('.')
    }

    /// Render the file name for `index`.
    pub fn file_name(&self, index: u64) -> String {
        format!(
            "{}{:0width$}.{}",
            self.prefix,
            index,
            self.extension(),
            width = self.width
        )
    }

    /// The printf-style pattern FFmpeg's image sequence demuxer understands,
    /// e.g. `merged_%d.jpg` or `output_%06d.png`. A literal `%` in the prefix
    /// or extension is written as `%%`.
    pub fn sequence_pattern(&self) -> String {
        let prefix = escape_percent(&self.prefix);
        let extension = escape_percent(self.extension());
        if self.width == 0 {
            format!("{prefix}%d.{extension}")
        } else {
            format!("{prefix}%0{}d.{extension}", self.width)
        }
    }
}

/// The naming rule of every [`ArtifactClass`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingTable {
    /// Frames extracted from the source video.
    pub raw: ArtifactNaming,
    /// Reconstructed output frames.
    pub merged: ArtifactNaming,
    /// Compressed intermediate frames.
    pub compressed: ArtifactNaming,
    /// Upscaler output.
    pub upscaled: ArtifactNaming,
}

impl Default for NamingTable {
    fn default() -> Self {
        Self {
            raw: ArtifactNaming::new("inputs", "frame", "jpg", 0),
            merged: ArtifactNaming::new("merged", "merged_", "jpg", 0),
            compressed: ArtifactNaming::new("compressed", "compressed_", "jpg", 0),
            upscaled: ArtifactNaming::new("upscaled", "output_", "png", 6),
        }
    }
}

impl NamingTable {
    /// The naming rule for `class`.
    pub fn rule(&self, class: ArtifactClass) -> &ArtifactNaming {
        match class {
            ArtifactClass::Raw => &self.raw,
            ArtifactClass::Merged => &self.merged,
            ArtifactClass::Compressed => &self.compressed,
            ArtifactClass::Upscaled => &self.upscaled,
        }
    }

    /// Replace the naming rule for `class`.
    pub fn set_rule(&mut self, class: ArtifactClass, rule: ArtifactNaming) {
        match class {
            ArtifactClass::Raw => self.raw = rule,
            ArtifactClass::Merged => self.merged = rule,
            ArtifactClass::Compressed => self.compressed = rule,
            ArtifactClass::Upscaled => self.upscaled = rule,
        }
    }

    /// File name of frame `index` in `class`. Pure: identical arguments
    /// always produce an identical name.
    pub fn file_name(&self, class: ArtifactClass, index: u64) -> String {
        self.rule(class).file_name(index)
    }

    /// Full path of frame `index` in `class` under `workspace`.
    pub fn path(&self, workspace: &Path, class: ArtifactClass, index: u64) -> PathBuf {
        let rule = self.rule(class);
        workspace.join(&rule.directory).join(rule.file_name(index))
    }

    /// Directory holding the files of `class` under `workspace`.
    pub fn directory(&self, workspace: &Path, class: ArtifactClass) -> PathBuf {
        workspace.join(&self.rule(class).directory)
    }

    /// Full image-sequence pattern for `class` under `workspace`. Any `%` in
    /// the directory is escaped so only the frame number is substituted.
    pub fn sequence_pattern(&self, workspace: &Path, class: ArtifactClass) -> PathBuf {
        let directory = self.directory(workspace, class);
        let directory = match directory.to_str() {
            Some(text) if text.contains('%') => PathBuf::from(escape_percent(text)),
            _ => directory,
        };
        directory.join(self.rule(class).sequence_pattern())
    }

    pub(crate) fn validate(&self) -> Result<(), StitchError> {
        for class in ArtifactClass::ALL {
            let rule = self.rule(class);
            if rule.prefix.is_empty() && rule.width == 0 {
                return Err(StitchError::Configuration(format!(
                    "{class} frames need a prefix or a fixed width"
                )));
            }
            if rule.extension().is_empty() {
                return Err(StitchError::Configuration(format!(
                    "{class} frames need a file extension"
                )));
            }
        }
        Ok(())
    }
}

fn escape_percent(text: &str) -> String {
    text.replace('%', "%%")
}
