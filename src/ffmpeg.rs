//! FFmpeg library setup.
//!
//! The in-process backend links FFmpeg's libraries, which keep their own
//! console logging separate from the Rust [`log`](https://crates.io/crates/log)
//! facade. [`FfmpegLogLevel`] lets callers quieten that output without
//! depending on `ffmpeg-next` directly.

use std::{path::Path, str::FromStr};

use ffmpeg_next::util::log::Level;

use crate::error::StitchError;

/// FFmpeg's internal log verbosity, from silent to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// Print nothing.
    Quiet,
    /// Only unrecoverable errors.
    Fatal,
    /// Recoverable errors.
    Error,
    /// Warnings (FFmpeg's default).
    Warning,
    /// Informational messages.
    Info,
    /// Debugging output.
    Debug,
}

impl FfmpegLogLevel {
    fn to_ffmpeg_level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Debug => Level::Debug,
        }
    }
}

impl FromStr for FfmpegLogLevel {
    type Err = StitchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "quiet" => Ok(FfmpegLogLevel::Quiet),
            "fatal" | "panic" => Ok(FfmpegLogLevel::Fatal),
            "error" => Ok(FfmpegLogLevel::Error),
            "warning" | "warn" => Ok(FfmpegLogLevel::Warning),
            "info" | "verbose" => Ok(FfmpegLogLevel::Info),
            "debug" | "trace" => Ok(FfmpegLogLevel::Debug),
            other => Err(StitchError::Configuration(format!(
                "unknown FFmpeg log level: {other}"
            ))),
        }
    }
}

/// Set FFmpeg's own console log level. Does not affect `log` output.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}

/// Initialise FFmpeg, attributing a failure to `path`. Safe to call
/// repeatedly.
pub(crate) fn initialise(path: &Path) -> Result<(), StitchError> {
    ffmpeg_next::init().map_err(|error| StitchError::FileOpen {
        path: path.to_path_buf(),
        reason: format!("FFmpeg initialisation failed: {error}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_levels_and_aliases() {
        assert_eq!("QUIET".parse::<FfmpegLogLevel>().unwrap(), FfmpegLogLevel::Quiet);
        assert_eq!("warn".parse::<FfmpegLogLevel>().unwrap(), FfmpegLogLevel::Warning);
        assert_eq!("trace".parse::<FfmpegLogLevel>().unwrap(), FfmpegLogLevel::Debug);
        assert!("loud".parse::<FfmpegLogLevel>().is_err());
    }
}
