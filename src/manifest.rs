//! The concat manifest.
//!
//! [`ConcatManifest`] is the ordered list of finished segment files, kept on
//! disk in the syntax of FFmpeg's concat demuxer:
//!
//! ```text
//! file '/work/encoded/encoded_0.mkv'
//! file '/work/encoded/encoded_1.mkv'
//! ```
//!
//! The file is only ever appended to. On restart the existing entries are
//! loaded so that segments already listed are not listed twice.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::error::StitchError;

/// Append-only, ordered list of segment paths.
#[derive(Debug)]
pub struct ConcatManifest {
    path: PathBuf,
    entries: Vec<PathBuf>,
}

impl ConcatManifest {
    /// Open the manifest at `path`, loading any entries already written.
    ///
    /// # Errors
    ///
    /// An unterminated last line left by an interrupted append is dropped
    /// and cut from the file; the segment it named is recorded again.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::Manifest`] if a complete line is not a
    /// `file '...'` directive, or [`StitchError::Io`] if reading fails.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StitchError> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            let complete = repair_torn_tail(&path, &contents)?;
            parse_manifest(&contents[..complete])?
        } else {
            Vec::new()
        };

        log::debug!(
            "Opened manifest {} with {} existing entries",
            path.display(),
            entries.len()
        );
        Ok(Self { path, entries })
    }

    /// Location of the manifest file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Segment paths in the order they were recorded.
    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    /// Number of recorded segments.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no segment has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record `segment` as entry number `position`.
    ///
    /// Appends when `position` is the next free slot. When the slot is
    /// already filled with the same path (a restarted run) nothing is
    /// written. Returns whether a line was appended.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::Manifest`] if `position` would leave a gap or
    /// the slot already holds a different path.
    pub fn record(&mut self, position: usize, segment: &Path) -> Result<bool, StitchError> {
        match position.cmp(&self.entries.len()) {
            std::cmp::Ordering::Less => {
                let existing = &self.entries[position];
                if existing == segment {
                    Ok(false)
                } else {
                    Err(StitchError::Manifest(format!(
                        "entry {position} is {} but {} was expected",
                        existing.display(),
                        segment.display()
                    )))
                }
            }
            std::cmp::Ordering::Equal => {
                self.append(segment)?;
                Ok(true)
            }
            std::cmp::Ordering::Greater => Err(StitchError::Manifest(format!(
                "cannot record entry {position}: only {} entries present",
                self.entries.len()
            ))),
        }
    }

    fn append(&mut self, segment: &Path) -> Result<(), StitchError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", format_line(segment))?;
        file.sync_data()?;

        self.entries.push(segment.to_path_buf());
        Ok(())
    }
}

/// Cut an unterminated last line from the manifest file and return the
/// length of the intact prefix of `contents`.
fn repair_torn_tail(path: &Path, contents: &str) -> Result<usize, StitchError> {
    let complete = contents.rfind('\n').map_or(0, |newline| newline + 1);
    let tail = &contents[complete..];
    if tail.trim().is_empty() {
        return Ok(contents.len());
    }

    log::warn!(
        "Dropping unterminated last line of {}: {}",
        path.display(),
        tail.trim()
    );
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(complete as u64)?;
    file.sync_data()?;
    Ok(complete)
}

/// Render one `file '...'` line, escaping single quotes the way the concat
/// demuxer expects.
pub(crate) fn format_line(segment: &Path) -> String {
    let escaped = segment.to_string_lossy().replace('\'', r"'\''");
    format!("file '{escaped}'")
}

fn parse_manifest(contents: &str) -> Result<Vec<PathBuf>, StitchError> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(parse_line)
        .collect()
}

fn parse_line(line: &str) -> Result<PathBuf, StitchError> {
    let quoted = line
        .strip_prefix("file")
        .map(str::trim_start)
        .ok_or_else(|| StitchError::Manifest(format!("unexpected line: {line}")))?;

    let inner = quoted
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
        .ok_or_else(|| StitchError::Manifest(format!("unquoted path: {line}")))?;

    Ok(PathBuf::from(inner.replace(r"'\''", "'")))
}
