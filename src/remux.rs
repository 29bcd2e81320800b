//! Container-level splicing and track remuxing.
//!
//! Both operations copy packets without re-encoding, the equivalent of
//! `ffmpeg -f concat -c copy` and `ffmpeg -i video -i source -map ... -c copy`.
//!
//! # Example
//!
//! ```no_run
//! use framestitch::{Concatenator, TrackRemuxer};
//!
//! Concatenator::new(vec!["encoded_0.mkv", "encoded_1.mkv"]).run("nosound.mkv")?;
//! TrackRemuxer::new("nosound.mkv", "input.mkv")?.run("finished.mkv")?;
//! # Ok::<(), framestitch::StitchError>(())
//! ```

use std::path::{Path, PathBuf};

use ffmpeg_next::{
    Packet, Rational,
    codec::Id,
    format::context::{Input, Output},
    media::Type,
};

use crate::error::StitchError;

/// Joins video segments end to end into one video-only file.
///
/// Only the best video stream of each segment is copied. Timestamps of each
/// segment are shifted to start where the previous segment ended.
pub struct Concatenator {
    segments: Vec<PathBuf>,
}

impl Concatenator {
    /// Create a concatenator over `segments`, in order.
    pub fn new<P: AsRef<Path>>(segments: impl IntoIterator<Item = P>) -> Self {
        Self {
            segments: segments
                .into_iter()
                .map(|segment| segment.as_ref().to_path_buf())
                .collect(),
        }
    }

    /// Write the spliced stream to `destination`.
    ///
    /// # Errors
    ///
    /// - [`StitchError::Concatenation`] if there are no segments or a segment
    ///   has no video stream.
    /// - [`StitchError::FileOpen`] if a segment or the output cannot be opened.
    /// - [`StitchError::Ffmpeg`] if packet writing fails.
    pub fn run<P: AsRef<Path>>(&self, destination: P) -> Result<(), StitchError> {
        let destination = destination.as_ref();
        let Some(first_segment) = self.segments.first() else {
            return Err(StitchError::Concatenation("no segments to join".to_string()));
        };

        crate::ffmpeg::initialise(first_segment)?;
        log::info!(
            "Joining {} segments into {}",
            self.segments.len(),
            destination.display()
        );

        let mut output_context = open_output(destination)?;

        {
            let first_input = open_input(first_segment)?;
            let stream = first_input
                .streams()
                .best(Type::Video)
                .ok_or_else(|| no_video(first_segment))?;
            let mut out_stream = output_context.add_stream(ffmpeg_next::encoder::find(Id::None))?;
            out_stream.set_parameters(stream.parameters());
            // Let the muxer pick its own codec tag.
            unsafe {
                (*out_stream.parameters().as_mut_ptr()).codec_tag = 0;
            }
        }

        output_context.write_header()?;
        let output_time_base = stream_time_base(&output_context, 0)?;

        let mut offset: i64 = 0;
        let mut last_dts: Option<i64> = None;

        for segment in &self.segments {
            let mut input = open_input(segment)?;
            let video_index = input
                .streams()
                .best(Type::Video)
                .map(|stream| stream.index())
                .ok_or_else(|| no_video(segment))?;

            let mut segment_end = offset;
            let mut packet_count = 0u64;

            for (stream, mut packet) in input.packets() {
                if stream.index() != video_index {
                    continue;
                }
                packet.rescale_ts(stream.time_base(), output_time_base);

                let pts = packet.pts().map(|pts| pts + offset);
                let mut dts = packet.dts().map(|dts| dts + offset);
                // Decode order must stay strictly increasing across the splice.
                if let (Some(current), Some(previous)) = (dts, last_dts) {
                    if current <= previous {
                        dts = Some(previous + 1);
                    }
                }
                packet.set_pts(pts);
                packet.set_dts(dts);
                last_dts = dts.or(last_dts);

                if let Some(pts) = pts {
                    segment_end = segment_end.max(pts + packet.duration().max(0));
                }

                packet.set_stream(0);
                packet.set_position(-1);
                packet.write_interleaved(&mut output_context)?;
                packet_count += 1;
            }

            log::debug!(
                "Copied {packet_count} packets from {} at offset {offset}",
                segment.display()
            );
            offset = segment_end;
        }

        output_context.write_trailer()?;
        Ok(())
    }
}

/// Puts a new video stream together with the audio and subtitle tracks of
/// the original source file.
///
/// The video comes from the best video stream of `video`; every audio and
/// subtitle stream of `source` is copied unless excluded. Packets from the
/// two inputs are interleaved by timestamp.
pub struct TrackRemuxer {
    video_path: PathBuf,
    source_path: PathBuf,
    copy_audio: bool,
    copy_subtitles: bool,
}

impl TrackRemuxer {
    /// Create a remuxer.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::FileOpen`] if either input does not exist.
    pub fn new<P1: AsRef<Path>, P2: AsRef<Path>>(
        video: P1,
        source: P2,
    ) -> Result<Self, StitchError> {
        let video_path = video.as_ref().to_path_buf();
        let source_path = source.as_ref().to_path_buf();

        crate::ffmpeg::initialise(&video_path)?;

        for path in [&video_path, &source_path] {
            if !path.exists() {
                return Err(StitchError::FileOpen {
                    path: path.clone(),
                    reason: "File does not exist".to_string(),
                });
            }
        }

        Ok(Self {
            video_path,
            source_path,
            copy_audio: true,
            copy_subtitles: true,
        })
    }

    /// Do not copy the source's audio tracks.
    #[must_use]
    pub fn exclude_audio(mut self) -> Self {
        self.copy_audio = false;
        self
    }

    /// Do not copy the source's subtitle tracks.
    #[must_use]
    pub fn exclude_subtitles(mut self) -> Self {
        self.copy_subtitles = false;
        self
    }

    /// Write the combined file to `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::Remux`] if the video input has no video stream,
    /// [`StitchError::FileOpen`] if a file cannot be opened, or
    /// [`StitchError::Ffmpeg`] if writing fails.
    pub fn run<P: AsRef<Path>>(&self, destination: P) -> Result<(), StitchError> {
        let destination = destination.as_ref();
        log::info!(
            "Remuxing {} with tracks from {} into {}",
            self.video_path.display(),
            self.source_path.display(),
            destination.display()
        );

        let mut video_input = open_input(&self.video_path)?;
        let mut source_input = open_input(&self.source_path)?;
        let mut output_context = open_output(destination)?;

        let mut next_output = 0usize;
        let video_map = map_streams(&video_input, &mut output_context, &mut next_output, |medium| {
            medium == Type::Video
        })?;
        if video_map.iter().all(Option::is_none) {
            return Err(StitchError::Remux(format!(
                "{} has no video stream",
                self.video_path.display()
            )));
        }
        let source_map = map_streams(&source_input, &mut output_context, &mut next_output, |medium| {
            (medium == Type::Audio && self.copy_audio)
                || (medium == Type::Subtitle && self.copy_subtitles)
        })?;

        output_context.write_header()?;
        let output_time_bases = (0..next_output)
            .map(|index| stream_time_base(&output_context, index))
            .collect::<Result<Vec<_>, _>>()?;

        let mut video_packets = video_input.packets().peekable();
        let mut source_packets = source_input.packets().peekable();

        loop {
            let take_video = match (video_packets.peek(), source_packets.peek()) {
                (None, None) => break,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (Some((video_stream, video_packet)), Some((source_stream, source_packet))) => {
                    packet_seconds(video_packet, video_stream.time_base())
                        <= packet_seconds(source_packet, source_stream.time_base())
                }
            };

            let (next, map) = if take_video {
                (video_packets.next(), &video_map)
            } else {
                (source_packets.next(), &source_map)
            };
            let Some((stream, mut packet)) = next else {
                break;
            };
            let Some(output_index) = map.get(stream.index()).copied().flatten() else {
                continue;
            };

            packet.set_stream(output_index);
            packet.rescale_ts(stream.time_base(), output_time_bases[output_index]);
            packet.set_position(-1);
            packet.write_interleaved(&mut output_context)?;
        }

        output_context.write_trailer()?;
        Ok(())
    }
}

/// Add an output stream for every input stream `include` accepts and return
/// the input-index to output-index mapping.
fn map_streams(
    input: &Input,
    output: &mut Output,
    next_output: &mut usize,
    include: impl Fn(Type) -> bool,
) -> Result<Vec<Option<usize>>, StitchError> {
    let mut stream_map = Vec::new();
    for stream in input.streams() {
        if !include(stream.parameters().medium()) {
            stream_map.push(None);
            continue;
        }
        let mut out_stream = output.add_stream(ffmpeg_next::encoder::find(Id::None))?;
        out_stream.set_parameters(stream.parameters());
        unsafe {
            (*out_stream.parameters().as_mut_ptr()).codec_tag = 0;
        }
        stream_map.push(Some(*next_output));
        *next_output += 1;
    }
    Ok(stream_map)
}

fn packet_seconds(packet: &Packet, time_base: Rational) -> f64 {
    let timestamp = packet.dts().or(packet.pts()).unwrap_or(0);
    timestamp as f64 * f64::from(time_base)
}

fn stream_time_base(
    output: &Output,
    index: usize,
) -> Result<Rational, StitchError> {
    output
        .stream(index)
        .map(|stream| stream.time_base())
        .ok_or_else(|| StitchError::Ffmpeg(format!("output stream {index} missing")))
}

fn open_input(path: &Path) -> Result<Input, StitchError> {
    ffmpeg_next::format::input(&path).map_err(|error| StitchError::FileOpen {
        path: path.to_path_buf(),
        reason: error.to_string(),
    })
}

fn open_output(path: &Path) -> Result<Output, StitchError> {
    ffmpeg_next::format::output(&path).map_err(|error| StitchError::FileOpen {
        path: path.to_path_buf(),
        reason: format!("Failed to create output: {error}"),
    })
}

fn no_video(path: &Path) -> StitchError {
    StitchError::Concatenation(format!("{} has no video stream", path.display()))
}
