//! Segment encoder: encode a run of image files into a video file.
//!
//! [`SegmentEncoder`] reads frames from disk one at a time, so a segment
//! never needs more than one decoded image in memory.
//!
//! # Example
//!
//! ```no_run
//! use framestitch::{SegmentEncoder, SegmentEncoderOptions, VideoCodec};
//!
//! let frames: Vec<_> = (1..=30).map(|i| format!("merged/merged_{i}.jpg")).collect();
//! SegmentEncoder::new(SegmentEncoderOptions::default().codec(VideoCodec::H264).crf(18))
//!     .write("encoded/encoded_0.mkv", &frames, 30.0)?;
//! # Ok::<(), framestitch::StitchError>(())
//! ```

use std::path::Path;

use ffmpeg_next::codec::Id;
use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::format::{Flags as FormatFlags, Pixel};
use ffmpeg_next::frame::Video as VideoFrame;
use ffmpeg_next::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use ffmpeg_next::{Dictionary, Packet, Rational};
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::error::StitchError;

/// Supported segment codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    /// H.264 / AVC.
    H264,
    /// H.265 / HEVC.
    H265,
    /// MPEG-4 Part 2.
    Mpeg4,
}

impl VideoCodec {
    fn to_codec_id(self) -> Id {
        match self {
            VideoCodec::H264 => Id::H264,
            VideoCodec::H265 => Id::HEVC,
            VideoCodec::Mpeg4 => Id::MPEG4,
        }
    }
}

/// Options for [`SegmentEncoder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentEncoderOptions {
    /// Codec to use. Default is H.264.
    pub codec: VideoCodec,
    /// Constant Rate Factor (0-51, lower is better). Default: 15.
    pub crf: Option<u32>,
    /// Bitrate in bits per second. Used when `crf` is `None`.
    pub bitrate: Option<usize>,
}

impl Default for SegmentEncoderOptions {
    fn default() -> Self {
        Self {
            codec: VideoCodec::H264,
            crf: Some(15),
            bitrate: None,
        }
    }
}

impl SegmentEncoderOptions {
    /// Set the codec.
    #[must_use]
    pub fn codec(mut self, codec: VideoCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Set the CRF quality value.
    #[must_use]
    pub fn crf(mut self, crf: u32) -> Self {
        self.crf = Some(crf);
        self
    }

    /// Use a target bitrate instead of CRF.
    #[must_use]
    pub fn bitrate(mut self, bitrate: usize) -> Self {
        self.crf = None;
        self.bitrate = Some(bitrate);
        self
    }
}

/// Encodes image files into one video segment.
#[derive(Debug, Clone)]
pub struct SegmentEncoder {
    options: SegmentEncoderOptions,
}

impl SegmentEncoder {
    /// Create an encoder with the given options.
    pub fn new(options: SegmentEncoderOptions) -> Self {
        Self { options }
    }

    /// Encode `frames` at `frame_rate` into `path`.
    ///
    /// The container is inferred from the file extension. Frames whose size
    /// differs from the first frame are resized to match it.
    ///
    /// # Errors
    ///
    /// - [`StitchError::Image`] if a frame cannot be read.
    /// - [`StitchError::Ffmpeg`] if the codec, muxer, or scaler fails.
    pub fn write<P: AsRef<Path>, F: AsRef<Path>>(
        &self,
        path: P,
        frames: &[F],
        frame_rate: f64,
    ) -> Result<(), StitchError> {
        let path = path.as_ref();
        log::debug!(
            "Encoding {} frames to {} (codec={:?}, fps={frame_rate})",
            frames.len(),
            path.display(),
            self.options.codec,
        );

        let Some(first_path) = frames.first() else {
            return Err(StitchError::Ffmpeg("no frames to encode".to_string()));
        };
        if !(frame_rate.is_finite() && frame_rate > 0.0) {
            return Err(StitchError::Configuration(format!(
                "frame rate must be positive, got {frame_rate}"
            )));
        }

        crate::ffmpeg::initialise(path)?;

        let first = image::open(first_path.as_ref())?;
        let width = first.width();
        let height = first.height();
        drop(first);

        let rate = Rational::from(frame_rate);
        let time_base = rate.invert();
        let codec_id = self.options.codec.to_codec_id();
        let target_pixel = Pixel::YUV420P;

        let mut output = ffmpeg_next::format::output(&path).map_err(|error| {
            StitchError::FileOpen {
                path: path.to_path_buf(),
                reason: format!("cannot open output: {error}"),
            }
        })?;

        // Read before add_stream borrows the context.
        let needs_global_header = output.format().flags().contains(FormatFlags::GLOBAL_HEADER);

        let encoder_codec = ffmpeg_next::encoder::find(codec_id)
            .ok_or_else(|| StitchError::Ffmpeg(format!("codec {codec_id:?} not available")))?;

        let mut stream = output.add_stream(encoder_codec)?;
        let stream_index = stream.index();

        let mut encoder = CodecContext::from_parameters(stream.parameters())?
            .encoder()
            .video()?;

        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(target_pixel);
        encoder.set_time_base(time_base);
        encoder.set_frame_rate(Some(rate));

        if let Some(bitrate) = self.options.bitrate {
            encoder.set_bit_rate(bitrate);
        }

        if needs_global_header {
            unsafe {
                (*encoder.as_mut_ptr()).flags |=
                    ffmpeg_sys_next::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
            }
        }

        let mut codec_options = Dictionary::new();
        if let Some(crf) = self.options.crf {
            codec_options.set("crf", &crf.to_string());
        }

        let mut opened_encoder = encoder
            .open_as_with(encoder_codec, codec_options)
            .map_err(|error| StitchError::Ffmpeg(format!("cannot open encoder: {error}")))?;

        stream.set_parameters(&opened_encoder);
        stream.set_time_base(time_base);

        output.write_header()?;
        let stream_time_base = output
            .stream(stream_index)
            .map(|stream| stream.time_base())
            .ok_or_else(|| StitchError::Ffmpeg("output stream disappeared".to_string()))?;

        let mut scaler = ScalingContext::get(
            Pixel::RGB24,
            width,
            height,
            target_pixel,
            width,
            height,
            ScalingFlags::BILINEAR,
        )?;

        let mut packet = Packet::empty();

        for (pts, frame_path) in frames.iter().enumerate() {
            let image = image::open(frame_path.as_ref())?;
            let rgb = if image.width() != width || image.height() != height {
                image.resize_exact(width, height, FilterType::Lanczos3).to_rgb8()
            } else {
                image.to_rgb8()
            };

            let mut source_frame = VideoFrame::new(Pixel::RGB24, width, height);
            let stride = source_frame.stride(0);
            let row_length = (width as usize) * 3;
            let destination = source_frame.data_mut(0);
            for (row, pixels) in rgb.as_raw().chunks_exact(row_length).enumerate() {
                let start = row * stride;
                destination[start..start + row_length].copy_from_slice(pixels);
            }

            let mut scaled_frame = VideoFrame::empty();
            scaler.run(&source_frame, &mut scaled_frame)?;
            scaled_frame.set_pts(Some(pts as i64));

            opened_encoder.send_frame(&scaled_frame)?;
            while opened_encoder.receive_packet(&mut packet).is_ok() {
                packet.set_stream(stream_index);
                packet.rescale_ts(time_base, stream_time_base);
                packet.write_interleaved(&mut output)?;
            }
        }

        opened_encoder.send_eof()?;
        while opened_encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(stream_index);
            packet.rescale_ts(time_base, stream_time_base);
            packet.write_interleaved(&mut output)?;
        }

        output.write_trailer()?;
        Ok(())
    }
}
