//! FFmpeg-backed [`FrameSource`].
//!
//! [`FfmpegFrameSource`] opens a media file, selects its best video stream and
//! decodes frames in order. Frames that the generator keeps are scaled to
//! 8-bit grayscale by libswscale; skipped frames are decoded but never
//! converted, which is where most of the time would otherwise go.

use std::path::{Path, PathBuf};

use ffmpeg_next::{
    Error as FfmpegError, Packet,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::{DynamicImage, GrayImage};

use crate::{configuration::GenerateOptions, error::VhashError, generator::FrameSource};

/// Consecutive unreadable packets tolerated before decoding gives up.
const MAX_CONSECUTIVE_READ_ERRORS: u32 = 64;

/// Sequential frame decoder over one media file.
///
/// # Example
///
/// ```no_run
/// use vhash::{FfmpegFrameSource, GenerateOptions, VhashError};
///
/// let options = GenerateOptions::new().with_decode_resolution(64, 64);
/// let mut source = FfmpegFrameSource::open("input.mp4", &options)?;
/// let sequence = vhash::generate(&mut source, &options)?;
/// println!("{} fingerprints", sequence.len());
/// # Ok::<(), VhashError>(())
/// ```
pub struct FfmpegFrameSource {
    input_context: Input,
    decoder: VideoDecoder,
    video_stream_index: usize,
    frames_per_second: Option<f64>,
    decode_resolution: Option<(u32, u32)>,
    scaler: Option<Scaler>,
    decoded_frame: VideoFrame,
    scaled_frame: VideoFrame,
    eof_sent: bool,
    file_path: PathBuf,
}

/// A scaling context plus the input geometry it was built for.
struct Scaler {
    context: ScalingContext,
    source: (Pixel, u32, u32),
    target: (u32, u32),
}

impl FfmpegFrameSource {
    /// Open a video for sequential decoding.
    ///
    /// Initializes FFmpeg (idempotent), opens the file and prepares a decoder
    /// for its best video stream.
    ///
    /// # Errors
    ///
    /// Returns [`VhashError::VideoOpen`] if the file cannot be opened, has no
    /// video stream, or its codec cannot be initialized.
    pub fn open<P: AsRef<Path>>(path: P, options: &GenerateOptions) -> Result<Self, VhashError> {
        let path = path.as_ref();
        let file_path = path.to_path_buf();
        let open_error = |reason: String| VhashError::VideoOpen {
            path: file_path.clone(),
            reason,
        };

        log::debug!("Opening video: {}", path.display());

        ffmpeg_next::init()
            .map_err(|error| open_error(format!("FFmpeg initialisation failed: {error}")))?;

        let input_context =
            ffmpeg_next::format::input(&path).map_err(|error| open_error(error.to_string()))?;

        let (video_stream_index, frames_per_second, decoder) = {
            let stream = input_context
                .streams()
                .best(Type::Video)
                .ok_or_else(|| open_error("no video stream found".to_string()))?;

            let frame_rate = stream.avg_frame_rate();
            let frames_per_second = if frame_rate.denominator() != 0 && frame_rate.numerator() > 0
            {
                Some(f64::from(frame_rate))
            } else {
                let rate = stream.rate();
                if rate.denominator() != 0 && rate.numerator() > 0 {
                    Some(f64::from(rate))
                } else {
                    None
                }
            };

            let decoder_context = CodecContext::from_parameters(stream.parameters())
                .map_err(|error| open_error(format!("unreadable codec parameters: {error}")))?;
            let decoder = decoder_context
                .decoder()
                .video()
                .map_err(|error| open_error(format!("failed to create video decoder: {error}")))?;

            (stream.index(), frames_per_second, decoder)
        };

        log::debug!(
            "Video stream {} ({}x{}, {:?} fps)",
            video_stream_index,
            decoder.width(),
            decoder.height(),
            frames_per_second
        );

        Ok(Self {
            input_context,
            decoder,
            video_stream_index,
            frames_per_second,
            decode_resolution: options.decode_resolution,
            scaler: None,
            decoded_frame: VideoFrame::empty(),
            scaled_frame: VideoFrame::empty(),
            eof_sent: false,
            file_path,
        })
    }

    /// Coded width and height of the video stream.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.decoder.width(), self.decoder.height())
    }

    /// Decode until one frame is available in `decoded_frame`.
    ///
    /// Returns `false` once the decoder is drained.
    fn decode_next(&mut self) -> Result<bool, VhashError> {
        let mut consecutive_errors = 0;

        loop {
            if self.decoder.receive_frame(&mut self.decoded_frame).is_ok() {
                return Ok(true);
            }

            if self.eof_sent {
                return Ok(false);
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input_context) {
                Ok(()) => {
                    consecutive_errors = 0;
                    if packet.stream() == self.video_stream_index {
                        self.decoder.send_packet(&packet)?;
                    }
                }
                Err(FfmpegError::Eof) => {
                    self.decoder.send_eof()?;
                    self.eof_sent = true;
                }
                Err(error) => {
                    consecutive_errors += 1;
                    if consecutive_errors >= MAX_CONSECUTIVE_READ_ERRORS {
                        return Err(VhashError::Decode(format!(
                            "{} consecutive unreadable packets, last: {error}",
                            consecutive_errors
                        )));
                    }
                    log::debug!("Skipping unreadable packet: {error}");
                }
            }
        }
    }

    /// Scale the current `decoded_frame` to grayscale.
    fn convert_current_frame(&mut self) -> Result<DynamicImage, VhashError> {
        let source = (
            self.decoded_frame.format(),
            self.decoded_frame.width(),
            self.decoded_frame.height(),
        );
        if source.1 == 0 || source.2 == 0 {
            return Err(VhashError::Decode("decoded frame has no pixels".to_string()));
        }

        let rebuild = self
            .scaler
            .as_ref()
            .is_none_or(|scaler| scaler.source != source);
        if rebuild {
            let target = self.decode_resolution.unwrap_or((source.1, source.2));
            let context = ScalingContext::get(
                source.0,
                source.1,
                source.2,
                Pixel::GRAY8,
                target.0,
                target.1,
                ScalingFlags::AREA,
            )?;
            self.scaler = Some(Scaler {
                context,
                source,
                target,
            });
        }

        let Some(scaler) = self.scaler.as_mut() else {
            return Err(VhashError::Decode("scaler unavailable".to_string()));
        };
        scaler
            .context
            .run(&self.decoded_frame, &mut self.scaled_frame)?;

        let (width, height) = scaler.target;
        let buffer = frame_to_buffer(&self.scaled_frame, width, height);
        let image = GrayImage::from_raw(width, height, buffer).ok_or_else(|| {
            VhashError::Decode("Failed to construct grayscale image from decoded frame".to_string())
        })?;
        Ok(DynamicImage::ImageLuma8(image))
    }
}

impl FrameSource for FfmpegFrameSource {
    fn frames_per_second(&self) -> Option<f64> {
        self.frames_per_second
    }

    fn next_frame(&mut self) -> Result<Option<DynamicImage>, VhashError> {
        if !self.decode_next()? {
            return Ok(None);
        }
        self.convert_current_frame().map(Some)
    }

    fn skip_frame(&mut self) -> Result<bool, VhashError> {
        self.decode_next()
    }

    fn source_path(&self) -> Option<&Path> {
        Some(&self.file_path)
    }
}

/// Copy a single-plane 8-bit frame into a tightly-packed buffer, dropping the
/// per-row padding FFmpeg adds.
fn frame_to_buffer(video_frame: &VideoFrame, width: u32, height: u32) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let row_length = width as usize;
    let data = video_frame.data(0);

    if stride == row_length {
        data[..row_length * height as usize].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_length * height as usize);
        for row in 0..height as usize {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + row_length]);
        }
        buffer
    }
}
