//! Fingerprint sequence generation.
//!
//! [`generate`] pulls frames from a [`FrameSource`], keeps the first frame of
//! every window of `rate` consecutive frames (where `rate` is the source's
//! nominal frame rate truncated to an integer, so roughly one sample per
//! second) and encodes each kept frame into a [`Fingerprint`].
//!
//! The decoder itself sits behind the [`FrameSource`] trait. The crate ships
//! an FFmpeg implementation in [`FfmpegFrameSource`](crate::FfmpegFrameSource);
//! tests and other callers can supply their own.

use std::path::{Path, PathBuf};

use image::DynamicImage;

use crate::{
    configuration::GenerateOptions,
    error::VhashError,
    fingerprint::{Fingerprint, FingerprintSequence},
    progress::OperationType,
};

/// A decoder that yields frames in presentation order.
pub trait FrameSource {
    /// Nominal frames per natural second, if the container reports one.
    fn frames_per_second(&self) -> Option<f64>;

    /// Decode and return the next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<DynamicImage>, VhashError>;

    /// Advance past the next frame without producing its pixels.
    ///
    /// Returns `false` at end of stream. The default decodes and discards the
    /// frame; decoders that can skip the pixel conversion should override it.
    fn skip_frame(&mut self) -> Result<bool, VhashError> {
        Ok(self.next_frame()?.is_some())
    }

    /// Path of the underlying media, used in error messages.
    fn source_path(&self) -> Option<&Path> {
        None
    }
}

/// Derive the sampling stride from a nominal frame rate.
///
/// The rate is truncated, so 29.97 fps samples every 29th frame.
///
/// # Errors
///
/// Returns [`VhashError::FingerprintGeneration`] when the rate is unknown,
/// not finite, or truncates to zero.
pub fn sampling_stride(frames_per_second: Option<f64>) -> Result<u64, VhashError> {
    let rate = frames_per_second.ok_or_else(|| {
        VhashError::FingerprintGeneration("frame rate is unknown".to_string())
    })?;

    if !rate.is_finite() || rate < 1.0 {
        return Err(VhashError::FingerprintGeneration(format!(
            "frame rate {rate} gives a sampling stride of zero"
        )));
    }

    Ok(rate as u64)
}

/// Generate the fingerprint sequence of one video.
///
/// # Errors
///
/// - [`VhashError::FingerprintGeneration`] if the frame rate is unusable.
/// - [`VhashError::EmptySequence`] if the stream yields no frames.
/// - [`VhashError::Cancelled`] if the options' token fires.
/// - Any decode error reported by the source.
pub fn generate<S: FrameSource + ?Sized>(
    source: &mut S,
    options: &GenerateOptions,
) -> Result<FingerprintSequence, VhashError> {
    let stride = sampling_stride(source.frames_per_second())?;
    let source_path: Option<PathBuf> = source.source_path().map(Path::to_path_buf);

    log::debug!(
        "Generating fingerprints (stride={}, source={:?})",
        stride,
        source_path
    );

    let mut tracker = options
        .monitor
        .tracker(OperationType::FingerprintGeneration, None);

    let mut fingerprints = Vec::new();
    let mut frame_index: u64 = 0;

    loop {
        if options.monitor.is_cancelled() {
            return Err(VhashError::Cancelled);
        }

        if frame_index % stride == 0 {
            match source.next_frame()? {
                Some(frame) => {
                    fingerprints.push(Fingerprint::from_image(&frame));
                    tracker.advance();
                }
                None => break,
            }
        } else if !source.skip_frame()? {
            break;
        }

        frame_index += 1;
    }

    tracker.finish();
    log::debug!(
        "Sampled {} fingerprint(s) from {} frame(s)",
        fingerprints.len(),
        frame_index
    );

    match source_path {
        Some(path) => FingerprintSequence::for_source(fingerprints, &path),
        None => FingerprintSequence::new(fingerprints),
    }
}
