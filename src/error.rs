//! Error types for the `vhash` crate.
//!
//! This module defines [`VhashError`], the unified error type returned by all
//! fallible operations in the crate. Errors carry enough context (paths,
//! reasons, upstream messages) that batch callers can report a failed item
//! and move on without additional logging at the call site.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

/// The unified error type for all `vhash` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VhashError {
    /// The video could not be opened or has no decodable video stream.
    ///
    /// Usually means the file is not a video at all.
    #[error("Failed to open video at {path}: {reason}")]
    VideoOpen {
        /// Path that was passed to the decoder.
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// Decoding succeeded but produced no usable samples.
    #[error("No fingerprints could be sampled{}", path_suffix(.path))]
    EmptySequence {
        /// Source video, when known.
        path: Option<PathBuf>,
    },

    /// The sampling cadence could not be derived, e.g. a frame rate of zero.
    #[error("Fingerprint generation failed: {0}")]
    FingerprintGeneration(String),

    /// A sidecar exists but cannot be deserialized.
    #[error("Corrupt fingerprint cache at {path}: {reason}")]
    CacheCorrupt {
        /// Path of the offending sidecar.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// Invalid parameters were passed to the sequence aligner.
    #[error("Invalid alignment input: {0}")]
    AlignmentInput(String),

    /// A video frame could not be decoded.
    #[error("Failed to decode video frame: {0}")]
    Decode(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// An error from the `image` crate during frame conversion.
    #[error("Image processing error: {0}")]
    Image(#[from] ImageError),

    /// The operation was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,
}

impl From<FfmpegError> for VhashError {
    fn from(error: FfmpegError) -> Self {
        VhashError::Ffmpeg(error.to_string())
    }
}

fn path_suffix(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" from {}", path.display()),
        None => String::new(),
    }
}
