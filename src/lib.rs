//! # vhash
//!
//! Near-duplicate video detection. Each video is reduced to a temporally
//! ordered sequence of 64-bit perceptual fingerprints (about one per second),
//! and two sequences are compared with an alignment ratio that tolerates
//! re-encoding, trimming and frame-rate jitter.
//!
//! Decoding is done by FFmpeg through
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next); sequences are cached
//! in small compressed sidecar files next to the videos.
//!
//! ## Quick Start
//!
//! ### Fingerprint a Video
//!
//! ```no_run
//! use vhash::{FingerprintStore, GenerateOptions};
//!
//! let store = FingerprintStore::new();
//! let (sequence, status) =
//!     vhash::fingerprint_video("input.mp4", &store, &GenerateOptions::new()).unwrap();
//! println!("{} fingerprints ({status:?})", sequence.len());
//! ```
//!
//! ### Compare Two Videos
//!
//! ```no_run
//! use vhash::{FingerprintStore, GenerateOptions, MatchConfig, SequenceAligner};
//!
//! let store = FingerprintStore::new();
//! let options = GenerateOptions::new();
//! let (a, _) = vhash::fingerprint_video("original.mp4", &store, &options).unwrap();
//! let (b, _) = vhash::fingerprint_video("reupload.mkv", &store, &options).unwrap();
//!
//! let aligner = SequenceAligner::new(MatchConfig::default()).unwrap();
//! let result = aligner.align(&a, &b);
//! println!("{}: {result}", vhash::classify(result.ratio));
//! ```
//!
//! ### Compare Sequences Directly
//!
//! ```
//! use vhash::{FingerprintSequence, MatchConfig, Similarity};
//!
//! let a = FingerprintSequence::from_bits([0x0, 0x1])?;
//! let b = FingerprintSequence::from_bits([0x0, 0x1])?;
//! let result = vhash::align(&a, &b, MatchConfig::default())?;
//! assert_eq!(result.ratio, 1.0);
//! assert_eq!(vhash::classify(result.ratio), Similarity::VeryHigh);
//! # Ok::<(), vhash::VhashError>(())
//! ```
//!
//! ## Features
//!
//! - **Average-hash fingerprints**: 8×8 luma grid thresholded at its mean
//! - **Tolerant alignment**: longest-block alignment under a Hamming
//!   tolerance, with strict (8 bits) and loose (15 bits) profiles
//! - **Sidecar cache**: versioned, gzip-compressed, published atomically and
//!   never overwritten
//! - **Batch operations**: parallel generation and all-pairs comparison with
//!   deadlines and cancellation
//! - **Progress & cancellation**: cooperative callbacks and
//!   `CancellationToken`
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `rayon` | Parallel batch generation and comparison (default) |
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

pub mod aligner;
pub mod batch;
pub mod bits;
pub mod classifier;
pub mod configuration;
pub mod decoder;
pub mod error;
pub mod ffmpeg;
pub mod fingerprint;
pub mod generator;
pub mod progress;
pub mod store;

pub use aligner::{
    MAX_TOLERANCE, MatchConfig, MatchProfile, MatchResult, MatchingBlock, RatioConvention,
    SequenceAligner, align, coverage,
};
pub use batch::{
    PairComparison, PairOutcome, collect_sidecars, compare_all, fingerprint_video, generate_all,
    pair_indices, resolve_sequence,
};
pub use bits::{hamming_distance, popcount};
pub use classifier::{Similarity, Thresholds, classify};
pub use configuration::{BatchOptions, GenerateOptions};
pub use decoder::FfmpegFrameSource;
pub use error::VhashError;
pub use ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
pub use fingerprint::{Fingerprint, FingerprintSequence, GRID_SIZE};
pub use generator::{FrameSource, generate, sampling_stride};
pub use progress::{CancellationToken, OperationType, ProgressCallback, ProgressInfo};
pub use store::{
    CacheStatus, FingerprintStore, SIDECAR_EXTENSION, SaveOutcome, SidecarRecord, SourceStamp,
    is_sidecar, sidecar_path,
};
