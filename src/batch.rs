//! Batch fingerprinting and all-pairs comparison.
//!
//! Generating fingerprints for many videos and comparing every pair of a set
//! of sequences are both embarrassingly parallel: each unit of work touches
//! only its own inputs. With the `rayon` feature (on by default) the work is
//! spread over the rayon thread pool; without it, it runs sequentially with
//! identical results.
//!
//! Failures are isolated per item. One unreadable video or corrupt sidecar
//! yields an `Err` in its own slot and the rest of the batch continues.

use std::{
    path::{Path, PathBuf},
    sync::Mutex,
    time::Instant,
};

#[cfg(feature = "rayon")]
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use walkdir::WalkDir;

use crate::{
    aligner::{MatchResult, SequenceAligner},
    configuration::{BatchOptions, GenerateOptions},
    decoder::FfmpegFrameSource,
    error::VhashError,
    fingerprint::{Fingerprint, FingerprintSequence},
    progress::OperationType,
    store::{self, CacheStatus, FingerprintStore},
};

/// Return the cached sequence of a video, decoding it with FFmpeg and writing
/// a sidecar on a cache miss.
pub fn fingerprint_video<P: AsRef<Path>>(
    video: P,
    store: &FingerprintStore,
    options: &GenerateOptions,
) -> Result<(FingerprintSequence, CacheStatus), VhashError> {
    store.load_or_generate(video, options, |path, options| {
        FfmpegFrameSource::open(path, options)
    })
}

/// Resolve one `match` input to a sequence.
///
/// Sidecar paths are loaded directly and must exist; any other path is
/// treated as a video and goes through [`fingerprint_video`].
pub fn resolve_sequence<P: AsRef<Path>>(
    path: P,
    store: &FingerprintStore,
    options: &GenerateOptions,
) -> Result<FingerprintSequence, VhashError> {
    let path = path.as_ref();
    if store::is_sidecar(path) {
        return match store.load(path)? {
            Some(record) => Ok(record.fingerprints),
            None => Err(VhashError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("sidecar not found: {}", path.display()),
            ))),
        };
    }
    fingerprint_video(path, store, options).map(|(sequence, _)| sequence)
}

/// List the sidecars directly inside `directory`, sorted by path.
pub fn collect_sidecars<P: AsRef<Path>>(directory: P) -> Result<Vec<PathBuf>, VhashError> {
    let mut sidecars = Vec::new();
    for entry in WalkDir::new(directory.as_ref()).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|error| {
            VhashError::Io(
                error
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
            )
        })?;
        if entry.file_type().is_file() && store::is_sidecar(entry.path()) {
            sidecars.push(entry.into_path());
        }
    }
    sidecars.sort();
    Ok(sidecars)
}

/// Fingerprint every video in `videos`, one independent result per input in
/// input order.
pub fn generate_all(
    videos: &[PathBuf],
    store: &FingerprintStore,
    options: &GenerateOptions,
) -> Vec<Result<(FingerprintSequence, CacheStatus), VhashError>> {
    log::info!("Fingerprinting {} video(s)", videos.len());

    let tracker = Mutex::new(
        options
            .monitor
            .tracker(OperationType::BatchGeneration, Some(videos.len() as u64)),
    );

    #[cfg(feature = "rayon")]
    let work = videos.into_par_iter();
    #[cfg(not(feature = "rayon"))]
    let work = videos.iter();

    let results: Vec<_> = work
        .map(|video| {
            let result = if options.monitor.is_cancelled() {
                Err(VhashError::Cancelled)
            } else {
                fingerprint_video(video, store, options)
            };
            if let Err(error) = &result {
                log::debug!("Fingerprinting {} failed: {error}", video.display());
            }
            if let Ok(mut tracker) = tracker.lock() {
                tracker.advance();
            }
            result
        })
        .collect();

    if let Ok(mut tracker) = tracker.lock() {
        tracker.finish();
    }
    results
}

/// Outcome of one pair in [`compare_all`].
#[derive(Debug, Clone, PartialEq)]
pub enum PairOutcome {
    /// The pair was aligned.
    Compared(MatchResult),
    /// The deadline expired or the sweep was cancelled before the pair
    /// started.
    Skipped,
}

/// One pair of the all-pairs sweep, by index into the input slice.
#[derive(Debug, Clone, PartialEq)]
pub struct PairComparison {
    /// Index of the first sequence.
    pub first: usize,
    /// Index of the second sequence (always greater than `first`).
    pub second: usize,
    /// Result for this pair.
    pub outcome: PairOutcome,
}

/// Every unordered pair `(i, j)` with `i < j < count`, in lexicographic
/// order.
pub fn pair_indices(count: usize) -> Vec<(usize, usize)> {
    (0..count)
        .flat_map(|first| (first + 1..count).map(move |second| (first, second)))
        .collect()
}

/// Compare every pair of `sequences`.
///
/// Results come back in [`pair_indices`] order. When the options carry a
/// deadline or cancellation token, pairs that had not started when it fired
/// are reported as [`PairOutcome::Skipped`]; a pair already being aligned
/// always finishes.
pub fn compare_all<S>(
    sequences: &[S],
    aligner: &SequenceAligner,
    options: &BatchOptions,
) -> Vec<PairComparison>
where
    S: AsRef<[Fingerprint]> + Sync,
{
    let pairs = pair_indices(sequences.len());
    let started = Instant::now();

    log::info!(
        "Comparing {} sequence(s), {} pair(s)",
        sequences.len(),
        pairs.len()
    );

    let tracker = Mutex::new(
        options
            .monitor
            .tracker(OperationType::PairwiseComparison, Some(pairs.len() as u64)),
    );

    let out_of_budget = || {
        options.monitor.is_cancelled()
            || options
                .deadline
                .is_some_and(|deadline| started.elapsed() >= deadline)
    };

    #[cfg(feature = "rayon")]
    let work = pairs.into_par_iter();
    #[cfg(not(feature = "rayon"))]
    let work = pairs.into_iter();

    let comparisons: Vec<PairComparison> = work
        .map(|(first, second)| {
            let outcome = if out_of_budget() {
                PairOutcome::Skipped
            } else {
                PairOutcome::Compared(
                    aligner.align(sequences[first].as_ref(), sequences[second].as_ref()),
                )
            };
            if let Ok(mut tracker) = tracker.lock() {
                tracker.advance();
            }
            PairComparison {
                first,
                second,
                outcome,
            }
        })
        .collect();

    if let Ok(mut tracker) = tracker.lock() {
        tracker.finish();
    }

    let skipped = comparisons
        .iter()
        .filter(|comparison| comparison.outcome == PairOutcome::Skipped)
        .count();
    if skipped > 0 {
        log::warn!("{skipped} pair(s) skipped: comparison budget exhausted");
    }

    comparisons
}
