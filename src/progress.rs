//! Progress reporting and cooperative cancellation.
//!
//! Long operations (decoding a video, fingerprinting a directory, comparing
//! every pair of a library) count finished items and hand a [`ProgressInfo`]
//! snapshot to a user-supplied [`ProgressCallback`] every few items. A
//! [`CancellationToken`] shared with the operation asks it to stop at its next
//! checkpoint.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use vhash::{FfmpegFrameSource, GenerateOptions, ProgressCallback, ProgressInfo, VhashError};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("[{:?}] {} item(s) done", info.operation, info.current);
//!     }
//! }
//!
//! let options = GenerateOptions::new().with_progress(Arc::new(PrintProgress));
//! let mut source = FfmpegFrameSource::open("input.mp4", &options)?;
//! let sequence = vhash::generate(&mut source, &options)?;
//! # Ok::<(), VhashError>(())
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

/// What the reported items are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationType {
    /// Sampled frames of one video.
    FingerprintGeneration,
    /// Videos of a batch.
    BatchGeneration,
    /// Pairs of an all-pairs comparison.
    PairwiseComparison,
}

/// Point-in-time view of an operation.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Kind of operation reporting.
    pub operation: OperationType,
    /// Items finished so far.
    pub current: u64,
    /// Items expected in total. `None` while decoding, since the number of
    /// sampled frames is only known at the end of the stream.
    pub total: Option<u64>,
    /// `current / total` as a percentage, when `total` is known and non-zero.
    pub percentage: Option<f32>,
    /// Time since the operation started.
    pub elapsed: Duration,
    /// Linear extrapolation of the time left, when `total` is known.
    pub estimated_remaining: Option<Duration>,
}

impl ProgressInfo {
    fn snapshot(
        operation: OperationType,
        current: u64,
        total: Option<u64>,
        elapsed: Duration,
    ) -> Self {
        let percentage = total
            .filter(|&total| total > 0)
            .map(|total| current as f32 / total as f32 * 100.0);
        let estimated_remaining = total.filter(|_| current > 0).map(|total| {
            let left = total.saturating_sub(current);
            elapsed.mul_f64(left as f64 / current as f64)
        });

        Self {
            operation,
            current,
            total,
            percentage,
            elapsed,
            estimated_remaining,
        }
    }
}

/// Receiver of progress snapshots.
///
/// Batch operations call it from worker threads, hence the `Send + Sync`
/// bound. A callback only observes; stopping work is the job of
/// [`CancellationToken`].
pub trait ProgressCallback: Send + Sync {
    /// Called with each snapshot.
    fn on_progress(&self, info: &ProgressInfo);
}

struct Silent;

impl ProgressCallback for Silent {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Shared flag asking an operation to stop.
///
/// Clones observe the same flag, so a token can be handed to the operation
/// and cancelled from another thread.
///
/// ```
/// use vhash::CancellationToken;
///
/// let token = CancellationToken::new();
/// let handle = token.clone();
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder of this token to stop.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether [`cancel`](CancellationToken::cancel) has been called on any
    /// clone.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Callback, token and reporting interval shared by the option builders.
#[derive(Clone)]
pub(crate) struct Monitor {
    pub(crate) callback: Arc<dyn ProgressCallback>,
    pub(crate) cancellation: Option<CancellationToken>,
    pub(crate) interval: u64,
}

impl Default for Monitor {
    fn default() -> Self {
        Self {
            callback: Arc::new(Silent),
            cancellation: None,
            interval: 1,
        }
    }
}

impl Monitor {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    pub(crate) fn tracker(&self, operation: OperationType, total: Option<u64>) -> ProgressTracker {
        ProgressTracker {
            callback: Arc::clone(&self.callback),
            operation,
            total,
            interval: self.interval.max(1),
            started: Instant::now(),
            current: 0,
            pending: 0,
        }
    }
}

/// Counts finished items of one operation and reports every `interval`.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    operation: OperationType,
    total: Option<u64>,
    interval: u64,
    started: Instant,
    current: u64,
    pending: u64,
}

impl ProgressTracker {
    pub(crate) fn advance(&mut self) {
        self.current += 1;
        self.pending += 1;
        if self.pending == self.interval {
            self.pending = 0;
            self.report();
        }
    }

    /// Emit a last snapshot regardless of the interval.
    pub(crate) fn finish(&mut self) {
        self.pending = 0;
        self.report();
    }

    fn report(&self) {
        let info = ProgressInfo::snapshot(
            self.operation,
            self.current,
            self.total,
            self.started.elapsed(),
        );
        self.callback.on_progress(&info);
    }
}
