//! Operational settings.
//!
//! [`GenerateOptions`] threads progress callbacks, cancellation tokens, and
//! decoder tuning through fingerprint generation; [`BatchOptions`] does the
//! same for the all-pairs comparison sweep, adding a deadline. Both are
//! builders so new settings do not change existing function signatures.
//!
//! Matching parameters live in [`MatchConfig`](crate::MatchConfig) and
//! category thresholds in [`Thresholds`](crate::Thresholds).
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use vhash::{BatchOptions, CancellationToken, GenerateOptions};
//!
//! let token = CancellationToken::new();
//! let generate = GenerateOptions::new()
//!     .with_cancellation(token.clone())
//!     .with_decode_resolution(64, 36);
//! let batch = BatchOptions::new()
//!     .with_cancellation(token)
//!     .with_deadline(Duration::from_secs(30));
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
    time::Duration,
};

use crate::progress::{CancellationToken, Monitor, ProgressCallback};

/// Settings for decoding a video and fingerprinting its frames.
///
/// The defaults decode at source resolution, report nothing and cannot be
/// cancelled.
#[derive(Clone, Default)]
pub struct GenerateOptions {
    pub(crate) monitor: Monitor,
    /// Decoder output size; `None` keeps the source size.
    pub(crate) decode_resolution: Option<(u32, u32)>,
}

impl Debug for GenerateOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("GenerateOptions")
            .field("cancellable", &self.monitor.cancellation.is_some())
            .field("progress_interval", &self.monitor.interval)
            .field("decode_resolution", &self.decode_resolution)
            .finish_non_exhaustive()
    }
}

impl GenerateOptions {
    /// Source resolution, no progress, no cancellation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report progress to `callback`. During a single video the items are
    /// sampled frames; in [`generate_all`](crate::generate_all) they are
    /// videos.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.monitor.callback = callback;
        self
    }

    /// Stop with [`VhashError::Cancelled`](crate::VhashError::Cancelled) once
    /// `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.monitor.cancellation = Some(token);
        self
    }

    /// Report every `size` items instead of after each one.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.monitor.interval = size.max(1);
        self
    }

    /// Have the decoder scale frames to `width`×`height` before they are
    /// encoded.
    ///
    /// The encoder always reduces to 8×8 itself; a small decode size only
    /// saves conversion work. Zero dimensions are clamped to 1.
    #[must_use]
    pub fn with_decode_resolution(mut self, width: u32, height: u32) -> Self {
        self.decode_resolution = Some((width.max(1), height.max(1)));
        self
    }
}

/// Settings for the all-pairs comparison sweep.
#[derive(Clone, Default)]
pub struct BatchOptions {
    pub(crate) monitor: Monitor,
    /// Pairs not started within this budget are reported as skipped.
    pub(crate) deadline: Option<Duration>,
}

impl Debug for BatchOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("BatchOptions")
            .field("cancellable", &self.monitor.cancellation.is_some())
            .field("progress_interval", &self.monitor.interval)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl BatchOptions {
    /// No progress, no cancellation, no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report finished pairs to `callback`.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.monitor.callback = callback;
        self
    }

    /// Skip the pairs that have not started when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.monitor.cancellation = Some(token);
        self
    }

    /// Report every `size` pairs instead of after each one.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.monitor.interval = size.max(1);
        self
    }

    /// Bound the wall-clock time of the sweep.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}
