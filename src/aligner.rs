//! Tolerant sequence alignment.
//!
//! Two fingerprint sequences are compared by repeatedly taking the longest
//! block of consecutive fingerprint pairs that all lie within the Hamming
//! tolerance, then aligning what is left before and after that block. The
//! total number of matched elements `M` gives the ratio `2M / (m + n)`, so
//! extra, missing or slightly altered samples (frame-rate jitter, trims,
//! re-encodes) cost only what they touch.
//!
//! # Example
//!
//! ```
//! use vhash::{Fingerprint, MatchConfig, SequenceAligner};
//!
//! // Ten disjoint 6-bit patterns: any two differ in 12 bits.
//! let a: Vec<Fingerprint> = (0..10u64).map(|i| Fingerprint::new(0x3f << (i * 6))).collect();
//! let mut b = a.clone();
//! b.insert(5, Fingerprint::new(u64::MAX));
//!
//! let aligner = SequenceAligner::new(MatchConfig::default())?;
//! let result = aligner.align(&a, &b);
//! assert_eq!(result.matched, 10);
//! assert!((result.ratio - 20.0 / 21.0).abs() < 1e-12);
//! # Ok::<(), vhash::VhashError>(())
//! ```

use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::{error::VhashError, fingerprint::Fingerprint};

/// Largest meaningful tolerance: two 64-bit values differ in at most 64 bits.
pub const MAX_TOLERANCE: u32 = 64;

/// How the matched element count is turned into a ratio.
///
/// Ratios computed under different conventions are not comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RatioConvention {
    /// `2M / (m + n)`.
    #[default]
    TwiceMatchedOverTotal,
    /// `M / max(m, n)`.
    MatchedOverLongest,
}

impl RatioConvention {
    fn ratio(self, matched: usize, len_a: usize, len_b: usize) -> f64 {
        match (len_a, len_b) {
            (0, 0) => 1.0,
            (0, _) | (_, 0) => 0.0,
            _ => match self {
                RatioConvention::TwiceMatchedOverTotal => {
                    2.0 * matched as f64 / (len_a + len_b) as f64
                }
                RatioConvention::MatchedOverLongest => {
                    matched as f64 / len_a.max(len_b) as f64
                }
            },
        }
    }
}

/// Named tolerance presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MatchProfile {
    /// At most 8 of 64 bits may differ.
    #[default]
    Strict,
    /// Fewer than 16 of 64 bits may differ. Produces noticeably higher
    /// ratios between unrelated videos.
    Loose,
}

impl MatchProfile {
    /// The Hamming tolerance of this profile.
    pub const fn tolerance(self) -> u32 {
        match self {
            MatchProfile::Strict => 8,
            MatchProfile::Loose => 15,
        }
    }
}

impl FromStr for MatchProfile {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "strict" => Ok(MatchProfile::Strict),
            "loose" => Ok(MatchProfile::Loose),
            other => Err(format!("unknown match profile: {other} (strict|loose)")),
        }
    }
}

/// Parameters of one comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatchConfig {
    /// Maximum Hamming distance at which two fingerprints count as the same
    /// sample.
    pub tolerance: u32,
    /// Ratio convention.
    pub convention: RatioConvention,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self::from_profile(MatchProfile::Strict)
    }
}

impl MatchConfig {
    /// Configuration of a named profile with the default ratio convention.
    pub const fn from_profile(profile: MatchProfile) -> Self {
        Self {
            tolerance: profile.tolerance(),
            convention: RatioConvention::TwiceMatchedOverTotal,
        }
    }

    /// Set the Hamming tolerance.
    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: u32) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the ratio convention.
    #[must_use]
    pub const fn with_convention(mut self, convention: RatioConvention) -> Self {
        self.convention = convention;
        self
    }

    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`VhashError::AlignmentInput`] if the tolerance exceeds
    /// [`MAX_TOLERANCE`].
    pub fn validate(&self) -> Result<(), VhashError> {
        if self.tolerance > MAX_TOLERANCE {
            return Err(VhashError::AlignmentInput(format!(
                "tolerance {} exceeds {MAX_TOLERANCE} bits",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// A run of `len` matching pairs starting at `a` in the first sequence and
/// `b` in the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MatchingBlock {
    /// Start offset in the first sequence.
    pub a: usize,
    /// Start offset in the second sequence.
    pub b: usize,
    /// Number of consecutive matching pairs.
    pub len: usize,
}

/// Outcome of aligning two sequences.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Similarity in `[0, 1]` under `config.convention`.
    pub ratio: f64,
    /// Total matched elements `M`.
    pub matched: usize,
    /// Length of the first sequence.
    pub len_a: usize,
    /// Length of the second sequence.
    pub len_b: usize,
    /// Parameters the ratio was computed with.
    pub config: MatchConfig,
    /// Matching blocks in ascending order of `a` (and of `b`).
    pub blocks: Vec<MatchingBlock>,
}

impl Display for MatchResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{:.2}% ({} of {}+{} matched, tolerance {})",
            self.ratio * 100.0,
            self.matched,
            self.len_a,
            self.len_b,
            self.config.tolerance
        )
    }
}

/// Computes alignment ratios under a fixed [`MatchConfig`].
///
/// The aligner holds no state between calls and can be shared freely across
/// threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceAligner {
    config: MatchConfig,
}

impl SequenceAligner {
    /// Create an aligner after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns [`VhashError::AlignmentInput`] for an invalid tolerance.
    pub fn new(config: MatchConfig) -> Result<Self, VhashError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The configuration in use.
    pub fn config(&self) -> MatchConfig {
        self.config
    }

    /// Align two sequences.
    ///
    /// Two empty sequences are identical (ratio 1); an empty and a non-empty
    /// one share nothing (ratio 0). The result does not depend on argument
    /// order apart from the orientation of `blocks`.
    pub fn align(&self, a: &[Fingerprint], b: &[Fingerprint]) -> MatchResult {
        let config = self.config;

        // Align in a canonical orientation so that swapping the arguments
        // cannot change which blocks the tie-break picks.
        let swapped = (b.len(), b) < (a.len(), a);
        let (first, second) = if swapped { (b, a) } else { (a, b) };

        let mut blocks = matching_blocks(first, second, config.tolerance);
        if swapped {
            for block in &mut blocks {
                std::mem::swap(&mut block.a, &mut block.b);
            }
            blocks.sort_unstable();
        }

        let matched = blocks.iter().map(|block| block.len).sum();

        MatchResult {
            ratio: config.convention.ratio(matched, a.len(), b.len()),
            matched,
            len_a: a.len(),
            len_b: b.len(),
            config,
            blocks,
        }
    }

    /// Shorthand for `align(a, b).ratio`.
    pub fn ratio(&self, a: &[Fingerprint], b: &[Fingerprint]) -> f64 {
        self.align(a, b).ratio
    }
}

/// Align two sequences under `config`.
///
/// # Errors
///
/// Returns [`VhashError::AlignmentInput`] for an invalid tolerance.
pub fn align(
    a: &[Fingerprint],
    b: &[Fingerprint],
    config: MatchConfig,
) -> Result<MatchResult, VhashError> {
    Ok(SequenceAligner::new(config)?.align(a, b))
}

/// Fraction of `a`'s fingerprints that have at least one fingerprint of `b`
/// within `tolerance`, ignoring order.
///
/// This is the nearest-neighbour score of older tooling. It is asymmetric and
/// is not a substitute for the alignment ratio. Empty inputs follow the same
/// convention as [`SequenceAligner::align`].
///
/// # Errors
///
/// Returns [`VhashError::AlignmentInput`] for a tolerance above
/// [`MAX_TOLERANCE`].
pub fn coverage(a: &[Fingerprint], b: &[Fingerprint], tolerance: u32) -> Result<f64, VhashError> {
    MatchConfig::default().with_tolerance(tolerance).validate()?;

    Ok(match (a.len(), b.len()) {
        (0, 0) => 1.0,
        (0, _) | (_, 0) => 0.0,
        (len_a, _) => {
            let covered = a
                .iter()
                .filter(|&&x| b.iter().any(|&y| x.matches(y, tolerance)))
                .count();
            covered as f64 / len_a as f64
        }
    })
}

/// A pair of half-open ranges still to be aligned.
#[derive(Debug, Clone, Copy)]
struct Region {
    a_lo: usize,
    a_hi: usize,
    b_lo: usize,
    b_hi: usize,
    /// No block inside the region is longer than this.
    cap: usize,
}

impl Region {
    /// Length at which a block search can stop: the first block this long
    /// already wins the tie-break.
    fn longest_possible(&self) -> usize {
        (self.a_hi - self.a_lo)
            .min(self.b_hi - self.b_lo)
            .min(self.cap)
    }
}

/// Collect all matching blocks of `a` against `b`, sorted.
///
/// Regions are processed from an explicit work-list; every block found
/// splits its region into two strictly smaller ones, so the list never holds
/// more than `min(a.len(), b.len()) + 1` entries. A sub-region cannot hold a
/// block longer than the one that split it, so each search stops as soon as
/// it meets that length.
fn matching_blocks(a: &[Fingerprint], b: &[Fingerprint], tolerance: u32) -> Vec<MatchingBlock> {
    let mut blocks = Vec::new();
    if a.is_empty() || b.is_empty() {
        return blocks;
    }

    let exact_index = (tolerance == 0).then(|| ExactIndex::new(b));
    let mut rows = RowBuffers::default();
    let mut pending = vec![Region {
        a_lo: 0,
        a_hi: a.len(),
        b_lo: 0,
        b_hi: b.len(),
        cap: usize::MAX,
    }];

    while let Some(region) = pending.pop() {
        if region.a_lo == region.a_hi || region.b_lo == region.b_hi {
            continue;
        }

        let left = &a[region.a_lo..region.a_hi];
        let right = &b[region.b_lo..region.b_hi];

        // Identical slices: the whole region is the unique longest block.
        if left == right {
            blocks.push(MatchingBlock {
                a: region.a_lo,
                b: region.b_lo,
                len: left.len(),
            });
            continue;
        }

        let found = match &exact_index {
            Some(index) => index.longest_match(a, region),
            None => rows.longest_match(a, b, region, tolerance),
        };
        let Some(block) = found else {
            continue;
        };

        blocks.push(block);
        pending.push(Region {
            a_lo: region.a_lo,
            a_hi: block.a,
            b_lo: region.b_lo,
            b_hi: block.b,
            cap: block.len,
        });
        pending.push(Region {
            a_lo: block.a + block.len,
            a_hi: region.a_hi,
            b_lo: block.b + block.len,
            b_hi: region.b_hi,
            cap: block.len,
        });
    }

    blocks.sort_unstable();
    blocks
}

/// Reusable rows for the run-length scan.
#[derive(Default)]
struct RowBuffers {
    previous: Vec<u32>,
    current: Vec<u32>,
}

impl RowBuffers {
    /// Longest tolerant block inside `region`, scanning every pair.
    ///
    /// `current[k + 1]` holds the length of the matching run ending at the
    /// current row and column `b_lo + k`. Rows and columns are visited in
    /// ascending order and only a strictly longer run replaces the best, so
    /// ties resolve to the smallest start in `a`, then in `b`.
    fn longest_match(
        &mut self,
        a: &[Fingerprint],
        b: &[Fingerprint],
        region: Region,
        tolerance: u32,
    ) -> Option<MatchingBlock> {
        let columns = &b[region.b_lo..region.b_hi];
        let limit = region.longest_possible();

        self.previous.clear();
        self.previous.resize(columns.len() + 1, 0);
        self.current.clear();
        self.current.resize(columns.len() + 1, 0);

        let mut best = MatchingBlock {
            a: region.a_lo,
            b: region.b_lo,
            len: 0,
        };

        for i in region.a_lo..region.a_hi {
            let x = a[i];
            for (k, &y) in columns.iter().enumerate() {
                let run = if x.matches(y, tolerance) {
                    self.previous[k] + 1
                } else {
                    0
                };
                self.current[k + 1] = run;

                let run = run as usize;
                if run > best.len {
                    best = MatchingBlock {
                        a: i + 1 - run,
                        b: region.b_lo + k + 1 - run,
                        len: run,
                    };
                    if run == limit {
                        return Some(best);
                    }
                }
            }

            std::mem::swap(&mut self.previous, &mut self.current);
        }

        (best.len > 0).then_some(best)
    }
}

/// Positions of every fingerprint value in the second sequence.
///
/// With zero tolerance a pair matches only on equal values, so the block
/// search only has to visit positions sharing a value instead of every pair.
struct ExactIndex {
    positions: HashMap<Fingerprint, Vec<usize>>,
}

impl ExactIndex {
    fn new(b: &[Fingerprint]) -> Self {
        let mut positions: HashMap<Fingerprint, Vec<usize>> = HashMap::new();
        for (j, &fingerprint) in b.iter().enumerate() {
            positions.entry(fingerprint).or_default().push(j);
        }
        Self { positions }
    }

    /// Longest exact block inside `region`, with the same tie-break as the
    /// scan.
    fn longest_match(&self, a: &[Fingerprint], region: Region) -> Option<MatchingBlock> {
        let limit = region.longest_possible();
        let mut best = MatchingBlock {
            a: region.a_lo,
            b: region.b_lo,
            len: 0,
        };
        let mut run_ending_at: HashMap<usize, usize> = HashMap::new();
        let mut next_runs: HashMap<usize, usize> = HashMap::new();

        for i in region.a_lo..region.a_hi {
            next_runs.clear();
            if let Some(positions) = self.positions.get(&a[i]) {
                let start = positions.partition_point(|&j| j < region.b_lo);
                for &j in positions[start..].iter().take_while(|&&j| j < region.b_hi) {
                    let previous = j
                        .checked_sub(1)
                        .and_then(|before| run_ending_at.get(&before))
                        .copied()
                        .unwrap_or(0);
                    let run = previous + 1;
                    next_runs.insert(j, run);

                    if run > best.len {
                        best = MatchingBlock {
                            a: i + 1 - run,
                            b: j + 1 - run,
                            len: run,
                        };
                        if run == limit {
                            return Some(best);
                        }
                    }
                }
            }
            std::mem::swap(&mut run_ending_at, &mut next_runs);
        }

        (best.len > 0).then_some(best)
    }
}
