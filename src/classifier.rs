//! Human-facing similarity categories.
//!
//! [`Thresholds::classify`] maps an alignment ratio onto one of four ordered
//! [`Similarity`] levels. Every comparison is a strict `>`, so a ratio equal
//! to a threshold lands in the category below it.
//!
//! ```
//! use vhash::{Similarity, Thresholds};
//!
//! let thresholds = Thresholds::default();
//! assert_eq!(thresholds.classify(0.21), Similarity::VeryHigh);
//! assert_eq!(thresholds.classify(0.20), Similarity::High);
//! assert_eq!(thresholds.classify(0.0), Similarity::Low);
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Default lower bound (exclusive) of [`Similarity::VeryHigh`].
pub const VERY_HIGH_THRESHOLD: f64 = 0.20;
/// Default lower bound (exclusive) of [`Similarity::High`].
pub const HIGH_THRESHOLD: f64 = 0.10;
/// Default lower bound (exclusive) of [`Similarity::Medium`].
pub const MEDIUM_THRESHOLD: f64 = 0.05;

/// Similarity level of a pair of videos, ordered from least to most similar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Similarity {
    /// At or below the medium threshold.
    Low,
    /// Above the medium threshold.
    Medium,
    /// Above the high threshold.
    High,
    /// Above the very-high threshold.
    VeryHigh,
}

impl Similarity {
    /// Label used in reports, e.g. `"Very High Similarity"`.
    pub const fn label(self) -> &'static str {
        match self {
            Similarity::Low => "Low Similarity",
            Similarity::Medium => "Medium Similarity",
            Similarity::High => "High Similarity",
            Similarity::VeryHigh => "Very High Similarity",
        }
    }
}

impl Display for Similarity {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.label())
    }
}

/// Category boundaries. Each is an exclusive lower bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Ratios above this are [`Similarity::VeryHigh`].
    pub very_high: f64,
    /// Ratios above this are at least [`Similarity::High`].
    pub high: f64,
    /// Ratios above this are at least [`Similarity::Medium`].
    pub medium: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            very_high: VERY_HIGH_THRESHOLD,
            high: HIGH_THRESHOLD,
            medium: MEDIUM_THRESHOLD,
        }
    }
}

impl Thresholds {
    /// Map a ratio to its category.
    pub fn classify(&self, ratio: f64) -> Similarity {
        if ratio > self.very_high {
            Similarity::VeryHigh
        } else if ratio > self.high {
            Similarity::High
        } else if ratio > self.medium {
            Similarity::Medium
        } else {
            Similarity::Low
        }
    }
}

/// Classify with the default thresholds.
pub fn classify(ratio: f64) -> Similarity {
    Thresholds::default().classify(ratio)
}
