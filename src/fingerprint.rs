//! Perceptual frame fingerprints.
//!
//! A [`Fingerprint`] is a 64-bit average hash of one video frame: the frame is
//! reduced to an 8×8 grayscale grid and every cell contributes one bit telling
//! whether it is at most as bright as the grid mean. A [`FingerprintSequence`]
//! is the ordered, non-empty list of fingerprints sampled from one video.
//!
//! # Example
//!
//! ```
//! use image::{DynamicImage, GrayImage, Luma};
//! use vhash::Fingerprint;
//!
//! // Left half dark, right half bright.
//! let frame = GrayImage::from_fn(64, 64, |x, _| Luma([if x < 32 { 0 } else { 255 }]));
//! let fingerprint = Fingerprint::from_image(&DynamicImage::ImageLuma8(frame));
//! assert_eq!(fingerprint.bits(), 0xf0f0_f0f0_f0f0_f0f0);
//! ```

use std::{
    fmt::{Display, Formatter, LowerHex, Result as FmtResult},
    ops::Deref,
    path::Path,
    str::FromStr,
};

use image::{DynamicImage, GrayImage, imageops::FilterType};

use crate::{bits, error::VhashError};

/// Side length of the grid a frame is reduced to.
pub const GRID_SIZE: u32 = 8;

const CELL_COUNT: u32 = GRID_SIZE * GRID_SIZE;

/// 64-bit perceptual summary of one frame's brightness pattern.
///
/// Bit 63 corresponds to the top-left grid cell, bit 0 to the bottom-right
/// one. A set bit means the cell is not brighter than the grid mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Wrap a raw 64-bit value.
    pub const fn new(bits: u64) -> Self {
        Self(bits)
    }

    /// The raw 64-bit value.
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Encode one decoded frame.
    ///
    /// The frame is converted to 8-bit luma, resized to 8×8 with a bilinear
    /// filter and thresholded against the mean of the 64 cells. The frame must
    /// have non-zero dimensions.
    pub fn from_image(frame: &DynamicImage) -> Self {
        let grid = match frame {
            DynamicImage::ImageLuma8(gray) => shrink(gray),
            other => shrink(&other.to_luma8()),
        };
        Self::from_grid(grid.as_raw())
    }

    /// Encode an already reduced 8×8 grid of intensities in row-major order.
    ///
    /// # Panics
    ///
    /// Panics if `cells` does not hold exactly 64 values.
    pub fn from_grid(cells: &[u8]) -> Self {
        assert_eq!(
            cells.len(),
            CELL_COUNT as usize,
            "fingerprint grid must hold {CELL_COUNT} cells"
        );

        let sum: u32 = cells.iter().map(|&cell| u32::from(cell)).sum();

        // cell <= sum / 64, kept in integers.
        let bits = cells.iter().fold(0u64, |accumulator, &cell| {
            let bit = u64::from(u32::from(cell) * CELL_COUNT <= sum);
            (accumulator << 1) | bit
        });

        Self(bits)
    }

    /// Number of differing bits between two fingerprints.
    pub fn distance(self, other: Fingerprint) -> u32 {
        bits::hamming_distance(self.0, other.0)
    }

    /// Whether two fingerprints differ in at most `tolerance` bits.
    pub fn matches(self, other: Fingerprint, tolerance: u32) -> bool {
        self.distance(other) <= tolerance
    }
}

fn shrink(gray: &GrayImage) -> GrayImage {
    if gray.dimensions() == (GRID_SIZE, GRID_SIZE) {
        return gray.clone();
    }
    image::imageops::resize(gray, GRID_SIZE, GRID_SIZE, FilterType::Triangle)
}

impl From<u64> for Fingerprint {
    fn from(bits: u64) -> Self {
        Self(bits)
    }
}

impl From<Fingerprint> for u64 {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.0
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{:016x}", self.0)
    }
}

impl LowerHex for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        LowerHex::fmt(&self.0, f)
    }
}

impl FromStr for Fingerprint {
    type Err = std::num::ParseIntError;

    /// Parse a hexadecimal fingerprint, with or without a `0x` prefix.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        u64::from_str_radix(digits, 16).map(Self)
    }
}

/// Ordered, non-empty list of fingerprints, one per sampled frame.
///
/// Order is temporal and meaningful; the aligner never reorders it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FingerprintSequence {
    fingerprints: Vec<Fingerprint>,
}

impl FingerprintSequence {
    /// Build a sequence, rejecting an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`VhashError::EmptySequence`] if `fingerprints` is empty.
    pub fn new(fingerprints: Vec<Fingerprint>) -> Result<Self, VhashError> {
        if fingerprints.is_empty() {
            return Err(VhashError::EmptySequence { path: None });
        }
        Ok(Self { fingerprints })
    }

    /// Like [`new`](FingerprintSequence::new), naming the source video in the
    /// error.
    pub(crate) fn for_source(
        fingerprints: Vec<Fingerprint>,
        source: &Path,
    ) -> Result<Self, VhashError> {
        Self::new(fingerprints).map_err(|_| VhashError::EmptySequence {
            path: Some(source.to_path_buf()),
        })
    }

    /// Build a sequence from raw 64-bit values.
    pub fn from_bits<I: IntoIterator<Item = u64>>(values: I) -> Result<Self, VhashError> {
        Self::new(values.into_iter().map(Fingerprint::new).collect())
    }

    /// The fingerprints as a slice.
    pub fn as_slice(&self) -> &[Fingerprint] {
        &self.fingerprints
    }

    /// Consume the sequence, returning the underlying vector.
    pub fn into_inner(self) -> Vec<Fingerprint> {
        self.fingerprints
    }
}

impl Deref for FingerprintSequence {
    type Target = [Fingerprint];

    fn deref(&self) -> &Self::Target {
        &self.fingerprints
    }
}

impl AsRef<[Fingerprint]> for FingerprintSequence {
    fn as_ref(&self) -> &[Fingerprint] {
        &self.fingerprints
    }
}

impl<'a> IntoIterator for &'a FingerprintSequence {
    type Item = &'a Fingerprint;
    type IntoIter = std::slice::Iter<'a, Fingerprint>;

    fn into_iter(self) -> Self::IntoIter {
        self.fingerprints.iter()
    }
}

impl TryFrom<Vec<Fingerprint>> for FingerprintSequence {
    type Error = VhashError;

    fn try_from(fingerprints: Vec<Fingerprint>) -> Result<Self, Self::Error> {
        Self::new(fingerprints)
    }
}
