//! Population count and Hamming distance.
//!
//! The bit-count routine is chosen when the crate is compiled: builds with the
//! `popcnt` target feature enabled (e.g. `-C target-cpu=native` on a modern
//! x86_64 machine) use the hardware instruction directly, every other build
//! uses the portable [`u64::count_ones`]. There is no runtime detection.

/// Count the set bits in `value`.
#[inline]
pub fn popcount(value: u64) -> u32 {
    imp::popcount(value)
}

/// Number of differing bits between two 64-bit values.
#[inline]
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    popcount(a ^ b)
}

#[cfg(all(target_arch = "x86_64", target_feature = "popcnt"))]
mod imp {
    #[inline]
    pub(super) fn popcount(value: u64) -> u32 {
        // SAFETY: the `popcnt` target feature is enabled for this build.
        unsafe { core::arch::x86_64::_popcnt64(value as i64) as u32 }
    }
}

#[cfg(not(all(target_arch = "x86_64", target_feature = "popcnt")))]
mod imp {
    #[inline]
    pub(super) fn popcount(value: u64) -> u32 {
        value.count_ones()
    }
}
