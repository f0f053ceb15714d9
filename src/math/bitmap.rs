//! Bit-search primitives over wide bitmaps.
//!
//! Tick-array and bin-array bitmaps are stored on chain as u64 limb arrays;
//! searches merge them into a single wide integer and scan from an arbitrary
//! bit with an explicit width, since shifted intermediates can carry garbage
//! above the logical width.

use super::U1024;

/// Merges little-endian u64 limbs into one wide integer (limb 0 = bits 0..64).
pub fn merge_bitmap(limbs: &[u64]) -> U1024 {
    let mut merged = U1024::zero();
    for (i, limb) in limbs.iter().enumerate() {
        merged = merged | (U1024::from(*limb) << (64 * i));
    }
    merged
}

fn masked(data: &U1024, bit_width: u32) -> U1024 {
    if bit_width >= 1024 {
        return *data;
    }
    let mask = (U1024::one() << bit_width) - U1024::one();
    *data & mask
}

pub fn is_zero(bit_width: u32, data: &U1024) -> bool {
    masked(data, bit_width).is_zero()
}

/// Number of zero bits above the highest set bit, within `bit_width`.
pub fn leading_zeros(bit_width: u32, data: &U1024) -> Option<u32> {
    let m = masked(data, bit_width);
    if m.is_zero() {
        return None;
    }
    Some(bit_width - m.bits() as u32)
}

/// Number of zero bits below the lowest set bit, within `bit_width`.
pub fn trailing_zeros(bit_width: u32, data: &U1024) -> Option<u32> {
    let m = masked(data, bit_width);
    if m.is_zero() {
        return None;
    }
    Some(m.trailing_zeros() as u32)
}

/// Distance of the highest set bit from the top, i.e. `leading_zeros`.
pub fn most_significant_bit(bit_width: u32, data: &U1024) -> Option<u32> {
    leading_zeros(bit_width, data)
}

/// Distance of the lowest set bit from the bottom, i.e. `trailing_zeros`.
pub fn least_significant_bit(bit_width: u32, data: &U1024) -> Option<u32> {
    trailing_zeros(bit_width, data)
}

pub fn bit_at(data: &U1024, index: u32) -> bool {
    data.bit(index as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_places_limbs_little_endian() {
        let merged = merge_bitmap(&[1, 0, 0, 2]);
        assert!(bit_at(&merged, 0));
        assert!(bit_at(&merged, 193));
        assert!(!bit_at(&merged, 64));
    }

    #[test]
    fn zero_checks_respect_width() {
        let v = U1024::one() << 600;
        assert!(is_zero(512, &v));
        assert!(!is_zero(1024, &v));
    }

    #[test]
    fn msb_and_lsb_count_from_the_right_edges() {
        let v = (U1024::one() << 10) | (U1024::one() << 100);
        assert_eq!(most_significant_bit(512, &v), Some(512 - 101));
        assert_eq!(least_significant_bit(512, &v), Some(10));
        assert_eq!(leading_zeros(512, &U1024::zero()), None);
        assert_eq!(trailing_zeros(512, &U1024::zero()), None);
    }
}
