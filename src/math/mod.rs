//! Shared fixed-point and wide-integer primitives.
//!
//! Concentrated-liquidity prices are Q64.64 (`u128` with the low 64 bits
//! fractional); intermediate products need up to 512 bits, and the merged
//! tick-array bitmaps span 1024 bits.

pub mod bitmap;
pub mod tick_math;
pub mod u64x64;

use anyhow::Result;
use uint::construct_uint;

use crate::error::RouteError;

construct_uint! {
    pub struct U256(4);
}
construct_uint! {
    pub struct U512(8);
}
construct_uint! {
    pub struct U1024(16);
}

/// The canonical Q64.64 shift.
pub const U64_RESOLUTION: u32 = 64;

pub fn widen_256(v: U256) -> U512 {
    let mut bytes = [0u8; 32];
    v.to_little_endian(&mut bytes);
    U512::from_little_endian(&bytes)
}

pub fn narrow_512(v: U512, context: &'static str) -> Result<U256> {
    if v.bits() > 256 {
        return Err(RouteError::Overflow(context).into());
    }
    let mut bytes = [0u8; 64];
    v.to_little_endian(&mut bytes);
    Ok(U256::from_little_endian(&bytes[..32]))
}

pub fn u256_to_u128(v: U256, context: &'static str) -> Result<u128> {
    if v.bits() > 128 {
        return Err(RouteError::Overflow(context).into());
    }
    Ok(v.low_u128())
}

/// floor(a * b / denominator) over a 512-bit intermediate.
pub fn mul_div_floor(a: U256, b: U256, denominator: U256) -> Result<U256> {
    if denominator.is_zero() {
        return Err(RouteError::Overflow("mul_div_floor: zero denominator").into());
    }
    let numerator = widen_256(a) * widen_256(b);
    narrow_512(numerator / widen_256(denominator), "mul_div_floor")
}

/// ceil(a * b / denominator) over a 512-bit intermediate.
pub fn mul_div_ceil(a: U256, b: U256, denominator: U256) -> Result<U256> {
    if denominator.is_zero() {
        return Err(RouteError::Overflow("mul_div_ceil: zero denominator").into());
    }
    let denominator = widen_256(denominator);
    let numerator = widen_256(a) * widen_256(b) + (denominator - U512::one());
    narrow_512(numerator / denominator, "mul_div_ceil")
}

/// `mul_div_floor` over plain u128 operands.
pub fn mul_div_floor_u128(a: u128, b: u128, denominator: u128) -> Result<u128> {
    let v = mul_div_floor(U256::from(a), U256::from(b), U256::from(denominator))?;
    u256_to_u128(v, "mul_div_floor_u128")
}

/// `mul_div_ceil` over plain u128 operands.
pub fn mul_div_ceil_u128(a: u128, b: u128, denominator: u128) -> Result<u128> {
    let v = mul_div_ceil(U256::from(a), U256::from(b), U256::from(denominator))?;
    u256_to_u128(v, "mul_div_ceil_u128")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_div_floor_truncates() {
        assert_eq!(mul_div_floor_u128(7, 3, 2).unwrap(), 10);
        assert_eq!(mul_div_floor_u128(0, u128::MAX, 5).unwrap(), 0);
    }

    #[test]
    fn mul_div_ceil_rounds_up() {
        assert_eq!(mul_div_ceil_u128(7, 3, 2).unwrap(), 11);
        assert_eq!(mul_div_ceil_u128(6, 2, 3).unwrap(), 4);
    }

    #[test]
    fn zero_denominator_is_an_error() {
        assert!(mul_div_floor_u128(1, 1, 0).is_err());
        assert!(mul_div_ceil_u128(1, 1, 0).is_err());
    }

    #[test]
    fn wide_intermediates_do_not_overflow() {
        // a * b overflows u128 but the quotient fits.
        let a = u128::MAX / 2;
        let out = mul_div_floor_u128(a, 4, 2).unwrap();
        assert_eq!(out, a * 2);
    }

    #[test]
    fn widen_narrow_round_trip() {
        let v = U256::from(u128::MAX) << 17;
        assert_eq!(narrow_512(widen_256(v), "test").unwrap(), v);
    }
}
