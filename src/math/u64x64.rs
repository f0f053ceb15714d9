//! Q64.64 helpers for discrete-bin pricing: widening multiply-shift,
//! shift-divide, and integer-exponent `pow` with reciprocal handling.

use super::U256;

pub const SCALE_OFFSET: u32 = 64;

/// 1.0 in Q64.64.
pub const ONE_X64: u128 = 1u128 << SCALE_OFFSET;

/// floor((x * y) >> 64)
pub fn mul_shr(x: u128, y: u128) -> Option<u128> {
    let v = (U256::from(x) * U256::from(y)) >> SCALE_OFFSET;
    if v.bits() > 128 {
        return None;
    }
    Some(v.low_u128())
}

/// ceil((x * y) >> 64)
pub fn mul_shr_round_up(x: u128, y: u128) -> Option<u128> {
    let product = U256::from(x) * U256::from(y);
    let mut v = product >> SCALE_OFFSET;
    if product & (U256::from(u64::MAX)) != U256::zero() {
        v = v + U256::one();
    }
    if v.bits() > 128 {
        return None;
    }
    Some(v.low_u128())
}

/// floor((x << 64) / y)
pub fn shl_div(x: u128, y: u128) -> Option<u128> {
    if y == 0 {
        return None;
    }
    let v = (U256::from(x) << SCALE_OFFSET) / U256::from(y);
    if v.bits() > 128 {
        return None;
    }
    Some(v.low_u128())
}

/// ceil((x << 64) / y)
pub fn shl_div_round_up(x: u128, y: u128) -> Option<u128> {
    if y == 0 {
        return None;
    }
    let divisor = U256::from(y);
    let v = ((U256::from(x) << SCALE_OFFSET) + divisor - U256::one()) / divisor;
    if v.bits() > 128 {
        return None;
    }
    Some(v.low_u128())
}

/// base^exp for a Q64.64 base and a signed integer exponent, by binary
/// exponentiation. Bases >= 1.0 are inverted up front so every intermediate
/// stays below 1.0 and keeps its 64 fractional bits of precision.
pub fn pow(base: u128, exp: i32) -> Option<u128> {
    if exp == 0 {
        return Some(ONE_X64);
    }
    let mut invert = exp.is_negative();
    let exp = exp.unsigned_abs();

    let mut squared_base = base;
    let mut result = ONE_X64;
    if squared_base >= result {
        squared_base = u128::MAX.checked_div(squared_base)?;
        invert = !invert;
    }

    let exp = exp as u64;
    let mut bit = 1u64;
    while bit <= exp {
        if exp & bit != 0 {
            result = mul_shr(result, squared_base)?;
        }
        bit <<= 1;
        if bit <= exp {
            squared_base = mul_shr(squared_base, squared_base)?;
        }
    }

    if result == 0 {
        return None;
    }
    if invert {
        result = u128::MAX.checked_div(result)?;
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_shr_at_unity_is_identity() {
        assert_eq!(mul_shr(12345, ONE_X64), Some(12345));
        assert_eq!(shl_div(12345, ONE_X64), Some(12345));
    }

    #[test]
    fn round_up_variants_differ_only_on_remainders() {
        assert_eq!(mul_shr_round_up(1, 1), Some(1));
        assert_eq!(mul_shr(1, 1), Some(0));
        assert_eq!(shl_div_round_up(1, 3 << SCALE_OFFSET), Some(1));
    }

    #[test]
    fn pow_zero_exponent_is_one() {
        assert_eq!(pow(ONE_X64 + (ONE_X64 / 100), 0), Some(ONE_X64));
    }

    #[test]
    fn pow_matches_float_reference() {
        // (1.0025)^100 with a 25bps bin step.
        let base = ONE_X64 + ((25u128 << SCALE_OFFSET) / 10_000);
        let got = pow(base, 100).unwrap() as f64 / ONE_X64 as f64;
        let expected = 1.0025f64.powi(100);
        assert!((got - expected).abs() / expected < 1e-9, "{got} vs {expected}");
    }

    #[test]
    fn pow_negative_exponent_is_reciprocal() {
        let base = ONE_X64 + ((50u128 << SCALE_OFFSET) / 10_000);
        let got = pow(base, -50).unwrap() as f64 / ONE_X64 as f64;
        let expected = 1.005f64.powi(-50);
        assert!((got - expected).abs() / expected < 1e-9, "{got} vs {expected}");
    }
}
