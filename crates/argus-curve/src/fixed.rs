//! 18-decimal fixed-point logarithm, exponential and power.
//!
//! Values are `u128` scaled by [`ONE`]. Results are approximations whose
//! relative error stays well inside [`error_margin`]; callers that need a
//! one-sided bound subtract or add that margin.

use argus_types::{Result, VaultError, constants};

use crate::wide::mul_div;

/// 1.0 in fixed point.
pub const ONE: u128 = constants::FIXED_ONE;

const TWO: u128 = 2 * ONE;

/// floor(ln 2 * 10^18).
pub const LN_2: u128 = 693_147_180_559_945_309;

const LN_2_SIGNED: i128 = LN_2 as i128;

/// Error allowance per unit of exponent, in units of 10^-18.
pub const MARGIN_ULPS: u128 = 1_000;

/// Natural logarithm of a positive fixed-point value.
pub fn ln(x: u128) -> Result<i128> {
    if x == 0 {
        return Err(VaultError::invalid_input("ln of zero"));
    }
    if x >= ONE {
        return i128::try_from(ln_at_least_one(x)).map_err(|_| VaultError::overflow("ln"));
    }
    // ln(x) = -ln(1/x); 1/x <= 10^36 fits.
    let inverse = ONE * ONE / x;
    let magnitude = i128::try_from(ln_at_least_one(inverse)).map_err(|_| VaultError::overflow("ln"))?;
    Ok(-magnitude)
}

/// Natural logarithm of a positive integer (not fixed point). The integer is
/// normalized by its bit length first, so any `u128` is accepted.
pub fn ln_integer(x: u128) -> Result<u128> {
    if x == 0 {
        return Err(VaultError::invalid_input("ln of zero"));
    }
    let bits = 127 - x.leading_zeros();
    // x / 2^bits lies in [1, 2).
    let mantissa = mul_div(x, ONE, 1u128 << bits)?;
    Ok(u128::from(bits) * LN_2 + ln_at_least_one(mantissa))
}

/// ln(numerator / denominator) for positive integers, without forming the
/// quotient in fixed point.
pub fn ln_quotient(numerator: u128, denominator: u128) -> Result<i128> {
    let top = i128::try_from(ln_integer(numerator)?).map_err(|_| VaultError::overflow("ln"))?;
    let bottom =
        i128::try_from(ln_integer(denominator)?).map_err(|_| VaultError::overflow("ln"))?;
    Ok(top - bottom)
}

/// ln(x) for x >= 1: halve down to [1, 2), then
/// ln(y) = 2 * atanh((y - 1) / (y + 1)) by its odd power series.
fn ln_at_least_one(x: u128) -> u128 {
    let mut halvings: u128 = 0;
    let mut y = x;
    while y >= TWO {
        y >>= 1;
        halvings += 1;
    }

    let z = (y - ONE) * ONE / (y + ONE);
    let z_sq = z * z / ONE;
    let mut term = z;
    let mut series = z;
    let mut n: u128 = 1;
    loop {
        term = term * z_sq / ONE;
        if term == 0 {
            break;
        }
        n += 2;
        series += term / n;
    }
    halvings * LN_2 + 2 * series
}

/// e^y for a signed fixed-point exponent, as `(mantissa, shift)` with
/// e^y = mantissa * 2^shift and the mantissa in [ONE, 2 * ONE).
pub fn exp_parts(y: i128) -> (u128, i128) {
    let k = y.div_euclid(LN_2_SIGNED);
    // Remainder lies in [0, ln 2).
    let r = y.rem_euclid(LN_2_SIGNED).unsigned_abs();

    let mut term = ONE;
    let mut sum = ONE;
    let mut i: u128 = 1;
    loop {
        term = term * r / (ONE * i);
        if term == 0 {
            break;
        }
        sum += term;
        i += 1;
    }
    (sum, k)
}

/// e^y for a signed fixed-point exponent. Underflows to zero; overflow is
/// an error.
pub fn exp(y: i128) -> Result<u128> {
    let (sum, k) = exp_parts(y);
    if k >= 0 {
        let shift = u32::try_from(k).map_err(|_| VaultError::overflow("exp"))?;
        if shift >= sum.leading_zeros() {
            return Err(VaultError::overflow("exp"));
        }
        Ok(sum << shift)
    } else {
        let shift = k.unsigned_abs();
        if shift >= 128 { Ok(0) } else { Ok(sum >> shift) }
    }
}

/// base^exponent, both fixed point, base > 0.
pub fn pow(base: u128, exponent: u128) -> Result<u128> {
    if exponent == 0 || base == ONE {
        return Ok(ONE);
    }
    let log = ln(base)?;
    let magnitude = mul_div(log.unsigned_abs(), exponent, ONE)?;
    let arg = i128::try_from(magnitude).map_err(|_| VaultError::overflow("pow"))?;
    exp(if log < 0 { -arg } else { arg })
}

/// Upper bound on the absolute error of `pow(_, exponent)` when it
/// returned `value`. The logarithm's error is scaled by the exponent, so the
/// allowance grows with it.
pub fn error_margin(value: u128, exponent: u128) -> Result<u128> {
    let per_unit = MARGIN_ULPS * (exponent / ONE + 1);
    mul_div(value, per_unit, ONE)?
        .checked_add(MARGIN_ULPS)
        .ok_or(VaultError::overflow("error_margin"))
}
