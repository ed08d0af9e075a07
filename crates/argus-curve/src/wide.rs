//! 256-bit intermediate arithmetic.
//!
//! `a * b / d` with the product held in 256 bits, so multiplication before
//! division never overflows. Only the final quotient must fit in `u128`.

use argus_types::{Result, VaultError};

const LOW_MASK: u128 = u64::MAX as u128;

/// Full 256-bit product of two `u128`s as `(high, low)`.
#[must_use]
pub fn full_mul(a: u128, b: u128) -> (u128, u128) {
    let (a_hi, a_lo) = (a >> 64, a & LOW_MASK);
    let (b_hi, b_lo) = (b >> 64, b & LOW_MASK);

    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;

    // At most 3 * (2^64 - 1): cannot overflow.
    let mid = (ll >> 64) + (lh & LOW_MASK) + (hl & LOW_MASK);
    let low = (ll & LOW_MASK) | (mid << 64);
    let high = hh + (lh >> 64) + (hl >> 64) + (mid >> 64);
    (high, low)
}

/// Divide the 256-bit value `(high, low)` by `d`, returning
/// `(quotient, remainder)`. `None` if `d == 0` or the quotient needs more
/// than 128 bits.
fn div_wide(high: u128, low: u128, d: u128) -> Option<(u128, u128)> {
    if d == 0 || high >= d {
        return None;
    }
    if high == 0 {
        return Some((low / d, low % d));
    }

    // Restoring long division; `rem < d` holds before every step.
    let mut rem = high;
    let mut quotient: u128 = 0;
    for bit in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((low >> bit) & 1);
        quotient <<= 1;
        if carry == 1 || rem >= d {
            rem = rem.wrapping_sub(d);
            quotient |= 1;
        }
    }
    Some((quotient, rem))
}

/// `floor(a * b / d)`.
pub fn mul_div(a: u128, b: u128, d: u128) -> Result<u128> {
    if d == 0 {
        return Err(VaultError::overflow("mul_div: division by zero"));
    }
    let (high, low) = full_mul(a, b);
    div_wide(high, low, d)
        .map(|(q, _)| q)
        .ok_or(VaultError::overflow("mul_div"))
}

/// `ceil(a * b / d)`.
pub fn mul_div_ceil(a: u128, b: u128, d: u128) -> Result<u128> {
    if d == 0 {
        return Err(VaultError::overflow("mul_div_ceil: division by zero"));
    }
    let (high, low) = full_mul(a, b);
    let (q, r) = div_wide(high, low, d).ok_or(VaultError::overflow("mul_div_ceil"))?;
    if r == 0 {
        Ok(q)
    } else {
        q.checked_add(1).ok_or(VaultError::overflow("mul_div_ceil"))
    }
}
