//! Continuous-reserve bonding curve.
//!
//! ```text
//! issue:   shares  = S * ((1 + d / R) ^ r        - 1)
//! redeem:  reserve = R * (1 - (1 - s / S) ^ (1 / r))
//! price:   p       = R / (S * r)
//! ```
//!
//! `S` is the outstanding supply, `R` the reserve, `r` the reserve ratio.
//! Every result rounds toward the pool: issuance never yields more shares
//! than the exact formula and redemption never returns more reserve. An
//! issuance followed by redeeming the shares it produced therefore returns
//! at most the original deposit.
//!
//! A market with zero supply (and zero reserve) is seeded at 1:1.

use argus_types::{Amount, ReserveRatio, Result, VaultError, constants};
use rust_decimal::Decimal;

use crate::fixed::{self, ONE};
use crate::wide::{mul_div, mul_div_ceil};

/// Fixed-point value of one ppm.
const PPM_UNIT: u128 = ONE / constants::PPM_ONE as u128;

fn check_pool(current_supply: Amount, current_reserve: Amount) -> Result<()> {
    match (current_supply == 0, current_reserve == 0) {
        (false, true) => Err(VaultError::invalid_input(format!(
            "supply {current_supply} outstanding against zero reserve"
        ))),
        (true, false) => Err(VaultError::invalid_input(format!(
            "reserve {current_reserve} held against zero supply"
        ))),
        _ => Ok(()),
    }
}

/// Shares issued for depositing `reserve_deposited` into the pool.
pub fn price_to_issue(
    current_supply: Amount,
    current_reserve: Amount,
    reserve_ratio: ReserveRatio,
    reserve_deposited: Amount,
) -> Result<Amount> {
    if reserve_deposited == 0 {
        return Err(VaultError::invalid_input("deposit must be > 0"));
    }
    check_pool(current_supply, current_reserve)?;

    if current_supply == 0 {
        return Ok(reserve_deposited);
    }
    if reserve_ratio.is_linear() {
        return mul_div(current_supply, reserve_deposited, current_reserve);
    }

    let new_reserve = current_reserve
        .checked_add(reserve_deposited)
        .ok_or(VaultError::overflow("price_to_issue: reserve"))?;
    // ln((R + d) / R) straight from the integers: the quotient itself can
    // exceed the fixed-point range while the share count still fits.
    let log = fixed::ln_quotient(new_reserve, current_reserve)?;
    if log <= 0 {
        return Ok(0);
    }
    let exponent = u128::from(reserve_ratio.ppm()) * PPM_UNIT;
    // Floor: a smaller exponent can only shrink the result.
    let scaled = mul_div(log.unsigned_abs(), exponent, ONE)?;
    let scaled = i128::try_from(scaled).map_err(|_| VaultError::overflow("price_to_issue"))?;

    // power = mantissa * 2^shift, shift >= 0 for a positive log.
    let (mantissa, shift) = fixed::exp_parts(scaled);
    let lower = mantissa.saturating_sub(fixed::error_margin(mantissa, exponent)?);
    let shift = u32::try_from(shift).map_err(|_| VaultError::overflow("price_to_issue"))?;
    // Apply as much of the shift as the mantissa has headroom for before
    // dividing out ONE; the rest scales an already large integer.
    let inner = shift.min(lower.leading_zeros().saturating_sub(1));
    let grown = mul_div(current_supply, lower << inner, ONE)?;
    let outer = shift - inner;
    if grown == 0 {
        return Ok(0);
    }
    if outer > 0 && outer >= grown.leading_zeros() {
        return Err(VaultError::overflow("price_to_issue"));
    }
    Ok((grown << outer).saturating_sub(current_supply))
}

/// Reserve returned for burning `shares_burned` from the pool.
pub fn reserve_to_redeem(
    current_supply: Amount,
    current_reserve: Amount,
    reserve_ratio: ReserveRatio,
    shares_burned: Amount,
) -> Result<Amount> {
    if shares_burned == 0 {
        return Err(VaultError::invalid_input("burn must be > 0"));
    }
    check_pool(current_supply, current_reserve)?;
    if shares_burned > current_supply {
        return Err(VaultError::InsufficientSupply {
            requested: shares_burned,
            outstanding: current_supply,
        });
    }

    // The last holder out takes everything that is left.
    if shares_burned == current_supply {
        return Ok(current_reserve);
    }
    if reserve_ratio.is_linear() {
        return mul_div(current_reserve, shares_burned, current_supply);
    }

    let remaining = current_supply - shares_burned;
    // Ceil the base and floor the exponent: both can only grow the power,
    // which shrinks the amount returned.
    let base = mul_div_ceil(remaining, ONE, current_supply)?;
    let exponent = mul_div(
        u128::from(constants::PPM_ONE),
        ONE,
        u128::from(reserve_ratio.ppm()),
    )?;

    let power = fixed::pow(base, exponent)?;
    let upper = power
        .saturating_add(fixed::error_margin(power, exponent)?)
        .min(ONE);
    mul_div(current_reserve, ONE - upper, ONE)
}

fn to_decimal(value: Amount) -> Result<Decimal> {
    let signed = i128::try_from(value).map_err(|_| VaultError::overflow("decimal conversion"))?;
    Decimal::try_from_i128_with_scale(signed, 0)
        .map_err(|_| VaultError::overflow("decimal conversion"))
}

/// Marginal price of one share, in reserve units. A pool with no supply
/// quotes the 1:1 seed price.
pub fn spot_price(
    current_supply: Amount,
    current_reserve: Amount,
    reserve_ratio: ReserveRatio,
) -> Result<Decimal> {
    check_pool(current_supply, current_reserve)?;
    if current_supply == 0 {
        return Ok(Decimal::ONE);
    }
    let denominator = to_decimal(current_supply)?
        .checked_mul(reserve_ratio.as_decimal())
        .ok_or(VaultError::overflow("spot_price"))?;
    to_decimal(current_reserve)?
        .checked_div(denominator)
        .ok_or(VaultError::overflow("spot_price"))
}
