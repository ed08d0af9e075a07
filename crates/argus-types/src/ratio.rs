//! Amounts and the reserve ratio.
//!
//! All balances are non-negative integers in the smallest unit of their
//! asset. The reserve ratio is a parts-per-million fraction in
//! `1..=1_000_000` that sets the curve's steepness.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Result, VaultError, constants};

/// An amount in the smallest unit of an asset (collateral, base currency,
/// or shares).
pub type Amount = u128;

/// Validated reserve ratio in parts-per-million.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ReserveRatio(u32);

impl ReserveRatio {
    /// The linear curve: price stays constant as supply grows.
    pub const LINEAR: Self = Self(constants::MAX_RESERVE_RATIO_PPM);

    /// Build a ratio, rejecting 0 and anything above 1,000,000.
    pub fn new(ppm: u32) -> Result<Self> {
        if !(constants::MIN_RESERVE_RATIO_PPM..=constants::MAX_RESERVE_RATIO_PPM).contains(&ppm) {
            return Err(VaultError::invalid_input(format!(
                "reserve ratio {ppm} ppm outside {}..={}",
                constants::MIN_RESERVE_RATIO_PPM,
                constants::MAX_RESERVE_RATIO_PPM
            )));
        }
        Ok(Self(ppm))
    }

    #[must_use]
    pub fn ppm(self) -> u32 {
        self.0
    }

    /// Whether this ratio takes the exact linear path in the engine.
    #[must_use]
    pub fn is_linear(self) -> bool {
        self.0 == constants::MAX_RESERVE_RATIO_PPM
    }

    /// The ratio as an exact decimal fraction (e.g. `0.5` for 500,000 ppm).
    #[must_use]
    pub fn as_decimal(self) -> Decimal {
        Decimal::new(i64::from(self.0), 6)
    }
}

impl TryFrom<u32> for ReserveRatio {
    type Error = VaultError;

    fn try_from(ppm: u32) -> Result<Self> {
        Self::new(ppm)
    }
}

impl From<ReserveRatio> for u32 {
    fn from(ratio: ReserveRatio) -> Self {
        ratio.0
    }
}

impl fmt::Display for ReserveRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", (self.as_decimal() * Decimal::ONE_HUNDRED).normalize())
    }
}
