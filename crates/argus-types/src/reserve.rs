//! Reserve snapshot types.
//!
//! A market's reserve has two legs: the collateral token and the network's
//! base currency. [`ReserveState`] is a read-only view of one market's
//! balances and outstanding share supply.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Amount;

/// One leg of a market's reserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum ReserveAsset {
    /// The network's native value, attached to calls.
    Base,
    /// The external fungible collateral token.
    Collateral,
}

impl fmt::Display for ReserveAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base => write!(f, "BASE"),
            Self::Collateral => write!(f, "COLLATERAL"),
        }
    }
}

/// Snapshot of a market's reserve balances and share supply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveState {
    /// Base-currency balance held for the market.
    pub base_balance: Amount,
    /// Collateral-token balance held for the market.
    pub collateral_balance: Amount,
    /// Outstanding shares.
    pub share_supply: Amount,
}

impl ReserveState {
    /// Balance of one reserve leg.
    #[must_use]
    pub fn balance(&self, asset: ReserveAsset) -> Amount {
        match asset {
            ReserveAsset::Base => self.base_balance,
            ReserveAsset::Collateral => self.collateral_balance,
        }
    }

    /// Whether both reserve legs are empty.
    #[must_use]
    pub fn reserves_empty(&self) -> bool {
        self.base_balance == 0 && self.collateral_balance == 0
    }

    /// Supply is zero if and only if both reserves are zero.
    #[must_use]
    pub fn satisfies_zero_supply_rule(&self) -> bool {
        (self.share_supply == 0) == self.reserves_empty()
    }
}
