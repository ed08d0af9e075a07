//! Quotes (read-only previews) and receipts (results of committed trades).
//!
//! A quote computed against a given ledger state is exactly what the
//! corresponding state-mutating call produces against that same state.

use serde::{Deserialize, Serialize};

use crate::{Amount, MarketId};

/// Preview of an issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueQuote {
    /// Collateral the caller pays, fee included.
    pub collateral_in: Amount,
    /// Portion of `collateral_in` kept as owner fee.
    pub fee: Amount,
    /// Collateral that enters the market reserve.
    pub net_collateral: Amount,
    /// Base currency the vault collects for the base leg.
    pub base_in: Amount,
    /// Shares the caller receives.
    pub shares_out: Amount,
}

/// Preview of a redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemQuote {
    /// Shares burned from the caller.
    pub shares_in: Amount,
    /// Base currency returned.
    pub base_out: Amount,
    /// Collateral returned.
    pub collateral_out: Amount,
}

/// Result of a committed issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueReceipt {
    pub market_id: MarketId,
    pub quote: IssueQuote,
}

impl IssueReceipt {
    #[must_use]
    pub fn shares_issued(&self) -> Amount {
        self.quote.shares_out
    }
}

/// Result of a committed redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemReceipt {
    pub market_id: MarketId,
    pub quote: RedeemQuote,
}

impl RedeemReceipt {
    /// `(base_returned, collateral_returned)`.
    #[must_use]
    pub fn returned(&self) -> (Amount, Amount) {
        (self.quote.base_out, self.quote.collateral_out)
    }
}
