//! Reserve conservation checker.
//!
//! Invariant checked by every audit, per market and reserve leg:
//! ```text
//! ledger balance == Σ(deposits) - Σ(withdrawals)
//! ```
//!
//! Flows are recorded in the same staged copy as the ledger change they
//! describe, so a rolled-back operation leaves no trace in either.

use std::collections::HashMap;

use argus_types::{Amount, ReserveAsset, Result, VaultError};
use serde::Serialize;

/// Cumulative reserve flows of one market since creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReserveFlows {
    deposits: HashMap<ReserveAsset, Amount>,
    withdrawals: HashMap<ReserveAsset, Amount>,
}

fn bump(map: &mut HashMap<ReserveAsset, Amount>, asset: ReserveAsset, amount: Amount) -> Result<()> {
    let slot = map.entry(asset).or_insert(0);
    *slot = slot
        .checked_add(amount)
        .ok_or(VaultError::overflow("reserve flow total"))?;
    Ok(())
}

impl ReserveFlows {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record reserve entering the market.
    ///
    /// # Errors
    /// `ArithmeticOverflow` if the running total would exceed `u128`.
    pub fn record_deposit(&mut self, asset: ReserveAsset, amount: Amount) -> Result<()> {
        bump(&mut self.deposits, asset, amount)
    }

    /// Record reserve leaving the market.
    ///
    /// # Errors
    /// `ArithmeticOverflow` if the running total would exceed `u128`.
    pub fn record_withdrawal(&mut self, asset: ReserveAsset, amount: Amount) -> Result<()> {
        bump(&mut self.withdrawals, asset, amount)
    }

    #[must_use]
    pub fn total_deposits(&self, asset: ReserveAsset) -> Amount {
        self.deposits.get(&asset).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total_withdrawals(&self, asset: ReserveAsset) -> Amount {
        self.withdrawals.get(&asset).copied().unwrap_or(0)
    }

    /// Deposits minus withdrawals, or `None` if more left than ever came in.
    #[must_use]
    pub fn expected_balance(&self, asset: ReserveAsset) -> Option<Amount> {
        self.total_deposits(asset)
            .checked_sub(self.total_withdrawals(asset))
    }

    /// Check a ledger balance against the recorded flows.
    ///
    /// # Errors
    /// [`VaultError::ConservationViolation`] if they disagree.
    pub fn verify(&self, asset: ReserveAsset, actual: Amount) -> Result<()> {
        if self.expected_balance(asset) == Some(actual) {
            return Ok(());
        }
        Err(VaultError::ConservationViolation {
            reason: format!(
                "{asset}: ledger balance {actual} != deposits {} - withdrawals {}",
                self.total_deposits(asset),
                self.total_withdrawals(asset),
            ),
        })
    }
}
