//! Per-market reserve ledger.
//!
//! Tracks the two reserve legs and the outstanding share supply. The fields
//! are private: [`ReserveLedger::apply_issuance`] and
//! [`ReserveLedger::apply_redemption`] are the only ways to change them, and
//! each either applies fully or leaves the ledger untouched.
//!
//! Invariants after every successful mutation:
//! - supply is zero if and only if both reserve legs are zero
//! - issuance grows supply and collateral together
//! - redemption shrinks supply and releases reserve together

use argus_curve::price_to_issue;
use argus_types::{Amount, ReserveRatio, ReserveState, Result, VaultError};

/// Balances and supply of one market.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReserveLedger {
    state: ReserveState,
}

impl ReserveLedger {
    /// Open a market's ledger with its seed deposit. Supply follows the
    /// engine's 1:1 zero-supply rule.
    ///
    /// # Errors
    /// `InvalidCurveInput` if `initial_collateral` is zero.
    pub fn open_market(
        reserve_ratio: ReserveRatio,
        initial_base: Amount,
        initial_collateral: Amount,
    ) -> Result<Self> {
        let shares = price_to_issue(0, 0, reserve_ratio, initial_collateral)?;
        let mut ledger = Self {
            state: ReserveState::default(),
        };
        ledger.apply_issuance(initial_base, initial_collateral, shares)?;
        Ok(ledger)
    }

    #[must_use]
    pub fn state(&self) -> ReserveState {
        self.state
    }

    #[must_use]
    pub fn base_balance(&self) -> Amount {
        self.state.base_balance
    }

    #[must_use]
    pub fn collateral_balance(&self) -> Amount {
        self.state.collateral_balance
    }

    #[must_use]
    pub fn share_supply(&self) -> Amount {
        self.state.share_supply
    }

    fn commit(&mut self, next: ReserveState) -> Result<()> {
        if !next.satisfies_zero_supply_rule() {
            return Err(VaultError::InvariantViolation {
                reason: format!(
                    "supply {} against reserves base={} collateral={}",
                    next.share_supply, next.base_balance, next.collateral_balance
                ),
            });
        }
        self.state = next;
        Ok(())
    }

    /// Add an issuance to the ledger.
    ///
    /// # Errors
    /// - `InvariantViolation` if shares or collateral do not both increase,
    ///   or the result breaks the zero-supply rule
    /// - `ArithmeticOverflow` if a balance would exceed `u128`
    pub fn apply_issuance(
        &mut self,
        base_delta: Amount,
        collateral_delta: Amount,
        shares_delta: Amount,
    ) -> Result<()> {
        if shares_delta == 0 || collateral_delta == 0 {
            return Err(VaultError::InvariantViolation {
                reason: format!(
                    "issuance must grow supply and collateral together \
                     (shares={shares_delta}, collateral={collateral_delta})"
                ),
            });
        }
        let next = ReserveState {
            base_balance: self
                .state
                .base_balance
                .checked_add(base_delta)
                .ok_or(VaultError::overflow("ledger base balance"))?,
            collateral_balance: self
                .state
                .collateral_balance
                .checked_add(collateral_delta)
                .ok_or(VaultError::overflow("ledger collateral balance"))?,
            share_supply: self
                .state
                .share_supply
                .checked_add(shares_delta)
                .ok_or(VaultError::overflow("ledger share supply"))?,
        };
        self.commit(next)
    }

    /// Remove a redemption from the ledger.
    ///
    /// # Errors
    /// - `InsufficientSupply` if `shares_delta` exceeds the supply
    /// - `InsufficientReserve` if either leg would go negative
    /// - `InvariantViolation` if nothing is burned or released, or the
    ///   result breaks the zero-supply rule
    pub fn apply_redemption(
        &mut self,
        base_delta: Amount,
        collateral_delta: Amount,
        shares_delta: Amount,
    ) -> Result<()> {
        if shares_delta == 0 || (base_delta == 0 && collateral_delta == 0) {
            return Err(VaultError::InvariantViolation {
                reason: format!(
                    "redemption must burn shares and release reserve together \
                     (shares={shares_delta}, base={base_delta}, collateral={collateral_delta})"
                ),
            });
        }
        let state = self.state;
        if shares_delta > state.share_supply {
            return Err(VaultError::InsufficientSupply {
                requested: shares_delta,
                outstanding: state.share_supply,
            });
        }
        if collateral_delta > state.collateral_balance {
            return Err(VaultError::InsufficientReserve {
                needed: collateral_delta,
                available: state.collateral_balance,
            });
        }
        if base_delta > state.base_balance {
            return Err(VaultError::InsufficientReserve {
                needed: base_delta,
                available: state.base_balance,
            });
        }
        self.commit(ReserveState {
            base_balance: state.base_balance - base_delta,
            collateral_balance: state.collateral_balance - collateral_delta,
            share_supply: state.share_supply - shares_delta,
        })
    }
}
