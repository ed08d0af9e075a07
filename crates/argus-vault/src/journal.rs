//! Compensation journal for multi-step operations.
//!
//! Every external step that succeeds records the step that undoes it. If a
//! later step fails, the journal runs the undo steps newest-first so the
//! collaborators end where they started. Ledger changes are never in the
//! journal: they are staged on a copy and only committed after every
//! external step has succeeded.

use argus_types::{Address, Amount, MarketId, Result, VaultError};

use crate::controller::Collaborators;

/// The inverse of one successful external step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compensation {
    /// Undo a `transfer_from` into the vault.
    RefundCollateral { to: Address, amount: Amount },
    /// Undo a base-currency `collect`.
    RefundBase { to: Address, amount: Amount },
    /// Undo a `mint`.
    BurnShares {
        market: MarketId,
        holder: Address,
        amount: Amount,
    },
    /// Undo a `burn_from`.
    RemintShares {
        market: MarketId,
        holder: Address,
        amount: Amount,
    },
    /// Undo a collateral `transfer` out of the vault.
    ReclaimCollateral { from: Address, amount: Amount },
    /// Undo a base-currency `pay`.
    ReclaimBase { from: Address, amount: Amount },
}

impl Compensation {
    fn apply(self, collaborators: &Collaborators, vault: Address) -> bool {
        match self {
            Self::RefundCollateral { to, amount } => collaborators.collateral.transfer(to, amount),
            Self::RefundBase { to, amount } => collaborators.base.pay(to, amount),
            Self::BurnShares {
                market,
                holder,
                amount,
            } => collaborators.shares.burn_from(market, holder, amount),
            Self::RemintShares {
                market,
                holder,
                amount,
            } => collaborators.shares.mint(market, holder, amount),
            Self::ReclaimCollateral { from, amount } => {
                collaborators.collateral.transfer_from(from, vault, amount)
            }
            Self::ReclaimBase { from, amount } => collaborators.base.collect(from, amount),
        }
    }
}

/// Undo log of one in-flight operation.
#[derive(Debug, Default)]
pub struct Journal {
    steps: Vec<Compensation>,
}

impl Journal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the result of an external call. On success the inverse is
    /// remembered; on failure the call is reported as declined.
    ///
    /// # Errors
    /// [`VaultError::TransferFailed`] if `succeeded` is false.
    pub fn step(
        &mut self,
        succeeded: bool,
        collaborator: &'static str,
        operation: &'static str,
        undo: Compensation,
    ) -> Result<()> {
        if !succeeded {
            return Err(VaultError::TransferFailed {
                collaborator,
                operation,
            });
        }
        self.steps.push(undo);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every recorded compensation, newest first. Keeps going past a
    /// failed compensation so as much as possible is restored.
    ///
    /// # Errors
    /// [`VaultError::CompensationFailed`] listing every step that declined.
    pub fn unwind(self, collaborators: &Collaborators, vault: Address) -> Result<()> {
        let failed: Vec<String> = self
            .steps
            .into_iter()
            .rev()
            .filter(|step| {
                let ok = step.apply(collaborators, vault);
                tracing::debug!(?step, ok, "compensation applied");
                !ok
            })
            .map(|step| format!("{step:?}"))
            .collect();
        if failed.is_empty() {
            Ok(())
        } else {
            Err(VaultError::CompensationFailed {
                reason: failed.join("; "),
            })
        }
    }
}
