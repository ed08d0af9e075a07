//! Vault controller: the public surface of the vault.
//!
//! Every public entry point first passes the vault's [`CallGate`]: a thread
//! already inside any vault call (a collaborator calling back) is rejected
//! with `ReentrantCall`, so no thread ever holds one market while waiting
//! on another.
//!
//! Every mutating operation then follows the same shape:
//! 1. Enter the market's exclusive cell (waits for other threads)
//! 2. Quote against the current ledger and validate bounds
//! 3. Stage the ledger and flow changes on a copy
//! 4. Drive the external collaborators, journaling an undo for each step
//! 5. On any failure unwind the journal and return the error; the ledger
//!    and the event log are untouched
//! 6. Commit the staged copy and append exactly one event
//! 7. Release the market and the gate, then deliver the event to sinks

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use argus_curve::{mul_div, mul_div_ceil, price_to_issue, reserve_to_redeem};
use argus_types::{
    Address, Amount, BaseCurrency, CollateralToken, EventRecord, IssueQuote, IssueReceipt, Market,
    MarketId, MarketStatus, RedeemQuote, RedeemReceipt, ReserveAsset, ReserveState, Result,
    ShareToken, VaultConfig, VaultError, VaultEvent, constants,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::conservation::ReserveFlows;
use crate::guard::{CallGate, ExclusiveCell};
use crate::journal::{Compensation, Journal};
use crate::notifier::{EventNotifier, EventSink};
use crate::registry::{MarketEntry, MarketRegistry};

const COLLATERAL_TOKEN: &str = "collateral token";
const SHARE_TOKEN: &str = "share token";
const BASE_CURRENCY: &str = "base currency";

/// The external collaborators a vault drives.
#[derive(Clone)]
pub struct Collaborators {
    pub collateral: Arc<dyn CollateralToken>,
    pub shares: Arc<dyn ShareToken>,
    pub base: Arc<dyn BaseCurrency>,
}

impl Collaborators {
    #[must_use]
    pub fn new(
        collateral: Arc<dyn CollateralToken>,
        shares: Arc<dyn ShareToken>,
        base: Arc<dyn BaseCurrency>,
    ) -> Self {
        Self {
            collateral,
            shares,
            base,
        }
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl From<argus_types::testing::InMemoryCollaborators> for Collaborators {
    fn from(mem: argus_types::testing::InMemoryCollaborators) -> Self {
        Self::new(mem.collateral, mem.shares, mem.base)
    }
}

/// One market's line in an [`AuditReport`].
#[derive(Debug, Clone, Serialize)]
pub struct MarketAudit {
    pub market_id: MarketId,
    pub status: MarketStatus,
    pub reserves: ReserveState,
    pub flows: ReserveFlows,
}

/// Result of a successful [`VaultController::audit`].
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub generated_at: DateTime<Utc>,
    pub markets: Vec<MarketAudit>,
    pub owner_fees: Amount,
    /// Collateral the vault owes: every ledger plus accrued fees.
    pub collateral_owed: Amount,
    /// Collateral the token reports for the vault address.
    pub collateral_held: Amount,
    /// Hex digest of the newest event record.
    pub event_head: String,
}

/// Bonding-curve vault over a set of markets.
pub struct VaultController {
    config: VaultConfig,
    gate: CallGate,
    fee_ppm: AtomicU32,
    owner_fees: ExclusiveCell<Amount>,
    registry: MarketRegistry,
    collaborators: Collaborators,
    notifier: EventNotifier,
}

impl VaultController {
    /// Build a vault from a validated config.
    ///
    /// # Errors
    /// `Configuration` if `config` fails validation.
    pub fn new(config: VaultConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        tracing::info!(
            owner = %config.owner,
            vault = %config.vault_address,
            fee_ppm = config.issuance_fee_ppm,
            "{} vault v{} initialized",
            constants::ENGINE_NAME,
            constants::VERSION
        );
        Ok(Self {
            gate: CallGate::new("vault"),
            fee_ppm: AtomicU32::new(config.issuance_fee_ppm),
            owner_fees: ExclusiveCell::new("owner fees", 0),
            registry: MarketRegistry::new(),
            notifier: EventNotifier::new(),
            config,
            collaborators,
        })
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    #[must_use]
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    #[must_use]
    pub fn owner(&self) -> Address {
        self.config.owner
    }

    #[must_use]
    pub fn vault_address(&self) -> Address {
        self.config.vault_address
    }

    #[must_use]
    pub fn notifier(&self) -> &EventNotifier {
        &self.notifier
    }

    /// Every event emitted so far, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<EventRecord> {
        self.notifier.records()
    }

    pub fn subscribe(&self, sink: Arc<dyn EventSink>) {
        self.notifier.subscribe(sink);
    }

    #[must_use]
    pub fn issuance_fee_ppm(&self) -> u32 {
        self.fee_ppm.load(Ordering::SeqCst)
    }

    /// Issuance fees accrued and not yet withdrawn.
    ///
    /// # Errors
    /// `ReentrantCall` from inside another vault call.
    pub fn accrued_fees(&self) -> Result<Amount> {
        let _pass = self.gate.enter()?;
        Ok(*self.owner_fees.enter()?)
    }

    /// Run `operation` as the calling thread's only vault call. Its event,
    /// if any, reaches the sinks after every lock it took is released.
    fn run<T>(&self, operation: impl FnOnce() -> Result<(T, Option<EventRecord>)>) -> Result<T> {
        let pass = self.gate.enter()?;
        let (value, record) = operation()?;
        drop(pass);
        if let Some(record) = record {
            self.notifier.deliver(&record);
        }
        Ok(value)
    }

    fn require_owner(&self, caller: Address) -> Result<()> {
        if caller == self.config.owner {
            Ok(())
        } else {
            tracing::warn!(caller = %caller, "owner-only call rejected");
            Err(VaultError::Unauthorized { caller })
        }
    }

    fn check_metadata_uri(&self, uri: &str) -> Result<()> {
        if uri.trim().is_empty() {
            return Err(VaultError::InvalidMetadataUri {
                reason: "metadata URI is empty".into(),
            });
        }
        if uri.len() > self.config.max_metadata_uri_len {
            return Err(VaultError::InvalidMetadataUri {
                reason: format!(
                    "metadata URI is {} bytes, limit is {}",
                    uri.len(),
                    self.config.max_metadata_uri_len
                ),
            });
        }
        if uri.chars().any(char::is_control) {
            return Err(VaultError::InvalidMetadataUri {
                reason: "metadata URI contains control characters".into(),
            });
        }
        Ok(())
    }

    /// Undo the journal after `cause` and decide what the caller sees.
    fn abort(&self, journal: Journal, operation: &'static str, cause: VaultError) -> VaultError {
        if journal.is_empty() {
            return cause;
        }
        let steps = journal.len();
        match journal.unwind(&self.collaborators, self.config.vault_address) {
            Ok(()) => {
                tracing::debug!(operation, steps, error = %cause, "journal unwound");
                cause
            }
            Err(failure) => {
                tracing::error!(
                    operation,
                    steps,
                    cause = %cause,
                    error = %failure,
                    "compensation failed, collaborator state diverged from the ledger"
                );
                VaultError::CompensationFailed {
                    reason: format!("{cause}; {failure}"),
                }
            }
        }
    }

    fn accrue_fee(&self, fee: Amount) -> Result<()> {
        if fee == 0 {
            return Ok(());
        }
        let mut fees = self.owner_fees.enter()?;
        *fees = fees
            .checked_add(fee)
            .ok_or(VaultError::overflow("owner fee account"))?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------

    /// Open a market seeded with `initial_amount` collateral pulled from
    /// `caller` and all of `attached_base`. The creator receives
    /// `initial_amount` shares.
    ///
    /// # Errors
    /// - `InvalidCurveInput` for a bad ratio or an amount below the
    ///   configured minimum
    /// - `InvalidMetadataUri` for an empty, oversized or malformed URI
    /// - `TransferFailed` if a collaborator declines; nothing is created
    /// - `ReentrantCall` from inside another vault call
    pub fn create_market(
        &self,
        caller: Address,
        reserve_ratio_ppm: u32,
        initial_amount: Amount,
        metadata_uri: &str,
        attached_base: Amount,
    ) -> Result<MarketId> {
        self.run(|| {
            self.create_inner(
                caller,
                reserve_ratio_ppm,
                initial_amount,
                metadata_uri,
                attached_base,
            )
        })
    }

    fn create_inner(
        &self,
        caller: Address,
        reserve_ratio_ppm: u32,
        initial_amount: Amount,
        metadata_uri: &str,
        attached_base: Amount,
    ) -> Result<(MarketId, Option<EventRecord>)> {
        self.check_metadata_uri(metadata_uri)?;
        if initial_amount < self.config.min_initial_collateral {
            return Err(VaultError::invalid_input(format!(
                "initial collateral {initial_amount} below minimum {}",
                self.config.min_initial_collateral
            )));
        }
        let entry = self.registry.draft_market(
            caller,
            reserve_ratio_ppm,
            initial_amount,
            metadata_uri,
            attached_base,
        )?;
        let market_id = entry.market().id;
        let reserve_ratio = entry.market().reserve_ratio;
        let initial_shares = entry.ledger().share_supply();

        let mut journal = Journal::new();
        if let Err(cause) = self.seed_market(
            &mut journal,
            caller,
            market_id,
            initial_amount,
            attached_base,
            initial_shares,
            metadata_uri,
        ) {
            return Err(self.abort(journal, "create_market", cause));
        }

        // Publish while inside the new market so nothing can touch it
        // before its creation event is in the log.
        let slot = entry.into_slot();
        let guard = match slot.enter() {
            Ok(guard) => guard,
            Err(cause) => return Err(self.abort(journal, "create_market", cause)),
        };
        if let Err(cause) = self.registry.register(market_id, Arc::clone(&slot)) {
            return Err(self.abort(journal, "create_market", cause));
        }
        let record = self.notifier.append(VaultEvent::MarketCreated {
            creator: caller,
            market_id,
            reserve_ratio,
            metadata_uri: metadata_uri.to_owned(),
            initial_collateral: initial_amount,
            initial_base: attached_base,
            initial_shares,
        });
        drop(guard);

        tracing::info!(
            market = %market_id,
            creator = %caller,
            reserve_ratio = %reserve_ratio,
            collateral = %initial_amount,
            base = %attached_base,
            shares = %initial_shares,
            "market created"
        );
        Ok((market_id, Some(record)))
    }

    #[allow(clippy::too_many_arguments)]
    fn seed_market(
        &self,
        journal: &mut Journal,
        caller: Address,
        market_id: MarketId,
        collateral: Amount,
        base: Amount,
        shares: Amount,
        metadata_uri: &str,
    ) -> Result<()> {
        let vault = self.config.vault_address;
        journal.step(
            self.collaborators
                .collateral
                .transfer_from(caller, vault, collateral),
            COLLATERAL_TOKEN,
            "transfer_from",
            Compensation::RefundCollateral {
                to: caller,
                amount: collateral,
            },
        )?;
        if base > 0 {
            journal.step(
                self.collaborators.base.collect(caller, base),
                BASE_CURRENCY,
                "collect",
                Compensation::RefundBase {
                    to: caller,
                    amount: base,
                },
            )?;
        }
        journal.step(
            self.collaborators.shares.mint(market_id, caller, shares),
            SHARE_TOKEN,
            "mint",
            Compensation::BurnShares {
                market: market_id,
                holder: caller,
                amount: shares,
            },
        )?;
        // Last external step: the URI is write-once and has no undo.
        if !self.collaborators.shares.set_uri(market_id, metadata_uri) {
            return Err(VaultError::TransferFailed {
                collaborator: SHARE_TOKEN,
                operation: "set_uri",
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    /// # Errors
    /// `MarketNotFound`, or `ReentrantCall` from inside another vault call.
    pub fn get_market(&self, market_id: MarketId) -> Result<Market> {
        let _pass = self.gate.enter()?;
        self.registry.get_market(market_id)
    }

    /// Identifiers of every market, ascending.
    ///
    /// # Errors
    /// `ReentrantCall` from inside another vault call; `Internal` if the
    /// registry lock was poisoned.
    pub fn market_ids(&self) -> Result<Vec<MarketId>> {
        let _pass = self.gate.enter()?;
        self.registry.ids()
    }

    /// Current balances and supply of a market.
    ///
    /// # Errors
    /// `MarketNotFound`, or `ReentrantCall` from inside another vault call.
    pub fn reserve_state(&self, market_id: MarketId) -> Result<ReserveState> {
        let _pass = self.gate.enter()?;
        let slot = self.registry.slot(market_id)?;
        let entry = slot.enter()?;
        Ok(entry.ledger().state())
    }

    /// Marginal price of one share in collateral units.
    ///
    /// # Errors
    /// `MarketNotFound`, or `ReentrantCall` from inside another vault call.
    pub fn spot_price(&self, market_id: MarketId) -> Result<Decimal> {
        let _pass = self.gate.enter()?;
        let slot = self.registry.slot(market_id)?;
        let entry = slot.enter()?;
        let state = entry.ledger().state();
        argus_curve::spot_price(
            state.share_supply,
            state.collateral_balance,
            entry.market().reserve_ratio,
        )
    }

    /// What [`Self::issue`] would do for `collateral_amount` with
    /// `attached_base` attached, right now at the current fee. On a market
    /// with zero supply `base_in` is all of `attached_base`, as issuing
    /// would take; otherwise it is the proportional leg, which `issue`
    /// requires `attached_base` to cover.
    ///
    /// # Errors
    /// Same pricing errors as `issue`.
    pub fn quote_issue(
        &self,
        market_id: MarketId,
        collateral_amount: Amount,
        attached_base: Amount,
    ) -> Result<IssueQuote> {
        let _pass = self.gate.enter()?;
        let slot = self.registry.slot(market_id)?;
        let entry = slot.enter()?;
        let quote = price_issue(
            &entry,
            collateral_amount,
            attached_base,
            self.issuance_fee_ppm(),
        )?;
        tracing::debug!(market = %market_id, shares = %quote.shares_out, "issue quoted");
        Ok(quote)
    }

    /// What [`Self::redeem`] would return for `shares_amount` right now.
    ///
    /// # Errors
    /// Same pricing errors as `redeem`.
    pub fn quote_redeem(&self, market_id: MarketId, shares_amount: Amount) -> Result<RedeemQuote> {
        let _pass = self.gate.enter()?;
        let slot = self.registry.slot(market_id)?;
        let entry = slot.enter()?;
        let quote = price_redeem(&entry, shares_amount)?;
        tracing::debug!(
            market = %market_id,
            collateral = %quote.collateral_out,
            base = %quote.base_out,
            "redeem quoted"
        );
        Ok(quote)
    }

    // -----------------------------------------------------------------
    // Issuance
    // -----------------------------------------------------------------

    /// Buy shares with `collateral_amount` collateral plus the proportional
    /// base currency out of `attached_base`.
    ///
    /// # Errors
    /// - `MarketPaused` if issuance is disabled
    /// - `InsufficientAttachedValue` if `attached_base` is below the base leg
    /// - `SlippageExceeded` if fewer than `min_shares_out` shares result
    /// - `InvalidCurveInput` for a zero or dust deposit
    /// - `TransferFailed` if a collaborator declines
    /// - `ReentrantCall` from inside another vault call
    pub fn issue(
        &self,
        caller: Address,
        market_id: MarketId,
        collateral_amount: Amount,
        attached_base: Amount,
        min_shares_out: Amount,
    ) -> Result<IssueReceipt> {
        self.run(|| {
            let (receipt, record) = self.issue_inner(
                caller,
                market_id,
                collateral_amount,
                attached_base,
                min_shares_out,
            )?;
            Ok((receipt, Some(record)))
        })
    }

    fn issue_inner(
        &self,
        caller: Address,
        market_id: MarketId,
        collateral_amount: Amount,
        attached_base: Amount,
        min_shares_out: Amount,
    ) -> Result<(IssueReceipt, EventRecord)> {
        let slot = self.registry.slot(market_id)?;
        let mut entry = slot.enter()?;
        if !entry.market().issuance_allowed() {
            tracing::warn!(market = %market_id, caller = %caller, "issuance rejected: market paused");
            return Err(VaultError::MarketPaused(market_id));
        }

        let quote = price_issue(&entry, collateral_amount, attached_base, self.issuance_fee_ppm())?;
        if quote.base_in > attached_base {
            tracing::warn!(
                market = %market_id,
                caller = %caller,
                needed = %quote.base_in,
                attached = %attached_base,
                "issuance rejected: attached base below proportional leg"
            );
            return Err(VaultError::InsufficientAttachedValue {
                needed: quote.base_in,
                attached: attached_base,
            });
        }
        if quote.shares_out < min_shares_out {
            tracing::warn!(
                market = %market_id,
                caller = %caller,
                quoted = %quote.shares_out,
                minimum = %min_shares_out,
                "issuance rejected: slippage"
            );
            return Err(VaultError::SlippageExceeded {
                quoted: quote.shares_out,
                minimum: min_shares_out,
            });
        }

        let mut staged = MarketEntry::clone(&entry);
        staged
            .ledger_mut()
            .apply_issuance(quote.base_in, quote.net_collateral, quote.shares_out)?;
        staged
            .flows_mut()
            .record_deposit(ReserveAsset::Collateral, quote.net_collateral)?;
        staged
            .flows_mut()
            .record_deposit(ReserveAsset::Base, quote.base_in)?;

        let mut journal = Journal::new();
        let settled = self
            .collect_issue(&mut journal, caller, market_id, &quote)
            .and_then(|()| self.accrue_fee(quote.fee));
        if let Err(cause) = settled {
            return Err(self.abort(journal, "issue", cause));
        }

        *entry = staged;
        let record = self.notifier.append(VaultEvent::SharesIssued {
            caller,
            market_id,
            shares_issued: quote.shares_out,
            collateral_in: quote.collateral_in,
            base_in: quote.base_in,
            fee: quote.fee,
        });
        tracing::info!(
            market = %market_id,
            caller = %caller,
            shares = %quote.shares_out,
            collateral = %quote.collateral_in,
            base = %quote.base_in,
            fee = %quote.fee,
            "shares issued"
        );
        Ok((IssueReceipt { market_id, quote }, record))
    }

    fn collect_issue(
        &self,
        journal: &mut Journal,
        caller: Address,
        market_id: MarketId,
        quote: &IssueQuote,
    ) -> Result<()> {
        journal.step(
            self.collaborators.collateral.transfer_from(
                caller,
                self.config.vault_address,
                quote.collateral_in,
            ),
            COLLATERAL_TOKEN,
            "transfer_from",
            Compensation::RefundCollateral {
                to: caller,
                amount: quote.collateral_in,
            },
        )?;
        if quote.base_in > 0 {
            journal.step(
                self.collaborators.base.collect(caller, quote.base_in),
                BASE_CURRENCY,
                "collect",
                Compensation::RefundBase {
                    to: caller,
                    amount: quote.base_in,
                },
            )?;
        }
        journal.step(
            self.collaborators
                .shares
                .mint(market_id, caller, quote.shares_out),
            SHARE_TOKEN,
            "mint",
            Compensation::BurnShares {
                market: market_id,
                holder: caller,
                amount: quote.shares_out,
            },
        )
    }

    // -----------------------------------------------------------------
    // Redemption
    // -----------------------------------------------------------------

    /// Burn `shares_amount` of the caller's shares for their slice of both
    /// reserve legs. Available while the market is paused.
    ///
    /// # Errors
    /// - `SlippageExceeded` if the collateral leg is below `min_reserve_out`
    /// - `InsufficientSupply` if more shares than outstanding are burned
    /// - `InvalidCurveInput` for a zero or dust burn
    /// - `TransferFailed` if the burn or a payout is declined
    /// - `ReentrantCall` from inside another vault call
    pub fn redeem(
        &self,
        caller: Address,
        market_id: MarketId,
        shares_amount: Amount,
        min_reserve_out: Amount,
    ) -> Result<RedeemReceipt> {
        self.run(|| {
            let (receipt, record) =
                self.redeem_inner(caller, market_id, shares_amount, min_reserve_out)?;
            Ok((receipt, Some(record)))
        })
    }

    fn redeem_inner(
        &self,
        caller: Address,
        market_id: MarketId,
        shares_amount: Amount,
        min_reserve_out: Amount,
    ) -> Result<(RedeemReceipt, EventRecord)> {
        let slot = self.registry.slot(market_id)?;
        let mut entry = slot.enter()?;

        let quote = price_redeem(&entry, shares_amount)?;
        if quote.collateral_out < min_reserve_out {
            tracing::warn!(
                market = %market_id,
                caller = %caller,
                quoted = %quote.collateral_out,
                minimum = %min_reserve_out,
                "redemption rejected: slippage"
            );
            return Err(VaultError::SlippageExceeded {
                quoted: quote.collateral_out,
                minimum: min_reserve_out,
            });
        }

        let mut staged = MarketEntry::clone(&entry);
        staged
            .ledger_mut()
            .apply_redemption(quote.base_out, quote.collateral_out, quote.shares_in)?;
        staged
            .flows_mut()
            .record_withdrawal(ReserveAsset::Collateral, quote.collateral_out)?;
        staged
            .flows_mut()
            .record_withdrawal(ReserveAsset::Base, quote.base_out)?;

        let mut journal = Journal::new();
        if let Err(cause) = self.pay_redemption(&mut journal, caller, market_id, &quote) {
            return Err(self.abort(journal, "redeem", cause));
        }

        *entry = staged;
        let record = self.notifier.append(VaultEvent::SharesRedeemed {
            caller,
            market_id,
            shares_burned: quote.shares_in,
            base_returned: quote.base_out,
            collateral_returned: quote.collateral_out,
        });
        tracing::info!(
            market = %market_id,
            caller = %caller,
            shares = %quote.shares_in,
            collateral = %quote.collateral_out,
            base = %quote.base_out,
            "shares redeemed"
        );
        Ok((RedeemReceipt { market_id, quote }, record))
    }

    fn pay_redemption(
        &self,
        journal: &mut Journal,
        caller: Address,
        market_id: MarketId,
        quote: &RedeemQuote,
    ) -> Result<()> {
        // Burn before paying anything out.
        journal.step(
            self.collaborators
                .shares
                .burn_from(market_id, caller, quote.shares_in),
            SHARE_TOKEN,
            "burn_from",
            Compensation::RemintShares {
                market: market_id,
                holder: caller,
                amount: quote.shares_in,
            },
        )?;
        if quote.collateral_out > 0 {
            journal.step(
                self.collaborators
                    .collateral
                    .transfer(caller, quote.collateral_out),
                COLLATERAL_TOKEN,
                "transfer",
                Compensation::ReclaimCollateral {
                    from: caller,
                    amount: quote.collateral_out,
                },
            )?;
        }
        if quote.base_out > 0 {
            journal.step(
                self.collaborators.base.pay(caller, quote.base_out),
                BASE_CURRENCY,
                "pay",
                Compensation::ReclaimBase {
                    from: caller,
                    amount: quote.base_out,
                },
            )?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Owner controls
    // -----------------------------------------------------------------

    /// Pause or resume issuance on a market. Setting the current state
    /// again is a no-op and emits nothing.
    ///
    /// # Errors
    /// `Unauthorized` unless `caller` is the owner; `MarketNotFound`.
    pub fn set_paused(&self, caller: Address, market_id: MarketId, paused: bool) -> Result<()> {
        self.run(|| self.set_paused_inner(caller, market_id, paused))
    }

    fn set_paused_inner(
        &self,
        caller: Address,
        market_id: MarketId,
        paused: bool,
    ) -> Result<((), Option<EventRecord>)> {
        self.require_owner(caller)?;
        let slot = self.registry.slot(market_id)?;
        let mut entry = slot.enter()?;
        let target = if paused {
            MarketStatus::Paused
        } else {
            MarketStatus::Active
        };
        if entry.market().status == target {
            return Ok(((), None));
        }
        entry.set_status(target);
        let record = self.notifier.append(if paused {
            VaultEvent::MarketPaused {
                market_id,
                by: caller,
            }
        } else {
            VaultEvent::MarketUnpaused {
                market_id,
                by: caller,
            }
        });
        tracing::info!(market = %market_id, status = %target, "market status changed");
        Ok(((), Some(record)))
    }

    /// Change the issuance fee for future issuance.
    ///
    /// # Errors
    /// `Unauthorized` unless `caller` is the owner; `InvalidCurveInput`
    /// above the fee ceiling.
    pub fn set_issuance_fee(&self, caller: Address, fee_ppm: u32) -> Result<()> {
        self.run(|| {
            self.require_owner(caller)?;
            if fee_ppm > constants::MAX_ISSUANCE_FEE_PPM {
                return Err(VaultError::invalid_input(format!(
                    "issuance fee {fee_ppm} ppm exceeds maximum {}",
                    constants::MAX_ISSUANCE_FEE_PPM
                )));
            }
            let old_ppm = self.fee_ppm.swap(fee_ppm, Ordering::SeqCst);
            let record = self.notifier.append(VaultEvent::IssuanceFeeChanged {
                old_ppm,
                new_ppm: fee_ppm,
            });
            tracing::info!(old_ppm, new_ppm = fee_ppm, "issuance fee changed");
            Ok(((), Some(record)))
        })
    }

    /// Send `amount` of accrued fee collateral to `to`.
    ///
    /// # Errors
    /// - `Unauthorized` unless `caller` is the owner
    /// - `InvalidCurveInput` for a zero amount
    /// - `InsufficientReserve` if more than the accrued fees is requested
    /// - `TransferFailed` if the collateral token declines
    pub fn withdraw_owner_fee(&self, caller: Address, to: Address, amount: Amount) -> Result<()> {
        self.run(|| self.withdraw_inner(caller, to, amount))
    }

    fn withdraw_inner(
        &self,
        caller: Address,
        to: Address,
        amount: Amount,
    ) -> Result<((), Option<EventRecord>)> {
        self.require_owner(caller)?;
        if amount == 0 {
            return Err(VaultError::invalid_input("withdrawal must be > 0"));
        }
        let mut fees = self.owner_fees.enter()?;
        if *fees < amount {
            return Err(VaultError::InsufficientReserve {
                needed: amount,
                available: *fees,
            });
        }
        if !self.collaborators.collateral.transfer(to, amount) {
            return Err(VaultError::TransferFailed {
                collaborator: COLLATERAL_TOKEN,
                operation: "transfer",
            });
        }
        *fees -= amount;
        let record = self.notifier.append(VaultEvent::OwnerFeeWithdrawn { to, amount });
        tracing::info!(to = %to, amount = %amount, remaining = %*fees, "owner fee withdrawn");
        Ok(((), Some(record)))
    }

    // -----------------------------------------------------------------
    // Audit
    // -----------------------------------------------------------------

    /// Check every market's ledger against its recorded flows and the
    /// zero-supply rule, and the vault's collateral custody against
    /// everything it owes. Holds every market while it reads custody.
    ///
    /// # Errors
    /// `ConservationViolation` or `InvariantViolation` on the first broken
    /// invariant; `ReentrantCall` from inside another vault call.
    pub fn audit(&self) -> Result<AuditReport> {
        let _pass = self.gate.enter()?;
        let result = self.run_audit();
        if let Err(err) = &result {
            if !matches!(err, VaultError::ReentrantCall { .. }) {
                tracing::error!(error = %err, "vault audit failed");
            }
        }
        result
    }

    fn run_audit(&self) -> Result<AuditReport> {
        let slots = self
            .registry
            .ids()?
            .into_iter()
            .map(|id| self.registry.slot(id))
            .collect::<Result<Vec<_>>>()?;
        // Ascending id order; no other call holds two markets at once.
        let guards = slots
            .iter()
            .map(|slot| slot.enter())
            .collect::<Result<Vec<_>>>()?;
        let fees = self.owner_fees.enter()?;
        let owner_fees = *fees;

        let mut markets = Vec::with_capacity(guards.len());
        let mut collateral_owed = owner_fees;
        for entry in &guards {
            let market_id = entry.market().id;
            let state = entry.ledger().state();
            if !state.satisfies_zero_supply_rule() {
                return Err(VaultError::InvariantViolation {
                    reason: format!("{market_id}: supply and reserves disagree on emptiness"),
                });
            }
            for asset in [ReserveAsset::Collateral, ReserveAsset::Base] {
                entry
                    .flows()
                    .verify(asset, state.balance(asset))
                    .map_err(|err| match err {
                        VaultError::ConservationViolation { reason } => {
                            VaultError::ConservationViolation {
                                reason: format!("{market_id}: {reason}"),
                            }
                        }
                        other => other,
                    })?;
            }
            collateral_owed = collateral_owed
                .checked_add(state.collateral_balance)
                .ok_or(VaultError::overflow("audit collateral total"))?;
            markets.push(MarketAudit {
                market_id,
                status: entry.market().status,
                reserves: state,
                flows: entry.flows().clone(),
            });
        }

        let collateral_held = self
            .collaborators
            .collateral
            .balance_of(self.config.vault_address);
        drop(fees);
        drop(guards);
        if collateral_held < collateral_owed {
            return Err(VaultError::ConservationViolation {
                reason: format!(
                    "vault holds {collateral_held} collateral but owes {collateral_owed}"
                ),
            });
        }

        Ok(AuditReport {
            generated_at: Utc::now(),
            markets,
            owner_fees,
            collateral_owed,
            collateral_held,
            event_head: hex::encode(self.notifier.head_digest()),
        })
    }
}

// ---------------------------------------------------------------------
// Pricing
// ---------------------------------------------------------------------

fn price_issue(
    entry: &MarketEntry,
    collateral_amount: Amount,
    attached_base: Amount,
    fee_ppm: u32,
) -> Result<IssueQuote> {
    if collateral_amount == 0 {
        return Err(VaultError::invalid_input("collateral amount must be > 0"));
    }
    let fee = mul_div(
        collateral_amount,
        u128::from(fee_ppm),
        u128::from(constants::PPM_ONE),
    )?;
    let net_collateral = collateral_amount - fee;
    if net_collateral == 0 {
        return Err(VaultError::invalid_input("deposit consumed entirely by fee"));
    }

    let state = entry.ledger().state();
    let ratio = entry.market().reserve_ratio;
    let (base_in, shares_out) = if state.share_supply == 0 {
        (attached_base, price_to_issue(0, 0, ratio, net_collateral)?)
    } else {
        (
            mul_div_ceil(state.base_balance, net_collateral, state.collateral_balance)?,
            price_to_issue(
                state.share_supply,
                state.collateral_balance,
                ratio,
                net_collateral,
            )?,
        )
    };
    if shares_out == 0 {
        return Err(VaultError::invalid_input(format!(
            "deposit of {collateral_amount} is too small to issue a share"
        )));
    }
    Ok(IssueQuote {
        collateral_in: collateral_amount,
        fee,
        net_collateral,
        base_in,
        shares_out,
    })
}

fn price_redeem(entry: &MarketEntry, shares_amount: Amount) -> Result<RedeemQuote> {
    if shares_amount == 0 {
        return Err(VaultError::invalid_input("shares amount must be > 0"));
    }
    let state = entry.ledger().state();
    if shares_amount > state.share_supply {
        return Err(VaultError::InsufficientSupply {
            requested: shares_amount,
            outstanding: state.share_supply,
        });
    }
    let collateral_out = reserve_to_redeem(
        state.share_supply,
        state.collateral_balance,
        entry.market().reserve_ratio,
        shares_amount,
    )?;
    let base_out = if shares_amount == state.share_supply {
        state.base_balance
    } else {
        mul_div(state.base_balance, collateral_out, state.collateral_balance)?
    };
    if collateral_out == 0 && base_out == 0 {
        return Err(VaultError::invalid_input(format!(
            "burn of {shares_amount} shares is too small to release reserve"
        )));
    }
    Ok(RedeemQuote {
        shares_in: shares_amount,
        base_out,
        collateral_out,
    })
}
