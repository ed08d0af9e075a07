//! Market registry: identifier allocation and per-market state.
//!
//! Each market lives in its own [`ExclusiveCell`], so operations on
//! different markets proceed independently while operations on one market
//! are serialized. The map lock is held only long enough to clone a slot
//! handle.
//!
//! Creation is two-phase: [`MarketRegistry::draft_market`] validates the
//! parameters, allocates the identifier and builds the opening state, and
//! [`MarketRegistry::register`] makes it visible once the external steps
//! of creation have succeeded. Identifiers come from a monotonic counter
//! and are never reused, so a creation that fails after drafting leaves a
//! gap in the sequence.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard};

use argus_types::{
    Address, Amount, Market, MarketId, MarketStatus, ReserveAsset, ReserveRatio, Result,
    VaultError,
};
use chrono::Utc;

use crate::conservation::ReserveFlows;
use crate::guard::ExclusiveCell;
use crate::ledger::ReserveLedger;

/// Everything the vault knows about one market.
#[derive(Debug, Clone)]
pub struct MarketEntry {
    market: Market,
    ledger: ReserveLedger,
    flows: ReserveFlows,
}

impl MarketEntry {
    #[must_use]
    pub fn market(&self) -> &Market {
        &self.market
    }

    #[must_use]
    pub fn ledger(&self) -> &ReserveLedger {
        &self.ledger
    }

    #[must_use]
    pub fn flows(&self) -> &ReserveFlows {
        &self.flows
    }

    pub(crate) fn ledger_mut(&mut self) -> &mut ReserveLedger {
        &mut self.ledger
    }

    pub(crate) fn flows_mut(&mut self) -> &mut ReserveFlows {
        &mut self.flows
    }

    pub(crate) fn set_status(&mut self, status: MarketStatus) {
        self.market.status = status;
    }

    /// Wrap the entry in its exclusive cell, named after the market.
    #[must_use]
    pub fn into_slot(self) -> MarketSlot {
        Arc::new(ExclusiveCell::new(self.market.id.to_string(), self))
    }
}

/// Shared handle to one market's state.
pub type MarketSlot = Arc<ExclusiveCell<MarketEntry>>;

/// All markets known to a vault.
#[derive(Debug)]
pub struct MarketRegistry {
    next_id: AtomicU64,
    markets: RwLock<HashMap<MarketId, MarketSlot>>,
}

impl MarketRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(MarketId::FIRST.0),
            markets: RwLock::new(HashMap::new()),
        }
    }

    fn markets(&self) -> Result<RwLockReadGuard<'_, HashMap<MarketId, MarketSlot>>> {
        self.markets
            .read()
            .map_err(|_| VaultError::Internal("market registry lock poisoned".into()))
    }

    fn allocate_id(&self) -> MarketId {
        MarketId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Validate creation parameters and build the opening state of a new
    /// market under a freshly allocated identifier. Nothing is visible
    /// until [`Self::register`].
    ///
    /// # Errors
    /// `InvalidCurveInput` for an out-of-range ratio or a zero
    /// `initial_collateral`.
    pub fn draft_market(
        &self,
        creator: Address,
        reserve_ratio_ppm: u32,
        initial_collateral: Amount,
        metadata_uri: &str,
        initial_base: Amount,
    ) -> Result<MarketEntry> {
        let reserve_ratio = ReserveRatio::new(reserve_ratio_ppm)?;
        if initial_collateral == 0 {
            return Err(VaultError::invalid_input("initial collateral must be > 0"));
        }
        let ledger = ReserveLedger::open_market(reserve_ratio, initial_base, initial_collateral)?;
        let mut flows = ReserveFlows::new();
        flows.record_deposit(ReserveAsset::Collateral, initial_collateral)?;
        flows.record_deposit(ReserveAsset::Base, initial_base)?;

        let market = Market {
            id: self.allocate_id(),
            reserve_ratio,
            metadata_uri: metadata_uri.to_owned(),
            creator,
            status: MarketStatus::Active,
            created_at: Utc::now(),
        };
        Ok(MarketEntry {
            market,
            ledger,
            flows,
        })
    }

    /// Make a drafted market visible under `id`. The caller may already be
    /// inside `slot`, in which case other operations on the market wait
    /// for it to leave.
    ///
    /// # Errors
    /// `InvariantViolation` if the identifier is already registered.
    pub fn register(&self, id: MarketId, slot: MarketSlot) -> Result<()> {
        let mut markets = self
            .markets
            .write()
            .map_err(|_| VaultError::Internal("market registry lock poisoned".into()))?;
        if markets.contains_key(&id) {
            return Err(VaultError::InvariantViolation {
                reason: format!("{id} registered twice"),
            });
        }
        markets.insert(id, slot);
        Ok(())
    }

    /// Handle to a market's state.
    ///
    /// # Errors
    /// `MarketNotFound` if `id` was never registered.
    pub fn slot(&self, id: MarketId) -> Result<MarketSlot> {
        self.markets()?
            .get(&id)
            .cloned()
            .ok_or(VaultError::MarketNotFound(id))
    }

    /// Snapshot of a market's metadata.
    ///
    /// # Errors
    /// `MarketNotFound`, or `ReentrantCall` from inside an operation on the
    /// same market.
    pub fn get_market(&self, id: MarketId) -> Result<Market> {
        let slot = self.slot(id)?;
        let entry = slot.enter()?;
        Ok(entry.market().clone())
    }

    /// Registered identifiers in ascending order.
    ///
    /// # Errors
    /// `Internal` if the registry lock was poisoned.
    pub fn ids(&self) -> Result<Vec<MarketId>> {
        let mut ids: Vec<MarketId> = self.markets()?.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}

impl Default for MarketRegistry {
    fn default() -> Self {
        Self::new()
    }
}
