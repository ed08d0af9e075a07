//! In-memory collaborator doubles for tests (feature `test-helpers`).
//!
//! Each double keeps real balances, so conservation can be checked from the
//! outside, and exposes switches that make a given call decline. An
//! optional hook runs at the start of `CollateralToken::transfer_from`,
//! before any balance moves, to simulate a collaborator that calls back
//! into the vault.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{Address, Amount, BaseCurrency, CollateralToken, MarketId, ShareToken};

type Hook = Arc<dyn Fn(Address, Amount) + Send + Sync>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // Test doubles: a poisoned lock means another test thread already panicked.
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn debit(balances: &mut HashMap<Address, Amount>, who: Address, amount: Amount) -> bool {
    let bal = balances.entry(who).or_default();
    if *bal < amount {
        return false;
    }
    *bal -= amount;
    true
}

// ---------------------------------------------------------------------------
// Collateral
// ---------------------------------------------------------------------------

/// Fungible collateral token with allowances granted to the vault.
pub struct InMemoryCollateral {
    vault: Address,
    balances: Mutex<HashMap<Address, Amount>>,
    allowances: Mutex<HashMap<Address, Amount>>,
    fail_transfer_from: AtomicBool,
    fail_transfer: AtomicBool,
    hook: Mutex<Option<Hook>>,
}

impl InMemoryCollateral {
    #[must_use]
    pub fn new(vault: Address) -> Self {
        Self {
            vault,
            balances: Mutex::new(HashMap::new()),
            allowances: Mutex::new(HashMap::new()),
            fail_transfer_from: AtomicBool::new(false),
            fail_transfer: AtomicBool::new(false),
            hook: Mutex::new(None),
        }
    }

    pub fn mint(&self, to: Address, amount: Amount) {
        *lock(&self.balances).entry(to).or_default() += amount;
    }

    /// Let the vault pull up to `amount` from `owner`.
    pub fn approve(&self, owner: Address, amount: Amount) {
        lock(&self.allowances).insert(owner, amount);
    }

    /// Mint and approve in one step.
    pub fn fund(&self, owner: Address, amount: Amount) {
        self.mint(owner, amount);
        let mut allowances = lock(&self.allowances);
        *allowances.entry(owner).or_default() += amount;
    }

    #[must_use]
    pub fn allowance(&self, owner: Address) -> Amount {
        lock(&self.allowances).get(&owner).copied().unwrap_or(0)
    }

    pub fn set_fail_transfer_from(&self, fail: bool) {
        self.fail_transfer_from.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_transfer(&self, fail: bool) {
        self.fail_transfer.store(fail, Ordering::SeqCst);
    }

    /// Install a callback run at the start of every `transfer_from`.
    pub fn set_hook(&self, hook: impl Fn(Address, Amount) + Send + Sync + 'static) {
        *lock(&self.hook) = Some(Arc::new(hook));
    }

    pub fn clear_hook(&self) {
        *lock(&self.hook) = None;
    }

    #[must_use]
    pub fn total_supply(&self) -> Amount {
        lock(&self.balances).values().sum()
    }
}

impl CollateralToken for InMemoryCollateral {
    fn transfer_from(&self, owner: Address, recipient: Address, amount: Amount) -> bool {
        let hook = lock(&self.hook).clone();
        if let Some(hook) = hook {
            hook(owner, amount);
        }
        if self.fail_transfer_from.load(Ordering::SeqCst) {
            return false;
        }
        let mut allowances = lock(&self.allowances);
        let allowed = allowances.entry(owner).or_default();
        if *allowed < amount {
            return false;
        }
        let mut balances = lock(&self.balances);
        if !debit(&mut balances, owner, amount) {
            return false;
        }
        *allowed -= amount;
        *balances.entry(recipient).or_default() += amount;
        true
    }

    fn transfer(&self, to: Address, amount: Amount) -> bool {
        if self.fail_transfer.load(Ordering::SeqCst) {
            return false;
        }
        let mut balances = lock(&self.balances);
        if !debit(&mut balances, self.vault, amount) {
            return false;
        }
        *balances.entry(to).or_default() += amount;
        true
    }

    fn balance_of(&self, holder: Address) -> Amount {
        lock(&self.balances).get(&holder).copied().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Shares
// ---------------------------------------------------------------------------

/// Multi-market share token with per-market metadata URIs.
#[derive(Default)]
pub struct InMemoryShares {
    balances: Mutex<HashMap<(MarketId, Address), Amount>>,
    uris: Mutex<HashMap<MarketId, String>>,
    fail_mint: AtomicBool,
    fail_burn: AtomicBool,
    fail_set_uri: AtomicBool,
}

impl InMemoryShares {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_mint(&self, fail: bool) {
        self.fail_mint.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_burn(&self, fail: bool) {
        self.fail_burn.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_set_uri(&self, fail: bool) {
        self.fail_set_uri.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn uri(&self, market: MarketId) -> Option<String> {
        lock(&self.uris).get(&market).cloned()
    }

    /// Sum of all holders' shares of `market`.
    #[must_use]
    pub fn total_supply(&self, market: MarketId) -> Amount {
        lock(&self.balances)
            .iter()
            .filter(|((m, _), _)| *m == market)
            .map(|(_, bal)| *bal)
            .sum()
    }

    /// Move shares between holders (secondary transfers outside the vault).
    pub fn transfer(&self, market: MarketId, from: Address, to: Address, amount: Amount) -> bool {
        let mut balances = lock(&self.balances);
        let bal = balances.entry((market, from)).or_default();
        if *bal < amount {
            return false;
        }
        *bal -= amount;
        *balances.entry((market, to)).or_default() += amount;
        true
    }
}

impl ShareToken for InMemoryShares {
    fn mint(&self, market: MarketId, to: Address, amount: Amount) -> bool {
        if self.fail_mint.load(Ordering::SeqCst) {
            return false;
        }
        *lock(&self.balances).entry((market, to)).or_default() += amount;
        true
    }

    fn burn_from(&self, market: MarketId, holder: Address, amount: Amount) -> bool {
        if self.fail_burn.load(Ordering::SeqCst) {
            return false;
        }
        let mut balances = lock(&self.balances);
        let bal = balances.entry((market, holder)).or_default();
        if *bal < amount {
            return false;
        }
        *bal -= amount;
        true
    }

    fn set_uri(&self, market: MarketId, uri: &str) -> bool {
        if self.fail_set_uri.load(Ordering::SeqCst) {
            return false;
        }
        let mut uris = lock(&self.uris);
        if uris.contains_key(&market) {
            return false;
        }
        uris.insert(market, uri.to_string());
        true
    }

    fn balance_of(&self, market: MarketId, holder: Address) -> Amount {
        lock(&self.balances)
            .get(&(market, holder))
            .copied()
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Base currency
// ---------------------------------------------------------------------------

/// Native-value ledger: wallets plus the vault's own balance.
pub struct InMemoryBase {
    vault: Address,
    balances: Mutex<HashMap<Address, Amount>>,
    fail_collect: AtomicBool,
    fail_pay: AtomicBool,
}

impl InMemoryBase {
    #[must_use]
    pub fn new(vault: Address) -> Self {
        Self {
            vault,
            balances: Mutex::new(HashMap::new()),
            fail_collect: AtomicBool::new(false),
            fail_pay: AtomicBool::new(false),
        }
    }

    pub fn fund(&self, who: Address, amount: Amount) {
        *lock(&self.balances).entry(who).or_default() += amount;
    }

    #[must_use]
    pub fn balance_of(&self, who: Address) -> Amount {
        lock(&self.balances).get(&who).copied().unwrap_or(0)
    }

    pub fn set_fail_collect(&self, fail: bool) {
        self.fail_collect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_pay(&self, fail: bool) {
        self.fail_pay.store(fail, Ordering::SeqCst);
    }
}

impl BaseCurrency for InMemoryBase {
    fn collect(&self, from: Address, amount: Amount) -> bool {
        if self.fail_collect.load(Ordering::SeqCst) {
            return false;
        }
        let mut balances = lock(&self.balances);
        if !debit(&mut balances, from, amount) {
            return false;
        }
        *balances.entry(self.vault).or_default() += amount;
        true
    }

    fn pay(&self, to: Address, amount: Amount) -> bool {
        if self.fail_pay.load(Ordering::SeqCst) {
            return false;
        }
        let mut balances = lock(&self.balances);
        if !debit(&mut balances, self.vault, amount) {
            return false;
        }
        *balances.entry(to).or_default() += amount;
        true
    }
}

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// The three doubles wired to the same vault address.
#[derive(Clone)]
pub struct InMemoryCollaborators {
    pub vault: Address,
    pub collateral: Arc<InMemoryCollateral>,
    pub shares: Arc<InMemoryShares>,
    pub base: Arc<InMemoryBase>,
}

impl InMemoryCollaborators {
    #[must_use]
    pub fn new(vault: Address) -> Self {
        Self {
            vault,
            collateral: Arc::new(InMemoryCollateral::new(vault)),
            shares: Arc::new(InMemoryShares::new()),
            base: Arc::new(InMemoryBase::new(vault)),
        }
    }

    /// Give `who` collateral (approved to the vault) and base currency.
    pub fn fund(&self, who: Address, collateral: Amount, base: Amount) {
        self.collateral.fund(who, collateral);
        self.base.fund(who, base);
    }
}
