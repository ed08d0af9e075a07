//! # Security Integration Tests
//!
//! Every test here plays an adversarial or failing collaborator against
//! the vault and checks the operation fails closed: the ledger, every
//! collaborator balance and the event log look as if the call never
//! happened.
//!
//! | Threat                         | Defence                                   |
//! |--------------------------------|-------------------------------------------|
//! | Callback re-entry mid-update   | Vault call gate, `ReentrantCall`          |
//! | Declined transfer or mint      | Compensation journal, staged ledger       |
//! | Redeeming shares not held      | Burn before any payout                    |
//! | Price moved before execution   | `min_shares_out` / `min_reserve_out`      |
//! | Non-owner configuration change | Owner check on every owner control        |

use std::sync::{Arc, Mutex, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use argus_types::testing::InMemoryCollaborators;
use argus_types::*;
use argus_vault::{Collaborators, EventSink, VaultController};

const UNIT: Amount = 1_000_000_000_000_000_000;

fn setup() -> (Arc<VaultController>, InMemoryCollaborators) {
    let config = VaultConfig::default();
    let mem = InMemoryCollaborators::new(config.vault_address);
    let collaborators = Collaborators::new(
        mem.collateral.clone(),
        mem.shares.clone(),
        mem.base.clone(),
    );
    (
        Arc::new(VaultController::new(config, collaborators).unwrap()),
        mem,
    )
}

fn user(name: &str) -> Address {
    Address::from_label(name)
}

/// Everything an observer could compare before and after a failed call.
#[derive(Debug, PartialEq, Eq)]
struct Snapshot {
    reserves: ReserveState,
    events: usize,
    vault_collateral: Amount,
    vault_base: Amount,
    user_collateral: Amount,
    user_base: Amount,
    user_shares: Amount,
    share_supply: Amount,
}

fn snapshot(
    vault: &VaultController,
    mem: &InMemoryCollaborators,
    market: MarketId,
    who: Address,
) -> Snapshot {
    Snapshot {
        reserves: vault.reserve_state(market).unwrap(),
        events: vault.events().len(),
        vault_collateral: mem.collateral.balance_of(vault.vault_address()),
        vault_base: mem.base.balance_of(vault.vault_address()),
        user_collateral: mem.collateral.balance_of(who),
        user_base: mem.base.balance_of(who),
        user_shares: mem.shares.balance_of(market, who),
        share_supply: mem.shares.total_supply(market),
    }
}

/// Market at 50% seeded by alice; bob funded and holding some shares.
fn market_with_holder(vault: &VaultController, mem: &InMemoryCollaborators) -> MarketId {
    let alice = user("alice");
    let bob = user("bob");
    mem.fund(alice, 10 * UNIT, 10 * UNIT);
    mem.fund(bob, 10 * UNIT, 10 * UNIT);
    let id = vault
        .create_market(alice, 500_000, 2 * UNIT, "ipfs://sec", UNIT)
        .unwrap();
    vault.issue(bob, id, UNIT, 10 * UNIT, 0).unwrap();
    id
}

// ═══════════════════════════════════════════════════════════════════
// TEST 1: Re-entry from a collaborator callback
// ═══════════════════════════════════════════════════════════════════

#[test]
fn collaborator_callback_cannot_reenter_issue() {
    // SCENARIO: A malicious collateral token calls back into `issue` on the
    // same market while the vault is halfway through pulling funds.
    let (vault, mem) = setup();
    let id = market_with_holder(&vault, &mem);
    let bob = user("bob");

    let weak: Weak<VaultController> = Arc::downgrade(&vault);
    let armed = Arc::new(AtomicBool::new(true));
    let seen: Arc<Mutex<Option<Result<IssueReceipt>>>> = Arc::new(Mutex::new(None));
    {
        let armed = Arc::clone(&armed);
        let seen = Arc::clone(&seen);
        mem.collateral.set_hook(move |owner, amount| {
            if !armed.swap(false, Ordering::SeqCst) {
                return;
            }
            if let Some(vault) = weak.upgrade() {
                let inner = vault.issue(owner, id, amount, 10 * UNIT, 0);
                *seen.lock().unwrap() = Some(inner);
            }
        });
    }

    let before = vault.reserve_state(id).unwrap();
    let outer = vault.issue(bob, id, UNIT, 10 * UNIT, 0).unwrap();
    mem.collateral.clear_hook();

    let inner = seen.lock().unwrap().take().expect("hook ran");
    assert_eq!(
        inner.unwrap_err(),
        VaultError::ReentrantCall {
            scope: "vault".into()
        }
    );
    // Only the outer issuance landed.
    let after = vault.reserve_state(id).unwrap();
    assert_eq!(after.share_supply, before.share_supply + outer.shares_issued());
    vault.audit().unwrap();
}

#[test]
fn collaborator_callback_cannot_read_mid_update() {
    let (vault, mem) = setup();
    let id = market_with_holder(&vault, &mem);

    let weak = Arc::downgrade(&vault);
    let seen: Arc<Mutex<Vec<VaultError>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        mem.collateral.set_hook(move |_, _| {
            if let Some(vault) = weak.upgrade() {
                let mut seen = seen.lock().unwrap();
                seen.extend(vault.reserve_state(id).err());
                seen.extend(vault.quote_redeem(id, 1).err());
            }
        });
    }
    vault.issue(user("bob"), id, UNIT, 10 * UNIT, 0).unwrap();
    mem.collateral.clear_hook();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|e| matches!(e, VaultError::ReentrantCall { .. })));
}

#[test]
fn callback_cannot_enter_a_different_market() {
    // SCENARIO: While `issue` holds market A, the collateral token calls
    // back to redeem on market B. Holding one market while waiting on
    // another is how two such callbacks deadlock, so any nested vault call
    // is rejected, whichever market it targets.
    let (vault, mem) = setup();
    let a = market_with_holder(&vault, &mem);
    let carol = user("carol");
    mem.fund(carol, 10 * UNIT, 0);
    let b = vault.create_market(carol, 1_000_000, UNIT, "ipfs://b", 0).unwrap();
    let b_before = vault.reserve_state(b).unwrap();
    let carol_shares = mem.shares.balance_of(b, carol);

    let weak = Arc::downgrade(&vault);
    let armed = Arc::new(AtomicBool::new(true));
    let seen: Arc<Mutex<Option<Result<RedeemReceipt>>>> = Arc::new(Mutex::new(None));
    {
        let armed = Arc::clone(&armed);
        let seen = Arc::clone(&seen);
        mem.collateral.set_hook(move |_, _| {
            if !armed.swap(false, Ordering::SeqCst) {
                return;
            }
            if let Some(vault) = weak.upgrade() {
                *seen.lock().unwrap() = Some(vault.redeem(carol, b, UNIT / 2, 0));
            }
        });
    }
    vault.issue(user("bob"), a, UNIT, 10 * UNIT, 0).unwrap();
    mem.collateral.clear_hook();

    let nested = seen.lock().unwrap().take().expect("hook ran");
    assert_eq!(
        nested.unwrap_err(),
        VaultError::ReentrantCall {
            scope: "vault".into()
        }
    );
    // Only the outer issuance on A landed.
    assert_eq!(vault.reserve_state(b).unwrap(), b_before);
    assert_eq!(mem.shares.balance_of(b, carol), carol_shares);
    assert_eq!(mem.collateral.balance_of(carol), 9 * UNIT);
    assert_eq!(vault.notifier().records_for(b).len(), 1);
    vault.audit().unwrap();
}

#[test]
fn callback_cannot_audit_mid_update() {
    let (vault, mem) = setup();
    let a = market_with_holder(&vault, &mem);
    let carol = user("carol");
    mem.fund(carol, 10 * UNIT, 0);
    vault.create_market(carol, 1_000_000, UNIT, "ipfs://b", 0).unwrap();

    let weak = Arc::downgrade(&vault);
    let seen: Arc<Mutex<Vec<VaultError>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        mem.collateral.set_hook(move |_, _| {
            if let Some(vault) = weak.upgrade() {
                seen.lock().unwrap().extend(vault.audit().err());
            }
        });
    }
    vault.issue(user("bob"), a, UNIT, 10 * UNIT, 0).unwrap();
    mem.collateral.clear_hook();

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![VaultError::ReentrantCall {
            scope: "vault".into()
        }]
    );
}

struct RedeemOnEvent {
    vault: Mutex<Weak<VaultController>>,
    holder: Address,
    results: Mutex<Vec<Result<RedeemReceipt>>>,
    supply_seen: Mutex<Vec<Amount>>,
}

impl EventSink for RedeemOnEvent {
    fn on_event(&self, record: &EventRecord) {
        let Some(market) = record.event.market_id() else {
            return;
        };
        if record.kind() != EventKind::SharesIssued {
            return;
        }
        let vault = self.vault.lock().unwrap().upgrade();
        if let Some(vault) = vault {
            let state = vault.reserve_state(market).unwrap();
            self.supply_seen.lock().unwrap().push(state.share_supply);
            let result = vault.redeem(self.holder, market, UNIT / 10, 0);
            self.results.lock().unwrap().push(result);
        }
    }
}

#[test]
fn event_sink_acts_after_release() {
    // SCENARIO: An observer reacts to `SharesIssued` by redeeming on the
    // same market. Delivery happens once the issuance has committed and
    // let go of the market, so the redemption runs against the new state.
    let (vault, mem) = setup();
    let id = market_with_holder(&vault, &mem);
    let sink = Arc::new(RedeemOnEvent {
        vault: Mutex::new(Arc::downgrade(&vault)),
        holder: user("bob"),
        results: Mutex::new(Vec::new()),
        supply_seen: Mutex::new(Vec::new()),
    });
    vault.subscribe(sink.clone());

    let events_before = vault.events().len();
    let issued = vault.issue(user("bob"), id, UNIT, 10 * UNIT, 0).unwrap();

    let supply_seen = sink.supply_seen.lock().unwrap();
    let results = sink.results.lock().unwrap();
    assert_eq!(results.len(), 1);
    let redeemed = results[0].as_ref().unwrap();
    assert_eq!(redeemed.quote.shares_in, UNIT / 10);
    assert_eq!(
        supply_seen[0],
        vault.reserve_state(id).unwrap().share_supply + UNIT / 10
    );

    let events = vault.events();
    assert_eq!(events.len(), events_before + 2);
    assert_eq!(events[events_before].kind(), EventKind::SharesIssued);
    assert_eq!(events[events_before + 1].kind(), EventKind::SharesRedeemed);
    assert!(issued.shares_issued() > UNIT / 10);
    vault.audit().unwrap();
}

// ═══════════════════════════════════════════════════════════════════
// TEST 2: Declined collaborator steps roll everything back
// ═══════════════════════════════════════════════════════════════════

#[test]
fn declined_mint_refunds_issuer() {
    let (vault, mem) = setup();
    let id = market_with_holder(&vault, &mem);
    let bob = user("bob");
    let before = snapshot(&vault, &mem, id, bob);

    mem.shares.set_fail_mint(true);
    let err = vault.issue(bob, id, UNIT, 10 * UNIT, 0).unwrap_err();
    mem.shares.set_fail_mint(false);

    assert_eq!(
        err,
        VaultError::TransferFailed {
            collaborator: "share token",
            operation: "mint"
        }
    );
    assert_eq!(snapshot(&vault, &mem, id, bob), before);
    vault.audit().unwrap();
}

#[test]
fn declined_collateral_pull_changes_nothing() {
    let (vault, mem) = setup();
    let id = market_with_holder(&vault, &mem);
    let bob = user("bob");
    let before = snapshot(&vault, &mem, id, bob);

    mem.collateral.set_fail_transfer_from(true);
    let err = vault.issue(bob, id, UNIT, 10 * UNIT, 0).unwrap_err();
    mem.collateral.set_fail_transfer_from(false);

    assert!(matches!(err, VaultError::TransferFailed { .. }));
    assert_eq!(snapshot(&vault, &mem, id, bob), before);
}

#[test]
fn declined_base_collect_refunds_collateral() {
    let (vault, mem) = setup();
    let id = market_with_holder(&vault, &mem);
    let bob = user("bob");
    let before = snapshot(&vault, &mem, id, bob);

    mem.base.set_fail_collect(true);
    let err = vault.issue(bob, id, UNIT, 10 * UNIT, 0).unwrap_err();
    mem.base.set_fail_collect(false);

    assert_eq!(
        err,
        VaultError::TransferFailed {
            collaborator: "base currency",
            operation: "collect"
        }
    );
    assert_eq!(snapshot(&vault, &mem, id, bob), before);
}

#[test]
fn declined_payout_restores_burned_shares() {
    let (vault, mem) = setup();
    let id = market_with_holder(&vault, &mem);
    let bob = user("bob");
    // The collateral claw-back pulls through an allowance.
    mem.collateral.approve(bob, 10 * UNIT);
    let before = snapshot(&vault, &mem, id, bob);

    mem.base.set_fail_pay(true);
    let err = vault
        .redeem(bob, id, mem.shares.balance_of(id, bob) / 2, 0)
        .unwrap_err();
    mem.base.set_fail_pay(false);

    assert_eq!(
        err,
        VaultError::TransferFailed {
            collaborator: "base currency",
            operation: "pay"
        }
    );
    let after = snapshot(&vault, &mem, id, bob);
    assert_eq!(after.reserves, before.reserves);
    assert_eq!(after.user_shares, before.user_shares);
    assert_eq!(after.user_collateral, before.user_collateral);
    assert_eq!(after.vault_collateral, before.vault_collateral);
    assert_eq!(after.events, before.events);
    vault.audit().unwrap();
}

#[test]
fn failed_compensation_is_critical() {
    // SCENARIO: The payout of base currency fails and the collateral
    // already sent cannot be pulled back (no allowance left).
    let (vault, mem) = setup();
    let id = market_with_holder(&vault, &mem);
    let bob = user("bob");
    mem.collateral.approve(bob, 0);
    let before = vault.reserve_state(id).unwrap();

    mem.base.set_fail_pay(true);
    let err = vault
        .redeem(bob, id, mem.shares.balance_of(id, bob) / 2, 0)
        .unwrap_err();
    mem.base.set_fail_pay(false);

    assert!(matches!(err, VaultError::CompensationFailed { .. }), "{err}");
    assert!(!err.is_recoverable());
    // The ledger was never committed.
    assert_eq!(vault.reserve_state(id).unwrap(), before);
}

#[test]
fn failed_creation_leaves_no_market_and_a_gap() {
    let (vault, mem) = setup();
    let alice = user("alice");
    mem.fund(alice, 10 * UNIT, 10 * UNIT);

    mem.shares.set_fail_set_uri(true);
    let err = vault
        .create_market(alice, 500_000, UNIT, "ipfs://lost", UNIT)
        .unwrap_err();
    mem.shares.set_fail_set_uri(false);

    assert!(matches!(err, VaultError::TransferFailed { operation: "set_uri", .. }));
    assert_eq!(
        vault.get_market(MarketId(1)).unwrap_err(),
        VaultError::MarketNotFound(MarketId(1))
    );
    assert!(vault.market_ids().unwrap().is_empty());
    assert!(vault.events().is_empty());
    assert_eq!(mem.collateral.balance_of(alice), 10 * UNIT);
    assert_eq!(mem.base.balance_of(alice), 10 * UNIT);
    assert_eq!(mem.shares.balance_of(MarketId(1), alice), 0);

    // Identifiers are never reused.
    let id = vault
        .create_market(alice, 500_000, UNIT, "ipfs://kept", UNIT)
        .unwrap();
    assert_eq!(id, MarketId(2));
}

// ═══════════════════════════════════════════════════════════════════
// TEST 3: Redeeming shares the caller does not hold
// ═══════════════════════════════════════════════════════════════════

#[test]
fn redeem_beyond_holdings_fails_at_burn() {
    let (vault, mem) = setup();
    let id = market_with_holder(&vault, &mem);
    let bob = user("bob");
    let held = mem.shares.balance_of(id, bob);
    let before = snapshot(&vault, &mem, id, bob);

    // Within total supply, beyond what bob holds.
    let err = vault.redeem(bob, id, held + 1, 0).unwrap_err();
    assert_eq!(
        err,
        VaultError::TransferFailed {
            collaborator: "share token",
            operation: "burn_from"
        }
    );
    assert_eq!(snapshot(&vault, &mem, id, bob), before);

    // Beyond total supply.
    let supply = vault.reserve_state(id).unwrap().share_supply;
    assert!(matches!(
        vault.redeem(bob, id, supply + 1, 0).unwrap_err(),
        VaultError::InsufficientSupply { .. }
    ));
}

#[test]
fn transferred_shares_redeem_for_new_holder() {
    let (vault, mem) = setup();
    let id = market_with_holder(&vault, &mem);
    let bob = user("bob");
    let dave = user("dave");
    let held = mem.shares.balance_of(id, bob);
    assert!(mem.shares.transfer(id, bob, dave, held));

    assert!(vault.redeem(bob, id, held, 0).is_err());
    let out = vault.redeem(dave, id, held, 0).unwrap();
    assert!(out.quote.collateral_out > 0);
    assert_eq!(mem.collateral.balance_of(dave), out.quote.collateral_out);
}

// ═══════════════════════════════════════════════════════════════════
// TEST 4: Slippage and attached value bounds
// ═══════════════════════════════════════════════════════════════════

#[test]
fn slippage_bounds_leave_state_untouched() {
    let (vault, mem) = setup();
    let id = market_with_holder(&vault, &mem);
    let bob = user("bob");
    let before = snapshot(&vault, &mem, id, bob);

    let quote = vault.quote_issue(id, UNIT, 10 * UNIT).unwrap();
    let err = vault
        .issue(bob, id, UNIT, 10 * UNIT, quote.shares_out + 1)
        .unwrap_err();
    assert_eq!(
        err,
        VaultError::SlippageExceeded {
            quoted: quote.shares_out,
            minimum: quote.shares_out + 1
        }
    );
    assert!(err.is_recoverable());

    let shares = mem.shares.balance_of(id, bob);
    let quote = vault.quote_redeem(id, shares).unwrap();
    let err = vault
        .redeem(bob, id, shares, quote.collateral_out + 1)
        .unwrap_err();
    assert!(matches!(err, VaultError::SlippageExceeded { .. }));

    assert_eq!(snapshot(&vault, &mem, id, bob), before);
}

#[test]
fn short_attached_base_is_rejected() {
    let (vault, mem) = setup();
    let id = market_with_holder(&vault, &mem);
    let bob = user("bob");
    let before = snapshot(&vault, &mem, id, bob);
    let needed = vault.quote_issue(id, UNIT, 0).unwrap().base_in;
    assert!(needed > 0);

    let err = vault.issue(bob, id, UNIT, needed - 1, 0).unwrap_err();
    assert_eq!(
        err,
        VaultError::InsufficientAttachedValue {
            needed,
            attached: needed - 1
        }
    );
    assert_eq!(snapshot(&vault, &mem, id, bob), before);

    // Exactly the required amount works.
    vault.issue(bob, id, UNIT, needed, 0).unwrap();
    assert_eq!(mem.base.balance_of(bob), before.user_base - needed);
}

#[test]
fn dust_is_rejected_not_swallowed() {
    let (vault, mem) = setup();
    let whale = user("whale");
    mem.fund(whale, 2_000_000_000 * UNIT, 0);
    let id = vault
        .create_market(whale, 500_000, 1_000_000_000 * UNIT, "ipfs://big", 0)
        .unwrap();
    let minnow = user("minnow");
    mem.fund(minnow, 10, 0);
    let before = snapshot(&vault, &mem, id, minnow);

    let err = vault.issue(minnow, id, 1, 0, 0).unwrap_err();
    assert!(matches!(err, VaultError::InvalidCurveInput { .. }));
    assert_eq!(snapshot(&vault, &mem, id, minnow), before);
}

// ═══════════════════════════════════════════════════════════════════
// TEST 5: Owner gating
// ═══════════════════════════════════════════════════════════════════

#[test]
fn owner_controls_reject_others() {
    let (vault, mem) = setup();
    let id = market_with_holder(&vault, &mem);
    let mallory = user("mallory");
    let unauthorized = VaultError::Unauthorized { caller: mallory };

    assert_eq!(vault.set_paused(mallory, id, true).unwrap_err(), unauthorized);
    assert_eq!(vault.set_issuance_fee(mallory, 1).unwrap_err(), unauthorized);
    assert_eq!(
        vault.withdraw_owner_fee(mallory, mallory, 1).unwrap_err(),
        unauthorized
    );
    assert!(!vault.get_market(id).unwrap().is_paused());
    assert_eq!(vault.issuance_fee_ppm(), 0);

    let owner = vault.owner();
    assert!(matches!(
        vault
            .set_issuance_fee(owner, constants::MAX_ISSUANCE_FEE_PPM + 1)
            .unwrap_err(),
        VaultError::InvalidCurveInput { .. }
    ));
}

#[test]
fn fee_withdrawal_bounds() {
    let (vault, mem) = setup();
    let owner = vault.owner();
    vault.set_issuance_fee(owner, 100_000).unwrap();
    let id = market_with_holder(&vault, &mem);
    let accrued = vault.accrued_fees().unwrap();
    assert_eq!(accrued, UNIT / 10);

    assert!(matches!(
        vault.withdraw_owner_fee(owner, owner, accrued + 1).unwrap_err(),
        VaultError::InsufficientReserve { .. }
    ));

    mem.collateral.set_fail_transfer(true);
    let err = vault.withdraw_owner_fee(owner, owner, accrued).unwrap_err();
    mem.collateral.set_fail_transfer(false);
    assert!(matches!(err, VaultError::TransferFailed { .. }));
    assert_eq!(vault.accrued_fees().unwrap(), accrued);

    vault.withdraw_owner_fee(owner, owner, accrued).unwrap();
    assert_eq!(vault.accrued_fees().unwrap(), 0);
    assert_eq!(mem.collateral.balance_of(owner), accrued);
    vault.audit().unwrap();
    assert!(vault.reserve_state(id).is_ok());
}

// ═══════════════════════════════════════════════════════════════════
// TEST 6: Tamper-evident event trail
// ═══════════════════════════════════════════════════════════════════

#[test]
fn event_trail_detects_tampering() {
    let (vault, mem) = setup();
    let id = market_with_holder(&vault, &mem);
    vault.redeem(user("bob"), id, 1_000_000, 0).unwrap();
    assert!(vault.notifier().verify_chain());

    let mut records = vault.events();
    assert!(argus_vault::verify_records(&records));
    if let VaultEvent::SharesIssued { shares_issued, .. } = &mut records[1].event {
        *shares_issued += 1;
    }
    assert!(!argus_vault::verify_records(&records));
}
