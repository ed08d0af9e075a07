//! # argus-vault
//!
//! **Vault plane**: market lifecycle, reserve custody accounting, and the
//! event trail.
//!
//! ## Architecture
//!
//! A caller invokes the [`VaultController`], which:
//! 1. Admits the calling thread through its [`CallGate`] (one vault call
//!    per thread at a time), resolves the market from the
//!    [`MarketRegistry`] and enters its exclusive cell
//! 2. Prices the trade with the curve engine against the market's
//!    [`ReserveLedger`]
//! 3. Stages the ledger change, then drives the external token
//!    collaborators under a compensation [`Journal`]
//! 4. Commits the staged ledger and appends one event to the
//!    [`EventNotifier`], delivering it to sinks once the market is released
//!
//! Any failure before the commit leaves the ledger, the collaborators and
//! the event log as they were.
//!
//! ## Invariants
//!
//! - Share supply is zero if and only if both reserve legs are zero
//! - Per market and leg: ledger balance == deposits - withdrawals
//! - The vault's collateral custody covers every ledger plus accrued fees

pub mod conservation;
pub mod controller;
pub mod guard;
pub mod journal;
pub mod ledger;
pub mod notifier;
pub mod registry;

pub use conservation::ReserveFlows;
pub use controller::{AuditReport, Collaborators, MarketAudit, VaultController};
pub use guard::{CallGate, CellGuard, ExclusiveCell, GatePass};
pub use journal::{Compensation, Journal};
pub use ledger::ReserveLedger;
pub use notifier::{EventNotifier, EventSink, compute_event_digest, verify_records};
pub use registry::{MarketEntry, MarketRegistry, MarketSlot};
