//! # argus-types
//!
//! Shared types, errors, and configuration for the **Argus** asset vault.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`MarketId`], [`Address`], [`EventId`]
//! - **Amounts and ratios**: [`Amount`], [`ReserveRatio`]
//! - **Market model**: [`Market`], [`MarketStatus`]
//! - **Reserve model**: [`ReserveState`], [`ReserveAsset`]
//! - **Quotes and receipts**: [`IssueQuote`], [`RedeemQuote`], [`IssueReceipt`], [`RedeemReceipt`]
//! - **Events**: [`VaultEvent`], [`EventRecord`], [`EventKind`]
//! - **Configuration**: [`VaultConfig`]
//! - **Collaborators**: [`CollateralToken`], [`ShareToken`], [`BaseCurrency`]
//! - **Errors**: [`VaultError`] with `AV_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod ids;
pub mod market;
pub mod quote;
pub mod ratio;
pub mod reserve;
pub mod tokens;

#[cfg(feature = "test-helpers")]
pub mod testing;

// Re-export all primary types at crate root for ergonomic imports:
//   use argus_types::{Market, MarketId, ReserveRatio, VaultError, ...};

pub use config::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use market::*;
pub use quote::*;
pub use ratio::*;
pub use reserve::*;
pub use tokens::*;

// Constants are accessed via `argus_types::constants::FOO`
// (not re-exported to avoid name collisions).
