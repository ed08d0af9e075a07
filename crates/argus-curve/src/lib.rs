//! # argus-curve
//!
//! **Pure deterministic bonding-curve engine for Argus.**
//!
//! The engine turns a pool state (supply, reserve, reserve ratio) and a
//! trade size into an issuance or redemption amount. It has:
//!
//! - **Zero side effects**: no state, no I/O, no logging
//! - **Deterministic output**: same input -> same output on every host
//! - **Pool-favoring rounding**: issuers and redeemers never receive more
//!   than the exact formula yields
//! - **Checked arithmetic**: 256-bit intermediates, overflow is an error

pub mod engine;
pub mod fixed;
pub mod wide;

pub use engine::{price_to_issue, reserve_to_redeem, spot_price};
pub use wide::{mul_div, mul_div_ceil};
