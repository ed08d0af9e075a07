//! Error types for the Argus asset vault.
//!
//! All errors use the `AV_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Curve errors
//! - 2xx: Ledger errors
//! - 3xx: Market errors
//! - 4xx: Trade errors
//! - 5xx: Collaborator errors
//! - 8xx: Security errors
//! - 9xx: General / internal errors
//!
//! Every error aborts the operation that raised it; no partial state change
//! survives a returned `Err`.

use thiserror::Error;

use crate::{Address, Amount, MarketId};

/// Central error enum for all Argus operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    // =================================================================
    // Curve Errors (1xx)
    // =================================================================
    /// Bad reserve ratio, zero-amount input, corrupted pool state, or a
    /// trade too small to produce a nonzero result.
    #[error("AV_ERR_100: Invalid curve input: {reason}")]
    InvalidCurveInput { reason: String },

    /// A fixed-point or integer computation overflowed. Fatal.
    #[error("AV_ERR_101: Arithmetic overflow in {context}")]
    ArithmeticOverflow { context: &'static str },

    // =================================================================
    // Ledger Errors (2xx)
    // =================================================================
    /// A ledger mutation would break a reserve/supply invariant.
    #[error("AV_ERR_200: Ledger invariant violation: {reason}")]
    InvariantViolation { reason: String },

    /// A redemption would drive a reserve balance negative.
    #[error("AV_ERR_201: Insufficient reserve: need {needed}, have {available}")]
    InsufficientReserve { needed: Amount, available: Amount },

    /// A burn exceeds the outstanding share supply.
    #[error("AV_ERR_202: Insufficient supply: burn {requested}, outstanding {outstanding}")]
    InsufficientSupply { requested: Amount, outstanding: Amount },

    /// Recorded deposits minus withdrawals disagree with a ledger balance.
    #[error("AV_ERR_203: Reserve conservation violation: {reason}")]
    ConservationViolation { reason: String },

    // =================================================================
    // Market Errors (3xx)
    // =================================================================
    /// No market is registered under this identifier.
    #[error("AV_ERR_300: Market not found: {0}")]
    MarketNotFound(MarketId),

    /// The market is paused and does not accept issuance.
    #[error("AV_ERR_301: Market paused for issuance: {0}")]
    MarketPaused(MarketId),

    /// The metadata URI is empty or too long.
    #[error("AV_ERR_302: Invalid metadata URI: {reason}")]
    InvalidMetadataUri { reason: String },

    // =================================================================
    // Trade Errors (4xx)
    // =================================================================
    /// The computed result is worse than the caller's bound.
    #[error("AV_ERR_400: Slippage exceeded: quoted {quoted}, minimum {minimum}")]
    SlippageExceeded { quoted: Amount, minimum: Amount },

    /// The attached base currency does not cover the required base leg.
    #[error("AV_ERR_401: Insufficient attached base currency: need {needed}, attached {attached}")]
    InsufficientAttachedValue { needed: Amount, attached: Amount },

    // =================================================================
    // Collaborator Errors (5xx)
    // =================================================================
    /// An external collaborator declined a transfer, mint, or burn.
    #[error("AV_ERR_500: {collaborator} declined {operation}")]
    TransferFailed {
        collaborator: &'static str,
        operation: &'static str,
    },

    /// Undoing an already-completed external step failed. Critical.
    #[error("AV_ERR_501: Compensation failed: {reason}")]
    CompensationFailed { reason: String },

    // =================================================================
    // Security Errors (8xx)
    // =================================================================
    /// A call re-entered a scope that is already mid-mutation.
    #[error("AV_ERR_800: Reentrant call into {scope}")]
    ReentrantCall { scope: String },

    /// The caller is not allowed to perform an owner-gated action.
    #[error("AV_ERR_801: Unauthorized caller: {caller}")]
    Unauthorized { caller: Address },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("AV_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("AV_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, out-of-range values, etc.).
    #[error("AV_ERR_902: Configuration error: {0}")]
    Configuration(String),
}

impl VaultError {
    /// Whether the caller may succeed by retrying with adjusted inputs
    /// (or after the owner unpauses the market).
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SlippageExceeded { .. }
                | Self::InsufficientAttachedValue { .. }
                | Self::MarketPaused(_)
        )
    }

    /// Shorthand for [`VaultError::InvalidCurveInput`].
    #[must_use]
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidCurveInput {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`VaultError::ArithmeticOverflow`].
    #[must_use]
    pub fn overflow(context: &'static str) -> Self {
        Self::ArithmeticOverflow { context }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, VaultError>;

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
