//! Structured notifications emitted by the vault.
//!
//! Every committed operation produces exactly one [`VaultEvent`]; a failed
//! operation produces none. The notifier wraps each event in an
//! [`EventRecord`] that chains it to its predecessor by SHA-256 digest.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Address, Amount, EventId, MarketId, ReserveRatio};

/// The kind of an event, for filtering and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    MarketCreated,
    SharesIssued,
    SharesRedeemed,
    MarketPaused,
    MarketUnpaused,
    IssuanceFeeChanged,
    OwnerFeeWithdrawn,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MarketCreated => write!(f, "MARKET_CREATED"),
            Self::SharesIssued => write!(f, "SHARES_ISSUED"),
            Self::SharesRedeemed => write!(f, "SHARES_REDEEMED"),
            Self::MarketPaused => write!(f, "MARKET_PAUSED"),
            Self::MarketUnpaused => write!(f, "MARKET_UNPAUSED"),
            Self::IssuanceFeeChanged => write!(f, "ISSUANCE_FEE_CHANGED"),
            Self::OwnerFeeWithdrawn => write!(f, "OWNER_FEE_WITHDRAWN"),
        }
    }
}

/// A vault notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaultEvent {
    MarketCreated {
        creator: Address,
        market_id: MarketId,
        reserve_ratio: ReserveRatio,
        metadata_uri: String,
        initial_collateral: Amount,
        initial_base: Amount,
        initial_shares: Amount,
    },
    SharesIssued {
        caller: Address,
        market_id: MarketId,
        shares_issued: Amount,
        collateral_in: Amount,
        base_in: Amount,
        fee: Amount,
    },
    SharesRedeemed {
        caller: Address,
        market_id: MarketId,
        shares_burned: Amount,
        base_returned: Amount,
        collateral_returned: Amount,
    },
    MarketPaused {
        market_id: MarketId,
        by: Address,
    },
    MarketUnpaused {
        market_id: MarketId,
        by: Address,
    },
    IssuanceFeeChanged {
        old_ppm: u32,
        new_ppm: u32,
    },
    OwnerFeeWithdrawn {
        to: Address,
        amount: Amount,
    },
}

impl VaultEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::MarketCreated { .. } => EventKind::MarketCreated,
            Self::SharesIssued { .. } => EventKind::SharesIssued,
            Self::SharesRedeemed { .. } => EventKind::SharesRedeemed,
            Self::MarketPaused { .. } => EventKind::MarketPaused,
            Self::MarketUnpaused { .. } => EventKind::MarketUnpaused,
            Self::IssuanceFeeChanged { .. } => EventKind::IssuanceFeeChanged,
            Self::OwnerFeeWithdrawn { .. } => EventKind::OwnerFeeWithdrawn,
        }
    }

    /// The market this event concerns, if any.
    #[must_use]
    pub fn market_id(&self) -> Option<MarketId> {
        match self {
            Self::MarketCreated { market_id, .. }
            | Self::SharesIssued { market_id, .. }
            | Self::SharesRedeemed { market_id, .. }
            | Self::MarketPaused { market_id, .. }
            | Self::MarketUnpaused { market_id, .. } => Some(*market_id),
            Self::IssuanceFeeChanged { .. } | Self::OwnerFeeWithdrawn { .. } => None,
        }
    }
}

/// An emitted event with its position in the append-only log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique record identifier.
    pub id: EventId,
    /// Zero-based position in the log.
    pub sequence: u64,
    /// The notification itself.
    pub event: VaultEvent,
    /// When the record was appended.
    pub emitted_at: DateTime<Utc>,
    /// Digest of the previous record (all zeros for the first).
    pub prev_digest: [u8; 32],
    /// SHA-256 over the domain tag, `prev_digest`, `sequence` and the event.
    pub digest: [u8; 32],
}

impl EventRecord {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }

    /// Hex form of the record digest.
    #[must_use]
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }
}
