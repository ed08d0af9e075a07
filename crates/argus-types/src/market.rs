//! Market configuration and lifecycle status.
//!
//! A market is created once and never deleted. Everything except the pause
//! flag is immutable after creation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Address, MarketId, ReserveRatio};

/// Issuance lifecycle of a market: `Active → Paused → Active`.
///
/// There is no terminal state; redemption is possible in both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketStatus {
    /// Issuance and redemption both open.
    Active,
    /// Issuance disabled by the owner; holders can still exit.
    Paused,
}

impl fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Paused => write!(f, "PAUSED"),
        }
    }
}

/// A vault-defined market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    /// Unique identifier, assigned at creation.
    pub id: MarketId,
    /// Curve steepness in parts-per-million.
    pub reserve_ratio: ReserveRatio,
    /// Metadata reference (URI) written once at creation.
    pub metadata_uri: String,
    /// The address that created (and seeded) the market.
    pub creator: Address,
    /// Current pause status. The only mutable field.
    pub status: MarketStatus,
    /// When the market was created.
    pub created_at: DateTime<Utc>,
}

impl Market {
    /// Whether new shares may be issued.
    #[must_use]
    pub fn issuance_allowed(&self) -> bool {
        self.status == MarketStatus::Active
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.status == MarketStatus::Paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Market {
        Market {
            id: MarketId(1),
            reserve_ratio: ReserveRatio::new(500_000).unwrap(),
            metadata_uri: "https://ipfs.io/ipfs/example".into(),
            creator: Address::from_label("creator"),
            status: MarketStatus::Active,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn status_display() {
        assert_eq!(MarketStatus::Active.to_string(), "ACTIVE");
        assert_eq!(MarketStatus::Paused.to_string(), "PAUSED");
    }

    #[test]
    fn pause_blocks_issuance_only() {
        let mut market = sample();
        assert!(market.issuance_allowed());
        market.status = MarketStatus::Paused;
        assert!(!market.issuance_allowed());
        assert!(market.is_paused());
    }

    #[test]
    fn market_serde_roundtrip() {
        let market = sample();
        let json = serde_json::to_string(&market).unwrap();
        let back: Market = serde_json::from_str(&json).unwrap();
        assert_eq!(market, back);
    }
}
