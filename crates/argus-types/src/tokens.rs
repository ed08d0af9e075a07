//! Capability interfaces for the vault's external collaborators.
//!
//! The vault never owns holder balances. It instructs these collaborators
//! to move value and trusts their boolean return status: `false` means the
//! collaborator declined and the whole vault operation must abort.
//!
//! Methods take `&self` so a collaborator can be shared between the vault
//! and the rest of the host; implementations provide their own interior
//! synchronization.

use crate::{Address, Amount, MarketId};

/// The fungible collateral token backing every market.
pub trait CollateralToken: Send + Sync {
    /// Move `amount` from `owner` to `recipient` using a prior allowance.
    fn transfer_from(&self, owner: Address, recipient: Address, amount: Amount) -> bool;

    /// Move `amount` out of the vault's own balance to `to`.
    fn transfer(&self, to: Address, amount: Amount) -> bool;

    /// Current balance of `holder`.
    fn balance_of(&self, holder: Address) -> Amount;
}

/// The multi-market share token. Each market's shares are a separate
/// token class keyed by [`MarketId`].
pub trait ShareToken: Send + Sync {
    /// Create `amount` shares of `market` for `to`.
    fn mint(&self, market: MarketId, to: Address, amount: Amount) -> bool;

    /// Destroy `amount` of `holder`'s shares of `market`. Declines when the
    /// holder's balance is insufficient.
    fn burn_from(&self, market: MarketId, holder: Address, amount: Amount) -> bool;

    /// Store the metadata URI for `market`. Called once, at creation.
    fn set_uri(&self, market: MarketId, uri: &str) -> bool;

    /// Shares of `market` held by `holder`.
    fn balance_of(&self, market: MarketId, holder: Address) -> Amount;
}

/// The network's base currency, attached to calls and returned on
/// redemption.
pub trait BaseCurrency: Send + Sync {
    /// Take `amount` of the value `from` attached to the current call.
    fn collect(&self, from: Address, amount: Amount) -> bool;

    /// Send `amount` from the vault to `to`.
    fn pay(&self, to: Address, amount: Amount) -> bool;
}
