//! Vault configuration.

use serde::{Deserialize, Serialize};

use crate::{Address, Amount, Result, VaultError, constants};

/// Configuration for a vault instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// The only address allowed to pause markets, change the fee and
    /// withdraw owner fees.
    pub owner: Address,
    /// Custody address the vault uses with its collaborators.
    pub vault_address: Address,
    /// Fee on the collateral leg of every issuance, in ppm.
    pub issuance_fee_ppm: u32,
    /// Maximum metadata URI length in bytes.
    pub max_metadata_uri_len: usize,
    /// Minimum collateral needed to open a market.
    pub min_initial_collateral: Amount,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            owner: Address::from_label("owner"),
            vault_address: Address::from_label("vault"),
            issuance_fee_ppm: constants::DEFAULT_ISSUANCE_FEE_PPM,
            max_metadata_uri_len: constants::DEFAULT_MAX_METADATA_URI_LEN,
            min_initial_collateral: constants::DEFAULT_MIN_INITIAL_COLLATERAL,
        }
    }
}

impl VaultConfig {
    /// Check every field is within its legal range.
    pub fn validate(&self) -> Result<()> {
        if self.issuance_fee_ppm > constants::MAX_ISSUANCE_FEE_PPM {
            return Err(VaultError::Configuration(format!(
                "issuance_fee_ppm {} exceeds maximum {}",
                self.issuance_fee_ppm,
                constants::MAX_ISSUANCE_FEE_PPM
            )));
        }
        if self.max_metadata_uri_len == 0 {
            return Err(VaultError::Configuration(
                "max_metadata_uri_len must be > 0".into(),
            ));
        }
        if self.min_initial_collateral == 0 {
            return Err(VaultError::Configuration(
                "min_initial_collateral must be > 0".into(),
            ));
        }
        if self.owner.is_zero() || self.vault_address.is_zero() {
            return Err(VaultError::Configuration(
                "owner and vault_address must be non-zero".into(),
            ));
        }
        if self.owner == self.vault_address {
            return Err(VaultError::Configuration(
                "owner and vault_address must differ".into(),
            ));
        }
        Ok(())
    }

    /// Parse a JSON config and validate it. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }
}
