//! System-wide constants for the Argus asset vault.

/// One whole unit expressed in parts-per-million.
pub const PPM_ONE: u32 = 1_000_000;

/// Smallest legal reserve ratio (0.0001%).
pub const MIN_RESERVE_RATIO_PPM: u32 = 1;

/// Largest legal reserve ratio (100%, the linear curve).
pub const MAX_RESERVE_RATIO_PPM: u32 = PPM_ONE;

/// Fixed-point scale used by the curve engine (18 decimal places).
pub const FIXED_ONE: u128 = 1_000_000_000_000_000_000;

/// Default issuance fee charged on the collateral leg (none).
pub const DEFAULT_ISSUANCE_FEE_PPM: u32 = 0;

/// Highest issuance fee the owner may configure (10%).
pub const MAX_ISSUANCE_FEE_PPM: u32 = 100_000;

/// Default maximum length of a market metadata URI, in bytes.
pub const DEFAULT_MAX_METADATA_URI_LEN: usize = 2048;

/// Default minimum collateral required to open a market.
pub const DEFAULT_MIN_INITIAL_COLLATERAL: u128 = 1;

/// Domain separator mixed into every event digest.
pub const EVENT_DIGEST_DOMAIN: &[u8] = b"argus:event:v1:";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "Argus";
