/// Constants shared by the staking client components

use primitive_types::U256;

// ============================================================================
// Token Constants
// ============================================================================

/// Fixed-point exponent of the staked token (18 decimal places)
pub const TOKEN_DECIMALS: u32 = 18;

/// Decimal form of the maximum uint256 allowance
pub const MAX_ALLOWANCE_DEC: &str =
    "115792089237316195423570985008687907853269984665640564039457584007913129639935";

/// Maximum-allowance sentinel (2^256 - 1)
pub const MAX_ALLOWANCE: U256 = U256([u64::MAX; 4]);

// ============================================================================
// Contract Constants
// ============================================================================

/// Default distribution (staking) contract
pub const DEFAULT_DISTRIBUTION_CONTRACT: &str = "0x850A65DA677264bbb7536f8446336C022eCc85Dc";

/// Default staked token contract
pub const DEFAULT_TOKEN_CONTRACT: &str = "0x1643E812aE58766192Cf7D2Cf9567dF2C37e9B7F";

// ============================================================================
// Pool Constants
// ============================================================================

/// Primary pool tracked by reward polling
pub const PRIMARY_POOL_ID: u32 = 0;

/// Number of pool indices probed during discovery
pub const DEFAULT_POOL_SCAN_BOUND: u32 = 10;

/// Upper limit accepted for the probe range
pub const MAX_POOL_SCAN_BOUND: u32 = 256;

// ============================================================================
// Timing Constants (milliseconds)
// ============================================================================

/// Reward refresh period
pub const DEFAULT_REWARD_POLL_INTERVAL_MS: u64 = 3_000;

/// Timeout applied to each chain read
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 10_000;

/// Timeout while awaiting transaction finality
pub const DEFAULT_CONFIRM_TIMEOUT_MS: u64 = 120_000;

// ============================================================================
// Cache Constants
// ============================================================================

/// Namespace prefix for local cache keys
pub const DEFAULT_CACHE_NAMESPACE: &str = "stake-client";

/// Cache field holding the approval flag
pub const APPROVAL_CACHE_FIELD: &str = "isApproved";
