/// Pool and per-user position records read from the distribution contract

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{TokenAmount, PRIMARY_POOL_ID};

// ============================================================================
// Pool Identity
// ============================================================================

/// Index of a staking pool in the distribution contract
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolId(pub u32);

impl PoolId {
    pub const PRIMARY: PoolId = PoolId(PRIMARY_POOL_ID);

    pub fn index(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PoolId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

// ============================================================================
// Contract Read Shapes
// ============================================================================

/// Typed result of `pools(index)`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolData {
    /// Unix timestamp at which rewards start accruing
    pub payout_start: u128,
    /// Seconds between reward decreases
    pub decrease_interval: u128,
    pub withdraw_lock_period: u128,
    pub claim_lock_period: u128,
    pub withdraw_lock_period_after_stake: u128,
    pub initial_reward: TokenAmount,
    pub reward_decrease: TokenAmount,
    pub minimal_stake: TokenAmount,
    /// Whether anyone may stake into the pool
    pub is_public: bool,
}

/// Typed result of `usersData(user, pool)`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    pub last_stake: u128,
    pub invested: TokenAmount,
    pub rate: TokenAmount,
    pub pending_rewards: TokenAmount,
}

// ============================================================================
// Engine Records
// ============================================================================

/// A pool found during discovery; immutable within one discovery pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolRecord {
    pub pool_id: PoolId,
    pub is_public: bool,
    pub data: PoolData,
}

impl PoolRecord {
    pub fn new(pool_id: PoolId, data: PoolData) -> Self {
        Self {
            pool_id,
            is_public: data.is_public,
            data,
        }
    }
}

/// A user's deposit and pending rewards in one pool, always replaced wholesale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPosition {
    pub pool_id: PoolId,
    pub invested: TokenAmount,
    pub pending_rewards: TokenAmount,
    pub fetched_at: DateTime<Utc>,
}

impl UserPosition {
    pub fn from_user_data(pool_id: PoolId, data: &UserData) -> Self {
        Self {
            pool_id,
            invested: data.invested,
            pending_rewards: data.pending_rewards,
            fetched_at: Utc::now(),
        }
    }

    /// Placeholder for a position whose read failed
    pub fn empty(pool_id: PoolId) -> Self {
        Self {
            pool_id,
            invested: TokenAmount::ZERO,
            pending_rewards: TokenAmount::ZERO,
            fetched_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

/// A discovered public pool paired with the caller's position in it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredPool {
    pub record: PoolRecord,
    /// `None` when the position read failed for this pool
    pub position: Option<UserPosition>,
}

impl DiscoveredPool {
    pub fn pool_id(&self) -> PoolId {
        self.record.pool_id
    }

    pub fn position_or_empty(&self) -> UserPosition {
        self.position
            .clone()
            .unwrap_or_else(|| UserPosition::empty(self.record.pool_id))
    }
}

/// Live reward figure for one pool; each refresh supersedes the last
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentReward {
    pub pool_id: PoolId,
    pub amount: TokenAmount,
    pub fetched_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_record_mirrors_public_flag() {
        let data = PoolData {
            is_public: true,
            ..PoolData::default()
        };
        assert!(PoolRecord::new(PoolId(4), data).is_public);
    }

    #[test]
    fn test_failed_position_reads_as_zero() {
        let pool = DiscoveredPool {
            record: PoolRecord::new(PoolId(1), PoolData::default()),
            position: None,
        };
        let position = pool.position_or_empty();
        assert_eq!(position.pool_id, PoolId(1));
        assert!(position.invested.is_zero());
        assert!(position.pending_rewards.is_zero());
    }
}
