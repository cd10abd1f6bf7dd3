//! Typed call, transaction and receipt shapes exchanged with the chain gateway

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stake_types::{Address, PoolData, PoolId, TokenAmount, UserData};
use thiserror::Error;

/// Raw transport and provider errors
///
/// These never reach presentation code; components convert them into
/// `StakeError` with operation context.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("No wallet provider present")]
    ProviderMissing,

    #[error("Request rejected by wallet: {0}")]
    UserRejected(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Execution reverted: {0}")]
    Reverted(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Unexpected response for '{method}': {reason}")]
    UnexpectedResponse { method: String, reason: String },

    #[error("Unknown transaction: {0}")]
    UnknownTransaction(String),
}

/// Result type alias for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

// ============================================================================
// Reads
// ============================================================================

/// Read calls against the distribution and token contracts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractCall {
    /// `pools(index)` on the distribution contract
    Pools { index: PoolId },
    /// `usersData(user, pool)` on the distribution contract
    UsersData { user: Address, pool: PoolId },
    /// `getCurrentUserReward(pool, user)` on the distribution contract
    CurrentUserReward { pool: PoolId, user: Address },
    /// `allowance(owner, spender)` on the token contract
    Allowance { owner: Address, spender: Address },
}

impl ContractCall {
    pub fn method(&self) -> &'static str {
        match self {
            ContractCall::Pools { .. } => "pools",
            ContractCall::UsersData { .. } => "usersData",
            ContractCall::CurrentUserReward { .. } => "getCurrentUserReward",
            ContractCall::Allowance { .. } => "allowance",
        }
    }
}

/// Decoded result of a [`ContractCall`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutput {
    Pool(PoolData),
    User(UserData),
    Amount(TokenAmount),
}

impl CallOutput {
    fn kind(&self) -> &'static str {
        match self {
            CallOutput::Pool(_) => "pool",
            CallOutput::User(_) => "user",
            CallOutput::Amount(_) => "amount",
        }
    }

    fn mismatch(&self, method: &str, expected: &str) -> GatewayError {
        GatewayError::UnexpectedResponse {
            method: method.to_string(),
            reason: format!("expected {} record, got {}", expected, self.kind()),
        }
    }

    pub fn into_pool(self, method: &str) -> GatewayResult<PoolData> {
        match self {
            CallOutput::Pool(data) => Ok(data),
            other => Err(other.mismatch(method, "pool")),
        }
    }

    pub fn into_user(self, method: &str) -> GatewayResult<UserData> {
        match self {
            CallOutput::User(data) => Ok(data),
            other => Err(other.mismatch(method, "user")),
        }
    }

    pub fn into_amount(self, method: &str) -> GatewayResult<TokenAmount> {
        match self {
            CallOutput::Amount(amount) => Ok(amount),
            other => Err(other.mismatch(method, "amount")),
        }
    }
}

// ============================================================================
// Writes
// ============================================================================

/// State-changing transactions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractTx {
    /// `approve(spender, amount)` on the token contract
    Approve { spender: Address, amount: TokenAmount },
    /// `stake(pool, amount)` on the distribution contract
    Stake { pool: PoolId, amount: TokenAmount },
    /// `withdraw(pool, amount)` on the distribution contract
    Withdraw { pool: PoolId, amount: TokenAmount },
    /// `claim(pool, receiver)` on the distribution contract
    Claim { pool: PoolId, receiver: Address },
}

impl ContractTx {
    pub fn method(&self) -> &'static str {
        match self {
            ContractTx::Approve { .. } => "approve",
            ContractTx::Stake { .. } => "stake",
            ContractTx::Withdraw { .. } => "withdraw",
            ContractTx::Claim { .. } => "claim",
        }
    }
}

/// Transaction identifier returned on submission
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Finality report for a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    /// `false` when the transaction was mined but reverted
    pub success: bool,
    pub revert_reason: Option<String>,
}
