use std::fmt;
use thiserror::Error;

use crate::{Address, OperationKind, PoolId};

// ============================================================================
// Main Error Enum
// ============================================================================

/// Error taxonomy surfaced by the staking client
///
/// Raw transport failures never escape the engine; every chain interaction
/// is converted into one of these kinds with enough context (operation kind,
/// pool) for the caller to retry meaningfully.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StakeError {
    // ========================================================================
    // Wallet Errors
    // ========================================================================

    /// No wallet provider, or the provider exposed no accounts
    #[error("Wallet unavailable: {reason}")]
    WalletUnavailable { reason: String },

    // ========================================================================
    // Chain Errors
    // ========================================================================

    /// A read call failed or timed out; prior known state is retained
    #[error("Chain read '{operation}' failed{}: {reason}", pool_suffix(.pool))]
    ChainRead {
        operation: String,
        pool: Option<PoolId>,
        reason: String,
    },

    /// A write was rejected, reverted, or never confirmed
    #[error("{kind} transaction failed{}{}: {reason}", pool_suffix(.pool), tx_suffix(.tx_hash))]
    Transaction {
        kind: OperationKind,
        pool: Option<PoolId>,
        reason: String,
        tx_hash: Option<String>,
    },

    // ========================================================================
    // Local Validation Errors
    // ========================================================================

    /// Local validation failed before anything was submitted
    #[error("{kind} rejected{}: {reason}", pool_suffix(.pool))]
    Precondition {
        kind: OperationKind,
        pool: Option<PoolId>,
        reason: String,
    },

    /// The same (address, pool, kind) tuple already has an operation in flight
    #[error("{kind}{} already pending for {address}", pool_suffix(.pool))]
    AlreadyPending {
        kind: OperationKind,
        pool: Option<PoolId>,
        address: Address,
    },

    /// Amount text could not be converted to base units
    #[error("Invalid amount '{input}': {reason}")]
    InvalidAmount { input: String, reason: String },

    /// Account identifier could not be parsed
    #[error("Invalid address '{input}': {reason}")]
    InvalidAddress { input: String, reason: String },

    // ========================================================================
    // Configuration and Storage Errors
    // ========================================================================

    /// Invalid configuration
    #[error("Invalid configuration for '{component}': {reason}")]
    InvalidConfiguration { component: String, reason: String },

    /// Local cache could not be read or written
    #[error("Cache error: {reason}")]
    Cache { reason: String },
}

fn pool_suffix(pool: &Option<PoolId>) -> String {
    match pool {
        Some(pool) => format!(" (pool {})", pool),
        None => String::new(),
    }
}

fn tx_suffix(tx_hash: &Option<String>) -> String {
    match tx_hash {
        Some(hash) => format!(" [tx {}]", hash),
        None => String::new(),
    }
}

impl StakeError {
    /// Create a wallet unavailable error
    pub fn wallet_unavailable(reason: impl fmt::Display) -> Self {
        Self::WalletUnavailable {
            reason: reason.to_string(),
        }
    }

    /// Create a chain read error
    pub fn chain_read(operation: &str, pool: Option<PoolId>, reason: impl fmt::Display) -> Self {
        Self::ChainRead {
            operation: operation.to_string(),
            pool,
            reason: reason.to_string(),
        }
    }

    /// Create a transaction error
    pub fn transaction(
        kind: OperationKind,
        pool: Option<PoolId>,
        reason: impl fmt::Display,
        tx_hash: Option<String>,
    ) -> Self {
        Self::Transaction {
            kind,
            pool,
            reason: reason.to_string(),
            tx_hash,
        }
    }

    /// Create a precondition error
    pub fn precondition(kind: OperationKind, pool: Option<PoolId>, reason: impl fmt::Display) -> Self {
        Self::Precondition {
            kind,
            pool,
            reason: reason.to_string(),
        }
    }

    /// Create an invalid amount error
    pub fn invalid_amount(input: &str, reason: &str) -> Self {
        Self::InvalidAmount {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an invalid address error
    pub fn invalid_address(input: &str, reason: &str) -> Self {
        Self::InvalidAddress {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(component: &str, reason: impl fmt::Display) -> Self {
        Self::InvalidConfiguration {
            component: component.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a cache error
    pub fn cache(reason: impl fmt::Display) -> Self {
        Self::Cache {
            reason: reason.to_string(),
        }
    }

    /// Whether the error forbids any further action
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::WalletUnavailable { .. })
    }

    /// Whether the error was raised locally without reaching the chain
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::Precondition { .. }
                | Self::AlreadyPending { .. }
                | Self::InvalidAmount { .. }
                | Self::InvalidAddress { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_operation_context() {
        let err = StakeError::transaction(
            OperationKind::Withdraw,
            Some(PoolId(2)),
            "execution reverted",
            Some("0xabc".to_string()),
        );
        assert_eq!(
            err.to_string(),
            "withdraw transaction failed (pool 2) [tx 0xabc]: execution reverted"
        );

        let err = StakeError::chain_read("allowance", None, "timeout");
        assert_eq!(err.to_string(), "Chain read 'allowance' failed: timeout");
    }

    #[test]
    fn test_classification() {
        assert!(StakeError::wallet_unavailable("no provider").is_fatal());
        assert!(StakeError::precondition(OperationKind::Stake, Some(PoolId(0)), "not approved").is_local());
        assert!(!StakeError::chain_read("pools", Some(PoolId(3)), "missing").is_local());
    }
}
