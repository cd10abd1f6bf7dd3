//! Chain gateway port and the typed distribution client built on it
//!
//! The gateway (wallet provider plus contract RPC) is an external
//! collaborator. The engine only sees it through [`ChainGateway`]; the
//! [`DistributionClient`] adds timeouts and typed decoding on top.

pub mod mock;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use stake_types::{Address, PoolData, PoolId, TokenAmount, UserData};
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::ClientConfig;

pub use mock::MockChain;
pub use types::{
    CallOutput, ContractCall, ContractTx, GatewayError, GatewayResult, TxHash, TxReceipt,
};

/// Wallet provider and contract RPC, consumed but not implemented here
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Ask the wallet for its accounts, first one is the active account
    async fn request_accounts(&self) -> GatewayResult<Vec<Address>>;

    /// Account-change notifications from the wallet provider
    fn subscribe_accounts(&self) -> broadcast::Receiver<Vec<Address>>;

    /// Read-only contract call
    async fn call(&self, contract: Address, call: ContractCall) -> GatewayResult<CallOutput>;

    /// Submit a transaction signed by `from`
    async fn send(&self, contract: Address, tx: ContractTx, from: Address) -> GatewayResult<TxHash>;

    /// Wait until the transaction is final
    async fn wait_for_confirmation(&self, tx_hash: &TxHash) -> GatewayResult<TxReceipt>;
}

/// Typed access to the distribution and token contracts
pub struct DistributionClient {
    gateway: Arc<dyn ChainGateway>,
    distribution: Address,
    token: Address,
    read_timeout: Duration,
    confirm_timeout: Duration,
}

impl DistributionClient {
    pub fn new(gateway: Arc<dyn ChainGateway>, config: &ClientConfig) -> Self {
        Self {
            gateway,
            distribution: config.distribution_contract,
            token: config.token_contract,
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            confirm_timeout: Duration::from_millis(config.confirm_timeout_ms),
        }
    }

    /// Get the underlying gateway
    pub fn gateway(&self) -> &Arc<dyn ChainGateway> {
        &self.gateway
    }

    pub fn distribution(&self) -> Address {
        self.distribution
    }

    pub fn token(&self) -> Address {
        self.token
    }

    async fn read(&self, contract: Address, call: ContractCall) -> GatewayResult<CallOutput> {
        debug!("Chain read: {} {:?}", call.method(), call);
        tokio::time::timeout(self.read_timeout, self.gateway.call(contract, call))
            .await
            .map_err(|_| GatewayError::Timeout(self.read_timeout))?
    }

    /// Fetch pool metadata by index
    pub async fn pool(&self, index: PoolId) -> GatewayResult<PoolData> {
        self.read(self.distribution, ContractCall::Pools { index })
            .await?
            .into_pool("pools")
    }

    /// Fetch a user's deposit and pending rewards in one pool
    pub async fn user_data(&self, user: Address, pool: PoolId) -> GatewayResult<UserData> {
        self.read(self.distribution, ContractCall::UsersData { user, pool })
            .await?
            .into_user("usersData")
    }

    /// Fetch the live reward for a user in one pool
    pub async fn current_reward(&self, pool: PoolId, user: Address) -> GatewayResult<TokenAmount> {
        self.read(self.distribution, ContractCall::CurrentUserReward { pool, user })
            .await?
            .into_amount("getCurrentUserReward")
    }

    /// Fetch the allowance `owner` granted to the distribution contract
    pub async fn allowance(&self, owner: Address) -> GatewayResult<TokenAmount> {
        let call = ContractCall::Allowance {
            owner,
            spender: self.distribution,
        };
        self.read(self.token, call).await?.into_amount("allowance")
    }

    /// Contract a transaction is addressed to
    pub fn contract_for(&self, tx: &ContractTx) -> Address {
        match tx {
            ContractTx::Approve { .. } => self.token,
            _ => self.distribution,
        }
    }

    /// Submit a transaction
    pub async fn submit(&self, tx: ContractTx, from: Address) -> GatewayResult<TxHash> {
        let contract = self.contract_for(&tx);
        debug!("Submitting {} to {} from {}", tx.method(), contract, from);
        self.gateway.send(contract, tx, from).await
    }

    /// Await finality, bounded by the confirmation timeout
    pub async fn confirm(&self, tx_hash: &TxHash) -> GatewayResult<TxReceipt> {
        tokio::time::timeout(self.confirm_timeout, self.gateway.wait_for_confirmation(tx_hash))
            .await
            .map_err(|_| GatewayError::Timeout(self.confirm_timeout))?
    }
}
