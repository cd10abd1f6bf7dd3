//! In-memory chain gateway for testing and demos
//!
//! Mirrors the distribution contract closely enough to exercise the engine:
//! pools that are public, private or missing, per-user deposits, allowances
//! and live rewards. Transactions take effect at confirmation time.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use stake_types::{Address, PoolData, PoolId, TokenAmount, UserData, MAX_ALLOWANCE};
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::{
    CallOutput, ChainGateway, ContractCall, ContractTx, GatewayError, GatewayResult, TxHash,
    TxReceipt,
};

#[derive(Debug, Clone)]
struct PendingTx {
    contract: Address,
    from: Address,
    tx: ContractTx,
}

#[derive(Debug, Default)]
struct MockState {
    provider_present: bool,
    accounts: Vec<Address>,
    pools: BTreeMap<u32, PoolData>,
    failing_pools: HashSet<u32>,
    failing_user_reads: HashSet<u32>,
    users: HashMap<(Address, PoolId), UserData>,
    rewards: HashMap<(Address, PoolId), TokenAmount>,
    allowances: HashMap<(Address, Address), TokenAmount>,
    latency: Duration,
    method_latency: HashMap<&'static str, Duration>,
    fail_next_send: Option<GatewayError>,
    revert_next_confirmation: Option<String>,
    pending: HashMap<TxHash, PendingTx>,
    next_tx: u64,
    block_number: u64,
    reads: HashMap<&'static str, u64>,
    sends: HashMap<&'static str, u64>,
}

/// Mock gateway backed by in-memory contract state
pub struct MockChain {
    state: Mutex<MockState>,
    accounts_tx: broadcast::Sender<Vec<Address>>,
}

impl MockChain {
    /// Create a mock chain whose wallet exposes `accounts`
    pub fn new(accounts: Vec<Address>) -> Self {
        let (accounts_tx, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(MockState {
                provider_present: true,
                accounts,
                block_number: 1_000,
                ..MockState::default()
            }),
            accounts_tx,
        }
    }

    /// A chain with no wallet provider installed
    pub fn without_provider() -> Self {
        let chain = Self::new(Vec::new());
        chain.lock().provider_present = false;
        chain
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------------
    // Setup
    // ------------------------------------------------------------------------

    /// Add a pool at `index` with default parameters
    pub fn with_pool(self, index: u32, is_public: bool) -> Self {
        self.insert_pool(
            index,
            PoolData {
                payout_start: 1_707_393_600,
                decrease_interval: 86_400,
                withdraw_lock_period: 604_800,
                claim_lock_period: 7_776_000,
                withdraw_lock_period_after_stake: 604_800,
                initial_reward: TokenAmount::from_u128(3_456_000_000_000_000_000_000),
                reward_decrease: TokenAmount::from_u128(592_558_728_240_000_000),
                minimal_stake: TokenAmount::from_u128(10_000_000_000_000_000),
                is_public,
            },
        );
        self
    }

    pub fn insert_pool(&self, index: u32, data: PoolData) {
        self.lock().pools.insert(index, data);
    }

    pub fn remove_pool(&self, index: u32) {
        self.lock().pools.remove(&index);
    }

    /// Make every `pools(index)` read fail
    pub fn fail_pool_read(&self, index: u32) {
        self.lock().failing_pools.insert(index);
    }

    /// Make every `usersData(_, index)` read fail
    pub fn fail_user_read(&self, index: u32) {
        self.lock().failing_user_reads.insert(index);
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.failing_pools.clear();
        state.failing_user_reads.clear();
    }

    pub fn set_user_data(&self, user: Address, pool: PoolId, data: UserData) {
        self.lock().users.insert((user, pool), data);
    }

    pub fn user_data(&self, user: Address, pool: PoolId) -> UserData {
        self.lock().users.get(&(user, pool)).cloned().unwrap_or_default()
    }

    pub fn set_current_reward(&self, user: Address, pool: PoolId, amount: TokenAmount) {
        self.lock().rewards.insert((user, pool), amount);
    }

    pub fn set_allowance(&self, owner: Address, spender: Address, amount: TokenAmount) {
        self.lock().allowances.insert((owner, spender), amount);
    }

    pub fn allowance_of(&self, owner: Address, spender: Address) -> TokenAmount {
        self.lock()
            .allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or(TokenAmount::ZERO)
    }

    /// Latency applied to every call, send and confirmation
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Latency for one read method, overriding the global latency
    pub fn set_method_latency(&self, method: &'static str, latency: Duration) {
        self.lock().method_latency.insert(method, latency);
    }

    pub fn fail_next_send(&self, error: GatewayError) {
        self.lock().fail_next_send = Some(error);
    }

    pub fn revert_next_confirmation(&self, reason: &str) {
        self.lock().revert_next_confirmation = Some(reason.to_string());
    }

    /// Switch the wallet's accounts and notify subscribers
    pub fn switch_accounts(&self, accounts: Vec<Address>) {
        self.lock().accounts = accounts.clone();
        info!("Mock: accounts changed to {:?}", accounts);
        // No subscribers is fine
        let _ = self.accounts_tx.send(accounts);
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    pub fn read_count(&self, method: &str) -> u64 {
        self.lock().reads.get(method).copied().unwrap_or(0)
    }

    pub fn send_count(&self, method: &str) -> u64 {
        self.lock().sends.get(method).copied().unwrap_or(0)
    }

    fn latency_for(&self, method: &'static str) -> Duration {
        let state = self.lock();
        state.method_latency.get(method).copied().unwrap_or(state.latency)
    }

    async fn simulate_latency(&self, method: &'static str) {
        let latency = self.latency_for(method);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn apply(state: &mut MockState, pending: &PendingTx) -> Result<(), String> {
        match &pending.tx {
            ContractTx::Approve { spender, amount } => {
                state.allowances.insert((pending.from, *spender), *amount);
            }
            ContractTx::Stake { pool, amount } => {
                if !state.pools.contains_key(&pool.index()) {
                    return Err(format!("pool {} does not exist", pool));
                }
                let key = (pending.from, pending.contract);
                let allowance = state.allowances.get(&key).copied().unwrap_or(TokenAmount::ZERO);
                if allowance < *amount {
                    return Err("ERC20: insufficient allowance".to_string());
                }
                if allowance.base_units() != MAX_ALLOWANCE {
                    state.allowances.insert(key, allowance.saturating_sub(*amount));
                }
                let user = state.users.entry((pending.from, *pool)).or_default();
                user.invested = user
                    .invested
                    .checked_add(*amount)
                    .ok_or_else(|| "deposit overflow".to_string())?;
            }
            ContractTx::Withdraw { pool, amount } => {
                let user = state.users.entry((pending.from, *pool)).or_default();
                user.invested = user
                    .invested
                    .checked_sub(*amount)
                    .ok_or_else(|| "DS: invalid withdraw amount".to_string())?;
            }
            ContractTx::Claim { pool, receiver } => {
                let user = state.users.entry((pending.from, *pool)).or_default();
                if user.pending_rewards.is_zero()
                    && state.rewards.get(&(pending.from, *pool)).map_or(true, |r| r.is_zero())
                {
                    return Err("DS: nothing to claim".to_string());
                }
                user.pending_rewards = TokenAmount::ZERO;
                state.rewards.insert((pending.from, *pool), TokenAmount::ZERO);
                debug!("Mock: rewards for pool {} sent to {}", pool, receiver);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ChainGateway for MockChain {
    async fn request_accounts(&self) -> GatewayResult<Vec<Address>> {
        let state = self.lock();
        if !state.provider_present {
            return Err(GatewayError::ProviderMissing);
        }
        Ok(state.accounts.clone())
    }

    fn subscribe_accounts(&self) -> broadcast::Receiver<Vec<Address>> {
        self.accounts_tx.subscribe()
    }

    async fn call(&self, _contract: Address, call: ContractCall) -> GatewayResult<CallOutput> {
        let method = call.method();
        self.simulate_latency(method).await;

        let mut state = self.lock();
        *state.reads.entry(method).or_insert(0) += 1;

        match call {
            ContractCall::Pools { index } => {
                if state.failing_pools.contains(&index.index()) {
                    return Err(GatewayError::Rpc(format!("pools({}) failed", index)));
                }
                state
                    .pools
                    .get(&index.index())
                    .cloned()
                    .map(CallOutput::Pool)
                    .ok_or_else(|| GatewayError::Reverted(format!("pool {} does not exist", index)))
            }
            ContractCall::UsersData { user, pool } => {
                if state.failing_user_reads.contains(&pool.index()) {
                    return Err(GatewayError::Rpc(format!("usersData({}, {}) failed", user, pool)));
                }
                Ok(CallOutput::User(
                    state.users.get(&(user, pool)).cloned().unwrap_or_default(),
                ))
            }
            ContractCall::CurrentUserReward { pool, user } => Ok(CallOutput::Amount(
                state.rewards.get(&(user, pool)).copied().unwrap_or(TokenAmount::ZERO),
            )),
            ContractCall::Allowance { owner, spender } => Ok(CallOutput::Amount(
                state
                    .allowances
                    .get(&(owner, spender))
                    .copied()
                    .unwrap_or(TokenAmount::ZERO),
            )),
        }
    }

    async fn send(&self, contract: Address, tx: ContractTx, from: Address) -> GatewayResult<TxHash> {
        let method = tx.method();
        self.simulate_latency(method).await;

        let mut state = self.lock();
        *state.sends.entry(method).or_insert(0) += 1;

        if let Some(error) = state.fail_next_send.take() {
            return Err(error);
        }

        state.next_tx += 1;
        let tx_hash = TxHash(format!("0x{:064x}", state.next_tx));
        state.pending.insert(tx_hash.clone(), PendingTx { contract, from, tx });
        debug!("Mock: accepted {} as {}", method, tx_hash);
        Ok(tx_hash)
    }

    async fn wait_for_confirmation(&self, tx_hash: &TxHash) -> GatewayResult<TxReceipt> {
        self.simulate_latency("confirmation").await;

        let mut state = self.lock();
        let pending = state
            .pending
            .remove(tx_hash)
            .ok_or_else(|| GatewayError::UnknownTransaction(tx_hash.to_string()))?;
        state.block_number += 1;
        let block_number = state.block_number;

        let outcome = match state.revert_next_confirmation.take() {
            Some(reason) => Err(reason),
            None => Self::apply(&mut state, &pending),
        };

        Ok(match outcome {
            Ok(()) => TxReceipt {
                tx_hash: tx_hash.clone(),
                block_number,
                success: true,
                revert_reason: None,
            },
            Err(reason) => TxReceipt {
                tx_hash: tx_hash.clone(),
                block_number,
                success: false,
                revert_reason: Some(reason),
            },
        })
    }
}
