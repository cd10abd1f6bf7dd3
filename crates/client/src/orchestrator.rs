//! Transaction orchestration for approve, stake, withdraw and claim
//!
//! Each `(address, pool, kind)` tuple runs its own state machine:
//! `Idle -> Validating -> Submitting -> Confirming -> {Succeeded, Failed}`.
//! At most one attempt per tuple is in flight; a second request is refused
//! with `AlreadyPending`. Failed attempts are never retried here.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use stake_types::{
    Address, OperationKey, OperationKind, OperationState, PoolId, StakeError, StakeResult,
    TokenAmount,
};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::approval::ApprovalTracker;
use crate::gateway::{ContractTx, DistributionClient, TxHash};
use crate::session::{Session, SessionTicket};
use crate::sync::PositionSynchronizer;

const EVENT_CAPACITY: usize = 256;

/// A state transition of one operation tuple
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationEvent {
    pub key: OperationKey,
    pub state: OperationState,
    pub detail: Option<String>,
}

/// Confirmed result of a successful operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationOutcome {
    pub key: OperationKey,
    pub tx_hash: TxHash,
    pub block_number: u64,
}

/// Runs mutating operations against the distribution and token contracts
///
/// Submission, confirmation and the follow-up re-reads run on a spawned task
/// that owns the tuple's slot. Dropping the caller's future detaches from that
/// task without releasing the tuple, so a retry stays refused until the
/// confirmation wait resolves or times out.
pub struct TransactionOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    client: Arc<DistributionClient>,
    session: Arc<Session>,
    approval: Arc<ApprovalTracker>,
    sync: Arc<PositionSynchronizer>,
    reward_pool: PoolId,
    pending: Mutex<HashMap<OperationKey, OperationState>>,
    events: broadcast::Sender<OperationEvent>,
}

impl TransactionOrchestrator {
    pub fn new(
        client: Arc<DistributionClient>,
        session: Arc<Session>,
        approval: Arc<ApprovalTracker>,
        sync: Arc<PositionSynchronizer>,
        reward_pool: PoolId,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                client,
                session,
                approval,
                sync,
                reward_pool,
                pending: Mutex::new(HashMap::new()),
                events,
            }),
        }
    }

    /// Follow state transitions of every operation
    pub fn subscribe_events(&self) -> broadcast::Receiver<OperationEvent> {
        self.inner.events.subscribe()
    }

    /// Current state of a tuple; `Idle` when nothing is in flight
    pub fn state_of(&self, key: &OperationKey) -> OperationState {
        self.inner
            .lock_pending()
            .get(key)
            .copied()
            .unwrap_or(OperationState::Idle)
    }

    /// Grant the distribution contract the maximum allowance
    pub async fn approve(&self, address: Option<Address>) -> StakeResult<OperationOutcome> {
        let spender = self.inner.client.distribution();
        self.execute(address, None, OperationKind::Approve, |_| {
            Ok(ContractTx::Approve {
                spender,
                amount: TokenAmount::MAX,
            })
        })
        .await
    }

    /// Stake a decimal `amount` of tokens into `pool`
    pub async fn stake(
        &self,
        address: Option<Address>,
        pool: PoolId,
        amount: &str,
    ) -> StakeResult<OperationOutcome> {
        let session = self.inner.session.clone();
        self.execute(address, Some(pool), OperationKind::Stake, move |ticket| {
            let amount = parse_positive(OperationKind::Stake, pool, amount)?;
            let snapshot = session.snapshot();
            // Unknown approval counts as not approved; the chain stays authoritative
            if snapshot.epoch != ticket.epoch || !snapshot.is_approved() {
                return Err(StakeError::precondition(
                    OperationKind::Stake,
                    Some(pool),
                    "token spending is not approved",
                ));
            }
            Ok(ContractTx::Stake { pool, amount })
        })
        .await
    }

    /// Withdraw a decimal `amount` of staked tokens from `pool`
    ///
    /// Only the shape of the amount is checked here; the contract enforces the
    /// deposited balance and reports a revert when it is exceeded.
    pub async fn withdraw(
        &self,
        address: Option<Address>,
        pool: PoolId,
        amount: &str,
    ) -> StakeResult<OperationOutcome> {
        self.execute(address, Some(pool), OperationKind::Withdraw, move |_| {
            let amount = parse_positive(OperationKind::Withdraw, pool, amount)?;
            Ok(ContractTx::Withdraw { pool, amount })
        })
        .await
    }

    /// Claim pending rewards from `pool` to the caller
    pub async fn claim(&self, address: Option<Address>, pool: PoolId) -> StakeResult<OperationOutcome> {
        self.execute(address, Some(pool), OperationKind::Claim, move |ticket| {
            Ok(ContractTx::Claim {
                pool,
                receiver: ticket.address,
            })
        })
        .await
    }

    async fn execute<F>(
        &self,
        address: Option<Address>,
        pool: Option<PoolId>,
        kind: OperationKind,
        validate: F,
    ) -> StakeResult<OperationOutcome>
    where
        F: FnOnce(&SessionTicket) -> StakeResult<ContractTx>,
    {
        let Some(address) = address else {
            return Err(StakeError::precondition(kind, pool, "no wallet address connected"));
        };
        let key = OperationKey::new(address, pool, kind);
        let slot = Inner::reserve(&self.inner, key)?;

        // Validating
        let validated = self
            .inner
            .session
            .ticket_for(address)
            .ok_or_else(|| StakeError::precondition(kind, pool, "address is not the active account"))
            .and_then(|ticket| validate(&ticket).map(|tx| (ticket, tx)));
        let (ticket, tx) = match validated {
            Ok(validated) => validated,
            Err(e) => {
                warn!("{} rejected: {}", key, e);
                self.inner.transition(key, OperationState::Failed, Some(e.to_string()));
                return Err(e);
            }
        };

        let inner = self.inner.clone();
        let attempt = tokio::spawn(async move { inner.submit_and_confirm(slot, ticket, tx).await });
        match attempt.await {
            Ok(result) => result,
            Err(e) => {
                error!("{} task ended abnormally: {}", key, e);
                Err(StakeError::transaction(kind, pool, e, None))
            }
        }
    }
}

impl Inner {
    /// Submitting through Succeeded; the slot is released when this returns
    async fn submit_and_confirm(
        &self,
        slot: PendingSlot,
        ticket: SessionTicket,
        tx: ContractTx,
    ) -> StakeResult<OperationOutcome> {
        let key = slot.key;
        let (kind, pool) = (key.kind, key.pool);

        // Submitting
        self.transition(key, OperationState::Submitting, None);
        let tx_hash = match self.client.submit(tx, key.address).await {
            Ok(hash) => hash,
            Err(e) => {
                let err = StakeError::transaction(kind, pool, e, None);
                return Err(self.fail(key, err));
            }
        };

        // Confirming
        self.transition(key, OperationState::Confirming, Some(tx_hash.to_string()));
        let receipt = match self.client.confirm(&tx_hash).await {
            Ok(receipt) => receipt,
            Err(e) => {
                let err = StakeError::transaction(kind, pool, e, Some(tx_hash.to_string()));
                return Err(self.fail(key, err));
            }
        };
        if !receipt.success {
            let reason = receipt
                .revert_reason
                .unwrap_or_else(|| "execution reverted".to_string());
            let err = StakeError::transaction(kind, pool, reason, Some(tx_hash.to_string()));
            return Err(self.fail(key, err));
        }

        self.transition(key, OperationState::Succeeded, Some(tx_hash.to_string()));
        info!("{} confirmed in block {} ({})", key, receipt.block_number, tx_hash);

        self.invalidate(&ticket, kind, pool).await;
        drop(slot);

        Ok(OperationOutcome {
            key,
            tx_hash,
            block_number: receipt.block_number,
        })
    }

    /// Re-read whatever the confirmed operation changed
    async fn invalidate(&self, ticket: &SessionTicket, kind: OperationKind, pool: Option<PoolId>) {
        match (kind, pool) {
            (OperationKind::Approve, _) => {
                self.approval.record_confirmed(ticket).await;
                if let Err(e) = self.approval.check_approval(Some(ticket.address)).await {
                    warn!("Approval re-read after approve failed: {}", e);
                }
            }
            (OperationKind::Stake | OperationKind::Withdraw, Some(pool)) => {
                self.session.apply(ticket, |s| s.invalidate_position(pool));
                if let Err(e) = self.sync.refresh_position_for(ticket, pool).await {
                    warn!("Position re-read after {} failed: {}", kind, e);
                }
            }
            (OperationKind::Claim, Some(pool)) => {
                let reward_pool = self.reward_pool;
                self.session.apply(ticket, |s| {
                    s.invalidate_position(pool);
                    if pool == reward_pool {
                        s.current_reward = None;
                    }
                });
                if let Err(e) = self.sync.refresh_position_for(ticket, pool).await {
                    warn!("Position re-read after claim failed: {}", e);
                }
                if pool == reward_pool {
                    if let Err(e) = self.sync.refresh_current_reward_for(ticket, pool).await {
                        warn!("Reward re-read after claim failed: {}", e);
                    }
                }
            }
            (_, None) => debug!("Nothing to invalidate for {}", kind),
        }
    }

    fn fail(&self, key: OperationKey, err: StakeError) -> StakeError {
        error!("{} failed: {}", key, err);
        self.transition(key, OperationState::Failed, Some(err.to_string()));
        err
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<OperationKey, OperationState>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the tuple or refuse a duplicate
    fn reserve(inner: &Arc<Inner>, key: OperationKey) -> StakeResult<PendingSlot> {
        {
            let mut pending = inner.lock_pending();
            if let Some(state) = pending.get(&key) {
                if state.is_in_flight() {
                    warn!("{} refused: already {:?}", key, state);
                    return Err(StakeError::AlreadyPending {
                        kind: key.kind,
                        pool: key.pool,
                        address: key.address,
                    });
                }
            }
            pending.insert(key, OperationState::Validating);
        }
        inner.emit(key, OperationState::Validating, None);
        Ok(PendingSlot {
            inner: inner.clone(),
            key,
        })
    }

    fn transition(&self, key: OperationKey, next: OperationState, detail: Option<String>) {
        {
            let mut pending = self.lock_pending();
            let current = pending.get(&key).copied().unwrap_or(OperationState::Idle);
            if !current.can_transition_to(next) {
                warn!("{}: unexpected transition {:?} -> {:?}", key, current, next);
            }
            pending.insert(key, next);
        }
        self.emit(key, next, detail);
    }

    fn emit(&self, key: OperationKey, state: OperationState, detail: Option<String>) {
        debug!("{} -> {:?}", key, state);
        // No subscribers is fine
        let _ = self.events.send(OperationEvent { key, state, detail });
    }
}

/// Returns its tuple to `Idle` when the attempt ends, however it ends
struct PendingSlot {
    inner: Arc<Inner>,
    key: OperationKey,
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.inner.lock_pending().remove(&self.key);
        self.inner.emit(self.key, OperationState::Idle, None);
    }
}

fn parse_positive(kind: OperationKind, pool: PoolId, input: &str) -> StakeResult<TokenAmount> {
    let amount = TokenAmount::parse_decimal(input)
        .map_err(|e| StakeError::precondition(kind, Some(pool), e))?;
    if amount.is_zero() {
        return Err(StakeError::precondition(kind, Some(pool), "amount must be positive"));
    }
    Ok(amount)
}
