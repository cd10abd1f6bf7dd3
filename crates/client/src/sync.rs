//! Position and reward synchronization
//!
//! Positions are fetched on demand and replaced wholesale. The current reward
//! for one pool is kept live by a polling task that never overlaps its own
//! reads and stops as soon as its session ends.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use stake_types::{Address, CurrentReward, PoolId, StakeError, StakeResult, UserPosition};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::gateway::DistributionClient;
use crate::session::{Session, SessionTicket};

/// Outcome of a batched position refresh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionBatch {
    pub positions: BTreeMap<PoolId, UserPosition>,
    pub failures: BTreeMap<PoolId, StakeError>,
}

/// Fetches positions and rewards and publishes them to the session
pub struct PositionSynchronizer {
    client: Arc<DistributionClient>,
    session: Arc<Session>,
}

impl PositionSynchronizer {
    pub fn new(client: Arc<DistributionClient>, session: Arc<Session>) -> Self {
        Self { client, session }
    }

    /// Single authoritative fetch of one pool's position
    pub async fn refresh_position(&self, address: Address, pool: PoolId) -> StakeResult<UserPosition> {
        let ticket = self.session.ticket_for(address);
        self.fetch_position(address, pool, ticket.as_ref()).await
    }

    /// Refresh against a ticket captured earlier (e.g. when a transaction was submitted)
    pub async fn refresh_position_for(&self, ticket: &SessionTicket, pool: PoolId) -> StakeResult<UserPosition> {
        self.fetch_position(ticket.address, pool, Some(ticket)).await
    }

    async fn fetch_position(
        &self,
        address: Address,
        pool: PoolId,
        ticket: Option<&SessionTicket>,
    ) -> StakeResult<UserPosition> {
        let data = self
            .client
            .user_data(address, pool)
            .await
            .map_err(|e| StakeError::chain_read("usersData", Some(pool), e))?;
        let position = UserPosition::from_user_data(pool, &data);

        if let Some(ticket) = ticket {
            let update = position.clone();
            if !self.session.apply(ticket, move |s| s.set_position(update)) {
                warn!("Discarded position for {} in pool {}: session changed", address, pool);
            }
        }
        Ok(position)
    }

    /// Refresh every pool in `pools`; failures are per pool
    pub async fn refresh_all_discovered(&self, address: Address, pools: &[PoolId]) -> PositionBatch {
        let results = join_all(pools.iter().map(|&pool| async move {
            (pool, self.refresh_position(address, pool).await)
        }))
        .await;

        let mut batch = PositionBatch::default();
        for (pool, result) in results {
            match result {
                Ok(position) => {
                    batch.positions.insert(pool, position);
                }
                Err(e) => {
                    warn!("Position refresh failed for pool {}: {}", pool, e);
                    batch.failures.insert(pool, e);
                }
            }
        }
        batch
    }

    /// Single authoritative fetch of the live reward
    pub async fn refresh_current_reward(&self, address: Address, pool: PoolId) -> StakeResult<CurrentReward> {
        let ticket = self.session.ticket_for(address);
        fetch_reward(&self.client, &self.session, address, pool, ticket.as_ref()).await
    }

    pub async fn refresh_current_reward_for(
        &self,
        ticket: &SessionTicket,
        pool: PoolId,
    ) -> StakeResult<CurrentReward> {
        fetch_reward(&self.client, &self.session, ticket.address, pool, Some(ticket)).await
    }

    /// Start refreshing the current reward for `pool` every `interval`
    ///
    /// The poller is bound to the session active for `address` right now and
    /// stops on its own once that session ends. Ticks that come due while a
    /// read is outstanding are skipped, not queued.
    pub fn start_reward_polling(&self, address: Address, pool: PoolId, interval: Duration) -> PollHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let stats = Arc::new(PollStats::default());

        let Some(ticket) = self.session.ticket_for(address) else {
            warn!("Not polling rewards for {}: not the active account", address);
            return PollHandle {
                cancel: cancel_tx,
                task: None,
                stats,
            };
        };

        let task = tokio::spawn(poll_rewards(
            self.client.clone(),
            self.session.clone(),
            ticket,
            pool,
            interval,
            cancel_rx,
            stats.clone(),
        ));

        info!("Reward polling started for {} pool {} every {:?}", address, pool, interval);
        PollHandle {
            cancel: cancel_tx,
            task: Some(task),
            stats,
        }
    }
}

async fn fetch_reward(
    client: &DistributionClient,
    session: &Session,
    address: Address,
    pool: PoolId,
    ticket: Option<&SessionTicket>,
) -> StakeResult<CurrentReward> {
    let amount = client
        .current_reward(pool, address)
        .await
        .map_err(|e| StakeError::chain_read("getCurrentUserReward", Some(pool), e))?;
    let reward = CurrentReward {
        pool_id: pool,
        amount,
        fetched_at: Utc::now(),
    };

    if let Some(ticket) = ticket {
        let update = reward.clone();
        if !session.apply(ticket, move |s| s.current_reward = Some(update)) {
            warn!("Discarded reward for {} in pool {}: session changed", address, pool);
        }
    }
    Ok(reward)
}

async fn poll_rewards(
    client: Arc<DistributionClient>,
    session: Arc<Session>,
    ticket: SessionTicket,
    pool: PoolId,
    interval: Duration,
    mut cancel: watch::Receiver<bool>,
    stats: Arc<PollStats>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.changed() => break,
            _ = ticker.tick() => {}
        }

        if !session.is_current(&ticket) {
            debug!("Reward polling for {} stopped: session ended", ticket.address);
            break;
        }

        stats.ticks.fetch_add(1, Ordering::Relaxed);
        let result = tokio::select! {
            _ = cancel.changed() => break,
            result = client.current_reward(pool, ticket.address) => result,
        };

        match result {
            Ok(amount) => {
                let reward = CurrentReward {
                    pool_id: pool,
                    amount,
                    fetched_at: Utc::now(),
                };
                if session.apply(&ticket, move |s| s.current_reward = Some(reward)) {
                    stats.applied.fetch_add(1, Ordering::Relaxed);
                } else {
                    stats.discarded.fetch_add(1, Ordering::Relaxed);
                    warn!("Discarded reward tick for {}: session changed", ticket.address);
                    break;
                }
            }
            Err(e) => {
                stats.failures.fetch_add(1, Ordering::Relaxed);
                warn!("Reward tick for {} pool {} failed: {}", ticket.address, pool, e);
            }
        }
    }

    debug!("Reward polling for {} pool {} exited", ticket.address, pool);
}

/// Counters kept by a reward poller
#[derive(Debug, Default)]
pub struct PollStats {
    pub ticks: AtomicU64,
    pub applied: AtomicU64,
    pub discarded: AtomicU64,
    pub failures: AtomicU64,
}

/// Cancellation handle for a reward poller; dropping it also cancels
pub struct PollHandle {
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    stats: Arc<PollStats>,
}

impl PollHandle {
    /// Stop future ticks and abandon any outstanding read
    pub fn cancel(&self) {
        // Receiver already gone means the poller has exited
        let _ = self.cancel.send(true);
    }

    /// Cancel and wait for the task to exit
    pub async fn shutdown(mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Reward poller ended abnormally: {}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map_or(false, |t| !t.is_finished())
    }

    pub fn stats(&self) -> &PollStats {
        &self.stats
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
