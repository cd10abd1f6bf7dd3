//! Staking engine facade
//!
//! Owns the wallet session and wires the approval tracker, pool discovery,
//! position synchronizer and transaction orchestrator together. Presentation
//! layers drive it through user actions and observe it through snapshots.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use stake_types::{
    Address, ApprovalState, OperationKey, OperationState, PoolId, StakeError, StakeResult,
    UserPosition,
};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::approval::ApprovalTracker;
use crate::cache::{ApprovalCache, FileCache, LocalCache, MemoryCache};
use crate::config::{CacheConfig, ClientConfig};
use crate::discovery::{DiscoveryReport, PoolDiscovery};
use crate::gateway::{ChainGateway, DistributionClient, GatewayError};
use crate::orchestrator::{OperationEvent, OperationOutcome, TransactionOrchestrator};
use crate::session::{EngineSnapshot, Session, SessionTicket};
use crate::sync::{PollHandle, PositionBatch, PositionSynchronizer};

type ReconcileHandle = JoinHandle<StakeResult<ApprovalState>>;

/// Build the cache backend named by the configuration
pub fn cache_from_config(config: &CacheConfig) -> Arc<dyn LocalCache> {
    match &config.path {
        Some(path) => Arc::new(FileCache::new(path)),
        None => Arc::new(MemoryCache::new()),
    }
}

/// Client-side staking engine for one wallet at a time
pub struct StakingEngine {
    config: ClientConfig,
    client: Arc<DistributionClient>,
    session: Arc<Session>,
    approval: Arc<ApprovalTracker>,
    discovery: PoolDiscovery,
    sync: Arc<PositionSynchronizer>,
    orchestrator: TransactionOrchestrator,
    poller: Mutex<Option<PollHandle>>,
    reconcile: Mutex<Option<ReconcileHandle>>,
}

impl StakingEngine {
    /// Create an engine over `gateway`, persisting approval flags in `cache`
    pub fn new(
        config: ClientConfig,
        gateway: Arc<dyn ChainGateway>,
        cache: Arc<dyn LocalCache>,
    ) -> StakeResult<Self> {
        config.validate()?;

        let client = Arc::new(DistributionClient::new(gateway, &config));
        let session = Arc::new(Session::new());
        let approval = Arc::new(ApprovalTracker::new(
            client.clone(),
            ApprovalCache::new(cache, &config.cache.namespace),
            session.clone(),
        ));
        let discovery = PoolDiscovery::new(client.clone(), config.concurrent_discovery);
        let sync = Arc::new(PositionSynchronizer::new(client.clone(), session.clone()));
        let orchestrator = TransactionOrchestrator::new(
            client.clone(),
            session.clone(),
            approval.clone(),
            sync.clone(),
            config.primary_pool(),
        );

        Ok(Self {
            config,
            client,
            session,
            approval,
            discovery,
            sync,
            orchestrator,
            poller: Mutex::new(None),
            reconcile: Mutex::new(None),
        })
    }

    /// Create an engine whose cache backend comes from the configuration
    pub fn from_config(config: ClientConfig, gateway: Arc<dyn ChainGateway>) -> StakeResult<Self> {
        let cache = cache_from_config(&config.cache);
        Self::new(config, gateway, cache)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Wallet session
    // ------------------------------------------------------------------------

    /// Ask the wallet for accounts and start a session for the first one
    pub async fn connect_wallet(&self) -> StakeResult<Address> {
        let accounts = self
            .client
            .gateway()
            .request_accounts()
            .await
            .map_err(|e| match e {
                GatewayError::ProviderMissing => StakeError::wallet_unavailable("no wallet provider present"),
                other => StakeError::wallet_unavailable(other),
            })?;

        let Some(&address) = accounts.first() else {
            return Err(StakeError::wallet_unavailable("wallet exposed no accounts"));
        };

        if self.session.address() == Some(address) {
            debug!("Wallet already connected as {}", address);
            return Ok(address);
        }

        self.start_session(address).await;
        Ok(address)
    }

    /// React to the wallet's account-change notification
    ///
    /// Everything tied to the previous account is cancelled or dropped. An
    /// empty list ends the session.
    pub async fn handle_accounts_changed(&self, accounts: &[Address]) -> Option<Address> {
        match accounts.first().copied() {
            Some(address) if self.session.address() == Some(address) => {
                debug!("Account notification for active account {}, nothing to do", address);
                Some(address)
            }
            Some(address) => {
                info!("Active account changed to {}", address);
                self.start_session(address).await;
                Some(address)
            }
            None => {
                self.stop_polling();
                self.lock_reconcile().take();
                self.session.end();
                info!("Wallet disconnected");
                None
            }
        }
    }

    /// Forward the gateway's account notifications until it goes away
    pub fn watch_accounts(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let mut accounts = engine.client.gateway().subscribe_accounts();

        tokio::spawn(async move {
            loop {
                match accounts.recv().await {
                    Ok(list) => {
                        engine.handle_accounts_changed(&list).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Missed {} account notifications, re-reading accounts", skipped);
                        match engine.client.gateway().request_accounts().await {
                            Ok(list) => {
                                engine.handle_accounts_changed(&list).await;
                            }
                            Err(e) => warn!("Failed to re-read accounts: {}", e),
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Account notifications closed");
                        break;
                    }
                }
            }
        })
    }

    /// End the session as if the wallet reported no accounts
    pub async fn disconnect(&self) {
        self.handle_accounts_changed(&[]).await;
    }

    async fn start_session(&self, address: Address) {
        self.stop_polling();
        let ticket = self.session.begin(address);

        // Optimistic value first, authoritative one in the background
        self.approval.surface_cached(&ticket).await;
        let approval = self.approval.clone();
        let reconcile = tokio::spawn(async move { approval.reconcile(ticket).await });
        *self.lock_reconcile() = Some(reconcile);

        self.start_polling(&ticket);
    }

    fn start_polling(&self, ticket: &SessionTicket) {
        let interval = Duration::from_millis(self.config.reward_poll_interval_ms);
        let handle = self
            .sync
            .start_reward_polling(ticket.address, self.config.primary_pool(), interval);
        *self.lock_poller() = Some(handle);
    }

    fn stop_polling(&self) {
        if let Some(handle) = self.lock_poller().take() {
            handle.cancel();
        }
    }

    pub fn is_polling(&self) -> bool {
        self.lock_poller().as_ref().map_or(false, PollHandle::is_running)
    }

    /// Wait for the background approval reconciliation of the current session
    ///
    /// Returns `None` when no reconciliation is outstanding.
    pub async fn approval_reconciled(&self) -> Option<StakeResult<ApprovalState>> {
        let handle = self.lock_reconcile().take()?;
        match handle.await {
            Ok(result) => Some(result),
            Err(e) => {
                warn!("Approval reconciliation task failed: {}", e);
                None
            }
        }
    }

    fn lock_poller(&self) -> MutexGuard<'_, Option<PollHandle>> {
        self.poller.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_reconcile(&self) -> MutexGuard<'_, Option<ReconcileHandle>> {
        self.reconcile.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn active_ticket(&self) -> StakeResult<SessionTicket> {
        self.session
            .ticket()
            .ok_or_else(|| StakeError::wallet_unavailable("no account connected"))
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Authoritative approval check for the active account
    pub async fn check_approval(&self) -> StakeResult<ApprovalState> {
        self.approval.check_approval(self.session.address()).await
    }

    /// Refresh the active account's position in the primary pool
    pub async fn refresh_my_data(&self) -> StakeResult<UserPosition> {
        let ticket = self.active_ticket()?;
        self.sync
            .refresh_position_for(&ticket, self.config.primary_pool())
            .await
    }

    /// Refresh the active account's position in one pool
    pub async fn refresh_position(&self, pool: PoolId) -> StakeResult<UserPosition> {
        let ticket = self.active_ticket()?;
        self.sync.refresh_position_for(&ticket, pool).await
    }

    /// Refresh positions in every pool found by the last discovery pass
    pub async fn refresh_all_discovered(&self) -> StakeResult<PositionBatch> {
        let ticket = self.active_ticket()?;
        let pools: Vec<PoolId> = self
            .session
            .snapshot()
            .pools
            .iter()
            .map(|p| p.pool_id())
            .collect();
        Ok(self.sync.refresh_all_discovered(ticket.address, &pools).await)
    }

    /// Scan the configured index range for public pools
    pub async fn discover_pools(&self) -> StakeResult<DiscoveryReport> {
        let ticket = self.active_ticket()?;
        self.session.apply(&ticket, |s| s.discovery_in_progress = true);

        let report = self
            .discovery
            .discover_pools(ticket.address, self.config.pool_scan_bound)
            .await;

        let pools = report.pools.clone();
        let applied = self.session.apply(&ticket, move |s| {
            for position in pools.iter().filter_map(|p| p.position.clone()) {
                s.positions.insert(position.pool_id, position);
            }
            s.pools = pools;
            s.discovery_in_progress = false;
        });
        if !applied {
            warn!("Discarded discovery results for {}: session changed", ticket.address);
        }

        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Approve the distribution contract for the maximum allowance
    pub async fn request_approval(&self) -> StakeResult<ApprovalState> {
        // A reconciliation read that started before the approve must not land after it
        self.approval_reconciled().await;

        let address = self.session.address();
        self.orchestrator.approve(address).await?;
        Ok(self
            .session
            .snapshot()
            .approval
            .unwrap_or_else(|| ApprovalState::new(true)))
    }

    pub async fn stake(&self, pool: PoolId, amount: &str) -> StakeResult<OperationOutcome> {
        self.orchestrator.stake(self.session.address(), pool, amount).await
    }

    pub async fn withdraw(&self, pool: PoolId, amount: &str) -> StakeResult<OperationOutcome> {
        self.orchestrator
            .withdraw(self.session.address(), pool, amount)
            .await
    }

    pub async fn claim(&self, pool: PoolId) -> StakeResult<OperationOutcome> {
        self.orchestrator.claim(self.session.address(), pool).await
    }

    // ------------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------------

    pub fn snapshot(&self) -> EngineSnapshot {
        self.session.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineSnapshot> {
        self.session.subscribe()
    }

    pub fn operation_events(&self) -> broadcast::Receiver<OperationEvent> {
        self.orchestrator.subscribe_events()
    }

    /// Where an operation tuple currently is; `Idle` when nothing is in flight
    pub fn operation_state(&self, key: &OperationKey) -> OperationState {
        self.orchestrator.state_of(key)
    }

    pub fn address(&self) -> Option<Address> {
        self.session.address()
    }
}
