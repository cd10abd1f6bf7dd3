//! Approval tracking for the staked token
//!
//! The on-chain allowance is authoritative. The cached flag only lets a new
//! session show something immediately while the allowance read is in flight.

use std::sync::Arc;

use stake_types::{Address, ApprovalState, StakeError, StakeResult, MAX_ALLOWANCE};
use tracing::{debug, info, warn};

use crate::cache::ApprovalCache;
use crate::gateway::DistributionClient;
use crate::session::{Session, SessionTicket};

/// Tracks whether the distribution contract may move the user's tokens
pub struct ApprovalTracker {
    client: Arc<DistributionClient>,
    cache: ApprovalCache,
    session: Arc<Session>,
}

impl ApprovalTracker {
    pub fn new(client: Arc<DistributionClient>, cache: ApprovalCache, session: Arc<Session>) -> Self {
        Self { client, cache, session }
    }

    /// Read the allowance and compare it against the maximum-allowance sentinel
    ///
    /// An absent address yields the neutral state without touching the chain.
    /// On read failure the cached state is left as it was.
    pub async fn check_approval(&self, address: Option<Address>) -> StakeResult<ApprovalState> {
        let Some(address) = address else {
            debug!("No address connected, approval unknown");
            return Ok(ApprovalState::unknown());
        };
        let ticket = self.session.ticket_for(address);

        let allowance = self
            .client
            .allowance(address)
            .await
            .map_err(|e| StakeError::chain_read("allowance", None, e))?;

        let state = ApprovalState::new(allowance.base_units() >= MAX_ALLOWANCE);
        debug!("Allowance for {}: {} (approved: {})", address, allowance, state.is_approved);

        // Persist the freshly computed value
        if let Err(e) = self.cache.store(&address, &state).await {
            warn!("Failed to cache approval for {}: {}", address, e);
        }

        if let Some(ticket) = ticket {
            if !self.session.apply(&ticket, |s| s.approval = Some(state)) {
                warn!("Discarded approval read for {}: session changed", address);
            }
        }

        Ok(state)
    }

    /// Surface the cached approval for a fresh session without waiting on the chain
    pub async fn surface_cached(&self, ticket: &SessionTicket) -> Option<ApprovalState> {
        let cached = self.cache.load(&ticket.address).await?;
        debug!("Cached approval for {}: {}", ticket.address, cached.is_approved);
        self.session.apply(ticket, |s| {
            if s.approval.is_none() {
                s.approval = Some(cached);
            }
        });
        Some(cached)
    }

    /// Reconcile the cached approval with the chain; the chain wins
    pub async fn reconcile(&self, ticket: SessionTicket) -> StakeResult<ApprovalState> {
        let cached = self.cache.load(&ticket.address).await;
        let fresh = self.check_approval(Some(ticket.address)).await?;

        match cached {
            Some(c) if c.is_approved != fresh.is_approved => info!(
                "Cached approval for {} was {}, chain says {}; cache corrected",
                ticket.address, c.is_approved, fresh.is_approved
            ),
            _ => debug!("Approval for {} reconciled: {}", ticket.address, fresh.is_approved),
        }
        Ok(fresh)
    }

    /// Record a confirmed approve transaction
    pub async fn record_confirmed(&self, ticket: &SessionTicket) -> ApprovalState {
        let state = ApprovalState::new(true);
        if let Err(e) = self.cache.store(&ticket.address, &state).await {
            warn!("Failed to cache approval for {}: {}", ticket.address, e);
        }
        self.session.apply(ticket, |s| s.approval = Some(state));
        state
    }

    pub async fn cached(&self, address: &Address) -> Option<ApprovalState> {
        self.cache.load(address).await
    }
}
