//! Session-scoped engine state and stale-result isolation
//!
//! The session owns the only mutable view presentation layers see. Every
//! in-flight operation captures a [`SessionTicket`] when it starts and may
//! write its result only while that ticket is still current. The epoch check
//! and the write happen under the same lock, so an account change can never
//! interleave between them.

use std::collections::BTreeMap;

use serde::Serialize;
use stake_types::{Address, ApprovalState, CurrentReward, DiscoveredPool, PoolId, UserPosition};
use tokio::sync::watch;
use tracing::{debug, info};

/// Address and epoch captured when an operation starts
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionTicket {
    pub address: Address,
    pub epoch: u64,
}

/// Read-only view of the engine state for presentation layers
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineSnapshot {
    /// Incremented on every session start or end
    pub epoch: u64,
    /// Active account, `None` when disconnected
    pub address: Option<Address>,
    pub approval: Option<ApprovalState>,
    /// Public pools from the last discovery pass, ascending by pool id
    pub pools: Vec<DiscoveredPool>,
    /// Latest known position per pool
    pub positions: BTreeMap<PoolId, UserPosition>,
    pub current_reward: Option<CurrentReward>,
    pub discovery_in_progress: bool,
}

impl EngineSnapshot {
    pub fn is_approved(&self) -> bool {
        self.approval.map_or(false, |a| a.is_approved)
    }

    pub fn position(&self, pool: PoolId) -> Option<&UserPosition> {
        self.positions.get(&pool)
    }

    /// Replace a position wholesale, including the copy held by its discovered pool
    pub fn set_position(&mut self, position: UserPosition) {
        if let Some(pool) = self.pools.iter_mut().find(|p| p.pool_id() == position.pool_id) {
            pool.position = Some(position.clone());
        }
        self.positions.insert(position.pool_id, position);
    }

    /// Drop every copy of the known position for `pool` ahead of a refetch
    pub fn invalidate_position(&mut self, pool: PoolId) {
        if let Some(discovered) = self.pools.iter_mut().find(|p| p.pool_id() == pool) {
            discovered.position = None;
        }
        self.positions.remove(&pool);
    }
}

/// Single active wallet session
pub struct Session {
    state: watch::Sender<EngineSnapshot>,
}

impl Session {
    pub fn new() -> Self {
        let (state, _) = watch::channel(EngineSnapshot::default());
        Self { state }
    }

    /// Start a session for `address`, discarding all state of the previous one
    pub fn begin(&self, address: Address) -> SessionTicket {
        let mut ticket = SessionTicket { address, epoch: 0 };
        self.state.send_modify(|snapshot| {
            let epoch = snapshot.epoch + 1;
            *snapshot = EngineSnapshot {
                epoch,
                address: Some(address),
                ..EngineSnapshot::default()
            };
            ticket.epoch = epoch;
        });
        info!("Session started for {} (epoch {})", address, ticket.epoch);
        ticket
    }

    /// End the active session; the address becomes absent
    pub fn end(&self) -> u64 {
        let mut ended = 0;
        self.state.send_modify(|snapshot| {
            ended = snapshot.epoch + 1;
            *snapshot = EngineSnapshot {
                epoch: ended,
                ..EngineSnapshot::default()
            };
        });
        info!("Session ended (epoch {})", ended);
        ended
    }

    /// Ticket for the active session
    pub fn ticket(&self) -> Option<SessionTicket> {
        let snapshot = self.state.borrow();
        snapshot.address.map(|address| SessionTicket {
            address,
            epoch: snapshot.epoch,
        })
    }

    /// Ticket for the active session if `address` is the active account
    pub fn ticket_for(&self, address: Address) -> Option<SessionTicket> {
        self.ticket().filter(|t| t.address == address)
    }

    pub fn address(&self) -> Option<Address> {
        self.state.borrow().address
    }

    pub fn is_current(&self, ticket: &SessionTicket) -> bool {
        let snapshot = self.state.borrow();
        snapshot.epoch == ticket.epoch && snapshot.address == Some(ticket.address)
    }

    /// Apply `update` if `ticket` is still current; returns whether it was applied
    pub fn apply<F>(&self, ticket: &SessionTicket, update: F) -> bool
    where
        F: FnOnce(&mut EngineSnapshot),
    {
        let mut applied = false;
        self.state.send_if_modified(|snapshot| {
            if snapshot.epoch != ticket.epoch || snapshot.address != Some(ticket.address) {
                return false;
            }
            update(snapshot);
            applied = true;
            true
        });

        if !applied {
            debug!(
                "Dropped result for {} (epoch {}): session moved on",
                ticket.address, ticket.epoch
            );
        }
        applied
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineSnapshot> {
        self.state.subscribe()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
