//! Pool discovery over a bounded index range
//!
//! The contract exposes no pool count, so discovery probes `0..bound` and
//! keeps what answers. A pool past the bound stays invisible.

use std::sync::Arc;

use futures::future::join_all;
use stake_types::{Address, DiscoveredPool, PoolId, PoolRecord, UserPosition};
use tracing::{debug, info, warn};

use crate::gateway::DistributionClient;

/// Why an index produced no pool, or no position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryWarning {
    pub pool_id: PoolId,
    pub reason: String,
}

/// Result of one discovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Public pools, ascending by pool id
    pub pools: Vec<DiscoveredPool>,
    /// Indices whose metadata read failed
    pub skipped: Vec<DiscoveryWarning>,
    /// Indices that exist but are not public
    pub private: Vec<PoolId>,
    /// Public pools whose position read failed
    pub position_warnings: Vec<DiscoveryWarning>,
}

impl DiscoveryReport {
    pub fn pool_ids(&self) -> Vec<PoolId> {
        self.pools.iter().map(|p| p.pool_id()).collect()
    }
}

enum Probe {
    Found(DiscoveredPool, Option<String>),
    Private(PoolId),
    Skipped(DiscoveryWarning),
}

/// Enumerates public pools and the caller's position in each
pub struct PoolDiscovery {
    client: Arc<DistributionClient>,
    concurrent: bool,
}

impl PoolDiscovery {
    pub fn new(client: Arc<DistributionClient>, concurrent: bool) -> Self {
        Self { client, concurrent }
    }

    /// Probe indices `0..max_index`; never fails because some indices are empty
    pub async fn discover_pools(&self, address: Address, max_index: u32) -> DiscoveryReport {
        debug!("Discovering pools 0..{} for {}", max_index, address);

        let probes = if self.concurrent {
            join_all((0..max_index).map(|i| self.probe(address, PoolId(i)))).await
        } else {
            let mut probes = Vec::with_capacity(max_index as usize);
            for i in 0..max_index {
                probes.push(self.probe(address, PoolId(i)).await);
            }
            probes
        };

        let mut report = DiscoveryReport::default();
        for probe in probes {
            match probe {
                Probe::Found(pool, position_error) => {
                    if let Some(reason) = position_error {
                        report.position_warnings.push(DiscoveryWarning {
                            pool_id: pool.pool_id(),
                            reason,
                        });
                    }
                    report.pools.push(pool);
                }
                Probe::Private(pool_id) => report.private.push(pool_id),
                Probe::Skipped(warning) => report.skipped.push(warning),
            }
        }

        // Read completion order is irrelevant to the emitted order
        report.pools.sort_by_key(|p| p.pool_id());

        info!(
            "Discovery for {}: {} public, {} private, {} skipped",
            address,
            report.pools.len(),
            report.private.len(),
            report.skipped.len()
        );
        report
    }

    async fn probe(&self, address: Address, pool_id: PoolId) -> Probe {
        let data = match self.client.pool(pool_id).await {
            Ok(data) => data,
            Err(e) => {
                warn!("Pool {} skipped: {}", pool_id, e);
                return Probe::Skipped(DiscoveryWarning {
                    pool_id,
                    reason: e.to_string(),
                });
            }
        };

        if !data.is_public {
            debug!("Pool {} is private", pool_id);
            return Probe::Private(pool_id);
        }

        let record = PoolRecord::new(pool_id, data);
        match self.client.user_data(address, pool_id).await {
            Ok(user) => Probe::Found(
                DiscoveredPool {
                    record,
                    position: Some(UserPosition::from_user_data(pool_id, &user)),
                },
                None,
            ),
            Err(e) => {
                warn!("Position for {} in pool {} unavailable: {}", address, pool_id, e);
                Probe::Found(
                    DiscoveredPool {
                        record,
                        position: None,
                    },
                    Some(e.to_string()),
                )
            }
        }
    }
}
