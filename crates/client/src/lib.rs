//! Staking client engine
//!
//! Keeps a wallet's view of a staking distribution contract current: token
//! approval, public pool discovery, per-pool positions and a live reward for
//! the primary pool. Mutating operations run through a per-tuple state
//! machine that refuses duplicate submissions.

pub mod approval;
pub mod cache;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod gateway;
pub mod orchestrator;
pub mod session;
pub mod sync;

pub use approval::ApprovalTracker;
pub use cache::{ApprovalCache, FileCache, LocalCache, MemoryCache};
pub use config::{create_example_config, CacheConfig, ClientConfig};
pub use discovery::{DiscoveryReport, DiscoveryWarning, PoolDiscovery};
pub use engine::{cache_from_config, StakingEngine};
pub use gateway::{ChainGateway, DistributionClient, GatewayError, MockChain};
pub use orchestrator::{OperationEvent, OperationOutcome, TransactionOrchestrator};
pub use session::{EngineSnapshot, Session, SessionTicket};
pub use sync::{PollHandle, PollStats, PositionBatch, PositionSynchronizer};
