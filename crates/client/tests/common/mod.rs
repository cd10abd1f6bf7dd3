#![allow(dead_code)]

use std::sync::Arc;

use stake_client::{ApprovalCache, ClientConfig, MemoryCache, MockChain, StakingEngine};
use stake_types::{Address, PoolId, TokenAmount, UserData};

pub const USER_A: &str = "0x0000000000000000000000000000000000000aaa";
pub const USER_B: &str = "0x0000000000000000000000000000000000000bbb";

pub fn address(hex: &str) -> Address {
    hex.parse().expect("test address")
}

pub fn user_a() -> Address {
    address(USER_A)
}

pub fn user_b() -> Address {
    address(USER_B)
}

pub fn deposit(chain: &MockChain, user: Address, pool: u32, whole_tokens: u64) {
    chain.set_user_data(
        user,
        PoolId(pool),
        UserData {
            invested: TokenAmount::from_whole_tokens(whole_tokens),
            ..UserData::default()
        },
    );
}

pub struct Harness {
    pub chain: Arc<MockChain>,
    pub cache: Arc<MemoryCache>,
    pub config: ClientConfig,
    pub engine: StakingEngine,
}

impl Harness {
    pub fn new(chain: MockChain) -> Self {
        Self::with_config(chain, ClientConfig::default())
    }

    pub fn with_config(chain: MockChain, config: ClientConfig) -> Self {
        let chain = Arc::new(chain);
        let cache = Arc::new(MemoryCache::new());
        let engine = StakingEngine::new(config.clone(), chain.clone(), cache.clone())
            .expect("valid engine config");
        Self {
            chain,
            cache,
            config,
            engine,
        }
    }

    pub fn approval_cache(&self) -> ApprovalCache {
        ApprovalCache::new(self.cache.clone(), &self.config.cache.namespace)
    }

    pub fn distribution(&self) -> Address {
        self.config.distribution_contract
    }
}
