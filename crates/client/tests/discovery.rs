mod common;

use anyhow::Result;
use common::{deposit, user_a, Harness};
use stake_client::{ClientConfig, MockChain};
use stake_types::PoolId;

fn ten_public_pools() -> MockChain {
    (0..10).fold(MockChain::new(vec![user_a()]), |chain, i| chain.with_pool(i, true))
}

#[tokio::test]
async fn test_one_failing_index_is_skipped() -> Result<()> {
    let h = Harness::new(ten_public_pools());
    h.chain.fail_pool_read(3);
    h.engine.connect_wallet().await?;

    let report = h.engine.discover_pools().await?;
    let expected: Vec<PoolId> = (0..10).filter(|&i| i != 3).map(PoolId).collect();
    assert_eq!(report.pool_ids(), expected);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].pool_id, PoolId(3));
    Ok(())
}

#[tokio::test]
async fn test_public_private_missing() -> Result<()> {
    let chain = MockChain::new(vec![user_a()])
        .with_pool(0, true)
        .with_pool(1, false);
    let h = Harness::new(chain);
    h.engine.connect_wallet().await?;

    let report = h.engine.discover_pools().await?;
    assert_eq!(report.pool_ids(), vec![PoolId(0)]);
    assert_eq!(report.private, vec![PoolId(1)]);
    // Indices 2..10 do not exist
    assert_eq!(report.skipped.len(), 8);

    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.pools.len(), 1);
    assert!(!snapshot.discovery_in_progress);
    Ok(())
}

#[tokio::test]
async fn test_failed_position_read_is_a_warning() -> Result<()> {
    let chain = MockChain::new(vec![user_a()])
        .with_pool(0, true)
        .with_pool(1, true);
    deposit(&chain, user_a(), 0, 7);
    let h = Harness::new(chain);
    h.chain.fail_user_read(1);
    h.engine.connect_wallet().await?;

    let report = h.engine.discover_pools().await?;
    assert_eq!(report.pool_ids(), vec![PoolId(0), PoolId(1)]);
    assert_eq!(report.position_warnings.len(), 1);
    assert_eq!(report.position_warnings[0].pool_id, PoolId(1));

    assert!(report.pools[1].position.is_none());
    assert!(report.pools[1].position_or_empty().invested.is_zero());
    let position = report.pools[0].position.as_ref().expect("position read");
    assert_eq!(position.invested.to_decimal_string(), "7");
    Ok(())
}

#[tokio::test]
async fn test_sequential_and_concurrent_agree() -> Result<()> {
    let build = || {
        let chain = MockChain::new(vec![user_a()])
            .with_pool(4, true)
            .with_pool(1, true)
            .with_pool(2, false)
            .with_pool(7, true);
        chain.fail_pool_read(5);
        chain
    };

    let concurrent = Harness::new(build());
    concurrent.engine.connect_wallet().await?;
    let a = concurrent.engine.discover_pools().await?;

    let config = ClientConfig {
        concurrent_discovery: false,
        ..ClientConfig::default()
    };
    let sequential = Harness::with_config(build(), config);
    sequential.engine.connect_wallet().await?;
    let b = sequential.engine.discover_pools().await?;

    assert_eq!(a.pool_ids(), vec![PoolId(1), PoolId(4), PoolId(7)]);
    assert_eq!(a.pool_ids(), b.pool_ids());
    Ok(())
}

#[tokio::test]
async fn test_scan_bound_hides_pools_beyond_it() -> Result<()> {
    let chain = MockChain::new(vec![user_a()])
        .with_pool(0, true)
        .with_pool(12, true);
    let h = Harness::new(chain);
    h.engine.connect_wallet().await?;

    let report = h.engine.discover_pools().await?;
    assert_eq!(report.pool_ids(), vec![PoolId(0)]);
    assert_eq!(h.chain.read_count("pools"), 10);
    Ok(())
}

#[tokio::test]
async fn test_refresh_all_discovered_isolates_failures() -> Result<()> {
    let chain = MockChain::new(vec![user_a()])
        .with_pool(0, true)
        .with_pool(1, true)
        .with_pool(2, true);
    deposit(&chain, user_a(), 2, 3);
    let h = Harness::new(chain);
    h.engine.connect_wallet().await?;
    h.engine.discover_pools().await?;

    h.chain.fail_user_read(1);
    let batch = h.engine.refresh_all_discovered().await?;
    assert_eq!(batch.positions.len(), 2);
    assert!(batch.failures.contains_key(&PoolId(1)));
    assert_eq!(batch.positions[&PoolId(2)].invested.to_decimal_string(), "3");
    Ok(())
}
