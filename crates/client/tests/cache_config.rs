mod common;

use std::sync::Arc;

use anyhow::Result;
use common::{user_a, user_b};
use stake_client::{
    create_example_config, ApprovalCache, ClientConfig, FileCache, LocalCache, MockChain,
    StakingEngine,
};
use stake_types::{ApprovalState, StakeError, TokenAmount};
use tempfile::TempDir;

#[tokio::test]
async fn test_file_cache_persists_across_instances() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("nested").join("cache.json");

    let cache = ApprovalCache::new(Arc::new(FileCache::new(&path)), "stake-client");
    cache.store(&user_a(), &ApprovalState::new(true)).await?;
    cache.store(&user_b(), &ApprovalState::new(false)).await?;

    let reopened = ApprovalCache::new(Arc::new(FileCache::new(&path)), "stake-client");
    assert!(reopened.load(&user_a()).await.expect("a cached").is_approved);
    assert!(!reopened.load(&user_b()).await.expect("b cached").is_approved);

    reopened.clear(&user_a()).await?;
    assert!(reopened.load(&user_a()).await.is_none());
    assert!(!path.with_extension("tmp").exists());
    Ok(())
}

#[tokio::test]
async fn test_malformed_cache_file_reads_as_unknown() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("cache.json");
    std::fs::write(&path, "this is not json")?;

    let file = Arc::new(FileCache::new(&path));
    assert!(file.get_raw("anything").await?.is_none());

    let cache = ApprovalCache::new(file, "stake-client");
    assert!(cache.load(&user_a()).await.is_none());

    // The next write replaces the broken file
    cache.store(&user_a(), &ApprovalState::new(true)).await?;
    assert!(cache.load(&user_a()).await.expect("cached").is_approved);
    Ok(())
}

#[tokio::test]
async fn test_engine_surfaces_file_cached_approval() -> Result<()> {
    let dir = TempDir::new()?;
    let mut config = ClientConfig::default();
    config.cache.path = Some(dir.path().join("cache.json"));

    let chain = Arc::new(MockChain::new(vec![user_a()]));
    chain.set_allowance(user_a(), config.distribution_contract, TokenAmount::MAX);

    let engine = StakingEngine::from_config(config.clone(), chain.clone())?;
    engine.connect_wallet().await?;
    engine.approval_reconciled().await;
    assert!(engine.snapshot().is_approved());
    drop(engine);

    // A new engine shows the persisted value before any chain read lands
    let restarted = StakingEngine::from_config(config, chain)?;
    restarted.connect_wallet().await?;
    assert!(restarted.snapshot().is_approved());
    Ok(())
}

#[test]
fn test_config_roundtrip_through_toml() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("stake-client.toml");
    let path = path.to_str().expect("utf-8 path");

    create_example_config(path)?;
    let loaded = ClientConfig::load(path)?;
    assert_eq!(loaded.pool_scan_bound, 10);
    assert_eq!(loaded.reward_poll_interval_ms, 3000);
    assert!(loaded.cache.path.is_some());
    Ok(())
}

#[test]
fn test_partial_config_uses_defaults() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("partial.toml");
    std::fs::write(&path, "pool_scan_bound = 25\n[cache]\nnamespace = \"staging\"\n")?;

    let config = ClientConfig::load(path.to_str().expect("utf-8 path"))?;
    assert_eq!(config.pool_scan_bound, 25);
    assert_eq!(config.cache.namespace, "staging");
    assert_eq!(config, ClientConfig {
        pool_scan_bound: 25,
        cache: stake_client::CacheConfig {
            namespace: "staging".to_string(),
            path: None,
        },
        ..ClientConfig::default()
    });
    Ok(())
}

#[test]
fn test_invalid_config_file_is_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "reward_poll_interval_ms = 0\n")?;

    let err = ClientConfig::load(path.to_str().expect("utf-8 path")).unwrap_err();
    assert!(matches!(err, StakeError::InvalidConfiguration { .. }));
    Ok(())
}
