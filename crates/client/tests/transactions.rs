mod common;

use std::time::Duration;

use anyhow::Result;
use common::{deposit, user_a, Harness};
use stake_client::{ClientConfig, MockChain};
use stake_types::{
    OperationKey, OperationKind, OperationState, PoolId, StakeError, TokenAmount, UserData,
};

#[tokio::test(start_paused = true)]
async fn test_duplicate_withdraw_is_refused() -> Result<()> {
    let chain = MockChain::new(vec![user_a()]).with_pool(0, true);
    deposit(&chain, user_a(), 0, 20);
    let h = Harness::new(chain);
    h.chain.set_method_latency("confirmation", Duration::from_secs(5));
    h.engine.connect_wallet().await?;
    let mut events = h.engine.operation_events();

    let (first, second) = tokio::join!(
        h.engine.withdraw(PoolId(0), "5"),
        h.engine.withdraw(PoolId(0), "5"),
    );

    first?;
    let err = second.unwrap_err();
    assert!(matches!(
        err,
        StakeError::AlreadyPending { kind: OperationKind::Withdraw, pool: Some(PoolId(0)), .. }
    ));

    let mut submitting = 0;
    while let Ok(event) = events.try_recv() {
        if event.state == OperationState::Submitting {
            submitting += 1;
        }
    }
    assert_eq!(submitting, 1);
    assert_eq!(h.chain.send_count("withdraw"), 1);
    assert_eq!(h.chain.user_data(user_a(), PoolId(0)).invested.to_decimal_string(), "15");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_different_pools_do_not_block_each_other() -> Result<()> {
    let chain = MockChain::new(vec![user_a()])
        .with_pool(0, true)
        .with_pool(1, true);
    deposit(&chain, user_a(), 0, 2);
    deposit(&chain, user_a(), 1, 2);
    let h = Harness::new(chain);
    h.chain.set_method_latency("confirmation", Duration::from_secs(1));
    h.engine.connect_wallet().await?;

    let (a, b) = tokio::join!(
        h.engine.withdraw(PoolId(0), "1"),
        h.engine.withdraw(PoolId(1), "1"),
    );
    a?;
    b?;
    assert_eq!(h.chain.send_count("withdraw"), 2);
    Ok(())
}

#[tokio::test]
async fn test_revert_is_transaction_error_and_retryable() -> Result<()> {
    let chain = MockChain::new(vec![user_a()]).with_pool(0, true);
    deposit(&chain, user_a(), 0, 1);
    let h = Harness::new(chain);
    h.engine.connect_wallet().await?;

    let err = h.engine.withdraw(PoolId(0), "2").await.unwrap_err();
    match &err {
        StakeError::Transaction { kind, pool, tx_hash, reason } => {
            assert_eq!(*kind, OperationKind::Withdraw);
            assert_eq!(*pool, Some(PoolId(0)));
            assert!(tx_hash.is_some());
            assert!(reason.contains("invalid withdraw amount"));
        }
        other => panic!("unexpected error: {}", other),
    }
    // No automatic retry
    assert_eq!(h.chain.send_count("withdraw"), 1);

    // A fresh user action may retry
    h.engine.withdraw(PoolId(0), "1").await?;
    assert_eq!(h.chain.send_count("withdraw"), 2);
    Ok(())
}

#[tokio::test]
async fn test_withdraw_refreshes_position() -> Result<()> {
    let chain = MockChain::new(vec![user_a()]).with_pool(0, true);
    deposit(&chain, user_a(), 0, 10);
    let h = Harness::new(chain);
    h.engine.connect_wallet().await?;
    h.engine.refresh_my_data().await?;

    h.engine.withdraw(PoolId(0), "2.5").await?;
    let snapshot = h.engine.snapshot();
    let position = snapshot.position(PoolId(0)).expect("position refetched");
    assert_eq!(position.invested.to_decimal_string(), "7.5");
    Ok(())
}

#[tokio::test]
async fn test_claim_invalidates_reward_and_pending() -> Result<()> {
    let chain = MockChain::new(vec![user_a()]).with_pool(0, true);
    chain.set_current_reward(user_a(), PoolId(0), TokenAmount::from_whole_tokens(4));
    let h = Harness::new(chain);
    h.engine.connect_wallet().await?;

    h.engine.claim(PoolId(0)).await?;

    let snapshot = h.engine.snapshot();
    let reward = snapshot.current_reward.as_ref().expect("reward refetched");
    assert!(reward.amount.is_zero());
    let position = snapshot.position(PoolId(0)).expect("position refetched");
    assert!(position.pending_rewards.is_zero());
    Ok(())
}

#[tokio::test]
async fn test_failed_confirmation_rolls_back_to_idle() -> Result<()> {
    let chain = MockChain::new(vec![user_a()]).with_pool(0, true);
    deposit(&chain, user_a(), 0, 10);
    let h = Harness::new(chain);
    h.engine.connect_wallet().await?;
    h.engine.refresh_my_data().await?;
    let mut events = h.engine.operation_events();

    h.chain.revert_next_confirmation("out of gas");
    let err = h.engine.withdraw(PoolId(0), "1").await.unwrap_err();
    assert!(err.to_string().contains("out of gas"));

    let key = OperationKey::new(user_a(), Some(PoolId(0)), OperationKind::Withdraw);
    let states: Vec<OperationState> = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|e| e.key == key)
        .map(|e| e.state)
        .collect();
    assert_eq!(states.last(), Some(&OperationState::Idle));
    assert!(states.contains(&OperationState::Failed));
    assert!(!states.contains(&OperationState::Succeeded));

    // Nothing was applied on chain or locally
    assert_eq!(h.chain.user_data(user_a(), PoolId(0)).invested.to_decimal_string(), "10");
    let snapshot = h.engine.snapshot();
    assert_eq!(
        snapshot.position(PoolId(0)).map(|p| p.invested.to_decimal_string()),
        Some("10".to_string())
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_withdraw_keeps_tuple_reserved() -> Result<()> {
    let chain = MockChain::new(vec![user_a()]).with_pool(0, true);
    deposit(&chain, user_a(), 0, 20);
    let h = Harness::new(chain);
    h.chain.set_method_latency("confirmation", Duration::from_secs(5));
    h.engine.connect_wallet().await?;
    let key = OperationKey::new(user_a(), Some(PoolId(0)), OperationKind::Withdraw);

    // Caller gives up while the transaction is still confirming
    let abandoned =
        tokio::time::timeout(Duration::from_secs(1), h.engine.withdraw(PoolId(0), "5")).await;
    assert!(abandoned.is_err());
    assert_eq!(h.engine.operation_state(&key), OperationState::Confirming);

    let err = h.engine.withdraw(PoolId(0), "5").await.unwrap_err();
    assert!(matches!(err, StakeError::AlreadyPending { kind: OperationKind::Withdraw, .. }));

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(h.engine.operation_state(&key), OperationState::Idle);
    assert_eq!(h.chain.send_count("withdraw"), 1);
    assert_eq!(h.chain.user_data(user_a(), PoolId(0)).invested.to_decimal_string(), "15");

    // The detached attempt still refreshed the position
    let snapshot = h.engine.snapshot();
    assert_eq!(
        snapshot.position(PoolId(0)).map(|p| p.invested.to_decimal_string()),
        Some("15".to_string())
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_confirmation_timeout_keeps_hash_and_frees_tuple() -> Result<()> {
    let chain = MockChain::new(vec![user_a()]).with_pool(0, true);
    deposit(&chain, user_a(), 0, 10);
    let config = ClientConfig {
        confirm_timeout_ms: 10_000,
        ..ClientConfig::default()
    };
    let h = Harness::with_config(chain, config);
    h.chain.set_method_latency("confirmation", Duration::from_secs(30));
    h.engine.connect_wallet().await?;

    let err = h.engine.withdraw(PoolId(0), "1").await.unwrap_err();
    match &err {
        StakeError::Transaction { kind, tx_hash, reason, .. } => {
            assert_eq!(*kind, OperationKind::Withdraw);
            assert!(tx_hash.is_some());
            assert!(reason.contains("Timeout"), "reason: {}", reason);
        }
        other => panic!("unexpected error: {}", other),
    }

    let key = OperationKey::new(user_a(), Some(PoolId(0)), OperationKind::Withdraw);
    assert_eq!(h.engine.operation_state(&key), OperationState::Idle);
    assert_eq!(h.chain.send_count("withdraw"), 1);
    Ok(())
}

#[tokio::test]
async fn test_claim_with_failed_refetch_clears_discovered_position() -> Result<()> {
    let chain = MockChain::new(vec![user_a()]).with_pool(0, true);
    chain.set_user_data(
        user_a(),
        PoolId(0),
        UserData {
            pending_rewards: TokenAmount::from_whole_tokens(4),
            ..UserData::default()
        },
    );
    chain.set_current_reward(user_a(), PoolId(0), TokenAmount::from_whole_tokens(4));
    let h = Harness::new(chain);
    h.engine.connect_wallet().await?;
    h.engine.discover_pools().await?;
    assert!(h.engine.snapshot().pools[0].position.is_some());

    h.chain.fail_user_read(0);
    h.engine.claim(PoolId(0)).await?;

    // No copy of the pre-claim pending rewards survives
    let snapshot = h.engine.snapshot();
    assert!(snapshot.position(PoolId(0)).is_none());
    assert!(snapshot.pools[0].position.is_none());
    Ok(())
}
