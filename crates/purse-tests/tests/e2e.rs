//! End-to-end wallet scenarios against an in-memory provider.
//!
//! Withdraw, spend, refresh and persist a purse the way a host application
//! would, checking the balance bookkeeping after every step.

use std::sync::Arc;

use purse_core::{Amount, CoinState, CoinStore};
use purse_tests::helpers::*;
use purse_wallet::{
    mnemonic_to_seed, seed_to_mnemonic, CoinSelector, Purse, SimConfig, Simulation, SpendStrategy, WalletError,
};
use tokio::sync::watch;

fn sub(a: &Amount, b: &Amount) -> Amount {
    a.checked_sub(b).unwrap()
}

/// Pay `cost` and run the resulting refreshes to completion.
async fn pay(purse: &Purse, provider: &Arc<MockProvider>, cost: &Amount, strategy: SpendStrategy) -> purse_wallet::SpendPlan {
    let (plan, commit) = purse.spend(cost, strategy).unwrap();
    assert_eq!(commit.sessions.len(), plan.refreshes.len());
    let executor = purse.refresh_executor(provider.clone(), Arc::new(XorBlinding));
    let (_tx, rx) = watch::channel(false);
    for id in &commit.sessions {
        let outcome = executor.execute(id, rx.clone()).await.unwrap();
        assert!(outcome.is_complete(), "refresh left coins pending: {outcome:?}");
        assert!(outcome.failed.is_empty());
    }
    plan
}

#[tokio::test]
async fn first_payment_from_empty_purse() {
    let provider = Arc::new(MockProvider::new(free_system()));
    let purse = Purse::create(free_system());
    let cost = kudos(4000);
    assert!(purse.balance().unwrap().is_zero());

    // empty purse: paying needs a withdraw first
    let err = purse.spend(&cost, SpendStrategy::Hybrid).unwrap_err();
    assert!(matches!(err, WalletError::InsufficientFunds { .. }));

    let withdrawn = purse.withdraw(&kudos(5000), provider.as_ref(), &XorBlinding).await.unwrap();
    assert_eq!(withdrawn.plan.total_value, kudos(5000));
    let after_withdraw = purse.balance().unwrap();
    assert!(after_withdraw >= cost);
    assert_eq!(provider.withdraw_count(), withdrawn.coins.len());

    let plan = pay(&purse, &provider, &cost, SpendStrategy::Hybrid).await;
    let expected = sub(&sub(&sub(&after_withdraw, &cost), &plan.refresh_fees().unwrap()), &plan.unrecovered);
    assert_eq!(purse.balance().unwrap(), expected);
    assert_eq!(purse.balance().unwrap(), kudos(1000));
}

#[tokio::test]
async fn balance_identity_holds_with_fees() {
    let system = fee_system();
    let provider = Arc::new(MockProvider::new(system.clone()));
    let purse = Purse::create(system);
    purse.withdraw(&kudos(9000), provider.as_ref(), &XorBlinding).await.unwrap();

    for (i, cost) in [4000u64, 13, 700, 1, 255].into_iter().enumerate() {
        let strategy = SpendStrategy::ALL[i % 3];
        let before = purse.balance().unwrap();
        let plan = pay(&purse, &provider, &kudos(cost), strategy).await;
        let expected = sub(&sub(&sub(&before, &kudos(cost)), &plan.refresh_fees().unwrap()), &plan.unrecovered);
        assert_eq!(purse.balance().unwrap(), expected, "payment {cost} with {strategy}");
    }
}

#[tokio::test]
async fn spent_coins_leave_the_inventory() {
    let provider = Arc::new(MockProvider::new(free_system()));
    let purse = Purse::create(free_system());
    purse.withdraw(&kudos(15), provider.as_ref(), &XorBlinding).await.unwrap();

    // 1 + 2, then the 4 overpays by 2
    let (plan, commit) = purse.spend(&kudos(5), SpendStrategy::SmallestFirst).unwrap();
    assert_eq!(plan.refreshes.len(), 1);
    for coin in &commit.spent {
        assert_eq!(purse.store().coin(coin).unwrap().state, CoinState::Spent);
    }
    // the refresh children exist but are not spendable yet
    assert!(!purse.store().coins_in_state(CoinState::Derived).is_empty());
    let planned = CoinSelector::plan_spend(purse.system(), &purse.inventory(), &kudos(1), SpendStrategy::Hybrid);
    assert!(planned.is_ok());
}

#[tokio::test]
async fn failed_withdraw_resumes_to_the_same_coins() {
    let provider = MockProvider::new(free_system());
    let purse = Purse::create(free_system());
    provider.corrupt_signatures(true);
    let err = purse.withdraw(&kudos(7), &provider, &XorBlinding).await.unwrap_err();
    assert!(matches!(err, WalletError::Provider(_)));
    let pending: Vec<_> = purse.store().coins_in_state(CoinState::Derived).into_iter().map(|c| c.coin_pub).collect();
    assert_eq!(pending.len(), 3);

    provider.heal();
    let resumed = purse.resume_withdrawals(&provider, &XorBlinding).await.unwrap();
    let mut resumed_sorted = resumed.clone();
    resumed_sorted.sort();
    let mut pending_sorted = pending.clone();
    pending_sorted.sort();
    assert_eq!(resumed_sorted, pending_sorted);
    assert_eq!(purse.balance().unwrap(), kudos(7));
}

#[tokio::test]
async fn wallet_file_round_trip_keeps_coins_and_sessions() {
    let provider = Arc::new(MockProvider::new(free_system()));
    let purse = Purse::create(free_system());
    purse.withdraw(&kudos(100), provider.as_ref(), &XorBlinding).await.unwrap();
    let (_plan, commit) = purse.spend(&kudos(33), SpendStrategy::LargestFirst).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("purse.dat");
    purse.save_to_file(&path, b"hunter2").unwrap();
    let loaded = Purse::load_from_file(&path, b"hunter2").unwrap();

    assert_eq!(loaded.seed().as_bytes(), purse.seed().as_bytes());
    assert_eq!(loaded.balance().unwrap(), purse.balance().unwrap());
    for id in &commit.sessions {
        assert!(loaded.store().refresh_session(id).is_some());
    }

    // the reloaded purse can finish the refresh the original recorded
    let executor = loaded.refresh_executor(provider.clone(), Arc::new(XorBlinding));
    let (_tx, rx) = watch::channel(false);
    let outcomes = executor.resume_all(rx).await.unwrap();
    assert!(outcomes.iter().all(|o| o.is_complete()));
    assert_eq!(loaded.balance().unwrap(), kudos(67));
}

#[tokio::test]
async fn mnemonic_restores_the_same_planchets() {
    let provider = MockProvider::new(free_system());
    let purse = Purse::create(free_system());
    let out = purse.withdraw(&kudos(6), &provider, &XorBlinding).await.unwrap();

    let phrase = seed_to_mnemonic(purse.seed()).unwrap();
    let restored = Purse::from_seed(mnemonic_to_seed(&phrase).unwrap(), free_system());
    let again = restored.withdraw(&kudos(6), &provider, &XorBlinding).await.unwrap();
    assert_eq!(out.coins, again.coins);
}

#[test]
fn simulation_scenario_withdraws_before_first_payment() {
    let config = SimConfig { seed: Some(42), ..SimConfig::default() };
    let mut sim = Simulation::new(&config).unwrap();
    let plan = sim.step(&kudos(4000)).unwrap();
    assert!(sim.stats().withdraw_ops > 0);
    assert_eq!(plan.cost, kudos(4000));
    assert!(sim.balance().is_ok());
}
