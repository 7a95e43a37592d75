//! Concurrent spends against one purse never share or overspend coins.

use std::collections::HashSet;
use std::sync::Arc;

use purse_core::{CoinPub, CoinState, CoinStore};
use purse_tests::helpers::*;
use purse_wallet::{Purse, SpendStrategy, WalletError};

const COINS: u64 = 32;
const THREADS: usize = 8;

async fn purse_of_ones() -> Purse {
    let provider = MockProvider::new(free_system());
    let purse = Purse::create(free_system());
    for _ in 0..COINS {
        purse.withdraw(&kudos(1), &provider, &XorBlinding).await.unwrap();
    }
    assert_eq!(purse.inventory().total_coins(), COINS);
    purse
}

/// Spend 1 until the purse is empty, retrying commits that lost a race.
fn drain(purse: &Purse) -> Vec<CoinPub> {
    let mut spent = Vec::new();
    loop {
        match purse.spend(&kudos(1), SpendStrategy::SmallestFirst) {
            Ok((_plan, commit)) => spent.extend(commit.spent),
            Err(WalletError::InsufficientFunds { .. }) if purse.balance().unwrap().is_zero() => return spent,
            Err(WalletError::InsufficientFunds { .. }) => continue,
            Err(e) => panic!("unexpected spend error: {e}"),
        }
    }
}

#[tokio::test]
async fn parallel_spends_take_disjoint_coins() {
    let purse = purse_of_ones().await;

    let per_thread: Vec<Vec<CoinPub>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS).map(|_| s.spawn(|| drain(&purse))).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let total: usize = per_thread.iter().map(Vec::len).sum();
    let distinct: HashSet<CoinPub> = per_thread.iter().flatten().copied().collect();
    assert_eq!(total, COINS as usize, "every coin spent exactly once");
    assert_eq!(distinct.len(), total);
    assert!(purse.balance().unwrap().is_zero());
    assert_eq!(purse.store().coins_in_state(CoinState::Spent).len(), COINS as usize);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_tasks_cannot_overspend() {
    let purse = Arc::new(purse_of_ones().await);

    // 8 tasks each try to pay 5 out of 32
    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..THREADS {
        let purse = Arc::clone(&purse);
        tasks.spawn(async move { purse.spend(&kudos(5), SpendStrategy::SmallestFirst).map(|(_, c)| c.spent) });
    }

    let mut paid = 0;
    let mut spent = HashSet::new();
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(coins) => {
                paid += 1;
                for c in coins {
                    assert!(spent.insert(c), "coin {c} spent twice");
                }
            }
            Err(e) => assert!(matches!(e, WalletError::InsufficientFunds { .. }), "{e}"),
        }
    }
    assert!(paid <= 6);
    assert_eq!(spent.len(), paid * 5);
    assert_eq!(purse.balance().unwrap(), kudos(COINS - 5 * paid as u64));
}
