//! Criterion benchmarks for denomination selection.
//!
//! Covers: greedy withdraw decomposition, spend planning per strategy,
//! and a short simulation run.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use purse_core::{Amount, DenominationSystem, Inventory};
use purse_wallet::{CoinSelector, SimConfig, Simulation, SpendStrategy};

fn system() -> DenominationSystem {
    DenominationSystem::powers_of_two("KUDOS", 8192).unwrap()
}

/// Ten coins of every denomination.
fn full_inventory(system: &DenominationSystem) -> Inventory {
    let mut inv = Inventory::new();
    for d in system.largest_first() {
        inv.add(d.id, 10);
    }
    inv
}

fn bench_withdraw(c: &mut Criterion) {
    let sys = system();
    let amount = Amount::new("KUDOS", 9_999, 0).unwrap();
    c.bench_function("plan_withdraw_9999", |b| {
        b.iter(|| CoinSelector::plan_withdraw(black_box(&sys), black_box(&amount)).unwrap())
    });
}

fn bench_spend(c: &mut Criterion) {
    let sys = system();
    let inv = full_inventory(&sys);
    let cost = Amount::new("KUDOS", 4_321, 0).unwrap();
    for strategy in SpendStrategy::ALL {
        c.bench_function(&format!("plan_spend_{strategy}"), |b| {
            b.iter(|| CoinSelector::plan_spend(&sys, black_box(&inv), black_box(&cost), strategy).unwrap())
        });
    }
}

fn bench_simulation(c: &mut Criterion) {
    let cfg = SimConfig { transactions: 100, seed: Some(1), ..SimConfig::default() };
    c.bench_function("simulate_100_hybrid", |b| {
        b.iter(|| Simulation::new(&cfg).unwrap().run(&cfg).unwrap())
    });
}

criterion_group!(benches, bench_withdraw, bench_spend, bench_simulation);
criterion_main!(benches);
