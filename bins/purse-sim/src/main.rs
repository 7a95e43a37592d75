//! purse-sim: coin selection simulator.
//!
//! Replays random payments against an in-memory wallet and reports how
//! many coin operations each spend strategy causes.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use purse_core::{Amount, DenominationSystem, Inventory};
use purse_wallet::{CoinSelector, SimConfig, SimStats, Simulation, SpendStrategy};
use tracing::info;

/// Purse coin selection simulator.
#[derive(Parser, Debug)]
#[command(name = "purse-sim", version, about = "Compare denomination spend strategies")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log output format ("text" or "json")
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Simulate one strategy.
    Run(SimArgs),
    /// Simulate every strategy on the same payment stream.
    Compare(SimArgs),
    /// Print the spend plan for one payment as JSON.
    Plan(PlanArgs),
}

#[derive(Args, Debug, Clone)]
struct SimArgs {
    /// Number of payments.
    #[arg(short = 'n', long, default_value_t = 1000)]
    transactions: u64,

    /// Smallest payment, in whole units.
    #[arg(long, default_value_t = 4)]
    cost_min: u64,

    /// Largest payment, in whole units.
    #[arg(long, default_value_t = 5000)]
    cost_max: u64,

    /// Largest single withdrawal, in whole units.
    #[arg(long, default_value_t = 10_000)]
    withdraw_max: u64,

    /// Largest power-of-two denomination.
    #[arg(long, default_value_t = 8192)]
    largest: u64,

    #[arg(long, default_value = "KUDOS")]
    currency: String,

    /// smallest-first, largest-first or hybrid. Ignored by `compare`.
    #[arg(short, long, default_value = "hybrid")]
    strategy: SpendStrategy,

    /// RNG seed for reproducible runs.
    #[arg(long)]
    seed: Option<u64>,
}

impl SimArgs {
    fn into_config(self) -> SimConfig {
        SimConfig {
            transactions: self.transactions,
            cost_min: self.cost_min,
            cost_max: self.cost_max,
            withdraw_max: self.withdraw_max,
            largest_denomination: self.largest,
            currency: self.currency,
            strategy: self.strategy,
            seed: self.seed,
        }
    }
}

#[derive(Args, Debug, Clone)]
struct PlanArgs {
    /// Amount to pay, e.g. KUDOS:4000.
    cost: Amount,

    /// Balance withdrawn before paying, e.g. KUDOS:10000.
    #[arg(long)]
    balance: Amount,

    #[arg(long, default_value_t = 8192)]
    largest: u64,

    #[arg(short, long, default_value = "hybrid")]
    strategy: SpendStrategy,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, &cli.log_format);

    match cli.command {
        Commands::Run(args) => {
            let config = args.into_config();
            let stats = simulate(&config)?;
            print_stats(config.strategy, &stats);
        }
        Commands::Compare(args) => {
            let base = args.into_config();
            // one seed for all strategies so they see the same payments
            let seed = base.seed.unwrap_or_else(rand::random);
            for strategy in SpendStrategy::ALL {
                let config = SimConfig { strategy, seed: Some(seed), ..base.clone() };
                let stats = simulate(&config)?;
                print_stats(strategy, &stats);
            }
        }
        Commands::Plan(args) => {
            let plan = plan(&args)?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
    }
    Ok(())
}

fn simulate(config: &SimConfig) -> Result<SimStats> {
    info!(
        strategy = %config.strategy,
        transactions = config.transactions,
        cost_min = config.cost_min,
        cost_max = config.cost_max,
        "starting simulation"
    );
    let mut sim = Simulation::new(config).context("invalid simulation config")?;
    Ok(sim.run(config)?)
}

fn plan(args: &PlanArgs) -> Result<purse_wallet::SpendPlan> {
    if args.cost.currency() != args.balance.currency() {
        bail!("cost is in {} but balance is in {}", args.cost.currency(), args.balance.currency());
    }
    let system = DenominationSystem::powers_of_two(args.cost.currency(), args.largest)?;
    let withdraw = CoinSelector::plan_withdraw(&system, &args.balance)?;
    let mut inventory = Inventory::new();
    for c in &withdraw.coins {
        inventory.add(c.denom_id, c.count);
    }
    Ok(CoinSelector::plan_spend(&system, &inventory, &args.cost, args.strategy)?)
}

fn print_stats(strategy: SpendStrategy, stats: &SimStats) {
    println!("strategy: {strategy}");
    println!("  transactions:        {}", stats.transactions);
    println!("  total ops:           {} ({:.2} per tx)", stats.total_ops(), stats.per_transaction(stats.total_ops()));
    println!("  spend ops:           {} ({:.2} per tx)", stats.spend_ops, stats.per_transaction(stats.spend_ops));
    println!("  withdraw ops:        {} ({:.2} per tx)", stats.withdraw_ops, stats.per_transaction(stats.withdraw_ops));
    println!("  refresh ops:         {} ({:.2} per tx)", stats.refresh_ops, stats.per_transaction(stats.refresh_ops));
    println!("  outputs per refresh: {:.2}", stats.outputs_per_refresh());
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Pass `format = "json"` for structured JSON output. Any other value
/// defaults to human-readable text.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    // logs go to stderr so stdout stays machine-readable
    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
            .init();
    }
}
