//! Delta Backtest CLI
//!
//! # Usage
//!
//! ```bash
//! # Run a backtest from a config file
//! delta-backtest run --config config/spy.toml
//!
//! # Override the config from the command line
//! delta-backtest run --asset SPY --data data --depth 2 --strategy hedged-straddle
//!
//! # Rank and cache selections without simulating
//! delta-backtest select --asset SPY --depth 4
//!
//! # Print the second-nearest put selection
//! delta-backtest inspect --asset SPY --side put --rank 1
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;

use delta_backtest::backtest::{BacktestRunner, RunConfig};
use delta_backtest::data::OptionType;

#[derive(Parser)]
#[command(name = "delta-backtest")]
#[command(about = "Delta-targeted options strategy backtester")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Overrides applied on top of the loaded configuration.
#[derive(Args)]
struct RunArgs {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Underlying symbol
    #[arg(short, long)]
    asset: Option<String>,

    /// Directory holding `<asset>.csv`
    #[arg(short, long)]
    data: Option<String>,

    /// Selection cache directory
    #[arg(long)]
    cache: Option<String>,

    /// Ranks per side (1-4)
    #[arg(long)]
    depth: Option<usize>,

    /// Ignore and do not write the selection cache
    #[arg(long)]
    no_cache: bool,
}

impl RunArgs {
    fn resolve(&self) -> Result<RunConfig> {
        let mut config = RunConfig::load(self.config.as_deref())
            .context("Failed to load configuration")?;
        if let Some(asset) = &self.asset {
            config.asset = asset.clone();
        }
        if let Some(data) = &self.data {
            config.data_dir = data.clone();
        }
        if let Some(cache) = &self.cache {
            config.cache_dir = cache.clone();
        }
        if let Some(depth) = self.depth {
            config.depth = depth;
        }
        if self.no_cache {
            config.use_cache = false;
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a backtest
    Run {
        #[command(flatten)]
        args: RunArgs,

        /// Strategy name (short-straddle, hedged-straddle)
        #[arg(short, long)]
        strategy: Option<String>,

        /// Starting cash balance
        #[arg(short, long)]
        balance: Option<Decimal>,

        /// Write the per-day series as JSON
        #[arg(short, long)]
        output: Option<String>,

        /// Log every day roll, settlement and entry
        #[arg(long)]
        trace: bool,
    },

    /// Rank a chain and cache the selections
    Select {
        #[command(flatten)]
        args: RunArgs,
    },

    /// Print one ranked selection
    Inspect {
        #[command(flatten)]
        args: RunArgs,

        /// Option side (call or put)
        #[arg(long, default_value = "call")]
        side: String,

        /// Rank to show (0 = nearest)
        #[arg(long, default_value_t = 0)]
        rank: usize,

        /// Maximum rows to print
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("delta_backtest=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            args,
            strategy,
            balance,
            output,
            trace,
        } => {
            let mut config = args.resolve()?;
            if let Some(strategy) = strategy {
                config.strategy = strategy;
            }
            if let Some(balance) = balance {
                config.backtest.starting_balance = balance;
            }
            if output.is_some() {
                config.series_output = output;
            }
            if trace {
                config.backtest.trace = true;
            }
            cmd_run(config)?;
        }
        Commands::Select { args } => cmd_select(args.resolve()?)?,
        Commands::Inspect {
            args,
            side,
            rank,
            limit,
        } => {
            let side = OptionType::from_str(&side)
                .with_context(|| format!("Unknown option side '{}'", side))?;
            let mut config = args.resolve()?;
            config.depth = config.depth.max(rank + 1);
            cmd_inspect(config, side, rank, limit)?;
        }
    }

    Ok(())
}

fn cmd_run(config: RunConfig) -> Result<()> {
    let runner = BacktestRunner::new(config)?;
    let result = runner.run()?;

    println!("{}", result.report.summary());
    println!(
        "Entries: {} admitted of {} tuples ({} outside window, {} not admissible, {} over delta budget)",
        result.stats.admitted,
        result.stats.tuples,
        result.stats.outside_window,
        result.stats.not_admissible,
        result.stats.delta_budget
    );
    Ok(())
}

fn cmd_select(config: RunConfig) -> Result<()> {
    let runner = BacktestRunner::new(config)?;
    let pairs = runner.selections()?;

    println!("{} selections (cache: {})", runner.config().asset, runner.config().cache_dir);
    for (calls, puts) in &pairs {
        println!(
            "  rank {}: {} calls, {} puts",
            calls.rank,
            calls.len(),
            puts.len()
        );
    }
    Ok(())
}

fn cmd_inspect(config: RunConfig, side: OptionType, rank: usize, limit: usize) -> Result<()> {
    let runner = BacktestRunner::new(config)?;
    let pairs = runner.selections()?;
    let (calls, puts) = pairs
        .get(rank)
        .with_context(|| format!("No selection at rank {}", rank))?;
    let selection = match side {
        OptionType::Call => calls,
        OptionType::Put => puts,
    };

    println!(
        "{} {} rank {} ({}): {} rows",
        runner.config().asset,
        side,
        rank,
        runner.config().policy_for(side).label(),
        selection.len()
    );
    println!(
        "{:<22} {:>10} {:>8} {:>8} {:>8} {:>8}",
        "Bucket", "Strike", "Delta", "Bid", "Ask", "Spot"
    );
    for quote in selection.iter().take(limit) {
        println!(
            "{:<22} {:>10} {:>8.4} {:>8} {:>8} {:>8}",
            quote.bucket().to_string(),
            quote.strike,
            quote.delta,
            quote.bid,
            quote.ask,
            quote.underlying_price
        );
    }
    if selection.len() > limit {
        println!("... {} more", selection.len() - limit);
    }
    Ok(())
}
