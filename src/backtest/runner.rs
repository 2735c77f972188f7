//! End-to-end backtest pipeline.
//!
//! Load the chain, rank each side, pull ranks `0..depth` (from the
//! selection cache when a file exists), align them into a leg stream and
//! run the engine.

use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::data::{CacheError, CacheKey, ChainQuotes, DataLoader, LoaderError, OptionType, SelectionCache};
use crate::selection::{OptionChainIndex, RankedSelection, SelectionPolicy};
use crate::strategy::{strategy_by_name, StrategyContract, STRATEGY_NAMES};

use super::engine::{BacktestConfig, EngineError, SimulationEngine, SimulationResult};
use super::report::write_series_json;
use super::stream::{LegStream, StreamError, MAX_LEG_DEPTH};

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for RunnerError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Which ranking the runner builds its indexes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Nearest to the configured per-side target delta.
    Nearest,
    /// Strikes stepping away from the 0.5-delta boundary.
    Ladder,
}

/// Full run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Underlying symbol; the chain is read from `{data_dir}/{asset}.csv`.
    pub asset: String,
    pub data_dir: String,
    pub cache_dir: String,
    /// Reuse cached selections when present.
    pub use_cache: bool,
    /// Ranks taken per side (1..=4).
    pub depth: usize,
    /// Call delta the nearest policy ranks against, by `abs(delta - target)`.
    ///
    /// The default of -0.5 (and +0.5 for puts) suits a source that quotes
    /// call deltas negative. Most chain exports quote calls positive and
    /// puts negative; with those the defaults select far out-of-the-money
    /// strikes, so set `call_target_delta = 0.5` and
    /// `put_target_delta = -0.5`.
    pub call_target_delta: f64,
    /// Put delta the nearest policy ranks against. See `call_target_delta`.
    pub put_target_delta: f64,
    pub policy: PolicyKind,
    pub strategy: String,
    /// Where the per-day series is written, if anywhere.
    pub series_output: Option<String>,
    pub backtest: BacktestConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            asset: "SPY".to_string(),
            data_dir: "data".to_string(),
            cache_dir: "cache".to_string(),
            use_cache: true,
            depth: 1,
            call_target_delta: -0.5,
            put_target_delta: 0.5,
            policy: PolicyKind::Nearest,
            strategy: "short-straddle".to_string(),
            series_output: None,
            backtest: BacktestConfig::default(),
        }
    }
}

impl RunConfig {
    /// Load from an optional TOML file, then `DELTA_BT__*` environment
    /// overrides (e.g. `DELTA_BT__BACKTEST__MAX_DAYS=50`).
    pub fn load(path: Option<&str>) -> Result<Self, RunnerError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix("DELTA_BT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), RunnerError> {
        if self.depth == 0 || self.depth > MAX_LEG_DEPTH {
            return Err(RunnerError::Config(format!(
                "depth must be between 1 and {}, got {}",
                MAX_LEG_DEPTH, self.depth
            )));
        }
        let bt = &self.backtest;
        if bt.min_expiration > bt.max_expiration {
            return Err(RunnerError::Config(format!(
                "min_expiration {} exceeds max_expiration {}",
                bt.min_expiration, bt.max_expiration
            )));
        }
        if bt.max_delta.is_nan() || bt.max_delta < 0.0 {
            return Err(RunnerError::Config(format!(
                "max_delta must be non-negative, got {}",
                bt.max_delta
            )));
        }
        if !STRATEGY_NAMES.contains(&self.strategy.as_str()) {
            return Err(RunnerError::Config(format!(
                "unknown strategy '{}', expected one of {:?}",
                self.strategy, STRATEGY_NAMES
            )));
        }
        Ok(())
    }

    pub fn policy_for(&self, side: OptionType) -> SelectionPolicy {
        match self.policy {
            PolicyKind::Ladder => SelectionPolicy::DeltaLadder,
            PolicyKind::Nearest => SelectionPolicy::NearestDelta {
                target: match side {
                    OptionType::Call => self.call_target_delta,
                    OptionType::Put => self.put_target_delta,
                },
            },
        }
    }
}

/// Drives one configured run from CSV to report.
pub struct BacktestRunner {
    config: RunConfig,
    loader: DataLoader,
    cache: SelectionCache,
}

impl BacktestRunner {
    pub fn new(config: RunConfig) -> Result<Self, RunnerError> {
        config.validate()?;
        let loader = DataLoader::new(&config.data_dir);
        let cache = SelectionCache::new(PathBuf::from(&config.cache_dir));
        Ok(Self {
            config,
            loader,
            cache,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Ranked `(calls, puts)` pairs for ranks `0..depth`.
    pub fn selections(&self) -> Result<Vec<(RankedSelection, RankedSelection)>, RunnerError> {
        if let Some(cached) = self.cached_selections()? {
            return Ok(cached);
        }

        let chain = self.loader.load_quotes(&self.config.asset)?;
        let pairs = self.select_from_chain(&chain);

        if self.config.use_cache {
            for (calls, puts) in &pairs {
                for selection in [calls, puts] {
                    let key = self.cache_key(selection.side, selection.rank);
                    self.cache.save(&key, selection.rows())?;
                }
            }
            info!(asset = %self.config.asset, depth = self.config.depth, "Cached selections");
        }

        Ok(pairs)
    }

    /// Rank both sides of an already loaded chain.
    pub fn select_from_chain(&self, chain: &ChainQuotes) -> Vec<(RankedSelection, RankedSelection)> {
        let (calls, puts) = rayon::join(
            || {
                OptionChainIndex::build(
                    OptionType::Call,
                    chain.side(OptionType::Call),
                    self.config.policy_for(OptionType::Call),
                )
            },
            || {
                OptionChainIndex::build(
                    OptionType::Put,
                    chain.side(OptionType::Put),
                    self.config.policy_for(OptionType::Put),
                )
            },
        );

        (0..self.config.depth)
            .map(|rank| (calls.select(rank), puts.select(rank)))
            .collect()
    }

    fn cache_key(&self, side: OptionType, rank: usize) -> CacheKey {
        CacheKey::new(&self.config.asset, side, rank, &self.config.policy_for(side).label())
    }

    /// Every rank for both sides, or `None` if any file is missing.
    fn cached_selections(&self) -> Result<Option<Vec<(RankedSelection, RankedSelection)>>, RunnerError> {
        if !self.config.use_cache {
            return Ok(None);
        }

        let mut pairs = Vec::with_capacity(self.config.depth);
        for rank in 0..self.config.depth {
            let call_key = self.cache_key(OptionType::Call, rank);
            let put_key = self.cache_key(OptionType::Put, rank);
            if !self.cache.contains(&call_key) || !self.cache.contains(&put_key) {
                return Ok(None);
            }
            pairs.push((
                RankedSelection::from_rows(OptionType::Call, rank, self.cache.load(&call_key)?),
                RankedSelection::from_rows(OptionType::Put, rank, self.cache.load(&put_key)?),
            ));
        }

        info!(asset = %self.config.asset, depth = self.config.depth, "Loaded cached selections");
        Ok(Some(pairs))
    }

    /// Build the strategy, checking it fits the configured depth.
    pub fn strategy(&self) -> Result<Box<dyn StrategyContract>, RunnerError> {
        let strategy = strategy_by_name(&self.config.strategy)
            .ok_or_else(|| RunnerError::Config(format!("unknown strategy '{}'", self.config.strategy)))?;
        if strategy.required_depth() > self.config.depth {
            return Err(RunnerError::Config(format!(
                "strategy '{}' needs depth {}, configured {}",
                strategy.name(),
                strategy.required_depth(),
                self.config.depth
            )));
        }
        Ok(strategy)
    }

    /// Run the simulation over prepared selections.
    pub fn simulate(
        &self,
        pairs: &[(RankedSelection, RankedSelection)],
    ) -> Result<SimulationResult, RunnerError> {
        let strategy = self.strategy()?;
        let stream = LegStream::aligned(pairs)?;
        if stream.is_empty() {
            warn!(asset = %self.config.asset, "No complete leg tuples to simulate");
        }

        let engine = SimulationEngine::new(self.config.backtest.clone(), strategy);
        Ok(engine.run(&stream)?)
    }

    /// Full pipeline: select, simulate, and export the series if configured.
    pub fn run(&self) -> Result<SimulationResult, RunnerError> {
        let start = Instant::now();

        let pairs = self.selections()?;
        let result = self.simulate(&pairs)?;

        if let Some(output) = &self.config.series_output {
            let path = PathBuf::from(output);
            write_series_json(&result.series, &path)?;
            info!(path = %path.display(), days = result.series.len(), "Wrote day series");
        }

        info!("Elapsed time {:.3}s", start.elapsed().as_secs_f64());
        Ok(result)
    }
}
