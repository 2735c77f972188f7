//! Delta-targeted options backtest.
//!
//! - Synchronized leg streams built from ranked selections
//! - Portfolio ledger with day roll and expiration settlement
//! - Simulation engine with delta-budget admission and bankruptcy stop
//! - Status report and per-day series export
//! - Config-driven runner tying the pipeline together

pub mod engine;
pub mod ledger;
pub mod report;
pub mod runner;
pub mod stream;

pub use engine::{
    admit_delta, BacktestConfig, EngineError, EntryDecision, EntryStats, RunState,
    SimulationEngine, SimulationResult,
};
pub use ledger::{DaySeries, DayState, Entry, PortfolioLedger, Settlement};
pub use report::{write_series_json, Outcome, StatusReport};
pub use runner::{BacktestRunner, PolicyKind, RunConfig, RunnerError};
pub use stream::{LegStream, LegTuple, StreamError, MAX_LEG_DEPTH};
