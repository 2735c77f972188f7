pub mod backtest;
pub mod data;
pub mod selection;
pub mod strategy;

// Re-export commonly used types
pub use backtest::{
    BacktestConfig, BacktestRunner, LegStream, PortfolioLedger, RunConfig, SimulationEngine,
    SimulationResult, StatusReport,
};
pub use data::{DataLoader, OptionQuote, OptionType, SelectionCache};
pub use selection::{OptionChainIndex, RankedSelection, SelectionPolicy};
pub use strategy::{strategy_by_name, StrategyContract};
