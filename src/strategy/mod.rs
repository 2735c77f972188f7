pub mod builtin;
pub mod contract;

pub use builtin::{strategy_by_name, HedgedStraddle, ShortStraddle, STRATEGY_NAMES};
pub use contract::{net_leg_delta, StrategyContract};
