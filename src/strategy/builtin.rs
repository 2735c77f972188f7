//! Reference strategy variants.

use crate::data::OptionQuote;

use super::contract::{net_leg_delta, StrategyContract};

/// Names accepted by [`strategy_by_name`].
pub const STRATEGY_NAMES: &[&str] = &["short-straddle", "hedged-straddle"];

/// Look up a reference strategy by its CLI name.
pub fn strategy_by_name(name: &str) -> Option<Box<dyn StrategyContract>> {
    match name {
        "short-straddle" => Some(Box::new(ShortStraddle)),
        "hedged-straddle" => Some(Box::new(HedgedStraddle)),
        _ => None,
    }
}

/// Every leg quoted with a positive bid and a defined delta.
fn tradable(legs: &[OptionQuote]) -> bool {
    legs.iter().all(|q| q.bid > rust_decimal::Decimal::ZERO && q.has_delta())
}

/// Sell the rank-0 call and put.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShortStraddle;

impl StrategyContract for ShortStraddle {
    fn name(&self) -> &str {
        "short-straddle"
    }

    fn legs_per_entry(&self) -> usize {
        2
    }

    fn estimated_delta(&self, calls: &[OptionQuote], puts: &[OptionQuote]) -> f64 {
        net_leg_delta(&self.short_legs(calls, puts), &[])
    }

    fn is_admissible(&self, calls: &[OptionQuote], puts: &[OptionQuote]) -> bool {
        !calls.is_empty() && !puts.is_empty() && tradable(&self.short_legs(calls, puts))
    }

    fn short_legs(&self, calls: &[OptionQuote], puts: &[OptionQuote]) -> Vec<OptionQuote> {
        calls.iter().take(1).chain(puts.iter().take(1)).cloned().collect()
    }

    fn long_legs(&self, _calls: &[OptionQuote], _puts: &[OptionQuote]) -> Vec<OptionQuote> {
        Vec::new()
    }
}

/// Sell the rank-0 call and put, buy the rank-1 call and put as wings.
#[derive(Debug, Clone, Copy, Default)]
pub struct HedgedStraddle;

impl StrategyContract for HedgedStraddle {
    fn name(&self) -> &str {
        "hedged-straddle"
    }

    fn legs_per_entry(&self) -> usize {
        4
    }

    fn estimated_delta(&self, calls: &[OptionQuote], puts: &[OptionQuote]) -> f64 {
        net_leg_delta(&self.short_legs(calls, puts), &self.long_legs(calls, puts))
    }

    fn is_admissible(&self, calls: &[OptionQuote], puts: &[OptionQuote]) -> bool {
        if calls.len() < 2 || puts.len() < 2 {
            return false;
        }
        let longs = self.long_legs(calls, puts);
        tradable(&self.short_legs(calls, puts))
            && longs.iter().all(|q| q.has_delta() && q.ask > rust_decimal::Decimal::ZERO)
    }

    fn short_legs(&self, calls: &[OptionQuote], puts: &[OptionQuote]) -> Vec<OptionQuote> {
        calls.iter().take(1).chain(puts.iter().take(1)).cloned().collect()
    }

    fn long_legs(&self, calls: &[OptionQuote], puts: &[OptionQuote]) -> Vec<OptionQuote> {
        calls.iter().skip(1).take(1).chain(puts.iter().skip(1).take(1)).cloned().collect()
    }

    fn required_depth(&self) -> usize {
        2
    }
}
