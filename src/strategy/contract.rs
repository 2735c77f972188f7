//! The strategy contract.
//!
//! A strategy variant decides, from the candidate legs of one tuple, how
//! much delta an entry would add, whether it may be entered at all, and
//! which legs are sold and which are bought. Implementations are pure:
//! the same candidates always give the same answers.
//!
//! Candidates arrive as parallel slices, `calls[i]` and `puts[i]` being
//! the rank-`i` picks of the same bucket.

use crate::data::OptionQuote;

pub trait StrategyContract: Send + Sync {
    /// Name used in logs and reports.
    fn name(&self) -> &str;

    /// Legs added to the open-leg count by one entry. Must equal the
    /// number of legs returned by `short_legs` plus `long_legs`.
    fn legs_per_entry(&self) -> usize;

    /// Signed delta the entry would add to the portfolio.
    fn estimated_delta(&self, calls: &[OptionQuote], puts: &[OptionQuote]) -> f64;

    /// Entry-time filter. `false` skips the day's entry.
    fn is_admissible(&self, calls: &[OptionQuote], puts: &[OptionQuote]) -> bool;

    /// Legs to sell at the bid.
    fn short_legs(&self, calls: &[OptionQuote], puts: &[OptionQuote]) -> Vec<OptionQuote>;

    /// Legs to buy at the ask.
    fn long_legs(&self, calls: &[OptionQuote], puts: &[OptionQuote]) -> Vec<OptionQuote>;

    /// Number of ranked call/put pairs the strategy reads from each tuple.
    fn required_depth(&self) -> usize {
        1
    }
}

/// Delta of a short/long leg set under the ledger's sign convention:
/// sold legs count as quoted, bought legs count negated.
pub fn net_leg_delta(shorts: &[OptionQuote], longs: &[OptionQuote]) -> f64 {
    let short: f64 = shorts.iter().map(|q| q.delta).sum();
    let long: f64 = longs.iter().map(|q| q.delta).sum();
    short - long
}
