//! Day-advancing simulation engine.
//!
//! Folds the leg stream into the ledger, one tuple at a time:
//! 1. Roll the day when the tuple's snapshot date changes (carry forward,
//!    settle expiring legs, check for bankruptcy)
//! 2. Skip the entry when the tuple's DTE is outside the entry window
//! 3. Skip the entry when the strategy rejects the candidates
//! 4. Skip the entry when it would break the delta budget
//! 5. Book the entry
//!
//! The run ends when the stream is exhausted or the day index passes
//! `max_days` (`Completed`), or when the balance goes negative with
//! bankruptcy termination on (`Bankrupt`).

use std::time::Instant;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::strategy::StrategyContract;

use super::ledger::{DaySeries, DayState, Entry, PortfolioLedger};
use super::report::{Outcome, StatusReport};
use super::stream::{LegStream, LegTuple};

/// Configuration for one simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Cash balance on day 0.
    pub starting_balance: Decimal,

    /// Minimum DTE of the leading leg for an entry.
    pub min_expiration: i64,

    /// Maximum DTE of the leading leg for an entry.
    pub max_expiration: i64,

    /// Absolute net delta above which entries must not worsen the position.
    pub max_delta: f64,

    /// Stop once the day index passes this bound.
    pub max_days: usize,

    /// Stop with `Bankrupt` when the balance goes negative.
    pub terminate_on_bankruptcy: bool,

    /// Narrate every day roll, settlement and entry at debug level.
    pub trace: bool,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            starting_balance: Decimal::ZERO,
            min_expiration: 1,
            max_expiration: 15,
            max_delta: 1.5,
            max_days: 100,
            terminate_on_bankruptcy: true,
            trace: false,
        }
    }
}

/// Where the engine's state machine stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Running,
    Bankrupt { day: usize, date: NaiveDate },
    Completed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Why a tuple did or did not produce an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryDecision {
    Admitted,
    OutsideWindow,
    NotAdmissible,
    DeltaBudget,
    /// The run had already stopped.
    Halted,
}

/// Counters over all tuples of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryStats {
    pub tuples: usize,
    pub admitted: usize,
    pub outside_window: usize,
    pub not_admissible: usize,
    pub delta_budget: usize,
}

impl EntryStats {
    fn record(&mut self, decision: EntryDecision) {
        match decision {
            EntryDecision::Admitted => self.admitted += 1,
            EntryDecision::OutsideWindow => self.outside_window += 1,
            EntryDecision::NotAdmissible => self.not_admissible += 1,
            EntryDecision::DeltaBudget => self.delta_budget += 1,
            EntryDecision::Halted => {}
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum EngineError {
    #[error("Tuple on day {day} is missing legs: {calls} calls, {puts} puts")]
    MissingLegs {
        day: usize,
        calls: usize,
        puts: usize,
    },

    #[error("Strategy '{strategy}' broke its contract: {reason}")]
    ContractViolation { strategy: String, reason: String },
}

/// The delta-budget admission rule.
///
/// Returns the new net delta when an entry adding `estimated` to
/// `net_delta` may be taken. Inside the band anything goes; outside it the
/// entry must leave the deviation no worse than it already is.
pub fn admit_delta(net_delta: f64, estimated: f64, max_delta: f64) -> Option<f64> {
    let candidate = net_delta + estimated;
    if candidate.abs() > max_delta && candidate.abs() > net_delta.abs() {
        return None;
    }
    Some(candidate)
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub state: RunState,
    pub history: Vec<DayState>,
    pub series: DaySeries,
    pub stats: EntryStats,
    pub report: StatusReport,
}

/// Runs one strategy over one leg stream. Each engine owns its ledger;
/// concurrent runs use separate engines.
pub struct SimulationEngine {
    config: BacktestConfig,
    strategy: Box<dyn StrategyContract>,
    ledger: PortfolioLedger,
    state: RunState,
    stats: EntryStats,
}

impl SimulationEngine {
    pub fn new(config: BacktestConfig, strategy: Box<dyn StrategyContract>) -> Self {
        let ledger = PortfolioLedger::new(config.starting_balance);
        Self {
            config,
            strategy,
            ledger,
            state: RunState::Running,
            stats: EntryStats::default(),
        }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn ledger(&self) -> &PortfolioLedger {
        &self.ledger
    }

    pub fn stats(&self) -> &EntryStats {
        &self.stats
    }

    /// Feed one tuple through the state machine.
    pub fn process(&mut self, tuple: &LegTuple) -> Result<EntryDecision, EngineError> {
        if self.state.is_terminal() {
            return Ok(EntryDecision::Halted);
        }

        let lead = match tuple.lead() {
            Some(lead) if !tuple.puts.is_empty() => lead,
            _ => {
                return Err(EngineError::MissingLegs {
                    day: self.ledger.day(),
                    calls: tuple.calls.len(),
                    puts: tuple.puts.len(),
                })
            }
        };

        if self.ledger.day() > self.config.max_days {
            info!(day = self.ledger.day(), max_days = self.config.max_days, "Day limit reached");
            self.state = RunState::Completed;
            return Ok(EntryDecision::Halted);
        }

        self.stats.tuples += 1;

        if self.ledger.current_date() != Some(lead.data_date) {
            self.roll_day(lead.data_date, lead.underlying_price);
            if self.state.is_terminal() {
                return Ok(EntryDecision::Halted);
            }
        }

        let decision = self.try_enter(tuple, lead.days)?;
        self.stats.record(decision);

        if decision == EntryDecision::Admitted {
            self.check_bankruptcy();
        }

        Ok(decision)
    }

    /// Run to the end of `stream` (or an earlier stop) and report.
    pub fn run(mut self, stream: &LegStream) -> Result<SimulationResult, EngineError> {
        let start = Instant::now();

        for tuple in stream {
            self.process(tuple)?;
            if self.state.is_terminal() {
                break;
            }
        }
        if self.state == RunState::Running {
            self.state = RunState::Completed;
        }

        let report = StatusReport::new(self.strategy.name(), self.outcome(), &self.ledger);
        info!(
            strategy = self.strategy.name(),
            tuples = self.stats.tuples,
            admitted = self.stats.admitted,
            "Simulation finished in {:.3}s",
            start.elapsed().as_secs_f64()
        );

        Ok(SimulationResult {
            state: self.state,
            series: self.ledger.series(),
            history: self.ledger.history().to_vec(),
            stats: self.stats,
            report,
        })
    }

    fn outcome(&self) -> Outcome {
        match self.state {
            RunState::Bankrupt { day, date } => Outcome::Bankrupt { day, date },
            _ => Outcome::Completed,
        }
    }

    fn roll_day(&mut self, date: NaiveDate, spot: Decimal) {
        let settlement = self.ledger.roll_day(date, spot);

        if self.config.trace {
            debug!(day = self.ledger.day(), %date, "Next date");
            if settlement.expired() > 0 {
                debug!(
                    "From {} expired options only {} were executed. Total {}",
                    settlement.expired(),
                    settlement.exercised,
                    settlement.cash()
                );
            }
        }

        self.check_bankruptcy();
    }

    fn check_bankruptcy(&mut self) {
        if !self.config.terminate_on_bankruptcy {
            return;
        }
        let state = self.ledger.current();
        if state.balance < Decimal::ZERO {
            if let Some(date) = state.date {
                warn!(
                    strategy = self.strategy.name(),
                    day = state.day,
                    %date,
                    balance = %state.balance,
                    "Bankrupt"
                );
                self.state = RunState::Bankrupt {
                    day: state.day,
                    date,
                };
            }
        }
    }

    fn try_enter(&mut self, tuple: &LegTuple, days: i64) -> Result<EntryDecision, EngineError> {
        if days < self.config.min_expiration || days > self.config.max_expiration {
            return Ok(EntryDecision::OutsideWindow);
        }

        let (calls, puts) = (tuple.calls.as_slice(), tuple.puts.as_slice());
        let strategy = self.strategy.as_ref();

        if !strategy.is_admissible(calls, puts) {
            return Ok(EntryDecision::NotAdmissible);
        }

        let estimated = strategy.estimated_delta(calls, puts);
        let net_delta = self.ledger.current().net_delta;
        if admit_delta(net_delta, estimated, self.config.max_delta).is_none() {
            return Ok(EntryDecision::DeltaBudget);
        }

        let shorts = strategy.short_legs(calls, puts);
        let longs = strategy.long_legs(calls, puts);
        let legs = strategy.legs_per_entry();
        if legs == 0 || shorts.len() + longs.len() != legs {
            return Err(EngineError::ContractViolation {
                strategy: strategy.name().to_string(),
                reason: format!(
                    "legs_per_entry() is {} but {} short and {} long legs were returned",
                    legs,
                    shorts.len(),
                    longs.len()
                ),
            });
        }

        let entry = Entry {
            shorts,
            longs,
            delta: estimated,
            legs,
        };
        if self.config.trace {
            debug!(
                "Total income: {}, Total: {}",
                entry.credit() - entry.debit(),
                self.ledger.current().balance + entry.credit() - entry.debit()
            );
        }
        self.ledger.open(entry);

        Ok(EntryDecision::Admitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::quote;
    use crate::data::{OptionQuote, OptionType};
    use crate::strategy::{HedgedStraddle, ShortStraddle};
    use rust_decimal_macros::dec;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, day).unwrap()
    }

    fn leg(
        side: OptionType,
        day: u32,
        expires: u32,
        strike: Decimal,
        spot: Decimal,
        bid: Decimal,
        delta: f64,
    ) -> OptionQuote {
        let mut q = quote(side, date(day), date(expires), strike, delta);
        q.underlying_price = spot;
        q.bid = bid;
        q.ask = bid + dec!(0.1);
        q
    }

    fn straddle_tuple(day: u32, expires: u32, spot: Decimal, call_delta: f64, put_delta: f64) -> LegTuple {
        LegTuple::new(
            vec![leg(OptionType::Call, day, expires, dec!(100), spot, dec!(2.0), call_delta)],
            vec![leg(OptionType::Put, day, expires, dec!(100), spot, dec!(1.8), put_delta)],
        )
    }

    fn engine(config: BacktestConfig) -> SimulationEngine {
        SimulationEngine::new(config, Box::new(ShortStraddle))
    }

    /// Strategy whose estimated delta is fixed, for budget tests.
    struct FixedDelta(f64);

    impl StrategyContract for FixedDelta {
        fn name(&self) -> &str {
            "fixed-delta"
        }
        fn legs_per_entry(&self) -> usize {
            1
        }
        fn estimated_delta(&self, _: &[OptionQuote], _: &[OptionQuote]) -> f64 {
            self.0
        }
        fn is_admissible(&self, _: &[OptionQuote], _: &[OptionQuote]) -> bool {
            true
        }
        fn short_legs(&self, calls: &[OptionQuote], _: &[OptionQuote]) -> Vec<OptionQuote> {
            calls[..1].to_vec()
        }
        fn long_legs(&self, _: &[OptionQuote], _: &[OptionQuote]) -> Vec<OptionQuote> {
            Vec::new()
        }
    }

    /// Buys the rank-0 call and put, paying the ask on both.
    struct LongStraddle;

    impl StrategyContract for LongStraddle {
        fn name(&self) -> &str {
            "long-straddle"
        }
        fn legs_per_entry(&self) -> usize {
            2
        }
        fn estimated_delta(&self, calls: &[OptionQuote], puts: &[OptionQuote]) -> f64 {
            -(calls[0].delta + puts[0].delta)
        }
        fn is_admissible(&self, _: &[OptionQuote], _: &[OptionQuote]) -> bool {
            true
        }
        fn short_legs(&self, _: &[OptionQuote], _: &[OptionQuote]) -> Vec<OptionQuote> {
            Vec::new()
        }
        fn long_legs(&self, calls: &[OptionQuote], puts: &[OptionQuote]) -> Vec<OptionQuote> {
            vec![calls[0].clone(), puts[0].clone()]
        }
    }

    /// Rank-0 100 strikes to sell, rank-1 wings at 105 / 95 to buy.
    fn hedged_tuple(day: u32, expires: u32, spot: Decimal) -> LegTuple {
        let mut call_wing = leg(OptionType::Call, day, expires, dec!(105), spot, dec!(0.5), 0.3);
        call_wing.ask = dec!(0.6);
        let mut put_wing = leg(OptionType::Put, day, expires, dec!(95), spot, dec!(0.4), -0.2);
        put_wing.ask = dec!(0.5);
        LegTuple::new(
            vec![
                leg(OptionType::Call, day, expires, dec!(100), spot, dec!(2.0), 0.5),
                call_wing,
            ],
            vec![
                leg(OptionType::Put, day, expires, dec!(100), spot, dec!(1.8), -0.45),
                put_wing,
            ],
        )
    }

    /// Claims two legs but only ever returns one.
    struct Miscounted;

    impl StrategyContract for Miscounted {
        fn name(&self) -> &str {
            "miscounted"
        }
        fn legs_per_entry(&self) -> usize {
            2
        }
        fn estimated_delta(&self, _: &[OptionQuote], _: &[OptionQuote]) -> f64 {
            0.0
        }
        fn is_admissible(&self, _: &[OptionQuote], _: &[OptionQuote]) -> bool {
            true
        }
        fn short_legs(&self, calls: &[OptionQuote], _: &[OptionQuote]) -> Vec<OptionQuote> {
            calls[..1].to_vec()
        }
        fn long_legs(&self, _: &[OptionQuote], _: &[OptionQuote]) -> Vec<OptionQuote> {
            Vec::new()
        }
    }

    #[test]
    fn test_default_config() {
        let config = BacktestConfig::default();
        assert_eq!(config.min_expiration, 1);
        assert_eq!(config.max_expiration, 15);
        assert_eq!(config.max_delta, 1.5);
        assert_eq!(config.max_days, 100);
        assert!(config.terminate_on_bankruptcy);
    }

    #[test]
    fn test_admit_delta_rule() {
        // Inside the band.
        assert_eq!(admit_delta(0.0, 1.0, 1.5), Some(1.0));
        // Already over budget, entry improves the deviation.
        assert!(admit_delta(1.6, -0.2, 1.5).is_some());
        // Already over budget, entry worsens it.
        assert!(admit_delta(1.6, 0.2, 1.5).is_none());
        // Acceptable position pushed out of band.
        assert!(admit_delta(1.0, 0.8, 1.5).is_none());
        // Over budget and unchanged is allowed.
        assert_eq!(admit_delta(-2.0, 0.0, 1.5), Some(-2.0));
        // Flipping sign past the band is judged on magnitude.
        assert!(admit_delta(1.6, -3.0, 1.5).is_some());
        assert!(admit_delta(1.6, -3.4, 1.5).is_none());
    }

    #[test]
    fn test_two_day_scenario() {
        let config = BacktestConfig {
            starting_balance: dec!(1000),
            ..BacktestConfig::default()
        };
        let mut engine = engine(config);

        // Day 1 (first trading date): open a straddle expiring on the 3rd.
        let decision = engine
            .process(&straddle_tuple(2, 3, dec!(100), -0.48, 0.51))
            .unwrap();
        assert_eq!(decision, EntryDecision::Admitted);
        let state = engine.ledger().current().clone();
        assert_eq!(state.day, 1);
        assert_eq!(state.balance, dec!(1003.8));
        assert!((state.net_delta - 0.03).abs() < 1e-9);
        assert_eq!(state.open_legs, 2);

        // Day 2: both legs expire with spot 95, the put is 5 in the money.
        // The new tuple's own DTE is 0, so nothing new is opened.
        let decision = engine
            .process(&straddle_tuple(3, 3, dec!(95), -0.5, 0.5))
            .unwrap();
        assert_eq!(decision, EntryDecision::OutsideWindow);
        let state = engine.ledger().current();
        assert_eq!(state.day, 2);
        assert_eq!(state.balance, dec!(998.8));
        assert!(state.net_delta.abs() < 1e-9);
        assert_eq!(state.open_legs, 0);
        assert!(engine.ledger().short_legs().is_empty());
    }

    #[test]
    fn test_same_date_does_not_roll() {
        let mut engine = engine(BacktestConfig::default());
        engine.process(&straddle_tuple(2, 5, dec!(100), 0.1, -0.1)).unwrap();
        engine.process(&straddle_tuple(2, 9, dec!(100), 0.1, -0.1)).unwrap();
        assert_eq!(engine.ledger().day(), 1);
        assert_eq!(engine.ledger().current().open_legs, 4);
        assert_eq!(engine.stats().admitted, 2);
    }

    #[test]
    fn test_entry_window() {
        let mut engine = engine(BacktestConfig::default());
        // 20 DTE is past the default 15-day window.
        let decision = engine.process(&straddle_tuple(2, 22, dec!(100), 0.1, -0.1)).unwrap();
        assert_eq!(decision, EntryDecision::OutsideWindow);
        // The day still rolled.
        assert_eq!(engine.ledger().day(), 1);
        assert_eq!(engine.ledger().current().open_legs, 0);
    }

    #[test]
    fn test_not_admissible_skips_silently() {
        let mut engine = engine(BacktestConfig::default());
        let mut tuple = straddle_tuple(2, 5, dec!(100), 0.1, -0.1);
        tuple.puts[0].bid = Decimal::ZERO;
        let decision = engine.process(&tuple).unwrap();
        assert_eq!(decision, EntryDecision::NotAdmissible);
        assert_eq!(engine.ledger().current().balance, Decimal::ZERO);
    }

    #[test]
    fn test_delta_budget_over_band_improvement_admitted() {
        let config = BacktestConfig {
            starting_balance: dec!(1000),
            ..BacktestConfig::default()
        };
        let mut engine = SimulationEngine::new(config.clone(), Box::new(FixedDelta(1.6)));
        assert_eq!(
            engine.process(&straddle_tuple(2, 5, dec!(100), 0.0, 0.0)).unwrap(),
            EntryDecision::DeltaBudget
        );

        // Seed NetDelta = 1.6 by booking directly, then offer -0.2.
        let mut engine = SimulationEngine::new(config.clone(), Box::new(FixedDelta(-0.2)));
        engine.ledger.roll_day(date(2), dec!(100));
        engine.ledger.open(Entry {
            shorts: vec![],
            longs: vec![],
            delta: 1.6,
            legs: 0,
        });
        let decision = engine.process(&straddle_tuple(2, 5, dec!(100), 0.0, 0.0)).unwrap();
        assert_eq!(decision, EntryDecision::Admitted);
        assert!((engine.ledger().current().net_delta - 1.4).abs() < 1e-9);

        // Same seed, offer +0.2: rejected.
        let mut engine = SimulationEngine::new(config, Box::new(FixedDelta(0.2)));
        engine.ledger.roll_day(date(2), dec!(100));
        engine.ledger.open(Entry {
            shorts: vec![],
            longs: vec![],
            delta: 1.6,
            legs: 0,
        });
        let decision = engine.process(&straddle_tuple(2, 5, dec!(100), 0.0, 0.0)).unwrap();
        assert_eq!(decision, EntryDecision::DeltaBudget);
        assert!((engine.ledger().current().net_delta - 1.6).abs() < 1e-9);
    }

    #[test]
    fn test_bankruptcy_stops_processing() {
        let mut engine = engine(BacktestConfig::default());
        engine.process(&straddle_tuple(2, 3, dec!(100), 0.1, -0.1)).unwrap();
        assert_eq!(engine.ledger().current().balance, dec!(3.8));

        // Spot 80 on expiry: put pays out 20, balance goes to -16.2.
        engine.process(&straddle_tuple(3, 10, dec!(80), 0.1, -0.1)).unwrap();
        assert_eq!(
            engine.state(),
            RunState::Bankrupt {
                day: 2,
                date: date(3)
            }
        );
        assert_eq!(engine.ledger().current().balance, dec!(-16.2));

        // Nothing after bankruptcy touches the ledger.
        let decision = engine.process(&straddle_tuple(4, 10, dec!(80), 0.1, -0.1)).unwrap();
        assert_eq!(decision, EntryDecision::Halted);
        assert_eq!(engine.ledger().day(), 2);
        assert_eq!(engine.ledger().current().open_legs, 0);
    }

    #[test]
    fn test_negative_balance_without_termination_keeps_running() {
        let config = BacktestConfig {
            terminate_on_bankruptcy: false,
            ..BacktestConfig::default()
        };
        let mut engine = engine(config);
        engine.process(&straddle_tuple(2, 3, dec!(100), 0.1, -0.1)).unwrap();
        engine.process(&straddle_tuple(3, 10, dec!(80), 0.1, -0.1)).unwrap();
        assert_eq!(engine.state(), RunState::Running);
        assert_eq!(engine.stats().admitted, 2);
    }

    #[test]
    fn test_max_days_completes() {
        let config = BacktestConfig {
            max_days: 2,
            ..BacktestConfig::default()
        };
        let stream = LegStream::from_tuples(
            (2..8)
                .map(|d| straddle_tuple(d, 20, dec!(100), 0.0, 0.0))
                .collect(),
        );
        let result = engine(config).run(&stream).unwrap();
        assert_eq!(result.state, RunState::Completed);
        // Days 1..=3 roll; the next tuple sees day 3 > max_days and stops.
        assert_eq!(result.history.len(), 4);
        assert_eq!(result.series.len(), 4);
    }

    #[test]
    fn test_missing_legs_is_fatal() {
        let mut engine = engine(BacktestConfig::default());
        let mut tuple = straddle_tuple(2, 5, dec!(100), 0.0, 0.0);
        tuple.puts.clear();
        assert_eq!(
            engine.process(&tuple),
            Err(EngineError::MissingLegs {
                day: 0,
                calls: 1,
                puts: 0
            })
        );
    }

    #[test]
    fn test_contract_violation_is_fatal() {
        let mut engine = SimulationEngine::new(BacktestConfig::default(), Box::new(Miscounted));
        let err = engine
            .process(&straddle_tuple(2, 5, dec!(100), 0.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, EngineError::ContractViolation { .. }));
    }

    #[test]
    fn test_delta_and_cash_conservation() {
        let config = BacktestConfig {
            starting_balance: dec!(500),
            max_delta: 10.0,
            ..BacktestConfig::default()
        };
        let stream = LegStream::from_tuples(vec![
            straddle_tuple(2, 4, dec!(100), 0.3, -0.2),
            straddle_tuple(3, 5, dec!(101), 0.25, -0.3),
            straddle_tuple(4, 6, dec!(104), 0.4, -0.1),
            straddle_tuple(5, 9, dec!(97), 0.2, -0.35),
            straddle_tuple(6, 9, dec!(99), 0.2, -0.35),
        ]);
        let result = engine(config).run(&stream).unwrap();
        assert_eq!(result.state, RunState::Completed);

        // Every entry sells a 100-strike call at 2.0 and put at 1.8;
        // replay the bookkeeping independently.
        let spots = [dec!(100), dec!(101), dec!(104), dec!(97), dec!(99)];
        let tuples = [
            (2, 4, 0.3, -0.2),
            (3, 5, 0.25, -0.3),
            (4, 6, 0.4, -0.1),
            (5, 9, 0.2, -0.35),
            (6, 9, 0.2, -0.35),
        ];
        let mut balance = dec!(500);
        let mut delta = 0.0;
        let mut open: Vec<(u32, OptionType, f64)> = Vec::new();

        for (i, &(day, expires, call_delta, put_delta)) in tuples.iter().enumerate() {
            let spot = spots[i];
            for &(_, side, leg_delta) in open.iter().filter(|(exp, _, _)| *exp == day) {
                delta -= leg_delta;
                match side {
                    OptionType::Call if spot > dec!(100) => balance -= spot - dec!(100),
                    OptionType::Put if spot < dec!(100) => balance -= dec!(100) - spot,
                    _ => {}
                }
            }
            open.retain(|(exp, _, _)| *exp != day);

            balance += dec!(3.8);
            delta += call_delta + put_delta;
            open.push((expires, OptionType::Call, call_delta));
            open.push((expires, OptionType::Put, put_delta));

            let state = &result.history[i + 1];
            assert_eq!(state.balance, balance, "balance on day {}", i + 1);
            assert!((state.net_delta - delta).abs() < 1e-9, "delta on day {}", i + 1);
            assert_eq!(state.open_legs, open.len());
        }
    }

    #[test]
    fn test_hedged_entry_books_longs_and_settles_them() {
        let config = BacktestConfig {
            starting_balance: dec!(100),
            ..BacktestConfig::default()
        };
        let mut engine = SimulationEngine::new(config, Box::new(HedgedStraddle));

        let decision = engine.process(&hedged_tuple(2, 3, dec!(100))).unwrap();
        assert_eq!(decision, EntryDecision::Admitted);
        let state = engine.ledger().current().clone();
        // Credit 2.0 + 1.8, debit 0.6 + 0.5.
        assert_eq!(state.balance, dec!(102.7));
        // Shorts 0.5 - 0.45, longs negated -(0.3 - 0.2).
        assert!((state.net_delta + 0.05).abs() < 1e-9);
        assert_eq!(state.open_legs, 4);
        assert_eq!(engine.ledger().long_legs().len(), 2);

        // Spot 110 at expiry: short call pays 10, long call wing collects 5.
        let decision = engine.process(&hedged_tuple(3, 3, dec!(110))).unwrap();
        assert_eq!(decision, EntryDecision::OutsideWindow);
        let state = engine.ledger().current();
        assert_eq!(state.day, 2);
        assert_eq!(state.balance, dec!(97.7));
        assert!(state.net_delta.abs() < 1e-9);
        assert_eq!(state.open_legs, 0);
        assert!(engine.ledger().long_legs().is_empty());
        assert!(engine.ledger().short_legs().is_empty());
    }

    #[test]
    fn test_entry_debit_can_bankrupt() {
        let config = BacktestConfig {
            starting_balance: dec!(0.5),
            ..BacktestConfig::default()
        };
        let mut engine = SimulationEngine::new(config, Box::new(LongStraddle));

        // Asks 2.1 + 1.9 against a 0.5 balance.
        let decision = engine.process(&straddle_tuple(2, 5, dec!(100), 0.5, -0.5)).unwrap();
        assert_eq!(decision, EntryDecision::Admitted);
        assert_eq!(engine.ledger().current().balance, dec!(-3.5));
        assert_eq!(
            engine.state(),
            RunState::Bankrupt {
                day: 1,
                date: date(2)
            }
        );

        let decision = engine.process(&straddle_tuple(3, 5, dec!(100), 0.5, -0.5)).unwrap();
        assert_eq!(decision, EntryDecision::Halted);
        assert_eq!(engine.ledger().day(), 1);
    }
}
