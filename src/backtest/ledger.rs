//! Portfolio ledger.
//!
//! Owns the open short and long legs and the per-day running totals.
//! The day clock is a plain counter: it advances only when a new snapshot
//! date arrives, never by calendar arithmetic, so non-trading days leave
//! no gaps.
//!
//! Sign conventions:
//! - Selling a leg credits its bid and adds its delta as quoted.
//! - Buying a leg debits its ask and subtracts its delta.
//! - At expiration a short leg pays out its intrinsic value and its delta
//!   is removed; a long leg collects its intrinsic value and its delta is
//!   given back.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::OptionQuote;

/// Running totals for one simulation day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayState {
    /// Sequential day index; 0 is the initial state.
    pub day: usize,
    /// Snapshot date that opened this day (`None` for day 0).
    pub date: Option<NaiveDate>,
    pub balance: Decimal,
    pub net_delta: f64,
    pub open_legs: usize,
}

/// What happened to the legs expiring on one day roll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settlement {
    pub expired_short: usize,
    pub expired_long: usize,
    /// Expired legs that finished in the money.
    pub exercised: usize,
    /// Cash paid out on short legs (zero or negative).
    pub short_payoff: Decimal,
    /// Cash collected on long legs (zero or positive).
    pub long_payoff: Decimal,
    /// Summed delta of the expired short legs.
    pub short_delta: f64,
    /// Summed delta of the expired long legs.
    pub long_delta: f64,
}

impl Settlement {
    pub fn expired(&self) -> usize {
        self.expired_short + self.expired_long
    }

    /// Net cash effect on the balance.
    pub fn cash(&self) -> Decimal {
        self.short_payoff + self.long_payoff
    }

    /// Net effect on portfolio delta.
    pub fn delta_change(&self) -> f64 {
        self.long_delta - self.short_delta
    }
}

/// An admitted entry, ready to be booked.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub shorts: Vec<OptionQuote>,
    pub longs: Vec<OptionQuote>,
    /// Delta added to the portfolio.
    pub delta: f64,
    /// Legs added to the open count.
    pub legs: usize,
}

impl Entry {
    /// Premium collected on the short legs.
    pub fn credit(&self) -> Decimal {
        self.shorts.iter().map(|q| q.bid).sum()
    }

    /// Premium paid on the long legs.
    pub fn debit(&self) -> Decimal {
        self.longs.iter().map(|q| q.ask).sum()
    }
}

/// Per-day series for plotting, keyed by day index with no gaps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaySeries {
    pub balance: BTreeMap<usize, f64>,
    pub net_delta: BTreeMap<usize, f64>,
    pub open_legs: BTreeMap<usize, usize>,
}

impl DaySeries {
    pub fn from_history(history: &[DayState]) -> Self {
        let mut series = Self::default();
        for state in history {
            series
                .balance
                .insert(state.day, state.balance.to_f64().unwrap_or(f64::NAN));
            series.net_delta.insert(state.day, state.net_delta);
            series.open_legs.insert(state.day, state.open_legs);
        }
        series
    }

    pub fn len(&self) -> usize {
        self.balance.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balance.is_empty()
    }
}

/// Open inventories plus the day-state history of one run.
#[derive(Debug, Clone)]
pub struct PortfolioLedger {
    short_legs: Vec<OptionQuote>,
    long_legs: Vec<OptionQuote>,
    history: Vec<DayState>,
}

impl PortfolioLedger {
    /// A fresh ledger whose day 0 holds `starting_balance` and nothing else.
    pub fn new(starting_balance: Decimal) -> Self {
        Self {
            short_legs: Vec::new(),
            long_legs: Vec::new(),
            history: vec![DayState {
                day: 0,
                date: None,
                balance: starting_balance,
                net_delta: 0.0,
                open_legs: 0,
            }],
        }
    }

    pub fn current(&self) -> &DayState {
        // history always holds day 0
        &self.history[self.history.len() - 1]
    }

    fn current_mut(&mut self) -> &mut DayState {
        let last = self.history.len() - 1;
        &mut self.history[last]
    }

    pub fn day(&self) -> usize {
        self.current().day
    }

    pub fn current_date(&self) -> Option<NaiveDate> {
        self.current().date
    }

    pub fn short_legs(&self) -> &[OptionQuote] {
        &self.short_legs
    }

    pub fn long_legs(&self) -> &[OptionQuote] {
        &self.long_legs
    }

    pub fn history(&self) -> &[DayState] {
        &self.history
    }

    pub fn series(&self) -> DaySeries {
        DaySeries::from_history(&self.history)
    }

    /// Open day `i + 1` on `date`: carry the totals forward, then settle
    /// every leg expiring on `date` against `spot`.
    pub fn roll_day(&mut self, date: NaiveDate, spot: Decimal) -> Settlement {
        let previous = self.current().clone();
        self.history.push(DayState {
            day: previous.day + 1,
            date: Some(date),
            ..previous
        });

        let (expired_short, remaining): (Vec<_>, Vec<_>) = std::mem::take(&mut self.short_legs)
            .into_iter()
            .partition(|q| q.expiration == date);
        self.short_legs = remaining;

        let (expired_long, remaining): (Vec<_>, Vec<_>) = std::mem::take(&mut self.long_legs)
            .into_iter()
            .partition(|q| q.expiration == date);
        self.long_legs = remaining;

        let mut settlement = Settlement {
            expired_short: expired_short.len(),
            expired_long: expired_long.len(),
            ..Settlement::default()
        };

        for leg in &expired_short {
            if leg.is_itm(spot) {
                settlement.exercised += 1;
                settlement.short_payoff -= leg.intrinsic_value(spot);
            }
            settlement.short_delta += leg.delta;
        }
        for leg in &expired_long {
            if leg.is_itm(spot) {
                settlement.exercised += 1;
                settlement.long_payoff += leg.intrinsic_value(spot);
            }
            settlement.long_delta += leg.delta;
        }

        let state = self.current_mut();
        state.balance += settlement.cash();
        state.net_delta += settlement.delta_change();
        state.open_legs = state.open_legs.saturating_sub(settlement.expired());

        settlement
    }

    /// Book an admitted entry on the current day.
    pub fn open(&mut self, entry: Entry) {
        let credit = entry.credit();
        let debit = entry.debit();

        let state = self.current_mut();
        state.net_delta += entry.delta;
        state.open_legs += entry.legs;
        state.balance += credit - debit;

        self.short_legs.extend(entry.shorts);
        self.long_legs.extend(entry.longs);
    }
}
