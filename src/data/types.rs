//! Core data types for the delta backtester.
//!
//! One `OptionQuote` per chain row, carrying the columns of the quote
//! source plus the derived days-to-expiration and the row's position in
//! the original file.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Option type (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "C" | "CALL" => Some(Self::Call),
            "P" | "PUT" => Some(Self::Put),
            _ => None,
        }
    }

    /// Spelling used by the quote source and the selection cache.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Put => "put",
        }
    }
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single option quote from one chain snapshot.
///
/// Immutable once loaded. Prices are kept as `Decimal` so that cash
/// arithmetic is exact; greeks stay `f64`. An undefined delta is stored
/// as `NaN` and ranked last by the selection index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionQuote {
    /// Position of the row in the original quote source.
    pub row_index: u64,

    /// Underlying spot price at snapshot time
    pub underlying_price: Decimal,

    /// Option type (call or put)
    pub option_type: OptionType,

    /// Option expiration date
    pub expiration: NaiveDate,

    /// Snapshot (trading) date
    pub data_date: NaiveDate,

    /// Strike price
    pub strike: Decimal,

    pub last: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,

    pub volume: i64,
    pub open_interest: i64,

    /// Implied volatility
    pub iv: f64,

    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,

    /// Days to expiration: `expiration - data_date` in calendar days.
    pub days: i64,
}

impl OptionQuote {
    /// Days between snapshot and expiration.
    pub fn days_between(data_date: NaiveDate, expiration: NaiveDate) -> i64 {
        (expiration - data_date).num_days()
    }

    /// Whether the quote carries a usable delta.
    pub fn has_delta(&self) -> bool {
        self.delta.is_finite()
    }

    /// Bucket this quote is ranked in.
    pub fn bucket(&self) -> BucketKey {
        BucketKey {
            data_date: self.data_date,
            days: self.days,
        }
    }

    /// Whether the option finishes in the money against `spot`.
    pub fn is_itm(&self, spot: Decimal) -> bool {
        match self.option_type {
            OptionType::Call => self.strike < spot,
            OptionType::Put => self.strike > spot,
        }
    }

    /// Intrinsic value at `spot`, zero when out of the money.
    pub fn intrinsic_value(&self, spot: Decimal) -> Decimal {
        if !self.is_itm(spot) {
            return Decimal::ZERO;
        }
        match self.option_type {
            OptionType::Call => spot - self.strike,
            OptionType::Put => self.strike - spot,
        }
    }
}

/// Grouping key of the selection index: one snapshot day and one
/// days-to-expiration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BucketKey {
    pub data_date: NaiveDate,
    pub days: i64,
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} DTE)", self.data_date, self.days)
    }
}

/// Test fixture shared by the unit tests of other modules.
#[cfg(test)]
pub(crate) fn quote(
    option_type: OptionType,
    data_date: NaiveDate,
    expiration: NaiveDate,
    strike: Decimal,
    delta: f64,
) -> OptionQuote {
    OptionQuote {
        row_index: 0,
        underlying_price: Decimal::from(100),
        option_type,
        expiration,
        data_date,
        strike,
        last: Decimal::ONE,
        bid: Decimal::ONE,
        ask: Decimal::ONE,
        volume: 10,
        open_interest: 100,
        iv: 0.2,
        delta,
        gamma: 0.0,
        theta: 0.0,
        vega: 0.0,
        days: OptionQuote::days_between(data_date, expiration),
    }
}
