//! Synchronized leg stream.
//!
//! One [`LegTuple`] per bucket, holding the rank-0..depth call and put
//! picks for that bucket. The engine consumes tuples strictly in order.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;

use crate::data::{BucketKey, OptionQuote, OptionType};
use crate::selection::RankedSelection;

/// Deepest rank pairing a stream can carry.
pub const MAX_LEG_DEPTH: usize = 4;

#[derive(Error, Debug, PartialEq)]
pub enum StreamError {
    #[error("Leg depth {0} outside 1..=4")]
    DepthOutOfRange(usize),

    #[error("Expected a {expected} selection at position {position}, got {found}")]
    WrongSide {
        position: usize,
        expected: OptionType,
        found: OptionType,
    },

    #[error("Selection {position} has {found} rows, expected {expected}")]
    LengthMismatch {
        position: usize,
        expected: usize,
        found: usize,
    },

    #[error("Row {row} mixes snapshot dates {first} and {other}")]
    DateMismatch {
        row: usize,
        first: NaiveDate,
        other: NaiveDate,
    },
}

/// Candidate legs for one bucket: `calls[i]`/`puts[i]` are the rank-`i` picks.
#[derive(Debug, Clone, PartialEq)]
pub struct LegTuple {
    pub calls: Vec<OptionQuote>,
    pub puts: Vec<OptionQuote>,
}

impl LegTuple {
    pub fn new(calls: Vec<OptionQuote>, puts: Vec<OptionQuote>) -> Self {
        Self { calls, puts }
    }

    /// Leading call, which carries the tuple's date, spot and DTE.
    pub fn lead(&self) -> Option<&OptionQuote> {
        self.calls.first()
    }

    pub fn data_date(&self) -> Option<NaiveDate> {
        self.lead().map(|q| q.data_date)
    }

    pub fn spot(&self) -> Option<Decimal> {
        self.lead().map(|q| q.underlying_price)
    }

    pub fn days(&self) -> Option<i64> {
        self.lead().map(|q| q.days)
    }

    pub fn depth(&self) -> usize {
        self.calls.len().min(self.puts.len())
    }
}

/// Ordered tuples for one simulation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegStream {
    tuples: Vec<LegTuple>,
}

fn check_pairs(pairs: &[(RankedSelection, RankedSelection)]) -> Result<(), StreamError> {
    if pairs.is_empty() || pairs.len() > MAX_LEG_DEPTH {
        return Err(StreamError::DepthOutOfRange(pairs.len()));
    }
    for (position, (calls, puts)) in pairs.iter().enumerate() {
        if calls.side != OptionType::Call {
            return Err(StreamError::WrongSide {
                position,
                expected: OptionType::Call,
                found: calls.side,
            });
        }
        if puts.side != OptionType::Put {
            return Err(StreamError::WrongSide {
                position,
                expected: OptionType::Put,
                found: puts.side,
            });
        }
    }
    Ok(())
}

impl LegStream {
    /// Zip the selections row by row.
    ///
    /// Every selection must have the same length and each row must share
    /// one snapshot date; anything else is an input error.
    pub fn lockstep(pairs: &[(RankedSelection, RankedSelection)]) -> Result<Self, StreamError> {
        check_pairs(pairs)?;

        let expected = pairs[0].0.len();
        let flat = pairs.iter().flat_map(|(c, p)| [c, p]);
        for (position, selection) in flat.enumerate() {
            if selection.len() != expected {
                return Err(StreamError::LengthMismatch {
                    position,
                    expected,
                    found: selection.len(),
                });
            }
        }

        let mut tuples = Vec::with_capacity(expected);
        for row in 0..expected {
            let calls: Vec<OptionQuote> = pairs.iter().map(|(c, _)| c.rows()[row].clone()).collect();
            let puts: Vec<OptionQuote> = pairs.iter().map(|(_, p)| p.rows()[row].clone()).collect();

            let first = calls[0].data_date;
            if let Some(other) = calls
                .iter()
                .chain(puts.iter())
                .map(|q| q.data_date)
                .find(|d| *d != first)
            {
                return Err(StreamError::DateMismatch { row, first, other });
            }

            tuples.push(LegTuple::new(calls, puts));
        }

        Ok(Self { tuples })
    }

    /// Join the selections on their (day, DTE) bucket.
    ///
    /// Buckets missing from any selection are dropped; the rest are
    /// emitted in ascending bucket order.
    pub fn aligned(pairs: &[(RankedSelection, RankedSelection)]) -> Result<Self, StreamError> {
        check_pairs(pairs)?;

        let keys: BTreeSet<BucketKey> = pairs[0].0.iter().map(OptionQuote::bucket).collect();
        let mut tuples = Vec::with_capacity(keys.len());
        let mut dropped = 0usize;

        'buckets: for key in &keys {
            let mut calls = Vec::with_capacity(pairs.len());
            let mut puts = Vec::with_capacity(pairs.len());
            for (c, p) in pairs {
                match (c.get(key), p.get(key)) {
                    (Some(call), Some(put)) => {
                        calls.push(call.clone());
                        puts.push(put.clone());
                    }
                    _ => {
                        dropped += 1;
                        continue 'buckets;
                    }
                }
            }
            tuples.push(LegTuple::new(calls, puts));
        }

        if dropped > 0 {
            debug!(dropped, kept = tuples.len(), "Dropped buckets missing a ranked leg");
        }

        Ok(Self { tuples })
    }

    pub fn from_tuples(tuples: Vec<LegTuple>) -> Self {
        Self { tuples }
    }

    pub fn tuples(&self) -> &[LegTuple] {
        &self.tuples
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LegTuple> {
        self.tuples.iter()
    }
}

impl<'a> IntoIterator for &'a LegStream {
    type Item = &'a LegTuple;
    type IntoIter = std::slice::Iter<'a, LegTuple>;

    fn into_iter(self) -> Self::IntoIter {
        self.tuples.iter()
    }
}
