//! Ranking policies for option selection.
//!
//! Two policies are in use and they disagree on filtering and tie-break,
//! so they are kept as separate variants rather than merged:
//!
//! | Policy         | Filter                                   | Order                                  |
//! |----------------|------------------------------------------|----------------------------------------|
//! | `NearestDelta` | none, undefined delta ranked last        | ascending `abs(delta - target)`        |
//! | `DeltaLadder`  | calls `delta < 0.5`, puts `delta > -0.5` | calls descending, puts ascending delta |
//!
//! Under both policies a quote with an undefined delta ranks after every
//! defined one, so it is picked only from a bucket with nothing else.
//!
//! Both sorts are stable, so equal keys keep source row order.

use serde::{Deserialize, Serialize};

use crate::data::{OptionQuote, OptionType};

/// Delta bound of the ladder policy; calls rank below it, puts above its negation.
pub const LADDER_BOUND: f64 = 0.5;

/// How the quotes of one bucket are ranked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Nearest to `target` by absolute delta distance.
    NearestDelta { target: f64 },
    /// Nth strike away from the 0.5-delta boundary, by signed delta.
    DeltaLadder,
}

impl SelectionPolicy {
    /// Rank a bucket. Returns the quotes in rank order; rank 0 first.
    /// Quotes excluded by the policy's filter are dropped.
    pub fn rank(&self, side: OptionType, bucket: Vec<OptionQuote>) -> Vec<OptionQuote> {
        match *self {
            Self::NearestDelta { target } => rank_nearest_delta(bucket, target),
            Self::DeltaLadder => rank_delta_ladder(side, bucket),
        }
    }

    /// Short stable label, used to keep cached selections apart.
    pub fn label(&self) -> String {
        match self {
            Self::NearestDelta { target } => format!("nearest{:+.4}", target),
            Self::DeltaLadder => "ladder".to_string(),
        }
    }
}

/// Distance of a quote to `target`. Undefined delta sorts after every
/// defined distance.
fn distance_key(delta: f64, target: f64) -> (bool, f64) {
    let distance = (delta - target).abs();
    if distance.is_nan() {
        (true, 0.0)
    } else {
        (false, distance)
    }
}

fn rank_nearest_delta(mut bucket: Vec<OptionQuote>, target: f64) -> Vec<OptionQuote> {
    bucket.sort_by(|a, b| {
        let (a_undefined, a_dist) = distance_key(a.delta, target);
        let (b_undefined, b_dist) = distance_key(b.delta, target);
        a_undefined
            .cmp(&b_undefined)
            .then_with(|| a_dist.total_cmp(&b_dist))
    });
    bucket
}

fn rank_delta_ladder(side: OptionType, bucket: Vec<OptionQuote>) -> Vec<OptionQuote> {
    let (mut kept, undefined): (Vec<OptionQuote>, Vec<OptionQuote>) = bucket
        .into_iter()
        .filter(|q| match side {
            OptionType::Call => q.delta.is_nan() || q.delta < LADDER_BOUND,
            OptionType::Put => q.delta.is_nan() || q.delta > -LADDER_BOUND,
        })
        .partition(|q| q.has_delta());
    match side {
        OptionType::Call => kept.sort_by(|a, b| b.delta.total_cmp(&a.delta)),
        OptionType::Put => kept.sort_by(|a, b| a.delta.total_cmp(&b.delta)),
    }
    // undefined delta trails every defined rank, in source order
    kept.extend(undefined);
    kept
}
