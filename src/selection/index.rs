//! Option chain index.
//!
//! Groups one side of a chain by (snapshot day, days-to-expiration) and
//! ranks every bucket once under a [`SelectionPolicy`]. Buckets are
//! independent, so ranking runs on the rayon pool; results land in an
//! ordered map and selections are always read back in bucket order.

use std::collections::BTreeMap;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::data::{BucketKey, OptionQuote, OptionType};

use super::policy::SelectionPolicy;

/// The quotes picked at one rank, one per bucket that has that many
/// candidates, in ascending bucket order.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedSelection {
    pub side: OptionType,
    pub rank: usize,
    rows: Vec<OptionQuote>,
}

impl RankedSelection {
    /// Wrap rows that were produced elsewhere (e.g. a cache reload).
    /// Rows must already be in bucket order.
    pub fn from_rows(side: OptionType, rank: usize, rows: Vec<OptionQuote>) -> Self {
        Self { side, rank, rows }
    }

    pub fn rows(&self) -> &[OptionQuote] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<OptionQuote> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, OptionQuote> {
        self.rows.iter()
    }

    /// Find the row for a bucket.
    pub fn get(&self, key: &BucketKey) -> Option<&OptionQuote> {
        self.rows
            .binary_search_by(|q| q.bucket().cmp(key))
            .ok()
            .map(|idx| &self.rows[idx])
    }
}

/// Ranked buckets for one side of a chain.
#[derive(Debug, Clone)]
pub struct OptionChainIndex {
    side: OptionType,
    policy: SelectionPolicy,
    buckets: BTreeMap<BucketKey, Vec<OptionQuote>>,
}

impl OptionChainIndex {
    /// Build the index for `side` from `quotes`.
    ///
    /// Quotes of the other side and quotes that expire before their
    /// snapshot day are ignored. Within a bucket, quotes keep the order
    /// they appear in `quotes` before ranking.
    pub fn build(side: OptionType, quotes: &[OptionQuote], policy: SelectionPolicy) -> Self {
        let start = Instant::now();

        let mut groups: BTreeMap<BucketKey, Vec<OptionQuote>> = BTreeMap::new();
        let mut expired = 0usize;
        for quote in quotes.iter().filter(|q| q.option_type == side) {
            if quote.days < 0 {
                expired += 1;
                continue;
            }
            groups.entry(quote.bucket()).or_default().push(quote.clone());
        }
        if expired > 0 {
            debug!(%side, expired, "Skipped quotes past expiration");
        }

        let buckets: BTreeMap<BucketKey, Vec<OptionQuote>> = groups
            .into_par_iter()
            .map(|(key, bucket)| (key, policy.rank(side, bucket)))
            .collect();

        info!(
            %side,
            policy = %policy.label(),
            buckets = buckets.len(),
            "Grouping processed in {:.3}s",
            start.elapsed().as_secs_f64()
        );

        Self {
            side,
            policy,
            buckets,
        }
    }

    pub fn side(&self) -> OptionType {
        self.side
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Number of (day, DTE) buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// The full ranking of one bucket.
    pub fn bucket(&self, key: &BucketKey) -> Option<&[OptionQuote]> {
        self.buckets.get(key).map(Vec::as_slice)
    }

    /// Iterate buckets in ascending (day, DTE) order.
    pub fn buckets(&self) -> impl Iterator<Item = (&BucketKey, &[OptionQuote])> {
        self.buckets.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Pick the quote at `rank` (0 = nearest) from every bucket. Buckets
    /// with fewer than `rank + 1` candidates contribute no row.
    pub fn select(&self, rank: usize) -> RankedSelection {
        let rows = self
            .buckets
            .values()
            .filter_map(|ranked| ranked.get(rank).cloned())
            .collect();
        RankedSelection::from_rows(self.side, rank, rows)
    }
}
