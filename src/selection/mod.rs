//! Option selection by delta.
//!
//! - Bucketing of one chain side by snapshot day and days-to-expiration
//! - Per-bucket ranking under a named policy
//! - Rank-N selections across all buckets

pub mod index;
pub mod policy;

pub use index::{OptionChainIndex, RankedSelection};
pub use policy::{SelectionPolicy, LADDER_BOUND};
