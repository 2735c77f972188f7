//! Selection cache.
//!
//! Stores one ranked selection per (asset, side, rank) as a parquet file
//! in the source column shape plus `Days` and `RowIndex`. Prices are
//! written as decimal strings and greeks as `f64`, so a reload yields
//! quotes equal to the ones that were saved, in the same order.

use std::fs::File;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use thiserror::Error;
use tracing::debug;

use super::loader::{frame_to_quotes, LoaderError};
use super::types::{OptionQuote, OptionType};

const ROW_INDEX_COL: &str = "RowIndex";
const DAYS_COL: &str = "Days";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache file not found: {0}")]
    NotFound(String),

    #[error("Malformed cache file {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Identifies one cached selection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub asset: String,
    pub side: OptionType,
    pub rank: usize,
    /// Policy label; selections made under different policies never share a file.
    pub policy: String,
}

impl CacheKey {
    pub fn new(asset: &str, side: OptionType, rank: usize, policy: &str) -> Self {
        Self {
            asset: asset.to_string(),
            side,
            rank,
            policy: policy.to_string(),
        }
    }

    fn file_name(&self) -> String {
        format!("{}_{}_{}.parquet", self.asset, self.side.as_str(), self.rank)
    }
}

/// Parquet-backed store for ranked selections.
pub struct SelectionCache {
    cache_dir: PathBuf,
}

impl SelectionCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(&key.policy).join(key.file_name())
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.path(key).exists()
    }

    /// Write `rows` for `key`, replacing any previous file.
    pub fn save(&self, key: &CacheKey, rows: &[OptionQuote]) -> Result<PathBuf, CacheError> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut df = quotes_to_frame(rows)?;
        let mut file = File::create(&path)?;
        ParquetWriter::new(&mut file).finish(&mut df)?;

        debug!(path = %path.display(), rows = rows.len(), "Saved selection");
        Ok(path)
    }

    /// Read back the rows saved for `key`.
    pub fn load(&self, key: &CacheKey) -> Result<Vec<OptionQuote>, CacheError> {
        let path = self.path(key);
        load_file(&path)
    }
}

fn load_file(path: &Path) -> Result<Vec<OptionQuote>, CacheError> {
    let shown = path.display().to_string();
    if !path.exists() {
        return Err(CacheError::NotFound(shown));
    }

    let df = ParquetReader::new(File::open(path)?).finish()?;
    for name in [DAYS_COL, ROW_INDEX_COL] {
        if df.column(name).is_err() {
            return Err(CacheError::Malformed {
                path: shown,
                reason: format!("missing column {}", name),
            });
        }
    }

    let quotes = frame_to_quotes(&df, Some(ROW_INDEX_COL))?;
    let days = df.column(DAYS_COL)?.cast(&DataType::Int64)?;
    let days = days.i64()?;
    for (idx, quote) in quotes.iter().enumerate() {
        if days.get(idx) != Some(quote.days) {
            return Err(CacheError::Malformed {
                path: shown,
                reason: format!("Days column disagrees with dates at row {}", idx),
            });
        }
    }

    debug!(path = %shown, rows = quotes.len(), "Loaded selection");
    Ok(quotes)
}

fn quotes_to_frame(rows: &[OptionQuote]) -> PolarsResult<DataFrame> {
    fn strings<F: Fn(&OptionQuote) -> String>(rows: &[OptionQuote], f: F) -> Vec<String> {
        rows.iter().map(f).collect()
    }
    fn floats<F: Fn(&OptionQuote) -> f64>(rows: &[OptionQuote], f: F) -> Vec<f64> {
        rows.iter().map(f).collect()
    }
    fn ints<F: Fn(&OptionQuote) -> i64>(rows: &[OptionQuote], f: F) -> Vec<i64> {
        rows.iter().map(f).collect()
    }

    df!(
        "UnderlyingPrice" => strings(rows, |q| q.underlying_price.to_string()),
        "Type" => strings(rows, |q| q.option_type.as_str().to_string()),
        "Expiration" => strings(rows, |q| q.expiration.format("%Y-%m-%d").to_string()),
        "DataDate" => strings(rows, |q| q.data_date.format("%Y-%m-%d").to_string()),
        "Strike" => strings(rows, |q| q.strike.to_string()),
        "Last" => strings(rows, |q| q.last.to_string()),
        "Bid" => strings(rows, |q| q.bid.to_string()),
        "Ask" => strings(rows, |q| q.ask.to_string()),
        "Volume" => ints(rows, |q| q.volume),
        "OpenInterest" => ints(rows, |q| q.open_interest),
        "IV" => floats(rows, |q| q.iv),
        "Delta" => floats(rows, |q| q.delta),
        "Gamma" => floats(rows, |q| q.gamma),
        "Theta" => floats(rows, |q| q.theta),
        "Vega" => floats(rows, |q| q.vega),
        DAYS_COL => ints(rows, |q| q.days),
        ROW_INDEX_COL => ints(rows, |q| q.row_index as i64)
    )
}
