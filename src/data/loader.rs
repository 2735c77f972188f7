//! Quote-source loader.
//!
//! Reads the per-asset chain file `<data_dir>/<asset>.csv` into typed
//! quotes. The file carries one row per option contract with at least
//! the columns listed in [`SOURCE_COLUMNS`]; any extra columns are
//! ignored. Dates may be `YYYY-MM-DD`, `MM/DD/YYYY` or a datetime whose
//! time part is discarded.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info};

use super::types::{OptionQuote, OptionType};

/// Columns the quote source must provide.
pub const SOURCE_COLUMNS: &[&str] = &[
    "UnderlyingPrice",
    "Type",
    "Expiration",
    "DataDate",
    "Strike",
    "Last",
    "Bid",
    "Ask",
    "Volume",
    "OpenInterest",
    "IV",
    "Delta",
    "Gamma",
    "Theta",
    "Vega",
];

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One asset's chain, split by side. Each side keeps source row order.
#[derive(Debug, Clone, Default)]
pub struct ChainQuotes {
    pub calls: Vec<OptionQuote>,
    pub puts: Vec<OptionQuote>,
}

impl ChainQuotes {
    pub fn from_quotes(quotes: Vec<OptionQuote>) -> Self {
        let (calls, puts) = quotes
            .into_iter()
            .partition(|q| q.option_type == OptionType::Call);
        Self { calls, puts }
    }

    pub fn side(&self, option_type: OptionType) -> &[OptionQuote] {
        match option_type {
            OptionType::Call => &self.calls,
            OptionType::Put => &self.puts,
        }
    }

    pub fn len(&self) -> usize {
        self.calls.len() + self.puts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty() && self.puts.is_empty()
    }
}

/// CSV loader for per-asset option chains.
pub struct DataLoader {
    data_dir: String,
}

impl DataLoader {
    pub fn new(data_dir: &str) -> Self {
        Self {
            data_dir: data_dir.to_string(),
        }
    }

    /// Path to an asset's chain file.
    fn source_path(&self, asset: &str) -> String {
        format!("{}/{}.csv", self.data_dir, asset)
    }

    /// List assets that have a chain file in the data directory.
    pub fn available_assets(&self) -> Result<Vec<String>, LoaderError> {
        let path = Path::new(&self.data_dir);
        if !path.exists() {
            return Ok(vec![]);
        }

        let mut assets = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(asset) = name.to_string_lossy().strip_suffix(".csv") {
                assets.push(asset.to_string());
            }
        }
        assets.sort();
        Ok(assets)
    }

    /// Load the raw chain file, restricted to the source columns.
    pub fn load_dataframe(&self, asset: &str) -> Result<DataFrame, LoaderError> {
        let path = self.source_path(asset);
        if !Path::new(&path).exists() {
            return Err(LoaderError::FileNotFound(path));
        }

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(PathBuf::from(&path)))?
            .finish()?;

        for name in SOURCE_COLUMNS {
            if df.column(name).is_err() {
                return Err(LoaderError::MissingColumn(name.to_string()));
            }
        }

        Ok(df.select(SOURCE_COLUMNS.iter().copied())?)
    }

    /// Load an asset's quotes and split them into calls and puts.
    pub fn load_quotes(&self, asset: &str) -> Result<ChainQuotes, LoaderError> {
        let df = self.load_dataframe(asset)?;
        let quotes = frame_to_quotes(&df, None)?;
        let chain = ChainQuotes::from_quotes(quotes);
        info!(
            asset,
            rows = df.height(),
            calls = chain.calls.len(),
            puts = chain.puts.len(),
            "Loaded quote source"
        );
        Ok(chain)
    }
}

fn column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column, LoaderError> {
    df.column(name)
        .map_err(|_| LoaderError::MissingColumn(name.to_string()))
}

pub(crate) fn f64_column(df: &DataFrame, name: &str) -> Result<Float64Chunked, LoaderError> {
    Ok(column(df, name)?.cast(&DataType::Float64)?.f64()?.clone())
}

pub(crate) fn i64_column(df: &DataFrame, name: &str) -> Result<Int64Chunked, LoaderError> {
    Ok(column(df, name)?.cast(&DataType::Int64)?.i64()?.clone())
}

pub(crate) fn str_column(df: &DataFrame, name: &str) -> Result<StringChunked, LoaderError> {
    Ok(column(df, name)?.cast(&DataType::String)?.str()?.clone())
}

/// Parse a date cell in any of the layouts seen in chain exports.
pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y%m%d"];
    const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %H:%M"];

    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
                .map(|dt| dt.date())
        })
}

/// Parse a decimal cell; the cache stores prices as exact strings.
pub(crate) fn parse_decimal(s: &str) -> Option<Decimal> {
    Decimal::from_str(s.trim()).ok()
}

pub(crate) fn decimal_from_f64(v: Option<f64>) -> Decimal {
    v.and_then(Decimal::from_f64).unwrap_or_default()
}

/// Read a price column as decimals. String columns are parsed exactly,
/// numeric ones go through `f64`. Nulls become zero.
pub(crate) fn decimal_column(df: &DataFrame, name: &str) -> Result<Vec<Decimal>, LoaderError> {
    let col = column(df, name)?;
    if col.dtype() == &DataType::String {
        Ok(col
            .str()?
            .into_iter()
            .map(|v| v.and_then(parse_decimal).unwrap_or_default())
            .collect())
    } else {
        Ok(col
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(decimal_from_f64)
            .collect())
    }
}

/// Convert a frame in source column shape into quotes.
///
/// `row_index_col` names a column holding each row's original source
/// position; without it the frame position is used. Rows whose `Type` is
/// neither call nor put are dropped.
pub(crate) fn frame_to_quotes(
    df: &DataFrame,
    row_index_col: Option<&str>,
) -> Result<Vec<OptionQuote>, LoaderError> {
    let spot = decimal_column(df, "UnderlyingPrice")?;
    let types = str_column(df, "Type")?;
    let expirations = str_column(df, "Expiration")?;
    let data_dates = str_column(df, "DataDate")?;
    let strikes = decimal_column(df, "Strike")?;
    let lasts = decimal_column(df, "Last")?;
    let bids = decimal_column(df, "Bid")?;
    let asks = decimal_column(df, "Ask")?;
    let volumes = i64_column(df, "Volume")?;
    let open_interest = i64_column(df, "OpenInterest")?;
    let ivs = f64_column(df, "IV")?;
    let deltas = f64_column(df, "Delta")?;
    let gammas = f64_column(df, "Gamma")?;
    let thetas = f64_column(df, "Theta")?;
    let vegas = f64_column(df, "Vega")?;
    let row_indices = match row_index_col {
        Some(name) => Some(i64_column(df, name)?),
        None => None,
    };

    let mut quotes = Vec::with_capacity(df.height());
    let mut skipped = 0usize;

    for idx in 0..df.height() {
        let Some(option_type) = types.get(idx).and_then(OptionType::from_str) else {
            skipped += 1;
            continue;
        };

        let expiration = expirations
            .get(idx)
            .and_then(parse_date)
            .ok_or_else(|| LoaderError::InvalidData(format!("Bad Expiration at row {}", idx)))?;
        let data_date = data_dates
            .get(idx)
            .and_then(parse_date)
            .ok_or_else(|| LoaderError::InvalidData(format!("Bad DataDate at row {}", idx)))?;

        let row_index = match &row_indices {
            Some(col) => col.get(idx).ok_or_else(|| {
                LoaderError::InvalidData(format!("Missing row index at row {}", idx))
            })? as u64,
            None => idx as u64,
        };

        quotes.push(OptionQuote {
            row_index,
            underlying_price: spot[idx],
            option_type,
            expiration,
            data_date,
            strike: strikes[idx],
            last: lasts[idx],
            bid: bids[idx],
            ask: asks[idx],
            volume: volumes.get(idx).unwrap_or(0),
            open_interest: open_interest.get(idx).unwrap_or(0),
            iv: ivs.get(idx).unwrap_or(f64::NAN),
            delta: deltas.get(idx).unwrap_or(f64::NAN),
            gamma: gammas.get(idx).unwrap_or(f64::NAN),
            theta: thetas.get(idx).unwrap_or(f64::NAN),
            vega: vegas.get(idx).unwrap_or(f64::NAN),
            days: OptionQuote::days_between(data_date, expiration),
        });
    }

    if skipped > 0 {
        debug!(skipped, "Dropped rows with unknown option type");
    }

    Ok(quotes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "delta_backtest_loader_{}_{}",
            tag,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    const SAMPLE: &str = "\
UnderlyingPrice,Type,Expiration,DataDate,Strike,Last,Bid,Ask,Volume,OpenInterest,IV,Delta,Gamma,Theta,Vega,Extra
100.5,call,2020-01-17,2020-01-02,100,2.1,2.0,2.2,15,300,0.21,0.52,0.05,-0.1,0.2,x
100.5,put,2020-01-17,2020-01-02,100,1.9,1.8,2.0,12,250,0.22,-0.48,0.05,-0.1,0.2,x
100.5,future,2020-01-17,2020-01-02,100,1.9,1.8,2.0,12,250,0.22,-0.48,0.05,-0.1,0.2,x
100.5,call,2020-01-17,2020-01-02,105,0.9,0.8,1.0,5,100,0.2,,0.04,-0.1,0.2,x
";

    #[test]
    fn test_source_path() {
        let loader = DataLoader::new("data");
        assert_eq!(loader.source_path("SPY"), "data/SPY.csv");
    }

    #[test]
    fn test_parse_date_formats() {
        let d = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
        assert_eq!(parse_date("2020-01-02"), Some(d));
        assert_eq!(parse_date("01/02/2020"), Some(d));
        assert_eq!(parse_date("2020-01-02 00:00:00"), Some(d));
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn test_missing_file_is_error() {
        let loader = DataLoader::new("/nonexistent/delta_backtest");
        let err = loader.load_quotes("SPY").unwrap_err();
        assert!(matches!(err, LoaderError::FileNotFound(_)));
    }

    #[test]
    fn test_load_and_split() {
        let dir = temp_dir("split");
        std::fs::write(dir.join("X.csv"), SAMPLE).unwrap();

        let loader = DataLoader::new(dir.to_str().unwrap());
        assert_eq!(loader.available_assets().unwrap(), vec!["X".to_string()]);

        let chain = loader.load_quotes("X").unwrap();
        assert_eq!(chain.calls.len(), 2);
        assert_eq!(chain.puts.len(), 1);

        let call = &chain.calls[0];
        assert_eq!(call.row_index, 0);
        assert_eq!(call.days, 15);
        assert_eq!(call.bid, dec!(2.0));
        assert_eq!(call.underlying_price, dec!(100.5));

        // Row order survives the split; the unknown type row is skipped.
        assert_eq!(chain.puts[0].row_index, 1);
        assert_eq!(chain.calls[1].row_index, 3);
        assert!(!chain.calls[1].has_delta());

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_missing_column() {
        let dir = temp_dir("missing");
        std::fs::write(
            dir.join("X.csv"),
            "UnderlyingPrice,Type,Expiration,DataDate\n100,call,2020-01-17,2020-01-02\n",
        )
        .unwrap();

        let loader = DataLoader::new(dir.to_str().unwrap());
        let err = loader.load_quotes("X").unwrap_err();
        assert!(matches!(err, LoaderError::MissingColumn(c) if c == "Strike"));

        std::fs::remove_dir_all(dir).ok();
    }
}
