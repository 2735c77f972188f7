//! Run status report and per-day series export.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ledger::{DaySeries, PortfolioLedger};

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum Outcome {
    Bankrupt { day: usize, date: NaiveDate },
    Completed,
}

/// Terminal summary of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub strategy: String,
    pub outcome: Outcome,
    /// Last simulated day index.
    pub days: usize,
    pub final_balance: Decimal,
    pub final_net_delta: f64,
    pub open_legs: usize,
}

impl StatusReport {
    pub fn new(strategy: &str, outcome: Outcome, ledger: &PortfolioLedger) -> Self {
        let state = ledger.current();
        Self {
            strategy: strategy.to_string(),
            outcome,
            days: state.day,
            final_balance: state.balance,
            final_net_delta: state.net_delta,
            open_legs: state.open_legs,
        }
    }

    pub fn is_bankrupt(&self) -> bool {
        matches!(self.outcome, Outcome::Bankrupt { .. })
    }

    /// Generate summary string.
    pub fn summary(&self) -> String {
        match self.outcome {
            Outcome::Bankrupt { day, date } => format!(
                "{}: BANKRUPT on day {} ({}) after {} days, balance {:.2}",
                self.strategy, day, date, self.days, self.final_balance
            ),
            Outcome::Completed => format!(
                "{}: completed {} days\n\
                 Final balance:   {:.2}\n\
                 Final net delta: {:.4}\n\
                 Open legs:       {}",
                self.strategy, self.days, self.final_balance, self.final_net_delta, self.open_legs
            ),
        }
    }
}

/// Write the balance / delta / open-leg series as pretty JSON.
pub fn write_series_json(series: &DaySeries, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(series)?;
    fs::write(path, content)
}
