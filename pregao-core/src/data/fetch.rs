//! Fetch stage — one day's index composition from the source to a raw CSV.

use super::provider::{FetchError, PortfolioRequest, PortfolioSource};
use super::snapshot::{records_to_table, snapshot_file_name, write_snapshot};
use crate::config::PipelineConfig;
use chrono::{Datelike, NaiveDate, Weekday};
use std::path::{Path, PathBuf};

/// How a single fetch invocation ended.
#[derive(Debug)]
pub enum FetchOutcome {
    /// A snapshot file was written.
    Written { path: PathBuf, rows: usize },
    /// Saturday or Sunday: nothing requested.
    Weekend { date: NaiveDate },
    /// The endpoint answered with no results.
    NoData { date: NaiveDate },
    /// Transport, status, response or write failure. Nothing was written.
    Failed { date: NaiveDate, error: FetchError },
}

impl FetchOutcome {
    /// Path of the written snapshot, if any.
    pub fn output_path(&self) -> Option<&Path> {
        match self {
            FetchOutcome::Written { path, .. } => Some(path),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, FetchOutcome::Failed { .. })
    }
}

/// Trading sessions only happen Monday to Friday. No holiday calendar.
pub fn is_trading_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Fetch the portfolio for `date` and write it to the raw directory.
///
/// Never returns an error: every failure is folded into
/// [`FetchOutcome::Failed`]. On weekends the source is not called at all.
pub fn fetch_portfolio_day(
    source: &dyn PortfolioSource,
    config: &PipelineConfig,
    date: NaiveDate,
) -> FetchOutcome {
    if !is_trading_weekday(date) {
        tracing::info!(%date, "weekend, no trading session to fetch");
        return FetchOutcome::Weekend { date };
    }

    tracing::info!(%date, source = source.name(), "fetching portfolio");
    let request = PortfolioRequest::for_date(&config.request, date);

    let records = match source.fetch(&request) {
        Ok(records) => records,
        Err(error) => {
            tracing::error!(%date, %error, "portfolio fetch failed");
            return FetchOutcome::Failed { date, error };
        }
    };

    if records.is_empty() {
        tracing::info!(%date, "no portfolio data returned");
        return FetchOutcome::NoData { date };
    }

    let table = records_to_table(&records, date);
    match write_snapshot(&config.raw_dir, date, &table) {
        Ok(path) => {
            tracing::info!(path = %path.display(), rows = table.len(), "snapshot written");
            FetchOutcome::Written {
                path,
                rows: table.len(),
            }
        }
        Err(e) => {
            let error = FetchError::Write {
                path: config
                    .raw_dir
                    .join(snapshot_file_name(date))
                    .display()
                    .to_string(),
                reason: e.to_string(),
            };
            tracing::error!(%date, %error, "could not write snapshot");
            FetchOutcome::Failed { date, error }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekdays_and_weekends() {
        // 2025-07-14 is a Monday.
        let monday = NaiveDate::from_ymd_opt(2025, 7, 14).unwrap();
        for offset in 0..5 {
            assert!(is_trading_weekday(monday + chrono::Duration::days(offset)));
        }
        assert!(!is_trading_weekday(monday + chrono::Duration::days(5)));
        assert!(!is_trading_weekday(monday + chrono::Duration::days(6)));
    }

    #[test]
    fn output_path_only_for_written() {
        let date = NaiveDate::from_ymd_opt(2025, 7, 17).unwrap();
        let written = FetchOutcome::Written {
            path: PathBuf::from("dados_brutos/pregao_2025-07-17.csv"),
            rows: 3,
        };
        assert_eq!(
            written.output_path(),
            Some(Path::new("dados_brutos/pregao_2025-07-17.csv"))
        );
        assert!(FetchOutcome::NoData { date }.output_path().is_none());
        assert!(FetchOutcome::Weekend { date }.output_path().is_none());

        let failed = FetchOutcome::Failed {
            date,
            error: FetchError::Status { status: 503 },
        };
        assert!(failed.output_path().is_none());
        assert!(failed.is_failure());
    }
}
