//! Cleaning: locale decimals to floats, date column to a typed partition key.

use super::snapshot::{RawTable, DATE_COLUMN};
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use std::collections::BTreeMap;
use thiserror::Error;

/// Canonical partition key in the dataset.
pub const PARTITION_KEY: &str = "dt";

/// Columns the source formats as pt-BR decimals.
pub const NUMERIC_COLUMNS: [&str; 3] = ["part", "partAcum", "theoricalQty"];

/// `NaiveDate::num_days_from_ce()` of 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

#[derive(Debug, Error)]
pub enum CleanError {
    #[error("missing date column '{DATE_COLUMN}'")]
    MissingDateColumn,

    #[error("row {row}: invalid date {value:?} in '{DATE_COLUMN}'")]
    InvalidDate { row: usize, value: String },

    #[error("dataframe: {0}")]
    Frame(#[from] PolarsError),
}

/// Parse a decimal that may use `.` for thousands and `,` for the fraction.
///
/// - with a comma: dots are grouping, the comma is the decimal point
/// - without a comma and several dots: every dot is grouping
/// - otherwise the text is taken as an already-normalized number
///
/// Unparseable and non-finite values give `None`.
pub fn normalize_decimal(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let canonical = if text.contains(',') {
        text.replace('.', "").replace(',', ".")
    } else if text.matches('.').count() > 1 {
        text.replace('.', "")
    } else {
        text.to_string()
    };

    canonical.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// One `dt=` partition worth of cleaned rows.
#[derive(Debug, Clone)]
pub struct Partition {
    pub dt: NaiveDate,
    pub frame: DataFrame,
}

/// Turn a raw table into one cleaned frame per trading date.
///
/// Allow-listed numeric columns become `Float64` (nulls where unparseable),
/// `dt_pregao` becomes `dt` of type `Date`, everything else stays text.
/// Partitions come back in date order.
pub fn partition_table(table: &RawTable) -> Result<Vec<Partition>, CleanError> {
    let date_idx = table
        .column_index(DATE_COLUMN)
        .ok_or(CleanError::MissingDateColumn)?;

    let mut by_date: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
    for (row_idx, row) in table.rows.iter().enumerate() {
        let raw = row.get(date_idx).and_then(|v| v.as_deref()).unwrap_or("");
        let dt = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
            CleanError::InvalidDate {
                row: row_idx,
                value: raw.to_string(),
            }
        })?;
        by_date.entry(dt).or_default().push(row_idx);
    }

    by_date
        .into_iter()
        .map(|(dt, rows)| {
            let frame = build_frame(table, &rows, date_idx)?;
            Ok(Partition { dt, frame })
        })
        .collect()
}

fn build_frame(
    table: &RawTable,
    rows: &[usize],
    date_idx: usize,
) -> Result<DataFrame, CleanError> {
    let cell = |row: usize, col: usize| table.rows[row].get(col).and_then(|v| v.as_deref());

    let mut columns = Vec::with_capacity(table.headers.len());
    for (col_idx, name) in table.headers.iter().enumerate() {
        let column = if col_idx == date_idx {
            let days: Vec<Option<i32>> = rows
                .iter()
                .map(|&r| {
                    cell(r, col_idx)
                        .and_then(|v| NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d").ok())
                        .map(|d| d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
                })
                .collect();
            Column::new(PARTITION_KEY.into(), days).cast(&DataType::Date)?
        } else if NUMERIC_COLUMNS.contains(&name.as_str()) {
            let values: Vec<Option<f64>> = rows
                .iter()
                .map(|&r| cell(r, col_idx).and_then(normalize_decimal))
                .collect();
            Column::new(name.as_str().into(), values)
        } else {
            let values: Vec<Option<String>> = rows
                .iter()
                .map(|&r| cell(r, col_idx).map(str::to_string))
                .collect();
            Column::new(name.as_str().into(), values)
        };
        columns.push(column);
    }

    Ok(DataFrame::new(columns)?)
}
