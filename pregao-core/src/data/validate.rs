//! Read-back inspection of dataset objects.
//!
//! Reads one Parquet object, or every Parquet object under a prefix such as
//! `s3://bucket/raw/dt=2025-07-17/`, and reports the schema (non-null count
//! and dtype per column) plus the first rows. Nothing is asserted or changed.

use super::store::{BlockingStore, Location, StoreError};
use polars::prelude::*;
use std::fmt;
use thiserror::Error;

pub const DEFAULT_SAMPLE_ROWS: usize = 5;

#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("cannot read {target}: {source}")]
    Read { target: String, source: StoreError },

    #[error("no Parquet objects found under {target}")]
    NoParquet { target: String },
}

/// Schema line for one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSummary {
    pub name: String,
    pub non_null: usize,
    pub dtype: DataType,
}

/// What the validator found at a target.
#[derive(Debug, Clone)]
pub struct Inspection {
    pub target: String,
    pub objects: Vec<String>,
    pub rows: usize,
    pub columns: Vec<ColumnSummary>,
    pub head: DataFrame,
}

impl Inspection {
    pub fn column(&self, name: &str) -> Option<&ColumnSummary> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Read `target` and summarize it.
///
/// A target ending in `.parquet` is a single object; anything else is a
/// prefix whose Parquet objects are read in path order and stacked.
pub fn inspect(target: &str, sample_rows: usize) -> Result<Inspection, ValidateError> {
    let read_err = |source: StoreError| ValidateError::Read {
        target: target.to_string(),
        source,
    };

    let location = Location::parse(target).map_err(read_err)?;
    let (store, path) = BlockingStore::open(&location).map_err(read_err)?;

    let objects = if path.as_ref().ends_with(".parquet") {
        vec![path]
    } else {
        store
            .list(&path)
            .map_err(read_err)?
            .into_iter()
            .map(|meta| meta.location)
            .filter(|p| p.as_ref().ends_with(".parquet"))
            .collect()
    };

    if objects.is_empty() {
        return Err(ValidateError::NoParquet {
            target: target.to_string(),
        });
    }

    let frame = store.read_parquet_many(&objects).map_err(read_err)?;

    let columns = frame
        .get_columns()
        .iter()
        .map(|c| ColumnSummary {
            name: c.name().to_string(),
            non_null: c.len() - c.null_count(),
            dtype: c.dtype().clone(),
        })
        .collect();

    Ok(Inspection {
        target: target.to_string(),
        objects: objects.iter().map(|p| p.to_string()).collect(),
        rows: frame.height(),
        columns,
        head: frame.head(Some(sample_rows)),
    })
}

impl fmt::Display for Inspection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Target:  {}", self.target)?;
        writeln!(f, "Objects: {}", self.objects.len())?;
        writeln!(f, "Rows:    {}", self.rows)?;
        writeln!(f, "Columns: {}", self.columns.len())?;
        writeln!(f)?;

        let width = self
            .columns
            .iter()
            .map(|c| c.name.len())
            .max()
            .unwrap_or(6)
            .max(6);
        writeln!(f, "{:>3}  {:<width$}  {:>14}  Dtype", "#", "Column", "Non-Null Count")?;
        writeln!(f, "{}", "-".repeat(width + 30))?;
        for (i, c) in self.columns.iter().enumerate() {
            writeln!(
                f,
                "{:>3}  {:<width$}  {:>14}  {}",
                i,
                c.name,
                format!("{} non-null", c.non_null),
                c.dtype
            )?;
        }
        writeln!(f)?;
        write!(f, "{}", self.head)
    }
}
