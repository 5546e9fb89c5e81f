//! Raw snapshot files: the CSV contract between the fetcher and the loader.
//!
//! Layout: `{raw_dir}/pregao_{YYYY-MM-DD}.csv`, semicolon-delimited (the
//! source locale uses decimal commas), UTF-8, header row, with a trailing
//! `dt_pregao` column carrying the invocation date on every row.
//!
//! Writes are atomic: write to `.tmp`, then rename into place.

use super::provider::PortfolioRecord;
use chrono::NaiveDate;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Column the fetcher appends and the loader partitions on.
pub const DATE_COLUMN: &str = "dt_pregao";

pub const DELIMITER: u8 = b';';

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// `pregao_2025-07-17.csv`
pub fn snapshot_file_name(date: NaiveDate) -> String {
    format!("pregao_{}.csv", date.format("%Y-%m-%d"))
}

/// Whether a directory entry is something the loader should pick up.
pub fn is_snapshot_file(path: &Path) -> bool {
    path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("csv")
}

/// A parsed raw file: header plus string cells, empty cells as `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// All values of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<Option<&str>>> {
        let idx = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).and_then(|v| v.as_deref()))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Flatten portfolio records into a table.
///
/// Columns are the union of record keys in first-seen order followed by
/// `dt_pregao`, which is set to `date` on every row (a source key of that
/// name is overwritten).
pub fn records_to_table(records: &[PortfolioRecord], date: NaiveDate) -> RawTable {
    let mut headers: Vec<String> = Vec::new();
    for record in records {
        for key in record.keys() {
            if key != DATE_COLUMN && !headers.iter().any(|h| h == key) {
                headers.push(key.clone());
            }
        }
    }

    let date_text = date.format("%Y-%m-%d").to_string();
    let rows = records
        .iter()
        .map(|record| {
            let mut row: Vec<Option<String>> = headers
                .iter()
                .map(|h| record.get(h).and_then(render_cell))
                .collect();
            row.push(Some(date_text.clone()));
            row
        })
        .collect();

    headers.push(DATE_COLUMN.to_string());
    RawTable { headers, rows }
}

fn render_cell(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        nested => Some(nested.to_string()),
    }
}

/// Write a table as `{dir}/pregao_{date}.csv`, creating `dir` if needed.
pub fn write_snapshot(
    dir: &Path,
    date: NaiveDate,
    table: &RawTable,
) -> Result<PathBuf, SnapshotError> {
    fs::create_dir_all(dir)?;

    let path = dir.join(snapshot_file_name(date));
    let tmp_path = path.with_extension("csv.tmp");

    if let Err(e) = write_table(&tmp_path, table) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    fs::rename(&tmp_path, &path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        SnapshotError::Io(e)
    })?;

    Ok(path)
}

fn write_table(path: &Path, table: &RawTable) -> Result<(), SnapshotError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(DELIMITER)
        .from_path(path)?;

    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a raw snapshot file. Ragged rows are an error.
pub fn read_snapshot(path: &Path) -> Result<RawTable, SnapshotError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(true)
        .from_path(path)?;

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows: Vec<Vec<Option<String>>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|cell| {
                    if cell.is_empty() {
                        None
                    } else {
                        Some(cell.to_string())
                    }
                })
                .collect(),
        );
    }

    Ok(RawTable { headers, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 17).unwrap()
    }

    fn record(value: Value) -> PortfolioRecord {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn file_name_is_keyed_by_date() {
        assert_eq!(snapshot_file_name(date()), "pregao_2025-07-17.csv");
    }

    #[test]
    fn union_of_keys_in_first_seen_order() {
        let records = vec![
            record(json!({ "segment": null, "cod": "PETR4", "part": "10,5" })),
            record(json!({ "cod": "VALE3", "reductor": 1.5, "part": "9,1" })),
        ];
        let table = records_to_table(&records, date());

        assert_eq!(
            table.headers,
            vec!["segment", "cod", "part", "reductor", "dt_pregao"]
        );
        assert_eq!(table.rows[0][0], None);
        assert_eq!(table.rows[0][3], None);
        assert_eq!(table.rows[1][3].as_deref(), Some("1.5"));
        assert!(table
            .column(DATE_COLUMN)
            .unwrap()
            .iter()
            .all(|d| *d == Some("2025-07-17")));
    }

    #[test]
    fn source_date_column_is_overwritten() {
        let records = vec![record(json!({ "cod": "PETR4", "dt_pregao": "1999-01-01" }))];
        let table = records_to_table(&records, date());

        assert_eq!(table.headers, vec!["cod", "dt_pregao"]);
        assert_eq!(table.rows[0][1].as_deref(), Some("2025-07-17"));
    }

    #[test]
    fn write_then_read_preserves_decimal_commas() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![record(
            json!({ "cod": "PETR4", "asset": "PETROBRAS; PN", "part": "10,5", "theoricalQty": "4.566.445.852" }),
        )];
        let table = records_to_table(&records, date());

        let path = write_snapshot(&dir.path().join("raw"), date(), &table).unwrap();
        assert_eq!(path.file_name().unwrap(), "pregao_2025-07-17.csv");
        assert!(!path.with_extension("csv.tmp").exists());

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("cod;asset;part;theoricalQty;dt_pregao\n"));

        let back = read_snapshot(&path).unwrap();
        assert_eq!(back, table);
        assert_eq!(back.column("asset").unwrap(), vec![Some("PETROBRAS; PN")]);
    }

    #[test]
    fn ragged_rows_fail_to_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pregao_2025-07-17.csv");
        fs::write(&path, "cod;part\nPETR4;10,5;extra\n").unwrap();

        assert!(matches!(read_snapshot(&path), Err(SnapshotError::Csv(_))));
    }

    #[test]
    fn only_csv_files_are_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("pregao_2025-07-17.csv");
        let tmp = dir.path().join("pregao_2025-07-18.csv.tmp");
        fs::write(&csv, "a\n").unwrap();
        fs::write(&tmp, "a\n").unwrap();

        assert!(is_snapshot_file(&csv));
        assert!(!is_snapshot_file(&tmp));
        assert!(!is_snapshot_file(dir.path()));
    }
}
