//! Pipeline stages: fetch, clean, load, validate

pub mod b3;
pub mod clean;
pub mod fetch;
pub mod load;
pub mod provider;
pub mod snapshot;
pub mod store;
pub mod validate;

pub use b3::B3PortfolioClient;
pub use clean::{
    normalize_decimal, partition_table, CleanError, Partition, NUMERIC_COLUMNS, PARTITION_KEY,
};
pub use fetch::{fetch_portfolio_day, is_trading_weekday, FetchOutcome};
pub use load::{load_raw_files, FileOutcome, FileReport, LoadError, LoadSummary, SkipReason};
pub use provider::{FetchError, PortfolioRecord, PortfolioRequest, PortfolioSource};
pub use snapshot::{read_snapshot, snapshot_file_name, write_snapshot, RawTable, DATE_COLUMN};
pub use store::{DatasetStore, Location, PartitionWrite, StoreError};
pub use validate::{inspect, Inspection, ValidateError, DEFAULT_SAMPLE_ROWS};
